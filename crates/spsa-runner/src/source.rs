//! Renders a parameter vector as the engine's Rust constants module.

use spsa_types::{ParameterKind, ParameterVector};
use std::fmt::Write;

/// One `pub const` per parameter, named after the upper-cased parameter
/// name. Integer parameters become `i32`, continuous ones `f64`.
pub fn render_constants(vector: &ParameterVector) -> String {
    let mut out = String::from("// Generated by spsa-tune. Do not edit by hand.\n\n");
    for (spec, value) in vector.space().iter().zip(vector.values()) {
        let ident = spec.name.to_uppercase();
        // writing into a String cannot fail
        let _ = match spec.kind {
            ParameterKind::Integer => writeln!(out, "pub const {ident}: i32 = {};", value.round() as i64),
            ParameterKind::Continuous => writeln!(out, "pub const {ident}: f64 = {};", float_literal(*value)),
        };
    }
    out
}

/// `{:?}` keeps a decimal point or exponent, so the literal always types as
/// a float.
fn float_literal(value: f64) -> String {
    format!("{value:?}")
}

/// Clamps every entry into its projection bounds and rounds integer
/// parameters to the nearest integer. Used for deterministic previews.
pub fn clamp_for_preview(vector: &ParameterVector) -> ParameterVector {
    vector.map_with_spec(|spec, value| {
        let (lo, hi) = spec.projection_bounds();
        let clamped = value.clamp(lo, hi);
        match spec.kind {
            ParameterKind::Integer => clamped.round(),
            ParameterKind::Continuous => clamped,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use spsa_types::{ParameterSpace, ParameterSpec};

    #[test]
    fn renders_typed_constants() {
        let space = ParameterSpace::shared(vec![
            ParameterSpec::integer("countermove_pruning_factor", -700.0, -4000.0, 0.0, 100.0),
            ParameterSpec::continuous("null_move_r_base", 4.0, 0.0, 8.0, 0.2),
            ParameterSpec::continuous("history_decay_factor", 1.0 / 512.0, 1.0 / 1024.0, 0.01, 0.0001),
        ])
        .unwrap();
        let text = render_constants(&space.initial_vector());
        assert!(text.contains("pub const COUNTERMOVE_PRUNING_FACTOR: i32 = -700;\n"));
        assert!(text.contains("pub const NULL_MOVE_R_BASE: f64 = 4.0;\n"));
        assert!(text.contains("pub const HISTORY_DECAY_FACTOR: f64 = 0.001953125;\n"));
    }

    #[test]
    fn float_literals_round_trip() {
        for v in [1.0 / 6.0, 1e-20, 32.0, -0.5] {
            let lit = float_literal(v);
            assert!(lit.contains('.') || lit.contains('e'), "{lit}");
            assert_eq!(lit.parse::<f64>().unwrap(), v);
        }
    }

    #[test]
    fn preview_clamps_and_rounds() {
        let space = ParameterSpace::shared(vec![
            ParameterSpec::integer("x", 1000.0, 0.0, 4000.0, 100.0),
            ParameterSpec::continuous("y", 0.8, 0.0, 2.0, 0.1),
        ])
        .unwrap();
        let v = ParameterVector::from_values(&space, vec![4123.6, 0.8123]).unwrap();
        assert_eq!(clamp_for_preview(&v).values(), &[4000.0, 0.8123]);
        let v = ParameterVector::from_values(&space, vec![1234.6, 2.5]).unwrap();
        assert_eq!(clamp_for_preview(&v).values(), &[1235.0, 2.0]);
    }
}

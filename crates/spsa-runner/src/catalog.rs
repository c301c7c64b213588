//! Built-in catalog of the engine's tunable search parameters.

use spsa_types::ParameterSpec;

/// Search parameters as shipped, with their tuning bounds and steps.
pub fn default_parameters() -> Vec<ParameterSpec> {
    use ParameterSpec as P;

    vec![
        P::integer("efp_margin_base", 1000.0, 0.0, 4000.0, 100.0),
        P::integer("efp_margin_factor", 1200.0, 0.0, 4000.0, 100.0),
        P::integer("fp_margin_base", 1000.0, 0.0, 4000.0, 100.0),
        P::integer("fp_margin_factor", 600.0, 0.0, 4000.0, 100.0),
        P::integer("rfp_margin_base", 500.0, 0.0, 4000.0, 100.0),
        P::integer("rfp_margin_factor", 1200.0, 0.0, 4000.0, 100.0),
        P::integer("afp_margin", 30000.0, 10000.0, 50000.0, 3000.0),
        P::continuous("null_move_r_base", 4.0, 0.0, 8.0, 0.2),
        P::continuous("null_move_r_factor", 1.0 / 6.0, 0.0, 0.5, 1.0 / 30.0),
        P::integer("null_move_r_denom", 3000.0, 1000.0, 15000.0, 200.0),
        P::integer("razoring_margin", 2500.0, 1000.0, 5000.0, 100.0),
        P::continuous("lmr_base", 0.8, 0.0, 2.0, 0.1),
        P::continuous("lmr_factor", 1.0 / 2.25, 1.0 / 4.0, 1.0, 0.07),
        P::integer("lmr_history_denominator", 8000.0, 2000.0, 16000.0, 250.0),
        P::continuous("lmp_improving_base", 4.0, 0.0, 10.0, 0.3),
        P::continuous("lmp_improving_factor", 1.0, 0.1, 2.0, 0.07),
        P::continuous("lmp_nonimproving_base", 2.0, 0.0, 10.0, 0.3),
        P::continuous("lmp_nonimproving_factor", 0.5, 0.1, 2.0, 0.07),
        P::continuous("history_decay_factor", 1.0 / 512.0, 1.0 / 1024.0, 1.0 / 100.0, 0.0001),
        P::continuous("history_delta_factor", 32.0, 10.0, 50.0, 1.0),
        P::integer("history_leaf_pruning_margin", 6000.0, 0.0, 30000.0, 500.0),
        P::integer("countermove_pruning_factor", -700.0, -4000.0, 0.0, 100.0),
        P::integer("followup_pruning_factor", -1500.0, -5000.0, 0.0, 175.0),
        P::integer("singular_margin_factor", 37.0, 10.0, 100.0, 5.0),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use spsa_types::{ParameterKind, ParameterSpace};

    #[test]
    fn catalog_is_a_valid_space() {
        let space = ParameterSpace::new(default_parameters()).unwrap();
        assert_eq!(space.len(), 24);
        assert_eq!(space.active_count(), 24);
    }

    #[test]
    fn margins_are_integers() {
        let space = ParameterSpace::new(default_parameters()).unwrap();
        assert_eq!(space.get("afp_margin").unwrap().kind, ParameterKind::Integer);
        assert_eq!(space.get("lmr_base").unwrap().kind, ParameterKind::Continuous);
        let integers = space.iter().filter(|p| p.kind == ParameterKind::Integer).count();
        assert_eq!(integers, 14);
    }
}

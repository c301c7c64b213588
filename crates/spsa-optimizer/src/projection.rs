//! Bounds enforcement and stochastic rounding for candidate vectors.

use rand::Rng;
use spsa_types::{ParameterKind, ParameterVector};

/// Maps a logical parameter vector onto something an engine can be built
/// from: every entry clamped into its bounds, integer entries rounded.
#[derive(Debug, Clone, Copy, Default)]
pub struct Projector;

impl Projector {
    pub fn new() -> Self {
        Self
    }

    pub fn project<R: Rng + ?Sized>(&self, vector: &ParameterVector, rng: &mut R) -> ParameterVector {
        vector.map_with_spec(|spec, value| {
            let (lo, hi) = spec.projection_bounds();
            let clamped = value.clamp(lo, hi);
            match spec.kind {
                ParameterKind::Integer => stochastic_round(clamped, rng),
                ParameterKind::Continuous => clamped,
            }
        })
    }
}

/// Rounds to one of the two neighbouring integers with probabilities chosen
/// so that the expectation equals `value`.
pub fn stochastic_round<R: Rng + ?Sized>(value: f64, rng: &mut R) -> f64 {
    if value.fract() == 0.0 {
        return value;
    }
    let u: f64 = rng.random();
    (value + u).floor()
}

//! Gradient estimation from a single paired comparison.

use spsa_types::ParameterVector;

/// Finite-difference SPSA estimator for `±step` perturbations.
///
/// For parameter `k` the update is `a * score * step_k / (delta_k / step_k)`,
/// i.e. the perturbation is reduced to step units, inverted, and scaled back
/// into native units. Frozen parameters always receive zero.
#[derive(Debug, Clone, Copy, Default)]
pub struct GradientEstimator;

impl GradientEstimator {
    pub fn new() -> Self {
        Self
    }

    pub fn estimate(&self, score: f64, delta: &ParameterVector, gain_a: f64) -> ParameterVector {
        (gain_a * score) * delta.normalize().invert().denormalize()
    }
}

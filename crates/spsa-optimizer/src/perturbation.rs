//! Simultaneous perturbation vectors.

use rand::{Rng, RngCore};
use spsa_types::{ParameterSpace, ParameterVector};
use std::sync::Arc;

/// Produces the unscaled perturbation for one iteration.
pub trait PerturbationSource: Send {
    /// One entry per parameter, each `+step`, `-step`, or zero for frozen
    /// parameters.
    fn base_delta(&mut self, space: &Arc<ParameterSpace>, rng: &mut dyn RngCore) -> ParameterVector;

    /// Human-readable source name.
    fn name(&self) -> &str;
}

/// Independent fair-coin sign per parameter (Rademacher distribution).
#[derive(Debug, Clone, Copy, Default)]
pub struct RademacherPerturbation;

impl PerturbationSource for RademacherPerturbation {
    fn base_delta(&mut self, space: &Arc<ParameterSpace>, rng: &mut dyn RngCore) -> ParameterVector {
        ParameterVector::zeros(space).map_with_spec(|spec, _| {
            let step = spec.effective_step();
            if step == 0.0 {
                return 0.0;
            }
            if rng.random_bool(0.5) {
                step
            } else {
                -step
            }
        })
    }

    fn name(&self) -> &str {
        "rademacher"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use spsa_types::ParameterSpec;

    fn space() -> Arc<ParameterSpace> {
        ParameterSpace::shared(vec![
            ParameterSpec::integer("afp_margin", 30000.0, 10000.0, 50000.0, 3000.0),
            ParameterSpec::continuous("lmr_factor", 1.0 / 2.25, 0.25, 1.0, 0.07),
            ParameterSpec::integer("frozen_by_step", 37.0, 10.0, 100.0, 0.0),
            ParameterSpec::continuous("frozen_by_flag", 4.0, 0.0, 8.0, 0.2).freeze(),
        ])
        .unwrap()
    }

    #[test]
    fn entries_are_plus_or_minus_one_step() {
        let space = space();
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        let mut source = RademacherPerturbation;
        for _ in 0..200 {
            let delta = source.base_delta(&space, &mut rng);
            assert_eq!(delta.value(0).abs(), 3000.0);
            assert_eq!(delta.value(1).abs(), 0.07);
        }
    }

    #[test]
    fn frozen_parameters_never_move() {
        let space = space();
        let mut rng = ChaCha8Rng::seed_from_u64(12);
        let mut source = RademacherPerturbation;
        for _ in 0..200 {
            let delta = source.base_delta(&space, &mut rng);
            assert_eq!(delta.value(2), 0.0);
            assert_eq!(delta.value(3), 0.0);
        }
    }

    #[test]
    fn signs_are_balanced() {
        let space = space();
        let mut rng = ChaCha8Rng::seed_from_u64(13);
        let mut source = RademacherPerturbation;
        let draws = 20_000;
        let positive = (0..draws)
            .filter(|_| source.base_delta(&space, &mut rng).value(0) > 0.0)
            .count();
        let fraction = positive as f64 / draws as f64;
        assert!((fraction - 0.5).abs() < 0.02, "fraction {fraction}");
    }

    #[test]
    fn signs_are_drawn_independently() {
        let space = space();
        let mut rng = ChaCha8Rng::seed_from_u64(14);
        let mut source = RademacherPerturbation;
        let draws = 20_000;
        let agree = (0..draws)
            .filter(|_| {
                let d = source.base_delta(&space, &mut rng);
                (d.value(0) > 0.0) == (d.value(1) > 0.0)
            })
            .count();
        let fraction = agree as f64 / draws as f64;
        assert!((fraction - 0.5).abs() < 0.02, "fraction {fraction}");
    }
}

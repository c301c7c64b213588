//! Decaying gain sequences.

use serde::{Deserialize, Serialize};
use spsa_types::RunConfig;

/// Gains for a single iteration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Gains {
    /// Perturbation magnitude gain `c(n)`.
    pub c: f64,
    /// Step size gain `a(n)`.
    pub a: f64,
}

/// Spall's two-sequence schedule, calibrated so that `c` and `a / c^2`
/// reach `final_c` and `final_r` at the end of the planned run:
///
/// ```text
/// c0   = final_c * (1 + N)^gamma
/// a0   = final_r * final_c^2 * (1 + N)^alpha
/// c(n) = c0 / (1 + n)^gamma
/// a(n) = a0 / (1 + n)^alpha
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GainSchedule {
    c0: f64,
    a0: f64,
    alpha: f64,
    gamma: f64,
}

impl GainSchedule {
    pub fn new(config: &RunConfig) -> Self {
        Self::from_targets(
            config.num_iterations,
            config.final_r,
            config.final_c,
            config.alpha,
            config.gamma,
        )
    }

    pub fn from_targets(num_iterations: usize, final_r: f64, final_c: f64, alpha: f64, gamma: f64) -> Self {
        let horizon = 1.0 + num_iterations as f64;
        Self {
            c0: final_c * horizon.powf(gamma),
            a0: final_r * final_c.powi(2) * horizon.powf(alpha),
            alpha,
            gamma,
        }
    }

    pub fn c0(&self) -> f64 {
        self.c0
    }

    pub fn a0(&self) -> f64 {
        self.a0
    }

    pub fn c(&self, n: usize) -> f64 {
        self.c0 / (1.0 + n as f64).powf(self.gamma)
    }

    pub fn a(&self, n: usize) -> f64 {
        self.a0 / (1.0 + n as f64).powf(self.alpha)
    }

    pub fn gains(&self, n: usize) -> Gains {
        Gains {
            c: self.c(n),
            a: self.a(n),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closed_form_first_gains() {
        let schedule = GainSchedule::from_targets(1, 0.002, 1.0, 0.6, 0.1);
        assert!((schedule.c(0) - 2f64.powf(0.1)).abs() < 1e-12);
        assert!((schedule.a(0) - 0.002 * 2f64.powf(0.6)).abs() < 1e-12);
    }

    #[test]
    fn gains_positive_and_non_increasing() {
        let config = RunConfig::new(500);
        let schedule = GainSchedule::new(&config);
        let mut prev = schedule.gains(0);
        assert!(prev.a > 0.0 && prev.c > 0.0);
        for n in 1..=config.num_iterations {
            let g = schedule.gains(n);
            assert!(g.a > 0.0 && g.c > 0.0);
            assert!(g.a <= prev.a, "a increased at {n}");
            assert!(g.c <= prev.c, "c increased at {n}");
            prev = g;
        }
    }

    #[test]
    fn zero_exponents_give_constant_gains() {
        let schedule = GainSchedule::from_targets(100, 0.01, 2.0, 0.0, 0.0);
        assert_eq!(schedule.c(0), schedule.c(99));
        assert_eq!(schedule.a(0), 0.01 * 4.0);
    }

    #[test]
    fn final_gains_approach_targets() {
        let (final_r, final_c) = (0.002, 1.0);
        let mut last_error = f64::INFINITY;
        for n in [10usize, 100, 1_000, 10_000] {
            let schedule = GainSchedule::from_targets(n, final_r, final_c, 0.6, 0.1);
            let c_err = (schedule.c(n - 1) - final_c).abs() / final_c;
            let a_err = (schedule.a(n - 1) - final_r).abs() / final_r;
            let err = c_err.max(a_err);
            assert!(err < last_error);
            last_error = err;
        }
        assert!(last_error < 1e-3, "relative error {last_error}");
    }

    #[test]
    fn final_gain_formula_scales_with_final_c() {
        let schedule = GainSchedule::from_targets(10_000, 0.002, 2.0, 0.6, 0.1);
        let a_end = schedule.a(10_000);
        let c_end = schedule.c(10_000);
        assert!((c_end - 2.0).abs() < 1e-12);
        assert!((a_end / c_end.powi(2) - 0.002).abs() < 1e-12);
    }
}

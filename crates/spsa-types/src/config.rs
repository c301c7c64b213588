//! Versioned run configuration consumed by the optimizer.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::config_error;
use crate::errors::ConfigError;

/// Configuration schema version understood by this build.
pub const RUN_CONFIG_VERSION: u32 = 1;

/// Hyperparameters and bookkeeping for one tuning run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub version: u32,

    /// Planned run length; the gain schedule is calibrated against it.
    pub num_iterations: usize,

    /// Step gain targeted at the end of the run.
    pub final_r: f64,

    /// Perturbation gain targeted at the end of the run.
    pub final_c: f64,

    /// Decay exponent of the step gain.
    pub alpha: f64,

    /// Decay exponent of the perturbation gain.
    pub gamma: f64,

    /// Verify every this many iterations; 0 disables verification.
    pub verification_period: usize,

    /// Seed for perturbation signs and stochastic rounding. `None` draws
    /// from OS entropy.
    pub seed: Option<u64>,

    /// Replacements for catalog initial values.
    pub initial_overrides: BTreeMap<String, f64>,

    /// Catalog values replaced in the reference that verification plays
    /// against. Empty means the catalog's initial values.
    pub reference_overrides: BTreeMap<String, f64>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            version: RUN_CONFIG_VERSION,
            num_iterations: 10_000,
            final_r: 0.002,
            final_c: 1.0,
            alpha: 0.6,
            gamma: 0.1,
            verification_period: 0,
            seed: None,
            initial_overrides: BTreeMap::new(),
            reference_overrides: BTreeMap::new(),
        }
    }
}

impl RunConfig {
    pub fn new(num_iterations: usize) -> Self {
        Self {
            num_iterations,
            ..Self::default()
        }
    }

    pub fn with_gains(mut self, final_r: f64, final_c: f64) -> Self {
        self.final_r = final_r;
        self.final_c = final_c;
        self
    }

    pub fn with_decay(mut self, alpha: f64, gamma: f64) -> Self {
        self.alpha = alpha;
        self.gamma = gamma;
        self
    }

    pub fn with_verification_period(mut self, period: usize) -> Self {
        self.verification_period = period;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_initial(mut self, name: impl Into<String>, value: f64) -> Self {
        self.initial_overrides.insert(name.into(), value);
        self
    }

    pub fn with_reference(mut self, name: impl Into<String>, value: f64) -> Self {
        self.reference_overrides.insert(name.into(), value);
        self
    }

    pub fn verification_enabled(&self) -> bool {
        self.verification_period > 0
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.version != RUN_CONFIG_VERSION {
            return Err(ConfigError::UnsupportedVersion {
                found: self.version,
                expected: RUN_CONFIG_VERSION,
            });
        }
        if self.num_iterations == 0 {
            return Err(config_error!("num_iterations must be at least 1"));
        }
        for (name, value) in [("final_r", self.final_r), ("final_c", self.final_c)] {
            if !value.is_finite() || value <= 0.0 {
                return Err(config_error!("{name} must be positive and finite, got {value}"));
            }
        }
        for (name, value) in [("alpha", self.alpha), ("gamma", self.gamma)] {
            if !value.is_finite() || value < 0.0 {
                return Err(config_error!("{name} must be non-negative and finite, got {value}"));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = RunConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.num_iterations, 10_000);
        assert!(!config.verification_enabled());
    }

    #[test]
    fn builder_chain() {
        let config = RunConfig::new(50)
            .with_gains(0.004, 2.0)
            .with_decay(0.602, 0.101)
            .with_verification_period(10)
            .with_seed(7)
            .with_initial("lmr_base", 1.0)
            .with_reference("lmr_base", 0.9);
        assert_eq!(config.num_iterations, 50);
        assert_eq!(config.final_c, 2.0);
        assert_eq!(config.seed, Some(7));
        assert!(config.verification_enabled());
        assert_eq!(config.initial_overrides.get("lmr_base"), Some(&1.0));
        assert_eq!(config.reference_overrides.get("lmr_base"), Some(&0.9));
    }

    #[test]
    fn rejects_invalid_values() {
        assert!(RunConfig::new(0).validate().is_err());
        assert!(RunConfig::new(10).with_gains(0.0, 1.0).validate().is_err());
        assert!(RunConfig::new(10).with_gains(0.002, f64::NAN).validate().is_err());
        assert!(RunConfig::new(10).with_decay(-0.1, 0.1).validate().is_err());

        let mut future = RunConfig::default();
        future.version = 2;
        assert_eq!(
            future.validate(),
            Err(ConfigError::UnsupportedVersion { found: 2, expected: 1 })
        );
    }

    #[test]
    fn missing_fields_take_defaults() {
        let config: RunConfig = serde_json::from_str(r#"{"num_iterations": 25, "seed": 3}"#).unwrap();
        assert_eq!(config.num_iterations, 25);
        assert_eq!(config.final_r, 0.002);
        assert_eq!(config.seed, Some(3));
        assert_eq!(config.version, RUN_CONFIG_VERSION);
    }
}

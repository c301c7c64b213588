//! Top-level configuration file of the `spsa-tune` binary.

use serde::{Deserialize, Serialize};
use spsa_types::{config_error, ConfigError, ParameterSpace, ParameterSpec, RunConfig, TuneError, TuneResult};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

use crate::builder::BuilderConfig;
use crate::catalog::default_parameters;
use crate::cutechess::MatchRunnerConfig;

/// Everything a tuning run needs, loaded from one JSON document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    pub run: RunConfig,

    /// Replaces the built-in catalog when present.
    pub parameters: Option<Vec<ParameterSpec>>,

    pub builder: BuilderConfig,

    pub match_runner: MatchRunnerConfig,

    /// Trajectory file, appended after every iteration.
    pub history_path: PathBuf,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            run: RunConfig::default(),
            parameters: None,
            builder: BuilderConfig::default(),
            match_runner: MatchRunnerConfig::default(),
            history_path: PathBuf::from("spsa_history.tsv"),
        }
    }
}

impl RunnerConfig {
    pub fn load_from_file(path: impl AsRef<Path>) -> TuneResult<Self> {
        let path = path.as_ref();
        info!("Loading configuration from: {}", path.display());
        let text = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save_to_file(&self, path: impl AsRef<Path>) -> TuneResult<()> {
        let text = serde_json::to_string_pretty(self)?;
        std::fs::write(path, text + "\n").map_err(TuneError::from)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.run.validate()?;
        self.builder.validate()?;
        self.match_runner.validate()?;
        if self.history_path.as_os_str().is_empty() {
            return Err(config_error!("history_path must not be empty"));
        }
        let space = self.space()?;
        // overrides must name catalog entries
        space.initial_with_overrides(&self.run.initial_overrides)?;
        space.initial_with_overrides(&self.run.reference_overrides)?;
        Ok(())
    }

    /// The configured parameter space, or the built-in catalog.
    pub fn space(&self) -> Result<Arc<ParameterSpace>, ConfigError> {
        let specs = self.parameters.clone().unwrap_or_else(default_parameters);
        ParameterSpace::shared(specs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn defaults_use_the_catalog() {
        let config = RunnerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.space().unwrap().len(), default_parameters().len());
    }

    #[test]
    fn save_then_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tune.json");
        let mut config = RunnerConfig::default();
        config.run = RunConfig::new(200).with_seed(11).with_verification_period(50);
        config.match_runner.concurrency = 8;
        config.save_to_file(&path).unwrap();

        let loaded = RunnerConfig::load_from_file(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn partial_documents_take_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tune.json");
        std::fs::write(
            &path,
            r#"{
                "run": { "num_iterations": 30 },
                "parameters": [
                    { "name": "lmr_base", "initial": 0.8, "min": 0.0, "max": 2.0, "step": 0.1, "kind": "continuous" }
                ],
                "match_runner": { "games": 4 }
            }"#,
        )
        .unwrap();

        let config = RunnerConfig::load_from_file(&path).unwrap();
        assert_eq!(config.run.num_iterations, 30);
        assert_eq!(config.match_runner.games, 4);
        assert_eq!(config.match_runner.concurrency, 48);
        assert_eq!(config.space().unwrap().len(), 1);
    }

    #[test]
    fn unknown_override_is_rejected() {
        let mut config = RunnerConfig::default();
        config.run = config.run.with_initial("no_such_parameter", 1.0);
        assert_eq!(
            config.validate(),
            Err(ConfigError::UnknownParameter {
                name: "no_such_parameter".into()
            })
        );
    }

    #[test]
    fn unknown_reference_override_is_rejected() {
        let mut config = RunnerConfig::default();
        config.run = config.run.with_reference("lmr_bsae", 0.9);
        assert!(matches!(config.validate(), Err(ConfigError::UnknownParameter { .. })));
    }

    #[test]
    fn malformed_file_is_a_serialization_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tune.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            RunnerConfig::load_from_file(&path),
            Err(TuneError::Serialization(_))
        ));
    }
}

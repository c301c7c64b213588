//! Realizes parameter vectors by rebuilding the engine from source.

use serde::{Deserialize, Serialize};
use spsa_optimizer::{CandidateSlot, Realizer};
use spsa_types::{config_error, BuildError, ConfigError, ParameterVector};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info};

use crate::process::{describe, run_captured, ProcessError};
use crate::source::render_constants;

/// How to turn a parameter vector into an engine binary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuilderConfig {
    /// Engine source tree; the build command runs here.
    pub source_dir: PathBuf,

    /// Constants module overwritten for every build, relative to `source_dir`.
    pub params_file: PathBuf,

    /// Program and arguments of the build.
    pub build_command: Vec<String>,

    /// Built binary, relative to `source_dir`.
    pub artifact: PathBuf,

    /// Directory the match runner starts engines from.
    pub engine_dir: PathBuf,

    /// Engines are installed as `<prefix>-plus`, `<prefix>-minus`, ...
    pub engine_prefix: String,

    /// Keep a `<prefix>-step-<n>` copy of every verification build.
    pub keep_verification_builds: bool,

    pub timeout_secs: Option<u64>,
}

impl Default for BuilderConfig {
    fn default() -> Self {
        Self {
            source_dir: PathBuf::from("engine"),
            params_file: PathBuf::from("src/searchparams.rs"),
            build_command: vec!["cargo".into(), "build".into(), "--release".into()],
            artifact: PathBuf::from("target/release/engine"),
            engine_dir: PathBuf::from("engines"),
            engine_prefix: "engine".into(),
            keep_verification_builds: true,
            timeout_secs: None,
        }
    }
}

impl BuilderConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.build_command.is_empty() || self.build_command[0].trim().is_empty() {
            return Err(config_error!("builder.build_command must name a program"));
        }
        if self.engine_prefix.trim().is_empty() {
            return Err(config_error!("builder.engine_prefix must not be empty"));
        }
        Ok(())
    }

    /// Installed engine name for a slot.
    pub fn engine_name(&self, slot: CandidateSlot) -> String {
        match slot {
            CandidateSlot::Plus => format!("{}-plus", self.engine_prefix),
            CandidateSlot::Minus => format!("{}-minus", self.engine_prefix),
            CandidateSlot::Verification { .. } => format!("{}-inter", self.engine_prefix),
            CandidateSlot::Reference => self.reference_name(),
        }
    }

    pub fn reference_name(&self) -> String {
        format!("{}-reference", self.engine_prefix)
    }

    /// Every engine name the tuner installs or expects.
    pub fn managed_names(&self) -> Vec<String> {
        vec![
            self.engine_name(CandidateSlot::Plus),
            self.engine_name(CandidateSlot::Minus),
            self.engine_name(CandidateSlot::Verification { iteration: 0 }),
            self.reference_name(),
        ]
    }
}

/// A built engine installed under a stable name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineHandle {
    pub name: String,
    pub path: PathBuf,
}

/// [`Realizer`] that writes the constants module, runs the build and copies
/// the binary into the engine directory.
#[derive(Debug, Clone)]
pub struct EngineBuilder {
    config: BuilderConfig,
}

impl EngineBuilder {
    pub fn new(config: BuilderConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &BuilderConfig {
        &self.config
    }

    fn write_source(&self, candidate: &ParameterVector) -> Result<(), BuildError> {
        let path = self.config.source_dir.join(&self.config.params_file);
        std::fs::write(&path, render_constants(candidate)).map_err(|source| BuildError::SourceWrite {
            path: path.display().to_string(),
            source,
        })
    }

    fn compile(&self) -> Result<(), BuildError> {
        let (program, args) = self
            .config
            .build_command
            .split_first()
            .ok_or_else(|| BuildError::CommandFailed {
                command: String::new(),
                status: "no build command configured".into(),
            })?;
        let described = describe(program, args);
        debug!("Running build: {described}");

        let mut command = Command::new(program);
        command.args(args).current_dir(&self.config.source_dir);
        let timeout = self.config.timeout_secs.map(Duration::from_secs);

        let output = run_captured(&mut command, timeout).map_err(|e| match e {
            ProcessError::Runtime(source) | ProcessError::Spawn(source) | ProcessError::Wait(source) => {
                BuildError::Spawn {
                    command: described.clone(),
                    source,
                }
            }
            ProcessError::TimedOut(secs) => BuildError::CommandFailed {
                command: described.clone(),
                status: format!("timeout after {secs} seconds"),
            },
        })?;

        if !output.success() {
            debug!("Build stderr:\n{}", output.stderr);
            return Err(BuildError::CommandFailed {
                command: described,
                status: output.status.to_string(),
            });
        }
        Ok(())
    }

    fn install(&self, name: &str) -> Result<PathBuf, BuildError> {
        let from = self.config.source_dir.join(&self.config.artifact);
        let to = self.config.engine_dir.join(name);
        copy_artifact(&from, &to)?;
        Ok(to)
    }
}

impl Realizer for EngineBuilder {
    type Handle = EngineHandle;

    fn realize(&mut self, candidate: &ParameterVector, slot: CandidateSlot) -> Result<EngineHandle, BuildError> {
        self.write_source(candidate)?;
        self.compile()?;

        let name = self.config.engine_name(slot);
        let path = self.install(&name)?;
        if let CandidateSlot::Verification { iteration } = slot {
            if self.config.keep_verification_builds {
                self.install(&format!("{}-step-{iteration}", self.config.engine_prefix))?;
            }
        }
        info!("Built {slot} engine {}", path.display());
        Ok(EngineHandle { name, path })
    }
}

fn copy_artifact(from: &Path, to: &Path) -> Result<(), BuildError> {
    let artifact_err = |message: String| BuildError::Artifact {
        path: from.display().to_string(),
        message,
    };
    if let Some(parent) = to.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| artifact_err(e.to_string()))?;
    }
    std::fs::copy(from, to).map_err(|e| artifact_err(format!("copy to {} failed: {e}", to.display())))?;
    Ok(())
}

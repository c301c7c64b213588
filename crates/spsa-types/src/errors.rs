use thiserror::Error;

/// Main error type for the tuner
#[derive(Error, Debug)]
pub enum TuneError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Build error: {0}")]
    Build(#[from] BuildError),

    #[error("Evaluation error: {0}")]
    Evaluation(#[from] EvaluationError),

    #[error("Verification error: {0}")]
    Verification(#[from] VerificationError),

    #[error("Trajectory error: {0}")]
    Trajectory(#[from] TrajectoryError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Parameter-space and run-configuration errors. Always fatal at startup.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Parameter space is empty")]
    EmptySpace,

    #[error("Duplicate parameter: {name}")]
    DuplicateParameter { name: String },

    #[error("Unknown parameter: {name}")]
    UnknownParameter { name: String },

    #[error("Missing parameter: {name}")]
    MissingParameter { name: String },

    #[error("Invalid parameter {name}: {message}")]
    InvalidParameter { name: String, message: String },

    #[error("Invalid bounds for {name}: min {min} is greater than max {max}")]
    InvalidBounds { name: String, min: f64, max: f64 },

    #[error("Negative step for {name}: {step}")]
    NegativeStep { name: String, step: f64 },

    #[error("Initial value {initial} of {name} lies outside [{min}, {max}]")]
    InitialOutOfBounds {
        name: String,
        initial: f64,
        min: f64,
        max: f64,
    },

    #[error("Vector length mismatch: expected {expected} values, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },

    #[error("Unsupported configuration version {found}, expected {expected}")]
    UnsupportedVersion { found: u32, expected: u32 },

    #[error("Invalid run configuration: {0}")]
    Invalid(String),
}

/// Failures while realizing a parameter vector as a runnable engine.
#[derive(Error, Debug)]
pub enum BuildError {
    #[error("Failed to write parameter source {path}: {source}")]
    SourceWrite {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to launch build command `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Build command `{command}` exited with {status}")]
    CommandFailed { command: String, status: String },

    #[error("Build artifact missing or not copyable: {path}: {message}")]
    Artifact { path: String, message: String },
}

/// Failures of the paired-trial evaluator. Fatal for the run.
#[derive(Error, Debug)]
pub enum EvaluationError {
    #[error("Failed to launch match runner `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Match runner exited with {status}")]
    CommandFailed { status: String },

    #[error("Match runner timed out after {timeout_seconds} seconds")]
    Timeout { timeout_seconds: u64 },

    #[error("Malformed match result: {message}")]
    MalformedOutput { message: String },

    #[error("Match runner setup failed: {message}")]
    Setup { message: String },
}

/// Failures of the verification harness. Logged, never fatal.
#[derive(Error, Debug)]
pub enum VerificationError {
    #[error("Failed to realize verification candidate: {0}")]
    Build(#[from] BuildError),

    #[error("Verification match failed: {0}")]
    Match(#[from] EvaluationError),

    #[error("Malformed rating estimate: {message}")]
    MalformedRating { message: String },
}

/// Trajectory persistence errors.
#[derive(Error, Debug)]
pub enum TrajectoryError {
    #[error("Failed to access trajectory file {path}: {message}")]
    Io { path: String, message: String },

    #[error("Trajectory header mismatch: expected [{expected}], found [{found}]")]
    HeaderMismatch { expected: String, found: String },

    #[error("Malformed trajectory row {line}: {message}")]
    MalformedRow { line: usize, message: String },

    #[error("Trajectory file {path} contains no snapshots")]
    Empty { path: String },
}

/// Result type alias for tuner operations
pub type TuneResult<T> = Result<T, TuneError>;

/// Macro for creating run-configuration errors
#[macro_export]
macro_rules! config_error {
    ($($arg:tt)*) => {
        $crate::ConfigError::Invalid(format!($($arg)*))
    };
}

/// Macro for creating internal errors
#[macro_export]
macro_rules! internal_error {
    ($($arg:tt)*) => {
        $crate::TuneError::Internal(format!($($arg)*))
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = ConfigError::InvalidBounds {
            name: "lmr_base".to_string(),
            min: 2.0,
            max: 1.0,
        };

        assert!(error.to_string().contains("lmr_base"));
        assert!(error.to_string().contains("min 2"));
        assert!(error.to_string().contains("max 1"));
    }

    #[test]
    fn test_error_conversion() {
        let eval_error = EvaluationError::MalformedOutput {
            message: "no score line".to_string(),
        };
        let tune_error: TuneError = eval_error.into();

        match tune_error {
            TuneError::Evaluation(_) => (),
            _ => panic!("Expected Evaluation error"),
        }
    }

    #[test]
    fn test_verification_wraps_build_failure() {
        let build = BuildError::CommandFailed {
            command: "./build".to_string(),
            status: "exit status: 2".to_string(),
        };
        let err: VerificationError = build.into();
        assert!(err.to_string().contains("exit status: 2"));
    }

    #[test]
    fn test_macros() {
        let config_err = config_error!("num_iterations must be positive, got {}", 0);
        assert!(matches!(config_err, ConfigError::Invalid(_)));
        let internal_err = internal_error!("Something went wrong");
        assert!(internal_err.to_string().contains("Something went wrong"));
    }
}

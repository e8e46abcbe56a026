//! Error types for modelgate-cli
//!
//! Exit codes are stable so CI scripts can branch on them. A completed run
//! exits 0 whatever the verdict unless `--fail-on` is given.

use modelgate::GateError;
use std::path::PathBuf;
use std::process::ExitCode;
use thiserror::Error;

/// Result type alias for CLI operations
pub(crate) type Result<T> = std::result::Result<T, CliError>;

/// CLI error types
#[derive(Error, Debug)]
pub(crate) enum CliError {
    /// Verdict at or below the `--fail-on` tier
    #[error("Verdict {0} does not meet the --fail-on gate")]
    VerdictGate(String),

    /// File not found
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    /// Invalid flag or configuration value
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Model could not be opened or described
    #[error("Model load failed: {0}")]
    ModelLoadFailed(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Any other library error
    #[error("Evaluation error: {0}")]
    Evaluation(String),
}

impl CliError {
    /// Get exit code for this error
    pub(crate) fn exit_code(&self) -> ExitCode {
        match self {
            Self::Evaluation(_) => ExitCode::from(1),
            Self::VerdictGate(_) => ExitCode::from(2),
            Self::FileNotFound(_) => ExitCode::from(3),
            Self::InvalidConfig(_) => ExitCode::from(5),
            Self::ModelLoadFailed(_) => ExitCode::from(6),
            Self::Io(_) => ExitCode::from(7),
        }
    }
}

impl From<GateError> for CliError {
    fn from(e: GateError) -> Self {
        if e.is_fatal() {
            return Self::ModelLoadFailed(e.to_string());
        }
        match e {
            GateError::Config { .. } | GateError::Serialization(_) => Self::InvalidConfig(e.to_string()),
            GateError::Io(io) => Self::Io(io),
            other => Self::Evaluation(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes_are_distinct() {
        let errors = [
            CliError::Evaluation("x".to_string()),
            CliError::VerdictGate("NOT_READY".to_string()),
            CliError::FileNotFound(PathBuf::from("m.onnx")),
            CliError::InvalidConfig("x".to_string()),
            CliError::ModelLoadFailed("x".to_string()),
            CliError::Io(std::io::Error::other("disk full")),
        ];
        let codes: Vec<String> = errors.iter().map(|e| format!("{:?}", e.exit_code())).collect();
        let mut unique = codes.clone();
        unique.sort();
        unique.dedup();
        assert_eq!(unique.len(), codes.len());
    }

    #[test]
    fn test_fatal_gate_error_maps_to_model_load() {
        let err: CliError = GateError::format("truncated protobuf").into();
        assert!(matches!(err, CliError::ModelLoadFailed(_)));
    }

    #[test]
    fn test_config_gate_error_maps_to_invalid_config() {
        let err: CliError = GateError::Config {
            param: "iterations".to_string(),
            constraint: "at least 1".to_string(),
        }
        .into();
        assert!(matches!(err, CliError::InvalidConfig(_)));
    }
}

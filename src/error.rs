//! Error types for modelgate operations.
//!
//! Two tiers exist. Errors raised while opening and describing the model
//! artifact are fatal for the whole run ([`GateError::is_fatal`]); every
//! error raised inside an evaluator is folded into that category's outcome
//! and never reaches the caller.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Main error type for modelgate operations.
///
/// # Examples
///
/// ```
/// use modelgate::error::GateError;
///
/// let err = GateError::DimensionMismatch {
///     context: "feature columns".to_string(),
///     expected: 4,
///     actual: 3,
/// };
/// assert!(err.to_string().contains("expected 4"));
/// assert!(!err.is_fatal());
/// ```
#[derive(Debug)]
pub enum GateError {
    /// The artifact could not be opened or no execution session could be created.
    ModelLoad {
        /// Artifact path
        path: PathBuf,
        /// Underlying reason
        reason: String,
    },

    /// The artifact bytes are not a well-formed model.
    Format {
        /// Error description
        message: String,
    },

    /// The model uses an operator the selected backend cannot execute.
    UnsupportedOperator {
        /// ONNX operator type
        op_type: String,
        /// Backend name
        backend: String,
    },

    /// Tensor or dataset dimensions don't match what the model declares.
    DimensionMismatch {
        /// What was being matched
        context: String,
        /// Expected size
        expected: usize,
        /// Actual size
        actual: usize,
    },

    /// An inference call raised.
    Inference {
        /// Error description
        message: String,
    },

    /// A tabular dataset could not be used.
    Dataset {
        /// Dataset path
        path: PathBuf,
        /// Error description
        message: String,
    },

    /// The evaluation budget ran out.
    Timeout {
        /// Budget that was exceeded
        budget: Duration,
    },

    /// The evaluation was cancelled by the caller.
    Cancelled,

    /// Invalid configuration value.
    Config {
        /// Parameter name
        param: String,
        /// Constraint description
        constraint: String,
    },

    /// I/O error (file not found, permission denied, etc.).
    Io(std::io::Error),

    /// Serialization/deserialization error.
    Serialization(String),
}

impl fmt::Display for GateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GateError::ModelLoad { path, reason } => {
                write!(f, "Failed to load model {}: {reason}", path.display())
            }
            GateError::Format { message } => write!(f, "Invalid model format: {message}"),
            GateError::UnsupportedOperator { op_type, backend } => {
                write!(f, "Operator '{op_type}' is not supported by the {backend} backend")
            }
            GateError::DimensionMismatch {
                context,
                expected,
                actual,
            } => {
                write!(f, "Dimension mismatch in {context}: expected {expected}, got {actual}")
            }
            GateError::Inference { message } => write!(f, "Inference failed: {message}"),
            GateError::Dataset { path, message } => {
                write!(f, "Dataset {}: {message}", path.display())
            }
            GateError::Timeout { budget } => {
                write!(f, "Evaluation budget of {:.1}s exceeded", budget.as_secs_f64())
            }
            GateError::Cancelled => write!(f, "Evaluation cancelled"),
            GateError::Config { param, constraint } => {
                write!(f, "Invalid configuration: {param} must be {constraint}")
            }
            GateError::Io(e) => write!(f, "I/O error: {e}"),
            GateError::Serialization(msg) => write!(f, "Serialization error: {msg}"),
        }
    }
}

impl std::error::Error for GateError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            GateError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for GateError {
    fn from(err: std::io::Error) -> Self {
        GateError::Io(err)
    }
}

impl From<serde_json::Error> for GateError {
    fn from(err: serde_json::Error) -> Self {
        GateError::Serialization(err.to_string())
    }
}

impl From<csv::Error> for GateError {
    fn from(err: csv::Error) -> Self {
        match err.into_kind() {
            csv::ErrorKind::Io(e) => GateError::Io(e),
            other => GateError::Serialization(format!("CSV: {other:?}")),
        }
    }
}

impl GateError {
    /// Create an inference error from any displayable cause
    #[must_use]
    pub fn inference(message: impl fmt::Display) -> Self {
        Self::Inference {
            message: message.to_string(),
        }
    }

    /// Create a format error
    #[must_use]
    pub fn format(message: impl Into<String>) -> Self {
        Self::Format {
            message: message.into(),
        }
    }

    /// Create a dataset error
    #[must_use]
    pub fn dataset(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Dataset {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a dimension mismatch error with descriptive context
    #[must_use]
    pub fn dimension_mismatch(context: impl Into<String>, expected: usize, actual: usize) -> Self {
        Self::DimensionMismatch {
            context: context.into(),
            expected,
            actual,
        }
    }

    /// Whether this error aborts the whole evaluation run.
    ///
    /// Only failures to open and describe the artifact are fatal.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::ModelLoad { .. } | Self::Format { .. } | Self::UnsupportedOperator { .. }
        )
    }

    /// Whether this error came from the evaluation budget rather than the model.
    #[must_use]
    pub const fn is_interrupt(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::Cancelled)
    }
}

/// Convenience type alias for Results.
pub type Result<T> = std::result::Result<T, GateError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_load_display() {
        let err = GateError::ModelLoad {
            path: PathBuf::from("model.onnx"),
            reason: "truncated".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("model.onnx"));
        assert!(msg.contains("truncated"));
    }

    #[test]
    fn test_fatal_tier() {
        assert!(GateError::format("bad tag").is_fatal());
        assert!(GateError::UnsupportedOperator {
            op_type: "Loop".to_string(),
            backend: "native".to_string(),
        }
        .is_fatal());
        assert!(!GateError::inference("boom").is_fatal());
        assert!(!GateError::dataset("train.csv", "empty").is_fatal());
        assert!(!GateError::Cancelled.is_fatal());
    }

    #[test]
    fn test_interrupt_tier() {
        assert!(GateError::Timeout {
            budget: Duration::from_secs(1)
        }
        .is_interrupt());
        assert!(GateError::Cancelled.is_interrupt());
        assert!(!GateError::inference("x").is_interrupt());
    }

    #[test]
    fn test_io_source() {
        use std::error::Error;
        let err: GateError = std::io::Error::new(std::io::ErrorKind::NotFound, "gone").into();
        assert!(err.source().is_some());
        assert!(err.to_string().contains("gone"));
    }

    #[test]
    fn test_json_conversion() {
        let parse: std::result::Result<serde_json::Value, _> = serde_json::from_str("{");
        let err: GateError = parse.unwrap_err().into();
        assert!(matches!(err, GateError::Serialization(_)));
    }

    #[test]
    fn test_timeout_display() {
        let err = GateError::Timeout {
            budget: Duration::from_millis(2500),
        };
        assert_eq!(err.to_string(), "Evaluation budget of 2.5s exceeded");
    }
}

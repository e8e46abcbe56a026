//! Modelgate: deployment-readiness evaluation for exported ONNX classifiers.
//!
//! Modelgate takes a model converted from a training framework, runs it
//! through a fixed battery of checks and produces a 100-point
//! [`report::DeploymentReport`] with a verdict and concrete recommendations.
//!
//! # Quick Start
//!
//! ```no_run
//! use modelgate::prelude::*;
//! use std::path::Path;
//!
//! let report = Evaluation::new("model.onnx")
//!     .with_labeled_data("validation.csv")
//!     .with_edge_cases("edge_cases.csv")
//!     .with_config(EvaluationConfig::default().with_iterations(200))
//!     .run()
//!     .unwrap();
//!
//! println!("{}", ReportEmitter::summary(&report));
//! ReportEmitter::write(&report, Path::new("readiness.json")).unwrap();
//! assert!(report.total_score <= report.max_score);
//! ```
//!
//! # Modules
//!
//! - [`format`]: ONNX artifact reader and in-memory test models
//! - [`runtime`]: Inference backends (native interpreter, ONNX Runtime, recorded outputs)
//! - [`inspect`]: Model loading, signature and compatibility inspection
//! - [`data`]: CSV dataset loading for labeled and edge-case data
//! - [`preprocessing`]: Feature scaling applied before inference
//! - [`qa`]: The six readiness categories and their evaluators
//! - [`scoring`]: 100-point readiness scoring and verdicts
//! - [`report`]: Deployment report assembly and emission
//! - [`pipeline`]: End-to-end evaluation runs

pub mod data;
pub mod error;
pub mod format;
pub mod inspect;
pub mod pipeline;
pub mod preprocessing;
pub mod qa;
pub mod report;
pub mod runtime;
pub mod scoring;

pub use error::{GateError, Result};
pub use pipeline::{Evaluation, EvaluationConfig};
pub use report::{DeploymentReport, ReportEmitter};

/// Common imports for evaluation runs
pub mod prelude {
    pub use crate::error::{GateError, Result};
    pub use crate::pipeline::{Evaluation, EvaluationConfig};
    pub use crate::preprocessing::{FeatureScaler, Preprocessor};
    pub use crate::qa::{Budget, CategoryKind, CategoryOutcome, Rating, Status};
    pub use crate::report::{DeploymentReport, ReportEmitter};
    pub use crate::scoring::{ReadinessScorer, ScoringConfig, Verdict};
}

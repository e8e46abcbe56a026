//! Readiness categories and the evaluators that measure them.
//!
//! Six categories make up the 100-point catalog:
//!
//! | Category | Evaluator | Needs |
//! |----------|-----------|-------|
//! | Model Loading | [`crate::inspect::ModelInspector`] | model |
//! | Input Validation | [`probe::SyntheticInputProbe`] | model |
//! | Performance | [`latency::PerformanceBenchmarker`] | model |
//! | Accuracy | [`accuracy::LabeledAccuracyEvaluator`] | labeled dataset |
//! | Edge Cases | [`edge_cases::EdgeCaseEvaluator`] | edge-case dataset |
//! | Consistency | [`consistency::CrossImplementationComparator`] | reference model |
//!
//! Evaluators never return errors. Whatever goes wrong inside one is
//! folded into its [`Observation`], and [`crate::scoring::ReadinessScorer`]
//! turns observations into [`CategoryOutcome`]s.
//!
//! # Example
//! ```
//! use modelgate::qa::{CategoryKind, Rating};
//!
//! assert_eq!(CategoryKind::all().len(), 6);
//! assert_eq!(Rating::from_score(0.875, [0.90, 0.80, 0.70]), Rating::Good);
//! ```

pub mod accuracy;
pub mod consistency;
pub mod edge_cases;
pub mod latency;
pub mod probe;

use crate::data::Dataset;
use crate::error::{GateError, Result};
use crate::runtime::{NamedTensors, Tensor, TensorSpec};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

pub use accuracy::AccuracyResult;
pub use consistency::ComparisonResult;
pub use edge_cases::EdgeCaseResult;
pub use latency::BenchmarkSummary;
pub use probe::ProbeReport;

/// The closed set of readiness categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CategoryKind {
    ModelLoading,
    InputValidation,
    Performance,
    Accuracy,
    EdgeCases,
    Consistency,
}

impl CategoryKind {
    /// All categories in report order
    #[must_use]
    pub const fn all() -> [Self; 6] {
        [
            Self::ModelLoading,
            Self::InputValidation,
            Self::Performance,
            Self::Accuracy,
            Self::EdgeCases,
            Self::Consistency,
        ]
    }

    /// Get display name
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::ModelLoading => "Model Loading",
            Self::InputValidation => "Input Validation",
            Self::Performance => "Performance",
            Self::Accuracy => "Accuracy",
            Self::EdgeCases => "Edge Cases",
            Self::Consistency => "Consistency",
        }
    }
}

impl fmt::Display for CategoryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Category status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    Pass,
    Fail,
    /// Required input was not supplied; scores zero without counting as a failure
    NotTested,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Pass => "PASS",
            Self::Fail => "FAIL",
            Self::NotTested => "NOT_TESTED",
        })
    }
}

/// Four-tier rating shared by latency, accuracy and edge-case results
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Rating {
    Excellent,
    Good,
    Acceptable,
    Poor,
}

impl Rating {
    /// Rate a higher-is-better score against `[excellent, good, acceptable]` minimums
    #[must_use]
    pub fn from_score(score: f64, thresholds: [f64; 3]) -> Self {
        if score >= thresholds[0] {
            Self::Excellent
        } else if score >= thresholds[1] {
            Self::Good
        } else if score >= thresholds[2] {
            Self::Acceptable
        } else {
            Self::Poor
        }
    }

    /// Rate a lower-is-better latency against `[excellent, good, acceptable]` limits
    #[must_use]
    pub fn from_latency(ms: f64, limits: [f64; 3]) -> Self {
        if ms < limits[0] {
            Self::Excellent
        } else if ms < limits[1] {
            Self::Good
        } else if ms < limits[2] {
            Self::Acceptable
        } else {
            Self::Poor
        }
    }
}

impl fmt::Display for Rating {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Excellent => "EXCELLENT",
            Self::Good => "GOOD",
            Self::Acceptable => "ACCEPTABLE",
            Self::Poor => "POOR",
        })
    }
}

/// What the model-loading category observed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadingResult {
    pub backend: String,
    pub size_bytes: u64,
    pub input_count: usize,
    pub output_count: usize,
}

/// Raw evidence produced by one evaluator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Evidence {
    Loading(LoadingResult),
    Probe(ProbeReport),
    Performance(BenchmarkSummary),
    Accuracy(AccuracyResult),
    EdgeCases(EdgeCaseResult),
    Consistency(ComparisonResult),
}

impl Evidence {
    /// Category this evidence belongs to
    #[must_use]
    pub const fn category(&self) -> CategoryKind {
        match self {
            Self::Loading(_) => CategoryKind::ModelLoading,
            Self::Probe(_) => CategoryKind::InputValidation,
            Self::Performance(_) => CategoryKind::Performance,
            Self::Accuracy(_) => CategoryKind::Accuracy,
            Self::EdgeCases(_) => CategoryKind::EdgeCases,
            Self::Consistency(_) => CategoryKind::Consistency,
        }
    }
}

/// Result of running one evaluator
#[derive(Debug, Clone, PartialEq)]
pub enum Observation {
    /// The evaluator ran to completion
    Measured(Evidence),
    /// The evaluator was attempted and failed
    Failed(String),
    /// The evaluator's optional input was not supplied
    NotTested(String),
}

impl Observation {
    /// Fold a recoverable error into a failed observation
    #[must_use]
    pub fn from_error(err: &GateError) -> Self {
        Self::Failed(err.to_string())
    }
}

/// Scored result of one category
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryOutcome {
    pub category: CategoryKind,
    pub status: Status,
    pub points_earned: f64,
    pub points_possible: f64,
    pub details: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evidence: Option<Evidence>,
}

impl CategoryOutcome {
    /// Whether the category earned its full budget
    #[must_use]
    pub fn is_perfect(&self) -> bool {
        self.status == Status::Pass && self.points_earned >= self.points_possible
    }
}

/// Time and cancellation budget shared by all evaluators of a run.
///
/// Long loops call [`Budget::check`] between inference calls. A single call
/// that never returns cannot be interrupted.
#[derive(Debug, Clone)]
pub struct Budget {
    started: Instant,
    limit: Option<Duration>,
    cancelled: Arc<AtomicBool>,
}

impl Default for Budget {
    fn default() -> Self {
        Self::unlimited()
    }
}

impl Budget {
    /// Budget expiring `limit` after creation
    #[must_use]
    pub fn new(limit: Duration) -> Self {
        Self {
            started: Instant::now(),
            limit: Some(limit),
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    #[must_use]
    pub fn unlimited() -> Self {
        Self {
            started: Instant::now(),
            limit: None,
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Share an externally owned cancellation flag
    #[must_use]
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancelled = flag;
        self
    }

    /// Flag that cancels every evaluator holding this budget
    #[must_use]
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancelled)
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Fail with [`GateError::Cancelled`] or [`GateError::Timeout`] once exhausted
    pub fn check(&self) -> Result<()> {
        if self.cancelled.load(Ordering::SeqCst) {
            return Err(GateError::Cancelled);
        }
        match self.limit {
            Some(limit) if self.started.elapsed() >= limit => {
                Err(GateError::Timeout { budget: limit })
            }
            _ => Ok(()),
        }
    }
}

/// Failure reason for datasets whose feature columns hold raw text
pub const TEXT_DATA_REASON: &str = "dataset contains raw text; supply preprocessed numeric features";

/// Reject a dataset that cannot be fed to `spec` at all
pub(crate) fn check_dataset(dataset: &Dataset, spec: &TensorSpec) -> std::result::Result<(), String> {
    if dataset.text_detected {
        return Err(TEXT_DATA_REASON.to_string());
    }
    if dataset.rows.is_empty() {
        return Err(if dataset.records_read == 0 {
            format!("dataset {} has no rows", dataset.path.display())
        } else {
            format!(
                "all {} rows of {} were malformed",
                dataset.records_read,
                dataset.path.display()
            )
        });
    }
    match spec.fixed_last_dim() {
        Some(expected) if expected != dataset.feature_count() => Err(format!(
            "dataset has {} feature columns, model input '{}' expects {expected}",
            dataset.feature_count(),
            spec.name
        )),
        _ => Ok(()),
    }
}

/// Whether `spec` accepts more than one row per call
pub(crate) fn supports_batching(spec: &TensorSpec) -> bool {
    spec.shape.is_empty() || (spec.shape.len() >= 2 && spec.shape[0].is_dynamic())
}

/// Stack feature rows into one input tensor shaped for `spec`
pub(crate) fn rows_tensor(spec: &TensorSpec, rows: &[Vec<f32>]) -> Result<Tensor> {
    let width = rows.first().map_or(0, Vec::len);
    let shape = if spec.shape.is_empty() {
        vec![rows.len(), width]
    } else {
        let mut shape = spec.concrete_shape(rows.len());
        if let Some(last) = shape.last_mut() {
            *last = width;
        }
        shape
    };
    let mut data = Vec::with_capacity(rows.len() * width);
    for row in rows {
        if row.len() != width {
            return Err(GateError::dimension_mismatch("feature row", width, row.len()));
        }
        data.extend_from_slice(row);
    }
    Tensor::new(shape, data)
}

/// Check that every output is finite and matches its declared shape
pub(crate) fn validate_outputs(
    outputs: &NamedTensors,
    specs: &[TensorSpec],
) -> std::result::Result<(), String> {
    if outputs.is_empty() {
        return Err("model returned no outputs".to_string());
    }
    for (name, tensor) in outputs {
        if let Some(bad) = tensor.data.iter().find(|v| !v.is_finite()) {
            return Err(format!("output '{name}' contains non-finite value {bad}"));
        }
        if let Some(spec) = specs.iter().find(|s| s.name == *name) {
            if !spec.accepts(&tensor.shape) {
                return Err(format!(
                    "output '{name}' has shape {:?}, model declares {}",
                    tensor.shape,
                    spec.shape_string()
                ));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
#[path = "qa_tests.rs"]
mod tests;

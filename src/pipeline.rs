//! End-to-end readiness evaluation.
//!
//! [`Evaluation`] wires the inspector, the five evaluators, the scorer and
//! the report together. Only inspection failures abort a run; every other
//! problem becomes a FAIL or NOT_TESTED category in the report.
//!
//! # Example
//!
//! ```rust,ignore
//! use modelgate::pipeline::Evaluation;
//!
//! let report = Evaluation::new("model.onnx")
//!     .with_labeled_data("validation.csv")
//!     .with_edge_cases("edge_cases.csv")
//!     .run()?;
//! println!("{} ({:.1}/100)", report.verdict, report.total_score);
//! ```

use crate::error::{GateError, Result};
use crate::inspect::{Compatibility, ModelInspector};
use crate::preprocessing::{FeatureScaler, Preprocessor};
use crate::qa::accuracy::{LabeledAccuracyEvaluator, DEFAULT_BATCH_SIZE};
use crate::qa::consistency::CrossImplementationComparator;
use crate::qa::edge_cases::EdgeCaseEvaluator;
use crate::qa::latency::PerformanceBenchmarker;
use crate::qa::probe::SyntheticInputProbe;
use crate::qa::{rows_tensor, Budget, CategoryKind, Evidence, LoadingResult, Observation};
use crate::report::DeploymentReport;
use crate::runtime::{self, Backend, SharedSession, Tensor};
use crate::scoring::{ReadinessScorer, ScoringConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Run-level settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EvaluationConfig {
    /// Timed benchmark calls
    pub iterations: usize,
    /// Untimed calls before the benchmark
    pub warmup: usize,
    /// Overall budget for all evaluators
    pub timeout_secs: f64,
    /// Seed for the `normal` probe input
    pub seed: u64,
    /// Rows per call in the accuracy category
    pub batch_size: usize,
    pub scoring: ScoringConfig,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            iterations: 100,
            warmup: 1,
            timeout_secs: 300.0,
            seed: 42,
            batch_size: DEFAULT_BATCH_SIZE,
            scoring: ScoringConfig::default(),
        }
    }
}

impl EvaluationConfig {
    /// Load an overlay; missing keys keep their defaults
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    #[must_use]
    pub fn with_iterations(mut self, iterations: usize) -> Self {
        self.iterations = iterations;
        self
    }

    #[must_use]
    pub fn with_warmup(mut self, warmup: usize) -> Self {
        self.warmup = warmup;
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_secs = timeout.as_secs_f64();
        self
    }

    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    #[must_use]
    pub fn with_scoring(mut self, scoring: ScoringConfig) -> Self {
        self.scoring = scoring;
        self
    }

    /// Overall time budget
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs_f64(self.timeout_secs.max(0.0))
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |param: &str, constraint: &str| GateError::Config {
            param: param.to_string(),
            constraint: constraint.to_string(),
        };
        if self.iterations == 0 {
            return Err(invalid("iterations", "at least 1"));
        }
        if !self.timeout_secs.is_finite() || self.timeout_secs <= 0.0 {
            return Err(invalid("timeoutSecs", "a positive number of seconds"));
        }
        if self.batch_size == 0 {
            return Err(invalid("batchSize", "at least 1"));
        }
        self.scoring.validate()
    }
}

/// One readiness evaluation, configured with `with_*` methods
pub struct Evaluation {
    model: PathBuf,
    labeled_data: Option<PathBuf>,
    edge_cases: Option<PathBuf>,
    reference: Option<PathBuf>,
    scaler: Option<PathBuf>,
    samples: Vec<Vec<f32>>,
    benchmark_input: Option<Vec<f32>>,
    backend: Option<Box<dyn Backend>>,
    cancel: Option<Arc<AtomicBool>>,
    config: EvaluationConfig,
}

impl std::fmt::Debug for Evaluation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Evaluation")
            .field("model", &self.model)
            .field("labeled_data", &self.labeled_data)
            .field("edge_cases", &self.edge_cases)
            .field("reference", &self.reference)
            .field("scaler", &self.scaler)
            .field("samples", &self.samples.len())
            .field("backend", &self.backend.as_ref().map(|b| b.name()))
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Evaluation {
    /// Evaluate the artifact at `model`
    #[must_use]
    pub fn new(model: impl Into<PathBuf>) -> Self {
        Self {
            model: model.into(),
            labeled_data: None,
            edge_cases: None,
            reference: None,
            scaler: None,
            samples: Vec::new(),
            benchmark_input: None,
            backend: None,
            cancel: None,
            config: EvaluationConfig::default(),
        }
    }

    /// CSV with features and a trailing label column
    #[must_use]
    pub fn with_labeled_data(mut self, path: impl Into<PathBuf>) -> Self {
        self.labeled_data = Some(path.into());
        self
    }

    /// CSV of boundary rows
    #[must_use]
    pub fn with_edge_cases(mut self, path: impl Into<PathBuf>) -> Self {
        self.edge_cases = Some(path.into());
        self
    }

    /// Reference model, or a `.json` recording of its outputs
    #[must_use]
    pub fn with_reference(mut self, path: impl Into<PathBuf>) -> Self {
        self.reference = Some(path.into());
        self
    }

    /// `scaler.json` applied to dataset features
    #[must_use]
    pub fn with_scaler(mut self, path: impl Into<PathBuf>) -> Self {
        self.scaler = Some(path.into());
        self
    }

    /// Extra feature row shared by both models in the consistency check
    #[must_use]
    pub fn with_sample(mut self, features: Vec<f32>) -> Self {
        self.samples.push(features);
        self
    }

    /// Feature row to benchmark instead of the `normal` probe input
    #[must_use]
    pub fn with_benchmark_input(mut self, features: Vec<f32>) -> Self {
        self.benchmark_input = Some(features);
        self
    }

    /// Backend for the model; defaults to [`runtime::default_backend`]
    #[must_use]
    pub fn with_backend(mut self, backend: Box<dyn Backend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Flag that cancels the run when set
    #[must_use]
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    #[must_use]
    pub fn with_config(mut self, config: EvaluationConfig) -> Self {
        self.config = config;
        self
    }

    /// Run every category and assemble the report.
    ///
    /// # Errors
    ///
    /// Returns an error only for an invalid configuration or when the model
    /// cannot be inspected ([`GateError::is_fatal`]).
    pub fn run(mut self) -> Result<DeploymentReport> {
        self.config.validate()?;
        let backend = self.backend.take().unwrap_or_else(runtime::default_backend);
        let config = &self.config;
        let mut budget = Budget::new(config.timeout());
        if let Some(flag) = &self.cancel {
            budget = budget.with_cancel_flag(Arc::clone(flag));
        }

        let inspector = ModelInspector::new(backend);
        let (descriptor, session) = inspector.inspect(&self.model)?;
        let primary = descriptor
            .primary_input()
            .cloned()
            .ok_or_else(|| GateError::format("model declares no inputs"))?;

        let scaler: Option<std::result::Result<Arc<dyn Preprocessor>, String>> =
            self.scaler.as_deref().map(|path| {
                FeatureScaler::from_file(path)
                    .map(|s| Arc::new(s) as Arc<dyn Preprocessor>)
                    .map_err(|e| format!("scaler {}: {e}", path.display()))
            });
        if let Some(Err(reason)) = &scaler {
            warn!(%reason, "scaler unusable");
        }
        let preprocessor = scaler.as_ref().and_then(|s| s.as_ref().ok()).cloned();
        let scaler_error = scaler.and_then(std::result::Result::err);

        let probe = SyntheticInputProbe::new(config.seed);
        let normal = probe.normal_input(&primary)?;
        let benchmark_input = match &self.benchmark_input {
            Some(row) => rows_tensor(&primary, std::slice::from_ref(row)),
            None => Ok(normal.clone()),
        };

        let scorer = ReadinessScorer::new(config.scoring.clone());
        let mut outcomes = Vec::with_capacity(CategoryKind::all().len());
        for category in CategoryKind::all() {
            info!(%category, "evaluating");
            let observation = match category {
                CategoryKind::ModelLoading => Observation::Measured(Evidence::Loading(LoadingResult {
                    backend: descriptor.backend.clone(),
                    size_bytes: descriptor.size_bytes,
                    input_count: descriptor.inputs.len(),
                    output_count: descriptor.outputs.len(),
                })),
                CategoryKind::InputValidation => probe.run(&session, &budget),
                CategoryKind::Performance => match &benchmark_input {
                    Ok(input) => PerformanceBenchmarker::new(config.iterations, config.warmup).run(
                        &session,
                        input,
                        &config.scoring,
                        &budget,
                    ),
                    Err(e) => Observation::Failed(format!("benchmark input: {e}")),
                },
                CategoryKind::Accuracy => match (&self.labeled_data, &scaler_error) {
                    (Some(_), Some(reason)) => Observation::Failed(reason.clone()),
                    (path, _) => {
                        let mut evaluator = LabeledAccuracyEvaluator::new().with_batch_size(config.batch_size);
                        if let Some(p) = &preprocessor {
                            evaluator = evaluator.with_preprocessor(Arc::clone(p));
                        }
                        evaluator.run(&session, path.as_deref(), &config.scoring, &budget)
                    }
                },
                CategoryKind::EdgeCases => match (&self.edge_cases, &scaler_error) {
                    (Some(_), Some(reason)) => Observation::Failed(reason.clone()),
                    (path, _) => {
                        let mut evaluator = EdgeCaseEvaluator::new();
                        if let Some(p) = &preprocessor {
                            evaluator = evaluator.with_preprocessor(Arc::clone(p));
                        }
                        evaluator.run(&session, path.as_deref(), &config.scoring, &budget)
                    }
                },
                CategoryKind::Consistency => self.compare(&inspector, &session, &normal, &budget),
            };
            let outcome = scorer.outcome(category, observation);
            info!(
                %category,
                status = %outcome.status,
                points = outcome.points_earned,
                possible = outcome.points_possible,
                "category scored"
            );
            outcomes.push(outcome);
        }

        let score = scorer.score(&outcomes);
        let performance = outcomes.iter().find_map(|o| match &o.evidence {
            Some(Evidence::Performance(summary)) => Some(summary.rating),
            _ => None,
        });
        let compatibility = Compatibility::assess(&descriptor, performance);
        info!(
            total = score.total_score,
            verdict = %score.verdict,
            elapsed_ms = budget.elapsed().as_millis() as u64,
            "evaluation finished"
        );
        Ok(DeploymentReport::new(descriptor, outcomes, score, compatibility))
    }

    fn compare(
        &self,
        inspector: &ModelInspector,
        session: &SharedSession,
        normal: &Tensor,
        budget: &Budget,
    ) -> Observation {
        let Some(path) = &self.reference else {
            return CrossImplementationComparator::new().run(session, None, &[], &self.config.scoring, budget);
        };
        let reference = match runtime::open_reference(path, inspector.backend()) {
            Ok(reference) => SharedSession::new(reference),
            Err(e) => {
                warn!(error = %e, "reference model unusable");
                return Observation::from_error(&e);
            }
        };
        let Some(spec) = session.signature().inputs.first() else {
            return Observation::Failed("model declares no inputs".to_string());
        };
        let mut inputs = vec![normal.clone()];
        for sample in &self.samples {
            match rows_tensor(spec, std::slice::from_ref(sample)) {
                Ok(tensor) => inputs.push(tensor),
                Err(e) => return Observation::Failed(format!("sample input: {e}")),
            }
        }
        CrossImplementationComparator::new().run(session, Some(&reference), &inputs, &self.config.scoring, budget)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = EvaluationConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.iterations, 100);
        assert_eq!(config.warmup, 1);
        assert_eq!(config.timeout(), Duration::from_secs(300));
        assert_eq!(config.seed, 42);
    }

    #[test]
    fn test_config_builders() {
        let config = EvaluationConfig::default()
            .with_iterations(5)
            .with_warmup(0)
            .with_timeout(Duration::from_millis(1500))
            .with_seed(7);
        assert_eq!(config.iterations, 5);
        assert_eq!(config.warmup, 0);
        assert_eq!(config.timeout_secs, 1.5);
        assert_eq!(config.seed, 7);
    }

    #[test]
    fn test_invalid_config_rejected() {
        assert!(EvaluationConfig::default().with_iterations(0).validate().is_err());
        let mut config = EvaluationConfig::default();
        config.timeout_secs = 0.0;
        assert!(matches!(config.validate(), Err(GateError::Config { .. })));
    }

    #[test]
    fn test_config_overlay_from_json() {
        let config: EvaluationConfig =
            serde_json::from_str(r#"{"iterations": 10, "scoring": {"verdict": [90, 75]}}"#).unwrap();
        assert_eq!(config.iterations, 10);
        assert_eq!(config.warmup, 1);
        assert_eq!(config.scoring.verdict, [90.0, 75.0]);
        assert_eq!(config.scoring.accuracy, [0.90, 0.80, 0.70]);
    }

    #[test]
    fn test_missing_model_is_fatal() {
        let err = Evaluation::new("/nonexistent/model.onnx").run().unwrap_err();
        assert!(err.is_fatal());
        assert!(matches!(err, GateError::ModelLoad { .. }));
    }

    #[test]
    fn test_debug_lists_inputs() {
        let evaluation = Evaluation::new("m.onnx").with_sample(vec![1.0]).with_labeled_data("d.csv");
        let text = format!("{evaluation:?}");
        assert!(text.contains("m.onnx"));
        assert!(text.contains("d.csv"));
    }
}

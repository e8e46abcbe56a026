//! Edge-case robustness evaluation.
//!
//! Feeds a dataset of boundary rows (blank fields, extreme magnitudes,
//! all-zero rows) through the model one row at a time. A row succeeds when
//! inference returns finite, correctly shaped outputs; labels are ignored.

use super::{check_dataset, rows_tensor, validate_outputs, Budget, Evidence, Observation, Rating};
use crate::data::{Dataset, DatasetReader};
use crate::preprocessing::Preprocessor;
use crate::runtime::SharedSession;
use crate::scoring::ScoringConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Failed rows kept in the evidence
pub const MAX_REPORTED_FAILURES: usize = 20;

/// One edge-case row that did not produce a usable output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeCaseFailure {
    /// 1-based data row number in the source file
    pub row: usize,
    pub reason: String,
}

/// Evidence of the edge-case category
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeCaseResult {
    pub sample_count: usize,
    pub success_count: usize,
    pub success_rate: f64,
    pub rating: Rating,
    pub skipped_rows: usize,
    /// First [`MAX_REPORTED_FAILURES`] failures
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<EdgeCaseFailure>,
}

impl EdgeCaseResult {
    #[must_use]
    pub fn from_counts(success_count: usize, sample_count: usize, thresholds: [f64; 3]) -> Self {
        let success_count = success_count.min(sample_count);
        let success_rate = if sample_count == 0 {
            0.0
        } else {
            success_count as f64 / sample_count as f64
        };
        Self {
            sample_count,
            success_count,
            success_rate,
            rating: Rating::from_score(success_rate, thresholds),
            skipped_rows: 0,
            failures: Vec::new(),
        }
    }
}

/// Runs boundary rows through the model
#[derive(Clone, Default)]
pub struct EdgeCaseEvaluator {
    preprocessor: Option<Arc<dyn Preprocessor>>,
}

impl std::fmt::Debug for EdgeCaseEvaluator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EdgeCaseEvaluator")
            .field("preprocessor", &self.preprocessor.as_ref().map(|p| p.describe()))
            .finish()
    }
}

impl EdgeCaseEvaluator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Preprocessor applied when its expected length matches the dataset
    #[must_use]
    pub fn with_preprocessor(mut self, preprocessor: Arc<dyn Preprocessor>) -> Self {
        self.preprocessor = Some(preprocessor);
        self
    }

    /// Evaluate the dataset at `path`; `None` leaves the category untested
    pub fn run(
        &self,
        session: &SharedSession,
        path: Option<&Path>,
        config: &ScoringConfig,
        budget: &Budget,
    ) -> Observation {
        let Some(path) = path else {
            return Observation::NotTested("no edge-case dataset supplied".to_string());
        };
        let expected = session
            .signature()
            .inputs
            .first()
            .and_then(|spec| spec.fixed_last_dim());
        let dataset = DatasetReader::column_count(path)
            .and_then(|columns| DatasetReader::edge_cases(columns, expected).read(path));
        match dataset {
            Ok(dataset) => self.evaluate(session, &dataset, config, budget),
            Err(e) => {
                warn!(error = %e, "edge-case dataset unusable");
                Observation::from_error(&e)
            }
        }
    }

    /// Evaluate an already parsed dataset
    pub fn evaluate(
        &self,
        session: &SharedSession,
        dataset: &Dataset,
        config: &ScoringConfig,
        budget: &Budget,
    ) -> Observation {
        let signature = session.signature();
        let Some(spec) = signature.inputs.first() else {
            return Observation::Failed("model declares no inputs".to_string());
        };
        if let Err(reason) = check_dataset(dataset, spec) {
            return Observation::Failed(reason);
        }
        let preprocessor = self
            .preprocessor
            .as_ref()
            .filter(|p| p.expected_len() == Some(dataset.feature_count()));
        if self.preprocessor.is_some() && preprocessor.is_none() {
            debug!("scaler length differs from edge-case features; using raw values");
        }

        let total = dataset.rows.len();
        let mut success_count = 0usize;
        let mut failure_count = 0usize;
        let mut failures = Vec::new();
        for (idx, row) in dataset.rows.iter().enumerate() {
            if let Err(e) = budget.check() {
                return Observation::Failed(format!("{e} after {idx} of {total} rows"));
            }
            let mut features = row.features.clone();
            let outcome = preprocessor
                .map_or(Ok(()), |p| p.apply(&mut features))
                .and_then(|()| rows_tensor(spec, &[features]))
                .and_then(|input| session.run_primary(input))
                .map_err(|e| e.to_string())
                .and_then(|outputs| validate_outputs(&outputs, &signature.outputs));
            match outcome {
                Ok(()) => success_count += 1,
                Err(reason) => {
                    failure_count += 1;
                    debug!(row = row.row, %reason, "edge case failed");
                    if failures.len() < MAX_REPORTED_FAILURES {
                        failures.push(EdgeCaseFailure {
                            row: row.row,
                            reason,
                        });
                    }
                }
            }
        }
        if failure_count > 0 {
            warn!(failed = failure_count, total, "edge cases failed");
        }

        let result = EdgeCaseResult {
            skipped_rows: dataset.skipped.len(),
            failures,
            ..EdgeCaseResult::from_counts(success_count, total, config.edge_success)
        };
        info!(
            samples = result.sample_count,
            successes = result.success_count,
            rating = %result.rating,
            "edge cases measured"
        );
        Observation::Measured(Evidence::EdgeCases(result))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::LabeledRow;
    use crate::format::onnx::OnnxModel;
    use crate::format::test_factory::{build_pygmy_logistic, build_pygmy_nan_on_zero};
    use crate::preprocessing::FeatureScaler;
    use crate::runtime::native::NativeSession;
    use std::io::Write;
    use std::path::PathBuf;

    fn shared(bytes: &[u8]) -> SharedSession {
        let model = OnnxModel::from_bytes(bytes).unwrap();
        SharedSession::new(Box::new(NativeSession::from_model(&model).unwrap()))
    }

    fn dataset(rows: Vec<Vec<f32>>) -> Dataset {
        let width = rows.first().map_or(0, Vec::len);
        Dataset {
            path: PathBuf::from("edge.csv"),
            feature_names: (0..width).map(|i| format!("f{i}")).collect(),
            records_read: rows.len(),
            rows: rows
                .into_iter()
                .enumerate()
                .map(|(i, features)| LabeledRow {
                    row: i + 1,
                    features,
                    label: None,
                })
                .collect(),
            ..Dataset::default()
        }
    }

    fn result(observation: Observation) -> EdgeCaseResult {
        match observation {
            Observation::Measured(Evidence::EdgeCases(result)) => result,
            other => panic!("expected edge-case evidence, got {other:?}"),
        }
    }

    #[test]
    fn test_robust_model_succeeds_on_extremes() {
        let session = shared(&build_pygmy_logistic(2));
        let data = dataset(vec![vec![0.0, 0.0], vec![1e30, -1e30], vec![-1e6, 1e-6]]);
        let result = result(EdgeCaseEvaluator::new().evaluate(
            &session,
            &data,
            &ScoringConfig::default(),
            &Budget::unlimited(),
        ));
        assert_eq!(result.success_count, 3);
        assert_eq!(result.success_rate, 1.0);
        assert_eq!(result.rating, Rating::Excellent);
        assert!(result.failures.is_empty());
    }

    #[test]
    fn test_nan_rows_are_recorded_as_failures() {
        let session = shared(&build_pygmy_nan_on_zero(1));
        let data = dataset(vec![vec![1.0], vec![0.0], vec![2.0], vec![0.0], vec![3.0]]);
        let result = result(EdgeCaseEvaluator::new().evaluate(
            &session,
            &data,
            &ScoringConfig::default(),
            &Budget::unlimited(),
        ));
        assert_eq!(result.success_count, 3);
        assert!((result.success_rate - 0.6).abs() < 1e-12);
        assert_eq!(result.rating, Rating::Acceptable);
        let rows: Vec<_> = result.failures.iter().map(|f| f.row).collect();
        assert_eq!(rows, vec![2, 4]);
        assert!(result.failures[0].reason.contains("non-finite"));
    }

    #[test]
    fn test_failure_list_is_capped() {
        let session = shared(&build_pygmy_nan_on_zero(1));
        let data = dataset(vec![vec![0.0]; 30]);
        let result = result(EdgeCaseEvaluator::new().evaluate(
            &session,
            &data,
            &ScoringConfig::default(),
            &Budget::unlimited(),
        ));
        assert_eq!(result.success_count, 0);
        assert_eq!(result.failures.len(), MAX_REPORTED_FAILURES);
        assert_eq!(result.rating, Rating::Poor);
    }

    #[test]
    fn test_blank_fields_are_zero_filled_from_csv() {
        let session = shared(&build_pygmy_nan_on_zero(2));
        let mut file = tempfile::NamedTempFile::with_suffix(".csv").unwrap();
        write!(file, "a,b,label\n1,,0\n2,3,1\n").unwrap();
        let result = result(EdgeCaseEvaluator::new().run(
            &session,
            Some(file.path()),
            &ScoringConfig::default(),
            &Budget::unlimited(),
        ));
        assert_eq!(result.sample_count, 2);
        assert_eq!(result.success_count, 1);
        assert_eq!(result.failures[0].row, 1);
    }

    #[test]
    fn test_blank_labels_keep_boundary_rows() {
        let session = shared(&build_pygmy_logistic(2));
        let mut file = tempfile::NamedTempFile::with_suffix(".csv").unwrap();
        write!(file, "a,b,label\n0,0,\n1e30,-1e30,\n,5,\n1,2,1\n").unwrap();
        let result = result(EdgeCaseEvaluator::new().run(
            &session,
            Some(file.path()),
            &ScoringConfig::default(),
            &Budget::unlimited(),
        ));
        assert_eq!(result.sample_count, 4);
        assert_eq!(result.skipped_rows, 0);
        assert_eq!(result.success_count, 4);
    }

    #[test]
    fn test_label_free_csv_matching_input_width() {
        let session = shared(&build_pygmy_logistic(2));
        let mut file = tempfile::NamedTempFile::with_suffix(".csv").unwrap();
        write!(file, "a,b\n0,0\n5,5\n").unwrap();
        let result = result(EdgeCaseEvaluator::new().run(
            &session,
            Some(file.path()),
            &ScoringConfig::default(),
            &Budget::unlimited(),
        ));
        assert_eq!(result.success_count, 2);
    }

    #[test]
    fn test_mismatched_scaler_is_ignored() {
        let session = shared(&build_pygmy_nan_on_zero(1));
        let scaler = Arc::new(FeatureScaler::new(vec![1.0, 1.0], vec![1.0, 1.0]).unwrap());
        let data = dataset(vec![vec![1.0]]);
        let result = result(EdgeCaseEvaluator::new().with_preprocessor(scaler).evaluate(
            &session,
            &data,
            &ScoringConfig::default(),
            &Budget::unlimited(),
        ));
        assert_eq!(result.success_count, 1);
    }

    #[test]
    fn test_matching_scaler_is_applied() {
        // (1 - 1) / 1 = 0 turns the row into a NaN-producing input
        let session = shared(&build_pygmy_nan_on_zero(1));
        let scaler = Arc::new(FeatureScaler::new(vec![1.0], vec![1.0]).unwrap());
        let data = dataset(vec![vec![1.0]]);
        let result = result(EdgeCaseEvaluator::new().with_preprocessor(scaler).evaluate(
            &session,
            &data,
            &ScoringConfig::default(),
            &Budget::unlimited(),
        ));
        assert_eq!(result.success_count, 0);
    }

    #[test]
    fn test_missing_path_is_not_tested() {
        let session = shared(&build_pygmy_logistic(1));
        let observation = EdgeCaseEvaluator::new().run(
            &session,
            None,
            &ScoringConfig::default(),
            &Budget::unlimited(),
        );
        assert!(matches!(observation, Observation::NotTested(_)));
    }

    #[test]
    fn test_empty_dataset_fails() {
        let session = shared(&build_pygmy_logistic(1));
        let observation = EdgeCaseEvaluator::new().evaluate(
            &session,
            &dataset(Vec::new()),
            &ScoringConfig::default(),
            &Budget::unlimited(),
        );
        assert!(matches!(observation, Observation::Failed(reason) if reason.contains("no rows")));
    }
}

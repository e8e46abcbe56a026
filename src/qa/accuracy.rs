//! Labeled-accuracy evaluation.
//!
//! Runs batch inference over a labeled CSV dataset and compares the
//! predicted class of every row to its ground-truth label. A single-column
//! output is read as a probability thresholded at 0.5 (or as a class id when
//! every value is a whole number); wider outputs are read by argmax.

use super::{check_dataset, rows_tensor, supports_batching, Budget, Evidence, Observation, Rating};
use crate::data::{Dataset, DatasetReader};
use crate::preprocessing::Preprocessor;
use crate::runtime::{SharedSession, Tensor};
use crate::scoring::ScoringConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Probability above which a single-output model predicts the positive class
pub const DECISION_THRESHOLD: f32 = 0.5;

/// Rows per inference call when the model accepts a dynamic batch
pub const DEFAULT_BATCH_SIZE: usize = 64;

/// Evidence of the accuracy category
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccuracyResult {
    pub sample_count: usize,
    pub correct_count: usize,
    pub accuracy: f64,
    pub rating: Rating,
    pub class_count: usize,
    pub binary: bool,
    pub skipped_rows: usize,
    /// Original label strings when labels were encoded, index = class id
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub label_classes: Vec<String>,
}

impl AccuracyResult {
    /// Build a result from raw counts.
    ///
    /// `accuracy` is 0 for an empty sample so it always lies in [0, 1].
    #[must_use]
    pub fn from_counts(correct_count: usize, sample_count: usize, thresholds: [f64; 3]) -> Self {
        let correct_count = correct_count.min(sample_count);
        let accuracy = if sample_count == 0 {
            0.0
        } else {
            correct_count as f64 / sample_count as f64
        };
        Self {
            sample_count,
            correct_count,
            accuracy,
            rating: Rating::from_score(accuracy, thresholds),
            class_count: 0,
            binary: false,
            skipped_rows: 0,
            label_classes: Vec::new(),
        }
    }
}

/// Compares predictions against a labeled dataset
#[derive(Clone)]
pub struct LabeledAccuracyEvaluator {
    batch_size: usize,
    preprocessor: Option<Arc<dyn Preprocessor>>,
}

impl std::fmt::Debug for LabeledAccuracyEvaluator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LabeledAccuracyEvaluator")
            .field("batch_size", &self.batch_size)
            .field("preprocessor", &self.preprocessor.as_ref().map(|p| p.describe()))
            .finish()
    }
}

impl Default for LabeledAccuracyEvaluator {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            preprocessor: None,
        }
    }
}

impl LabeledAccuracyEvaluator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rows per call; clamped to at least 1
    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Apply `preprocessor` to every feature row before inference
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
            return Observation::NotTested("no labeled dataset supplied".to_string());
        };
        match DatasetReader::labeled().read(path) {
            Ok(dataset) => self.evaluate(session, &dataset, config, budget),
            Err(e) => {
                warn!(error = %e, "labeled dataset unusable");
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
        let Some(spec) = session.signature().inputs.first() else {
            return Observation::Failed("model declares no inputs".to_string());
        };
        if let Err(reason) = check_dataset(dataset, spec) {
            return Observation::Failed(reason);
        }

        let mut features: Vec<Vec<f32>> = dataset.rows.iter().map(|r| r.features.clone()).collect();
        if let Some(preprocessor) = &self.preprocessor {
            for row in &mut features {
                if let Err(e) = preprocessor.apply(row) {
                    return Observation::Failed(format!("{} failed: {e}", preprocessor.describe()));
                }
            }
        }
        let labels: Vec<i64> = dataset.rows.iter().filter_map(|r| r.label).collect();
        if labels.len() != features.len() {
            return Observation::Failed("dataset rows are missing labels".to_string());
        }

        let batch_size = if supports_batching(spec) { self.batch_size } else { 1 };
        let mut correct = 0usize;
        for (chunk_idx, (rows, truth)) in features
            .chunks(batch_size)
            .zip(labels.chunks(batch_size))
            .enumerate()
        {
            if let Err(e) = budget.check() {
                return Observation::Failed(format!(
                    "{e} after {} of {} rows",
                    chunk_idx * batch_size,
                    features.len()
                ));
            }
            let predictions = rows_tensor(spec, rows)
                .and_then(|input| session.run_primary(input))
                .map_err(|e| e.to_string())
                .and_then(|outputs| match outputs.first() {
                    Some((_, tensor)) => predict_classes(tensor, rows.len()),
                    None => Err("model returned no outputs".to_string()),
                });
            match predictions {
                Ok(predicted) => {
                    correct += predicted.iter().zip(truth).filter(|(p, t)| p == t).count();
                }
                Err(reason) => {
                    let first_row = dataset.rows[chunk_idx * batch_size].row;
                    warn!(row = first_row, %reason, "accuracy inference failed");
                    return Observation::Failed(format!("inference failed at row {first_row}: {reason}"));
                }
            }
            debug!(batch = chunk_idx, correct, "accuracy batch scored");
        }

        let class_count = dataset.class_count();
        let result = AccuracyResult {
            class_count,
            binary: class_count == 2,
            skipped_rows: dataset.skipped.len(),
            label_classes: dataset.label_classes.clone(),
            ..AccuracyResult::from_counts(correct, features.len(), config.accuracy)
        };
        info!(
            samples = result.sample_count,
            correct = result.correct_count,
            accuracy = result.accuracy,
            rating = %result.rating,
            "accuracy measured"
        );
        Observation::Measured(Evidence::Accuracy(result))
    }
}

/// Turn the first model output into one class id per input row
pub(crate) fn predict_classes(output: &Tensor, rows: usize) -> Result<Vec<i64>, String> {
    if output.numel() == rows {
        let whole = output.data.iter().all(|v| v.fract() == 0.0);
        return Ok(output
            .data
            .iter()
            .map(|&v| {
                if whole {
                    v as i64
                } else {
                    i64::from(v > DECISION_THRESHOLD)
                }
            })
            .collect());
    }
    let width = output.last_dim();
    if width == 0 || output.numel() != rows * width {
        return Err(format!(
            "output shape {:?} does not hold one prediction per row for {rows} row(s)",
            output.shape
        ));
    }
    Ok(output.rows().map(argmax).collect())
}

fn argmax(row: &[f32]) -> i64 {
    let mut best = 0;
    for (i, v) in row.iter().enumerate() {
        if *v > row[best] {
            best = i;
        }
    }
    best as i64
}

#[cfg(test)]
#[path = "accuracy_tests.rs"]
mod tests;

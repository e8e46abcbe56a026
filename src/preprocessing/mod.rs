//! Pluggable feature preprocessing.
//!
//! Preprocessing front ends (tokenizers, vectorizers) live outside this
//! crate. The evaluator only invokes a [`Preprocessor`] on each numeric
//! feature row before inference. [`FeatureScaler`] covers the common case of
//! a standard scaler exported alongside the model as `scaler.json`:
//!
//! ```json
//! {"mean": [5.8, 3.0], "scale": [0.8, 0.4]}
//! ```
//!
//! # Example
//!
//! ```
//! use modelgate::preprocessing::{FeatureScaler, Preprocessor};
//!
//! let scaler = FeatureScaler::new(vec![1.0, 10.0], vec![2.0, 5.0]).unwrap();
//! let mut row = vec![3.0, 20.0];
//! scaler.apply(&mut row).unwrap();
//! assert_eq!(row, vec![1.0, 2.0]);
//! ```

use crate::error::{GateError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

/// Transformation applied to one feature row in place.
pub trait Preprocessor: Send + Sync {
    /// Transform `row`; fails if the row cannot be handled
    fn apply(&self, row: &mut [f32]) -> Result<()>;

    /// Row length this preprocessor was fitted for, if fixed
    fn expected_len(&self) -> Option<usize> {
        None
    }

    /// Short description for reports
    fn describe(&self) -> String;
}

/// Standardization with precomputed statistics: `z = (x - mean) / scale`.
///
/// A zero scale is treated as 1 so constant features pass through centered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureScaler {
    mean: Vec<f32>,
    scale: Vec<f32>,
}

impl FeatureScaler {
    /// Create a scaler, checking that both vectors have the same length
    pub fn new(mean: Vec<f32>, scale: Vec<f32>) -> Result<Self> {
        if mean.len() != scale.len() {
            return Err(GateError::dimension_mismatch(
                "scaler scale vector",
                mean.len(),
                scale.len(),
            ));
        }
        if mean.is_empty() {
            return Err(GateError::Config {
                param: "scaler".to_string(),
                constraint: "non-empty mean and scale vectors".to_string(),
            });
        }
        Ok(Self { mean, scale })
    }

    /// Load `{"mean": [..], "scale": [..]}` from a JSON file
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let raw: Self = serde_json::from_str(&text)?;
        let scaler = Self::new(raw.mean, raw.scale)?;
        debug!(path = %path.display(), features = scaler.len(), "scaler loaded");
        Ok(scaler)
    }

    /// Number of features the scaler was fitted on
    #[must_use]
    pub fn len(&self) -> usize {
        self.mean.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.mean.is_empty()
    }
}

impl Preprocessor for FeatureScaler {
    fn apply(&self, row: &mut [f32]) -> Result<()> {
        if row.len() != self.mean.len() {
            return Err(GateError::dimension_mismatch(
                "scaler features",
                self.mean.len(),
                row.len(),
            ));
        }
        for ((x, mean), scale) in row.iter_mut().zip(&self.mean).zip(&self.scale) {
            let scale = if *scale == 0.0 { 1.0 } else { *scale };
            *x = (*x - mean) / scale;
        }
        Ok(())
    }

    fn expected_len(&self) -> Option<usize> {
        Some(self.mean.len())
    }

    fn describe(&self) -> String {
        format!("standard scaler ({} features)", self.mean.len())
    }
}

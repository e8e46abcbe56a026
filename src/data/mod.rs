//! Tabular dataset reader.
//!
//! Datasets are CSV files with a header row. By convention the last column
//! is the ground-truth label and every preceding column is a numeric
//! feature. Malformed rows are skipped with a warning, never fatal.
//!
//! Labels are class ids: integers parse directly, integral floats (`1.0`)
//! become integers, and if any label is not numeric the whole column is
//! label-encoded in sorted order of the distinct values.
//!
//! # Example
//!
//! ```rust,ignore
//! use modelgate::data::DatasetReader;
//!
//! let dataset = DatasetReader::labeled().read("validation.csv".as_ref())?;
//! println!("{} rows, {} skipped", dataset.rows.len(), dataset.skipped.len());
//! ```

use crate::error::{GateError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// A row is treated as text when its feature fields fail to parse as numbers
/// and more than this share of rows do so.
const TEXT_ROW_SHARE: f64 = 0.5;

/// One parsed dataset row
#[derive(Debug, Clone, PartialEq)]
pub struct LabeledRow {
    /// 1-based data row number (header excluded)
    pub row: usize,
    pub features: Vec<f32>,
    /// Class id; `None` when the dataset has no label column
    pub label: Option<i64>,
}

/// A row that could not be used
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedRow {
    /// 1-based data row number (header excluded)
    pub row: usize,
    pub reason: String,
}

/// How blank feature fields are treated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlankPolicy {
    /// Blank field makes the row malformed
    Skip,
    /// Blank field reads as 0.0
    ZeroFill,
}

/// Parsed dataset
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    pub path: PathBuf,
    pub feature_names: Vec<String>,
    pub label_name: Option<String>,
    pub rows: Vec<LabeledRow>,
    pub skipped: Vec<SkippedRow>,
    /// Distinct label strings when labels were encoded, index = class id
    pub label_classes: Vec<String>,
    /// Feature columns look like raw text rather than numbers
    pub text_detected: bool,
    /// Data records read, including skipped ones
    pub records_read: usize,
}

impl Dataset {
    /// Number of feature columns
    #[must_use]
    pub fn feature_count(&self) -> usize {
        self.feature_names.len()
    }

    /// Distinct labels among usable rows
    #[must_use]
    pub fn class_count(&self) -> usize {
        self.rows
            .iter()
            .filter_map(|r| r.label)
            .collect::<BTreeSet<_>>()
            .len()
    }
}

/// Configurable CSV reader
#[derive(Debug, Clone, Copy)]
pub struct DatasetReader {
    blanks: BlankPolicy,
    with_label: bool,
    /// Rows with a blank label cell are skipped rather than kept unlabeled
    label_required: bool,
}

enum FieldError {
    Blank(usize),
    Text(usize),
}

impl DatasetReader {
    /// Reader for labeled datasets (accuracy): strict fields, label required
    #[must_use]
    pub fn labeled() -> Self {
        Self {
            blanks: BlankPolicy::Skip,
            with_label: true,
            label_required: true,
        }
    }

    /// Reader for boundary datasets (edge cases): blanks zero-filled.
    ///
    /// When the file has exactly `expected_features` columns it is read as
    /// features only; otherwise the last column is an optional label and a
    /// blank label cell leaves the row unlabeled.
    #[must_use]
    pub fn edge_cases(column_count: usize, expected_features: Option<usize>) -> Self {
        Self {
            blanks: BlankPolicy::ZeroFill,
            with_label: expected_features != Some(column_count),
            label_required: false,
        }
    }

    /// Number of header columns, used to choose [`DatasetReader::edge_cases`] layout
    pub fn column_count(path: &Path) -> Result<usize> {
        let mut reader = open(path)?;
        let headers = reader
            .headers()
            .map_err(|e| GateError::dataset(path, format!("failed to read header: {e}")))?;
        Ok(headers.len())
    }

    /// Read and parse `path`
    pub fn read(&self, path: &Path) -> Result<Dataset> {
        let mut reader = open(path)?;
        let headers = reader
            .headers()
            .map_err(|e| GateError::dataset(path, format!("failed to read header: {e}")))?
            .clone();
        let n_cols = headers.len();
        let n_features = if self.with_label { n_cols.saturating_sub(1) } else { n_cols };
        if n_features == 0 {
            return Err(GateError::dataset(
                path,
                format!("header has {n_cols} column(s); need at least one feature column"),
            ));
        }

        let mut dataset = Dataset {
            path: path.to_path_buf(),
            feature_names: headers.iter().take(n_features).map(str::to_string).collect(),
            label_name: self.with_label.then(|| headers.get(n_cols - 1).unwrap_or("").to_string()),
            ..Dataset::default()
        };
        let mut raw_labels: Vec<Option<String>> = Vec::new();
        let mut text_rows = 0usize;

        for (idx, result) in reader.records().enumerate() {
            let row = idx + 1;
            dataset.records_read += 1;
            let record = match result {
                Ok(record) => record,
                Err(e) => {
                    skip(&mut dataset, row, format!("unreadable record: {e}"));
                    continue;
                }
            };
            if record.len() != n_cols {
                skip(
                    &mut dataset,
                    row,
                    format!("expected {n_cols} fields, found {}", record.len()),
                );
                continue;
            }

            let features = match self.parse_features(record.iter().take(n_features)) {
                Ok(features) => features,
                Err(FieldError::Blank(col)) => {
                    skip(&mut dataset, row, format!("blank value in column '{}'", &headers[col]));
                    continue;
                }
                Err(FieldError::Text(col)) => {
                    text_rows += 1;
                    skip(
                        &mut dataset,
                        row,
                        format!("non-numeric value in column '{}'", &headers[col]),
                    );
                    continue;
                }
            };

            if self.with_label {
                let label = record.get(n_cols - 1).unwrap_or("").trim();
                if label.is_empty() && self.label_required {
                    skip(&mut dataset, row, "blank label".to_string());
                    continue;
                }
                raw_labels.push((!label.is_empty()).then(|| label.to_string()));
            }
            dataset.rows.push(LabeledRow {
                row,
                features,
                label: None,
            });
        }

        if self.with_label {
            let present: Vec<String> = raw_labels.iter().flatten().cloned().collect();
            let (ids, classes) = encode_labels(&present);
            let mut ids = ids.into_iter();
            for (row, raw) in dataset.rows.iter_mut().zip(&raw_labels) {
                if raw.is_some() {
                    row.label = ids.next();
                }
            }
            dataset.label_classes = classes;
        }
        dataset.text_detected = dataset.records_read > 0
            && text_rows as f64 / dataset.records_read as f64 > TEXT_ROW_SHARE;

        debug!(
            path = %path.display(),
            rows = dataset.rows.len(),
            skipped = dataset.skipped.len(),
            "dataset loaded"
        );
        Ok(dataset)
    }

    fn parse_features<'a>(
        &self,
        fields: impl Iterator<Item = &'a str>,
    ) -> std::result::Result<Vec<f32>, FieldError> {
        fields
            .enumerate()
            .map(|(col, raw)| {
                let value = raw.trim();
                if value.is_empty() {
                    return match self.blanks {
                        BlankPolicy::ZeroFill => Ok(0.0),
                        BlankPolicy::Skip => Err(FieldError::Blank(col)),
                    };
                }
                value.parse::<f32>().map_err(|_| FieldError::Text(col))
            })
            .collect()
    }
}

fn open(path: &Path) -> Result<csv::Reader<std::fs::File>> {
    csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| GateError::dataset(path, format!("failed to open CSV: {e}")))
}

fn skip(dataset: &mut Dataset, row: usize, reason: String) {
    warn!(path = %dataset.path.display(), row, %reason, "skipping malformed row");
    dataset.skipped.push(SkippedRow { row, reason });
}

/// Map raw label strings to class ids.
///
/// Returns the ids and, when encoding was needed, the sorted distinct labels.
fn encode_labels(raw: &[String]) -> (Vec<i64>, Vec<String>) {
    let numeric: Option<Vec<i64>> = raw.iter().map(|s| parse_integral(s)).collect();
    if let Some(ids) = numeric {
        return (ids, Vec::new());
    }
    let classes: Vec<String> = raw
        .iter()
        .cloned()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let ids = raw
        .iter()
        .map(|s| classes.binary_search(s).map_or(-1, |i| i as i64))
        .collect();
    (ids, classes)
}

fn parse_integral(s: &str) -> Option<i64> {
    if let Ok(v) = s.parse::<i64>() {
        return Some(v);
    }
    let f = s.parse::<f64>().ok()?;
    (f.is_finite() && f.fract() == 0.0 && f.abs() < 9.0e15).then_some(f as i64)
}

#[cfg(test)]
#[path = "data_tests.rs"]
mod tests;

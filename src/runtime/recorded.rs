//! Reference-model adapter backed by recorded outputs.
//!
//! The training framework's own model usually cannot be executed from
//! Rust. Instead, a small JSON file captures what that model returned for a
//! handful of inputs:
//!
//! ```json
//! {
//!   "samples": [
//!     { "input": [0.1, 0.2, 0.3], "output": [0.73] }
//!   ]
//! }
//! ```
//!
//! The recorded inputs are the only ones this session can answer for and
//! are exposed through [`InferenceSession::fixed_inputs`].

use super::{Dim, InferenceSession, ModelSignature, NamedTensors, Tensor, TensorSpec};
use crate::error::{GateError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Tolerance when matching a requested input against a recorded one
const INPUT_MATCH_TOLERANCE: f32 = 1e-6;

/// One recorded input/output pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordedSample {
    pub input: Vec<f32>,
    pub output: Vec<f32>,
}

/// On-disk layout of a recording
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recording {
    pub samples: Vec<RecordedSample>,
}

/// Session replaying a [`Recording`]
#[derive(Debug, Clone)]
pub struct RecordedSession {
    signature: ModelSignature,
    samples: Vec<RecordedSample>,
}

impl RecordedSession {
    /// Load a recording from a JSON file
    pub fn from_file(path: &Path) -> Result<Self> {
        let load_error = |reason: String| GateError::ModelLoad {
            path: path.to_path_buf(),
            reason,
        };
        let text = std::fs::read_to_string(path).map_err(|e| load_error(e.to_string()))?;
        let recording: Recording =
            serde_json::from_str(&text).map_err(|e| load_error(format!("invalid recording: {e}")))?;
        Self::new(recording).map_err(|e| load_error(e.to_string()))
    }

    /// Validate a recording: at least one sample, consistent lengths
    pub fn new(recording: Recording) -> Result<Self> {
        let first = recording
            .samples
            .first()
            .ok_or_else(|| GateError::format("recording has no samples"))?;
        let (n_in, n_out) = (first.input.len(), first.output.len());
        if n_in == 0 || n_out == 0 {
            return Err(GateError::format("recorded input and output must be non-empty"));
        }
        for (idx, sample) in recording.samples.iter().enumerate() {
            if sample.input.len() != n_in || sample.output.len() != n_out {
                return Err(GateError::format(format!(
                    "sample {idx} has {}/{} values, expected {n_in}/{n_out}",
                    sample.input.len(),
                    sample.output.len()
                )));
            }
        }

        let spec = |name: &str, n: usize| TensorSpec {
            name: name.to_string(),
            shape: vec![Dim::Dynamic("batch_size".to_string()), Dim::Fixed(n)],
            element_type: "float32".to_string(),
        };
        Ok(Self {
            signature: ModelSignature {
                inputs: vec![spec("input", n_in)],
                outputs: vec![spec("output", n_out)],
            },
            samples: recording.samples,
        })
    }

    /// Number of recorded samples
    #[must_use]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    fn lookup(&self, row: &[f32]) -> Option<&RecordedSample> {
        self.samples.iter().find(|s| {
            s.input.len() == row.len()
                && s.input
                    .iter()
                    .zip(row)
                    .all(|(a, b)| (a - b).abs() <= INPUT_MATCH_TOLERANCE)
        })
    }
}

impl InferenceSession for RecordedSession {
    fn signature(&self) -> &ModelSignature {
        &self.signature
    }

    fn run(&mut self, inputs: &[(String, Tensor)]) -> Result<NamedTensors> {
        let (_, tensor) = inputs
            .first()
            .ok_or_else(|| GateError::inference("no input supplied"))?;
        let mut data = Vec::new();
        let mut rows = 0;
        for row in tensor.rows() {
            let sample = self
                .lookup(row)
                .ok_or_else(|| GateError::inference("no recorded output for this input"))?;
            data.extend_from_slice(&sample.output);
            rows += 1;
        }
        let width = self.samples[0].output.len();
        Ok(vec![("output".to_string(), Tensor::new(vec![rows, width], data)?)])
    }

    fn fixed_inputs(&self) -> Option<Vec<Tensor>> {
        Some(
            self.samples
                .iter()
                .map(|s| Tensor {
                    shape: vec![1, s.input.len()],
                    data: s.input.clone(),
                })
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn recording() -> Recording {
        Recording {
            samples: vec![
                RecordedSample {
                    input: vec![0.0, 0.0],
                    output: vec![0.5],
                },
                RecordedSample {
                    input: vec![1.0, 1.0],
                    output: vec![0.88],
                },
            ],
        }
    }

    #[test]
    fn test_replays_matching_rows() {
        let mut session = RecordedSession::new(recording()).unwrap();
        let input = Tensor::new(vec![2, 2], vec![1.0, 1.0, 0.0, 0.0]).unwrap();
        let out = session.run(&[("input".to_string(), input)]).unwrap();
        assert_eq!(out[0].1.shape, vec![2, 1]);
        assert_eq!(out[0].1.data, vec![0.88, 0.5]);
    }

    #[test]
    fn test_unknown_input_fails() {
        let mut session = RecordedSession::new(recording()).unwrap();
        let input = Tensor::filled(vec![1, 2], 7.0).unwrap();
        assert!(session.run(&[("input".to_string(), input)]).is_err());
    }

    #[test]
    fn test_fixed_inputs_exposed() {
        let session = RecordedSession::new(recording()).unwrap();
        let fixed = session.fixed_inputs().unwrap();
        assert_eq!(fixed.len(), 2);
        assert_eq!(fixed[1].shape, vec![1, 2]);
        assert_eq!(session.signature().inputs[0].fixed_last_dim(), Some(2));
    }

    #[test]
    fn test_inconsistent_lengths_rejected() {
        let mut bad = recording();
        bad.samples[1].output.push(0.1);
        assert!(RecordedSession::new(bad).is_err());
        assert!(RecordedSession::new(Recording { samples: vec![] }).is_err());
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"samples":[{{"input":[1.0],"output":[2.0,3.0]}}]}}"#
        )
        .unwrap();
        let session = RecordedSession::from_file(file.path()).unwrap();
        assert_eq!(session.len(), 1);
    }

    #[test]
    fn test_from_file_invalid_json_is_model_load() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        let err = RecordedSession::from_file(file.path()).unwrap_err();
        assert!(matches!(err, GateError::ModelLoad { .. }));
    }
}

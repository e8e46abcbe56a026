//! ONNX Runtime adapter (cargo feature `onnxruntime`).
//!
//! The signature still comes from our own protobuf reader so that dim
//! names (`batch_size`) survive; `ort` only executes.

use super::native::model_signature;
use super::{Backend, InferenceSession, ModelSignature, NamedTensors, Tensor};
use crate::error::{GateError, Result};
use crate::format::onnx::OnnxModel;
use ort::session::{builder::GraphOptimizationLevel, Session};
use std::path::Path;
use std::sync::Once;
use tracing::debug;

static ORT_INIT: Once = Once::new();

fn ensure_ort_initialized() {
    ORT_INIT.call_once(|| {
        let _ = ort::init().with_name("modelgate").commit();
    });
}

/// Backend executing models with ONNX Runtime
#[derive(Debug, Clone, Copy)]
pub struct OrtBackend {
    /// Intra-op thread count; 1 keeps latency measurements comparable
    pub intra_threads: usize,
}

impl Default for OrtBackend {
    fn default() -> Self {
        Self { intra_threads: 1 }
    }
}

impl Backend for OrtBackend {
    fn name(&self) -> &'static str {
        "onnxruntime"
    }

    fn open(&self, path: &Path) -> Result<Box<dyn InferenceSession>> {
        let load_error = |reason: String| GateError::ModelLoad {
            path: path.to_path_buf(),
            reason,
        };
        let model = OnnxModel::from_file(path).map_err(|e| match e {
            GateError::Io(io) => load_error(io.to_string()),
            other => other,
        })?;
        let signature = model_signature(&model);

        ensure_ort_initialized();
        let session = Session::builder()
            .and_then(|b| b.with_optimization_level(GraphOptimizationLevel::Level3))
            .and_then(|b| b.with_intra_threads(self.intra_threads))
            .and_then(|b| b.commit_from_file(path))
            .map_err(|e| load_error(e.to_string()))?;
        debug!(path = %path.display(), "onnxruntime session ready");

        Ok(Box::new(OrtSession { session, signature }))
    }
}

/// Session wrapping an `ort::Session`
pub struct OrtSession {
    session: Session,
    signature: ModelSignature,
}

impl InferenceSession for OrtSession {
    fn signature(&self) -> &ModelSignature {
        &self.signature
    }

    fn run(&mut self, inputs: &[(String, Tensor)]) -> Result<NamedTensors> {
        let mut feed: Vec<(String, ort::value::DynValue)> = Vec::with_capacity(inputs.len());
        for (name, tensor) in inputs {
            let integral = self
                .signature
                .inputs
                .iter()
                .find(|s| s.name == *name)
                .is_some_and(|s| s.element_type == "int64");
            let value = if integral {
                let data: Vec<i64> = tensor.data.iter().map(|&v| v as i64).collect();
                ort::value::Tensor::<i64>::from_array((tensor.shape.clone(), data))
                    .map_err(GateError::inference)?
                    .into_dyn()
            } else {
                ort::value::Tensor::<f32>::from_array((tensor.shape.clone(), tensor.data.clone()))
                    .map_err(GateError::inference)?
                    .into_dyn()
            };
            feed.push((name.clone(), value));
        }

        let outputs = self.session.run(feed).map_err(GateError::inference)?;
        let mut result = Vec::with_capacity(self.signature.outputs.len());
        for spec in &self.signature.outputs {
            let (shape, data) = outputs[spec.name.as_str()]
                .try_extract_tensor::<f32>()
                .map_err(GateError::inference)?;
            let shape: Vec<usize> = shape.iter().map(|&d| d.max(0) as usize).collect();
            result.push((spec.name.clone(), Tensor::new(shape, data.to_vec())?));
        }
        Ok(result)
    }
}

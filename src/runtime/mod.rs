//! Inference execution adapters.
//!
//! The evaluator never talks to a runtime directly. It opens a
//! [`Backend`], gets a boxed [`InferenceSession`] and funnels every call
//! through a [`SharedSession`], so that evaluators can hold cheap clones
//! while inference itself stays serialized.
//!
//! | Backend | Module | Coverage |
//! |---------|--------|----------|
//! | `native` | [`native`] | Pure-Rust interpreter for classifier-style graphs |
//! | `onnxruntime` | `onnxruntime` (feature) | Full ONNX operator set via `ort` |
//! | `recorded` | [`recorded`] | Replays outputs captured from the training framework |

pub mod native;
#[cfg(feature = "onnxruntime")]
pub mod onnxruntime;
pub mod recorded;

use crate::error::{GateError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Dense row-major f32 tensor.
///
/// Integer model inputs are carried as whole-valued floats and cast by the
/// adapter.
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    pub shape: Vec<usize>,
    pub data: Vec<f32>,
}

/// Number of elements `shape` describes, or a format error when the
/// product does not fit in `usize`
pub fn element_count(shape: &[usize]) -> Result<usize> {
    shape
        .iter()
        .try_fold(1usize, |n, &d| n.checked_mul(d))
        .ok_or_else(|| GateError::format(format!("shape {shape:?} has too many elements")))
}

impl Tensor {
    /// Create a tensor, checking that `data` fills `shape` exactly
    pub fn new(shape: Vec<usize>, data: Vec<f32>) -> Result<Self> {
        let expected = element_count(&shape)?;
        if expected != data.len() {
            return Err(GateError::dimension_mismatch(
                format!("tensor data for shape {shape:?}"),
                expected,
                data.len(),
            ));
        }
        Ok(Self { shape, data })
    }

    /// Tensor with every element set to `value`
    pub fn filled(shape: Vec<usize>, value: f32) -> Result<Self> {
        let n = element_count(&shape)?;
        Ok(Self {
            shape,
            data: vec![value; n],
        })
    }

    /// Scalar (rank-0) tensor
    #[must_use]
    pub fn scalar(value: f32) -> Self {
        Self {
            shape: Vec::new(),
            data: vec![value],
        }
    }

    /// Number of elements
    #[must_use]
    pub fn numel(&self) -> usize {
        self.data.len()
    }

    /// Whether every element is finite (no NaN/Inf)
    #[must_use]
    pub fn is_finite(&self) -> bool {
        self.data.iter().all(|v| v.is_finite())
    }

    /// Size of the innermost dimension (1 for scalars)
    #[must_use]
    pub fn last_dim(&self) -> usize {
        self.shape.last().copied().unwrap_or(1)
    }

    /// Iterate over rows along the innermost dimension
    pub fn rows(&self) -> impl Iterator<Item = &[f32]> {
        self.data.chunks(self.last_dim().max(1))
    }
}

/// One declared dimension of a model input or output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Dim {
    /// Known size
    Fixed(usize),
    /// Symbolic or unknown size (`"batch_size"`, `"?"`)
    Dynamic(String),
}

impl Dim {
    /// Resolve to a concrete size, substituting `dynamic` for symbolic dims
    #[must_use]
    pub fn resolve(&self, dynamic: usize) -> usize {
        match self {
            Self::Fixed(n) => *n,
            Self::Dynamic(_) => dynamic,
        }
    }

    #[must_use]
    pub fn is_dynamic(&self) -> bool {
        matches!(self, Self::Dynamic(_))
    }
}

impl fmt::Display for Dim {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fixed(n) => write!(f, "{n}"),
            Self::Dynamic(name) => write!(f, "{name}"),
        }
    }
}

/// Declared name, shape and element type of a model input or output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TensorSpec {
    pub name: String,
    /// Declared dims; empty when the model does not declare a shape
    pub shape: Vec<Dim>,
    pub element_type: String,
}

impl TensorSpec {
    /// Concrete shape with every dynamic dim replaced by `dynamic`
    #[must_use]
    pub fn concrete_shape(&self, dynamic: usize) -> Vec<usize> {
        self.shape.iter().map(|d| d.resolve(dynamic)).collect()
    }

    /// Whether `actual` is consistent with the declared shape.
    ///
    /// An undeclared shape accepts anything; otherwise ranks must agree and
    /// every fixed dim must match.
    #[must_use]
    pub fn accepts(&self, actual: &[usize]) -> bool {
        if self.shape.is_empty() {
            return true;
        }
        self.shape.len() == actual.len()
            && self.shape.iter().zip(actual).all(|(dim, &n)| match dim {
                Dim::Fixed(expected) => *expected == n,
                Dim::Dynamic(_) => true,
            })
    }

    /// Fixed size of the innermost dim, if declared
    #[must_use]
    pub fn fixed_last_dim(&self) -> Option<usize> {
        match self.shape.last() {
            Some(Dim::Fixed(n)) => Some(*n),
            _ => None,
        }
    }

    /// Whether inputs of this type must be whole numbers
    #[must_use]
    pub fn is_integral(&self) -> bool {
        self.element_type.starts_with("int")
            || self.element_type.starts_with("uint")
            || self.element_type == "bool"
    }

    /// Human readable shape, e.g. `[batch_size, 4]`
    #[must_use]
    pub fn shape_string(&self) -> String {
        let dims: Vec<String> = self.shape.iter().map(ToString::to_string).collect();
        format!("[{}]", dims.join(", "))
    }
}

/// Inputs and outputs of a model as seen by an execution adapter
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelSignature {
    pub inputs: Vec<TensorSpec>,
    pub outputs: Vec<TensorSpec>,
}

/// Named input or output tensors
pub type NamedTensors = Vec<(String, Tensor)>;

/// An open model that can run inference.
pub trait InferenceSession: Send {
    /// Declared inputs and outputs
    fn signature(&self) -> &ModelSignature;

    /// Run one inference call
    fn run(&mut self, inputs: &[(String, Tensor)]) -> Result<NamedTensors>;

    /// Inputs this session can answer for, when it cannot run arbitrary ones
    fn fixed_inputs(&self) -> Option<Vec<Tensor>> {
        None
    }
}

/// Factory for [`InferenceSession`]s.
pub trait Backend: Send + Sync {
    /// Short backend name used in reports and on the command line
    fn name(&self) -> &'static str;

    /// Open `path`; failures here are fatal for the run
    fn open(&self, path: &Path) -> Result<Box<dyn InferenceSession>>;
}

/// Names accepted by [`backend_by_name`]
pub const BACKEND_NAMES: &[&str] = &["native", "onnxruntime"];

/// The backend used when none is requested.
///
/// With the `onnxruntime` feature this is ONNX Runtime, otherwise the
/// native interpreter.
#[must_use]
pub fn default_backend() -> Box<dyn Backend> {
    #[cfg(feature = "onnxruntime")]
    {
        Box::new(onnxruntime::OrtBackend::default())
    }
    #[cfg(not(feature = "onnxruntime"))]
    {
        Box::new(native::NativeBackend)
    }
}

/// Look up a backend by name
pub fn backend_by_name(name: &str) -> Result<Box<dyn Backend>> {
    match name {
        "native" => Ok(Box::new(native::NativeBackend)),
        #[cfg(feature = "onnxruntime")]
        "onnxruntime" | "ort" => Ok(Box::new(onnxruntime::OrtBackend::default())),
        #[cfg(not(feature = "onnxruntime"))]
        "onnxruntime" | "ort" => Err(GateError::Config {
            param: "backend".to_string(),
            constraint: "'native' (rebuild with the onnxruntime feature for 'onnxruntime')"
                .to_string(),
        }),
        other => Err(GateError::Config {
            param: "backend".to_string(),
            constraint: format!("one of {BACKEND_NAMES:?}, got '{other}'"),
        }),
    }
}

/// Open a reference model.
///
/// `.json` files are recorded outputs; anything else goes through `backend`.
pub fn open_reference(path: &Path, backend: &dyn Backend) -> Result<Box<dyn InferenceSession>> {
    let is_json = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("json"));
    if is_json {
        Ok(Box::new(recorded::RecordedSession::from_file(path)?))
    } else {
        backend.open(path)
    }
}

/// Mutex-guarded session shared by all evaluators of one run.
#[derive(Clone)]
pub struct SharedSession {
    inner: Arc<Mutex<Box<dyn InferenceSession>>>,
    signature: Arc<ModelSignature>,
}

impl fmt::Debug for SharedSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedSession")
            .field("signature", &self.signature)
            .finish_non_exhaustive()
    }
}

impl SharedSession {
    #[must_use]
    pub fn new(session: Box<dyn InferenceSession>) -> Self {
        let signature = Arc::new(session.signature().clone());
        Self {
            inner: Arc::new(Mutex::new(session)),
            signature,
        }
    }

    /// Declared inputs and outputs
    #[must_use]
    pub fn signature(&self) -> &ModelSignature {
        &self.signature
    }

    /// See [`InferenceSession::fixed_inputs`]
    pub fn fixed_inputs(&self) -> Result<Option<Vec<Tensor>>> {
        let session = self
            .inner
            .lock()
            .map_err(|_| GateError::inference("inference session lock poisoned"))?;
        Ok(session.fixed_inputs())
    }

    /// Run one inference call under the session lock
    pub fn run(&self, inputs: &[(String, Tensor)]) -> Result<NamedTensors> {
        let mut session = self
            .inner
            .lock()
            .map_err(|_| GateError::inference("inference session lock poisoned"))?;
        session.run(inputs)
    }

    /// Feed `primary` to the first input, zero-fill any further inputs and run.
    pub fn run_primary(&self, primary: Tensor) -> Result<NamedTensors> {
        let inputs = self.feed(primary)?;
        self.run(&inputs)
    }

    /// Build the named input list for [`SharedSession::run_primary`]
    pub fn feed(&self, primary: Tensor) -> Result<NamedTensors> {
        let mut specs = self.signature.inputs.iter();
        let first = specs
            .next()
            .ok_or_else(|| GateError::inference("model declares no inputs"))?;
        let batch = primary.shape.first().copied().unwrap_or(1);
        let mut inputs = vec![(first.name.clone(), primary)];
        for spec in specs {
            let shape = spec.concrete_shape(batch);
            inputs.push((spec.name.clone(), Tensor::filled(shape, 0.0)?));
        }
        Ok(inputs)
    }
}

#[cfg(test)]
#[path = "runtime_tests.rs"]
mod tests;

//! Model inspection.
//!
//! [`ModelInspector`] is the hard dependency of every evaluation: it opens
//! the artifact, records its on-disk size and structure, and produces the
//! immutable [`ModelDescriptor`] all evaluators read. Any failure here is
//! fatal for the run.
//!
//! # Example
//!
//! ```rust,ignore
//! use modelgate::inspect::ModelInspector;
//! use modelgate::runtime::native::NativeBackend;
//!
//! let inspector = ModelInspector::new(Box::new(NativeBackend));
//! let (descriptor, session) = inspector.inspect("model.onnx".as_ref())?;
//! println!("{} inputs, {} bytes", descriptor.inputs.len(), descriptor.size_bytes);
//! ```

use crate::error::{GateError, Result};
use crate::format::onnx::{OnnxDim, OnnxModel, OnnxValueInfo};
use crate::qa::Rating;
use crate::runtime::{Backend, SharedSession, TensorSpec};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Lowest default-domain opset considered current
pub const MIN_SUPPORTED_OPSET: i64 = 11;
/// Highest opset broadly supported by browser runtimes
pub const MAX_WEB_OPSET: i64 = 13;
/// Size limit for on-device deployment
pub const MOBILE_SIZE_LIMIT: u64 = 50 * 1024 * 1024;
/// Size limit for in-browser deployment
pub const WEB_SIZE_LIMIT: u64 = 100 * 1024 * 1024;
/// Control-flow operators that browser runtimes handle poorly
pub const CONTROL_FLOW_OPS: &[&str] = &["Loop", "If", "Scan"];
/// Operators reported as activation functions, in report order
pub const ACTIVATION_OPS: &[&str] = &[
    "Relu", "Sigmoid", "Tanh", "Softmax", "LeakyRelu", "Elu", "Selu", "Gelu",
];
/// Graphs with more nodes than this are `moderate`
pub const MODERATE_NODE_COUNT: usize = 20;
/// Graphs with more nodes than this are `complex`
pub const COMPLEX_NODE_COUNT: usize = 100;

/// Immutable description of the artifact under evaluation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelDescriptor {
    pub path: PathBuf,
    pub size_bytes: u64,
    /// Backend that opened the model
    pub backend: String,
    pub inputs: Vec<TensorSpec>,
    pub outputs: Vec<TensorSpec>,
    pub structure: StructuralInfo,
}

impl ModelDescriptor {
    /// The input synthetic probes and dataset rows are fed to
    #[must_use]
    pub fn primary_input(&self) -> Option<&TensorSpec> {
        self.inputs.first()
    }

    /// On-disk size in MiB
    #[must_use]
    pub fn size_mb(&self) -> f64 {
        self.size_bytes as f64 / (1024.0 * 1024.0)
    }
}

/// Coarse size class of the graph by node count
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GraphComplexity {
    #[default]
    Simple,
    Moderate,
    Complex,
}

impl GraphComplexity {
    #[must_use]
    pub fn from_node_count(nodes: usize) -> Self {
        if nodes > COMPLEX_NODE_COUNT {
            Self::Complex
        } else if nodes > MODERATE_NODE_COUNT {
            Self::Moderate
        } else {
            Self::Simple
        }
    }
}

impl std::fmt::Display for GraphComplexity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Simple => "simple",
            Self::Moderate => "moderate",
            Self::Complex => "complex",
        })
    }
}

/// The initializer with the most elements
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterTensor {
    pub name: String,
    pub shape: Vec<usize>,
    pub elements: u64,
}

/// Spread of initializer sizes, in elements
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParameterDistribution {
    pub mean_elements: f64,
    pub median_elements: f64,
    /// Population standard deviation
    pub std_elements: f64,
}

impl ParameterDistribution {
    /// `None` for an empty slice
    #[must_use]
    pub fn from_sizes(sizes: &[u64]) -> Option<Self> {
        if sizes.is_empty() {
            return None;
        }
        let n = sizes.len() as f64;
        let mean = sizes.iter().map(|&s| s as f64).sum::<f64>() / n;
        let variance = sizes.iter().map(|&s| (s as f64 - mean).powi(2)).sum::<f64>() / n;
        let mut sorted = sizes.to_vec();
        sorted.sort_unstable();
        let mid = sorted.len() / 2;
        let median = if sorted.len() % 2 == 0 {
            (sorted[mid - 1] as f64 + sorted[mid] as f64) / 2.0
        } else {
            sorted[mid] as f64
        };
        Some(Self {
            mean_elements: mean,
            median_elements: median,
            std_elements: variance.sqrt(),
        })
    }
}

/// Graph-level facts read from the ONNX container
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StructuralInfo {
    pub ir_version: i64,
    pub producer_name: String,
    pub producer_version: String,
    pub opset_version: Option<i64>,
    /// Default-domain opset is at least [`MIN_SUPPORTED_OPSET`]
    pub opset_supported: bool,
    pub initializer_count: usize,
    pub node_count: usize,
    /// Operator type histogram
    pub operators: BTreeMap<String, usize>,
    /// Elements across all initializers, saturating
    #[serde(default)]
    pub total_parameters: u64,
    #[serde(default)]
    pub largest_tensor: Option<ParameterTensor>,
    #[serde(default)]
    pub parameter_distribution: Option<ParameterDistribution>,
    #[serde(default)]
    pub graph_complexity: GraphComplexity,
    /// Members of [`ACTIVATION_OPS`] found in the graph
    #[serde(default)]
    pub activation_functions: Vec<String>,
    /// Some runtime input or output has a symbolic or unknown dim
    #[serde(default)]
    pub has_dynamic_shapes: bool,
}

impl StructuralInfo {
    #[must_use]
    pub fn from_model(model: &OnnxModel) -> Self {
        let meta = model.metadata();
        let graph = model.graph();
        let opset_version = model.default_opset();
        let operators = graph.op_histogram();

        let mut total_parameters = 0u64;
        let mut largest_tensor: Option<ParameterTensor> = None;
        let mut sizes = Vec::with_capacity(graph.initializers.len());
        for init in &graph.initializers {
            let elements = init
                .shape
                .iter()
                .fold(1u64, |n, &d| n.saturating_mul(d as u64));
            total_parameters = total_parameters.saturating_add(elements);
            sizes.push(elements);
            if largest_tensor.as_ref().map_or(true, |t| elements > t.elements) {
                largest_tensor = Some(ParameterTensor {
                    name: init.name.clone(),
                    shape: init.shape.clone(),
                    elements,
                });
            }
        }
        let activation_functions = ACTIVATION_OPS
            .iter()
            .filter(|op| operators.contains_key(**op))
            .map(|op| (*op).to_string())
            .collect();
        let has_dynamic_shapes = graph
            .runtime_inputs()
            .chain(&graph.outputs)
            .any(is_dynamic);

        Self {
            ir_version: meta.ir_version,
            producer_name: meta.producer_name.clone(),
            producer_version: meta.producer_version.clone(),
            opset_version,
            opset_supported: opset_version.is_some_and(|v| v >= MIN_SUPPORTED_OPSET),
            initializer_count: graph.initializers.len(),
            node_count: graph.nodes.len(),
            graph_complexity: GraphComplexity::from_node_count(graph.nodes.len()),
            operators,
            total_parameters,
            largest_tensor,
            parameter_distribution: ParameterDistribution::from_sizes(&sizes),
            activation_functions,
            has_dynamic_shapes,
        }
    }

    /// Control-flow operators present in the graph
    #[must_use]
    pub fn control_flow_ops(&self) -> Vec<String> {
        self.operators
            .keys()
            .filter(|op| CONTROL_FLOW_OPS.contains(&op.as_str()))
            .cloned()
            .collect()
    }

    /// Advisory notes about the structure; never scored
    #[must_use]
    pub fn advisories(&self) -> Vec<String> {
        let mut notes = Vec::new();
        match self.opset_version {
            Some(v) if v < MIN_SUPPORTED_OPSET => notes.push(format!(
                "Opset {v} is older than {MIN_SUPPORTED_OPSET}; re-export with a newer opset for runtime support"
            )),
            None => notes.push("Model does not import the default ONNX opset".to_string()),
            _ => {}
        }
        if self.initializer_count == 0 {
            notes.push("Model has no initializers and may be missing its weights".to_string());
        }
        notes
    }
}

fn is_dynamic(value: &OnnxValueInfo) -> bool {
    value.dims.iter().any(|d| match d {
        OnnxDim::Value(v) => *v <= 0,
        OnnxDim::Param(_) | OnnxDim::Unknown => true,
    })
}

/// Deployment-target heuristics
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Compatibility {
    pub mobile_ready: bool,
    pub web_compatible: bool,
    pub notes: Vec<String>,
}

impl Compatibility {
    /// Assess deployment targets from the descriptor and measured latency
    #[must_use]
    pub fn assess(descriptor: &ModelDescriptor, performance: Option<Rating>) -> Self {
        let size = descriptor.size_bytes;
        let fast = matches!(performance, Some(Rating::Excellent | Rating::Good));
        let control_flow = descriptor.structure.control_flow_ops();
        let opset_ok = descriptor
            .structure
            .opset_version
            .map_or(true, |v| v <= MAX_WEB_OPSET);

        let mobile_ready = size < MOBILE_SIZE_LIMIT && fast;
        let web_compatible = opset_ok && size < WEB_SIZE_LIMIT && control_flow.is_empty();

        let mut notes = Vec::new();
        if size >= MOBILE_SIZE_LIMIT {
            notes.push(format!(
                "Model is {:.1} MB; quantize or prune below 50 MB for mobile deployment",
                descriptor.size_mb()
            ));
        }
        if !fast && performance.is_some() {
            notes.push("Latency too high for mobile targets; consider graph optimization".to_string());
        }
        if !opset_ok {
            notes.push(format!(
                "Opset above {MAX_WEB_OPSET} may not be supported by browser runtimes"
            ));
        }
        if !control_flow.is_empty() {
            notes.push(format!(
                "Control-flow operators ({}) limit web compatibility",
                control_flow.join(", ")
            ));
        }
        Self {
            mobile_ready,
            web_compatible,
            notes,
        }
    }
}

/// Opens model artifacts through a [`Backend`]
pub struct ModelInspector {
    backend: Box<dyn Backend>,
}

impl std::fmt::Debug for ModelInspector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelInspector")
            .field("backend", &self.backend.name())
            .finish()
    }
}

impl ModelInspector {
    #[must_use]
    pub fn new(backend: Box<dyn Backend>) -> Self {
        Self { backend }
    }

    /// Name of the backend sessions are opened with
    #[must_use]
    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Backend used for the model, reused to open reference models
    #[must_use]
    pub fn backend(&self) -> &dyn Backend {
        self.backend.as_ref()
    }

    /// Open `path` and describe it.
    ///
    /// # Errors
    ///
    /// Returns a fatal error ([`GateError::is_fatal`]) when the file is
    /// missing or unreadable, is not a well-formed ONNX model, or the
    /// backend cannot create a session for it.
    pub fn inspect(&self, path: &Path) -> Result<(ModelDescriptor, SharedSession)> {
        let load_error = |reason: String| GateError::ModelLoad {
            path: path.to_path_buf(),
            reason,
        };
        let size_bytes = std::fs::metadata(path)
            .map_err(|e| load_error(e.to_string()))?
            .len();
        let model = OnnxModel::from_file(path).map_err(|e| match e {
            GateError::Io(io) => load_error(io.to_string()),
            other => other,
        })?;
        let structure = StructuralInfo::from_model(&model);
        debug!(
            opset = ?structure.opset_version,
            nodes = structure.node_count,
            "parsed model structure"
        );

        let session = SharedSession::new(self.backend.open(path)?);
        let signature = session.signature().clone();
        if signature.inputs.is_empty() {
            return Err(load_error("model declares no inputs".to_string()));
        }
        if signature.outputs.is_empty() {
            return Err(load_error("model declares no outputs".to_string()));
        }

        let descriptor = ModelDescriptor {
            path: path.to_path_buf(),
            size_bytes,
            backend: self.backend.name().to_string(),
            inputs: signature.inputs,
            outputs: signature.outputs,
            structure,
        };
        info!(
            path = %path.display(),
            inputs = descriptor.inputs.len(),
            outputs = descriptor.outputs.len(),
            size_bytes,
            "model loaded"
        );
        Ok((descriptor, session))
    }
}

#[cfg(test)]
#[path = "inspect_tests.rs"]
mod tests;

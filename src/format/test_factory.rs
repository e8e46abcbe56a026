//! Test Factory - Pygmy ONNX Model Builders
//!
//! Creates minimal valid `.onnx` files in memory so that the inspector,
//! the native runtime and the full evaluation pipeline can be exercised
//! without shipping real model files.
//!
//! # Example
//!
//! ```
//! use modelgate::format::onnx::OnnxModel;
//! use modelgate::format::test_factory::build_pygmy_logistic;
//!
//! let bytes = build_pygmy_logistic(3);
//! let model = OnnxModel::from_bytes(&bytes).unwrap();
//! assert_eq!(model.graph().nodes.len(), 2);
//! ```

use crate::format::onnx::{OnnxDataType, ProtobufWriter};

/// Declared dimension of a pygmy graph input/output
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PygmyDim {
    Fixed(usize),
    Dynamic(String),
}

impl PygmyDim {
    /// Symbolic batch dimension
    #[must_use]
    pub fn batch() -> Self {
        Self::Dynamic("batch_size".to_string())
    }
}

/// Node attribute for a pygmy graph
#[derive(Debug, Clone, PartialEq)]
pub enum PygmyAttr {
    Int(i64),
    Float(f32),
    Ints(Vec<i64>),
}

#[derive(Debug, Clone)]
struct PygmyValue {
    name: String,
    elem_type: OnnxDataType,
    dims: Vec<PygmyDim>,
}

#[derive(Debug, Clone)]
struct PygmyNode {
    op_type: String,
    inputs: Vec<String>,
    outputs: Vec<String>,
    attrs: Vec<(String, PygmyAttr)>,
}

#[derive(Debug, Clone)]
enum PygmyData {
    F32(Vec<f32>),
    I64(Vec<i64>),
}

#[derive(Debug, Clone)]
struct PygmyInitializer {
    name: String,
    shape: Vec<usize>,
    data: PygmyData,
}

/// Builder for a single-graph ONNX model
#[derive(Debug, Clone)]
pub struct PygmyOnnx {
    graph_name: String,
    producer: (String, String),
    ir_version: i64,
    opset: i64,
    inputs: Vec<PygmyValue>,
    outputs: Vec<PygmyValue>,
    nodes: Vec<PygmyNode>,
    initializers: Vec<PygmyInitializer>,
}

impl Default for PygmyOnnx {
    fn default() -> Self {
        Self {
            graph_name: "pygmy".to_string(),
            producer: ("modelgate-test-factory".to_string(), "1.0".to_string()),
            ir_version: 8,
            opset: 13,
            inputs: Vec::new(),
            outputs: Vec::new(),
            nodes: Vec::new(),
            initializers: Vec::new(),
        }
    }
}

impl PygmyOnnx {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the default-domain opset version
    #[must_use]
    pub fn opset(mut self, version: i64) -> Self {
        self.opset = version;
        self
    }

    /// Set producer name and version
    #[must_use]
    pub fn producer(mut self, name: &str, version: &str) -> Self {
        self.producer = (name.to_string(), version.to_string());
        self
    }

    /// Add a float32 graph input
    #[must_use]
    pub fn input(self, name: &str, dims: Vec<PygmyDim>) -> Self {
        self.typed_input(name, OnnxDataType::Float, dims)
    }

    /// Add a graph input of any element type
    #[must_use]
    pub fn typed_input(mut self, name: &str, elem_type: OnnxDataType, dims: Vec<PygmyDim>) -> Self {
        self.inputs.push(PygmyValue {
            name: name.to_string(),
            elem_type,
            dims,
        });
        self
    }

    /// Add a float32 graph output
    #[must_use]
    pub fn output(mut self, name: &str, dims: Vec<PygmyDim>) -> Self {
        self.outputs.push(PygmyValue {
            name: name.to_string(),
            elem_type: OnnxDataType::Float,
            dims,
        });
        self
    }

    /// Add a float32 initializer
    #[must_use]
    pub fn initializer(mut self, name: &str, shape: &[usize], data: Vec<f32>) -> Self {
        self.initializers.push(PygmyInitializer {
            name: name.to_string(),
            shape: shape.to_vec(),
            data: PygmyData::F32(data),
        });
        self
    }

    /// Add an int64 initializer (e.g. a `Reshape` target shape)
    #[must_use]
    pub fn int64_initializer(mut self, name: &str, shape: &[usize], data: Vec<i64>) -> Self {
        self.initializers.push(PygmyInitializer {
            name: name.to_string(),
            shape: shape.to_vec(),
            data: PygmyData::I64(data),
        });
        self
    }

    /// Add an operator node without attributes
    #[must_use]
    pub fn node(self, op_type: &str, inputs: &[&str], outputs: &[&str]) -> Self {
        self.node_with_attrs(op_type, inputs, outputs, Vec::new())
    }

    /// Add an operator node
    #[must_use]
    pub fn node_with_attrs(
        mut self,
        op_type: &str,
        inputs: &[&str],
        outputs: &[&str],
        attrs: Vec<(&str, PygmyAttr)>,
    ) -> Self {
        self.nodes.push(PygmyNode {
            op_type: op_type.to_string(),
            inputs: inputs.iter().map(ToString::to_string).collect(),
            outputs: outputs.iter().map(ToString::to_string).collect(),
            attrs: attrs
                .into_iter()
                .map(|(name, value)| (name.to_string(), value))
                .collect(),
        });
        self
    }

    /// Encode as `ModelProto` bytes
    #[must_use]
    pub fn build(&self) -> Vec<u8> {
        let mut graph = ProtobufWriter::new();
        for (idx, node) in self.nodes.iter().enumerate() {
            graph.message(1, encode_node(idx, node));
        }
        graph.string(2, &self.graph_name);
        for init in &self.initializers {
            graph.message(5, encode_initializer(init));
        }
        for input in &self.inputs {
            graph.message(11, encode_value_info(input));
        }
        for output in &self.outputs {
            graph.message(12, encode_value_info(output));
        }

        let mut opset = ProtobufWriter::new();
        opset.string(1, "").int(2, self.opset);

        let mut model = ProtobufWriter::new();
        model
            .int(1, self.ir_version)
            .string(2, &self.producer.0)
            .string(3, &self.producer.1)
            .message(7, graph)
            .message(8, opset);
        model.finish()
    }
}

fn encode_node(idx: usize, node: &PygmyNode) -> ProtobufWriter {
    let mut w = ProtobufWriter::new();
    for input in &node.inputs {
        w.string(1, input);
    }
    for output in &node.outputs {
        w.string(2, output);
    }
    w.string(3, &format!("{}_{idx}", node.op_type.to_lowercase()));
    w.string(4, &node.op_type);
    for (name, value) in &node.attrs {
        let mut attr = ProtobufWriter::new();
        attr.string(1, name);
        match value {
            PygmyAttr::Float(v) => {
                attr.float(2, *v).int(20, 1);
            }
            PygmyAttr::Int(v) => {
                attr.int(3, *v).int(20, 2);
            }
            PygmyAttr::Ints(v) => {
                attr.packed_ints(8, v).int(20, 7);
            }
        }
        w.message(5, attr);
    }
    w
}

fn encode_initializer(init: &PygmyInitializer) -> ProtobufWriter {
    let dims: Vec<i64> = init.shape.iter().map(|&d| d as i64).collect();
    let mut w = ProtobufWriter::new();
    w.packed_ints(1, &dims);
    match &init.data {
        PygmyData::F32(values) => {
            w.int(2, i64::from(OnnxDataType::Float.to_i32()));
            w.string(8, &init.name);
            w.packed_floats(4, values);
        }
        PygmyData::I64(values) => {
            w.int(2, i64::from(OnnxDataType::Int64.to_i32()));
            w.string(8, &init.name);
            let raw: Vec<u8> = values.iter().flat_map(|v| v.to_le_bytes()).collect();
            w.bytes(9, &raw);
        }
    }
    w
}

fn encode_value_info(value: &PygmyValue) -> ProtobufWriter {
    let mut shape = ProtobufWriter::new();
    for dim in &value.dims {
        let mut d = ProtobufWriter::new();
        match dim {
            PygmyDim::Fixed(n) => d.int(1, *n as i64),
            PygmyDim::Dynamic(param) => d.string(2, param),
        };
        shape.message(1, d);
    }
    let mut tensor_type = ProtobufWriter::new();
    tensor_type
        .int(1, i64::from(value.elem_type.to_i32()))
        .message(2, shape);
    let mut type_proto = ProtobufWriter::new();
    type_proto.message(1, tensor_type);

    let mut w = ProtobufWriter::new();
    w.string(1, &value.name).message(2, type_proto);
    w
}

// ============================================================================
// Ready-made classifiers
// ============================================================================

/// Binary logistic classifier over `n_features` inputs.
///
/// `probability = sigmoid(sum(features))`, output shape `[batch, 1]`, so the
/// predicted class is 1 exactly when the feature sum is positive.
#[must_use]
pub fn build_pygmy_logistic(n_features: usize) -> Vec<u8> {
    pygmy_logistic(n_features).build()
}

/// Builder form of [`build_pygmy_logistic`], for further customisation.
#[must_use]
pub fn pygmy_logistic(n_features: usize) -> PygmyOnnx {
    PygmyOnnx::new()
        .input("features", vec![PygmyDim::batch(), PygmyDim::Fixed(n_features)])
        .output("probability", vec![PygmyDim::batch(), PygmyDim::Fixed(1)])
        .initializer("W", &[n_features, 1], vec![1.0; n_features])
        .initializer("B", &[1], vec![0.0])
        .node("Gemm", &["features", "W", "B"], &["logits"])
        .node("Sigmoid", &["logits"], &["probability"])
}

/// Multi-class softmax classifier with an identity weight matrix.
///
/// `n_classes` inputs map to `n_classes` probabilities; the predicted
/// class is the index of the largest feature.
#[must_use]
pub fn build_pygmy_softmax(n_classes: usize) -> Vec<u8> {
    let mut identity = vec![0.0; n_classes * n_classes];
    for i in 0..n_classes {
        identity[i * n_classes + i] = 1.0;
    }
    PygmyOnnx::new()
        .input("features", vec![PygmyDim::batch(), PygmyDim::Fixed(n_classes)])
        .output("probabilities", vec![PygmyDim::batch(), PygmyDim::Fixed(n_classes)])
        .initializer("W", &[n_classes, n_classes], identity)
        .initializer("B", &[n_classes], vec![0.0; n_classes])
        .node("MatMul", &["features", "W"], &["scores"])
        .node("Add", &["scores", "B"], &["logits"])
        .node_with_attrs("Softmax", &["logits"], &["probabilities"], vec![("axis", PygmyAttr::Int(-1))])
        .build()
}

/// A model that divides its input by itself, producing NaN on zero input.
#[must_use]
pub fn build_pygmy_nan_on_zero(n_features: usize) -> Vec<u8> {
    PygmyOnnx::new()
        .input("x", vec![PygmyDim::batch(), PygmyDim::Fixed(n_features)])
        .output("y", vec![PygmyDim::batch(), PygmyDim::Fixed(n_features)])
        .node("Div", &["x", "x"], &["y"])
        .build()
}

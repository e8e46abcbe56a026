//! ONNX model reader.
//!
//! Lightweight protobuf parser for `.onnx` files. Extracts the model
//! metadata, the graph signature (inputs/outputs with element type and
//! symbolic shape), the operator nodes with their attributes and the
//! initializer tensors. No `prost` or generated code is needed.
//!
//! # ONNX Protobuf Layout (simplified)
//!
//! ```text
//! ModelProto {
//!   ir_version: int64              (field 1)
//!   producer_name: string          (field 2)
//!   graph: GraphProto              (field 7)
//!     node: [NodeProto]            (field 1)
//!       input/output: [string]     (fields 1, 2)
//!       op_type: string            (field 4)
//!       attribute: [AttributeProto](field 5)
//!     initializer: [TensorProto]   (field 5)
//!     input/output: [ValueInfo]    (fields 11, 12)
//!   opset_import: [OperatorSetId]  (field 8)
//! }
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use modelgate::format::onnx::OnnxModel;
//!
//! let model = OnnxModel::from_file("model.onnx")?;
//! for input in model.graph().runtime_inputs() {
//!     println!("{}: {:?} {:?}", input.name, input.elem_type, input.dims);
//! }
//! ```

mod protobuf;
mod reader;

pub(crate) use protobuf::ProtobufWriter;

use crate::error::Result;
use std::collections::BTreeMap;
use std::path::Path;

/// ONNX data types (from onnx.proto3 TensorProto.DataType)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnnxDataType {
    Float,
    Uint8,
    Int8,
    Uint16,
    Int16,
    Int32,
    Int64,
    String,
    Bool,
    Float16,
    Double,
    Uint32,
    Uint64,
    BFloat16,
    Unknown(i32),
}

impl OnnxDataType {
    pub(crate) fn from_i32(v: i32) -> Self {
        match v {
            1 => Self::Float,
            2 => Self::Uint8,
            3 => Self::Int8,
            4 => Self::Uint16,
            5 => Self::Int16,
            6 => Self::Int32,
            7 => Self::Int64,
            8 => Self::String,
            9 => Self::Bool,
            10 => Self::Float16,
            11 => Self::Double,
            12 => Self::Uint32,
            13 => Self::Uint64,
            16 => Self::BFloat16,
            other => Self::Unknown(other),
        }
    }

    /// Wire value of this type.
    pub fn to_i32(self) -> i32 {
        match self {
            Self::Float => 1,
            Self::Uint8 => 2,
            Self::Int8 => 3,
            Self::Uint16 => 4,
            Self::Int16 => 5,
            Self::Int32 => 6,
            Self::Int64 => 7,
            Self::String => 8,
            Self::Bool => 9,
            Self::Float16 => 10,
            Self::Double => 11,
            Self::Uint32 => 12,
            Self::Uint64 => 13,
            Self::BFloat16 => 16,
            Self::Unknown(v) => v,
        }
    }

    /// Canonical lowercase name used in reports (`float32`, `int64`, ...)
    pub fn name(self) -> String {
        match self {
            Self::Float => "float32".to_string(),
            Self::Uint8 => "uint8".to_string(),
            Self::Int8 => "int8".to_string(),
            Self::Uint16 => "uint16".to_string(),
            Self::Int16 => "int16".to_string(),
            Self::Int32 => "int32".to_string(),
            Self::Int64 => "int64".to_string(),
            Self::String => "string".to_string(),
            Self::Bool => "bool".to_string(),
            Self::Float16 => "float16".to_string(),
            Self::Double => "float64".to_string(),
            Self::Uint32 => "uint32".to_string(),
            Self::Uint64 => "uint64".to_string(),
            Self::BFloat16 => "bfloat16".to_string(),
            Self::Unknown(v) => format!("unknown({v})"),
        }
    }

    /// Whether synthetic numeric probes can be fed to a tensor of this type.
    pub fn is_numeric(self) -> bool {
        !matches!(self, Self::String | Self::Unknown(_))
    }

    /// Whether this is an integer (or boolean) type; probe values get rounded.
    pub fn is_integral(self) -> bool {
        matches!(
            self,
            Self::Uint8
                | Self::Int8
                | Self::Uint16
                | Self::Int16
                | Self::Int32
                | Self::Int64
                | Self::Uint32
                | Self::Uint64
                | Self::Bool
        )
    }
}

/// A tensor extracted from an ONNX file
#[derive(Debug, Clone, PartialEq)]
pub struct OnnxTensor {
    /// Tensor name
    pub name: String,
    /// Tensor shape (dimensions)
    pub shape: Vec<usize>,
    /// Data type
    pub data_type: OnnxDataType,
    /// Raw little-endian bytes of tensor data
    pub raw_data: Vec<u8>,
}

impl OnnxTensor {
    /// Convert tensor data to f32 values
    pub fn to_f32(&self) -> Vec<f32> {
        match self.data_type {
            OnnxDataType::Float => self
                .raw_data
                .chunks_exact(4)
                .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
                .collect(),
            OnnxDataType::Float16 => self
                .raw_data
                .chunks_exact(2)
                .map(|b| f16_to_f32(u16::from_le_bytes([b[0], b[1]])))
                .collect(),
            OnnxDataType::Double => self
                .raw_data
                .chunks_exact(8)
                .map(|b| f64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]) as f32)
                .collect(),
            OnnxDataType::Int8 => self.raw_data.iter().map(|&b| f32::from(b as i8)).collect(),
            OnnxDataType::Uint8 | OnnxDataType::Bool => {
                self.raw_data.iter().map(|&b| f32::from(b)).collect()
            }
            OnnxDataType::Int32 => self
                .raw_data
                .chunks_exact(4)
                .map(|b| i32::from_le_bytes([b[0], b[1], b[2], b[3]]) as f32)
                .collect(),
            OnnxDataType::Int64 => self.to_i64().into_iter().map(|v| v as f32).collect(),
            _ => Vec::new(),
        }
    }

    /// Convert integer tensor data to i64 (shape tensors for `Reshape`)
    pub fn to_i64(&self) -> Vec<i64> {
        match self.data_type {
            OnnxDataType::Int64 => self
                .raw_data
                .chunks_exact(8)
                .map(|b| i64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]))
                .collect(),
            OnnxDataType::Int32 => self
                .raw_data
                .chunks_exact(4)
                .map(|b| i64::from(i32::from_le_bytes([b[0], b[1], b[2], b[3]])))
                .collect(),
            _ => self.to_f32().into_iter().map(|v| v as i64).collect(),
        }
    }
}

/// Convert IEEE 754 half-precision to single-precision
fn f16_to_f32(bits: u16) -> f32 {
    let sign = u32::from((bits >> 15) & 1);
    let exponent = u32::from((bits >> 10) & 0x1F);
    let mantissa = u32::from(bits & 0x3FF);

    if exponent == 0 {
        if mantissa == 0 {
            return f32::from_bits(sign << 31);
        }
        // Subnormal
        let mut m = mantissa;
        let mut e = 0u32;
        while (m & 0x400) == 0 {
            m <<= 1;
            e += 1;
        }
        let f32_exp = 127 - 15 + 1 - e;
        f32::from_bits((sign << 31) | (f32_exp << 23) | ((m & 0x3FF) << 13))
    } else if exponent == 31 {
        f32::from_bits((sign << 31) | (0xFF << 23) | (mantissa << 13))
    } else {
        f32::from_bits((sign << 31) | ((exponent + 127 - 15) << 23) | (mantissa << 13))
    }
}

/// One dimension of a declared value shape
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OnnxDim {
    /// `dim_value`
    Value(i64),
    /// `dim_param` (symbolic, e.g. `batch_size`)
    Param(String),
    /// Neither field set
    Unknown,
}

/// A graph input or output (`ValueInfoProto`)
#[derive(Debug, Clone, PartialEq)]
pub struct OnnxValueInfo {
    /// Value name
    pub name: String,
    /// Element type
    pub elem_type: OnnxDataType,
    /// Declared dims, empty when the shape is absent (rank unknown)
    pub dims: Vec<OnnxDim>,
}

/// Node attribute payload (`AttributeProto`)
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    Float(f32),
    Int(i64),
    String(String),
    Tensor(OnnxTensor),
    Floats(Vec<f32>),
    Ints(Vec<i64>),
    /// Graph-valued or otherwise unused attribute kinds
    Other,
}

/// An operator node (`NodeProto`)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OnnxNode {
    pub name: String,
    pub op_type: String,
    pub domain: String,
    pub inputs: Vec<String>,
    pub outputs: Vec<String>,
    pub attributes: BTreeMap<String, AttributeValue>,
}

impl OnnxNode {
    /// Integer attribute, if present
    pub fn attr_int(&self, name: &str) -> Option<i64> {
        match self.attributes.get(name) {
            Some(AttributeValue::Int(v)) => Some(*v),
            _ => None,
        }
    }

    /// Float attribute, if present
    pub fn attr_float(&self, name: &str) -> Option<f32> {
        match self.attributes.get(name) {
            Some(AttributeValue::Float(v)) => Some(*v),
            _ => None,
        }
    }

    /// Integer list attribute, if present
    pub fn attr_ints(&self, name: &str) -> Option<&[i64]> {
        match self.attributes.get(name) {
            Some(AttributeValue::Ints(v)) => Some(v),
            _ => None,
        }
    }

    /// Tensor attribute, if present
    pub fn attr_tensor(&self, name: &str) -> Option<&OnnxTensor> {
        match self.attributes.get(name) {
            Some(AttributeValue::Tensor(t)) => Some(t),
            _ => None,
        }
    }

    /// Non-empty input names; optional inputs are encoded as `""`
    pub fn present_inputs(&self) -> impl Iterator<Item = &str> {
        self.inputs.iter().map(String::as_str).filter(|s| !s.is_empty())
    }
}

/// The computation graph (`GraphProto`)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OnnxGraph {
    pub name: String,
    pub nodes: Vec<OnnxNode>,
    pub initializers: Vec<OnnxTensor>,
    pub inputs: Vec<OnnxValueInfo>,
    pub outputs: Vec<OnnxValueInfo>,
}

impl OnnxGraph {
    /// Graph inputs that must be fed at run time.
    ///
    /// Older exporters list every initializer as a graph input too; those
    /// have a default value and are excluded here.
    pub fn runtime_inputs(&self) -> impl Iterator<Item = &OnnxValueInfo> {
        self.inputs
            .iter()
            .filter(|input| !self.initializers.iter().any(|t| t.name == input.name))
    }

    /// Operator type histogram, sorted by name
    pub fn op_histogram(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for node in &self.nodes {
            *counts.entry(node.op_type.clone()).or_insert(0) += 1;
        }
        counts
    }
}

/// ONNX model metadata
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OnnxMetadata {
    /// IR version
    pub ir_version: i64,
    /// Producer name
    pub producer_name: String,
    /// Producer version
    pub producer_version: String,
    /// Domain
    pub domain: String,
    /// Model version
    pub model_version: i64,
    /// Doc string
    pub doc_string: String,
    /// Opset imports
    pub opset_versions: Vec<(String, i64)>,
}

/// A parsed ONNX model
#[derive(Debug, Clone, PartialEq)]
pub struct OnnxModel {
    metadata: OnnxMetadata,
    graph: OnnxGraph,
}

impl OnnxModel {
    /// Read an ONNX file from disk
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let data = std::fs::read(path.as_ref())?;
        Self::from_bytes(&data)
    }

    /// Parse ONNX data from bytes
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let (metadata, graph) = reader::parse_model(data)?;
        Ok(Self { metadata, graph })
    }

    /// Model metadata
    pub fn metadata(&self) -> &OnnxMetadata {
        &self.metadata
    }

    /// Computation graph
    pub fn graph(&self) -> &OnnxGraph {
        &self.graph
    }

    /// Version of the default (`ai.onnx`) operator set, if imported
    pub fn default_opset(&self) -> Option<i64> {
        self.metadata
            .opset_versions
            .iter()
            .find(|(domain, _)| domain.is_empty() || domain == "ai.onnx")
            .map(|(_, version)| *version)
    }
}

#[cfg(test)]
#[path = "onnx_tests.rs"]
mod tests;

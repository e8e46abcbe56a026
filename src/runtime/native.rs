//! Pure-Rust ONNX interpreter.
//!
//! Executes the operator subset that exported classical classifiers and
//! small MLPs are built from. Graphs using anything else are rejected at
//! open time with [`GateError::UnsupportedOperator`], so a model never
//! fails half way through an evaluation because of a missing kernel.
//!
//! Nodes run in file order (ONNX requires topological order).

use super::{element_count, Backend, Dim, InferenceSession, ModelSignature, NamedTensors, Tensor, TensorSpec};
use crate::error::{GateError, Result};
use crate::format::onnx::{OnnxDataType, OnnxDim, OnnxModel, OnnxNode, OnnxValueInfo};
use std::collections::HashMap;
use std::path::Path;
use tracing::debug;

/// Operators the interpreter can execute
pub const SUPPORTED_OPS: &[&str] = &[
    "Add", "Cast", "Clip", "Constant", "Div", "Dropout", "Exp", "Flatten", "Gemm", "Identity",
    "LeakyRelu", "MatMul", "Mul", "Relu", "Reshape", "Sigmoid", "Softmax", "Sub", "Tanh",
];

/// Backend running models through [`NativeSession`]
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeBackend;

impl Backend for NativeBackend {
    fn name(&self) -> &'static str {
        "native"
    }

    fn open(&self, path: &Path) -> Result<Box<dyn InferenceSession>> {
        let model = OnnxModel::from_file(path).map_err(|e| match e {
            GateError::Io(io) => GateError::ModelLoad {
                path: path.to_path_buf(),
                reason: io.to_string(),
            },
            other => other,
        })?;
        Ok(Box::new(NativeSession::from_model(&model)?))
    }
}

/// Convert a declared ONNX value into a [`TensorSpec`]
pub(crate) fn tensor_spec(info: &OnnxValueInfo) -> TensorSpec {
    TensorSpec {
        name: info.name.clone(),
        shape: info
            .dims
            .iter()
            .map(|d| match d {
                OnnxDim::Value(v) if *v > 0 => Dim::Fixed(*v as usize),
                OnnxDim::Param(p) if !p.is_empty() => Dim::Dynamic(p.clone()),
                _ => Dim::Dynamic("?".to_string()),
            })
            .collect(),
        element_type: info.elem_type.name(),
    }
}

/// Signature of a parsed model (initializer-backed inputs excluded)
pub(crate) fn model_signature(model: &OnnxModel) -> ModelSignature {
    let graph = model.graph();
    ModelSignature {
        inputs: graph.runtime_inputs().map(tensor_spec).collect(),
        outputs: graph.outputs.iter().map(tensor_spec).collect(),
    }
}

/// An opened model ready to interpret
#[derive(Debug, Clone)]
pub struct NativeSession {
    signature: ModelSignature,
    nodes: Vec<OnnxNode>,
    constants: HashMap<String, Tensor>,
    opset: i64,
}

impl NativeSession {
    /// Prepare a parsed model for execution
    pub fn from_model(model: &OnnxModel) -> Result<Self> {
        let graph = model.graph();
        for node in &graph.nodes {
            let default_domain = node.domain.is_empty() || node.domain == "ai.onnx";
            if !default_domain || !SUPPORTED_OPS.contains(&node.op_type.as_str()) {
                return Err(GateError::UnsupportedOperator {
                    op_type: node.op_type.clone(),
                    backend: "native".to_string(),
                });
            }
        }

        let mut constants = HashMap::new();
        for init in &graph.initializers {
            if !init.data_type.is_numeric() {
                return Err(GateError::format(format!(
                    "initializer '{}' has non-numeric type {}",
                    init.name,
                    init.data_type.name()
                )));
            }
            if element_count(&init.shape).is_err() {
                return Err(GateError::format(format!(
                    "initializer '{}' shape {:?} has too many elements",
                    init.name, init.shape
                )));
            }
            let tensor = Tensor::new(init.shape.clone(), init.to_f32()).map_err(|_| {
                GateError::format(format!(
                    "initializer '{}' holds {} bytes, too few for shape {:?}",
                    init.name,
                    init.raw_data.len(),
                    init.shape
                ))
            })?;
            constants.insert(init.name.clone(), tensor);
        }

        let signature = model_signature(model);
        if signature.inputs.is_empty() || signature.outputs.is_empty() {
            return Err(GateError::format("graph declares no inputs or no outputs"));
        }

        debug!(
            nodes = graph.nodes.len(),
            initializers = constants.len(),
            "native session ready"
        );
        Ok(Self {
            signature,
            nodes: graph.nodes.clone(),
            constants,
            opset: model.default_opset().unwrap_or(13),
        })
    }

    fn execute(&self, node: &OnnxNode, env: &HashMap<String, Tensor>) -> Result<Vec<Tensor>> {
        let arg = |idx: usize| -> Result<&Tensor> {
            let name = node
                .inputs
                .get(idx)
                .filter(|n| !n.is_empty())
                .ok_or_else(|| missing_input(node, idx))?;
            env.get(name).ok_or_else(|| {
                GateError::inference(format!("{} input '{name}' has not been computed", node.op_type))
            })
        };
        let optional = |idx: usize| -> Option<&Tensor> {
            node.inputs
                .get(idx)
                .filter(|n| !n.is_empty())
                .and_then(|n| env.get(n))
        };

        let out = match node.op_type.as_str() {
            "Identity" | "Dropout" => arg(0)?.clone(),
            "Constant" => node
                .attr_tensor("value")
                .map(|t| Tensor::new(t.shape.clone(), t.to_f32()))
                .transpose()?
                .or_else(|| node.attr_float("value_float").map(Tensor::scalar))
                .ok_or_else(|| GateError::inference("Constant node without a value"))?,
            "Relu" => map(arg(0)?, |v| v.max(0.0)),
            "LeakyRelu" => {
                let alpha = node.attr_float("alpha").unwrap_or(0.01);
                map(arg(0)?, |v| if v >= 0.0 { v } else { alpha * v })
            }
            "Sigmoid" => map(arg(0)?, |v| 1.0 / (1.0 + (-v).exp())),
            "Tanh" => map(arg(0)?, f32::tanh),
            "Exp" => map(arg(0)?, f32::exp),
            "Cast" => cast(arg(0)?, node.attr_int("to").unwrap_or(1)),
            "Clip" => {
                let lo = optional(1)
                    .and_then(|t| t.data.first().copied())
                    .or_else(|| node.attr_float("min"))
                    .unwrap_or(f32::NEG_INFINITY);
                let hi = optional(2)
                    .and_then(|t| t.data.first().copied())
                    .or_else(|| node.attr_float("max"))
                    .unwrap_or(f32::INFINITY);
                map(arg(0)?, |v| v.max(lo).min(hi))
            }
            "Add" => broadcast(arg(0)?, arg(1)?, |a, b| a + b)?,
            "Sub" => broadcast(arg(0)?, arg(1)?, |a, b| a - b)?,
            "Mul" => broadcast(arg(0)?, arg(1)?, |a, b| a * b)?,
            "Div" => broadcast(arg(0)?, arg(1)?, |a, b| a / b)?,
            "MatMul" => matmul(arg(0)?, arg(1)?)?,
            "Gemm" => gemm(node, arg(0)?, arg(1)?, optional(2))?,
            "Softmax" => softmax(node, arg(0)?, self.opset)?,
            "Flatten" => flatten(arg(0)?, node.attr_int("axis").unwrap_or(1))?,
            "Reshape" => reshape(arg(0)?, arg(1)?)?,
            other => {
                return Err(GateError::UnsupportedOperator {
                    op_type: other.to_string(),
                    backend: "native".to_string(),
                })
            }
        };

        // Dropout's optional mask output is all ones in inference mode
        let mut outputs = vec![out];
        if node.op_type == "Dropout" && node.outputs.len() > 1 {
            outputs.push(Tensor::filled(outputs[0].shape.clone(), 1.0)?);
        }
        Ok(outputs)
    }
}

impl InferenceSession for NativeSession {
    fn signature(&self) -> &ModelSignature {
        &self.signature
    }

    fn run(&mut self, inputs: &[(String, Tensor)]) -> Result<NamedTensors> {
        let mut env = self.constants.clone();
        for spec in &self.signature.inputs {
            let (_, tensor) = inputs
                .iter()
                .find(|(name, _)| *name == spec.name)
                .ok_or_else(|| GateError::inference(format!("missing input '{}'", spec.name)))?;
            if !spec.accepts(&tensor.shape) {
                return Err(GateError::inference(format!(
                    "input '{}' has shape {:?}, model declares {}",
                    spec.name,
                    tensor.shape,
                    spec.shape_string()
                )));
            }
            let value = if spec.is_integral() {
                map(tensor, f32::trunc)
            } else {
                tensor.clone()
            };
            env.insert(spec.name.clone(), value);
        }

        for node in &self.nodes {
            let outputs = self.execute(node, &env)?;
            for (name, value) in node.outputs.iter().zip(outputs) {
                if !name.is_empty() {
                    env.insert(name.clone(), value);
                }
            }
        }

        self.signature
            .outputs
            .iter()
            .map(|spec| {
                env.remove(&spec.name)
                    .map(|t| (spec.name.clone(), t))
                    .ok_or_else(|| {
                        GateError::inference(format!("graph output '{}' was never produced", spec.name))
                    })
            })
            .collect()
    }
}

fn missing_input(node: &OnnxNode, idx: usize) -> GateError {
    GateError::inference(format!("{} node '{}' is missing input #{idx}", node.op_type, node.name))
}

fn map(x: &Tensor, f: impl Fn(f32) -> f32) -> Tensor {
    Tensor {
        shape: x.shape.clone(),
        data: x.data.iter().map(|&v| f(v)).collect(),
    }
}

fn cast(x: &Tensor, to: i64) -> Tensor {
    let target = OnnxDataType::from_i32(to as i32);
    if target == OnnxDataType::Bool {
        map(x, |v| if v == 0.0 { 0.0 } else { 1.0 })
    } else if target.is_integral() {
        map(x, f32::trunc)
    } else {
        x.clone()
    }
}

/// Numpy-style broadcast of two shapes
fn broadcast_shape(a: &[usize], b: &[usize]) -> Result<Vec<usize>> {
    let rank = a.len().max(b.len());
    let mut out = vec![0; rank];
    for i in 0..rank {
        let da = if i + a.len() >= rank { a[i + a.len() - rank] } else { 1 };
        let db = if i + b.len() >= rank { b[i + b.len() - rank] } else { 1 };
        out[i] = match (da, db) {
            (x, y) if x == y => x,
            (1, y) => y,
            (x, 1) => x,
            _ => {
                return Err(GateError::inference(format!(
                    "shapes {a:?} and {b:?} cannot be broadcast"
                )))
            }
        };
    }
    Ok(out)
}

/// Strides of `shape` aligned to `out_rank`, 0 where the dim is broadcast
fn broadcast_strides(shape: &[usize], out_rank: usize) -> Vec<usize> {
    let mut strides = vec![0; out_rank];
    let mut stride = 1;
    for (i, &dim) in shape.iter().enumerate().rev() {
        let slot = out_rank - shape.len() + i;
        strides[slot] = if dim == 1 { 0 } else { stride };
        stride *= dim;
    }
    strides
}

fn broadcast(a: &Tensor, b: &Tensor, f: impl Fn(f32, f32) -> f32) -> Result<Tensor> {
    if a.shape == b.shape {
        let data = a.data.iter().zip(&b.data).map(|(&x, &y)| f(x, y)).collect();
        return Ok(Tensor {
            shape: a.shape.clone(),
            data,
        });
    }
    let shape = broadcast_shape(&a.shape, &b.shape)?;
    let sa = broadcast_strides(&a.shape, shape.len());
    let sb = broadcast_strides(&b.shape, shape.len());
    let n: usize = shape.iter().product();
    let mut data = Vec::with_capacity(n);
    let mut index = vec![0usize; shape.len()];
    for _ in 0..n {
        let oa: usize = index.iter().zip(&sa).map(|(i, s)| i * s).sum();
        let ob: usize = index.iter().zip(&sb).map(|(i, s)| i * s).sum();
        data.push(f(a.data[oa], b.data[ob]));
        for axis in (0..shape.len()).rev() {
            index[axis] += 1;
            if index[axis] < shape[axis] {
                break;
            }
            index[axis] = 0;
        }
    }
    Ok(Tensor { shape, data })
}

/// `[m, k] x [k, n]` into `out`
fn matmul_2d(a: &[f32], b: &[f32], m: usize, k: usize, n: usize, out: &mut Vec<f32>) {
    for i in 0..m {
        for j in 0..n {
            let mut acc = 0.0f32;
            for p in 0..k {
                acc += a[i * k + p] * b[p * n + j];
            }
            out.push(acc);
        }
    }
}

/// MatMul for rank ≥ 1 operands.
///
/// Leading dims of `a` are treated as a batch; `b` is either a plain
/// matrix shared by every batch entry or has the same batch dims as `a`.
fn matmul(a: &Tensor, b: &Tensor) -> Result<Tensor> {
    let a_vec = a.shape.len() == 1;
    let b_vec = b.shape.len() == 1;
    let a_shape = if a_vec { vec![1, a.shape[0]] } else { a.shape.clone() };
    let b_shape = if b_vec { vec![b.shape[0], 1] } else { b.shape.clone() };
    if a_shape.len() < 2 || b_shape.len() < 2 {
        return Err(GateError::inference("MatMul on a scalar"));
    }

    let (m, k) = (a_shape[a_shape.len() - 2], a_shape[a_shape.len() - 1]);
    let (k2, n) = (b_shape[b_shape.len() - 2], b_shape[b_shape.len() - 1]);
    if k != k2 {
        return Err(GateError::inference(format!(
            "MatMul inner dims differ: {:?} x {:?}",
            a.shape, b.shape
        )));
    }
    let batch_dims = &a_shape[..a_shape.len() - 2];
    let batch: usize = batch_dims.iter().product();
    let b_batched = b_shape.len() > 2;
    if b_batched && b_shape[..b_shape.len() - 2] != *batch_dims {
        return Err(GateError::inference(format!(
            "MatMul batch dims differ: {:?} x {:?}",
            a.shape, b.shape
        )));
    }

    let mut data = Vec::with_capacity(batch * m * n);
    for bi in 0..batch {
        let a_slice = &a.data[bi * m * k..(bi + 1) * m * k];
        let b_slice = if b_batched {
            &b.data[bi * k * n..(bi + 1) * k * n]
        } else {
            &b.data[..]
        };
        matmul_2d(a_slice, b_slice, m, k, n, &mut data);
    }

    let mut shape = batch_dims.to_vec();
    if !a_vec {
        shape.push(m);
    }
    if !b_vec {
        shape.push(n);
    }
    Ok(Tensor { shape, data })
}

fn transpose_2d(x: &Tensor) -> Result<Tensor> {
    let [rows, cols] = x.shape[..] else {
        return Err(GateError::inference(format!("expected a matrix, got shape {:?}", x.shape)));
    };
    let mut data = Vec::with_capacity(x.data.len());
    for c in 0..cols {
        for r in 0..rows {
            data.push(x.data[r * cols + c]);
        }
    }
    Ok(Tensor {
        shape: vec![cols, rows],
        data,
    })
}

/// `Y = alpha * A' * B' + beta * C`
fn gemm(node: &OnnxNode, a: &Tensor, b: &Tensor, c: Option<&Tensor>) -> Result<Tensor> {
    let alpha = node.attr_float("alpha").unwrap_or(1.0);
    let beta = node.attr_float("beta").unwrap_or(1.0);
    let a = if node.attr_int("transA").unwrap_or(0) != 0 {
        transpose_2d(a)?
    } else {
        a.clone()
    };
    let b = if node.attr_int("transB").unwrap_or(0) != 0 {
        transpose_2d(b)?
    } else {
        b.clone()
    };
    if a.shape.len() != 2 || b.shape.len() != 2 {
        return Err(GateError::inference(format!(
            "Gemm needs matrices, got {:?} x {:?}",
            a.shape, b.shape
        )));
    }
    let product = matmul(&a, &b)?;
    let scaled = map(&product, |v| alpha * v);
    match c {
        Some(c) => broadcast(&scaled, c, |y, c| y + beta * c),
        None => Ok(scaled),
    }
}

fn normalize_axis(axis: i64, rank: usize) -> Result<usize> {
    let resolved = if axis < 0 { axis + rank as i64 } else { axis };
    if resolved < 0 || resolved as usize > rank {
        return Err(GateError::inference(format!("axis {axis} out of range for rank {rank}")));
    }
    Ok(resolved as usize)
}

fn softmax_in_place(values: &mut [f32]) {
    let max = values.iter().fold(f32::NEG_INFINITY, |a, &b| a.max(b));
    let mut sum = 0.0;
    for v in values.iter_mut() {
        *v = (*v - max).exp();
        sum += *v;
    }
    for v in values.iter_mut() {
        *v /= sum;
    }
}

/// Softmax; opset < 13 coerces to 2-D at `axis` (default 1), later opsets
/// normalise along the single `axis` (default -1).
fn softmax(node: &OnnxNode, x: &Tensor, opset: i64) -> Result<Tensor> {
    let rank = x.shape.len().max(1);
    let legacy = opset < 13;
    let default_axis = if legacy { 1 } else { -1 };
    let axis = normalize_axis(node.attr_int("axis").unwrap_or(default_axis), rank)?;
    let mut out = x.clone();
    if x.shape.is_empty() {
        softmax_in_place(&mut out.data);
        return Ok(out);
    }

    if legacy {
        let inner: usize = x.shape[axis..].iter().product();
        for chunk in out.data.chunks_mut(inner.max(1)) {
            softmax_in_place(chunk);
        }
        return Ok(out);
    }

    let axis = axis.min(rank - 1);
    let dim = x.shape[axis];
    let inner: usize = x.shape[axis + 1..].iter().product();
    let outer: usize = x.shape[..axis].iter().product();
    let mut lane = vec![0.0; dim];
    for o in 0..outer {
        for i in 0..inner {
            for d in 0..dim {
                lane[d] = x.data[(o * dim + d) * inner + i];
            }
            softmax_in_place(&mut lane);
            for d in 0..dim {
                out.data[(o * dim + d) * inner + i] = lane[d];
            }
        }
    }
    Ok(out)
}

fn flatten(x: &Tensor, axis: i64) -> Result<Tensor> {
    let axis = normalize_axis(axis, x.shape.len())?;
    let outer: usize = x.shape[..axis].iter().product();
    let inner: usize = x.shape[axis..].iter().product();
    Ok(Tensor {
        shape: vec![outer, inner],
        data: x.data.clone(),
    })
}

fn reshape(x: &Tensor, target: &Tensor) -> Result<Tensor> {
    let mut shape = Vec::with_capacity(target.data.len());
    let mut infer_at = None;
    for (i, &raw) in target.data.iter().enumerate() {
        let d = raw as i64;
        match d {
            -1 if infer_at.is_none() => {
                infer_at = Some(i);
                shape.push(1);
            }
            0 => shape.push(x.shape.get(i).copied().ok_or_else(|| {
                GateError::inference(format!("Reshape copies dim {i} of rank-{} input", x.shape.len()))
            })?),
            d if d > 0 => shape.push(d as usize),
            _ => return Err(GateError::inference(format!("invalid Reshape target {:?}", target.data))),
        }
    }
    let known = element_count(&shape)
        .map_err(|_| GateError::inference(format!("Reshape target {shape:?} has too many elements")))?;
    if let Some(i) = infer_at {
        if known == 0 || x.numel() % known != 0 {
            return Err(GateError::dimension_mismatch("Reshape", known, x.numel()));
        }
        shape[i] = x.numel() / known;
    }
    Tensor::new(shape, x.data.clone())
}

#[cfg(test)]
#[path = "native_tests.rs"]
mod tests;

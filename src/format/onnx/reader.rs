//! `ModelProto` decoding.

use super::protobuf::{ProtobufReader, WIRE_FIXED32, WIRE_FIXED64, WIRE_LEN, WIRE_VARINT};
use super::{
    AttributeValue, OnnxDataType, OnnxDim, OnnxGraph, OnnxMetadata, OnnxNode, OnnxTensor,
    OnnxValueInfo,
};
use crate::error::{GateError, Result};

pub(super) fn parse_model(data: &[u8]) -> Result<(OnnxMetadata, OnnxGraph)> {
    if data.is_empty() {
        return Err(GateError::format("file is empty"));
    }
    let mut reader = ProtobufReader::new(data);
    let mut metadata = OnnxMetadata::default();
    let mut graph = None;

    while reader.has_more() {
        let (field_num, wire_type) = reader.read_tag()?;
        match (field_num, wire_type) {
            (1, WIRE_VARINT) => metadata.ir_version = reader.read_varint()? as i64,
            (2, WIRE_LEN) => metadata.producer_name = reader.read_string()?,
            (3, WIRE_LEN) => metadata.producer_version = reader.read_string()?,
            (4, WIRE_LEN) => metadata.domain = reader.read_string()?,
            (5, WIRE_VARINT) => metadata.model_version = reader.read_varint()? as i64,
            (6, WIRE_LEN) => metadata.doc_string = reader.read_string()?,
            (7, WIRE_LEN) => graph = Some(parse_graph(reader.read_bytes()?)?),
            (8, WIRE_LEN) => {
                let opset = parse_opset_import(reader.read_bytes()?)?;
                metadata.opset_versions.push(opset);
            }
            _ => reader.skip_field(field_num, wire_type)?,
        }
    }

    let graph = graph.ok_or_else(|| GateError::format("ModelProto has no graph"))?;
    Ok((metadata, graph))
}

fn parse_graph(data: &[u8]) -> Result<OnnxGraph> {
    let mut reader = ProtobufReader::new(data);
    let mut graph = OnnxGraph::default();
    while reader.has_more() {
        let (field_num, wire_type) = reader.read_tag()?;
        match (field_num, wire_type) {
            (1, WIRE_LEN) => graph.nodes.push(parse_node(reader.read_bytes()?)?),
            (2, WIRE_LEN) => graph.name = reader.read_string()?,
            (5, WIRE_LEN) => graph.initializers.push(parse_tensor(reader.read_bytes()?)?),
            (11, WIRE_LEN) => graph.inputs.push(parse_value_info(reader.read_bytes()?)?),
            (12, WIRE_LEN) => graph.outputs.push(parse_value_info(reader.read_bytes()?)?),
            _ => reader.skip_field(field_num, wire_type)?,
        }
    }
    Ok(graph)
}

/// Parse OperatorSetIdProto
fn parse_opset_import(data: &[u8]) -> Result<(String, i64)> {
    let mut reader = ProtobufReader::new(data);
    let mut domain = String::new();
    let mut version = 0i64;
    while reader.has_more() {
        let (field_num, wire_type) = reader.read_tag()?;
        match (field_num, wire_type) {
            (1, WIRE_LEN) => domain = reader.read_string()?,
            (2, WIRE_VARINT) => version = reader.read_varint()? as i64,
            _ => reader.skip_field(field_num, wire_type)?,
        }
    }
    Ok((domain, version))
}

fn parse_node(data: &[u8]) -> Result<OnnxNode> {
    let mut reader = ProtobufReader::new(data);
    let mut node = OnnxNode::default();
    while reader.has_more() {
        let (field_num, wire_type) = reader.read_tag()?;
        match (field_num, wire_type) {
            (1, WIRE_LEN) => node.inputs.push(reader.read_string()?),
            (2, WIRE_LEN) => node.outputs.push(reader.read_string()?),
            (3, WIRE_LEN) => node.name = reader.read_string()?,
            (4, WIRE_LEN) => node.op_type = reader.read_string()?,
            (5, WIRE_LEN) => {
                let (name, value) = parse_attribute(reader.read_bytes()?)?;
                node.attributes.insert(name, value);
            }
            (7, WIRE_LEN) => node.domain = reader.read_string()?,
            _ => reader.skip_field(field_num, wire_type)?,
        }
    }
    if node.op_type.is_empty() {
        return Err(GateError::format(format!("node '{}' has no op_type", node.name)));
    }
    Ok(node)
}

/// Parse AttributeProto
///
/// The `type` field (20) is authoritative when present; otherwise the
/// populated payload decides.
fn parse_attribute(data: &[u8]) -> Result<(String, AttributeValue)> {
    let mut reader = ProtobufReader::new(data);
    let mut name = String::new();
    let mut attr_type = 0i64;
    let mut f = None;
    let mut i = None;
    let mut s = None;
    let mut t = None;
    let mut floats = Vec::new();
    let mut ints = Vec::new();
    while reader.has_more() {
        let (field_num, wire_type) = reader.read_tag()?;
        match (field_num, wire_type) {
            (1, WIRE_LEN) => name = reader.read_string()?,
            (2, WIRE_FIXED32) => f = Some(reader.read_f32()?),
            (3, WIRE_VARINT) => i = Some(reader.read_varint()? as i64),
            (4, WIRE_LEN) => s = Some(String::from_utf8_lossy(reader.read_bytes()?).into_owned()),
            (5, WIRE_LEN) => t = Some(parse_tensor(reader.read_bytes()?)?),
            (7, _) => reader.read_floats_into(wire_type, &mut floats)?,
            (8, _) => reader.read_varints_into(wire_type, &mut ints)?,
            (20, WIRE_VARINT) => attr_type = reader.read_varint()? as i64,
            _ => reader.skip_field(field_num, wire_type)?,
        }
    }

    // AttributeType: FLOAT=1 INT=2 STRING=3 TENSOR=4 FLOATS=6 INTS=7
    let value = match (attr_type, f, i, s, t) {
        (1, Some(v), _, _, _) | (0, Some(v), None, None, None) => AttributeValue::Float(v),
        (2, _, Some(v), _, _) | (0, None, Some(v), None, None) => AttributeValue::Int(v),
        (3, _, _, Some(v), _) | (0, None, None, Some(v), None) => AttributeValue::String(v),
        (4, _, _, _, Some(v)) | (0, None, None, None, Some(v)) => AttributeValue::Tensor(v),
        (6, ..) => AttributeValue::Floats(floats),
        (7, ..) => AttributeValue::Ints(ints),
        (0, ..) if !floats.is_empty() => AttributeValue::Floats(floats),
        (0, ..) if !ints.is_empty() => AttributeValue::Ints(ints),
        // Unset scalar fields decode as their zero value
        (1, None, ..) => AttributeValue::Float(0.0),
        (2, _, None, ..) => AttributeValue::Int(0),
        _ => AttributeValue::Other,
    };
    Ok((name, value))
}

fn parse_value_info(data: &[u8]) -> Result<OnnxValueInfo> {
    let mut reader = ProtobufReader::new(data);
    let mut info = OnnxValueInfo {
        name: String::new(),
        elem_type: OnnxDataType::Unknown(0),
        dims: Vec::new(),
    };
    while reader.has_more() {
        let (field_num, wire_type) = reader.read_tag()?;
        match (field_num, wire_type) {
            (1, WIRE_LEN) => info.name = reader.read_string()?,
            (2, WIRE_LEN) => parse_type_proto(reader.read_bytes()?, &mut info)?,
            _ => reader.skip_field(field_num, wire_type)?,
        }
    }
    Ok(info)
}

/// TypeProto: only `tensor_type` (field 1) is understood
fn parse_type_proto(data: &[u8], info: &mut OnnxValueInfo) -> Result<()> {
    let mut reader = ProtobufReader::new(data);
    while reader.has_more() {
        let (field_num, wire_type) = reader.read_tag()?;
        if (field_num, wire_type) != (1, WIRE_LEN) {
            reader.skip_field(field_num, wire_type)?;
            continue;
        }
        let mut tensor_type = ProtobufReader::new(reader.read_bytes()?);
        while tensor_type.has_more() {
            let (field_num, wire_type) = tensor_type.read_tag()?;
            match (field_num, wire_type) {
                (1, WIRE_VARINT) => {
                    info.elem_type = OnnxDataType::from_i32(tensor_type.read_varint()? as i32);
                }
                (2, WIRE_LEN) => info.dims = parse_shape(tensor_type.read_bytes()?)?,
                _ => tensor_type.skip_field(field_num, wire_type)?,
            }
        }
    }
    Ok(())
}

fn parse_shape(data: &[u8]) -> Result<Vec<OnnxDim>> {
    let mut reader = ProtobufReader::new(data);
    let mut dims = Vec::new();
    while reader.has_more() {
        let (field_num, wire_type) = reader.read_tag()?;
        if (field_num, wire_type) != (1, WIRE_LEN) {
            reader.skip_field(field_num, wire_type)?;
            continue;
        }
        let mut dim_reader = ProtobufReader::new(reader.read_bytes()?);
        let mut dim = OnnxDim::Unknown;
        while dim_reader.has_more() {
            let (field_num, wire_type) = dim_reader.read_tag()?;
            match (field_num, wire_type) {
                (1, WIRE_VARINT) => dim = OnnxDim::Value(dim_reader.read_varint()? as i64),
                (2, WIRE_LEN) => dim = OnnxDim::Param(dim_reader.read_string()?),
                _ => dim_reader.skip_field(field_num, wire_type)?,
            }
        }
        dims.push(dim);
    }
    Ok(dims)
}

/// Parse TensorProto
fn parse_tensor(data: &[u8]) -> Result<OnnxTensor> {
    let mut reader = ProtobufReader::new(data);
    let mut name = String::new();
    let mut dims: Vec<i64> = Vec::new();
    let mut data_type = OnnxDataType::Float;
    let mut raw_data: Vec<u8> = Vec::new();
    let mut float_data: Vec<f32> = Vec::new();
    let mut int_data: Vec<i64> = Vec::new();
    let mut double_data: Vec<f64> = Vec::new();
    let mut external = false;
    while reader.has_more() {
        let (field_num, wire_type) = reader.read_tag()?;
        match (field_num, wire_type) {
            (1, _) => reader.read_varints_into(wire_type, &mut dims)?,
            (2, WIRE_VARINT) => data_type = OnnxDataType::from_i32(reader.read_varint()? as i32),
            (4, _) => reader.read_floats_into(wire_type, &mut float_data)?,
            // int32_data and int64_data share varint encoding
            (5 | 7, _) => reader.read_varints_into(wire_type, &mut int_data)?,
            (8, WIRE_LEN) => name = reader.read_string()?,
            (9, WIRE_LEN) => raw_data = reader.read_bytes()?.to_vec(),
            (10, WIRE_LEN) => {
                double_data.extend(reader.read_bytes()?.chunks_exact(8).map(|c| {
                    f64::from_le_bytes([c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]])
                }));
            }
            (10, WIRE_FIXED64) => double_data.push(reader.read_f64()?),
            (13, WIRE_LEN) => {
                external = true;
                reader.skip_field(field_num, wire_type)?;
            }
            _ => reader.skip_field(field_num, wire_type)?,
        }
    }

    if external {
        return Err(GateError::format(format!(
            "initializer '{name}' uses external data, which is not supported"
        )));
    }

    if raw_data.is_empty() {
        raw_data = match data_type {
            OnnxDataType::Float => float_data.iter().flat_map(|f| f.to_le_bytes()).collect(),
            OnnxDataType::Double => double_data.iter().flat_map(|d| d.to_le_bytes()).collect(),
            OnnxDataType::Int64 => int_data.iter().flat_map(|i| i.to_le_bytes()).collect(),
            OnnxDataType::Int32 => int_data
                .iter()
                .flat_map(|&i| (i as i32).to_le_bytes())
                .collect(),
            OnnxDataType::Int8 | OnnxDataType::Uint8 | OnnxDataType::Bool => {
                int_data.iter().map(|&i| i as u8).collect()
            }
            _ => Vec::new(),
        };
    }

    let shape = dims
        .into_iter()
        .map(|d| {
            usize::try_from(d)
                .map_err(|_| GateError::format(format!("initializer '{name}' has dim {d}")))
        })
        .collect::<Result<Vec<_>>>()?;
    if shape.iter().try_fold(1usize, |n, &d| n.checked_mul(d)).is_none() {
        return Err(GateError::format(format!(
            "initializer '{name}' shape {shape:?} has too many elements"
        )));
    }

    Ok(OnnxTensor {
        name,
        shape,
        data_type,
        raw_data,
    })
}

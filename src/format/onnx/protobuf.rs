//! Minimal protobuf wire-format reader and writer.
//!
//! Only the four wire types used by `onnx.proto3` are handled: varint (0),
//! 64-bit (1), length-delimited (2) and 32-bit (5).

use crate::error::{GateError, Result};

pub(crate) const WIRE_VARINT: u32 = 0;
pub(crate) const WIRE_FIXED64: u32 = 1;
pub(crate) const WIRE_LEN: u32 = 2;
pub(crate) const WIRE_FIXED32: u32 = 5;

/// Cursor over a protobuf message.
pub(crate) struct ProtobufReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ProtobufReader<'a> {
    pub(crate) fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub(crate) fn has_more(&self) -> bool {
        self.pos < self.data.len()
    }

    pub(crate) fn read_tag(&mut self) -> Result<(u32, u32)> {
        let varint = self.read_varint()?;
        let field_num = (varint >> 3) as u32;
        let wire_type = (varint & 0x7) as u32;
        if field_num == 0 {
            return Err(GateError::format("protobuf field number 0 is invalid"));
        }
        Ok((field_num, wire_type))
    }

    pub(crate) fn read_varint(&mut self) -> Result<u64> {
        let mut result: u64 = 0;
        let mut shift = 0;
        loop {
            let Some(&byte) = self.data.get(self.pos) else {
                return Err(GateError::format("unexpected end of protobuf data"));
            };
            self.pos += 1;
            result |= u64::from(byte & 0x7F) << shift;
            if byte & 0x80 == 0 {
                return Ok(result);
            }
            shift += 7;
            if shift >= 64 {
                return Err(GateError::format("varint overflow"));
            }
        }
    }

    pub(crate) fn read_bytes(&mut self) -> Result<&'a [u8]> {
        let len = self.read_varint()? as usize;
        let end = self
            .pos
            .checked_add(len)
            .filter(|&end| end <= self.data.len())
            .ok_or_else(|| {
                GateError::format(format!(
                    "length-delimited field extends past data ({} + {len} > {})",
                    self.pos,
                    self.data.len()
                ))
            })?;
        let result = &self.data[self.pos..end];
        self.pos = end;
        Ok(result)
    }

    pub(crate) fn read_string(&mut self) -> Result<String> {
        let bytes = self.read_bytes()?;
        String::from_utf8(bytes.to_vec())
            .map_err(|_| GateError::format("invalid UTF-8 in protobuf string"))
    }

    pub(crate) fn read_f32(&mut self) -> Result<f32> {
        let bytes = self.take::<4>()?;
        Ok(f32::from_le_bytes(bytes))
    }

    pub(crate) fn read_f64(&mut self) -> Result<f64> {
        let bytes = self.take::<8>()?;
        Ok(f64::from_le_bytes(bytes))
    }

    fn take<const N: usize>(&mut self) -> Result<[u8; N]> {
        let slice = self
            .data
            .get(self.pos..self.pos + N)
            .ok_or_else(|| GateError::format(format!("unexpected end reading {N}-byte value")))?;
        let mut out = [0u8; N];
        out.copy_from_slice(slice);
        self.pos += N;
        Ok(out)
    }

    fn skip(&mut self, n: usize) -> Result<()> {
        if self.pos + n > self.data.len() {
            return Err(GateError::format("unexpected end skipping protobuf data"));
        }
        self.pos += n;
        Ok(())
    }

    /// Skip over a field whose tag has already been read.
    pub(crate) fn skip_field(&mut self, field_num: u32, wire_type: u32) -> Result<()> {
        match wire_type {
            WIRE_VARINT => self.read_varint().map(|_| ()),
            WIRE_FIXED64 => self.skip(8),
            WIRE_LEN => self.read_bytes().map(|_| ()),
            WIRE_FIXED32 => self.skip(4),
            other => Err(GateError::format(format!(
                "unknown protobuf wire type {other} for field {field_num}"
            ))),
        }
    }

    /// Decode a packed or single varint field into `out`.
    pub(crate) fn read_varints_into(&mut self, wire_type: u32, out: &mut Vec<i64>) -> Result<()> {
        if wire_type == WIRE_LEN {
            let mut packed = ProtobufReader::new(self.read_bytes()?);
            while packed.has_more() {
                out.push(packed.read_varint()? as i64);
            }
        } else {
            out.push(self.read_varint()? as i64);
        }
        Ok(())
    }

    /// Decode a packed or single float field into `out`.
    pub(crate) fn read_floats_into(&mut self, wire_type: u32, out: &mut Vec<f32>) -> Result<()> {
        if wire_type == WIRE_LEN {
            out.extend(
                self.read_bytes()?
                    .chunks_exact(4)
                    .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]])),
            );
        } else {
            out.push(self.read_f32()?);
        }
        Ok(())
    }
}

/// Append-only protobuf encoder used by the pygmy model factory.
#[derive(Debug, Default)]
pub(crate) struct ProtobufWriter {
    buf: Vec<u8>,
}

impl ProtobufWriter {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn finish(self) -> Vec<u8> {
        self.buf
    }

    fn varint(&mut self, mut value: u64) {
        loop {
            let byte = (value & 0x7F) as u8;
            value >>= 7;
            if value == 0 {
                self.buf.push(byte);
                return;
            }
            self.buf.push(byte | 0x80);
        }
    }

    fn tag(&mut self, field: u32, wire_type: u32) {
        self.varint(u64::from(field << 3 | wire_type));
    }

    pub(crate) fn int(&mut self, field: u32, value: i64) -> &mut Self {
        self.tag(field, WIRE_VARINT);
        self.varint(value as u64);
        self
    }

    pub(crate) fn float(&mut self, field: u32, value: f32) -> &mut Self {
        self.tag(field, WIRE_FIXED32);
        self.buf.extend_from_slice(&value.to_le_bytes());
        self
    }

    pub(crate) fn bytes(&mut self, field: u32, value: &[u8]) -> &mut Self {
        self.tag(field, WIRE_LEN);
        self.varint(value.len() as u64);
        self.buf.extend_from_slice(value);
        self
    }

    pub(crate) fn string(&mut self, field: u32, value: &str) -> &mut Self {
        self.bytes(field, value.as_bytes())
    }

    pub(crate) fn message(&mut self, field: u32, message: ProtobufWriter) -> &mut Self {
        self.bytes(field, &message.finish())
    }

    pub(crate) fn packed_ints(&mut self, field: u32, values: &[i64]) -> &mut Self {
        let mut inner = ProtobufWriter::new();
        for &v in values {
            inner.varint(v as u64);
        }
        self.bytes(field, &inner.finish())
    }

    pub(crate) fn packed_floats(&mut self, field: u32, values: &[f32]) -> &mut Self {
        let raw: Vec<u8> = values.iter().flat_map(|v| v.to_le_bytes()).collect();
        self.bytes(field, &raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_varint_multi_byte() {
        let mut w = ProtobufWriter::new();
        w.int(1, 300);
        let bytes = w.finish();
        assert_eq!(bytes, vec![0x08, 0xAC, 0x02]);

        let mut r = ProtobufReader::new(&bytes);
        assert_eq!(r.read_tag().unwrap(), (1, WIRE_VARINT));
        assert_eq!(r.read_varint().unwrap(), 300);
        assert!(!r.has_more());
    }

    #[test]
    fn test_negative_int_uses_ten_bytes() {
        let mut w = ProtobufWriter::new();
        w.int(2, -1);
        let bytes = w.finish();
        assert_eq!(bytes.len(), 11);
        let mut r = ProtobufReader::new(&bytes);
        r.read_tag().unwrap();
        assert_eq!(r.read_varint().unwrap() as i64, -1);
    }

    #[test]
    fn test_truncated_length_delimited_field() {
        // field 1, wire type 2, length 10, but only 2 bytes follow
        let bytes = [0x0A, 0x0A, 0x01, 0x02];
        let mut r = ProtobufReader::new(&bytes);
        r.read_tag().unwrap();
        let err = r.read_bytes().unwrap_err();
        assert!(err.to_string().contains("extends past data"));
    }

    #[test]
    fn test_unknown_wire_type_rejected() {
        let mut r = ProtobufReader::new(&[0x00]);
        assert!(r.skip_field(9, 7).is_err());
    }

    #[test]
    fn test_field_zero_rejected() {
        let mut r = ProtobufReader::new(&[0x00]);
        assert!(r.read_tag().is_err());
    }

    #[test]
    fn test_packed_floats() {
        let mut w = ProtobufWriter::new();
        w.packed_floats(4, &[1.5, -2.0]);
        let bytes = w.finish();
        let mut r = ProtobufReader::new(&bytes);
        let (_, wire) = r.read_tag().unwrap();
        let mut out = Vec::new();
        r.read_floats_into(wire, &mut out).unwrap();
        assert_eq!(out, vec![1.5, -2.0]);
    }
}

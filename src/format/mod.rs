//! Model artifact formats.
//!
//! Only ONNX is understood. [`test_factory`] builds tiny in-memory ONNX
//! models for tests and demos.

pub mod onnx;
pub mod test_factory;

use super::*;
use crate::format::test_factory::build_pygmy_logistic;
use std::io::Write;

#[test]
fn test_tensor_new_checks_length() {
    assert!(Tensor::new(vec![2, 2], vec![0.0; 4]).is_ok());
    let err = Tensor::new(vec![2, 2], vec![0.0; 3]).unwrap_err();
    assert!(matches!(err, GateError::DimensionMismatch { expected: 4, actual: 3, .. }));
}

#[test]
fn test_overflowing_shape_is_format_error() {
    let huge = vec![usize::MAX / 2, 3];
    assert_eq!(element_count(&[]).unwrap(), 1);
    assert_eq!(element_count(&[2, 0, 5]).unwrap(), 0);
    assert!(matches!(element_count(&huge), Err(GateError::Format { .. })));
    assert!(matches!(Tensor::new(huge.clone(), vec![0.0]), Err(GateError::Format { .. })));
    assert!(matches!(Tensor::filled(huge, 1.0), Err(GateError::Format { .. })));
}

#[test]
fn test_tensor_rows_and_finiteness() {
    let t = Tensor::new(vec![2, 2], vec![1.0, 2.0, f32::NAN, 4.0]).unwrap();
    assert_eq!(t.rows().count(), 2);
    assert!(!t.is_finite());
    assert_eq!(Tensor::scalar(3.0).last_dim(), 1);
}

#[test]
fn test_spec_accepts_dynamic_dims() {
    let spec = TensorSpec {
        name: "x".to_string(),
        shape: vec![Dim::Dynamic("batch".to_string()), Dim::Fixed(4)],
        element_type: "float32".to_string(),
    };
    assert!(spec.accepts(&[7, 4]));
    assert!(!spec.accepts(&[7, 3]));
    assert!(!spec.accepts(&[4]));
    assert_eq!(spec.concrete_shape(1), vec![1, 4]);
    assert_eq!(spec.shape_string(), "[batch, 4]");
}

#[test]
fn test_undeclared_shape_accepts_anything() {
    let spec = TensorSpec {
        name: "x".to_string(),
        shape: Vec::new(),
        element_type: "float32".to_string(),
    };
    assert!(spec.accepts(&[1, 2, 3]));
    assert_eq!(spec.fixed_last_dim(), None);
}

#[test]
fn test_dim_serializes_untagged() {
    let dims = vec![Dim::Dynamic("batch_size".to_string()), Dim::Fixed(4)];
    let json = serde_json::to_string(&dims).unwrap();
    assert_eq!(json, r#"["batch_size",4]"#);
    let back: Vec<Dim> = serde_json::from_str(&json).unwrap();
    assert_eq!(back, dims);
}

#[test]
fn test_backend_by_name() {
    assert_eq!(backend_by_name("native").unwrap().name(), "native");
    assert!(matches!(
        backend_by_name("tensorflow"),
        Err(GateError::Config { .. })
    ));
}

#[test]
fn test_shared_session_feed_and_run() {
    let mut file = tempfile::Builder::new().suffix(".onnx").tempfile().unwrap();
    file.write_all(&build_pygmy_logistic(2)).unwrap();
    let session = native::NativeBackend.open(file.path()).unwrap();
    let shared = SharedSession::new(session);
    let clone = shared.clone();

    let out = clone.run_primary(Tensor::filled(vec![3, 2], 1.0).unwrap()).unwrap();
    assert_eq!(out[0].0, "probability");
    assert_eq!(out[0].1.shape, vec![3, 1]);
    assert_eq!(shared.signature().inputs[0].name, "features");
    assert!(shared.fixed_inputs().unwrap().is_none());
}

#[test]
fn test_open_reference_dispatches_on_extension() {
    let mut json = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
    write!(json, r#"{{"samples":[{{"input":[0.0,0.0],"output":[0.5]}}]}}"#).unwrap();
    let reference = open_reference(json.path(), &native::NativeBackend).unwrap();
    assert_eq!(reference.fixed_inputs().map(|v| v.len()), Some(1));

    let mut onnx = tempfile::Builder::new().suffix(".onnx").tempfile().unwrap();
    onnx.write_all(&build_pygmy_logistic(2)).unwrap();
    let reference = open_reference(onnx.path(), &native::NativeBackend).unwrap();
    assert!(reference.fixed_inputs().is_none());
}

use super::*;
use crate::format::test_factory::{build_pygmy_logistic, PygmyDim, PygmyOnnx};
use crate::runtime::native::NativeBackend;
use crate::runtime::Dim;
use std::io::Write;

fn write_model(bytes: &[u8]) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(".onnx").tempfile().unwrap();
    file.write_all(bytes).unwrap();
    file
}

fn inspector() -> ModelInspector {
    ModelInspector::new(Box::new(NativeBackend))
}

fn descriptor_with(size_bytes: u64, opset: Option<i64>, ops: &[&str]) -> ModelDescriptor {
    ModelDescriptor {
        path: PathBuf::from("m.onnx"),
        size_bytes,
        backend: "native".to_string(),
        inputs: Vec::new(),
        outputs: Vec::new(),
        structure: StructuralInfo {
            opset_version: opset,
            opset_supported: opset.is_some_and(|v| v >= MIN_SUPPORTED_OPSET),
            initializer_count: 1,
            operators: ops.iter().map(|op| ((*op).to_string(), 1)).collect(),
            ..StructuralInfo::default()
        },
    }
}

#[test]
fn test_inspect_logistic() {
    let bytes = build_pygmy_logistic(4);
    let file = write_model(&bytes);
    let (descriptor, session) = inspector().inspect(file.path()).unwrap();

    assert_eq!(descriptor.size_bytes, bytes.len() as u64);
    assert_eq!(descriptor.backend, "native");
    assert_eq!(descriptor.inputs.len(), 1);
    assert_eq!(
        descriptor.inputs[0].shape,
        vec![Dim::Dynamic("batch_size".to_string()), Dim::Fixed(4)]
    );
    assert_eq!(descriptor.inputs[0].element_type, "float32");
    assert_eq!(descriptor.outputs[0].name, "probability");
    assert_eq!(descriptor.structure.opset_version, Some(13));
    assert!(descriptor.structure.opset_supported);
    assert_eq!(descriptor.structure.initializer_count, 2);
    assert_eq!(descriptor.structure.operators.get("Gemm"), Some(&1));
    assert_eq!(session.signature().inputs, descriptor.inputs);
}

#[test]
fn test_structural_statistics() {
    let model = OnnxModel::from_bytes(&build_pygmy_logistic(4)).unwrap();
    let info = StructuralInfo::from_model(&model);
    assert_eq!(info.total_parameters, 5);
    assert_eq!(
        info.largest_tensor,
        Some(ParameterTensor {
            name: "W".to_string(),
            shape: vec![4, 1],
            elements: 4,
        })
    );
    let spread = info.parameter_distribution.unwrap();
    assert_eq!(spread.mean_elements, 2.5);
    assert_eq!(spread.median_elements, 2.5);
    assert_eq!(spread.std_elements, 1.5);
    assert_eq!(info.graph_complexity, GraphComplexity::Simple);
    assert_eq!(info.activation_functions, vec!["Sigmoid".to_string()]);
    assert!(info.has_dynamic_shapes);
}

#[test]
fn test_static_shapes_and_no_weights() {
    let bytes = PygmyOnnx::new()
        .input("x", vec![PygmyDim::Fixed(1), PygmyDim::Fixed(3)])
        .output("y", vec![PygmyDim::Fixed(1), PygmyDim::Fixed(3)])
        .node("Relu", &["x"], &["y"])
        .build();
    let info = StructuralInfo::from_model(&OnnxModel::from_bytes(&bytes).unwrap());
    assert!(!info.has_dynamic_shapes);
    assert_eq!(info.total_parameters, 0);
    assert_eq!(info.largest_tensor, None);
    assert_eq!(info.parameter_distribution, None);
    assert_eq!(info.activation_functions, vec!["Relu".to_string()]);
}

#[test]
fn test_parameter_distribution_odd_count() {
    let spread = ParameterDistribution::from_sizes(&[10, 1, 4]).unwrap();
    assert_eq!(spread.mean_elements, 5.0);
    assert_eq!(spread.median_elements, 4.0);
    assert!((spread.std_elements - 14.0f64.sqrt()).abs() < 1e-12);
}

#[test]
fn test_graph_complexity_bands() {
    assert_eq!(GraphComplexity::from_node_count(20), GraphComplexity::Simple);
    assert_eq!(GraphComplexity::from_node_count(21), GraphComplexity::Moderate);
    assert_eq!(GraphComplexity::from_node_count(100), GraphComplexity::Moderate);
    assert_eq!(GraphComplexity::from_node_count(101), GraphComplexity::Complex);
}

#[test]
fn test_missing_file_is_fatal() {
    let err = inspector()
        .inspect(Path::new("/no/such/model.onnx"))
        .unwrap_err();
    assert!(err.is_fatal());
    assert!(matches!(err, GateError::ModelLoad { .. }));
}

#[test]
fn test_corrupt_file_is_fatal() {
    let file = write_model(b"\xff\xff\xff\xff corrupted");
    let err = inspector().inspect(file.path()).unwrap_err();
    assert!(err.is_fatal());
}

#[test]
fn test_truncated_model_is_fatal() {
    let bytes = build_pygmy_logistic(4);
    let file = write_model(&bytes[..bytes.len() / 2]);
    assert!(inspector().inspect(file.path()).unwrap_err().is_fatal());
}

#[test]
fn test_unsupported_operator_is_fatal() {
    let bytes = PygmyOnnx::new()
        .input("x", vec![PygmyDim::Fixed(1)])
        .output("y", vec![PygmyDim::Fixed(1)])
        .node("TopK", &["x"], &["y"])
        .build();
    let file = write_model(&bytes);
    let err = inspector().inspect(file.path()).unwrap_err();
    assert!(matches!(err, GateError::UnsupportedOperator { .. }));
}

#[test]
fn test_structural_advisories() {
    let old = StructuralInfo {
        opset_version: Some(9),
        initializer_count: 0,
        ..StructuralInfo::default()
    };
    let notes = old.advisories();
    assert_eq!(notes.len(), 2);
    assert!(notes[0].contains("Opset 9"));
    assert!(notes[1].contains("missing its weights"));

    let current = StructuralInfo {
        opset_version: Some(13),
        initializer_count: 3,
        ..StructuralInfo::default()
    };
    assert!(current.advisories().is_empty());
}

#[test]
fn test_compatibility_small_fast_model() {
    let d = descriptor_with(1024, Some(13), &["Gemm"]);
    let compat = Compatibility::assess(&d, Some(Rating::Excellent));
    assert!(compat.mobile_ready);
    assert!(compat.web_compatible);
    assert!(compat.notes.is_empty());
}

#[test]
fn test_compatibility_large_model() {
    let d = descriptor_with(120 * 1024 * 1024, Some(13), &["Gemm"]);
    let compat = Compatibility::assess(&d, Some(Rating::Excellent));
    assert!(!compat.mobile_ready);
    assert!(!compat.web_compatible);
}

#[test]
fn test_compatibility_control_flow_and_opset() {
    let d = descriptor_with(1024, Some(17), &["Loop", "Gemm"]);
    let compat = Compatibility::assess(&d, Some(Rating::Good));
    assert!(compat.mobile_ready);
    assert!(!compat.web_compatible);
    assert!(compat.notes.iter().any(|n| n.contains("Loop")));
    assert!(compat.notes.iter().any(|n| n.contains("Opset above 13")));
}

#[test]
fn test_compatibility_requires_measured_speed_for_mobile() {
    let d = descriptor_with(1024, Some(13), &[]);
    assert!(!Compatibility::assess(&d, None).mobile_ready);
    assert!(!Compatibility::assess(&d, Some(Rating::Acceptable)).mobile_ready);
}

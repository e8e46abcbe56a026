//! CLI integration tests for modelgate-cli

#![allow(clippy::unwrap_used)]

use assert_cmd::Command;
use modelgate::format::test_factory::build_pygmy_logistic;
use predicates::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Create a modelgate command
fn modelgate() -> Command {
    Command::cargo_bin("modelgate").expect("Failed to find modelgate binary")
}

/// Temp dir holding a 2-feature logistic model
fn workspace() -> (TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let model = dir.path().join("model.onnx");
    fs::write(&model, build_pygmy_logistic(2)).unwrap();
    (dir, model)
}

fn write(dir: &Path, name: &str, text: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, text).unwrap();
    path
}

#[test]
fn test_help() {
    modelgate()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--labeled-data"))
        .stdout(predicate::str::contains("--fail-on"));
}

#[test]
fn test_missing_model_exit_code() {
    modelgate()
        .arg("/nonexistent/model.onnx")
        .assert()
        .code(3)
        .stderr(predicate::str::contains("File not found"));
}

#[test]
fn test_unloadable_model_exit_code() {
    let dir = tempfile::tempdir().unwrap();
    let model = dir.path().join("model.onnx");
    fs::write(&model, b"\xff\xff\xff\xff corrupted").unwrap();
    modelgate().arg(&model).arg("-q").assert().code(6);
}

#[test]
fn test_not_ready_is_still_success() {
    let (_dir, model) = workspace();
    modelgate()
        .arg(&model)
        .args(["-n", "5"])
        .assert()
        .success()
        .stdout(predicate::str::contains("NOT READY FOR DEPLOYMENT"))
        .stdout(predicate::str::contains("Model Loading"))
        .stdout(predicate::str::contains("Parameters"))
        .stdout(predicate::str::contains("Dynamic shapes"));
}

#[test]
fn test_json_output_is_parseable() {
    let (dir, model) = workspace();
    let data = write(dir.path(), "val.csv", "a,b,label\n1,1,1\n-1,-1,0\n2,0.5,1\n");
    let out = modelgate()
        .arg(&model)
        .arg("--labeled-data")
        .arg(&data)
        .args(["--json", "-n", "5"])
        .output()
        .unwrap();
    assert!(out.status.success());
    let report: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(report["maxScore"], 100.0);
    assert_eq!(report["categories"][3]["category"], "accuracy");
    assert_eq!(report["categories"][3]["evidence"]["accuracy"], 1.0);
    assert_eq!(report["model"]["structure"]["totalParameters"], 3);
    assert_eq!(report["model"]["structure"]["activationFunctions"][0], "Sigmoid");
}

#[test]
fn test_output_file_written() {
    let (dir, model) = workspace();
    let report = dir.path().join("reports").join("readiness.json");
    modelgate()
        .arg(&model)
        .arg("-o")
        .arg(&report)
        .args(["-q", "-n", "5"])
        .assert()
        .success();
    let text = fs::read_to_string(&report).unwrap();
    let value: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert_eq!(value["verdict"], "NOT_READY");
}

#[test]
fn test_fail_on_gate() {
    let (_dir, model) = workspace();
    modelgate()
        .arg(&model)
        .args(["-q", "-n", "5", "--fail-on", "not-ready"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("NOT_READY"));
}

#[test]
fn test_unknown_backend_is_config_error() {
    let (_dir, model) = workspace();
    modelgate()
        .arg(&model)
        .args(["--backend", "tensorrt"])
        .assert()
        .code(5);
}

#[test]
fn test_config_overlay_rejected_when_invalid() {
    let (dir, model) = workspace();
    let config = write(dir.path(), "config.json", r#"{"scoring": {"verdict": [60, 90]}}"#);
    modelgate()
        .arg(&model)
        .arg("--config")
        .arg(&config)
        .assert()
        .code(5);
}

#[test]
fn test_bad_sample_is_config_error() {
    let (_dir, model) = workspace();
    modelgate()
        .arg(&model)
        .args(["--sample", "1,zebra"])
        .assert()
        .code(5);
}

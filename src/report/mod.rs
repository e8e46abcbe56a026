//! Deployment report and its emitters.
//!
//! A [`DeploymentReport`] is assembled once at the end of a run and never
//! mutated afterwards. [`ReportEmitter`] only formats it: the JSON form is
//! byte-identical for identical reports, and the only fields that vary
//! between runs on identical inputs are `generatedAt` and timing values.

use crate::error::Result;
use crate::inspect::{Compatibility, ModelDescriptor};
use crate::qa::{CategoryOutcome, Status};
use crate::scoring::{ReadinessScore, Verdict};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::path::Path;
use tracing::info;

/// Terminal aggregate of one evaluation run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentReport {
    /// RFC 3339 creation time
    pub generated_at: String,
    pub tool_version: String,
    pub model: ModelDescriptor,
    pub categories: Vec<CategoryOutcome>,
    pub total_score: f64,
    pub max_score: f64,
    pub verdict: Verdict,
    /// One line per failed category
    #[serde(default)]
    pub issues: Vec<String>,
    /// Category recommendations followed by unscored advisories
    pub recommendations: Vec<String>,
    pub compatibility: Compatibility,
}

impl DeploymentReport {
    /// Assemble a report stamped with the current time
    #[must_use]
    pub fn new(
        model: ModelDescriptor,
        categories: Vec<CategoryOutcome>,
        score: ReadinessScore,
        compatibility: Compatibility,
    ) -> Self {
        let mut recommendations = score.recommendations;
        recommendations.extend(model.structure.advisories());
        recommendations.extend(compatibility.notes.iter().cloned());
        let issues = categories
            .iter()
            .filter(|c| c.status == Status::Fail)
            .map(|c| format!("{} failed: {}", c.category.name(), c.details))
            .collect();
        Self {
            generated_at: chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
            tool_version: env!("CARGO_PKG_VERSION").to_string(),
            model,
            categories,
            total_score: score.total_score,
            max_score: score.max_score,
            verdict: score.verdict,
            issues,
            recommendations,
            compatibility,
        }
    }

    /// Score as a fraction of the maximum
    #[must_use]
    pub fn score_ratio(&self) -> f64 {
        if self.max_score > 0.0 {
            self.total_score / self.max_score
        } else {
            0.0
        }
    }

    /// Outcomes with the given status
    pub fn with_status(&self, status: Status) -> impl Iterator<Item = &CategoryOutcome> {
        self.categories.iter().filter(move |c| c.status == status)
    }
}

/// Formats and persists [`DeploymentReport`]s
#[derive(Debug, Clone, Copy, Default)]
pub struct ReportEmitter;

impl ReportEmitter {
    /// Pretty-printed JSON
    pub fn to_json(report: &DeploymentReport) -> Result<String> {
        Ok(serde_json::to_string_pretty(report)?)
    }

    /// Write the JSON form to `path`, creating parent directories
    pub fn write(report: &DeploymentReport, path: &Path) -> Result<()> {
        let json = Self::to_json(report)?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, json + "\n")?;
        info!(path = %path.display(), "report written");
        Ok(())
    }

    /// Load a previously written report
    pub fn read(path: &Path) -> Result<DeploymentReport> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Plain-text console summary
    #[must_use]
    pub fn summary(report: &DeploymentReport) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Deployment readiness: {}", report.model.path.display());
        let _ = writeln!(
            out,
            "  size {:.2} MB, backend {}, {} input(s), {} output(s)",
            report.model.size_mb(),
            report.model.backend,
            report.model.inputs.len(),
            report.model.outputs.len()
        );
        for spec in &report.model.inputs {
            let _ = writeln!(out, "  input  {} {} {}", spec.name, spec.shape_string(), spec.element_type);
        }
        for spec in &report.model.outputs {
            let _ = writeln!(out, "  output {} {} {}", spec.name, spec.shape_string(), spec.element_type);
        }
        let structure = &report.model.structure;
        let _ = writeln!(
            out,
            "  {} node(s), {} graph, {} parameter(s), dynamic shapes: {}",
            structure.node_count,
            structure.graph_complexity,
            structure.total_parameters,
            if structure.has_dynamic_shapes { "yes" } else { "no" }
        );
        if let Some(largest) = &structure.largest_tensor {
            let _ = writeln!(out, "  largest tensor {} {:?} ({} elements)", largest.name, largest.shape, largest.elements);
        }
        if !structure.activation_functions.is_empty() {
            let _ = writeln!(out, "  activations {}", structure.activation_functions.join(", "));
        }
        out.push('\n');
        for outcome in &report.categories {
            let _ = writeln!(
                out,
                "[{:<10}] {:<16} {:>5.1}/{:<4} {}",
                outcome.status.to_string(),
                outcome.category.name(),
                outcome.points_earned,
                outcome.points_possible,
                outcome.details
            );
        }
        let _ = writeln!(
            out,
            "\nScore: {:.1}/{:.0} ({:.1}%)",
            report.total_score,
            report.max_score,
            report.score_ratio() * 100.0
        );
        let _ = writeln!(out, "Verdict: {}", report.verdict.headline());
        if !report.issues.is_empty() {
            let _ = writeln!(out, "\nCritical issues ({}):", report.issues.len());
            for issue in &report.issues {
                let _ = writeln!(out, "  - {issue}");
            }
        }
        if !report.recommendations.is_empty() {
            let _ = writeln!(out, "\nRecommendations ({}):", report.recommendations.len());
            for (i, rec) in report.recommendations.iter().enumerate() {
                let _ = writeln!(out, "  {}. {rec}", i + 1);
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inspect::{GraphComplexity, ParameterTensor, StructuralInfo};
    use crate::qa::{CategoryKind, Evidence, LoadingResult, Observation};
    use crate::runtime::{Dim, TensorSpec};
    use crate::scoring::ReadinessScorer;
    use std::path::PathBuf;

    fn descriptor() -> ModelDescriptor {
        let spec = |name: &str, n: usize| TensorSpec {
            name: name.to_string(),
            shape: vec![Dim::Dynamic("batch_size".to_string()), Dim::Fixed(n)],
            element_type: "float32".to_string(),
        };
        ModelDescriptor {
            path: PathBuf::from("model.onnx"),
            size_bytes: 2048,
            backend: "native".to_string(),
            inputs: vec![spec("features", 4)],
            outputs: vec![spec("probability", 1)],
            structure: StructuralInfo {
                ir_version: 8,
                opset_version: Some(13),
                opset_supported: true,
                initializer_count: 2,
                node_count: 2,
                total_parameters: 5,
                largest_tensor: Some(ParameterTensor {
                    name: "W".to_string(),
                    shape: vec![4, 1],
                    elements: 4,
                }),
                graph_complexity: GraphComplexity::Simple,
                activation_functions: vec!["Sigmoid".to_string()],
                has_dynamic_shapes: true,
                ..StructuralInfo::default()
            },
        }
    }

    fn report() -> DeploymentReport {
        let scorer = ReadinessScorer::default();
        let mut outcomes = vec![scorer.outcome(
            CategoryKind::ModelLoading,
            Observation::Measured(Evidence::Loading(LoadingResult {
                backend: "native".to_string(),
                size_bytes: 2048,
                input_count: 1,
                output_count: 1,
            })),
        )];
        outcomes.push(scorer.outcome(
            CategoryKind::Accuracy,
            Observation::NotTested("no labeled dataset supplied".to_string()),
        ));
        outcomes.push(scorer.outcome(
            CategoryKind::EdgeCases,
            Observation::Failed("dataset has no rows".to_string()),
        ));
        let score = scorer.score(&outcomes);
        let descriptor = descriptor();
        let compatibility = Compatibility::assess(&descriptor, None);
        DeploymentReport::new(descriptor, outcomes, score, compatibility)
    }

    #[test]
    fn test_report_fields() {
        let report = report();
        assert_eq!(report.total_score, 20.0);
        assert_eq!(report.max_score, 100.0);
        assert_eq!(report.verdict, Verdict::NotReady);
        assert!((report.score_ratio() - 0.2).abs() < 1e-12);
        assert_eq!(report.with_status(Status::NotTested).count(), 1);
        assert_eq!(report.issues.len(), 1);
        assert!(report.issues[0].starts_with("Edge Cases failed:"), "{:?}", report.issues);
        assert!(chrono::DateTime::parse_from_rfc3339(&report.generated_at).is_ok());
        assert_eq!(report.recommendations[0], "Supply a labeled dataset to validate accuracy");
    }

    #[test]
    fn test_json_is_idempotent() {
        let report = report();
        let first = ReportEmitter::to_json(&report).unwrap();
        let second = ReportEmitter::to_json(&report).unwrap();
        assert_eq!(first, second);
        let value: serde_json::Value = serde_json::from_str(&first).unwrap();
        assert_eq!(value["verdict"], "NOT_READY");
        assert_eq!(value["maxScore"], 100.0);
        assert_eq!(value["categories"][1]["status"], "NOT_TESTED");
        assert_eq!(value["categories"][0]["evidence"]["type"], "loading");
        assert_eq!(value["model"]["inputs"][0]["shape"][0], "batch_size");
        assert_eq!(value["model"]["inputs"][0]["shape"][1], 4);
        assert_eq!(value["model"]["structure"]["totalParameters"], 5);
        assert_eq!(value["model"]["structure"]["graphComplexity"], "simple");
        assert_eq!(value["model"]["structure"]["largestTensor"]["name"], "W");
        assert_eq!(value["model"]["structure"]["hasDynamicShapes"], true);
    }

    #[test]
    fn test_write_and_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reports").join("readiness.json");
        let report = report();
        ReportEmitter::write(&report, &path).unwrap();
        ReportEmitter::write(&report, &path).unwrap();
        let loaded = ReportEmitter::read(&path).unwrap();
        assert_eq!(loaded, report);
    }

    #[test]
    fn test_summary_mentions_verdict_and_categories() {
        let summary = ReportEmitter::summary(&report());
        assert!(summary.contains("NOT READY FOR DEPLOYMENT"));
        assert!(summary.contains("Model Loading"));
        assert!(summary.contains("NOT_TESTED"));
        assert!(summary.contains("Score: 20.0/100"));
        assert!(summary.contains("input  features [batch_size, 4] float32"));
        assert!(summary.contains("2 node(s), simple graph, 5 parameter(s), dynamic shapes: yes"));
        assert!(summary.contains("largest tensor W [4, 1] (4 elements)"));
        assert!(summary.contains("activations Sigmoid"));
        assert!(summary.contains("Critical issues (1):"));
    }
}

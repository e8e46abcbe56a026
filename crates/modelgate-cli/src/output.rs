//! Output formatting utilities

use colored::Colorize;
use modelgate::qa::{CategoryOutcome, Status};
use modelgate::scoring::Verdict;
use modelgate::DeploymentReport;

/// Print a section header
pub(crate) fn section(title: &str) {
    println!("\n{}", format!("=== {title} ===").cyan().bold());
}

/// Print a key-value pair
pub(crate) fn kv(key: &str, value: impl std::fmt::Display) {
    println!("  {}: {}", key.white().bold(), value);
}

/// Print a success message
pub(crate) fn success(msg: &str) {
    println!("{} {}", "[PASS]".green().bold(), msg);
}

/// Print a warning message
pub(crate) fn warning(msg: &str) {
    println!("{} {}", "[WARN]".yellow().bold(), msg);
}

/// Print a failure message
pub(crate) fn fail(msg: &str) {
    println!("{} {}", "[FAIL]".red().bold(), msg);
}

/// Print an info message
pub(crate) fn info(msg: &str) {
    println!("{} {}", "[INFO]".blue(), msg);
}

/// Format bytes as human-readable size
pub(crate) fn format_size(bytes: u64) -> String {
    humansize::format_size(bytes, humansize::BINARY)
}

/// One line per category: status tag, name, points and details
fn category_line(outcome: &CategoryOutcome) -> String {
    format!(
        "{:<16} {:>5.1}/{:<4} {}",
        outcome.category.name(),
        outcome.points_earned,
        outcome.points_possible,
        outcome.details
    )
}

/// Headline colored by verdict
fn verdict_line(verdict: Verdict) -> String {
    let text = verdict.headline();
    match verdict {
        Verdict::Ready => text.green().bold().to_string(),
        Verdict::Caution => text.yellow().bold().to_string(),
        Verdict::NotReady => text.red().bold().to_string(),
    }
}

/// Human-readable console rendering of a report
pub(crate) fn print_report(report: &DeploymentReport) {
    let model = &report.model;
    section("Model");
    kv("Path", model.path.display());
    kv("Size", format_size(model.size_bytes));
    kv("Backend", &model.backend);
    let structure = &model.structure;
    if !structure.producer_name.is_empty() {
        kv(
            "Producer",
            format!("{} {}", structure.producer_name, structure.producer_version),
        );
    }
    kv(
        "Opset",
        structure
            .opset_version
            .map_or_else(|| "unknown".to_string(), |v| v.to_string()),
    );
    kv(
        "Nodes",
        format!("{} ({})", structure.node_count, structure.graph_complexity),
    );
    kv("Parameters", structure.total_parameters);
    if let Some(largest) = &structure.largest_tensor {
        kv(
            "Largest tensor",
            format!("{} {:?} ({} elements)", largest.name, largest.shape, largest.elements),
        );
    }
    if !structure.activation_functions.is_empty() {
        kv("Activations", structure.activation_functions.join(", "));
    }
    kv("Dynamic shapes", structure.has_dynamic_shapes);
    for spec in &model.inputs {
        kv("Input", format!("{} {} {}", spec.name, spec.shape_string(), spec.element_type));
    }
    for spec in &model.outputs {
        kv("Output", format!("{} {} {}", spec.name, spec.shape_string(), spec.element_type));
    }

    section("Categories");
    for outcome in &report.categories {
        let line = category_line(outcome);
        match outcome.status {
            Status::Pass if outcome.is_perfect() => success(&line),
            Status::Pass => warning(&line),
            Status::Fail => fail(&line),
            Status::NotTested => info(&line),
        }
    }

    if !report.issues.is_empty() {
        section("Critical Issues");
        for issue in &report.issues {
            fail(issue);
        }
    }

    section("Compatibility");
    kv("Mobile ready", report.compatibility.mobile_ready);
    kv("Web compatible", report.compatibility.web_compatible);

    if !report.recommendations.is_empty() {
        section("Recommendations");
        for (i, rec) in report.recommendations.iter().enumerate() {
            println!("  {}. {rec}", i + 1);
        }
    }

    section("Verdict");
    kv(
        "Score",
        format!(
            "{:.1}/{:.0} ({:.1}%)",
            report.total_score,
            report.max_score,
            report.score_ratio() * 100.0
        ),
    );
    println!("  {}", verdict_line(report.verdict));
}

//! modelgate - deployment-readiness gate for ONNX classifiers
//!
//! Usage:
//!   modelgate model.onnx                                  # Model-only checks
//!   modelgate model.onnx --labeled-data val.csv           # Add accuracy
//!   modelgate model.onnx --edge-cases edge.csv            # Add edge-case robustness
//!   modelgate model.onnx --reference outputs.json         # Add consistency
//!   modelgate model.onnx --json -o report.json            # Machine-readable report
//!   modelgate model.onnx --fail-on caution                # CI gate (exit 2)

use clap::{Parser, ValueEnum};
use modelgate::runtime;
use modelgate::scoring::Verdict;
use modelgate::{Evaluation, EvaluationConfig, ReportEmitter};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod error;
mod output;

use error::{CliError, Result};

/// Verdict tier that makes the process exit non-zero
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum FailOn {
    /// Fail on CAUTION or NOT_READY
    Caution,
    /// Fail on NOT_READY only
    NotReady,
}

impl FailOn {
    fn trips(self, verdict: Verdict) -> bool {
        match self {
            Self::Caution => verdict != Verdict::Ready,
            Self::NotReady => verdict == Verdict::NotReady,
        }
    }
}

/// modelgate - Deployment readiness evaluation
///
/// Scores an exported ONNX classifier out of 100 across model loading,
/// input validation, performance, accuracy, edge cases and consistency.
#[derive(Parser, Debug)]
#[command(name = "modelgate")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the .onnx model
    #[arg(value_name = "MODEL")]
    model: PathBuf,

    /// CSV with feature columns and a trailing label column
    #[arg(long, value_name = "CSV")]
    labeled_data: Option<PathBuf>,

    /// CSV of boundary rows (label column optional)
    #[arg(long, value_name = "CSV")]
    edge_cases: Option<PathBuf>,

    /// Reference model (.onnx) or recorded reference outputs (.json)
    #[arg(long, value_name = "FILE")]
    reference: Option<PathBuf>,

    /// Standard-scaler statistics applied to dataset features
    #[arg(long, value_name = "JSON")]
    scaler: Option<PathBuf>,

    /// Extra comma-separated feature row for the consistency check (repeatable)
    #[arg(long, value_name = "VALUES")]
    sample: Vec<String>,

    /// Timed benchmark iterations
    #[arg(short = 'n', long)]
    iterations: Option<usize>,

    /// Untimed warm-up calls before benchmarking
    #[arg(long)]
    warmup: Option<usize>,

    /// Overall time budget in seconds
    #[arg(long, value_name = "SECS")]
    timeout: Option<f64>,

    /// Seed for the synthetic probe input
    #[arg(long)]
    seed: Option<u64>,

    /// Inference backend
    #[arg(long, default_value = "native")]
    backend: String,

    /// EvaluationConfig overlay (JSON); flags override it
    #[arg(long, value_name = "JSON")]
    config: Option<PathBuf>,

    /// Write the JSON report to this path
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Print the JSON report to stdout instead of the console summary
    #[arg(long)]
    json: bool,

    /// Exit with code 2 when the verdict is at or below this tier
    #[arg(long, value_enum)]
    fail_on: Option<FailOn>,

    /// Verbose output
    #[arg(short, long, conflicts_with = "quiet")]
    verbose: bool,

    /// Quiet mode (warnings and errors only)
    #[arg(short, long)]
    quiet: bool,
}

fn init_tracing(verbose: bool, quiet: bool) {
    let level = if verbose {
        "debug"
    } else if quiet {
        "warn"
    } else {
        "info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn parse_sample(text: &str) -> Result<Vec<f32>> {
    text.split(',')
        .map(|v| {
            v.trim()
                .parse::<f32>()
                .map_err(|e| CliError::InvalidConfig(format!("--sample value '{}': {e}", v.trim())))
        })
        .collect()
}

fn require_file(path: &Path) -> Result<()> {
    if path.exists() {
        Ok(())
    } else {
        Err(CliError::FileNotFound(path.to_path_buf()))
    }
}

fn load_config(cli: &Cli) -> Result<EvaluationConfig> {
    let mut config = match &cli.config {
        Some(path) => {
            require_file(path)?;
            EvaluationConfig::from_file(path)?
        }
        None => EvaluationConfig::default(),
    };
    if let Some(iterations) = cli.iterations {
        config = config.with_iterations(iterations);
    }
    if let Some(warmup) = cli.warmup {
        config = config.with_warmup(warmup);
    }
    if let Some(secs) = cli.timeout {
        if !secs.is_finite() || secs <= 0.0 {
            return Err(CliError::InvalidConfig(format!(
                "--timeout must be a positive number of seconds, got {secs}"
            )));
        }
        config = config.with_timeout(Duration::from_secs_f64(secs));
    }
    if let Some(seed) = cli.seed {
        config = config.with_seed(seed);
    }
    config.validate()?;
    Ok(config)
}

fn run(cli: &Cli) -> Result<Verdict> {
    require_file(&cli.model)?;
    let config = load_config(cli)?;
    let backend = runtime::backend_by_name(&cli.backend)?;

    let mut evaluation = Evaluation::new(&cli.model)
        .with_backend(backend)
        .with_config(config);
    if let Some(path) = &cli.labeled_data {
        evaluation = evaluation.with_labeled_data(path);
    }
    if let Some(path) = &cli.edge_cases {
        evaluation = evaluation.with_edge_cases(path);
    }
    if let Some(path) = &cli.reference {
        evaluation = evaluation.with_reference(path);
    }
    if let Some(path) = &cli.scaler {
        evaluation = evaluation.with_scaler(path);
    }
    for text in &cli.sample {
        evaluation = evaluation.with_sample(parse_sample(text)?);
    }

    let report = evaluation.run()?;

    if let Some(path) = &cli.output {
        ReportEmitter::write(&report, path)?;
    }
    if cli.json {
        println!("{}", ReportEmitter::to_json(&report)?);
    } else if !cli.quiet {
        output::print_report(&report);
        if let Some(path) = &cli.output {
            output::kv("Report", path.display());
        }
    }
    info!(verdict = %report.verdict, score = report.total_score, "done");
    Ok(report.verdict)
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    let result = run(&cli).and_then(|verdict| match cli.fail_on {
        Some(gate) if gate.trips(verdict) => Err(CliError::VerdictGate(verdict.to_string())),
        _ => Ok(()),
    });

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            e.exit_code()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fail_on_tiers() {
        assert!(FailOn::Caution.trips(Verdict::Caution));
        assert!(FailOn::Caution.trips(Verdict::NotReady));
        assert!(!FailOn::Caution.trips(Verdict::Ready));
        assert!(FailOn::NotReady.trips(Verdict::NotReady));
        assert!(!FailOn::NotReady.trips(Verdict::Caution));
    }

    #[test]
    fn test_parse_sample() {
        assert_eq!(parse_sample("0.5, -1,2e3").unwrap(), vec![0.5, -1.0, 2000.0]);
        assert!(matches!(parse_sample("1,abc"), Err(CliError::InvalidConfig(_))));
    }

    #[test]
    fn test_flags_override_config() {
        let cli = Cli::parse_from(["modelgate", "m.onnx", "-n", "7", "--seed", "3", "--timeout", "2.5"]);
        let config = load_config(&cli).unwrap();
        assert_eq!(config.iterations, 7);
        assert_eq!(config.seed, 3);
        assert_eq!(config.timeout_secs, 2.5);
        assert_eq!(config.warmup, 1);
    }

    #[test]
    fn test_invalid_timeout_rejected() {
        let cli = Cli::parse_from(["modelgate", "m.onnx", "--timeout", "0"]);
        assert!(matches!(load_config(&cli), Err(CliError::InvalidConfig(_))));
    }

    #[test]
    fn test_cli_definition_is_valid() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}

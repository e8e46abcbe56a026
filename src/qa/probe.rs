//! Synthetic input probing.
//!
//! Feeds a fixed catalog of boundary inputs through the model and checks
//! that every call returns finite, correctly shaped outputs. Also checks
//! that repeated calls are deterministic and classifies what the first
//! output looks like (probability, softmax distribution or raw scores).

use super::{validate_outputs, Budget, Evidence, Observation};
use crate::error::Result;
use crate::runtime::{element_count, SharedSession, Tensor, TensorSpec};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Maximum element-wise difference tolerated between two identical calls
pub const DETERMINISM_TOLERANCE: f32 = 1e-6;
/// Tolerance on softmax row sums
pub const SOFTMAX_SUM_TOLERANCE: f32 = 1e-3;

/// A named synthetic input pattern
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeCase {
    /// Uniform random in [0, 1)
    Normal,
    Zeros,
    Ones,
    /// Every element 1e6
    LargeValues,
    /// Every element 1e-6
    SmallValues,
    /// Every element -10
    NegativeValues,
}

impl ProbeCase {
    /// The fixed catalog, in execution order
    pub const CATALOG: [Self; 6] = [
        Self::Normal,
        Self::Zeros,
        Self::Ones,
        Self::LargeValues,
        Self::SmallValues,
        Self::NegativeValues,
    ];

    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Zeros => "zeros",
            Self::Ones => "ones",
            Self::LargeValues => "large_values",
            Self::SmallValues => "small_values",
            Self::NegativeValues => "negative_values",
        }
    }

    /// Generate `n` values for this case
    pub fn generate(&self, n: usize, rng: &mut impl Rng) -> Vec<f32> {
        match self {
            Self::Normal => (0..n).map(|_| rng.gen::<f32>()).collect(),
            Self::Zeros => vec![0.0; n],
            Self::Ones => vec![1.0; n],
            Self::LargeValues => vec![1e6; n],
            Self::SmallValues => vec![1e-6; n],
            Self::NegativeValues => vec![-10.0; n],
        }
    }
}

/// Outcome of one probe case
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbeResult {
    pub case: ProbeCase,
    pub passed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
}

/// How the first output of the `normal` probe reads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputKind {
    /// Single value per row in [0, 1]
    Probability,
    /// Rows in [0, 1] summing to 1
    Softmax,
    /// Anything else (logits, regression values)
    Scores,
}

impl OutputKind {
    /// Classify a tensor by its values
    #[must_use]
    pub fn classify(tensor: &Tensor) -> Self {
        let in_unit = tensor.data.iter().all(|v| (0.0..=1.0).contains(v));
        if !in_unit || tensor.data.is_empty() {
            return Self::Scores;
        }
        if tensor.last_dim() == 1 {
            return Self::Probability;
        }
        let sums_to_one = tensor
            .rows()
            .all(|row| (row.iter().sum::<f32>() - 1.0).abs() <= SOFTMAX_SUM_TOLERANCE);
        if sums_to_one {
            Self::Softmax
        } else {
            Self::Scores
        }
    }
}

/// Evidence of the input-validation category
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbeReport {
    pub results: Vec<ProbeResult>,
    pub passed_count: usize,
    pub total_cases: usize,
    /// `None` when the `normal` case itself failed or could not be repeated
    pub deterministic: Option<bool>,
    /// Error raised by the repeated `normal` call
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repeat_error: Option<String>,
    pub output_kind: Option<OutputKind>,
}

impl ProbeReport {
    /// Fraction of cases that passed
    #[must_use]
    pub fn pass_rate(&self) -> f64 {
        if self.total_cases == 0 {
            0.0
        } else {
            self.passed_count as f64 / self.total_cases as f64
        }
    }

    /// Names of failed cases
    #[must_use]
    pub fn failed_cases(&self) -> Vec<&'static str> {
        self.results
            .iter()
            .filter(|r| !r.passed)
            .map(|r| r.case.name())
            .collect()
    }
}

/// Runs the [`ProbeCase`] catalog against a model
#[derive(Debug, Clone, Copy)]
pub struct SyntheticInputProbe {
    seed: u64,
}

impl Default for SyntheticInputProbe {
    fn default() -> Self {
        Self { seed: 42 }
    }
}

impl SyntheticInputProbe {
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self { seed }
    }

    /// Input for `case` matching `spec`, dynamic dims set to 1
    pub fn input_for(&self, spec: &TensorSpec, case: ProbeCase) -> Result<Tensor> {
        let shape = if spec.shape.is_empty() {
            vec![1]
        } else {
            spec.concrete_shape(1)
        };
        let n = element_count(&shape)?;
        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut data = case.generate(n, &mut rng);
        if spec.is_integral() {
            data.iter_mut().for_each(|v| *v = v.round());
        }
        Ok(Tensor { shape, data })
    }

    /// The representative `normal` input, reused by the benchmark and comparator
    pub fn normal_input(&self, spec: &TensorSpec) -> Result<Tensor> {
        self.input_for(spec, ProbeCase::Normal)
    }

    /// Run every case.
    ///
    /// The category only needs the model, so it never reports "not tested".
    pub fn run(&self, session: &SharedSession, budget: &Budget) -> Observation {
        let signature = session.signature();
        let Some(spec) = signature.inputs.first() else {
            return Observation::Failed("model declares no inputs".to_string());
        };
        if spec.element_type == "string" {
            return Observation::Failed(format!(
                "input '{}' has non-numeric type {}; synthetic probes need numeric inputs",
                spec.name, spec.element_type
            ));
        }

        let mut results = Vec::with_capacity(ProbeCase::CATALOG.len());
        let mut normal_output = None;
        for case in ProbeCase::CATALOG {
            if let Err(e) = budget.check() {
                return Observation::from_error(&e);
            }
            let outcome = self
                .input_for(spec, case)
                .and_then(|input| session.run_primary(input))
                .map_err(|e| e.to_string())
                .and_then(|outputs| validate_outputs(&outputs, &signature.outputs).map(|()| outputs));
            match outcome {
                Ok(outputs) => {
                    debug!(case = case.name(), "probe passed");
                    if case == ProbeCase::Normal {
                        normal_output = Some(outputs);
                    }
                    results.push(ProbeResult {
                        case,
                        passed: true,
                        failure_reason: None,
                    });
                }
                Err(reason) => {
                    warn!(case = case.name(), %reason, "probe failed");
                    results.push(ProbeResult {
                        case,
                        passed: false,
                        failure_reason: Some(reason),
                    });
                }
            }
        }

        let mut repeat_error = None;
        let deterministic = normal_output.as_ref().and_then(|first| {
            match self
                .normal_input(spec)
                .and_then(|input| session.run_primary(input))
            {
                Ok(second) => Some(outputs_agree(first, &second, DETERMINISM_TOLERANCE)),
                Err(e) => {
                    warn!(error = %e, "repeated normal call failed");
                    repeat_error = Some(e.to_string());
                    None
                }
            }
        });
        let output_kind = normal_output
            .as_ref()
            .and_then(|outputs| outputs.first())
            .map(|(_, t)| OutputKind::classify(t));

        let passed_count = results.iter().filter(|r| r.passed).count();
        info!(
            passed = passed_count,
            total = results.len(),
            ?deterministic,
            "input validation finished"
        );
        Observation::Measured(Evidence::Probe(ProbeReport {
            total_cases: results.len(),
            passed_count,
            results,
            deterministic,
            repeat_error,
            output_kind,
        }))
    }
}

fn outputs_agree(
    a: &[(String, Tensor)],
    b: &[(String, Tensor)],
    tolerance: f32,
) -> bool {
    a.len() == b.len()
        && a.iter().zip(b).all(|((_, x), (_, y))| {
            x.shape == y.shape
                && x.data
                    .iter()
                    .zip(&y.data)
                    .all(|(p, q)| (p - q).abs() <= tolerance)
        })
}

#[cfg(test)]
#[path = "probe_tests.rs"]
mod tests;

//! 100-point deployment readiness scoring.
//!
//! Every category has a fixed point budget. Skipped categories score zero
//! but never shrink the maximum, so an artifact evaluated with fewer inputs
//! cannot inflate its score by omission.
//!
//! | Category | Points | Partial credit |
//! |----------|--------|----------------|
//! | Model Loading | 20 | none (PASS/FAIL) |
//! | Input Validation | 15 | passed cases / total cases |
//! | Performance | 15 | by latency rating tier |
//! | Accuracy | 20 | by accuracy rating tier |
//! | Edge Cases | 15 | by success-rate rating tier |
//! | Consistency | 15 | by comparison rating |
//!
//! The total maps to a [`Verdict`]: READY at 85 or above, CAUTION at 70 or
//! above, NOT_READY otherwise.

use crate::error::{GateError, Result};
use crate::qa::consistency::ComparisonRating;
use crate::qa::probe::OutputKind;
use crate::qa::{CategoryKind, CategoryOutcome, Evidence, Observation, Rating, Status};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Fixed catalog total
pub const MAX_SCORE: f64 = 100.0;

/// Points available per category
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PointBudget {
    pub model_loading: f64,
    pub input_validation: f64,
    pub performance: f64,
    pub accuracy: f64,
    pub edge_cases: f64,
    pub consistency: f64,
}

impl Default for PointBudget {
    fn default() -> Self {
        Self {
            model_loading: 20.0,
            input_validation: 15.0,
            performance: 15.0,
            accuracy: 20.0,
            edge_cases: 15.0,
            consistency: 15.0,
        }
    }
}

impl PointBudget {
    /// Budget of one category
    #[must_use]
    pub const fn for_category(&self, kind: CategoryKind) -> f64 {
        match kind {
            CategoryKind::ModelLoading => self.model_loading,
            CategoryKind::InputValidation => self.input_validation,
            CategoryKind::Performance => self.performance,
            CategoryKind::Accuracy => self.accuracy,
            CategoryKind::EdgeCases => self.edge_cases,
            CategoryKind::Consistency => self.consistency,
        }
    }

    /// Sum of all budgets
    #[must_use]
    pub fn total(&self) -> f64 {
        CategoryKind::all().iter().map(|k| self.for_category(*k)).sum()
    }
}

/// Immutable scoring constants.
///
/// Thresholds are `[excellent, good, acceptable]`; prorations are the share
/// of a category's budget earned at each tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ScoringConfig {
    pub points: PointBudget,
    /// Mean latency upper bounds in ms (exclusive)
    pub latency_ms: [f64; 3],
    /// Accuracy lower bounds (inclusive)
    pub accuracy: [f64; 3],
    /// Edge-case success-rate lower bounds (inclusive)
    pub edge_success: [f64; 3],
    /// `[match, close]` max-difference upper bounds (exclusive)
    pub comparison: [f64; 2],
    /// Share earned at EXCELLENT, GOOD, ACCEPTABLE, POOR
    pub tier_proration: [f64; 4],
    /// Share earned at MATCH, CLOSE_MATCH, SIGNIFICANT_DIFFERENCE
    pub comparison_proration: [f64; 3],
    /// `[ready, caution]` minimum total scores
    pub verdict: [f64; 2],
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            points: PointBudget::default(),
            latency_ms: [100.0, 500.0, 1000.0],
            accuracy: [0.90, 0.80, 0.70],
            edge_success: [0.95, 0.80, 0.60],
            comparison: [1e-5, 1e-3],
            tier_proration: [1.0, 0.8, 0.5, 0.0],
            comparison_proration: [1.0, 0.8, 0.0],
            verdict: [85.0, 70.0],
        }
    }
}

fn config_error(param: &str, constraint: &str) -> GateError {
    GateError::Config {
        param: param.to_string(),
        constraint: constraint.to_string(),
    }
}

fn strictly_increasing(values: &[f64]) -> bool {
    values.windows(2).all(|w| w[0] < w[1])
}

fn non_increasing(values: &[f64]) -> bool {
    values.windows(2).all(|w| w[0] >= w[1])
}

impl ScoringConfig {
    /// Check budgets and threshold ordering
    pub fn validate(&self) -> Result<()> {
        let budgets = CategoryKind::all().map(|k| self.points.for_category(k));
        if budgets.iter().any(|p| !p.is_finite() || *p < 0.0) {
            return Err(config_error("points", "finite and non-negative"));
        }
        if (self.points.total() - MAX_SCORE).abs() > 1e-9 {
            return Err(config_error("points", "budgets summing to 100"));
        }
        if !strictly_increasing(&self.latency_ms) || self.latency_ms[0] <= 0.0 {
            return Err(config_error("latencyMs", "positive and strictly increasing"));
        }
        for (name, thresholds) in [("accuracy", &self.accuracy), ("edgeSuccess", &self.edge_success)] {
            if !non_increasing(thresholds) || thresholds.iter().any(|t| !(0.0..=1.0).contains(t)) {
                return Err(config_error(name, "non-increasing values in [0, 1]"));
            }
        }
        if !strictly_increasing(&self.comparison) || self.comparison[0] <= 0.0 {
            return Err(config_error("comparison", "positive and strictly increasing"));
        }
        for (name, shares) in [
            ("tierProration", &self.tier_proration[..]),
            ("comparisonProration", &self.comparison_proration[..]),
        ] {
            if !non_increasing(shares) || shares.iter().any(|s| !(0.0..=1.0).contains(s)) {
                return Err(config_error(name, "non-increasing shares in [0, 1]"));
            }
        }
        if !non_increasing(&self.verdict) || self.verdict.iter().any(|v| !(0.0..=MAX_SCORE).contains(v)) {
            return Err(config_error("verdict", "non-increasing scores in [0, 100]"));
        }
        Ok(())
    }

    /// Share of the budget earned at `rating`
    #[must_use]
    pub const fn tier_share(&self, rating: Rating) -> f64 {
        match rating {
            Rating::Excellent => self.tier_proration[0],
            Rating::Good => self.tier_proration[1],
            Rating::Acceptable => self.tier_proration[2],
            Rating::Poor => self.tier_proration[3],
        }
    }

    /// Share of the budget earned at `rating`
    #[must_use]
    pub const fn comparison_share(&self, rating: ComparisonRating) -> f64 {
        match rating {
            ComparisonRating::Match => self.comparison_proration[0],
            ComparisonRating::CloseMatch => self.comparison_proration[1],
            ComparisonRating::SignificantDifference => self.comparison_proration[2],
        }
    }
}

/// Three-tier deployment verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Verdict {
    Ready,
    Caution,
    NotReady,
}

impl Verdict {
    /// Map a total score against `[ready, caution]` minimums
    #[must_use]
    pub fn from_score(score: f64, thresholds: [f64; 2]) -> Self {
        match score {
            s if s >= thresholds[0] => Self::Ready,
            s if s >= thresholds[1] => Self::Caution,
            _ => Self::NotReady,
        }
    }

    /// Long form for console output
    #[must_use]
    pub const fn headline(&self) -> &'static str {
        match self {
            Self::Ready => "READY FOR DEPLOYMENT",
            Self::Caution => "DEPLOYMENT WITH CAUTION",
            Self::NotReady => "NOT READY FOR DEPLOYMENT",
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Ready => "READY",
            Self::Caution => "CAUTION",
            Self::NotReady => "NOT_READY",
        })
    }
}

/// Aggregate produced by [`ReadinessScorer::score`]
#[derive(Debug, Clone, PartialEq)]
pub struct ReadinessScore {
    pub total_score: f64,
    pub max_score: f64,
    pub verdict: Verdict,
    pub recommendations: Vec<String>,
}

/// Turns observations into scored outcomes and a verdict
#[derive(Debug, Clone, Default)]
pub struct ReadinessScorer {
    config: ScoringConfig,
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

impl ReadinessScorer {
    #[must_use]
    pub fn new(config: ScoringConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn config(&self) -> &ScoringConfig {
        &self.config
    }

    /// Score one category
    #[must_use]
    pub fn outcome(&self, category: CategoryKind, observation: Observation) -> CategoryOutcome {
        let possible = self.config.points.for_category(category);
        let (status, share, details, evidence) = match observation {
            Observation::NotTested(reason) => (Status::NotTested, 0.0, reason, None),
            Observation::Failed(reason) => (Status::Fail, 0.0, reason, None),
            Observation::Measured(evidence) if evidence.category() != category => (
                Status::Fail,
                0.0,
                format!("{} evidence reported under {category}", evidence.category()),
                None,
            ),
            Observation::Measured(evidence) => {
                let (status, share, details) = self.measure(&evidence);
                (status, share, details, Some(evidence))
            }
        };
        CategoryOutcome {
            category,
            status,
            points_earned: round2(possible * share.clamp(0.0, 1.0)),
            points_possible: possible,
            details,
            evidence,
        }
    }

    fn measure(&self, evidence: &Evidence) -> (Status, f64, String) {
        let tier_status = |rating: Rating| {
            if rating == Rating::Poor {
                Status::Fail
            } else {
                Status::Pass
            }
        };
        match evidence {
            Evidence::Loading(loading) => (
                Status::Pass,
                1.0,
                format!(
                    "loaded with the {} backend: {} input(s), {} output(s)",
                    loading.backend, loading.input_count, loading.output_count
                ),
            ),
            Evidence::Probe(probe) => {
                let status = if probe.passed_count == probe.total_cases {
                    Status::Pass
                } else {
                    Status::Fail
                };
                let mut details = format!("{}/{} probe cases passed", probe.passed_count, probe.total_cases);
                if !probe.failed_cases().is_empty() {
                    details.push_str(&format!(" (failed: {})", probe.failed_cases().join(", ")));
                }
                if let Some(kind) = probe.output_kind {
                    let kind = match kind {
                        OutputKind::Probability => "probability",
                        OutputKind::Softmax => "softmax distribution",
                        OutputKind::Scores => "raw scores",
                    };
                    details.push_str(&format!("; output reads as {kind}"));
                }
                if probe.deterministic == Some(false) {
                    details.push_str("; outputs are not deterministic");
                }
                if let Some(error) = &probe.repeat_error {
                    details.push_str(&format!("; repeated call failed: {error}"));
                }
                (status, probe.pass_rate(), details)
            }
            Evidence::Performance(perf) => (
                tier_status(perf.rating),
                self.config.tier_share(perf.rating),
                format!(
                    "mean {:.2} ms, p95 {:.2} ms, {:.1} inferences/s over {} runs ({})",
                    perf.mean_ms, perf.p95_ms, perf.throughput_per_second, perf.iterations, perf.rating
                ),
            ),
            Evidence::Accuracy(acc) => (
                tier_status(acc.rating),
                self.config.tier_share(acc.rating),
                format!(
                    "accuracy {:.1}% ({}/{}) on {} {} classes ({})",
                    acc.accuracy * 100.0,
                    acc.correct_count,
                    acc.sample_count,
                    acc.class_count,
                    if acc.binary { "binary" } else { "multiclass" },
                    acc.rating
                ),
            ),
            Evidence::EdgeCases(edge) => (
                tier_status(edge.rating),
                self.config.tier_share(edge.rating),
                format!(
                    "{}/{} edge cases succeeded ({:.1}%) ({})",
                    edge.success_count,
                    edge.sample_count,
                    edge.success_rate * 100.0,
                    edge.rating
                ),
            ),
            Evidence::Consistency(cmp) => (
                if cmp.rating == ComparisonRating::SignificantDifference {
                    Status::Fail
                } else {
                    Status::Pass
                },
                self.config.comparison_share(cmp.rating),
                format!(
                    "max absolute difference {:.2e} over {} input(s) ({})",
                    cmp.max_absolute_difference, cmp.inputs_compared, cmp.rating
                ),
            ),
        }
    }

    /// Total, verdict and recommendations for a set of outcomes
    #[must_use]
    pub fn score(&self, outcomes: &[CategoryOutcome]) -> ReadinessScore {
        let earned: f64 = outcomes.iter().map(|o| o.points_earned).sum();
        let total_score = round2(earned.clamp(0.0, MAX_SCORE));
        ReadinessScore {
            total_score,
            max_score: MAX_SCORE,
            verdict: Verdict::from_score(total_score, self.config.verdict),
            recommendations: outcomes.iter().filter_map(|o| self.recommend(o)).collect(),
        }
    }

    /// One suggestion for an outcome short of a perfect PASS
    #[must_use]
    pub fn recommend(&self, outcome: &CategoryOutcome) -> Option<String> {
        if outcome.status == Status::NotTested {
            return Some(match outcome.category {
                CategoryKind::Accuracy => {
                    "Supply a labeled dataset to validate accuracy".to_string()
                }
                CategoryKind::EdgeCases => {
                    "Supply an edge-case dataset to validate robustness".to_string()
                }
                CategoryKind::Consistency => {
                    "Supply a reference model to validate cross-implementation consistency"
                        .to_string()
                }
                other => format!("Supply the inputs needed to evaluate {other}"),
            });
        }
        let Some(evidence) = &outcome.evidence else {
            return Some(format!("{} failed: {}", outcome.category, outcome.details));
        };
        match evidence {
            Evidence::Loading(_) => None,
            Evidence::Probe(probe) => {
                let failed = probe.failed_cases();
                if !failed.is_empty() {
                    Some(format!(
                        "Model produced invalid output for {} input(s); guard against these inputs before deploying",
                        failed.join(", ")
                    ))
                } else if probe.deterministic == Some(false) {
                    Some("Model output differs between identical calls; check for random operators or uninitialised state".to_string())
                } else if probe.repeat_error.is_some() {
                    Some("Model failed when called again with the same input; check for stateful or resource-bound operators".to_string())
                } else {
                    None
                }
            }
            Evidence::Performance(perf) => match perf.rating {
                Rating::Excellent => None,
                Rating::Good | Rating::Acceptable => Some(format!(
                    "Mean latency {:.1} ms is {}; consider quantization or graph optimization",
                    perf.mean_ms, perf.rating
                )),
                Rating::Poor => Some(format!(
                    "Mean latency {:.1} ms exceeds {:.0} ms; optimize the model or the target hardware before deploying",
                    perf.mean_ms, self.config.latency_ms[2]
                )),
            },
            Evidence::Accuracy(acc) => {
                let target = match acc.rating {
                    Rating::Excellent => return None,
                    Rating::Good => self.config.accuracy[0],
                    Rating::Acceptable => self.config.accuracy[1],
                    Rating::Poor => self.config.accuracy[2],
                };
                Some(format!(
                    "Accuracy {:.1}% below {:.0}% threshold; retrain or rebalance the dataset",
                    acc.accuracy * 100.0,
                    target * 100.0
                ))
            }
            Evidence::EdgeCases(edge) => (edge.rating != Rating::Excellent).then(|| {
                let mut text = format!(
                    "{} of {} edge cases failed; address edge case failures",
                    edge.sample_count - edge.success_count,
                    edge.sample_count
                );
                if let Some(first) = edge.failures.first() {
                    text.push_str(&format!(" (first at row {}: {})", first.row, first.reason));
                }
                text
            }),
            Evidence::Consistency(cmp) => match cmp.rating {
                ComparisonRating::Match => None,
                ComparisonRating::CloseMatch => Some(format!(
                    "Outputs differ from the reference by up to {:.2e}; verify conversion tolerances",
                    cmp.max_absolute_difference
                )),
                ComparisonRating::SignificantDifference => Some(format!(
                    "Outputs differ from the reference by {:.2e}; the converted model does not reproduce the original",
                    cmp.max_absolute_difference
                )),
            },
        }
    }
}

//! Cross-implementation consistency.
//!
//! Runs the same inputs through the evaluated model and a reference
//! implementation (usually the pre-conversion model) and reports the worst
//! element-wise absolute difference between their first outputs.

use super::{Budget, Evidence, Observation};
use crate::runtime::{SharedSession, Tensor};
use crate::scoring::ScoringConfig;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info, warn};

/// How closely the two implementations agree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ComparisonRating {
    Match,
    CloseMatch,
    SignificantDifference,
}

impl ComparisonRating {
    /// Rate a difference against `[match, close]` upper bounds (exclusive)
    #[must_use]
    pub fn from_difference(difference: f64, limits: [f64; 2]) -> Self {
        if difference < limits[0] {
            Self::Match
        } else if difference < limits[1] {
            Self::CloseMatch
        } else {
            Self::SignificantDifference
        }
    }
}

impl fmt::Display for ComparisonRating {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Match => "MATCH",
            Self::CloseMatch => "CLOSE_MATCH",
            Self::SignificantDifference => "SIGNIFICANT_DIFFERENCE",
        })
    }
}

/// Evidence of the consistency category
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComparisonResult {
    pub max_absolute_difference: f64,
    pub rating: ComparisonRating,
    pub inputs_compared: usize,
}

/// Compares the evaluated model against a reference implementation
#[derive(Debug, Clone, Copy, Default)]
pub struct CrossImplementationComparator;

impl CrossImplementationComparator {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Compare on `inputs`, unless the reference can only answer for its own
    /// recorded inputs, in which case those are used instead.
    pub fn run(
        &self,
        primary: &SharedSession,
        reference: Option<&SharedSession>,
        inputs: &[Tensor],
        config: &ScoringConfig,
        budget: &Budget,
    ) -> Observation {
        let Some(reference) = reference else {
            return Observation::NotTested("no reference model supplied".to_string());
        };
        let recorded = match reference.fixed_inputs() {
            Ok(recorded) => recorded,
            Err(e) => return Observation::from_error(&e),
        };
        let inputs = recorded.as_deref().unwrap_or(inputs);
        if inputs.is_empty() {
            return Observation::Failed("no shared inputs to compare".to_string());
        }

        let mut worst = 0.0f64;
        for (idx, input) in inputs.iter().enumerate() {
            if let Err(e) = budget.check() {
                return Observation::Failed(format!("{e} after {idx} of {} inputs", inputs.len()));
            }
            match compare_one(primary, reference, input) {
                Ok(difference) => {
                    debug!(input = idx, difference, "outputs compared");
                    worst = worst.max(difference);
                }
                Err(reason) => {
                    warn!(input = idx, %reason, "comparison failed");
                    return Observation::Failed(format!("input {}: {reason}", idx + 1));
                }
            }
        }

        let result = ComparisonResult {
            max_absolute_difference: worst,
            rating: ComparisonRating::from_difference(worst, config.comparison),
            inputs_compared: inputs.len(),
        };
        info!(
            max_difference = result.max_absolute_difference,
            rating = %result.rating,
            "consistency measured"
        );
        Observation::Measured(Evidence::Consistency(result))
    }
}

/// Largest absolute difference between the first outputs for one input
fn compare_one(primary: &SharedSession, reference: &SharedSession, input: &Tensor) -> Result<f64, String> {
    let first_output = |session: &SharedSession, role: &str| {
        session
            .run_primary(input.clone())
            .map_err(|e| format!("{role} model: {e}"))?
            .into_iter()
            .next()
            .map(|(_, tensor)| tensor)
            .ok_or_else(|| format!("{role} model returned no outputs"))
    };
    let ours = first_output(primary, "evaluated")?;
    let theirs = first_output(reference, "reference")?;
    if ours.numel() != theirs.numel() {
        return Err(format!(
            "output shapes differ: {:?} vs reference {:?}",
            ours.shape, theirs.shape
        ));
    }
    let mut worst = 0.0f64;
    for (a, b) in ours.data.iter().zip(&theirs.data) {
        let difference = f64::from((a - b).abs());
        if !difference.is_finite() {
            return Err(format!("non-finite output pair ({a}, {b})"));
        }
        worst = worst.max(difference);
    }
    Ok(worst)
}

//! Latency and throughput benchmarking.
//!
//! Protocol: untimed warm-up call(s) to absorb first-call initialisation,
//! then `iterations` timed calls on one representative input. Any timed
//! call raising fails the whole category.

use super::{Budget, Evidence, Observation, Rating};
use crate::runtime::{SharedSession, Tensor};
use crate::scoring::ScoringConfig;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Distribution of per-call latencies in milliseconds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BenchmarkSummary {
    pub iterations: usize,
    pub mean_ms: f64,
    pub min_ms: f64,
    pub max_ms: f64,
    pub std_dev_ms: f64,
    pub p50_ms: f64,
    pub p95_ms: f64,
    pub throughput_per_second: f64,
    pub rating: Rating,
}

impl BenchmarkSummary {
    /// Summarise timing samples; `None` when there are none
    #[must_use]
    pub fn from_samples(samples_ms: &[f64], limits_ms: [f64; 3]) -> Option<Self> {
        if samples_ms.is_empty() {
            return None;
        }
        let n = samples_ms.len() as f64;
        let mean = samples_ms.iter().sum::<f64>() / n;
        let variance = samples_ms.iter().map(|t| (t - mean).powi(2)).sum::<f64>() / n;

        let mut sorted = samples_ms.to_vec();
        sorted.sort_by(f64::total_cmp);
        let min = sorted[0];
        let max = sorted[sorted.len() - 1];
        // Summation error can leave the mean a hair outside [min, max]
        let mean = mean.clamp(min, max);

        Some(Self {
            iterations: samples_ms.len(),
            mean_ms: mean,
            min_ms: min,
            max_ms: max,
            std_dev_ms: variance.sqrt(),
            p50_ms: percentile(&sorted, 0.50),
            p95_ms: percentile(&sorted, 0.95),
            throughput_per_second: 1000.0 / mean.max(MIN_MEAN_MS),
            rating: Rating::from_latency(mean, limits_ms),
        })
    }
}

/// Floor for the mean when deriving throughput; timers can report 0 ms
const MIN_MEAN_MS: f64 = 1e-6;

/// Nearest-rank percentile of an ascending slice
fn percentile(sorted: &[f64], q: f64) -> f64 {
    let rank = (q * sorted.len() as f64).ceil() as usize;
    sorted[rank.clamp(1, sorted.len()) - 1]
}

/// Times repeated inference calls
#[derive(Debug, Clone, Copy)]
pub struct PerformanceBenchmarker {
    iterations: usize,
    warmup: usize,
}

impl Default for PerformanceBenchmarker {
    fn default() -> Self {
        Self {
            iterations: 100,
            warmup: 1,
        }
    }
}

impl PerformanceBenchmarker {
    #[must_use]
    pub fn new(iterations: usize, warmup: usize) -> Self {
        Self { iterations, warmup }
    }

    /// Benchmark `input` (usually the `normal` probe input)
    pub fn run(
        &self,
        session: &SharedSession,
        input: &Tensor,
        config: &ScoringConfig,
        budget: &Budget,
    ) -> Observation {
        if self.iterations == 0 {
            return Observation::Failed("benchmark needs at least one iteration".to_string());
        }
        let feed = match session.feed(input.clone()) {
            Ok(feed) => feed,
            Err(e) => return Observation::from_error(&e),
        };

        for _ in 0..self.warmup {
            if let Err(e) = session.run(&feed) {
                warn!(error = %e, "warm-up call failed");
                return Observation::Failed(format!("warm-up call failed: {e}"));
            }
        }

        let mut samples = Vec::with_capacity(self.iterations);
        for i in 0..self.iterations {
            if let Err(e) = budget.check() {
                warn!(completed = i, "benchmark interrupted");
                return Observation::Failed(format!("{e} after {i} of {} iterations", self.iterations));
            }
            let start = Instant::now();
            if let Err(e) = session.run(&feed) {
                return Observation::Failed(format!("iteration {} failed: {e}", i + 1));
            }
            samples.push(start.elapsed().as_secs_f64() * 1000.0);
        }
        debug!(samples = samples.len(), "benchmark samples collected");

        match BenchmarkSummary::from_samples(&samples, config.latency_ms) {
            Some(summary) => {
                info!(
                    mean_ms = summary.mean_ms,
                    throughput = summary.throughput_per_second,
                    rating = %summary.rating,
                    "performance measured"
                );
                Observation::Measured(Evidence::Performance(summary))
            }
            None => Observation::Failed("no timing samples collected".to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::onnx::OnnxModel;
    use crate::format::test_factory::build_pygmy_logistic;
    use crate::runtime::native::NativeSession;

    const LIMITS: [f64; 3] = [100.0, 500.0, 1000.0];

    #[test]
    fn test_summary_of_constant_latency() {
        let summary = BenchmarkSummary::from_samples(&[12.0; 100], LIMITS).unwrap();
        assert_eq!(summary.iterations, 100);
        assert!((summary.mean_ms - 12.0).abs() < 1e-9);
        assert!(summary.std_dev_ms.abs() < 1e-9);
        assert!((summary.throughput_per_second - 83.333).abs() < 0.01);
        assert_eq!(summary.rating, Rating::Excellent);
    }

    #[test]
    fn test_summary_statistics() {
        let samples = [10.0, 20.0, 30.0, 40.0];
        let summary = BenchmarkSummary::from_samples(&samples, LIMITS).unwrap();
        assert_eq!(summary.min_ms, 10.0);
        assert_eq!(summary.max_ms, 40.0);
        assert_eq!(summary.mean_ms, 25.0);
        assert_eq!(summary.p50_ms, 20.0);
        assert_eq!(summary.p95_ms, 40.0);
        assert!((summary.std_dev_ms - 125.0f64.sqrt()).abs() < 1e-9);
    }

    #[test]
    fn test_rating_thresholds() {
        let rate = |ms: f64| BenchmarkSummary::from_samples(&[ms], LIMITS).unwrap().rating;
        assert_eq!(rate(99.9), Rating::Excellent);
        assert_eq!(rate(100.0), Rating::Good);
        assert_eq!(rate(499.0), Rating::Good);
        assert_eq!(rate(500.0), Rating::Acceptable);
        assert_eq!(rate(1000.0), Rating::Poor);
    }

    #[test]
    fn test_zero_latency_keeps_throughput_finite() {
        let summary = BenchmarkSummary::from_samples(&[0.0; 10], LIMITS).unwrap();
        assert!(summary.throughput_per_second.is_finite());
        assert_eq!(summary.throughput_per_second, 1e9);
        let json = serde_json::to_string(&summary).unwrap();
        assert!(!json.contains("null"), "{json}");
        let back: BenchmarkSummary = serde_json::from_str(&json).unwrap();
        assert_eq!(back, summary);
    }

    #[test]
    fn test_summary_survives_json_round_trip() {
        let samples = [0.1234567891, 0.9876543219, 1.0 / 3.0, 0.0421];
        let summary = BenchmarkSummary::from_samples(&samples, LIMITS).unwrap();
        let back: BenchmarkSummary = serde_json::from_str(&serde_json::to_string(&summary).unwrap()).unwrap();
        assert_eq!(back.mean_ms.to_bits(), summary.mean_ms.to_bits());
        assert_eq!(back, summary);
    }

    #[test]
    fn test_empty_samples() {
        assert!(BenchmarkSummary::from_samples(&[], LIMITS).is_none());
    }

    #[test]
    fn test_benchmark_native_model() {
        let model = OnnxModel::from_bytes(&build_pygmy_logistic(4)).unwrap();
        let session = SharedSession::new(Box::new(NativeSession::from_model(&model).unwrap()));
        let input = Tensor::filled(vec![1, 4], 0.5).unwrap();
        let observation = PerformanceBenchmarker::new(20, 1).run(
            &session,
            &input,
            &ScoringConfig::default(),
            &Budget::unlimited(),
        );
        let Observation::Measured(Evidence::Performance(summary)) = observation else {
            panic!("expected performance evidence");
        };
        assert_eq!(summary.iterations, 20);
        assert!(summary.min_ms <= summary.mean_ms && summary.mean_ms <= summary.max_ms);
    }

    #[test]
    fn test_bad_input_fails_category() {
        let model = OnnxModel::from_bytes(&build_pygmy_logistic(4)).unwrap();
        let session = SharedSession::new(Box::new(NativeSession::from_model(&model).unwrap()));
        let input = Tensor::filled(vec![1, 3], 0.5).unwrap();
        let observation = PerformanceBenchmarker::default().run(
            &session,
            &input,
            &ScoringConfig::default(),
            &Budget::unlimited(),
        );
        assert!(matches!(observation, Observation::Failed(reason) if reason.contains("warm-up")));
    }

    #[test]
    fn test_expired_budget_fails_with_timeout() {
        let model = OnnxModel::from_bytes(&build_pygmy_logistic(2)).unwrap();
        let session = SharedSession::new(Box::new(NativeSession::from_model(&model).unwrap()));
        let budget = Budget::new(std::time::Duration::ZERO);
        let observation = PerformanceBenchmarker::default().run(
            &session,
            &Tensor::filled(vec![1, 2], 0.0).unwrap(),
            &ScoringConfig::default(),
            &budget,
        );
        assert!(matches!(observation, Observation::Failed(reason) if reason.contains("exceeded")));
    }
}

//! Property-based tests using proptest.
//!
//! These tests verify invariants of the statistics and ratings that feed
//! the readiness score.

use modelgate::preprocessing::{FeatureScaler, Preprocessor};
use modelgate::qa::accuracy::AccuracyResult;
use modelgate::qa::consistency::ComparisonRating;
use modelgate::qa::edge_cases::EdgeCaseResult;
use modelgate::qa::latency::BenchmarkSummary;
use modelgate::qa::Rating;
use modelgate::scoring::{ScoringConfig, Verdict};
use proptest::prelude::*;

fn latency_samples() -> impl Strategy<Value = Vec<f64>> {
    proptest::collection::vec(0.001f64..5000.0, 1..200)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    #[test]
    fn benchmark_mean_lies_between_extremes(samples in latency_samples()) {
        let summary = BenchmarkSummary::from_samples(&samples, [100.0, 500.0, 1000.0]).unwrap();
        prop_assert!(summary.min_ms <= summary.mean_ms);
        prop_assert!(summary.mean_ms <= summary.max_ms);
        prop_assert!(summary.p50_ms <= summary.p95_ms);
        prop_assert!(summary.std_dev_ms >= 0.0);
        prop_assert!(summary.throughput_per_second > 0.0);
        prop_assert_eq!(summary.iterations, samples.len());
    }

    #[test]
    fn accuracy_lies_in_unit_interval(correct in 0usize..2000, total in 0usize..2000) {
        let result = AccuracyResult::from_counts(correct, total, [0.90, 0.80, 0.70]);
        prop_assert!((0.0..=1.0).contains(&result.accuracy));
        prop_assert!(result.correct_count <= result.sample_count);
    }

    #[test]
    fn edge_success_rate_lies_in_unit_interval(ok in 0usize..500, total in 0usize..500) {
        let result = EdgeCaseResult::from_counts(ok, total, [0.95, 0.80, 0.60]);
        prop_assert!((0.0..=1.0).contains(&result.success_rate));
    }

    #[test]
    fn higher_accuracy_never_rates_worse(a in 0.0f64..=1.0, b in 0.0f64..=1.0) {
        let thresholds = ScoringConfig::default().accuracy;
        let (low, high) = if a <= b { (a, b) } else { (b, a) };
        prop_assert!(Rating::from_score(high, thresholds) <= Rating::from_score(low, thresholds));
    }

    #[test]
    fn slower_latency_never_rates_better(a in 0.0f64..5000.0, b in 0.0f64..5000.0) {
        let limits = ScoringConfig::default().latency_ms;
        let (fast, slow) = if a <= b { (a, b) } else { (b, a) };
        prop_assert!(Rating::from_latency(fast, limits) <= Rating::from_latency(slow, limits));
    }

    #[test]
    fn comparison_rating_is_monotonic(a in 0.0f64..1.0, b in 0.0f64..1.0) {
        let limits = ScoringConfig::default().comparison;
        let (small, large) = if a <= b { (a, b) } else { (b, a) };
        let rank = |r: ComparisonRating| match r {
            ComparisonRating::Match => 0,
            ComparisonRating::CloseMatch => 1,
            ComparisonRating::SignificantDifference => 2,
        };
        prop_assert!(rank(ComparisonRating::from_difference(small, limits))
            <= rank(ComparisonRating::from_difference(large, limits)));
    }

    #[test]
    fn verdict_thresholds_partition_scores(score in 0.0f64..=100.0) {
        let verdict = Verdict::from_score(score, [85.0, 70.0]);
        prop_assert_eq!(verdict == Verdict::Ready, score >= 85.0);
        prop_assert_eq!(verdict == Verdict::NotReady, score < 70.0);
    }

    #[test]
    fn scaler_centers_its_own_mean(
        mean in proptest::collection::vec(-100.0f32..100.0, 1..16),
        scale in 0.1f32..10.0,
    ) {
        let scaler = FeatureScaler::new(mean.clone(), vec![scale; mean.len()]).unwrap();
        let mut row = mean.clone();
        scaler.apply(&mut row).unwrap();
        prop_assert!(row.iter().all(|v| v.abs() < 1e-4));
    }
}

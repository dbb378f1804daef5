//! Property-based tests for sp-math percentile functions.
//!
//! Uses proptest to verify ordering properties hold across many random inputs.

use proptest::prelude::*;
use sp_math::{legacy_percentile, percentile};

/// Percentiles reported by the aggregator, plus the lower edge.
const LEVELS: [f64; 4] = [0.0, 0.5, 0.9, 0.99];

fn sorted_samples(max_len: usize) -> impl Strategy<Value = Vec<u32>> {
    prop::collection::vec(0u32..10_000, 1..max_len).prop_map(|mut v| {
        v.sort_unstable();
        v
    })
}

// ============================================================================
// percentile properties
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(1000))]

    /// percentile is monotonic non-decreasing in p.
    #[test]
    fn percentile_monotonic_in_p(vals in sorted_samples(300)) {
        let results: Vec<u32> = LEVELS.iter().map(|p| percentile(&vals, *p)).collect();
        for pair in results.windows(2) {
            prop_assert!(pair[0] <= pair[1], "not monotonic over {:?}: {:?}", LEVELS, results);
        }
    }

    /// percentile stays within the sample range.
    #[test]
    fn percentile_bounded_by_samples(vals in sorted_samples(300), p in 0.0..=1.0f64) {
        let result = percentile(&vals, p);
        let first = vals[0];
        let last = vals[vals.len() - 1];
        prop_assert!(result >= first && result <= last,
            "p{}={} outside [{}, {}]", p, result, first, last);
    }

    /// A single sample is returned for every p.
    #[test]
    fn percentile_single_sample(value in any::<u32>(), p in 0.0..=1.0f64) {
        prop_assert_eq!(percentile(&[value], p), value);
        prop_assert_eq!(legacy_percentile(&[value], p), value as i64);
    }

    /// Constant samples have a constant percentile.
    #[test]
    fn percentile_constant_samples(value in any::<u32>(), n in 2usize..200, p in 0.0..=1.0f64) {
        let vals = vec![value; n];
        prop_assert_eq!(percentile(&vals, p), value);
    }
}

// ============================================================================
// legacy_percentile properties
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(1000))]

    /// Whenever the rank is non-negative both forms agree.
    #[test]
    fn legacy_agrees_above_first_rank(vals in sorted_samples(300), p in 0.0..=1.0f64) {
        let n = vals.len() as f64;
        prop_assume!(p * n - 1.0 >= 0.0);
        prop_assert_eq!(legacy_percentile(&vals, p), percentile(&vals, p) as i64);
    }

    /// The legacy form never exceeds the clamped form.
    #[test]
    fn legacy_never_above_clamped(vals in sorted_samples(300), p in 0.0..=1.0f64) {
        prop_assert!(legacy_percentile(&vals, p) <= percentile(&vals, p) as i64);
    }
}

//! Single-pass aggregation of data points into a statistics snapshot.
//!
//! Occurrences are counted per distinct count value, so memory grows with the
//! number of distinct values rather than the number of points. Engagement
//! counts cluster heavily, which keeps the map small.

use std::collections::BTreeMap;

use sp_common::{DataPoint, Statistics};
use sp_math::percentile;

/// Percentile levels reported in [`Statistics`].
pub const P50: f64 = 0.50;
pub const P90: f64 = 0.90;
pub const P99: f64 = 0.99;

/// Running aggregation over the data points of one subscription.
#[derive(Debug, Clone, Default)]
pub struct Aggregator {
    min_time: Option<u32>,
    max_time: Option<u32>,
    occurrences: BTreeMap<u32, u64>,
    total: u64,
}

impl Aggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one data point.
    pub fn observe(&mut self, point: DataPoint) {
        self.min_time = Some(self.min_time.map_or(point.time, |t| t.min(point.time)));
        self.max_time = Some(self.max_time.map_or(point.time, |t| t.max(point.time)));
        *self.occurrences.entry(point.count).or_insert(0) += 1;
        self.total += 1;
    }

    /// Number of points observed so far.
    pub fn total(&self) -> u64 {
        self.total
    }

    /// Number of distinct count values observed so far.
    pub fn distinct(&self) -> usize {
        self.occurrences.len()
    }

    /// Compute the statistics snapshot.
    pub fn finish(&self) -> Statistics {
        if self.total == 0 {
            return Statistics::default();
        }

        // The map iterates in ascending key order, so the expansion is sorted.
        let mut counts = Vec::with_capacity(usize::try_from(self.total).unwrap_or(0));
        for (&count, &occurrences) in &self.occurrences {
            for _ in 0..occurrences {
                counts.push(count);
            }
        }

        Statistics {
            total_posts: self.total,
            minimum_timestamp: self.min_time.unwrap_or(0),
            maximum_timestamp: self.max_time.unwrap_or(0),
            p50: percentile(&counts, P50),
            p90: percentile(&counts, P90),
            p99: percentile(&counts, P99),
        }
    }
}

impl Extend<DataPoint> for Aggregator {
    fn extend<I: IntoIterator<Item = DataPoint>>(&mut self, points: I) {
        for point in points {
            self.observe(point);
        }
    }
}

/// Consume `points` until the sequence ends and return its statistics.
///
/// Passing a `Receiver<DataPoint>` reads until every sender is gone.
pub fn collect<I: IntoIterator<Item = DataPoint>>(points: I) -> Statistics {
    let mut aggregator = Aggregator::new();
    aggregator.extend(points);
    aggregator.finish()
}

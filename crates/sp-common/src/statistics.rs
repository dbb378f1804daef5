//! Statistics snapshots produced by one aggregation window.

use serde::{Deserialize, Serialize};

/// Terminal result of aggregating one subscription's data points.
///
/// Every field is zero when no data point was observed; `total_posts`
/// distinguishes "no data" from legitimate zero percentiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Statistics {
    pub total_posts: u64,
    pub minimum_timestamp: u32,
    pub maximum_timestamp: u32,
    pub p50: u32,
    pub p90: u32,
    pub p99: u32,
}

impl Statistics {
    /// Whether the window observed no data point.
    pub fn is_empty(&self) -> bool {
        self.total_posts == 0
    }
}

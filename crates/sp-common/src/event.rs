//! Parsed post-activity events and their per-dimension projections.

use chrono::DateTime;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::dimension::Dimension;

/// The projection of one event onto one dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DataPoint {
    /// Event time, seconds since the Unix epoch.
    pub time: u32,
    /// Engagement count for the dimension.
    pub count: u32,
}

impl DataPoint {
    pub fn new(time: u32, count: u32) -> Self {
        Self { time, count }
    }
}

/// One post-activity record from the feed.
///
/// A `None` count means the dimension was not reported, which is distinct
/// from a reported zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Event {
    pub id: u32,
    pub unix_time: u32,
    pub counts: [Option<u32>; Dimension::COUNT],
}

impl Event {
    pub fn new(id: u32, unix_time: u32) -> Self {
        Self {
            id,
            unix_time,
            counts: [None; Dimension::COUNT],
        }
    }

    /// Set the count reported for `dimension`.
    pub fn with_count(mut self, dimension: Dimension, count: u32) -> Self {
        self.counts[dimension.index()] = Some(count);
        self
    }

    /// Count reported for `dimension`, if any.
    pub fn count(&self, dimension: Dimension) -> Option<u32> {
        self.counts[dimension.index()]
    }

    /// One data point per reported dimension, in dimension order.
    pub fn data_points(&self) -> impl Iterator<Item = (Dimension, DataPoint)> + '_ {
        Dimension::ALL.into_iter().filter_map(move |dimension| {
            self.count(dimension)
                .map(|count| (dimension, DataPoint::new(self.unix_time, count)))
        })
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match DateTime::from_timestamp(i64::from(self.unix_time), 0) {
            Some(date) => write!(f, "{} ID:{}", date.format("%Y-%m-%d %H:%M:%S"), self.id)?,
            None => write!(f, "@{} ID:{}", self.unix_time, self.id)?,
        }
        for dimension in Dimension::ALL {
            match self.count(dimension) {
                Some(count) => write!(f, ",{}:{}", dimension, count)?,
                None => write!(f, ",{}:-", dimension)?,
            }
        }
        Ok(())
    }
}

//! Engagement dimensions.
//!
//! A dimension is both a statistics axis and the broker topic key. The
//! ordinal of each variant is a compatibility contract: new dimensions are
//! appended, never reordered or removed.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// A social engagement metric reported by the event feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum Dimension {
    Likes = 0,
    Comments = 1,
    Favorites = 2,
    Retweets = 3,
}

/// Error returned when a name matches no dimension.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown dimension {name:?}, must be one of: {}", Dimension::names().join(", "))]
pub struct UnknownDimension {
    pub name: String,
}

impl Dimension {
    /// Every dimension with its wire name, in ordinal order. `ALL`,
    /// `COUNT` and `name()` are all derived from this table.
    const TABLE: [(Dimension, &'static str); 4] = [
        (Dimension::Likes, "likes"),
        (Dimension::Comments, "comments"),
        (Dimension::Favorites, "favorites"),
        (Dimension::Retweets, "retweets"),
    ];

    /// Number of dimensions.
    pub const COUNT: usize = Self::TABLE.len();

    /// Every dimension in ordinal order.
    pub const ALL: [Dimension; Self::COUNT] = {
        let mut all = [Dimension::Likes; Self::COUNT];
        let mut i = 0;
        while i < Self::COUNT {
            all[i] = Self::TABLE[i].0;
            i += 1;
        }
        all
    };

    /// Wire name, also used as the JSON field name in events.
    pub const fn name(self) -> &'static str {
        Self::TABLE[self as usize].1
    }

    /// Stable ordinal position.
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Dimension at ordinal position `index`.
    pub fn from_index(index: usize) -> Option<Dimension> {
        Self::ALL.get(index).copied()
    }

    /// All names in ordinal order.
    pub fn names() -> Vec<&'static str> {
        Self::ALL.iter().map(|d| d.name()).collect()
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Dimension {
    type Err = UnknownDimension;

    /// Case-sensitive lookup by wire name.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|d| d.name() == s)
            .ok_or_else(|| UnknownDimension {
                name: s.to_string(),
            })
    }
}

impl Serialize for Dimension {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

impl<'de> Deserialize<'de> for Dimension {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        name.parse().map_err(serde::de::Error::custom)
    }
}

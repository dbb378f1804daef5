//! Core math modules.

pub mod percentile;

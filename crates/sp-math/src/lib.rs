//! Social Pulse math utilities.

pub mod math;

pub use math::percentile::*;

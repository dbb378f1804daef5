//! Social Pulse common types and errors.
//!
//! This crate provides foundational types shared across sp-core modules:
//! - The fixed, ordered set of engagement dimensions
//! - Parsed events and their per-dimension data points
//! - Statistics snapshots
//! - Common error types

pub mod dimension;
pub mod error;
pub mod event;
pub mod statistics;

pub use dimension::{Dimension, UnknownDimension};
pub use error::{Error, ErrorCategory, Result, StructuredError};
pub use event::{DataPoint, Event};
pub use statistics::Statistics;

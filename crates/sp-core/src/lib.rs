//! Social Pulse Core Library
//!
//! This library provides the core functionality for social pulse:
//! - Topic broker fanning data points out to subscribers
//! - Event feed parsing and ingestion
//! - Windowed percentile aggregation
//! - The `/analysis` HTTP surface
//! - Configuration, logging and exit codes for the CLI
//!
//! The binary entry point is in `main.rs`.

pub mod aggregate;
pub mod analysis;
pub mod config;
pub mod exit_codes;
pub mod logging;
pub mod publish;
pub mod server;
pub mod session;
pub mod source;
pub mod transport;

pub use analysis::{analyze, AnalysisReport, AnalysisRequest};
pub use publish::{Broker, Cancel, Publisher};
pub use session::EventStream;

//! Stable event identifiers and per-run log context.
//!
//! Every structured log line carries an `event` name from [`event_names`], the
//! `run_id` of the process and the [`Stage`] it was emitted from, so JSONL
//! output can be filtered without parsing messages.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable event names.
pub mod event_names {
    // Run lifecycle
    pub const RUN_STARTED: &str = "run.started";
    pub const RUN_FINISHED: &str = "run.finished";

    // Configuration
    pub const CONFIG_LOADED: &str = "config.loaded";
    pub const CONFIG_DEFAULT_USED: &str = "config.default_used";
    pub const CONFIG_ERROR: &str = "config.error";

    // Event feed
    pub const STREAM_OPENED: &str = "stream.opened";
    pub const STREAM_LINE_REJECTED: &str = "stream.line_rejected";
    pub const STREAM_FINISHED: &str = "stream.finished";
    pub const STREAM_FAILED: &str = "stream.failed";

    // Gathering
    pub const GATHER_STARTED: &str = "gather.started";
    pub const GATHER_FINISHED: &str = "gather.finished";

    // HTTP surface
    pub const SERVER_STARTED: &str = "server.started";
    pub const SERVER_REQUEST: &str = "server.request";
    pub const SERVER_REJECTED: &str = "server.rejected";
    pub const SERVER_STOPPED: &str = "server.stopped";

    pub const INTERNAL_ERROR: &str = "internal_error";
}

/// Part of the pipeline an event was emitted from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Startup and configuration.
    Init,
    /// Reading and parsing the feed.
    Stream,
    /// Subscription windows and aggregation.
    Gather,
    /// HTTP request handling.
    Serve,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Init => "init",
            Stage::Stream => "stream",
            Stage::Gather => "gather",
            Stage::Serve => "serve",
        })
    }
}

/// Correlation fields shared by every event of one process run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogContext {
    pub run_id: String,
}

impl LogContext {
    pub fn new(run_id: impl Into<String>) -> Self {
        LogContext {
            run_id: run_id.into(),
        }
    }
}

/// Emit a structured event with the run context attached.
///
/// ```ignore
/// log_event!(ctx, INFO, event_names::SERVER_STARTED, Stage::Serve, "listening", addr = %addr);
/// ```
#[macro_export]
macro_rules! log_event {
    ($ctx:expr, $level:ident, $event:expr, $stage:expr, $msg:expr $(, $($field:tt)+)?) => {
        tracing::event!(
            tracing::Level::$level,
            event = $event,
            run_id = %$ctx.run_id,
            stage = %$stage,
            message = $msg
            $(, $($field)+)?
        )
    };
}

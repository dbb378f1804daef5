//! Error types for Social Pulse.
//!
//! This module provides structured error handling with:
//! - Stable error codes for machine parsing
//! - Category classification for error grouping
//! - Recoverability hints for automation
//! - Remediation suggestions for humans
//!
//! # Human-Facing Output
//!
//! ```text
//! ✗ Unknown Dimension
//!   Reason: unknown dimension "shares", must be one of: likes, comments, favorites, retweets
//!   Fix: Use one of the listed dimension names; names are case-sensitive.
//! ```
//!
//! # Machine-Facing Output
//!
//! Errors serialize to structured JSON, which is also the body of every
//! HTTP error response:
//! ```json
//! {
//!   "code": 22,
//!   "category": "request",
//!   "message": "invalid duration \"10 parsecs\": unknown unit \"parsecs\"",
//!   "recoverable": true,
//!   "context": { "parameter": "duration" }
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

use crate::dimension::UnknownDimension;

/// Result type alias for Social Pulse operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error categories for grouping related errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Configuration file errors.
    Config,
    /// Client request validation errors.
    Request,
    /// Event stream transport and termination errors.
    Stream,
    /// HTTP server errors.
    Server,
    /// File I/O and serialization errors.
    Io,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorCategory::Config => write!(f, "config"),
            ErrorCategory::Request => write!(f, "request"),
            ErrorCategory::Stream => write!(f, "stream"),
            ErrorCategory::Server => write!(f, "server"),
            ErrorCategory::Io => write!(f, "io"),
        }
    }
}

/// Unified error type for Social Pulse.
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors (10-19)
    #[error("configuration error: {0}")]
    Config(String),

    #[error("config file not found: {path}")]
    ConfigNotFound { path: String },

    // Request validation errors (20-29)
    #[error("missing {name} query parameter")]
    MissingParameter { name: &'static str },

    #[error(transparent)]
    UnknownDimension(#[from] UnknownDimension),

    #[error("invalid duration {value:?}: {reason}")]
    InvalidDuration { value: String, reason: String },

    #[error("invalid duration {value:?}: must not be negative")]
    NegativeDuration { value: String },

    // Stream errors (30-39)
    #[error("event stream unavailable: {0}")]
    StreamUnavailable(String),

    #[error("event stream terminated: {0}")]
    StreamTerminated(String),

    #[error("event stream already has a source attached")]
    AlreadyAttached,

    // Server errors (40-49)
    #[error("server error: {0}")]
    Server(String),

    // I/O errors (60-69)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Returns the error code for this error type.
    ///
    /// Error codes are stable and grouped by category:
    /// - 10-19: Configuration errors
    /// - 20-29: Request validation errors
    /// - 30-39: Stream errors
    /// - 40-49: Server errors
    /// - 60-69: I/O errors
    pub fn code(&self) -> u32 {
        match self {
            Error::Config(_) => 10,
            Error::ConfigNotFound { .. } => 11,
            Error::MissingParameter { .. } => 20,
            Error::UnknownDimension(_) => 21,
            Error::InvalidDuration { .. } => 22,
            Error::NegativeDuration { .. } => 23,
            Error::StreamUnavailable(_) => 30,
            Error::StreamTerminated(_) => 31,
            Error::AlreadyAttached => 32,
            Error::Server(_) => 40,
            Error::Io(_) => 60,
            Error::Json(_) => 61,
        }
    }

    /// Returns the error category for grouping and filtering.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Config(_) | Error::ConfigNotFound { .. } => ErrorCategory::Config,

            Error::MissingParameter { .. }
            | Error::UnknownDimension(_)
            | Error::InvalidDuration { .. }
            | Error::NegativeDuration { .. } => ErrorCategory::Request,

            Error::StreamUnavailable(_) | Error::StreamTerminated(_) | Error::AlreadyAttached => {
                ErrorCategory::Stream
            }

            Error::Server(_) => ErrorCategory::Server,

            Error::Io(_) | Error::Json(_) => ErrorCategory::Io,
        }
    }

    /// Whether this error is a client-side request error.
    pub fn is_request_error(&self) -> bool {
        self.category() == ErrorCategory::Request
    }

    /// Returns whether this error is potentially recoverable.
    pub fn is_recoverable(&self) -> bool {
        match self {
            Error::Config(_) | Error::ConfigNotFound { .. } => true,

            // The client can fix the request and retry
            Error::MissingParameter { .. }
            | Error::UnknownDimension(_)
            | Error::InvalidDuration { .. }
            | Error::NegativeDuration { .. } => true,

            Error::StreamUnavailable(_) => true,
            Error::StreamTerminated(_) => false,
            Error::AlreadyAttached => false,

            Error::Server(_) => true,
            Error::Io(_) => true,
            Error::Json(_) => false,
        }
    }

    /// Returns a human-readable remediation hint.
    pub fn remediation(&self) -> &'static str {
        match self {
            Error::Config(_) => "Run 'sp-core check' to validate the configuration file.",
            Error::ConfigNotFound { .. } => {
                "Check the --config path or the SOCIAL_PULSE_CONFIG environment variable."
            }
            Error::MissingParameter { .. } => {
                "Pass both 'dimension' and 'duration', e.g. /analysis?dimension=likes&duration=30s."
            }
            Error::UnknownDimension(_) => {
                "Use one of the listed dimension names; names are case-sensitive."
            }
            Error::InvalidDuration { .. } => {
                "Use a duration such as '500ms', '30s', '5m' or '1h30m'."
            }
            Error::NegativeDuration { .. } => "Use a duration of zero or more.",
            Error::StreamUnavailable(_) => {
                "Check the stream URL and network connectivity, then retry."
            }
            Error::StreamTerminated(_) => {
                "The event feed ended with an error. Rerun, or restart the server, to reconnect."
            }
            Error::AlreadyAttached => "Open a new event stream for each input source.",
            Error::Server(_) => "Check that the listen address is free and valid.",
            Error::Io(_) => "Check file paths and permissions, then retry the operation.",
            Error::Json(_) => "Invalid JSON. Check the syntax with 'jq .'.",
        }
    }

    /// Returns a short headline for human-readable output.
    pub fn headline(&self) -> &'static str {
        match self {
            Error::Config(_) => "Configuration Error",
            Error::ConfigNotFound { .. } => "Configuration Not Found",
            Error::MissingParameter { .. } => "Missing Parameter",
            Error::UnknownDimension(_) => "Unknown Dimension",
            Error::InvalidDuration { .. } => "Invalid Duration",
            Error::NegativeDuration { .. } => "Negative Duration",
            Error::StreamUnavailable(_) => "Event Stream Unavailable",
            Error::StreamTerminated(_) => "Event Stream Terminated",
            Error::AlreadyAttached => "Event Stream Already Attached",
            Error::Server(_) => "Server Error",
            Error::Io(_) => "I/O Error",
            Error::Json(_) => "JSON Error",
        }
    }
}

/// Structured error response for JSON output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructuredError {
    /// Stable error code.
    pub code: u32,

    /// Error category for grouping.
    pub category: ErrorCategory,

    /// Human-readable error message.
    pub message: String,

    /// Whether the error is potentially recoverable.
    pub recoverable: bool,

    /// Additional structured context (e.g., parameter name, file path).
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub context: HashMap<String, serde_json::Value>,
}

impl From<&Error> for StructuredError {
    fn from(err: &Error) -> Self {
        let mut context = HashMap::new();

        match err {
            Error::MissingParameter { name } => {
                context.insert("parameter".to_string(), serde_json::json!(name));
            }
            Error::UnknownDimension(unknown) => {
                context.insert("parameter".to_string(), serde_json::json!("dimension"));
                context.insert("value".to_string(), serde_json::json!(unknown.name));
            }
            Error::InvalidDuration { value, .. } | Error::NegativeDuration { value } => {
                context.insert("parameter".to_string(), serde_json::json!("duration"));
                context.insert("value".to_string(), serde_json::json!(value));
            }
            Error::ConfigNotFound { path } => {
                context.insert("path".to_string(), serde_json::json!(path));
            }
            _ => {}
        }

        StructuredError {
            code: err.code(),
            category: err.category(),
            message: err.to_string(),
            recoverable: err.is_recoverable(),
            context,
        }
    }
}

impl StructuredError {
    /// Add additional context to the error.
    pub fn with_context(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(v) = serde_json::to_value(value) {
            self.context.insert(key.into(), v);
        }
        self
    }

    /// Serialize to JSON string.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            format!(r#"{{"code":{},"error":"serialization_failed"}}"#, self.code)
        })
    }

    /// Serialize to pretty JSON string.
    pub fn to_json_pretty(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|_| self.to_json())
    }
}

/// Format an error for human-readable stderr output.
///
/// Output format:
/// ```text
/// ✗ [Headline]
///   Reason: [Error message]
///   Fix: [Remediation hint]
/// ```
pub fn format_error_human(err: &Error, use_color: bool) -> String {
    let (red, cyan, reset) = if use_color {
        ("\x1b[31m", "\x1b[36m", "\x1b[0m")
    } else {
        ("", "", "")
    };

    format!(
        "{red}✗{reset} {headline}\n  Reason: {message}\n  {cyan}Fix:{reset} {remediation}",
        red = red,
        cyan = cyan,
        reset = reset,
        headline = err.headline(),
        message = err,
        remediation = err.remediation()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Dimension;

    fn unknown_dimension() -> Error {
        "shares".parse::<Dimension>().unwrap_err().into()
    }

    #[test]
    fn test_error_code() {
        assert_eq!(Error::Config("test".into()).code(), 10);
        assert_eq!(Error::MissingParameter { name: "duration" }.code(), 20);
        assert_eq!(unknown_dimension().code(), 21);
        assert_eq!(Error::StreamTerminated("eof".into()).code(), 31);
    }

    #[test]
    fn test_error_category() {
        assert_eq!(Error::Config("test".into()).category(), ErrorCategory::Config);
        assert_eq!(unknown_dimension().category(), ErrorCategory::Request);
        assert_eq!(
            Error::StreamUnavailable("refused".into()).category(),
            ErrorCategory::Stream
        );
        assert!(Error::NegativeDuration { value: "-1s".into() }.is_request_error());
        assert!(!Error::AlreadyAttached.is_request_error());
    }

    #[test]
    fn test_error_recoverable() {
        assert!(unknown_dimension().is_recoverable());
        assert!(!Error::StreamTerminated("reset".into()).is_recoverable());
        assert!(Error::StreamUnavailable("refused".into()).is_recoverable());
    }

    #[test]
    fn test_unknown_dimension_message_is_transparent() {
        let err = unknown_dimension();
        assert!(err.to_string().starts_with("unknown dimension \"shares\""));
    }

    #[test]
    fn test_structured_error_from_error() {
        let err = Error::InvalidDuration {
            value: "10 parsecs".into(),
            reason: "unknown unit".into(),
        };
        let structured = StructuredError::from(&err);

        assert_eq!(structured.code, 22);
        assert_eq!(structured.category, ErrorCategory::Request);
        assert!(structured.recoverable);
        assert_eq!(
            structured.context.get("parameter"),
            Some(&serde_json::json!("duration"))
        );
        assert_eq!(
            structured.context.get("value"),
            Some(&serde_json::json!("10 parsecs"))
        );
    }

    #[test]
    fn test_structured_error_json() {
        let err = Error::MissingParameter { name: "dimension" };
        let json = StructuredError::from(&err).to_json();

        assert!(json.contains(r#""code":20"#));
        assert!(json.contains(r#""category":"request""#));
        assert!(json.contains(r#""recoverable":true"#));
        assert!(json.contains(r#""message":"missing dimension query parameter""#));
    }

    #[test]
    fn test_structured_error_with_context() {
        let structured =
            StructuredError::from(&Error::Server("bind".into())).with_context("addr", "[::]:80");
        assert_eq!(
            structured.context.get("addr"),
            Some(&serde_json::json!("[::]:80"))
        );
    }

    #[test]
    fn test_format_error_human() {
        let err = unknown_dimension();
        let formatted = format_error_human(&err, false);

        assert!(formatted.contains("Unknown Dimension"));
        assert!(formatted.contains("likes, comments, favorites, retweets"));
        assert!(formatted.contains("case-sensitive"));
    }

    #[test]
    fn test_error_category_display() {
        assert_eq!(ErrorCategory::Request.to_string(), "request");
        assert_eq!(ErrorCategory::Stream.to_string(), "stream");
    }
}

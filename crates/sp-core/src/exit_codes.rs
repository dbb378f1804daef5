//! Exit codes for the sp-core CLI.
//!
//! Exit code ranges:
//! - 0-1: Run outcomes
//! - 10-19: User/environment errors (recoverable by user action)
//! - 20-29: Internal errors (bugs, should be reported)

use sp_common::{Error, ErrorCategory};

/// Exit codes for sp-core operations.
///
/// These codes are a stable contract for scripts wrapping the binary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    /// Clean run
    Clean = 0,

    /// The event stream ended with a read error
    StreamFailed = 1,

    /// Invalid arguments or request parameters
    ArgsError = 10,

    /// Configuration missing or invalid
    ConfigError = 11,

    /// Event feed unreachable, or listen address unavailable
    NetworkError = 12,

    /// Internal error (bug - please report)
    InternalError = 20,

    /// I/O error
    IoError = 21,
}

impl ExitCode {
    /// Convert to i32 for process exit.
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    pub fn is_success(self) -> bool {
        self == ExitCode::Clean
    }

    /// User/environment error (codes 10-19).
    pub fn is_user_error(self) -> bool {
        (10..20).contains(&self.as_i32())
    }

    /// Internal error (codes 20-29).
    pub fn is_internal_error(self) -> bool {
        self.as_i32() >= 20
    }

    /// Stable name for JSON output.
    pub fn code_name(&self) -> &'static str {
        match self {
            ExitCode::Clean => "OK_CLEAN",
            ExitCode::StreamFailed => "ERR_STREAM",
            ExitCode::ArgsError => "ERR_ARGS",
            ExitCode::ConfigError => "ERR_CONFIG",
            ExitCode::NetworkError => "ERR_NETWORK",
            ExitCode::InternalError => "ERR_INTERNAL",
            ExitCode::IoError => "ERR_IO",
        }
    }

    /// Exit code for a failed command.
    pub fn for_error(err: &Error) -> Self {
        match err.category() {
            ErrorCategory::Config => ExitCode::ConfigError,
            ErrorCategory::Request => ExitCode::ArgsError,
            ErrorCategory::Stream => match err {
                Error::AlreadyAttached => ExitCode::InternalError,
                Error::StreamTerminated(_) => ExitCode::StreamFailed,
                _ => ExitCode::NetworkError,
            },
            ErrorCategory::Server => ExitCode::NetworkError,
            ErrorCategory::Io => match err {
                Error::Json(_) => ExitCode::InternalError,
                _ => ExitCode::IoError,
            },
        }
    }
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code as i32
    }
}

impl std::fmt::Display for ExitCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.code_name(), self.as_i32())
    }
}

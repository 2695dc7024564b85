//! Exit codes for the bk-core CLI.
//!
//! Exit codes communicate the outcome without requiring output parsing and
//! are stable across releases.

/// Exit codes for bk-core commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    /// Command succeeded
    Ok = 0,

    /// Health checks ran and at least one is failing
    Unhealthy = 1,

    /// Configuration could not be resolved
    ConfigError = 10,

    /// Configuration violates its schema
    ValidationError = 11,

    /// I/O error
    IoError = 13,

    /// Internal/unknown error
    InternalError = 99,
}

impl ExitCode {
    /// Convert to i32 for process exit.
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Check if this exit code indicates an error requiring attention.
    pub fn is_error(self) -> bool {
        (self as i32) >= 10
    }
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code as i32
    }
}

impl From<&bk_common::Error> for ExitCode {
    fn from(err: &bk_common::Error) -> Self {
        match err {
            bk_common::Error::SchemaValidation(_) => ExitCode::ValidationError,
            bk_common::Error::Io(_) => ExitCode::IoError,
            e if e.is_config() => ExitCode::ConfigError,
            _ => ExitCode::InternalError,
        }
    }
}

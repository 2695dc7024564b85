//! Error types for the backup core.

use thiserror::Error;

/// Result type alias for backup core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type surfaced at the process boundary.
///
/// Library crates keep their own error enums and convert into this one so the
/// binary can map every failure onto a stable code.
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors (10-19)
    #[error("configuration error: {0}")]
    Config(String),

    #[error("configuration file not found: {path}")]
    ConfigNotFound { path: String },

    #[error("schema validation failed: {0}")]
    SchemaValidation(String),

    #[error("invalid configuration value at {path}: {reason}")]
    InvalidValue { path: String, reason: String },

    // Telemetry errors (20-29)
    #[error("metrics error: {0}")]
    Metrics(String),

    #[error("exporter failed to bind {addr}: {reason}")]
    ExporterBind { addr: String, reason: String },

    #[error("health check '{name}' failed: {reason}")]
    HealthCheck { name: String, reason: String },

    // I/O errors (60-69)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Returns the error code for this error type.
    /// Used for detailed error reporting in JSON output.
    pub fn code(&self) -> u32 {
        match self {
            Error::Config(_) => 10,
            Error::ConfigNotFound { .. } => 11,
            Error::SchemaValidation(_) => 12,
            Error::InvalidValue { .. } => 13,
            Error::Metrics(_) => 20,
            Error::ExporterBind { .. } => 21,
            Error::HealthCheck { .. } => 22,
            Error::Io(_) => 60,
            Error::Json(_) => 61,
        }
    }

    /// Whether this error belongs to the configuration family.
    pub fn is_config(&self) -> bool {
        (10..20).contains(&self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_grouped_by_family() {
        assert!(Error::Config("x".into()).is_config());
        assert!(Error::SchemaValidation("x".into()).is_config());
        assert!(!Error::Metrics("x".into()).is_config());
        assert_eq!(
            Error::Io(std::io::Error::new(std::io::ErrorKind::Other, "x")).code(),
            60
        );
    }

    #[test]
    fn display_includes_context() {
        let err = Error::ConfigNotFound {
            path: "config/environments/prod.yml".into(),
        };
        assert!(err.to_string().contains("config/environments/prod.yml"));
    }
}

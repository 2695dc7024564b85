//! Configuration error types.

use crate::schema::Violation;
use std::path::PathBuf;
use thiserror::Error;

/// Errors from resolving or projecting a configuration document.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// No document exists for the requested environment.
    #[error("configuration file not found: {}", .path.display())]
    NotFound { path: PathBuf },

    #[error("failed to read '{}': {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse '{}': {reason}", .path.display())]
    Parse { path: PathBuf, reason: String },

    /// The schema file exists but is not a usable JSON Schema.
    #[error("invalid schema '{}': {reason}", .path.display())]
    Schema { path: PathBuf, reason: String },

    /// The document violates the schema.
    #[error("config validation failed:\n{}", format_violations(.0))]
    Validation(Vec<Violation>),

    /// A string starts with `${` but is not a complete `${NAME}` marker.
    #[error("malformed interpolation marker at {path}: {value:?}")]
    MalformedMarker { path: String, value: String },

    /// A projected field holds a value of the wrong shape.
    #[error("invalid value at {path}: expected {expected}")]
    InvalidField { path: String, expected: &'static str },
}

impl ConfigError {
    /// Violated constraints, when this is a validation failure.
    pub fn violations(&self) -> &[Violation] {
        match self {
            ConfigError::Validation(v) => v,
            _ => &[],
        }
    }
}

fn format_violations(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(|v| format!("  - {}", v))
        .collect::<Vec<_>>()
        .join("\n")
}

impl From<ConfigError> for bk_common::Error {
    fn from(err: ConfigError) -> Self {
        let message = err.to_string();
        match err {
            ConfigError::NotFound { path } => bk_common::Error::ConfigNotFound {
                path: path.display().to_string(),
            },
            ConfigError::Io { source, .. } => bk_common::Error::Io(source),
            ConfigError::Validation(_) => bk_common::Error::SchemaValidation(message),
            ConfigError::InvalidField { path, expected } => bk_common::Error::InvalidValue {
                path,
                reason: format!("expected {}", expected),
            },
            ConfigError::MalformedMarker { path, .. } => bk_common::Error::InvalidValue {
                path,
                reason: "malformed interpolation marker".to_string(),
            },
            ConfigError::Parse { .. } | ConfigError::Schema { .. } => {
                bk_common::Error::Config(message)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_error_lists_every_violation() {
        let err = ConfigError::Validation(vec![
            Violation::new("", "\"version\" is a required property"),
            Violation::new("/backup", "\"x\" is not of type \"object\""),
        ]);
        let msg = err.to_string();
        assert!(msg.contains("version"));
        assert!(msg.contains("/backup"));
        assert_eq!(err.violations().len(), 2);
    }

    #[test]
    fn converts_to_common_error_codes() {
        let not_found: bk_common::Error = ConfigError::NotFound {
            path: PathBuf::from("config/environments/prod.yml"),
        }
        .into();
        assert_eq!(not_found.code(), 11);

        let invalid: bk_common::Error =
            ConfigError::Validation(vec![Violation::new("", "bad")]).into();
        assert_eq!(invalid.code(), 12);
    }
}

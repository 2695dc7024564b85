//! Telemetry error types.

use thiserror::Error;

/// Errors raised while setting up observability.
///
/// Recording a metric or an event never fails. Only construction, exporter
/// startup, and check registration can.
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("metrics registry error: {0}")]
    Metrics(#[from] prometheus::Error),

    #[error("failed to bind {addr}: {reason}")]
    ExporterBind { addr: String, reason: String },

    #[error("health check '{0}' is already registered")]
    DuplicateCheck(String),

    #[error("failed to spawn worker for health check '{name}': {source}")]
    Spawn {
        name: String,
        #[source]
        source: std::io::Error,
    },
}

impl From<TelemetryError> for bk_common::Error {
    fn from(err: TelemetryError) -> Self {
        match err {
            TelemetryError::Metrics(e) => bk_common::Error::Metrics(e.to_string()),
            TelemetryError::ExporterBind { addr, reason } => {
                bk_common::Error::ExporterBind { addr, reason }
            }
            TelemetryError::DuplicateCheck(name) => bk_common::Error::HealthCheck {
                name,
                reason: "already registered".to_string(),
            },
            TelemetryError::Spawn { name, source } => bk_common::Error::HealthCheck {
                name,
                reason: source.to_string(),
            },
        }
    }
}

//! Backup core observability.
//!
//! This crate provides:
//! - Structured logging setup (`tracing` JSON or pretty output)
//! - The backup Prometheus metric set
//! - Per-thread correlation contexts and scoped operation tracking
//! - A periodic health check scheduler with default resource checks
//! - Audit events
//! - `/metrics` and `/health` pull endpoints (feature `exporter`)
//! - The [`Monitoring`] orchestrator tying these together

pub mod audit;
pub mod context;
pub mod error;
#[cfg(feature = "exporter")]
pub mod exporter;
pub mod health;
pub mod logging;
pub mod metrics;
pub mod monitoring;
pub mod operation;
pub mod system;

#[cfg(test)]
mod testing;

pub use audit::AuditLogger;
pub use context::{current_context, CorrelationContext};
pub use error::TelemetryError;
pub use health::{CheckResult, HealthChecker, HealthReport, HealthStatus};
pub use logging::{init_logging, parse_level, LogFormat};
pub use metrics::{FileStatus, Metrics, ResourceType, Severity};
pub use monitoring::{Monitoring, MonitoringSettings};
pub use operation::{OperationBuilder, OperationScope, OperationTracker};

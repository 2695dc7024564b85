//! Prometheus metrics for backup operations.
//!
//! Every metric lives in a per-instance [`Registry`], so tests and embedders
//! can hold isolated instances. [`global`] hands out one shared instance for
//! the process.

use crate::error::TelemetryError;
use prometheus::{
    Encoder, GaugeVec, Histogram, HistogramOpts, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use std::fmt;
use std::sync::{Arc, OnceLock};

/// Outcome label for `backup_files_processed_total`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileStatus {
    Success,
    Failed,
    Skipped,
}

impl FileStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            FileStatus::Success => "success",
            FileStatus::Failed => "failed",
            FileStatus::Skipped => "skipped",
        }
    }
}

/// Severity label for `backup_errors_total`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Severity {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Label for `system_resource_usage_percent`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceType {
    Cpu,
    Memory,
    Disk,
}

impl ResourceType {
    pub fn as_str(self) -> &'static str {
        match self {
            ResourceType::Cpu => "cpu",
            ResourceType::Memory => "memory",
            ResourceType::Disk => "disk",
        }
    }
}

/// The backup metric set.
pub struct Metrics {
    registry: Registry,
    files_processed: IntCounterVec,
    operation_duration: Histogram,
    errors: IntCounterVec,
    resource_usage: GaugeVec,
    active_operations: IntGauge,
}

impl Metrics {
    /// Build and register every metric in a fresh registry.
    pub fn new() -> Result<Self, TelemetryError> {
        let registry = Registry::new();

        let files_processed = IntCounterVec::new(
            Opts::new("backup_files_processed_total", "Total files processed"),
            &["status", "file_type"],
        )?;
        let operation_duration = Histogram::with_opts(HistogramOpts::new(
            "backup_operation_duration_seconds",
            "Backup operation duration",
        ))?;
        let errors = IntCounterVec::new(
            Opts::new("backup_errors_total", "Total backup errors"),
            &["error_type", "severity"],
        )?;
        let resource_usage = GaugeVec::new(
            Opts::new("system_resource_usage_percent", "System resource usage"),
            &["resource_type"],
        )?;
        let active_operations = IntGauge::new(
            "backup_active_operations",
            "Currently active backup operations",
        )?;

        registry.register(Box::new(files_processed.clone()))?;
        registry.register(Box::new(operation_duration.clone()))?;
        registry.register(Box::new(errors.clone()))?;
        registry.register(Box::new(resource_usage.clone()))?;
        registry.register(Box::new(active_operations.clone()))?;

        Ok(Self {
            registry,
            files_processed,
            operation_duration,
            errors,
            resource_usage,
            active_operations,
        })
    }

    pub fn record_file_processed(&self, status: FileStatus, file_type: &str) {
        self.files_processed
            .with_label_values(&[status.as_str(), file_type])
            .inc();
    }

    pub fn record_operation_duration(&self, seconds: f64) {
        self.operation_duration.observe(seconds);
    }

    pub fn record_error(&self, error_type: &str, severity: Severity) {
        self.errors
            .with_label_values(&[error_type, severity.as_str()])
            .inc();
    }

    pub fn update_resource_usage(&self, resource: ResourceType, percent: f64) {
        self.resource_usage
            .with_label_values(&[resource.as_str()])
            .set(percent);
    }

    pub fn set_active_operations(&self, count: i64) {
        self.active_operations.set(count);
    }

    pub(crate) fn operation_started(&self) {
        self.active_operations.inc();
    }

    pub(crate) fn operation_finished(&self) {
        self.active_operations.dec();
    }

    pub fn files_processed(&self, status: FileStatus, file_type: &str) -> u64 {
        self.files_processed
            .with_label_values(&[status.as_str(), file_type])
            .get()
    }

    pub fn errors(&self, error_type: &str, severity: Severity) -> u64 {
        self.errors
            .with_label_values(&[error_type, severity.as_str()])
            .get()
    }

    /// Number of durations observed so far.
    pub fn operations_observed(&self) -> u64 {
        self.operation_duration.get_sample_count()
    }

    pub fn active_operations(&self) -> i64 {
        self.active_operations.get()
    }

    pub fn resource_usage(&self, resource: ResourceType) -> f64 {
        self.resource_usage
            .with_label_values(&[resource.as_str()])
            .get()
    }

    /// Prometheus text exposition of every registered metric.
    pub fn encode(&self) -> Result<String, TelemetryError> {
        let mut buf = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buf)?;
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }

    /// Content type matching [`encode`](Self::encode).
    pub fn content_type(&self) -> String {
        TextEncoder::new().format_type().to_string()
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

static GLOBAL: OnceLock<Arc<Metrics>> = OnceLock::new();

/// The process-wide metric set, built on first use.
pub fn global() -> Arc<Metrics> {
    GLOBAL
        .get_or_init(|| {
            // Names, help strings, and label sets are constants and the
            // registry is fresh, so registration cannot fail.
            Arc::new(Metrics::new().expect("static metric definitions register cleanly"))
        })
        .clone()
}

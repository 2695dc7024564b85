//! Typed projections of the resolved document.
//!
//! Each projection extracts one config family with a fixed default per field.
//! A field falls back to its default when its path, or any node on the way to
//! it, is missing (or `null`). Projections never mutate the document and can
//! be recomputed any number of times.

use crate::document::ResolvedDocument;
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;
use tracing::warn;

/// Exclude patterns used when `backup.source.filters.exclude_patterns` is absent.
pub const DEFAULT_EXCLUDE_PATTERNS: &[&str] =
    &["*.tmp", "*.log", "__pycache__", "node_modules", ".git"];

/// Source path used when `backup.source.path` is absent.
pub const DEFAULT_SOURCE_PATH: &str = "/data/backup-source";

/// One backup destination (`{type, config}`); the adapter interprets `config`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DestinationConfig {
    #[serde(rename = "type")]
    pub kind: String,

    #[serde(default)]
    pub config: Map<String, Value>,
}

/// Backup pipeline settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupConfig {
    pub source_path: String,
    pub destinations: Vec<DestinationConfig>,
    /// Entries of `backup.destinations` without a string `type`, kept as written.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unrecognized_destinations: Vec<Value>,
    pub max_memory_gb: f64,
    pub max_cpu_percent: u32,
    pub concurrent_uploads: u32,
    pub batch_size: u32,
    pub chunk_size_mb: u64,
    pub exclude_patterns: Vec<String>,
    pub max_file_size_mb: u64,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            source_path: DEFAULT_SOURCE_PATH.to_string(),
            destinations: Vec::new(),
            unrecognized_destinations: Vec::new(),
            max_memory_gb: 4.0,
            max_cpu_percent: 75,
            concurrent_uploads: 5,
            batch_size: 500,
            chunk_size_mb: 64,
            exclude_patterns: DEFAULT_EXCLUDE_PATTERNS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            max_file_size_mb: 1024,
        }
    }
}

impl BackupConfig {
    pub fn from_document(doc: &ResolvedDocument) -> Result<Self, ConfigError> {
        let d = Self::default();
        let (destinations, unrecognized_destinations) = destinations(doc)?;
        Ok(Self {
            source_path: doc.string_or("backup.source.path", &d.source_path)?,
            destinations,
            unrecognized_destinations,
            max_memory_gb: doc.f64_or("backup.resources.max_memory_gb", d.max_memory_gb)?,
            max_cpu_percent: doc.u32_or("backup.resources.max_cpu_percent", d.max_cpu_percent)?,
            concurrent_uploads: doc
                .u32_or("backup.resources.concurrent_uploads", d.concurrent_uploads)?,
            batch_size: doc.u32_or("backup.resources.batch_size", d.batch_size)?,
            chunk_size_mb: doc.u64_or("backup.resources.chunk_size_mb", d.chunk_size_mb)?,
            exclude_patterns: doc.string_list_or(
                "backup.source.filters.exclude_patterns",
                DEFAULT_EXCLUDE_PATTERNS,
            )?,
            max_file_size_mb: doc
                .u64_or("backup.source.filters.max_file_size_mb", d.max_file_size_mb)?,
        })
    }

    /// Memory cap in bytes.
    pub fn max_memory_bytes(&self) -> u64 {
        (self.max_memory_gb * 1024.0 * 1024.0 * 1024.0) as u64
    }

    /// Chunk size in bytes.
    pub fn chunk_size_bytes(&self) -> u64 {
        self.chunk_size_mb.saturating_mul(1024 * 1024)
    }
}

/// Split `backup.destinations` into typed entries and entries kept raw.
fn destinations(
    doc: &ResolvedDocument,
) -> Result<(Vec<DestinationConfig>, Vec<Value>), ConfigError> {
    const PATH: &str = "backup.destinations";
    let items = match doc.get(PATH) {
        None => return Ok((Vec::new(), Vec::new())),
        Some(Value::Array(items)) => items,
        Some(_) => {
            return Err(ConfigError::InvalidField {
                path: PATH.to_string(),
                expected: "a list of destinations",
            })
        }
    };

    let mut typed = Vec::new();
    let mut unrecognized = Vec::new();
    for (index, item) in items.iter().enumerate() {
        match serde_json::from_value::<DestinationConfig>(item.clone()) {
            Ok(destination) => typed.push(destination),
            Err(e) => {
                warn!(index, reason = %e, "keeping unrecognized backup destination as-is");
                unrecognized.push(item.clone());
            }
        }
    }
    Ok((typed, unrecognized))
}

/// Observability settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitoringConfig {
    pub enabled: bool,
    pub health_port: u16,
    pub metrics_port: u16,
    pub log_level: String,
    pub log_format: String,
    pub retention_days: u32,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            health_port: 8080,
            metrics_port: 9090,
            log_level: "INFO".to_string(),
            log_format: "json".to_string(),
            retention_days: 30,
        }
    }
}

impl MonitoringConfig {
    pub fn from_document(doc: &ResolvedDocument) -> Result<Self, ConfigError> {
        let d = Self::default();
        Ok(Self {
            enabled: doc.bool_or("monitoring.enabled", d.enabled)?,
            health_port: doc.port_or("monitoring.endpoints.health_port", d.health_port)?,
            metrics_port: doc.port_or("monitoring.endpoints.metrics_port", d.metrics_port)?,
            log_level: doc.string_or("monitoring.logging.level", &d.log_level)?,
            log_format: doc.string_or("monitoring.logging.format", &d.log_format)?,
            retention_days: doc.u32_or("monitoring.logging.retention_days", d.retention_days)?,
        })
    }
}

/// Security settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityConfig {
    pub encryption_enabled: bool,
    pub encryption_algorithm: String,
    pub authentication_type: String,
    pub token_expiry_hours: u32,
    pub audit_enabled: bool,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            encryption_enabled: true,
            encryption_algorithm: "AES-256-GCM".to_string(),
            authentication_type: "oauth2".to_string(),
            token_expiry_hours: 24,
            audit_enabled: true,
        }
    }
}

impl SecurityConfig {
    pub fn from_document(doc: &ResolvedDocument) -> Result<Self, ConfigError> {
        let d = Self::default();
        Ok(Self {
            encryption_enabled: doc.bool_or("security.encryption.enabled", d.encryption_enabled)?,
            encryption_algorithm: doc
                .string_or("security.encryption.algorithm", &d.encryption_algorithm)?,
            authentication_type: doc
                .string_or("security.authentication.type", &d.authentication_type)?,
            token_expiry_hours: doc.u32_or(
                "security.authentication.token_expiry_hours",
                d.token_expiry_hours,
            )?,
            audit_enabled: doc.bool_or("security.audit.enabled", d.audit_enabled)?,
        })
    }

    pub fn token_expiry(&self) -> Duration {
        Duration::from_secs(u64::from(self.token_expiry_hours) * 60 * 60)
    }
}

/// Resilience settings (circuit breaker and retry policy).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceConfig {
    pub circuit_breaker_threshold: u32,
    /// Seconds.
    pub circuit_breaker_timeout: u64,
    pub retry_max_attempts: u32,
    pub retry_backoff_multiplier: f64,
    pub retry_initial_delay_ms: u64,
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            circuit_breaker_threshold: 5,
            circuit_breaker_timeout: 30,
            retry_max_attempts: 3,
            retry_backoff_multiplier: 2.0,
            retry_initial_delay_ms: 1000,
        }
    }
}

impl PerformanceConfig {
    pub fn from_document(doc: &ResolvedDocument) -> Result<Self, ConfigError> {
        let d = Self::default();
        Ok(Self {
            circuit_breaker_threshold: doc.u32_or(
                "performance.circuit_breaker.failure_threshold",
                d.circuit_breaker_threshold,
            )?,
            circuit_breaker_timeout: doc.u64_or(
                "performance.circuit_breaker.timeout_seconds",
                d.circuit_breaker_timeout,
            )?,
            retry_max_attempts: doc
                .u32_or("performance.retry_policy.max_attempts", d.retry_max_attempts)?,
            retry_backoff_multiplier: backoff_multiplier(doc, d.retry_backoff_multiplier)?,
            retry_initial_delay_ms: doc.u64_or(
                "performance.retry_policy.initial_delay_ms",
                d.retry_initial_delay_ms,
            )?,
        })
    }

    pub fn circuit_breaker_timeout(&self) -> Duration {
        Duration::from_secs(self.circuit_breaker_timeout)
    }

    /// Delay before retry `attempt` (0-based): `initial * multiplier^attempt`.
    ///
    /// Saturates at `Duration::MAX`; a multiplier that is negative or not a
    /// number yields the initial delay.
    pub fn retry_delay(&self, attempt: u32) -> Duration {
        let initial = Duration::from_millis(self.retry_initial_delay_ms);
        let multiplier = self.retry_backoff_multiplier;
        if multiplier.is_nan() || multiplier < 0.0 {
            return initial;
        }
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let secs = initial.as_secs_f64() * multiplier.powi(exponent);
        Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
    }
}

fn backoff_multiplier(doc: &ResolvedDocument, default: f64) -> Result<f64, ConfigError> {
    const PATH: &str = "performance.retry_policy.backoff_multiplier";
    let multiplier = doc.f64_or(PATH, default)?;
    if multiplier < 0.0 {
        return Err(ConfigError::InvalidField {
            path: PATH.to_string(),
            expected: "a non-negative number",
        });
    }
    Ok(multiplier)
}

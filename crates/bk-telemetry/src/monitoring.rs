//! The monitoring orchestrator.
//!
//! [`Monitoring`] owns the metric set, the operation tracker, the health
//! checker, and the audit logger for one service, and wires them up from the
//! resolved `monitoring` config.

use crate::audit::AuditLogger;
use crate::context::{self, CorrelationContext};
use crate::error::TelemetryError;
use crate::health::{HealthChecker, HealthReport, DEFAULT_CHECK_INTERVAL};
use crate::logging::{self, LogFormat};
use crate::metrics::{self, Metrics};
use crate::operation::{OperationBuilder, OperationTracker};
use crate::system::{self, ResourceSampler};
use bk_config::MonitoringConfig;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::info;

/// Service name used when none is configured.
pub const DEFAULT_SERVICE_NAME: &str = "backup-service";

/// Health check names registered by [`Monitoring::initialize`].
pub const SYSTEM_RESOURCES_CHECK: &str = "system_resources";
pub const DISK_SPACE_CHECK: &str = "disk_space";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitoringSettings {
    pub service_name: String,
    pub log_level: String,
    pub log_format: LogFormat,
    pub metrics_port: u16,
    pub health_port: u16,
    /// Serve `/metrics` and `/health` when true.
    pub enabled: bool,
    pub bind_host: String,
    pub check_interval: Duration,
    /// Filesystem watched by the disk check.
    pub disk_path: PathBuf,
}

impl Default for MonitoringSettings {
    fn default() -> Self {
        Self::from_config(&MonitoringConfig::default())
    }
}

impl MonitoringSettings {
    pub fn from_config(config: &MonitoringConfig) -> Self {
        Self {
            service_name: DEFAULT_SERVICE_NAME.to_string(),
            log_level: config.log_level.clone(),
            log_format: config.log_format.parse().unwrap_or_default(),
            metrics_port: config.metrics_port,
            health_port: config.health_port,
            enabled: config.enabled,
            bind_host: "0.0.0.0".to_string(),
            check_interval: DEFAULT_CHECK_INTERVAL,
            disk_path: PathBuf::from("/"),
        }
    }

    pub fn with_service_name(mut self, name: impl Into<String>) -> Self {
        self.service_name = name.into();
        self
    }
}

pub struct Monitoring {
    settings: MonitoringSettings,
    metrics: Arc<Metrics>,
    tracker: OperationTracker,
    health: HealthChecker,
    audit: AuditLogger,
    initialized: Mutex<bool>,
    #[cfg(feature = "exporter")]
    servers: Mutex<Vec<crate::exporter::EndpointServer>>,
}

impl Monitoring {
    /// Orchestrator backed by the process-wide metric set.
    pub fn new(settings: MonitoringSettings) -> Self {
        Self::with_metrics(settings, metrics::global())
    }

    /// Orchestrator backed by its own metric set.
    pub fn with_metrics(settings: MonitoringSettings, metrics: Arc<Metrics>) -> Self {
        let tracker = OperationTracker::new(settings.service_name.clone(), metrics.clone());
        let audit = AuditLogger::new(settings.service_name.clone());
        Self {
            settings,
            metrics,
            tracker,
            health: HealthChecker::new(),
            audit,
            initialized: Mutex::new(false),
            #[cfg(feature = "exporter")]
            servers: Mutex::new(Vec::new()),
        }
    }

    /// Install logging, register the default health checks, and start the
    /// exporters. Calls after the first success are no-ops; a failed call can
    /// be retried and skips the checks it already registered.
    pub fn initialize(&self) -> Result<(), TelemetryError> {
        let mut initialized = self.initialized.lock().unwrap_or_else(PoisonError::into_inner);
        if *initialized {
            return Ok(());
        }

        logging::init_logging(
            logging::parse_level(&self.settings.log_level),
            self.settings.log_format,
        );

        let interval = self.settings.check_interval;
        if self.health.check_state(SYSTEM_RESOURCES_CHECK).is_none() {
            let sampler = Arc::new(ResourceSampler::new());
            self.health.register_check(
                SYSTEM_RESOURCES_CHECK,
                interval,
                system::system_resources_check(self.metrics.clone(), sampler),
            )?;
        }
        if self.health.check_state(DISK_SPACE_CHECK).is_none() {
            self.health.register_check(
                DISK_SPACE_CHECK,
                interval,
                system::disk_space_check(self.metrics.clone(), self.settings.disk_path.clone()),
            )?;
        }

        #[cfg(feature = "exporter")]
        if self.settings.enabled {
            self.start_exporters()?;
        }

        info!(
            service = %self.settings.service_name,
            metrics_port = self.settings.metrics_port,
            health_port = self.settings.health_port,
            "Monitoring initialized"
        );
        *initialized = true;
        Ok(())
    }

    /// Serve `/metrics` and `/health` on the configured ports.
    #[cfg(feature = "exporter")]
    pub fn start_exporters(&self) -> Result<Vec<std::net::SocketAddr>, TelemetryError> {
        use crate::exporter::{EndpointServer, Routes};

        let host = &self.settings.bind_host;
        let metrics_routes = Routes::new().with_metrics(self.metrics.clone());
        let health_routes = Routes::new().with_health(self.health.clone());

        let mut started = Vec::new();
        if self.settings.metrics_port == self.settings.health_port {
            let routes = metrics_routes.with_health(self.health.clone());
            let addr = format!("{}:{}", host, self.settings.metrics_port);
            started.push(EndpointServer::start(&addr, routes)?);
        } else {
            let addr = format!("{}:{}", host, self.settings.metrics_port);
            started.push(EndpointServer::start(&addr, metrics_routes)?);
            let addr = format!("{}:{}", host, self.settings.health_port);
            started.push(EndpointServer::start(&addr, health_routes)?);
        }

        let addrs = started.iter().map(|s| s.local_addr()).collect();
        self.servers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(started);
        Ok(addrs)
    }

    /// Describe an operation to run under a fresh correlation context.
    pub fn operation(&self, name: impl Into<String>) -> OperationBuilder<'_> {
        self.tracker.operation(name)
    }

    /// Context of the operation running on this thread.
    pub fn current_context(&self) -> Option<CorrelationContext> {
        context::current_context()
    }

    pub fn health_status(&self) -> HealthReport {
        self.health.status()
    }

    pub fn health(&self) -> &HealthChecker {
        &self.health
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    pub fn audit(&self) -> &AuditLogger {
        &self.audit
    }

    pub fn settings(&self) -> &MonitoringSettings {
        &self.settings
    }

    /// Stop health check loops and exporters.
    pub fn shutdown(&self) {
        self.health.shutdown();
        #[cfg(feature = "exporter")]
        self.servers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl Drop for Monitoring {
    fn drop(&mut self) {
        self.health.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> MonitoringSettings {
        MonitoringSettings {
            enabled: false,
            ..MonitoringSettings::default()
        }
    }

    #[test]
    fn settings_follow_monitoring_config() {
        let config = MonitoringConfig {
            metrics_port: 9191,
            log_format: "text".to_string(),
            ..MonitoringConfig::default()
        };
        let s = MonitoringSettings::from_config(&config);
        assert_eq!(s.service_name, DEFAULT_SERVICE_NAME);
        assert_eq!(s.metrics_port, 9191);
        assert_eq!(s.health_port, 8080);
        assert_eq!(s.log_format, LogFormat::Pretty);
    }

    #[test]
    fn initialize_registers_default_checks_once() {
        let m = Monitoring::with_metrics(settings(), Arc::new(Metrics::new().unwrap()));
        m.initialize().unwrap();
        m.initialize().unwrap();

        assert!(m.health().wait_for_first_results(Duration::from_secs(5)));
        let report = m.health_status();
        assert_eq!(report.checks.len(), 2);
        assert!(report.checks.contains_key(SYSTEM_RESOURCES_CHECK));
        assert!(report.checks.contains_key(DISK_SPACE_CHECK));
        m.shutdown();
    }

    #[test]
    fn operations_use_the_shared_metric_set() {
        let m = Monitoring::with_metrics(settings(), Arc::new(Metrics::new().unwrap()));
        let seen = m
            .operation("snapshot")
            .run(|ctx| Ok::<_, std::io::Error>(ctx.correlation_id.clone()))
            .unwrap();
        assert!(m.current_context().is_none());
        assert_eq!(m.metrics().operations_observed(), 1);
        assert_eq!(seen.as_str().len(), 36);
    }

    #[cfg(feature = "exporter")]
    #[test]
    fn failed_initialize_can_be_retried() {
        let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = taken.local_addr().unwrap().port();
        let s = MonitoringSettings {
            enabled: true,
            bind_host: "127.0.0.1".to_string(),
            metrics_port: port,
            health_port: port,
            ..MonitoringSettings::default()
        };
        let m = Monitoring::with_metrics(s, Arc::new(Metrics::new().unwrap()));

        let err = m.initialize().unwrap_err();
        assert!(matches!(err, TelemetryError::ExporterBind { .. }));
        assert_eq!(m.health_status().checks.len(), 2);

        drop(taken);
        m.initialize().unwrap();
        assert_eq!(m.health_status().checks.len(), 2);
        m.shutdown();
    }

    #[cfg(feature = "exporter")]
    #[test]
    fn exporters_share_one_port_when_configured() {
        let s = MonitoringSettings {
            enabled: true,
            bind_host: "127.0.0.1".to_string(),
            metrics_port: 0,
            health_port: 0,
            ..MonitoringSettings::default()
        };
        let m = Monitoring::with_metrics(s, Arc::new(Metrics::new().unwrap()));
        let addrs = m.start_exporters().unwrap();
        assert_eq!(addrs.len(), 1);
        m.shutdown();
    }
}

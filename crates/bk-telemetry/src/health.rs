//! Periodic health checks.
//!
//! Each registered check runs on its own thread: once immediately, then every
//! `interval`. Results land in a single map guarded by one lock. A check that
//! returns an error or panics is recorded as failing and never affects other
//! checks.
//!
//! The aggregate is healthy only when every registered check has run and
//! passed. A check that has not produced its first result yet reports as
//! failing with a null `last_check`.

use crate::error::TelemetryError;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};

/// Interval used when a check is registered without one.
pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_secs(30);

/// Result of one check run. `Ok(false)` and `Err(_)` both mean failing.
pub type CheckResult = Result<bool, Box<dyn std::error::Error + Send + Sync>>;

/// Last known state of a check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckState {
    /// Registered, first run not finished.
    Unknown,
    Passing,
    Failing,
}

#[derive(Debug, Clone)]
struct Entry {
    state: CheckState,
    last_run: Option<DateTime<Utc>>,
}

struct Shared {
    checks: Mutex<BTreeMap<String, Entry>>,
    shutdown: AtomicBool,
    started: Instant,
}

/// Aggregate status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
}

/// Reported status of one check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    Passing,
    Failing,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckReport {
    pub status: CheckStatus,
    pub last_check: Option<DateTime<Utc>>,
}

/// Health payload served on `/health`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub timestamp: DateTime<Utc>,
    pub uptime_seconds: u64,
    pub checks: BTreeMap<String, CheckReport>,
}

impl HealthReport {
    pub fn is_healthy(&self) -> bool {
        self.status == HealthStatus::Healthy
    }
}

/// Runs registered checks and aggregates their results.
#[derive(Clone)]
pub struct HealthChecker {
    shared: Arc<Shared>,
}

impl Default for HealthChecker {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthChecker {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                checks: Mutex::new(BTreeMap::new()),
                shutdown: AtomicBool::new(false),
                started: Instant::now(),
            }),
        }
    }

    /// Register `check` under `name` and start its loop.
    ///
    /// Names are unique; checks cannot be removed once registered.
    pub fn register_check<F>(
        &self,
        name: impl Into<String>,
        interval: Duration,
        check: F,
    ) -> Result<(), TelemetryError>
    where
        F: Fn() -> CheckResult + Send + 'static,
    {
        let name = name.into();
        {
            let mut checks = self.lock();
            if checks.contains_key(&name) {
                return Err(TelemetryError::DuplicateCheck(name));
            }
            checks.insert(
                name.clone(),
                Entry {
                    state: CheckState::Unknown,
                    last_run: None,
                },
            );
        }

        let shared = self.shared.clone();
        let check_name = name.clone();
        let spawned = thread::Builder::new()
            .name(format!("health-{}", name))
            .spawn(move || run_loop(&shared, &check_name, interval, check));

        if let Err(source) = spawned {
            self.lock().remove(&name);
            return Err(TelemetryError::Spawn { name, source });
        }
        debug!(check = %name, interval_secs = interval.as_secs_f64(), "health check registered");
        Ok(())
    }

    /// Current state of one check, or `None` if it is not registered.
    pub fn check_state(&self, name: &str) -> Option<CheckState> {
        self.lock().get(name).map(|e| e.state)
    }

    /// Snapshot of every check plus the aggregate.
    pub fn status(&self) -> HealthReport {
        let checks: BTreeMap<String, CheckReport> = self
            .lock()
            .iter()
            .map(|(name, entry)| {
                let status = match entry.state {
                    CheckState::Passing => CheckStatus::Passing,
                    CheckState::Failing | CheckState::Unknown => CheckStatus::Failing,
                };
                (
                    name.clone(),
                    CheckReport {
                        status,
                        last_check: entry.last_run,
                    },
                )
            })
            .collect();

        let healthy = checks.values().all(|c| c.status == CheckStatus::Passing);
        HealthReport {
            status: if healthy {
                HealthStatus::Healthy
            } else {
                HealthStatus::Unhealthy
            },
            timestamp: Utc::now(),
            uptime_seconds: self.shared.started.elapsed().as_secs(),
            checks,
        }
    }

    /// Block until every registered check has a result, or `timeout` passes.
    ///
    /// Returns whether all checks have run.
    pub fn wait_for_first_results(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            let pending = self
                .lock()
                .values()
                .any(|e| e.state == CheckState::Unknown);
            if !pending {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(Duration::from_millis(10));
        }
    }

    /// Stop every loop at its next wake-up.
    pub fn shutdown(&self) {
        self.shared.shutdown.store(true, Ordering::SeqCst);
    }

    pub fn is_shutdown(&self) -> bool {
        self.shared.shutdown.load(Ordering::SeqCst)
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, Entry>> {
        lock_checks(&self.shared)
    }
}

fn lock_checks(shared: &Shared) -> MutexGuard<'_, BTreeMap<String, Entry>> {
    shared.checks.lock().unwrap_or_else(PoisonError::into_inner)
}

fn run_loop<F>(shared: &Shared, name: &str, interval: Duration, check: F)
where
    F: Fn() -> CheckResult,
{
    while !shared.shutdown.load(Ordering::SeqCst) {
        let state = run_once(name, &check);
        if let Some(entry) = lock_checks(shared).get_mut(name) {
            entry.state = state;
            entry.last_run = Some(Utc::now());
        }
        thread::sleep(interval);
    }
    debug!(check = name, "health check loop stopped");
}

fn run_once<F>(name: &str, check: &F) -> CheckState
where
    F: Fn() -> CheckResult,
{
    match catch_unwind(AssertUnwindSafe(check)) {
        Ok(Ok(true)) => CheckState::Passing,
        Ok(Ok(false)) => {
            warn!(check = name, "health check failing");
            CheckState::Failing
        }
        Ok(Err(err)) => {
            warn!(check = name, error = %err, "health check errored");
            CheckState::Failing
        }
        Err(_) => {
            error!(check = name, "health check panicked");
            CheckState::Failing
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    const WAIT: Duration = Duration::from_secs(5);

    #[test]
    fn no_checks_is_healthy() {
        let hc = HealthChecker::new();
        let report = hc.status();
        assert!(report.is_healthy());
        assert!(report.checks.is_empty());
    }

    #[test]
    fn first_run_is_immediate() {
        let hc = HealthChecker::new();
        hc.register_check("ok", Duration::from_secs(3600), || Ok(true))
            .unwrap();
        assert!(hc.wait_for_first_results(WAIT));
        assert_eq!(hc.check_state("ok"), Some(CheckState::Passing));
        assert!(hc.status().is_healthy());
        hc.shutdown();
    }

    #[test]
    fn unrun_check_is_reported_failing() {
        let hc = HealthChecker::new();
        let gate = Arc::new(Mutex::new(()));
        let held = gate.lock().unwrap();
        let g = gate.clone();
        hc.register_check("slow", Duration::from_secs(3600), move || {
            let _unblocked = g.lock();
            Ok(true)
        })
        .unwrap();

        let report = hc.status();
        assert!(!report.is_healthy());
        assert_eq!(report.checks["slow"].status, CheckStatus::Failing);
        assert!(report.checks["slow"].last_check.is_none());

        drop(held);
        assert!(hc.wait_for_first_results(WAIT));
        assert!(hc.status().is_healthy());
        hc.shutdown();
    }

    #[test]
    fn errors_and_panics_are_isolated() {
        let hc = HealthChecker::new();
        let long = Duration::from_secs(3600);
        hc.register_check("good", long, || Ok(true)).unwrap();
        hc.register_check("false", long, || Ok(false)).unwrap();
        hc.register_check("error", long, || Err("database unreachable".into()))
            .unwrap();
        hc.register_check("panic", long, || panic!("check exploded"))
            .unwrap();
        assert!(hc.wait_for_first_results(WAIT));

        let report = hc.status();
        assert!(!report.is_healthy());
        assert_eq!(report.checks["good"].status, CheckStatus::Passing);
        for name in ["false", "error", "panic"] {
            assert_eq!(report.checks[name].status, CheckStatus::Failing, "{}", name);
            assert!(report.checks[name].last_check.is_some());
        }
        hc.shutdown();
    }

    #[test]
    fn duplicate_names_rejected() {
        let hc = HealthChecker::new();
        hc.register_check("a", DEFAULT_CHECK_INTERVAL, || Ok(true))
            .unwrap();
        let err = hc
            .register_check("a", DEFAULT_CHECK_INTERVAL, || Ok(true))
            .unwrap_err();
        assert!(matches!(err, TelemetryError::DuplicateCheck(_)));
        hc.shutdown();
    }

    #[test]
    fn checks_rerun_on_interval_until_shutdown() {
        let hc = HealthChecker::new();
        let runs = Arc::new(AtomicUsize::new(0));
        let r = runs.clone();
        hc.register_check("tick", Duration::from_millis(10), move || {
            r.fetch_add(1, Ordering::SeqCst);
            Ok(true)
        })
        .unwrap();

        let deadline = Instant::now() + WAIT;
        while runs.load(Ordering::SeqCst) < 3 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert!(runs.load(Ordering::SeqCst) >= 3);

        hc.shutdown();
        thread::sleep(Duration::from_millis(50));
        let stopped_at = runs.load(Ordering::SeqCst);
        thread::sleep(Duration::from_millis(50));
        assert_eq!(runs.load(Ordering::SeqCst), stopped_at);
    }

    #[test]
    fn payload_shape() {
        let hc = HealthChecker::new();
        hc.register_check("disk_space", DEFAULT_CHECK_INTERVAL, || Ok(true))
            .unwrap();
        assert!(hc.wait_for_first_results(WAIT));
        let json = serde_json::to_value(hc.status()).unwrap();
        assert_eq!(json["status"], "healthy");
        assert!(json["timestamp"].is_string());
        assert!(json["uptime_seconds"].is_u64());
        assert_eq!(json["checks"]["disk_space"]["status"], "passing");
        assert!(json["checks"]["disk_space"]["last_check"].is_string());
        hc.shutdown();
    }
}

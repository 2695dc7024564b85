//! Operation tracking.
//!
//! An operation binds a fresh [`CorrelationContext`] for its duration, logs a
//! start event, and on exit records its duration and either a completion or a
//! failure event. Failures also increment `backup_errors_total` with severity
//! `high`. The context is cleared on every exit path, including early drop of
//! the scope (cancellation) and unwinding.
//!
//! ```no_run
//! # use bk_telemetry::{metrics, OperationTracker};
//! let tracker = OperationTracker::new("backup-service", metrics::global());
//! let copied: Result<u64, std::io::Error> = tracker
//!     .operation("incremental_backup")
//!     .metadata("source", "/data")
//!     .run(|ctx| {
//!         tracing::info!(correlation_id = %ctx.correlation_id, "copying");
//!         Ok(42)
//!     });
//! ```

use crate::context::{self, CorrelationContext};
use crate::metrics::{Metrics, Severity};
use serde_json::{Map, Value};
use std::fmt::Display;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::{error, info};

/// `error_type` label for a scope dropped without completing.
pub const CANCELLED_ERROR_TYPE: &str = "Cancelled";

/// `error_type` label for a scope unwound by a panic.
pub const PANIC_ERROR_TYPE: &str = "Panic";

/// Starts operations that share a service name and metric set.
#[derive(Clone)]
pub struct OperationTracker {
    service: Arc<str>,
    metrics: Arc<Metrics>,
}

impl OperationTracker {
    pub fn new(service: impl Into<String>, metrics: Arc<Metrics>) -> Self {
        Self {
            service: Arc::from(service.into()),
            metrics,
        }
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    /// Begin describing an operation; nothing is recorded until it is entered.
    pub fn operation(&self, name: impl Into<String>) -> OperationBuilder<'_> {
        OperationBuilder {
            tracker: self,
            name: name.into(),
            metadata: Map::new(),
            user_id: None,
            session_id: None,
        }
    }
}

/// Operation name, metadata, and optional caller identity.
#[must_use = "an operation is only tracked once entered or run"]
pub struct OperationBuilder<'a> {
    tracker: &'a OperationTracker,
    name: String,
    metadata: Map<String, Value>,
    user_id: Option<String>,
    session_id: Option<String>,
}

impl<'a> OperationBuilder<'a> {
    /// Attach a metadata field to the start event.
    pub fn metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Attach several metadata fields at once.
    pub fn metadata_map(mut self, fields: Map<String, Value>) -> Self {
        self.metadata.extend(fields);
        self
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Bind the context and log the start event.
    pub fn enter(self) -> OperationScope<'a> {
        let mut ctx = CorrelationContext::new(&self.name);
        ctx.user_id = self.user_id;
        ctx.session_id = self.session_id;

        let metadata = Value::Object(self.metadata).to_string();
        info!(
            service = %self.tracker.service,
            correlation_id = %ctx.correlation_id,
            operation_id = %ctx.operation_id,
            user_id = ctx.user_id.as_deref(),
            session_id = ctx.session_id.as_deref(),
            metadata = %metadata,
            "Starting {}",
            self.name
        );

        self.tracker.metrics.operation_started();
        context::bind(ctx.clone());

        OperationScope {
            tracker: self.tracker,
            name: self.name,
            context: ctx,
            finished: false,
            _not_send: PhantomData,
        }
    }

    /// Run `f` inside the operation.
    ///
    /// The closure's error is recorded (its type name becomes the
    /// `error_type` label) and returned unchanged.
    pub fn run<T, E, F>(self, f: F) -> Result<T, E>
    where
        E: Display,
        F: FnOnce(&CorrelationContext) -> Result<T, E>,
    {
        let scope = self.enter();
        match f(scope.context()) {
            Ok(value) => {
                scope.complete();
                Ok(value)
            }
            Err(err) => {
                scope.fail(error_type_name::<E>(), &err);
                Err(err)
            }
        }
    }
}

/// An entered operation. Finish it with [`complete`](Self::complete) or
/// [`fail`](Self::fail); dropping it unfinished records a failure.
///
/// The scope owns the entering thread's context slot, so it is neither
/// `Send` nor `Sync`.
#[must_use = "dropping the scope immediately records the operation as cancelled"]
pub struct OperationScope<'a> {
    tracker: &'a OperationTracker,
    name: String,
    context: CorrelationContext,
    finished: bool,
    _not_send: PhantomData<*const ()>,
}

impl OperationScope<'_> {
    pub fn context(&self) -> &CorrelationContext {
        &self.context
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn complete(mut self) {
        let duration = self.finish();
        info!(
            service = %self.tracker.service,
            correlation_id = %self.context.correlation_id,
            operation_id = %self.context.operation_id,
            duration_seconds = duration,
            "Completed {}",
            self.name
        );
    }

    pub fn fail(mut self, error_type: &str, error: &dyn Display) {
        self.record_failure(error_type, &error.to_string());
    }

    fn record_failure(&mut self, error_type: &str, error: &str) {
        let duration = self.finish();
        self.tracker.metrics.record_error(error_type, Severity::High);
        error!(
            service = %self.tracker.service,
            correlation_id = %self.context.correlation_id,
            operation_id = %self.context.operation_id,
            duration_seconds = duration,
            error_type,
            error,
            "Failed {}",
            self.name
        );
    }

    /// Record the duration and release the context. Returns seconds elapsed.
    fn finish(&mut self) -> f64 {
        self.finished = true;
        let duration = self.context.elapsed().as_secs_f64();
        self.tracker.metrics.record_operation_duration(duration);
        self.tracker.metrics.operation_finished();
        context::clear();
        duration
    }
}

impl Drop for OperationScope<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        if std::thread::panicking() {
            self.record_failure(PANIC_ERROR_TYPE, "operation panicked");
        } else {
            self.record_failure(CANCELLED_ERROR_TYPE, "operation cancelled");
        }
    }
}

/// Unqualified type name with generics stripped (`std::io::Error` → `Error`).
pub fn error_type_name<E>() -> &'static str {
    let full = std::any::type_name::<E>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::current_context;

    #[derive(Debug)]
    struct DiskFull;

    impl Display for DiskFull {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.write_str("no space left on device")
        }
    }

    fn tracker() -> OperationTracker {
        OperationTracker::new("backup-service", Arc::new(Metrics::new().unwrap()))
    }

    #[test]
    fn success_records_duration_only() {
        let t = tracker();
        let out: Result<u32, DiskFull> = t.operation("copy").run(|ctx| {
            assert!(ctx.operation_id.as_str().starts_with("copy_"));
            assert!(current_context().is_some());
            Ok(7)
        });
        assert_eq!(out.unwrap(), 7);
        assert_eq!(t.metrics().operations_observed(), 1);
        assert_eq!(t.metrics().errors("DiskFull", Severity::High), 0);
        assert_eq!(t.metrics().active_operations(), 0);
        assert!(current_context().is_none());
    }

    #[derive(Debug, PartialEq)]
    struct ChunkRejected {
        chunk: u64,
        reason: String,
    }

    impl Display for ChunkRejected {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "chunk {} rejected: {}", self.chunk, self.reason)
        }
    }

    #[test]
    fn failure_increments_error_counter_once_and_propagates() {
        let t = tracker();
        let out: Result<(), ChunkRejected> = t.operation("copy").run(|_| {
            Err(ChunkRejected {
                chunk: 41,
                reason: "checksum mismatch".to_string(),
            })
        });
        assert_eq!(
            out.unwrap_err(),
            ChunkRejected {
                chunk: 41,
                reason: "checksum mismatch".to_string(),
            }
        );
        assert_eq!(t.metrics().errors("ChunkRejected", Severity::High), 1);
        assert_eq!(t.metrics().operations_observed(), 1);
        assert!(current_context().is_none());
    }

    #[test]
    fn dropped_scope_counts_as_cancelled() {
        let t = tracker();
        {
            let scope = t.operation("upload").enter();
            assert_eq!(t.metrics().active_operations(), 1);
            assert_eq!(
                current_context().unwrap().correlation_id,
                scope.context().correlation_id
            );
        }
        assert_eq!(t.metrics().errors(CANCELLED_ERROR_TYPE, Severity::High), 1);
        assert_eq!(t.metrics().active_operations(), 0);
        assert!(current_context().is_none());
    }

    #[test]
    fn panic_is_recorded_and_context_cleared() {
        let t = tracker();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _: Result<(), DiskFull> = t.operation("verify").run(|_| panic!("boom"));
        }));
        assert!(result.is_err());
        assert_eq!(t.metrics().errors(PANIC_ERROR_TYPE, Severity::High), 1);
        assert!(current_context().is_none());
    }

    #[test]
    fn builder_sets_identity() {
        let t = tracker();
        let scope = t
            .operation("restore")
            .metadata("files", 12)
            .with_user("u-1")
            .with_session("s-1")
            .enter();
        assert_eq!(scope.context().user_id.as_deref(), Some("u-1"));
        assert_eq!(scope.context().session_id.as_deref(), Some("s-1"));
        scope.complete();
    }

    #[test]
    fn events_carry_context_fields() {
        let t = tracker();
        let events = crate::testing::capture_events(|| {
            let _: Result<(), DiskFull> = t
                .operation("prune")
                .metadata("keep", 7)
                .run(|_| Err(DiskFull));
        });

        assert_eq!(events.len(), 2);
        let (start, failed) = (&events[0], &events[1]);
        assert_eq!(start["message"], "Starting prune");
        assert_eq!(start["service"], "backup-service");
        assert_eq!(start["metadata"], r#"{"keep":7}"#);
        assert_eq!(failed["message"], "Failed prune");
        assert_eq!(failed["correlation_id"], start["correlation_id"]);
        assert_eq!(failed["error"], "no space left on device");
        assert_eq!(failed["error_type"], "DiskFull");
        assert!(failed["duration_seconds"].is_f64());
    }

    #[test]
    fn scope_is_not_send() {
        // Resolves only while `OperationScope` does not implement `Send`.
        trait AmbiguousIfSend<A> {
            fn check() {}
        }
        impl<T: ?Sized> AmbiguousIfSend<()> for T {}
        impl<T: ?Sized + Send> AmbiguousIfSend<u8> for T {}
        <OperationScope<'static> as AmbiguousIfSend<_>>::check();
    }

    #[test]
    fn type_names_are_unqualified() {
        assert_eq!(error_type_name::<std::io::Error>(), "Error");
        assert_eq!(error_type_name::<DiskFull>(), "DiskFull");
        assert_eq!(error_type_name::<Box<dyn std::error::Error>>(), "Box");
    }
}

//! Per-thread correlation context.
//!
//! Each thread has one slot holding the context of the operation it is
//! currently running. Contexts do not nest: binding a new one replaces the
//! current one, and leaving an operation clears the slot. Other threads never
//! see the slot.

use bk_common::{CorrelationId, OperationId};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::cell::RefCell;
use std::time::{Duration, Instant};

/// Identity and timing of one operation invocation.
#[derive(Debug, Clone, Serialize)]
pub struct CorrelationContext {
    pub correlation_id: CorrelationId,
    pub operation_id: OperationId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    pub started_at: DateTime<Utc>,
    #[serde(skip)]
    start_time: Instant,
}

impl CorrelationContext {
    /// Fresh context for `operation_name` starting now.
    pub fn new(operation_name: &str) -> Self {
        let started_at = Utc::now();
        Self {
            correlation_id: CorrelationId::new(),
            operation_id: OperationId::new(operation_name, started_at),
            user_id: None,
            session_id: None,
            started_at,
            start_time: Instant::now(),
        }
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Monotonic start instant.
    pub fn start_time(&self) -> Instant {
        self.start_time
    }

    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }
}

thread_local! {
    static CURRENT: RefCell<Option<CorrelationContext>> = const { RefCell::new(None) };
}

/// The context bound on this thread, if any.
pub fn current_context() -> Option<CorrelationContext> {
    CURRENT.with(|slot| slot.borrow().clone())
}

pub(crate) fn bind(context: CorrelationContext) {
    CURRENT.with(|slot| *slot.borrow_mut() = Some(context));
}

pub(crate) fn clear() {
    // Ignore access after thread-local teardown.
    let _ = CURRENT.try_with(|slot| slot.borrow_mut().take());
}

//! Compliance audit events.
//!
//! Audit events are ordinary `tracing` events tagged `audit = true` and
//! carrying an `event_type`, so a log pipeline can route them separately.

use crate::metrics::Severity;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Clone)]
pub struct AuditLogger {
    service: Arc<str>,
}

impl AuditLogger {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: Arc::from(service.into()),
        }
    }

    /// An access attempt on `resource` and its result (`granted`, `denied`).
    pub fn log_access(&self, user_id: &str, resource: &str, action: &str, result: &str) {
        info!(
            service = %self.service,
            audit = true,
            event_type = "access",
            user_id,
            resource,
            action,
            result,
            "Access attempt"
        );
    }

    /// A bulk data operation (`delete`, `export`, ...) over `count` records.
    pub fn log_data_operation(&self, operation: &str, data_type: &str, count: u64, user_id: &str) {
        info!(
            service = %self.service,
            audit = true,
            event_type = "data_operation",
            operation,
            data_type,
            record_count = count,
            user_id,
            "Data operation"
        );
    }

    /// A system-level event. `details` is attached as a JSON object.
    pub fn log_system_event(&self, event: &str, severity: Severity, details: &Map<String, Value>) {
        let details = Value::Object(details.clone()).to_string();
        info!(
            service = %self.service,
            audit = true,
            event_type = "system",
            event,
            severity = %severity,
            details = %details,
            "System event"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::capture_events;
    use serde_json::json;

    #[test]
    fn events_are_tagged_for_audit() {
        let audit = AuditLogger::new("backup-service");
        let events = capture_events(|| {
            audit.log_access("alice", "/backups/2024", "read", "granted");
            audit.log_data_operation("delete", "snapshot", 3, "alice");
            let details = json!({"reason": "retention"});
            audit.log_system_event(
                "retention_sweep",
                Severity::Low,
                details.as_object().unwrap(),
            );
        });

        assert_eq!(events.len(), 3);
        assert!(events.iter().all(|e| e["audit"] == true));
        assert!(events.iter().all(|e| e["service"] == "backup-service"));

        assert_eq!(events[0]["event_type"], "access");
        assert_eq!(events[0]["result"], "granted");
        assert_eq!(events[1]["record_count"], 3);
        assert_eq!(events[2]["severity"], "low");
        assert_eq!(events[2]["details"], r#"{"reason":"retention"}"#);
    }
}

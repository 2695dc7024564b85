//! Correlation and operation identity types.
//!
//! Every tracked unit of work carries a random correlation id (unique per
//! invocation) and an operation id derived from its name and start time.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque, globally unique id for one operation invocation.
///
/// Format: hyphenated UUID v4.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(pub String);

impl CorrelationId {
    /// Generate a fresh correlation id.
    pub fn new() -> Self {
        CorrelationId(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Operation id: `<operation_name>_<unix_seconds>`.
///
/// Not unique on its own; two invocations of the same operation within one
/// second share it. Use [`CorrelationId`] to tell them apart.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperationId(pub String);

impl OperationId {
    /// Build an operation id from a name and a wall-clock start time.
    pub fn new(operation_name: &str, started_at: chrono::DateTime<chrono::Utc>) -> Self {
        OperationId(format!("{}_{}", operation_name, started_at.timestamp()))
    }

    /// Build an operation id stamped with the current time.
    pub fn now(operation_name: &str) -> Self {
        Self::new(operation_name, chrono::Utc::now())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_correlation_ids_are_unique() {
        let a = CorrelationId::new();
        let b = CorrelationId::new();
        assert_ne!(a, b);
        assert_eq!(a.as_str().len(), 36);
    }

    #[test]
    fn test_operation_id_format() {
        let ts = chrono::Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let id = OperationId::new("full_backup", ts);
        assert_eq!(id.0, "full_backup_1700000000");
    }
}

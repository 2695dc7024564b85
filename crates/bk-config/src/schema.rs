//! Schema validation of environment documents.
//!
//! Validation runs on the parsed document *before* interpolation, so the schema
//! describes the pre-substitution shape: `${NAME}` markers and `secret://`
//! references are plain strings at that point.

use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// One violated schema constraint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Violation {
    /// JSON pointer to the offending value (`""` for the document root).
    pub instance_path: String,
    /// Human-readable description of the violated constraint.
    pub message: String,
}

impl Violation {
    pub fn new(instance_path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            instance_path: instance_path.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let at = if self.instance_path.is_empty() {
            "/"
        } else {
            self.instance_path.as_str()
        };
        write!(f, "at {}: {}", at, self.message)
    }
}

/// The schema document itself could not be compiled.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct InvalidSchema(pub String);

/// Validates a document against a schema, reporting every violation.
pub trait SchemaValidator: Send + Sync {
    /// Empty result means the document conforms.
    fn validate(
        &self,
        document: &serde_json::Value,
        schema: &serde_json::Value,
    ) -> Result<Vec<Violation>, InvalidSchema>;
}

/// JSON Schema validator (draft-07 and later, detected from `$schema`).
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSchemaValidator;

impl SchemaValidator for JsonSchemaValidator {
    fn validate(
        &self,
        document: &serde_json::Value,
        schema: &serde_json::Value,
    ) -> Result<Vec<Violation>, InvalidSchema> {
        let validator =
            jsonschema::validator_for(schema).map_err(|e| InvalidSchema(e.to_string()))?;
        Ok(validator
            .iter_errors(document)
            .map(|e| Violation::new(e.instance_path.to_string(), e.to_string()))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn schema() -> serde_json::Value {
        json!({
            "$schema": "http://json-schema.org/draft-07/schema#",
            "type": "object",
            "required": ["version", "backup"],
            "properties": {
                "version": {"type": "string"},
                "backup": {"type": "object"}
            }
        })
    }

    #[test]
    fn conforming_document_has_no_violations() {
        let doc = json!({"version": "1.0.0", "backup": {}});
        let violations = JsonSchemaValidator.validate(&doc, &schema()).unwrap();
        assert!(violations.is_empty());
    }

    #[test]
    fn missing_required_field_is_reported() {
        let doc = json!({"backup": {}});
        let violations = JsonSchemaValidator.validate(&doc, &schema()).unwrap();
        assert_eq!(violations.len(), 1);
        assert!(violations[0].message.contains("version"));
    }

    #[test]
    fn markers_are_valid_strings_before_interpolation() {
        let doc = json!({"version": "${CONFIG_VERSION:1.0.0}", "backup": {}});
        let violations = JsonSchemaValidator.validate(&doc, &schema()).unwrap();
        assert!(violations.is_empty());
    }

    #[test]
    fn type_violation_carries_path() {
        let doc = json!({"version": "1.0.0", "backup": "nope"});
        let violations = JsonSchemaValidator.validate(&doc, &schema()).unwrap();
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].instance_path, "/backup");
    }

    #[test]
    fn uncompilable_schema_is_rejected() {
        let bad = json!({"type": 42});
        assert!(JsonSchemaValidator.validate(&json!({}), &bad).is_err());
    }
}

//! The resolved configuration document.

use crate::error::ConfigError;
use crate::interpolate::{join_index, join_key};
use serde_json::Value;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// Replacement text for secret-derived values in a redacted document.
pub const REDACTED: &str = "<REDACTED>";

/// A fully interpolated configuration tree for one environment.
///
/// Read-only once built; shared behind an `Arc` by the resolver cache.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedDocument {
    root: Value,
    environment: String,
    source: PathBuf,
    secret_paths: BTreeSet<String>,
}

impl ResolvedDocument {
    pub fn new(root: Value, environment: impl Into<String>, source: impl Into<PathBuf>) -> Self {
        Self {
            root,
            environment: environment.into(),
            source: source.into(),
            secret_paths: BTreeSet::new(),
        }
    }

    /// Mark the scalars at `paths` (`a.b[0].c`) as secret-derived.
    pub fn with_secret_paths(mut self, paths: BTreeSet<String>) -> Self {
        self.secret_paths = paths;
        self
    }

    /// Paths of scalars that were resolved from `secret://` references.
    pub fn secret_paths(&self) -> &BTreeSet<String> {
        &self.secret_paths
    }

    /// Copy of this document with every secret-derived scalar replaced by
    /// [`REDACTED`].
    pub fn redacted(&self) -> ResolvedDocument {
        let mut copy = self.clone();
        if !self.secret_paths.is_empty() {
            redact(&mut copy.root, "", &self.secret_paths);
        }
        copy
    }

    /// The document tree.
    pub fn root(&self) -> &Value {
        &self.root
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    /// File the document was loaded from.
    pub fn source(&self) -> &Path {
        &self.source
    }

    /// Top-level `version` field, if it is a string.
    pub fn version(&self) -> Option<&str> {
        self.root.get("version").and_then(Value::as_str)
    }

    /// Look up a dotted path (`backup.resources.batch_size`).
    ///
    /// Returns `None` when any segment is missing, an intermediate node is not
    /// a mapping, or the final value is `null`.
    pub fn get(&self, path: &str) -> Option<&Value> {
        path.split('.')
            .try_fold(&self.root, |node, key| node.as_object()?.get(key))
            .filter(|v| !v.is_null())
    }

    /// Finite float at `path`, or `default` when absent.
    pub fn f64_or(&self, path: &str, default: f64) -> Result<f64, ConfigError> {
        let value = match self.get(path) {
            None => return Ok(default),
            Some(Value::Number(n)) => n.as_f64(),
            Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
            Some(_) => None,
        };
        value
            .filter(|f| f.is_finite())
            .ok_or_else(|| invalid(path, "a finite number"))
    }

    /// Non-negative integer at `path`, or `default` when absent.
    pub fn u64_or(&self, path: &str, default: u64) -> Result<u64, ConfigError> {
        match self.get(path) {
            None => Ok(default),
            Some(Value::Number(n)) => n
                .as_u64()
                .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0 && *f >= 0.0).map(|f| f as u64))
                .ok_or_else(|| invalid(path, "a non-negative integer")),
            Some(Value::String(s)) => s
                .trim()
                .parse()
                .map_err(|_| invalid(path, "a non-negative integer")),
            Some(_) => Err(invalid(path, "a non-negative integer")),
        }
    }

    /// `u32` at `path`, or `default` when absent.
    pub fn u32_or(&self, path: &str, default: u32) -> Result<u32, ConfigError> {
        let v = self.u64_or(path, u64::from(default))?;
        u32::try_from(v).map_err(|_| invalid(path, "an integer no larger than 4294967295"))
    }

    /// TCP port at `path`, or `default` when absent.
    pub fn port_or(&self, path: &str, default: u16) -> Result<u16, ConfigError> {
        let v = self.u64_or(path, u64::from(default))?;
        u16::try_from(v).map_err(|_| invalid(path, "a port number (0-65535)"))
    }

    /// Boolean at `path`, or `default` when absent.
    pub fn bool_or(&self, path: &str, default: bool) -> Result<bool, ConfigError> {
        match self.get(path) {
            None => Ok(default),
            Some(Value::Bool(b)) => Ok(*b),
            Some(Value::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "yes" | "on" | "1" => Ok(true),
                "false" | "no" | "off" | "0" => Ok(false),
                _ => Err(invalid(path, "a boolean")),
            },
            Some(_) => Err(invalid(path, "a boolean")),
        }
    }

    /// String at `path`, or `default` when absent. Numbers and booleans are
    /// rendered as text.
    pub fn string_or(&self, path: &str, default: &str) -> Result<String, ConfigError> {
        match self.get(path) {
            None => Ok(default.to_string()),
            Some(Value::String(s)) => Ok(s.clone()),
            Some(Value::Number(n)) => Ok(n.to_string()),
            Some(Value::Bool(b)) => Ok(b.to_string()),
            Some(_) => Err(invalid(path, "a string")),
        }
    }

    /// List of strings at `path`, or `default` when absent.
    ///
    /// An explicitly empty list is returned as-is, not replaced by `default`.
    pub fn string_list_or(&self, path: &str, default: &[&str]) -> Result<Vec<String>, ConfigError> {
        match self.get(path) {
            None => Ok(default.iter().map(|s| s.to_string()).collect()),
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| match item {
                    Value::String(s) => Ok(s.clone()),
                    _ => Err(invalid(path, "a list of strings")),
                })
                .collect(),
            Some(_) => Err(invalid(path, "a list of strings")),
        }
    }
}

fn redact(node: &mut Value, path: &str, secret_paths: &BTreeSet<String>) {
    match node {
        Value::Object(map) => {
            for (key, child) in map.iter_mut() {
                redact(child, &join_key(path, key), secret_paths);
            }
        }
        Value::Array(items) => {
            for (i, child) in items.iter_mut().enumerate() {
                redact(child, &join_index(path, i), secret_paths);
            }
        }
        Value::String(s) if secret_paths.contains(path) => *s = REDACTED.to_string(),
        _ => {}
    }
}

fn invalid(path: &str, expected: &'static str) -> ConfigError {
    ConfigError::InvalidField {
        path: path.to_string(),
        expected,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(root: Value) -> ResolvedDocument {
        ResolvedDocument::new(root, "test", "config/environments/test.yml")
    }

    #[test]
    fn get_walks_nested_mappings() {
        let d = doc(json!({"a": {"b": {"c": 3}}}));
        assert_eq!(d.get("a.b.c"), Some(&json!(3)));
        assert_eq!(d.get("a.x.c"), None);
        assert_eq!(d.get("a.b.c.d"), None);
    }

    #[test]
    fn null_counts_as_absent() {
        let d = doc(json!({"a": null}));
        assert_eq!(d.get("a"), None);
        assert_eq!(d.u64_or("a", 7).unwrap(), 7);
    }

    #[test]
    fn numeric_strings_are_coerced() {
        let d = doc(json!({"port": "8081", "ratio": "1.5", "flag": "false"}));
        assert_eq!(d.port_or("port", 80).unwrap(), 8081);
        assert_eq!(d.f64_or("ratio", 0.0).unwrap(), 1.5);
        assert!(!d.bool_or("flag", true).unwrap());
    }

    #[test]
    fn wrong_shape_is_an_error() {
        let d = doc(json!({"batch": "lots", "port": 70000, "list": [1, 2]}));
        assert!(matches!(
            d.u64_or("batch", 1),
            Err(ConfigError::InvalidField { .. })
        ));
        assert!(d.port_or("port", 80).is_err());
        assert!(d.string_list_or("list", &[]).is_err());
    }

    #[test]
    fn integral_floats_accepted_as_integers() {
        let d = doc(json!({"n": 64.0}));
        assert_eq!(d.u64_or("n", 1).unwrap(), 64);
    }

    #[test]
    fn non_finite_floats_are_rejected() {
        let d = doc(json!({"a": "NaN", "b": "inf", "c": "-infinity", "d": "-2.5"}));
        for path in ["a", "b", "c"] {
            assert!(
                matches!(d.f64_or(path, 1.0), Err(ConfigError::InvalidField { .. })),
                "{}",
                path
            );
        }
        assert_eq!(d.f64_or("d", 1.0).unwrap(), -2.5);
    }

    #[test]
    fn redaction_replaces_only_secret_paths() {
        let paths = ["db.password", "dest[1].config.key"]
            .into_iter()
            .map(str::to_string)
            .collect();
        let d = doc(json!({
            "db": {"password": "hunter2", "host": "db.local"},
            "dest": [{"config": {"key": "plain"}}, {"config": {"key": "AKIA"}}]
        }))
        .with_secret_paths(paths);

        let r = d.redacted();
        assert_eq!(r.root()["db"]["password"], REDACTED);
        assert_eq!(r.root()["db"]["host"], "db.local");
        assert_eq!(r.root()["dest"][0]["config"]["key"], "plain");
        assert_eq!(r.root()["dest"][1]["config"]["key"], REDACTED);
        assert_eq!(d.root()["db"]["password"], "hunter2");
    }

    #[test]
    fn empty_list_is_honored() {
        let d = doc(json!({"patterns": []}));
        assert!(d.string_list_or("patterns", &["*.tmp"]).unwrap().is_empty());
        assert_eq!(d.string_list_or("missing", &["*.tmp"]).unwrap(), vec!["*.tmp"]);
    }
}

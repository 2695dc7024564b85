//! Environment-variable and secret interpolation over a document tree.
//!
//! The walk is depth-first over mappings and sequences; only string scalars
//! are rewritten. Per scalar, env interpolation runs first and secret
//! interpolation second:
//!
//! | scalar                 | result                                        |
//! |------------------------|-----------------------------------------------|
//! | `${NAME}`              | `$NAME`, or `null` if unset                   |
//! | `${NAME:default}`      | `$NAME`, or `default` (text after first `:`)  |
//! | `secret://a/b`         | secret lookup, or `<SECRET:a/b>` on miss      |
//! | `${NAME:secret://a/b}` | `$NAME`, or the secret when `NAME` is unset   |
//!
//! Substitution is single-pass: a value taken from the environment or a
//! default is never re-scanned for `${`. A scalar whose substituted value
//! still begins with `${` (`${A:${B}}`, or `A=${HOME}` in the environment)
//! fails with [`ConfigError::MalformedMarker`], as does a secret value that
//! is itself a marker.
//!
//! Paths of scalars that came from a secret reference are collected so that
//! callers can redact them before display.

use crate::env::EnvSource;
use crate::error::ConfigError;
use crate::secrets::{SecretResolver, SECRET_PREFIX};
use serde_json::{Map, Value};
use std::cell::RefCell;
use std::collections::BTreeSet;

/// Opening token of an env interpolation marker.
pub const ENV_MARKER_OPEN: &str = "${";

/// A parsed `${NAME}` / `${NAME:default}` marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvMarker<'a> {
    pub name: &'a str,
    pub default: Option<&'a str>,
}

/// Classification of a string scalar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scalar<'a> {
    /// Not a marker; kept as-is.
    Plain,
    /// A complete `${...}` marker.
    Env(EnvMarker<'a>),
    /// Starts with `${` but is not a complete marker (`${FOO`, `${FOO}/suffix`).
    Malformed,
}

/// Classify a string scalar.
pub fn parse_env_marker(s: &str) -> Scalar<'_> {
    let Some(rest) = s.strip_prefix(ENV_MARKER_OPEN) else {
        return Scalar::Plain;
    };
    let Some(inner) = rest.strip_suffix('}') else {
        return Scalar::Malformed;
    };
    match inner.split_once(':') {
        Some((name, default)) => Scalar::Env(EnvMarker {
            name,
            default: Some(default),
        }),
        None => Scalar::Env(EnvMarker {
            name: inner,
            default: None,
        }),
    }
}

/// Rewrites a document tree, substituting env markers and secret references.
pub struct Interpolator<'a> {
    env: &'a dyn EnvSource,
    secrets: &'a SecretResolver,
    secret_paths: RefCell<BTreeSet<String>>,
}

impl<'a> Interpolator<'a> {
    pub fn new(env: &'a dyn EnvSource, secrets: &'a SecretResolver) -> Self {
        Self {
            env,
            secrets,
            secret_paths: RefCell::new(BTreeSet::new()),
        }
    }

    /// Interpolate every string scalar in `root`.
    pub fn interpolate(&self, root: Value) -> Result<Value, ConfigError> {
        self.visit(root, "")
    }

    /// Interpolate `root` and return the paths of secret-derived scalars.
    pub fn interpolate_tracked(
        self,
        root: Value,
    ) -> Result<(Value, BTreeSet<String>), ConfigError> {
        let value = self.visit(root, "")?;
        Ok((value, self.secret_paths.into_inner()))
    }

    fn visit(&self, node: Value, path: &str) -> Result<Value, ConfigError> {
        match node {
            Value::Object(map) => map
                .into_iter()
                .map(|(key, child)| {
                    let child_path = join_key(path, &key);
                    Ok((key, self.visit(child, &child_path)?))
                })
                .collect::<Result<Map<String, Value>, ConfigError>>()
                .map(Value::Object),
            Value::Array(items) => items
                .into_iter()
                .enumerate()
                .map(|(i, child)| self.visit(child, &join_index(path, i)))
                .collect::<Result<Vec<Value>, ConfigError>>()
                .map(Value::Array),
            Value::String(s) => self.scalar(s, path),
            scalar => Ok(scalar),
        }
    }

    fn scalar(&self, s: String, path: &str) -> Result<Value, ConfigError> {
        let substituted = match parse_env_marker(&s) {
            Scalar::Plain => None,
            Scalar::Env(marker) => {
                let value = self
                    .env
                    .var(marker.name)
                    .or_else(|| marker.default.map(str::to_string));
                match value {
                    Some(value) => Some(value),
                    None => return Ok(Value::Null),
                }
            }
            Scalar::Malformed => return Err(malformed(path, s)),
        };

        let text = substituted.as_deref().unwrap_or(&s);
        let resolved = match text.strip_prefix(SECRET_PREFIX) {
            Some(secret_path) => {
                self.secret_paths.borrow_mut().insert(path.to_string());
                self.secrets.resolve(secret_path)
            }
            None => match substituted {
                Some(value) => value,
                None => return Ok(Value::String(s)),
            },
        };

        if is_marker(&resolved) {
            return Err(malformed(path, s));
        }
        Ok(Value::String(resolved))
    }
}

fn malformed(path: &str, value: String) -> ConfigError {
    ConfigError::MalformedMarker {
        path: display_path(path),
        value,
    }
}

fn is_marker(s: &str) -> bool {
    s.starts_with(ENV_MARKER_OPEN) || s.starts_with(SECRET_PREFIX)
}

pub(crate) fn join_key(parent: &str, key: &str) -> String {
    if parent.is_empty() {
        key.to_string()
    } else {
        format!("{}.{}", parent, key)
    }
}

pub(crate) fn join_index(parent: &str, index: usize) -> String {
    format!("{}[{}]", parent, index)
}

fn display_path(path: &str) -> String {
    if path.is_empty() {
        "<root>".to_string()
    } else {
        path.to_string()
    }
}

/// Whether any string scalar in `node` still begins with `${` or `secret://`.
pub fn contains_unresolved_marker(node: &Value) -> bool {
    match node {
        Value::Object(map) => map.values().any(contains_unresolved_marker),
        Value::Array(items) => items.iter().any(contains_unresolved_marker),
        Value::String(s) => is_marker(s),
        _ => false,
    }
}

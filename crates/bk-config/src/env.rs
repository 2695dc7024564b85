//! Environment variable sources.
//!
//! Interpolation and the default secret store read variables through
//! [`EnvSource`] so callers (and tests) can supply a fixed environment instead
//! of the live process environment.

use std::collections::HashMap;

/// Read-only view of environment variables.
pub trait EnvSource: Send + Sync {
    /// Value of `name`, or `None` when unset.
    fn var(&self, name: &str) -> Option<String>;
}

/// The live process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl EnvSource for ProcessEnv {
    fn var(&self, name: &str) -> Option<String> {
        if name.is_empty() {
            return None;
        }
        std::env::var(name).ok()
    }
}

/// A fixed in-memory environment.
#[derive(Debug, Clone, Default)]
pub struct MapEnv {
    vars: HashMap<String, String>,
}

impl MapEnv {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a variable.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.vars.insert(name.into(), value.into());
        self
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for MapEnv {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            vars: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

impl EnvSource for MapEnv {
    fn var(&self, name: &str) -> Option<String> {
        self.vars.get(name).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn map_env_lookup() {
        let env = MapEnv::new().with("FOO", "bar");
        assert_eq!(env.var("FOO").as_deref(), Some("bar"));
        assert_eq!(env.var("MISSING"), None);
    }

    #[test]
    fn map_env_from_iter() {
        let env: MapEnv = [("A", "1"), ("B", "2")].into_iter().collect();
        assert_eq!(env.var("B").as_deref(), Some("2"));
    }

    #[test]
    fn process_env_empty_name_is_unset() {
        assert_eq!(ProcessEnv.var(""), None);
    }
}

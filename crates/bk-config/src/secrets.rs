//! Secret reference resolution.
//!
//! A config string `secret://db/password` names a secret by path. The
//! [`SecretResolver`] maps that path to a value through a [`SecretStore`].
//! Resolution never fails: a missing secret becomes the placeholder
//! `<SECRET:db/password>` and a warning is logged, so unresolved secrets stay
//! visible (and greppable) in resolved values and logs.

use crate::env::{EnvSource, ProcessEnv};
use std::sync::Arc;
use tracing::warn;

/// Prefix marking a config string as a secret reference.
pub const SECRET_PREFIX: &str = "secret://";

/// Prefix of the environment variables backing [`EnvSecretStore`].
pub const SECRET_ENV_PREFIX: &str = "SECRET_";

/// Backing store for secret values.
///
/// Deployments plug a vault or cloud secret manager in here without touching
/// the resolver.
pub trait SecretStore: Send + Sync {
    /// Value for `secret_path`, or `None` if the store has no such secret.
    fn get(&self, secret_path: &str) -> Option<String>;

    /// Short name used in log events.
    fn name(&self) -> &str {
        "custom"
    }
}

/// Secret store backed by `SECRET_*` environment variables.
///
/// `db/password` is looked up as `SECRET_DB_PASSWORD`.
#[derive(Clone)]
pub struct EnvSecretStore {
    env: Arc<dyn EnvSource>,
    prefix: String,
}

impl EnvSecretStore {
    pub fn new(env: Arc<dyn EnvSource>) -> Self {
        Self {
            env,
            prefix: SECRET_ENV_PREFIX.to_string(),
        }
    }

    /// Store reading the live process environment.
    pub fn from_process_env() -> Self {
        Self::new(Arc::new(ProcessEnv))
    }

    /// Environment variable name backing `secret_path`.
    pub fn env_var_name(&self, secret_path: &str) -> String {
        format!(
            "{}{}",
            self.prefix,
            secret_path.to_uppercase().replace('/', "_")
        )
    }
}

impl SecretStore for EnvSecretStore {
    fn get(&self, secret_path: &str) -> Option<String> {
        self.env.var(&self.env_var_name(secret_path))
    }

    fn name(&self) -> &str {
        "env"
    }
}

/// Placeholder substituted for a secret the store could not supply.
pub fn unresolved_placeholder(secret_path: &str) -> String {
    format!("<SECRET:{}>", secret_path)
}

/// Maps secret paths to values, degrading to a placeholder on miss.
#[derive(Clone)]
pub struct SecretResolver {
    store: Arc<dyn SecretStore>,
}

impl SecretResolver {
    pub fn new(store: Arc<dyn SecretStore>) -> Self {
        Self { store }
    }

    /// Resolve a secret path (without the `secret://` prefix).
    pub fn resolve(&self, secret_path: &str) -> String {
        match self.store.get(secret_path) {
            Some(value) => value,
            None => {
                warn!(
                    secret_path,
                    store = self.store.name(),
                    "secret not found"
                );
                unresolved_placeholder(secret_path)
            }
        }
    }

    /// Resolve a full `secret://...` reference; `None` if `value` is not one.
    pub fn resolve_reference(&self, value: &str) -> Option<String> {
        value
            .strip_prefix(SECRET_PREFIX)
            .map(|path| self.resolve(path))
    }
}

impl Default for SecretResolver {
    fn default() -> Self {
        Self::new(Arc::new(EnvSecretStore::from_process_env()))
    }
}

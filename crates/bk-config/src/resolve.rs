//! Environment document resolution and caching.
//!
//! Layout under the config directory:
//!
//! ```text
//! <config_dir>/
//! ├── environments/
//! │   └── <environment>.yml | .yaml | .json
//! └── schemas/
//!     └── backup_config_schema.json   (optional)
//! ```
//!
//! Resolution order is fixed: parse → validate (pre-interpolation) →
//! interpolate env markers → interpolate secrets → cache.

use crate::document::ResolvedDocument;
use crate::env::{EnvSource, ProcessEnv};
use crate::error::ConfigError;
use crate::interpolate::Interpolator;
use crate::projection::{BackupConfig, MonitoringConfig, PerformanceConfig, SecurityConfig};
use crate::schema::{JsonSchemaValidator, SchemaValidator, Violation};
use crate::secrets::{EnvSecretStore, SecretResolver, SecretStore};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, error, info, warn};

/// Directory holding one document per environment.
pub const ENVIRONMENTS_DIR: &str = "environments";

/// Directory holding the optional schema.
pub const SCHEMAS_DIR: &str = "schemas";

/// Schema file name inside [`SCHEMAS_DIR`].
pub const SCHEMA_FILE_NAME: &str = "backup_config_schema.json";

/// Accepted document extensions, in lookup order.
pub const DOCUMENT_EXTENSIONS: &[&str] = &["yml", "yaml", "json"];

#[derive(Default)]
struct CacheState {
    document: Option<Arc<ResolvedDocument>>,
    /// `Some(None)` records that the schema file is absent.
    schema: Option<Option<Arc<Value>>>,
}

/// Resolves and caches the configuration document for one environment.
///
/// The resolved document is built once and shared; [`reload`](Self::reload)
/// rebuilds it from disk under the cache lock, so readers see either the old
/// document or the new one, never a partial rebuild.
pub struct ConfigResolver {
    config_dir: PathBuf,
    environment: String,
    env: Arc<dyn EnvSource>,
    secret_store: Option<Arc<dyn SecretStore>>,
    validator: Arc<dyn SchemaValidator>,
    state: RwLock<CacheState>,
}

impl ConfigResolver {
    /// Resolver reading the process environment, `SECRET_*` secrets, and
    /// validating with JSON Schema.
    pub fn new(config_dir: impl Into<PathBuf>, environment: impl Into<String>) -> Self {
        Self {
            config_dir: config_dir.into(),
            environment: environment.into(),
            env: Arc::new(ProcessEnv),
            secret_store: None,
            validator: Arc::new(JsonSchemaValidator),
            state: RwLock::new(CacheState::default()),
        }
    }

    /// Use a different environment source for `${NAME}` markers.
    ///
    /// Unless a secret store is set explicitly, `SECRET_*` lookups read the
    /// same source.
    pub fn with_env(mut self, env: Arc<dyn EnvSource>) -> Self {
        self.env = env;
        self
    }

    /// Use a different backing store for `secret://` references.
    pub fn with_secret_store(mut self, store: Arc<dyn SecretStore>) -> Self {
        self.secret_store = Some(store);
        self
    }

    /// Use a different schema validator.
    pub fn with_validator(mut self, validator: Arc<dyn SchemaValidator>) -> Self {
        self.validator = validator;
        self
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    /// Path of the schema file (which may not exist).
    pub fn schema_path(&self) -> PathBuf {
        self.config_dir.join(SCHEMAS_DIR).join(SCHEMA_FILE_NAME)
    }

    /// Path of the environment document, or `None` if no candidate exists.
    pub fn document_path(&self) -> Option<PathBuf> {
        let dir = self.config_dir.join(ENVIRONMENTS_DIR);
        DOCUMENT_EXTENSIONS
            .iter()
            .map(|ext| dir.join(format!("{}.{}", self.environment, ext)))
            .find(|p| p.is_file())
    }

    /// The resolved document, loading it on first use.
    pub fn resolve(&self) -> Result<Arc<ResolvedDocument>, ConfigError> {
        if let Some(doc) = self.read_state().document.clone() {
            return Ok(doc);
        }

        let mut state = self.write_state();
        if let Some(doc) = state.document.clone() {
            return Ok(doc);
        }
        self.rebuild(&mut state)
    }

    /// Discard the cached document and schema and resolve again from disk.
    pub fn reload(&self) -> Result<Arc<ResolvedDocument>, ConfigError> {
        let mut state = self.write_state();
        *state = CacheState::default();
        info!(environment = %self.environment, "reloading configuration");
        self.rebuild(&mut state)
    }

    /// Discard the cached document and schema without rebuilding.
    pub fn invalidate(&self) {
        *self.write_state() = CacheState::default();
    }

    /// Alias for [`resolve`](Self::resolve).
    pub fn raw(&self) -> Result<Arc<ResolvedDocument>, ConfigError> {
        self.resolve()
    }

    /// Validate an arbitrary document against the schema.
    ///
    /// Returns the violations (empty when the schema is absent).
    pub fn validate_document(&self, document: &Value) -> Result<Vec<Violation>, ConfigError> {
        let mut state = self.write_state();
        match self.schema(&mut state)? {
            Some(schema) => self.check(document, &schema),
            None => Ok(Vec::new()),
        }
    }

    pub fn backup_config(&self) -> Result<BackupConfig, ConfigError> {
        let doc = self.resolve()?;
        BackupConfig::from_document(&doc)
    }

    pub fn monitoring_config(&self) -> Result<MonitoringConfig, ConfigError> {
        let doc = self.resolve()?;
        MonitoringConfig::from_document(&doc)
    }

    pub fn security_config(&self) -> Result<SecurityConfig, ConfigError> {
        let doc = self.resolve()?;
        SecurityConfig::from_document(&doc)
    }

    pub fn performance_config(&self) -> Result<PerformanceConfig, ConfigError> {
        let doc = self.resolve()?;
        PerformanceConfig::from_document(&doc)
    }

    fn rebuild(&self, state: &mut CacheState) -> Result<Arc<ResolvedDocument>, ConfigError> {
        let path = self.document_path().ok_or_else(|| ConfigError::NotFound {
            path: self
                .config_dir
                .join(ENVIRONMENTS_DIR)
                .join(format!("{}.yml", self.environment)),
        })?;

        let parsed = parse_document(&path)?;

        if let Some(schema) = self.schema(state)? {
            let violations = self.check(&parsed, &schema)?;
            if !violations.is_empty() {
                for v in &violations {
                    error!(
                        environment = %self.environment,
                        violation = %v,
                        "configuration validation failed"
                    );
                }
                return Err(ConfigError::Validation(violations));
            }
            info!(environment = %self.environment, "configuration validated successfully");
        }

        if let Some(version) = parsed.get("version").and_then(Value::as_str) {
            if !bk_common::schema::is_compatible(version) {
                warn!(
                    version,
                    supported = bk_common::CONFIG_SCHEMA_VERSION,
                    "configuration document version is not compatible with this build"
                );
            }
        }

        let secrets = self.secret_resolver();
        let (root, secret_paths) =
            Interpolator::new(self.env.as_ref(), &secrets).interpolate_tracked(parsed)?;

        let doc = Arc::new(
            ResolvedDocument::new(root, &self.environment, &path).with_secret_paths(secret_paths),
        );
        info!(
            environment = %self.environment,
            path = %path.display(),
            "configuration resolved"
        );
        state.document = Some(doc.clone());
        Ok(doc)
    }

    fn schema(&self, state: &mut CacheState) -> Result<Option<Arc<Value>>, ConfigError> {
        if let Some(cached) = &state.schema {
            return Ok(cached.clone());
        }

        let path = self.schema_path();
        let loaded = if path.is_file() {
            let content = std::fs::read_to_string(&path).map_err(|source| ConfigError::Io {
                path: path.clone(),
                source,
            })?;
            let schema: Value =
                serde_json::from_str(&content).map_err(|e| ConfigError::Schema {
                    path: path.clone(),
                    reason: e.to_string(),
                })?;
            debug!(path = %path.display(), "loaded configuration schema");
            Some(Arc::new(schema))
        } else {
            warn!(path = %path.display(), "configuration schema not found; skipping validation");
            None
        };

        state.schema = Some(loaded.clone());
        Ok(loaded)
    }

    fn check(&self, document: &Value, schema: &Value) -> Result<Vec<Violation>, ConfigError> {
        self.validator
            .validate(document, schema)
            .map_err(|e| ConfigError::Schema {
                path: self.schema_path(),
                reason: e.to_string(),
            })
    }

    fn secret_resolver(&self) -> SecretResolver {
        match &self.secret_store {
            Some(store) => SecretResolver::new(store.clone()),
            None => SecretResolver::new(Arc::new(EnvSecretStore::new(self.env.clone()))),
        }
    }

    fn read_state(&self) -> RwLockReadGuard<'_, CacheState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, CacheState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Resolve a document once with the default environment and secret store.
pub fn resolve_config(
    config_dir: impl Into<PathBuf>,
    environment: impl Into<String>,
) -> Result<Arc<ResolvedDocument>, ConfigError> {
    ConfigResolver::new(config_dir, environment).resolve()
}

/// Parse a document file by extension. An empty document is an empty mapping.
fn parse_document(path: &Path) -> Result<Value, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let is_json = path.extension().and_then(|e| e.to_str()) == Some("json");
    let parsed: Value = if is_json {
        serde_json::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?
    } else {
        serde_yaml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?
    };

    match parsed {
        Value::Null => Ok(Value::Object(serde_json::Map::new())),
        Value::Object(_) => Ok(parsed),
        _ => Err(ConfigError::Parse {
            path: path.to_path_buf(),
            reason: "top-level document must be a mapping".to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::MapEnv;
    use std::fs;
    use tempfile::TempDir;

    fn config_dir() -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join(ENVIRONMENTS_DIR)).unwrap();
        fs::create_dir_all(dir.path().join(SCHEMAS_DIR)).unwrap();
        dir
    }

    fn write_env(dir: &TempDir, file: &str, content: &str) {
        fs::write(dir.path().join(ENVIRONMENTS_DIR).join(file), content).unwrap();
    }

    fn resolver(dir: &TempDir, env: MapEnv) -> ConfigResolver {
        ConfigResolver::new(dir.path(), "test").with_env(Arc::new(env))
    }

    #[test]
    fn missing_environment_file_is_not_found() {
        let dir = config_dir();
        let err = resolver(&dir, MapEnv::new()).resolve().unwrap_err();
        match err {
            ConfigError::NotFound { path } => assert!(path.ends_with("environments/test.yml")),
            other => panic!("expected NotFound, got {:?}", other),
        }
    }

    #[test]
    fn yaml_extensions_and_json_are_accepted() {
        let dir = config_dir();
        write_env(&dir, "test.json", r#"{"version": "1.0.0"}"#);
        let doc = resolver(&dir, MapEnv::new()).resolve().unwrap();
        assert_eq!(doc.version(), Some("1.0.0"));
        assert!(doc.source().ends_with("test.json"));

        write_env(&dir, "test.yaml", "version: \"1.1.0\"\n");
        let doc = resolver(&dir, MapEnv::new()).resolve().unwrap();
        assert_eq!(doc.version(), Some("1.1.0"));
    }

    #[test]
    fn empty_document_is_empty_mapping() {
        let dir = config_dir();
        write_env(&dir, "test.yml", "");
        let doc = resolver(&dir, MapEnv::new()).resolve().unwrap();
        assert!(doc.root().as_object().unwrap().is_empty());
    }

    #[test]
    fn non_mapping_document_rejected() {
        let dir = config_dir();
        write_env(&dir, "test.yml", "- a\n- b\n");
        let err = resolver(&dir, MapEnv::new()).resolve().unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn cached_document_is_shared() {
        let dir = config_dir();
        write_env(&dir, "test.yml", "version: \"1.0.0\"\n");
        let r = resolver(&dir, MapEnv::new());
        let a = r.resolve().unwrap();
        let b = r.resolve().unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn invalid_schema_file_is_reported() {
        let dir = config_dir();
        write_env(&dir, "test.yml", "version: \"1.0.0\"\n");
        fs::write(dir.path().join(SCHEMAS_DIR).join(SCHEMA_FILE_NAME), "{not json").unwrap();
        let err = resolver(&dir, MapEnv::new()).resolve().unwrap_err();
        assert!(matches!(err, ConfigError::Schema { .. }));
    }

    #[test]
    fn validate_document_without_schema_passes() {
        let dir = config_dir();
        let r = resolver(&dir, MapEnv::new());
        assert!(r
            .validate_document(&serde_json::json!({"anything": 1}))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn projection_accessors_read_resolved_document() {
        let dir = config_dir();
        write_env(
            &dir,
            "test.yml",
            "backup:\n  resources:\n    batch_size: ${BATCH:42}\n\
             monitoring:\n  endpoints:\n    health_port: 8181\n\
             security:\n  authentication:\n    token_expiry_hours: 6\n\
             performance:\n  retry_policy:\n    max_attempts: 9\n",
        );
        let r = resolver(&dir, MapEnv::new());
        assert_eq!(r.backup_config().unwrap().batch_size, 42);
        assert_eq!(r.monitoring_config().unwrap().health_port, 8181);
        assert_eq!(r.security_config().unwrap().token_expiry_hours, 6);
        assert_eq!(r.performance_config().unwrap().retry_max_attempts, 9);
    }

    #[test]
    fn resolved_document_records_secret_paths() {
        let dir = config_dir();
        write_env(
            &dir,
            "test.yml",
            "database:\n  password: secret://db/password\n  host: localhost\n",
        );
        let r = resolver(&dir, MapEnv::new().with("SECRET_DB_PASSWORD", "hunter2"));
        let doc = r.resolve().unwrap();
        assert_eq!(doc.root()["database"]["password"], "hunter2");
        assert!(doc.secret_paths().contains("database.password"));
        assert_eq!(
            doc.redacted().root()["database"]["password"],
            crate::document::REDACTED
        );
    }
}

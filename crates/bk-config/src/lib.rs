//! Backup core configuration loading and resolution.
//!
//! This crate provides:
//! - Environment document loading (`environments/<env>.{yml,yaml,json}`)
//! - Optional JSON Schema validation of the pre-interpolation document
//! - `${NAME}` / `${NAME:default}` and `secret://path` interpolation
//! - A cached, atomically reloadable resolved document
//! - Typed projections with per-field defaults
//! - Config snapshots for logging which configuration is active

pub mod document;
pub mod env;
pub mod error;
pub mod interpolate;
pub mod projection;
pub mod resolve;
pub mod schema;
pub mod secrets;
pub mod snapshot;

pub use document::ResolvedDocument;
pub use env::{EnvSource, MapEnv, ProcessEnv};
pub use error::ConfigError;
pub use projection::{
    BackupConfig, DestinationConfig, MonitoringConfig, PerformanceConfig, SecurityConfig,
};
pub use resolve::{resolve_config, ConfigResolver};
pub use schema::{JsonSchemaValidator, SchemaValidator, Violation};
pub use secrets::{EnvSecretStore, SecretResolver, SecretStore};
pub use snapshot::ConfigSnapshot;

//! Command-line interface.

use crate::exit_codes::ExitCode;
use bk_common::Error;
use bk_config::{
    BackupConfig, ConfigError, ConfigResolver, ConfigSnapshot, MonitoringConfig,
    PerformanceConfig, SecurityConfig,
};
use bk_telemetry::{logging, Monitoring, MonitoringSettings};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use serde_json::{json, Value};
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "bk-core", version, about = "Backup core configuration and telemetry")]
pub struct Cli {
    /// Configuration directory holding environments/ and schemas/
    #[arg(long, global = true, env = "BACKUP_CONFIG_DIR", default_value = "config")]
    pub config_dir: PathBuf,

    /// Environment to resolve (development, staging, production, ...)
    #[arg(
        long = "env",
        global = true,
        env = "BACKUP_ENVIRONMENT",
        default_value = "development"
    )]
    pub environment: String,

    /// Output format
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Json)]
    pub format: OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Single-line JSON
    Json,
    /// Indented JSON
    Pretty,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Inspect the resolved configuration
    #[command(subcommand)]
    Config(ConfigCommands),
    /// Run the health checks once and report
    Health {
        /// Seconds to wait for every check's first result
        #[arg(long, default_value_t = 5)]
        wait_secs: u64,
    },
    /// Run health checks and serve /metrics and /health until stopped
    Serve {
        /// Stop after this many seconds instead of running forever
        #[arg(long)]
        for_secs: Option<u64>,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Print typed configuration sections
    Show {
        /// Only print this section
        #[arg(long, value_enum)]
        section: Option<Section>,
    },
    /// Resolve the configuration and report schema violations
    Validate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Section {
    Backup,
    Monitoring,
    Security,
    Performance,
    Snapshot,
}

/// Run the parsed command and map the outcome to an exit code.
pub fn run(cli: &Cli) -> ExitCode {
    match dispatch(cli) {
        Ok(code) => code,
        Err(err) => {
            let code = ExitCode::from(&err);
            let _ = emit(
                cli.format,
                &json!({"error": err.to_string(), "code": err.code()}),
                &mut std::io::stderr(),
            );
            code
        }
    }
}

fn dispatch(cli: &Cli) -> Result<ExitCode, Error> {
    match &cli.command {
        Commands::Config(ConfigCommands::Show { section }) => config_show(cli, *section),
        Commands::Config(ConfigCommands::Validate) => config_validate(cli),
        Commands::Health { wait_secs } => health(cli, Duration::from_secs(*wait_secs)),
        Commands::Serve { for_secs } => serve(cli, for_secs.map(Duration::from_secs)),
    }
}

fn resolver(cli: &Cli) -> ConfigResolver {
    ConfigResolver::new(&cli.config_dir, &cli.environment)
}

fn config_show(cli: &Cli, section: Option<Section>) -> Result<ExitCode, Error> {
    logging::init_logging(tracing::Level::WARN, logging::LogFormat::Json);

    let doc = resolver(cli).resolve()?;
    // Secret-derived values never reach stdout.
    let shown = doc.redacted();
    let value = match section {
        Some(Section::Backup) => to_value(&BackupConfig::from_document(&shown)?)?,
        Some(Section::Monitoring) => to_value(&MonitoringConfig::from_document(&shown)?)?,
        Some(Section::Security) => to_value(&SecurityConfig::from_document(&shown)?)?,
        Some(Section::Performance) => to_value(&PerformanceConfig::from_document(&shown)?)?,
        Some(Section::Snapshot) => to_value(&ConfigSnapshot::capture(&doc))?,
        None => json!({
            "snapshot": ConfigSnapshot::capture(&doc),
            "backup": BackupConfig::from_document(&shown)?,
            "monitoring": MonitoringConfig::from_document(&shown)?,
            "security": SecurityConfig::from_document(&shown)?,
            "performance": PerformanceConfig::from_document(&shown)?,
        }),
    };
    emit(cli.format, &value, &mut std::io::stdout())?;
    Ok(ExitCode::Ok)
}

fn config_validate(cli: &Cli) -> Result<ExitCode, Error> {
    logging::init_logging(tracing::Level::WARN, logging::LogFormat::Json);

    match resolver(cli).resolve() {
        Ok(doc) => {
            let snapshot = ConfigSnapshot::capture(&doc);
            emit(
                cli.format,
                &json!({
                    "valid": true,
                    "environment": snapshot.environment,
                    "source": snapshot.source,
                    "version": snapshot.version,
                    "digest": snapshot.digest,
                }),
                &mut std::io::stdout(),
            )?;
            Ok(ExitCode::Ok)
        }
        Err(ConfigError::Validation(violations)) => {
            emit(
                cli.format,
                &json!({"valid": false, "violations": violations}),
                &mut std::io::stdout(),
            )?;
            Ok(ExitCode::ValidationError)
        }
        Err(e) => Err(e.into()),
    }
}

/// Settings from the resolved config, or defaults when the environment has
/// no document.
fn monitoring_settings(cli: &Cli) -> Result<MonitoringSettings, Error> {
    match resolver(cli).monitoring_config() {
        Ok(config) => Ok(MonitoringSettings::from_config(&config)),
        Err(ConfigError::NotFound { path }) => {
            warn!(path = %path.display(), "no configuration found; using monitoring defaults");
            Ok(MonitoringSettings::default())
        }
        Err(e) => Err(e.into()),
    }
}

fn health(cli: &Cli, wait: Duration) -> Result<ExitCode, Error> {
    let settings = MonitoringSettings {
        enabled: false,
        ..monitoring_settings(cli)?
    };
    let monitoring = Monitoring::new(settings);
    monitoring.initialize()?;
    monitoring.health().wait_for_first_results(wait);

    let report = monitoring.health_status();
    emit(cli.format, &report, &mut std::io::stdout())?;
    monitoring.shutdown();

    Ok(if report.is_healthy() {
        ExitCode::Ok
    } else {
        ExitCode::Unhealthy
    })
}

fn serve(cli: &Cli, run_for: Option<Duration>) -> Result<ExitCode, Error> {
    let resolver = resolver(cli);
    let doc = resolver.resolve()?;
    let settings = MonitoringSettings::from_config(&resolver.monitoring_config()?);
    let monitoring = Monitoring::new(settings);
    monitoring.initialize()?;

    let snapshot = ConfigSnapshot::capture(&doc);
    info!(
        environment = %snapshot.environment,
        source = %snapshot.source.display(),
        digest = %snapshot.digest,
        "configuration active"
    );

    match run_for {
        Some(d) => std::thread::sleep(d),
        None => loop {
            std::thread::park();
        },
    }

    monitoring.shutdown();
    Ok(ExitCode::Ok)
}

fn to_value<T: Serialize>(value: &T) -> Result<Value, Error> {
    Ok(serde_json::to_value(value)?)
}

fn emit<T: Serialize, W: Write>(format: OutputFormat, value: &T, out: &mut W) -> Result<(), Error> {
    let text = match format {
        OutputFormat::Json => serde_json::to_string(value)?,
        OutputFormat::Pretty => serde_json::to_string_pretty(value)?,
    };
    writeln!(out, "{}", text)?;
    Ok(())
}

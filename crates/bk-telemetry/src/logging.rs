//! Structured logging setup.
//!
//! Events go through `tracing`; output is JSON (machine) or pretty (human).
//! `RUST_LOG`, when set, overrides the configured level.

use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::level_filters::LevelFilter;
use tracing::Level;
use tracing_subscriber::{fmt, EnvFilter};

static INSTALLED: AtomicBool = AtomicBool::new(false);

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// One JSON object per event.
    #[default]
    Json,
    /// Human-readable multi-line output.
    Pretty,
}

impl FromStr for LogFormat {
    type Err = std::convert::Infallible;

    /// Case-insensitive; unknown values fall back to JSON.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_ascii_lowercase().as_str() {
            "pretty" | "text" | "human" => Self::Pretty,
            _ => Self::Json,
        })
    }
}

/// Parse a level name. Unknown names map to INFO.
pub fn parse_level(s: &str) -> Level {
    match s.trim().to_ascii_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" | "warning" => Level::WARN,
        "error" | "critical" | "crit" | "fatal" => Level::ERROR,
        _ => Level::INFO,
    }
}

/// Install the global subscriber.
///
/// Returns `true` if this call installed it and `false` if a subscriber was
/// already in place (from an earlier call or from the host process).
pub fn init_logging(level: Level, format: LogFormat) -> bool {
    if INSTALLED.swap(true, Ordering::SeqCst) {
        return false;
    }

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::default().add_directive(LevelFilter::from_level(level).into())
    });

    let installed = match format {
        LogFormat::Json => fmt()
            .json()
            .with_env_filter(filter)
            .with_current_span(false)
            .with_writer(std::io::stderr)
            .try_init(),
        LogFormat::Pretty => fmt()
            .pretty()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .try_init(),
    };
    installed.is_ok()
}

/// [`init_logging`] from config strings (`"INFO"`, `"json"`).
pub fn init_logging_from_config(level: &str, format: &str) -> bool {
    let format = format.parse().unwrap_or_default();
    init_logging(parse_level(level), format)
}

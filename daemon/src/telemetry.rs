//! Logging setup for the daemon
//!
//! Console output through `tracing-subscriber`'s fmt layer and an optional
//! JSON log file written by `tracing-appender`.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use tracing_appender::{non_blocking::WorkerGuard, rolling};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Crates whose events are shown by default
const LOG_TARGETS: &[&str] = &["csvsync", "csvsync_core", "csvsync_daemon"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// trace, debug, info, warn or error
    #[serde(default = "default_level")]
    pub level: String,
    #[serde(default = "default_console")]
    pub console: bool,
    /// JSON log file; no file logging when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
    #[serde(default)]
    pub rotation: Rotation,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Rotation {
    #[default]
    Daily,
    Hourly,
    Never,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            console: default_console(),
            file: None,
            rotation: Rotation::default(),
        }
    }
}

fn default_level() -> String { "info".to_string() }
fn default_console() -> bool { true }

pub fn parse_level(level: &str) -> tracing::Level {
    match level.to_lowercase().as_str() {
        "trace" => tracing::Level::TRACE,
        "debug" => tracing::Level::DEBUG,
        "info" => tracing::Level::INFO,
        "warn" => tracing::Level::WARN,
        "error" => tracing::Level::ERROR,
        _ => tracing::Level::INFO,
    }
}

/// `RUST_LOG` wins; otherwise our crates at `level`
fn env_filter(level: tracing::Level) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let directives: Vec<String> = LOG_TARGETS
            .iter()
            .map(|target| format!("{}={}", target, level))
            .collect();
        EnvFilter::new(directives.join(","))
    })
}

/// Console-only logging for short-lived commands
pub fn init_console_logging(level: &str) -> Result<()> {
    tracing_subscriber::registry()
        .with(env_filter(parse_level(level)))
        .with(fmt::layer().with_target(false))
        .try_init()
        .context("Failed to initialise logging")
}

/// Full logging for `run`.
///
/// The returned guard flushes the file writer when dropped, so keep it alive
/// for the lifetime of the process.
pub fn init_logging(
    config: &LoggingConfig,
    level_override: Option<&str>,
) -> Result<Option<WorkerGuard>> {
    let level = parse_level(level_override.unwrap_or(&config.level));

    let console_layer = config.console.then(|| fmt::layer().with_target(true));

    let (file_layer, guard) = match &config.file {
        Some(log_path) => {
            let (directory, file_name) = split_log_path(log_path);
            std::fs::create_dir_all(directory).with_context(|| {
                format!("Failed to create log directory {}", directory.display())
            })?;

            let file_appender = match config.rotation {
                Rotation::Daily => rolling::daily(directory, file_name),
                Rotation::Hourly => rolling::hourly(directory, file_name),
                Rotation::Never => rolling::never(directory, file_name),
            };

            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            let layer = fmt::layer()
                .with_writer(non_blocking)
                .json()
                .with_current_span(true)
                .with_span_list(true);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(env_filter(level))
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .context("Failed to initialise logging")?;

    Ok(guard)
}

fn split_log_path(log_path: &Path) -> (&Path, &OsStr) {
    let directory = log_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let file_name = log_path
        .file_name()
        .unwrap_or_else(|| OsStr::new("csvsync.log"));
    (directory, file_name)
}

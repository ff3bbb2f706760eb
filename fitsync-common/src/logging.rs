//! Logging initialization
//!
//! Console output always; a daily rolling file (`fitsync.YYYY-MM-DD.log`)
//! when `logging.dir` is configured. `RUST_LOG` overrides the configured level.

use crate::config::LoggingConfig;
use crate::{Error, Result};
use std::str::FromStr;
use tracing::{info, Level};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Log file name prefix inside `logging.dir`
pub const LOG_FILE_PREFIX: &str = "fitsync";

const SECTION_RULE: &str = "============================================================";

/// Parse a log level name (trace, debug, info, warn/warning, error)
pub fn parse_level(name: &str) -> Result<Level> {
    let normalized = match name.trim().to_ascii_lowercase().as_str() {
        "warning" => "warn".to_string(),
        other => other.to_string(),
    };
    Level::from_str(&normalized)
        .map_err(|_| Error::Logging(format!("Unknown log level: {:?}", name)))
}

fn env_filter(level: Level) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("fitsync={},fitsync_common={}", level, level))
    })
}

/// Install the global tracing subscriber
///
/// `level_override` (from the command line) takes precedence over the
/// configured level.
pub fn init_logging(config: &LoggingConfig, level_override: Option<&str>) -> Result<()> {
    let level = parse_level(level_override.unwrap_or(&config.level))?;

    let file_layer = match &config.dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let appender = RollingFileAppender::builder()
                .rotation(Rotation::DAILY)
                .filename_prefix(LOG_FILE_PREFIX)
                .filename_suffix("log")
                .build(dir)
                .map_err(|e| Error::Logging(format!("Failed to open log directory: {}", e)))?;
            Some(
                fmt::layer()
                    .with_writer(appender)
                    .with_ansi(false)
                    .with_target(true)
                    .with_filter(env_filter(level)),
            )
        }
        None => None,
    };

    let stdout_layer = fmt::layer()
        .with_writer(std::io::stdout)
        .with_target(false)
        .with_filter(env_filter(level));

    tracing_subscriber::registry()
        .with(file_layer)
        .with(stdout_layer)
        .try_init()
        .map_err(|e| Error::Logging(e.to_string()))?;

    Ok(())
}

/// Log a banner line block around `title`
pub fn log_section(title: &str) {
    info!("{}", SECTION_RULE);
    info!("{}", title);
    info!("{}", SECTION_RULE);
}

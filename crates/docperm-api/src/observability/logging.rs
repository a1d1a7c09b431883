//! Structured logging configuration.
//!
//! With JSON output enabled, each event is one JSON object per line:
//!
//! ```json
//! {"timestamp":"2026-01-15T10:30:00.000Z","level":"INFO","target":"docperm_server::broker::service","fields":{"message":"permission minted","mode":"Read"}}
//! ```
//!
//! `RUST_LOG` takes precedence over the configured level.

use docperm_server::config::LoggingSettings;
use tracing::Level;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Configuration for structured logging.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// JSON lines (true) or pretty text (false)
    pub json_format: bool,
    /// Level used when RUST_LOG is not set
    pub default_level: Level,
}

impl LoggingConfig {
    /// Builds the configuration from the `logging` section of the server
    /// config. An unrecognized level falls back to INFO.
    pub fn from_settings(settings: &LoggingSettings) -> Self {
        Self {
            json_format: settings.json,
            default_level: settings.level.parse::<Level>().unwrap_or(Level::INFO),
        }
    }
}

/// Installs the global subscriber. Later calls are no-ops.
pub fn init_logging(config: LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.default_level.to_string()));

    let output = if config.json_format {
        fmt::layer()
            .json()
            .with_current_span(true)
            .with_file(false)
            .with_line_number(false)
            .boxed()
    } else {
        fmt::layer().pretty().boxed()
    };

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(output)
        .try_init();
}

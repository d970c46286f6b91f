//! Logging initialization
//!
//! Logs go to stderr. `RUST_LOG` wins over the configured level.

use std::io;

use clap::ValueEnum;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

use crate::config::LogSettings;
use crate::error::{ServerError, ServerResult};

/// Log line format
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Human-readable
    Text,
    /// One JSON object per line
    Json,
}

impl LogFormat {
    fn from_settings(settings: &LogSettings) -> Self {
        if settings.json { Self::Json } else { Self::Text }
    }
}

/// Build the filter: `RUST_LOG` if set and valid, else `level`
pub fn env_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
}

/// Install the global subscriber
///
/// `format` overrides `settings.json` when given.
///
/// # Errors
///
/// Returns [`ServerError::Telemetry`] if a global subscriber is already set
pub fn init(settings: &LogSettings, format: Option<LogFormat>) -> ServerResult<()> {
    let filter = env_filter(&settings.level);
    let subscriber = tracing_subscriber::registry().with(filter);

    let result = match format.unwrap_or_else(|| LogFormat::from_settings(settings)) {
        LogFormat::Json => subscriber
            .with(fmt::layer().json().with_writer(io::stderr))
            .try_init(),
        LogFormat::Text => subscriber
            .with(fmt::layer().with_target(false).with_writer(io::stderr))
            .try_init(),
    };

    result.map_err(|e| ServerError::Telemetry(e.to_string()))
}

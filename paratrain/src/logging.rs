//! Tracing subscriber setup.
//!
//! Installs a console layer, an optional daily-rolling file layer, and,
//! with the `profiling` feature, a Chrome trace layer. `RUST_LOG` overrides
//! the configured level.
//!
//! # Example
//!
//! ```ignore
//! let _guard = logging::init(&LoggingConfig::default())?;
//! tracing::info!("ready");
//! // keep `_guard` alive until shutdown so buffered file output is flushed
//! ```

use std::path::PathBuf;

use time::format_description::well_known::Rfc3339;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::time::LocalTime;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::error::LoggingError;

/// Default level filter when `RUST_LOG` is not set.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Default log file name prefix.
pub const DEFAULT_LOG_FILE: &str = "paratrain.log";

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Level filter directive, e.g. `info` or `paratrain=debug`.
    pub level: String,
    /// Directory for log files. Console only when `None`.
    pub directory: Option<PathBuf>,
    /// File name prefix inside `directory`.
    pub file_name: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: DEFAULT_LOG_LEVEL.to_string(),
            directory: None,
            file_name: DEFAULT_LOG_FILE.to_string(),
        }
    }
}

/// Keeps background log writers alive.
///
/// Dropping the guard flushes pending output.
#[must_use = "dropping the guard stops file logging"]
pub struct LoggingGuard {
    _file: Option<WorkerGuard>,
    #[cfg(feature = "profiling")]
    _chrome: tracing_chrome::FlushGuard,
}

impl std::fmt::Debug for LoggingGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoggingGuard")
            .field("file", &self._file.is_some())
            .finish()
    }
}

fn filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_LEVEL))
}

/// Install the global subscriber.
pub fn init(config: &LoggingConfig) -> Result<LoggingGuard, LoggingError> {
    let console = fmt::layer()
        .with_target(false)
        .with_timer(LocalTime::new(Rfc3339));

    let (file_layer, file_guard) = match &config.directory {
        Some(directory) => {
            std::fs::create_dir_all(directory).map_err(|source| LoggingError::Directory {
                path: directory.clone(),
                source,
            })?;
            let appender = tracing_appender::rolling::daily(directory, &config.file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_ansi(false)
                .with_timer(LocalTime::new(Rfc3339))
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    #[cfg(feature = "profiling")]
    let (chrome_layer, chrome_guard) = tracing_chrome::ChromeLayerBuilder::new()
        .include_args(true)
        .build();

    let registry = tracing_subscriber::registry()
        .with(filter(&config.level))
        .with(console)
        .with(file_layer);

    #[cfg(feature = "profiling")]
    let registry = registry.with(chrome_layer);

    registry
        .try_init()
        .map_err(|e| LoggingError::Install(e.to_string()))?;

    Ok(LoggingGuard {
        _file: file_guard,
        #[cfg(feature = "profiling")]
        _chrome: chrome_guard,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = LoggingConfig::default();
        assert_eq!(config.level, "info");
        assert!(config.directory.is_none());
    }

    #[test]
    fn test_invalid_level_falls_back() {
        // Must not panic on a malformed directive.
        let _ = filter("not a [valid directive");
    }
}

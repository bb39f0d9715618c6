//! Error types for loading configuration and installing logging.
//!
//! The frame loop itself never returns errors: unknown step keys, orphaned
//! payloads, malformed values, and refused host operations are logged and
//! recovered from where they occur. Errors only surface at startup.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while loading a scenario file.
#[derive(Debug, Error)]
pub enum ScenarioError {
    /// The file could not be read.
    #[error("Failed to read scenario {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The file is not valid scenario JSON.
    #[error("Invalid scenario JSON: {0}")]
    Parse(#[from] serde_json::Error),

    /// Two timelines share an id.
    #[error("Duplicate timeline id: {0}")]
    DuplicateTimeline(String),

    /// Two regions share an id.
    #[error("Duplicate region id: {0}")]
    DuplicateRegion(u32),
}

/// Errors that can occur while loading runtime settings.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// The file could not be read or parsed.
    #[error("Failed to load settings {}: {source}", path.display())]
    Load {
        path: PathBuf,
        #[source]
        source: ini::Error,
    },

    /// Settings text is not valid INI.
    #[error("Invalid settings: {0}")]
    Parse(#[from] ini::ParseError),

    /// A key is present but its value cannot be used.
    #[error("Invalid value for [{section}] {key}: {value:?}")]
    InvalidValue {
        section: String,
        key: String,
        value: String,
    },
}

/// Errors that can occur while installing the tracing subscriber.
#[derive(Debug, Error)]
pub enum LoggingError {
    /// The log directory could not be created.
    #[error("Failed to create log directory {}: {source}", path.display())]
    Directory {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A global subscriber is already installed.
    #[error("Failed to install subscriber: {0}")]
    Install(String),
}

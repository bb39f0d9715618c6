//! Helpers shared by the subcommands.

use std::path::Path;

use paratrain::config::{ScenarioConfig, Settings};
use paratrain::logging::{self, LoggingGuard};

use crate::error::CliError;

/// Load settings from `path`, or from the default location when absent.
///
/// An explicit path must exist. The default location falls back to
/// built-in defaults.
pub fn load_settings(path: Option<&Path>) -> Result<Settings, CliError> {
    match path {
        Some(path) => Ok(Settings::load(path)?),
        None => match Settings::default_path() {
            Some(default) => Ok(Settings::load_or_default(&default)?),
            None => Ok(Settings::default()),
        },
    }
}

/// Install logging, letting `--log-level` override the settings file.
pub fn init_logging(
    settings: &Settings,
    level_override: Option<&str>,
) -> Result<LoggingGuard, CliError> {
    let mut config = settings.logging_config();
    if let Some(level) = level_override {
        config.level = level.to_string();
    }
    Ok(logging::init(&config)?)
}

/// Load a scenario, checking the path first for a clearer message.
pub fn load_scenario(path: &Path) -> Result<ScenarioConfig, CliError> {
    if !path.exists() {
        return Err(CliError::Config(format!(
            "Scenario file not found: {}",
            path.display()
        )));
    }
    Ok(ScenarioConfig::load(path)?)
}

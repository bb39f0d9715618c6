//! Runtime settings (INI).
//!
//! ```text
//! [session]
//! id = cohort-7
//! auto_advance = true
//!
//! [streaming]
//! settle_frames = 2
//! default_unload_delay_secs = 5
//! player_tag = Player
//!
//! [logging]
//! level = info
//! directory = /var/log/paratrain
//! ```
//!
//! Missing keys use defaults. Present but malformed values are errors.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use ini::Ini;
use tracing::debug;

use crate::error::SettingsError;
use crate::logging::{LoggingConfig, DEFAULT_LOG_FILE, DEFAULT_LOG_LEVEL};
use crate::procedure::{MachineConfig, DEFAULT_SESSION_ID};
use crate::runtime::seconds;
use crate::streaming::{SchedulerConfig, DEFAULT_PLAYER_TAG, DEFAULT_SETTLE_FRAMES};

/// Default region unload delay in seconds.
pub const DEFAULT_UNLOAD_DELAY_SECS: f32 = 5.0;

/// Settings file name inside the config directory.
pub const SETTINGS_FILE: &str = "settings.ini";

/// Runtime settings.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub session_id: String,
    pub auto_advance: bool,
    pub settle_frames: u32,
    pub default_unload_delay: Duration,
    pub player_tag: String,
    pub log_level: String,
    pub log_directory: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            session_id: DEFAULT_SESSION_ID.to_string(),
            auto_advance: true,
            settle_frames: DEFAULT_SETTLE_FRAMES,
            default_unload_delay: seconds(DEFAULT_UNLOAD_DELAY_SECS),
            player_tag: DEFAULT_PLAYER_TAG.to_string(),
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            log_directory: None,
        }
    }
}

impl Settings {
    /// Default settings location: `<config dir>/paratrain/settings.ini`.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("paratrain").join(SETTINGS_FILE))
    }

    /// Load settings from an INI file.
    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        let ini = Ini::load_from_file(path).map_err(|source| SettingsError::Load {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(path = %path.display(), "Settings loaded");
        Self::from_ini(&ini)
    }

    /// Load settings from `path` if it exists, defaults otherwise.
    pub fn load_or_default(path: &Path) -> Result<Self, SettingsError> {
        if path.exists() {
            Self::load(path)
        } else {
            debug!(path = %path.display(), "No settings file, using defaults");
            Ok(Self::default())
        }
    }

    /// Parse settings from INI text.
    pub fn from_ini_str(text: &str) -> Result<Self, SettingsError> {
        let ini = Ini::load_from_str(text)?;
        Self::from_ini(&ini)
    }

    fn from_ini(ini: &Ini) -> Result<Self, SettingsError> {
        let mut settings = Self::default();

        if let Some(id) = get(ini, "session", "id") {
            settings.session_id = id.to_string();
        }
        if let Some(value) = get(ini, "session", "auto_advance") {
            settings.auto_advance = parse_bool("session", "auto_advance", value)?;
        }

        if let Some(value) = get(ini, "streaming", "settle_frames") {
            settings.settle_frames = parse_value("streaming", "settle_frames", value)?;
        }
        if let Some(value) = get(ini, "streaming", "default_unload_delay_secs") {
            let secs: f32 = parse_value("streaming", "default_unload_delay_secs", value)?;
            if !secs.is_finite() || secs < 0.0 {
                return Err(invalid("streaming", "default_unload_delay_secs", value));
            }
            settings.default_unload_delay = seconds(secs);
        }
        if let Some(tag) = get(ini, "streaming", "player_tag") {
            settings.player_tag = tag.to_string();
        }

        if let Some(level) = get(ini, "logging", "level") {
            settings.log_level = level.to_string();
        }
        if let Some(directory) = get(ini, "logging", "directory") {
            settings.log_directory = Some(PathBuf::from(directory));
        }

        Ok(settings)
    }

    pub fn machine_config(&self) -> MachineConfig {
        MachineConfig {
            session_id: self.session_id.clone(),
            auto_advance: self.auto_advance,
        }
    }

    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            settle_frames: self.settle_frames,
        }
    }

    pub fn logging_config(&self) -> LoggingConfig {
        LoggingConfig {
            level: self.log_level.clone(),
            directory: self.log_directory.clone(),
            file_name: DEFAULT_LOG_FILE.to_string(),
        }
    }
}

/// Non-empty trimmed value of `[section] key`.
fn get<'a>(ini: &'a Ini, section: &str, key: &str) -> Option<&'a str> {
    ini.section(Some(section))
        .and_then(|props| props.get(key))
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

fn invalid(section: &str, key: &str, value: &str) -> SettingsError {
    SettingsError::InvalidValue {
        section: section.to_string(),
        key: key.to_string(),
        value: value.to_string(),
    }
}

fn parse_value<T: FromStr>(section: &str, key: &str, value: &str) -> Result<T, SettingsError> {
    value.parse().map_err(|_| invalid(section, key, value))
}

fn parse_bool(section: &str, key: &str, value: &str) -> Result<bool, SettingsError> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Ok(true),
        "false" | "no" | "off" | "0" => Ok(false),
        _ => Err(invalid(section, key, value)),
    }
}

//! User settings.
//!
//! Loaded from `<config dir>/timesup/settings.yml`. A missing file yields the
//! defaults; a malformed one is an error.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::format::{Item, StrftimeItems};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::SettingsError;

pub const DEFAULT_TICK_INTERVAL_MS: u64 = 100;
const MIN_TICK_INTERVAL_MS: u64 = 10;

/// How the live clock renders the time of day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClockFormat {
    /// `HH:MM:SS.d`
    #[default]
    Millis,
    /// `HH:MM:SS`
    Seconds,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub clock_format: ClockFormat,
    /// Show the countdown to the next ongoing item under the clock
    pub countdown_enabled: bool,
    pub tick_interval_ms: u64,
    /// strftime pattern used when listing due dates
    pub date_format: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            clock_format: ClockFormat::Millis,
            countdown_enabled: true,
            tick_interval_ms: DEFAULT_TICK_INTERVAL_MS,
            date_format: "%Y/%m/%d %H:%M".to_string(),
        }
    }
}

impl Settings {
    /// Load settings from `path`, falling back to defaults if it doesn't exist.
    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        if !path.exists() {
            debug!(path = ?path, "No settings file, using defaults");
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&contents)?)
    }

    pub fn save(&self, path: &Path) -> Result<(), SettingsError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_yaml::to_string(self)?)?;
        Ok(())
    }

    /// The settings file path: `<config dir>/timesup/settings.yml`.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("timesup").join("settings.yml"))
    }

    /// Tick period, never shorter than 10ms.
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(MIN_TICK_INTERVAL_MS))
    }

    /// Set one setting from its textual form.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), SettingsError> {
        let invalid = || SettingsError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
        };

        match key {
            "clock_format" => {
                self.clock_format = match value {
                    "millis" => ClockFormat::Millis,
                    "seconds" => ClockFormat::Seconds,
                    _ => return Err(invalid()),
                }
            }
            "countdown_enabled" => self.countdown_enabled = value.parse().map_err(|_| invalid())?,
            "tick_interval_ms" => self.tick_interval_ms = value.parse().map_err(|_| invalid())?,
            "date_format" => {
                if value.is_empty() || StrftimeItems::new(value).any(|item| matches!(item, Item::Error)) {
                    return Err(invalid());
                }
                self.date_format = value.to_string();
            }
            other => return Err(SettingsError::UnknownKey(other.to_string())),
        }
        Ok(())
    }
}

//! Configuration management for daemon mode
//!
//! Handles TOML configuration parsing, validation, and atomic updates

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::constants::{APP_NAME, CONFIG_FILE_NAME, IPC_SOCKET_NAME, STATE_FILE_NAME};
use crate::daemon::logging::LogLevel;
use crate::models::{clamp_interval_minutes, ConfigError, ScheduleConfig, SourceConfig};
use crate::monitor::EngineConfig;
use crate::state::write_atomically;

/// Keys accepted by [`DaemonConfiguration::apply_update`]
pub const UPDATABLE_KEYS: &[&str] = &[
    "schedule.enabled",
    "schedule.interval_minutes",
    "schedule.action_command",
    "schedule.pre_event_action_command",
    "schedule.delete_old_files",
    "source.directory",
    "source.file_pattern",
];

/// Main daemon configuration structure
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfiguration {
    pub schedule: ScheduleConfig,
    pub source: SourceConfig,
    pub daemon: DaemonSettings,
}

/// Core daemon runtime settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonSettings {
    /// Where the monitor state is persisted
    pub state_path: PathBuf,
    /// Unix socket for runtime control
    pub socket_path: PathBuf,
    /// error, warn, info or debug
    pub log_level: String,
}

impl Default for DaemonSettings {
    fn default() -> Self {
        Self {
            state_path: dirs::data_local_dir()
                .unwrap_or_else(std::env::temp_dir)
                .join(APP_NAME)
                .join(STATE_FILE_NAME),
            socket_path: dirs::runtime_dir()
                .unwrap_or_else(std::env::temp_dir)
                .join(IPC_SOCKET_NAME),
            log_level: LogLevel::Info.as_str().to_string(),
        }
    }
}

impl DaemonConfiguration {
    /// `~/.config/tidewatch/config.toml` or the platform equivalent
    pub fn default_config_path() -> Result<PathBuf> {
        let base = dirs::config_dir().context("Could not determine the configuration directory")?;
        Ok(base.join(APP_NAME).join(CONFIG_FILE_NAME))
    }

    /// Load and validate a configuration file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let mut config: DaemonConfiguration = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        let requested = config.schedule.interval_minutes;
        config.schedule.clamp_interval();
        if requested != config.schedule.interval_minutes {
            log::warn!(
                "interval_minutes = {} is out of range, using {}",
                requested,
                config.schedule.interval_minutes
            );
        }

        config.log_level()?;
        Ok(config)
    }

    /// Load from `path` (or the default location). A missing file yields defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => Self::default_config_path()?,
        };

        if path.exists() {
            Self::load_from_file(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Write the configuration atomically
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize configuration")?;
        write_atomically(path, &content)
    }

    pub fn log_level(&self) -> Result<LogLevel> {
        self.daemon.log_level.parse()
    }

    /// Settings consumed by the monitor engine
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            schedule: self.schedule.clone(),
            source: self.source.clone(),
        }
    }

    /// Make sure the state and socket directories exist
    pub fn ensure_directories(&self) -> Result<()> {
        for path in [&self.daemon.state_path, &self.daemon.socket_path] {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
            }
        }
        Ok(())
    }

    /// Apply one `key=value` update. Returns the old and new values as text.
    pub fn apply_update(&mut self, key: &str, value: &str) -> Result<(String, String), ConfigError> {
        let value = value.trim();
        let change = match key {
            "schedule.enabled" => {
                let new = parse_bool(key, value)?;
                swap_display(&mut self.schedule.enabled, new)
            }
            "schedule.interval_minutes" => {
                let minutes: u32 = value
                    .parse()
                    .map_err(|_| ConfigError::InvalidInterval(value.to_string()))?;
                swap_display(&mut self.schedule.interval_minutes, clamp_interval_minutes(minutes))
            }
            "schedule.action_command" => swap_display(&mut self.schedule.action_command, value.to_string()),
            "schedule.pre_event_action_command" => {
                swap_display(&mut self.schedule.pre_event_action_command, value.to_string())
            }
            "schedule.delete_old_files" => {
                let new = parse_bool(key, value)?;
                swap_display(&mut self.schedule.delete_old_files, new)
            }
            "source.directory" => {
                if value.is_empty() {
                    return Err(invalid(key, value, "a directory path"));
                }
                let old = self.source.directory.display().to_string();
                self.source.directory = PathBuf::from(value);
                (old, value.to_string())
            }
            "source.file_pattern" => {
                glob::Pattern::new(value).map_err(|_| invalid(key, value, "a glob pattern"))?;
                swap_display(&mut self.source.file_pattern, value.to_string())
            }
            _ => return Err(ConfigError::UnknownKey(key.to_string())),
        };
        Ok(change)
    }
}

/// Split a `key=value` argument
pub fn parse_update(arg: &str) -> Result<(String, String), ConfigError> {
    match arg.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => Ok((key.trim().to_string(), value.to_string())),
        _ => Err(ConfigError::MalformedUpdate(arg.to_string())),
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.to_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Ok(true),
        "false" | "no" | "off" | "0" => Ok(false),
        _ => Err(invalid(key, value, "true or false")),
    }
}

fn invalid(key: &str, value: &str, expected: &'static str) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
        expected,
    }
}

fn swap_display<T: ToString>(slot: &mut T, new: T) -> (String, String) {
    let old = std::mem::replace(slot, new);
    (old.to_string(), slot.to_string())
}

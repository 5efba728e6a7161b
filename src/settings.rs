// src/settings.rs

//! # Settings
//!
//! Optional `toolbox.toml` read by the `toolbox` binary. Every key has a
//! default, so a missing file at the default location is not an error.
//!
//! ```toml
//! [runner]
//! default_timeout_secs = 30.0
//! warn_missing_timeout = true
//!
//! [logging]
//! config_file = "~/.config/scripting-toolbox/logging.ini"
//! disable_existing = false
//! encoding = "UTF-8"
//! ```

use crate::constants::{DEFAULT_CONFIG_ENCODING, EXIT_USAGE, SETTINGS_DIR, SETTINGS_FILENAME};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Errors raised while locating or reading `toolbox.toml`.
#[derive(Error, Debug)]
pub enum SettingsError {
    /// The platform has no per-user configuration directory.
    #[error("Could not find system config directory.")]
    ConfigDirNotFound,
    /// The settings file exists but could not be read.
    #[error("Could not read settings file '{path}': {source}")]
    Io {
        /// The settings file.
        path: PathBuf,
        /// The read error.
        #[source]
        source: std::io::Error,
    },
    /// The file is not valid TOML or has values of the wrong type.
    #[error("Failed to parse settings file '{path}': {source}")]
    Parse {
        /// The settings file.
        path: PathBuf,
        /// The TOML error, with position.
        #[source]
        source: toml::de::Error,
    },
    /// `~` or an environment variable in a path could not be expanded.
    #[error("Failed to expand '{value}': {reason}")]
    Expand {
        /// The raw value.
        value: String,
        /// Why expansion failed.
        reason: String,
    },
    /// A value parsed but is out of range.
    #[error("Invalid setting '{key}': {reason}")]
    Invalid {
        /// Dotted key, e.g. `runner.default_timeout_secs`.
        key: String,
        /// What is wrong with the value.
        reason: String,
    },
}

impl SettingsError {
    /// Every settings problem is a usage error.
    pub fn exit_code(&self) -> i32 {
        EXIT_USAGE
    }
}

/// The `[runner]` table.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct RunnerSettings {
    /// Applied to `toolbox run` when no `--timeout` is given.
    pub default_timeout_secs: Option<f64>,
    /// Log a warning when a command runs without any timeout.
    #[serde(default = "default_true")]
    pub warn_missing_timeout: bool,
}

impl Default for RunnerSettings {
    fn default() -> Self {
        Self {
            default_timeout_secs: None,
            warn_missing_timeout: true,
        }
    }
}

impl RunnerSettings {
    /// `default_timeout_secs` as a `Duration`. Values too large for a
    /// `Duration` are treated as no limit.
    pub fn default_timeout(&self) -> Option<Duration> {
        self.default_timeout_secs
            .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
    }
}

/// The `[logging]` table.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct LoggingSettings {
    /// INI file applied at startup instead of `env_logger`.
    pub config_file: Option<PathBuf>,
    /// Passed on as `ConfigureOptions::disable_existing`.
    #[serde(default)]
    pub disable_existing: bool,
    /// Encoding of `config_file`.
    #[serde(default = "default_encoding")]
    pub encoding: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            config_file: None,
            disable_existing: false,
            encoding: default_encoding(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_encoding() -> String {
    DEFAULT_CONFIG_ENCODING.to_string()
}

/// The whole settings file.
#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
pub struct ToolboxSettings {
    /// `[runner]`
    #[serde(default)]
    pub runner: RunnerSettings,
    /// `[logging]`
    #[serde(default)]
    pub logging: LoggingSettings,
}

impl ToolboxSettings {
    /// Reads the settings file at `path`.
    ///
    /// `~` and environment variables in `logging.config_file` are expanded; a
    /// relative result is taken relative to the settings file.
    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        let content = fs::read_to_string(path).map_err(|e| SettingsError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        let mut settings: Self = toml::from_str(&content).map_err(|e| SettingsError::Parse {
            path: path.to_path_buf(),
            source: e,
        })?;
        settings.validate()?;

        if let Some(config_file) = settings.logging.config_file.take() {
            let expanded = expand_path(&config_file)?;
            let resolved = match path.parent() {
                Some(base) if expanded.is_relative() => base.join(expanded),
                _ => expanded,
            };
            settings.logging.config_file = Some(resolved);
        }
        log::debug!("Loaded settings from '{}'", path.display());
        Ok(settings)
    }

    /// Loads `explicit` if given, otherwise the default settings file.
    ///
    /// Only the default file may be absent; its absence yields the defaults.
    pub fn load_or_default(explicit: Option<&Path>) -> Result<Self, SettingsError> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        let path = default_settings_path()?;
        if !path.exists() {
            log::debug!("No settings file at '{}', using defaults", path.display());
            return Ok(Self::default());
        }
        Self::load(&path)
    }

    fn validate(&self) -> Result<(), SettingsError> {
        if let Some(secs) = self.runner.default_timeout_secs {
            if !secs.is_finite() || secs < 0.0 {
                return Err(SettingsError::Invalid {
                    key: "runner.default_timeout_secs".to_string(),
                    reason: format!("expected a non-negative number of seconds, got {}", secs),
                });
            }
        }
        if self.logging.encoding.trim().is_empty() {
            return Err(SettingsError::Invalid {
                key: "logging.encoding".to_string(),
                reason: "must not be empty".to_string(),
            });
        }
        Ok(())
    }
}

/// Returns the default settings file (`<config dir>/scripting-toolbox/toolbox.toml`).
pub fn default_settings_path() -> Result<PathBuf, SettingsError> {
    dirs::config_dir()
        .map(|dir| dir.join(SETTINGS_DIR).join(SETTINGS_FILENAME))
        .ok_or(SettingsError::ConfigDirNotFound)
}

/// Expands `~` and `$VAR`/`${VAR}` in `path`.
pub fn expand_path(path: &Path) -> Result<PathBuf, SettingsError> {
    let raw = path.to_string_lossy();
    let expanded = shellexpand::full(&raw).map_err(|e| SettingsError::Expand {
        value: raw.to_string(),
        reason: e.to_string(),
    })?;
    Ok(PathBuf::from(expanded.into_owned()))
}

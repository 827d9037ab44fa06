//! Human-friendly logging settings
//!
//! Settings live under `[app.log]` in a TOML file and keep their values in
//! the form people write them (`level = "info"`, `rotation = "5 MB"`).
//! [`LogSettings::resolve`] turns them into a [`LogConfig`] and never fails:
//! unreadable values fall back to defaults.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::config::{LogConfig, DEFAULT_BACKUP_COUNT, DEFAULT_ROTATE_MAX_BYTES};
use crate::level::{Level, DEFAULT_LEVEL};

/// Smallest early-startup buffer a settings file may ask for
pub const MIN_BUFFER_CAPACITY: usize = 50;

/// Convert `"5 MB"`, `"10KB"`, `"512 B"` into bytes
///
/// Accepts an unsigned integer, optional whitespace and one of `B`, `KB`,
/// `MB`, `GB` (case-insensitive, powers of 1024). Returns `None` for
/// anything else, including fractions and other units.
pub fn parse_size_to_bytes(value: &str) -> Option<u64> {
    let value = value.trim();
    let digits_end = value
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(value.len());
    if digits_end == 0 {
        return None;
    }
    let (number, unit) = value.split_at(digits_end);
    let number: u64 = number.parse().ok()?;

    let multiplier: u64 = match unit.trim_start().to_ascii_uppercase().as_str() {
        "B" => 1,
        "KB" => 1024,
        "MB" => 1024 * 1024,
        "GB" => 1024 * 1024 * 1024,
        _ => return None,
    };
    number.checked_mul(multiplier)
}

fn default_path() -> String {
    "logs/app.log".to_string()
}

fn default_level() -> String {
    DEFAULT_LEVEL.as_str().to_string()
}

fn default_console() -> bool {
    true
}

fn default_rotation() -> String {
    "5 MB".to_string()
}

fn default_retention() -> usize {
    DEFAULT_BACKUP_COUNT
}

/// Logging settings as written in a settings file
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LogSettings {
    /// Log file path; `~` expands to the home directory
    #[serde(default = "default_path")]
    pub path: String,

    /// Level name, e.g. "INFO" or "debug"
    #[serde(default = "default_level")]
    pub level: String,

    #[serde(default = "default_console")]
    pub console: bool,

    /// Cap on records kept before file logging starts; unset keeps all
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub buffer_capacity: Option<usize>,

    /// Size that triggers rotation, e.g. "5 MB"
    #[serde(default = "default_rotation")]
    pub rotation: String,

    /// Number of rotated backups to keep
    #[serde(default = "default_retention")]
    pub retention: usize,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            path: default_path(),
            level: default_level(),
            console: default_console(),
            buffer_capacity: None,
            rotation: default_rotation(),
            retention: default_retention(),
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct SettingsFile {
    #[serde(default)]
    app: AppSection,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct AppSection {
    #[serde(default)]
    log: LogSettings,
}

impl LogSettings {
    /// Parse the `[app.log]` table of a TOML document
    ///
    /// Other tables are ignored; a missing table yields the defaults.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let file: SettingsFile =
            toml::from_str(content).context("Failed to parse logging settings")?;
        Ok(file.app.log)
    }

    /// Load settings from `path`, or the defaults if it does not exist
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings file {}", path.display()))?;
        Self::from_toml_str(&content)
    }

    /// Render as a TOML document with an `[app.log]` table
    pub fn to_toml_string(&self) -> Result<String> {
        let file = SettingsFile {
            app: AppSection { log: self.clone() },
        };
        toml::to_string_pretty(&file).context("Failed to serialize logging settings")
    }

    /// Level, falling back to INFO for unknown names
    pub fn resolved_level(&self) -> Level {
        Level::resolve(&self.level, DEFAULT_LEVEL)
    }

    /// Rotation threshold, falling back to 5 MiB when unparseable or zero
    pub fn resolved_rotation_bytes(&self) -> u64 {
        match parse_size_to_bytes(&self.rotation) {
            Some(bytes) if bytes > 0 => bytes,
            _ => DEFAULT_ROTATE_MAX_BYTES,
        }
    }

    /// File path with `~` expanded
    pub fn resolved_path(&self) -> PathBuf {
        let path = self.path.trim();
        if path.is_empty() {
            return PathBuf::from(default_path());
        }
        PathBuf::from(shellexpand::tilde(path).into_owned())
    }

    /// Build the configuration for root logger `name`
    pub fn resolve(&self, name: &str) -> LogConfig {
        let name = name.trim();
        LogConfig {
            name: if name.is_empty() {
                LogConfig::default().name
            } else {
                name.to_string()
            },
            level: self.resolved_level(),
            console_enabled: self.console,
            file_path: Some(self.resolved_path()),
            rotation_max_bytes: self.resolved_rotation_bytes(),
            rotation_backup_count: self.retention,
            buffer_capacity: self
                .buffer_capacity
                .map(|capacity| capacity.max(MIN_BUFFER_CAPACITY)),
        }
    }
}

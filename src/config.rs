//! Logging configuration consumed by the lifecycle manager

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{LogError, Result};
use crate::level::{Level, DEFAULT_LEVEL};

/// Root logger name used when none is configured
pub const DEFAULT_ROOT_NAME: &str = "app";

/// Default rotation threshold (5 MiB)
pub const DEFAULT_ROTATE_MAX_BYTES: u64 = 5 * 1024 * 1024;

/// Default number of rotated backups kept next to the active file
pub const DEFAULT_BACKUP_COUNT: usize = 3;

/// When and how far the active log file is rotated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RotationPolicy {
    /// Size threshold of the active file in bytes
    pub max_bytes: u64,
    /// Number of numbered backups to keep (`app.log.1` .. `app.log.N`)
    pub backup_count: usize,
}

impl RotationPolicy {
    /// Create a policy, rejecting a zero size threshold
    pub fn new(max_bytes: u64, backup_count: usize) -> Result<Self> {
        let policy = Self {
            max_bytes,
            backup_count,
        };
        policy.validate()?;
        Ok(policy)
    }

    /// Check that the policy can be applied
    pub fn validate(&self) -> Result<()> {
        if self.max_bytes == 0 {
            return Err(LogError::config("rotation max_bytes must be greater than zero"));
        }
        Ok(())
    }
}

impl Default for RotationPolicy {
    fn default() -> Self {
        Self {
            max_bytes: DEFAULT_ROTATE_MAX_BYTES,
            backup_count: DEFAULT_BACKUP_COUNT,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogConfig {
    /// Name of the root logger
    #[serde(default = "default_name")]
    pub name: String,

    /// Minimum level for the root logger and every managed sink
    #[serde(default = "default_level")]
    pub level: Level,

    /// Whether records are also printed to stdout
    #[serde(default = "default_console_enabled")]
    pub console_enabled: bool,

    /// Log file used by `enable_file_logging_from_config`
    #[serde(default)]
    pub file_path: Option<PathBuf>,

    /// Size threshold of the active log file in bytes
    #[serde(default = "default_rotation_max_bytes")]
    pub rotation_max_bytes: u64,

    /// Number of rotated backups to keep
    #[serde(default = "default_rotation_backup_count")]
    pub rotation_backup_count: usize,

    /// Capacity of the early-startup buffer; `None` keeps every record
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub buffer_capacity: Option<usize>,
}

fn default_name() -> String {
    DEFAULT_ROOT_NAME.to_string()
}

fn default_level() -> Level {
    DEFAULT_LEVEL
}

fn default_console_enabled() -> bool {
    true
}

fn default_rotation_max_bytes() -> u64 {
    DEFAULT_ROTATE_MAX_BYTES
}

fn default_rotation_backup_count() -> usize {
    DEFAULT_BACKUP_COUNT
}

/// Default log file location, relative to the working directory
pub fn default_log_file() -> PathBuf {
    Path::new("logs").join("app.log")
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            level: default_level(),
            console_enabled: default_console_enabled(),
            file_path: Some(default_log_file()),
            rotation_max_bytes: default_rotation_max_bytes(),
            rotation_backup_count: default_rotation_backup_count(),
            buffer_capacity: None,
        }
    }
}

impl LogConfig {
    /// Default configuration for a named root logger
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Rotation policy described by this configuration
    pub fn rotation_policy(&self) -> RotationPolicy {
        RotationPolicy {
            max_bytes: self.rotation_max_bytes,
            backup_count: self.rotation_backup_count,
        }
    }

    /// Log file to use when no explicit path is given
    pub fn file_path_or_default(&self) -> PathBuf {
        self.file_path.clone().unwrap_or_else(default_log_file)
    }

    /// Reject values the lifecycle manager cannot apply
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(LogError::config("root logger name must not be empty"));
        }
        if self.buffer_capacity == Some(0) {
            return Err(LogError::config(
                "buffer_capacity must be greater than zero (use none for unbounded)",
            ));
        }
        self.rotation_policy().validate()
    }
}

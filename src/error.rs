//! Error taxonomy for the logging subsystem
//!
//! Configuration mistakes are reported to the caller of a lifecycle
//! operation. Write failures are absorbed at the dispatch boundary and only
//! degrade the sink that produced them.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::sink::SinkKind;

/// Errors produced by sinks and lifecycle operations
#[derive(Debug, Error)]
pub enum LogError {
    /// Invalid level, rotation or buffer values
    #[error("invalid logging configuration: {0}")]
    Configuration(String),

    /// The sink's medium rejected a write (disk full, closed pipe, ...)
    #[error("{sink} sink write failed: {source}")]
    Write {
        sink: SinkKind,
        #[source]
        source: io::Error,
    },

    /// A log file could not be opened or created
    #[error("failed to open log file {}: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Another open sink already writes to this path
    #[error("log file {} is already held by another sink", .0.display())]
    PathInUse(PathBuf),

    /// `accept` was called after `close`
    #[error("sink is closed")]
    ClosedSink,
}

impl LogError {
    /// Shorthand for a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        LogError::Configuration(message.into())
    }

    /// Wrap an I/O error raised while writing to `sink`
    pub fn write(sink: SinkKind, source: io::Error) -> Self {
        LogError::Write { sink, source }
    }

    /// Whether this error should degrade the sink that produced it
    pub fn is_write_failure(&self) -> bool {
        matches!(self, LogError::Write { .. })
    }
}

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, LogError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_message() {
        let err = LogError::config("rotation_max_bytes must be greater than zero");
        assert_eq!(
            err.to_string(),
            "invalid logging configuration: rotation_max_bytes must be greater than zero"
        );
        assert!(!err.is_write_failure());
    }

    #[test]
    fn test_write_error_mentions_sink() {
        let err = LogError::write(
            SinkKind::RotatingFile,
            io::Error::new(io::ErrorKind::Other, "no space left on device"),
        );
        assert!(err.is_write_failure());
        assert!(err.to_string().starts_with("rotating-file sink write failed"));
    }

    #[test]
    fn test_path_in_use_message() {
        let err = LogError::PathInUse(PathBuf::from("/tmp/app.log"));
        assert_eq!(
            err.to_string(),
            "log file /tmp/app.log is already held by another sink"
        );
    }
}

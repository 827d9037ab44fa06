//! Log records and their line formats

use std::borrow::Cow;
use std::collections::BTreeMap;

use chrono::{DateTime, Local, SecondsFormat, Utc};
use serde_json::Value;

use crate::level::Level;

/// Structured key/value fields attached to a record
pub type Fields = BTreeMap<String, Value>;

/// Escape line breaks so one record stays on one line
fn single_line(message: &str) -> Cow<'_, str> {
    if !message.contains(['\n', '\r']) {
        return Cow::Borrowed(message);
    }
    Cow::Owned(message.replace('\r', "\\r").replace('\n', "\\n"))
}

/// A single log record
///
/// Records are created once per log call and shared read-only with every
/// attached sink.
#[derive(Debug, Clone, PartialEq)]
pub struct LogRecord {
    /// When the record was created
    pub timestamp: DateTime<Utc>,
    /// Name of the logger that produced the record
    pub logger: String,
    /// Severity
    pub level: Level,
    /// Log message
    pub message: String,
    /// Optional structured fields
    pub fields: Fields,
}

impl LogRecord {
    /// Create a new record stamped with the current time
    pub fn new(level: Level, logger: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            logger: logger.into(),
            level,
            message: message.into(),
            fields: Fields::new(),
        }
    }

    /// Attach structured fields
    pub fn with_fields(mut self, fields: Fields) -> Self {
        self.fields = fields;
        self
    }

    /// Format as a log file line (without trailing newline)
    ///
    /// `<timestamp> <LEVEL> <logger> <message>[ <fields>]`
    pub fn file_line(&self) -> String {
        let mut line = format!(
            "{} {} {} {}",
            self.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
            self.level,
            self.logger,
            single_line(&self.message)
        );
        self.push_fields(&mut line);
        line
    }

    /// Format for terminal output, using the local wall clock
    pub fn console_line(&self) -> String {
        let local: DateTime<Local> = self.timestamp.with_timezone(&Local);
        let mut line = format!(
            "{} | {} | {} | {}",
            local.format("%H:%M:%S"),
            self.level,
            self.logger,
            single_line(&self.message)
        );
        self.push_fields(&mut line);
        line
    }

    fn push_fields(&self, line: &mut String) {
        if self.fields.is_empty() {
            return;
        }
        // BTreeMap<String, Value> always serializes
        if let Ok(json) = serde_json::to_string(&self.fields) {
            line.push(' ');
            line.push_str(&json);
        }
    }
}

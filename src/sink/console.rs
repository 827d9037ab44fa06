//! Terminal output

use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use crate::error::{LogError, Result};
use crate::level::{AtomicLevel, Level};
use crate::record::LogRecord;

use super::{Sink, SinkKind};

/// Prints records to stdout (or any injected writer)
pub struct ConsoleSink {
    level: AtomicLevel,
    out: Mutex<Box<dyn Write + Send>>,
    closed: AtomicBool,
    degraded: AtomicBool,
}

impl ConsoleSink {
    /// Console sink writing to stdout
    pub fn stdout(level: Level) -> Self {
        Self::with_writer(level, Box::new(io::stdout()))
    }

    /// Console sink writing to an arbitrary writer
    pub fn with_writer(level: Level, out: Box<dyn Write + Send>) -> Self {
        Self {
            level: AtomicLevel::new(level),
            out: Mutex::new(out),
            closed: AtomicBool::new(false),
            degraded: AtomicBool::new(false),
        }
    }
}

impl Sink for ConsoleSink {
    fn kind(&self) -> SinkKind {
        SinkKind::Console
    }

    fn level(&self) -> Level {
        self.level.get()
    }

    fn set_level(&self, level: Level) {
        self.level.set(level);
    }

    fn accept(&self, record: &LogRecord) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(LogError::ClosedSink);
        }
        if record.level < self.level() || self.degraded.load(Ordering::Acquire) {
            return Ok(());
        }

        let line = record.console_line();
        let Ok(mut out) = self.out.lock() else {
            return Ok(());
        };
        if let Err(e) = writeln!(out, "{}", line) {
            self.degraded.store(true, Ordering::Release);
            return Err(LogError::write(SinkKind::Console, e));
        }
        Ok(())
    }

    fn flush(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Ok(());
        }
        if let Ok(mut out) = self.out.lock() {
            out.flush()
                .map_err(|e| LogError::write(SinkKind::Console, e))?;
        }
        Ok(())
    }

    fn close(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Ok(());
        }
        // stdout is never closed, only flushed
        let flushed = self.flush();
        self.closed.store(true, Ordering::Release);
        flushed
    }

    fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::Acquire)
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::testing::SharedWriter;

    #[test]
    fn test_console_filters_below_level() {
        let writer = SharedWriter::default();
        let sink = ConsoleSink::with_writer(Level::Warning, Box::new(writer.clone()));

        sink.accept(&LogRecord::new(Level::Info, "app", "quiet")).unwrap();
        sink.accept(&LogRecord::new(Level::Error, "app", "loud")).unwrap();

        let output = writer.contents();
        assert!(!output.contains("quiet"));
        assert!(output.contains("| ERROR | app | loud"));
    }

    #[test]
    fn test_console_close_is_idempotent() {
        let sink = ConsoleSink::with_writer(Level::Debug, Box::new(SharedWriter::default()));
        sink.close().unwrap();
        sink.close().unwrap();
        assert!(sink.is_closed());
        assert!(sink.flush().is_ok());
        assert!(matches!(
            sink.accept(&LogRecord::new(Level::Info, "app", "late")),
            Err(LogError::ClosedSink)
        ));
    }

    #[test]
    fn test_console_set_level() {
        let writer = SharedWriter::default();
        let sink = ConsoleSink::with_writer(Level::Error, Box::new(writer.clone()));
        sink.set_level(Level::Debug);
        sink.accept(&LogRecord::new(Level::Debug, "app", "now visible")).unwrap();
        assert!(writer.contents().contains("now visible"));
    }
}

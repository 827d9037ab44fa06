//! Destinations for log records
//!
//! Every sink filters by its own minimum level, can be flushed at any time
//! and closed any number of times. Sinks are shared as `Arc<dyn Sink>` and
//! use interior mutability, so all methods take `&self`.

mod console;
mod memory;
mod null;
mod retention;
mod rotating;

use std::fmt;

pub use console::ConsoleSink;
pub use memory::{DrainReport, MemoryBufferSink};
pub use null::NullSink;
pub use retention::{backup_path, prune_backups};
pub use rotating::RotatingFileSink;

use crate::error::Result;
use crate::level::Level;
use crate::record::LogRecord;

/// Which kind of destination a sink is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SinkKind {
    Null,
    Console,
    MemoryBuffer,
    RotatingFile,
    /// Attached by the host application
    External,
}

impl SinkKind {
    /// Get the display name for this kind
    pub fn as_str(&self) -> &'static str {
        match self {
            SinkKind::Null => "null",
            SinkKind::Console => "console",
            SinkKind::MemoryBuffer => "memory-buffer",
            SinkKind::RotatingFile => "rotating-file",
            SinkKind::External => "external",
        }
    }
}

impl fmt::Display for SinkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A destination for log records
pub trait Sink: Send + Sync {
    /// Kind tag used for diagnostics and inspection
    fn kind(&self) -> SinkKind;

    /// Minimum level this sink accepts
    fn level(&self) -> Level;

    /// Replace the minimum level
    fn set_level(&self, level: Level);

    /// Offer a record
    ///
    /// Records below the sink's level are filtered and return `Ok`.
    /// Fails with `LogError::Write` when the medium is unavailable and with
    /// `LogError::ClosedSink` after `close`.
    fn accept(&self, record: &LogRecord) -> Result<()>;

    /// Force buffered output to the medium; a no-op once closed
    fn flush(&self) -> Result<()>;

    /// Release underlying resources; calling it again is a no-op
    fn close(&self) -> Result<()>;

    /// Whether an earlier write failure turned this sink into a no-op
    fn is_degraded(&self) -> bool {
        false
    }

    /// Whether `close` has been called
    fn is_closed(&self) -> bool;
}

#[cfg(test)]
pub(crate) mod testing {
    //! Sinks used by tests across the crate

    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;

    use super::*;
    use crate::error::LogError;
    use crate::level::AtomicLevel;

    /// Records everything it accepts
    pub struct CollectingSink {
        level: AtomicLevel,
        pub records: Mutex<Vec<LogRecord>>,
        closed: AtomicBool,
        pub close_calls: AtomicUsize,
    }

    impl CollectingSink {
        pub fn new(level: Level) -> Self {
            Self {
                level: AtomicLevel::new(level),
                records: Mutex::new(Vec::new()),
                closed: AtomicBool::new(false),
                close_calls: AtomicUsize::new(0),
            }
        }

        pub fn messages(&self) -> Vec<String> {
            self.records
                .lock()
                .unwrap()
                .iter()
                .map(|r| r.message.clone())
                .collect()
        }
    }

    impl Sink for CollectingSink {
        fn kind(&self) -> SinkKind {
            SinkKind::External
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
            if record.level >= self.level() {
                self.records.lock().unwrap().push(record.clone());
            }
            Ok(())
        }

        fn flush(&self) -> Result<()> {
            Ok(())
        }

        fn close(&self) -> Result<()> {
            self.close_calls.fetch_add(1, Ordering::AcqRel);
            self.closed.store(true, Ordering::Release);
            Ok(())
        }

        fn is_closed(&self) -> bool {
            self.closed.load(Ordering::Acquire)
        }
    }

    /// Fails the first write, then behaves as a degraded no-op
    pub struct FailingSink {
        degraded: AtomicBool,
        pub attempts: AtomicUsize,
    }

    impl FailingSink {
        pub fn new() -> Self {
            Self {
                degraded: AtomicBool::new(false),
                attempts: AtomicUsize::new(0),
            }
        }
    }

    impl Sink for FailingSink {
        fn kind(&self) -> SinkKind {
            SinkKind::External
        }

        fn level(&self) -> Level {
            Level::Debug
        }

        fn set_level(&self, _level: Level) {}

        fn accept(&self, _record: &LogRecord) -> Result<()> {
            self.attempts.fetch_add(1, Ordering::AcqRel);
            if self.degraded.swap(true, Ordering::AcqRel) {
                return Ok(());
            }
            Err(LogError::write(
                SinkKind::External,
                std::io::Error::new(std::io::ErrorKind::Other, "no space left on device"),
            ))
        }

        fn flush(&self) -> Result<()> {
            Ok(())
        }

        fn close(&self) -> Result<()> {
            Ok(())
        }

        fn is_degraded(&self) -> bool {
            self.degraded.load(Ordering::Acquire)
        }

        fn is_closed(&self) -> bool {
            false
        }
    }

    /// An in-memory writer that can be shared with a `ConsoleSink`
    #[derive(Clone, Default)]
    pub struct SharedWriter(pub std::sync::Arc<Mutex<Vec<u8>>>);

    impl SharedWriter {
        pub fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    impl std::io::Write for SharedWriter {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }
}

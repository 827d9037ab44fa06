//! In-memory buffer for records emitted before a log file exists
//!
//! Holds records in insertion order until they can be drained, exactly once,
//! into a durable sink.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

use crate::error::{LogError, Result};
use crate::level::{AtomicLevel, Level};
use crate::record::LogRecord;

use super::{Sink, SinkKind};

/// Outcome of draining a buffer into another sink
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DrainReport {
    /// Records handed to the target (including the eviction notice)
    pub delivered: usize,
    /// Records the target refused with an error
    pub failed: usize,
    /// Records lost to the capacity limit before the drain
    pub evicted: usize,
}

#[derive(Debug, Default)]
struct BufferState {
    records: VecDeque<LogRecord>,
    evicted: usize,
    drained: bool,
}

/// Ordered buffer of records with optional capacity
pub struct MemoryBufferSink {
    level: AtomicLevel,
    /// Maximum records kept; the oldest is evicted when full
    capacity: Option<usize>,
    state: RwLock<BufferState>,
    closed: AtomicBool,
}

impl MemoryBufferSink {
    /// Create a buffer; `None` keeps every record
    pub fn new(level: Level, capacity: Option<usize>) -> Self {
        let initial = capacity.unwrap_or(0).min(1024);
        Self {
            level: AtomicLevel::new(level),
            capacity,
            state: RwLock::new(BufferState {
                records: VecDeque::with_capacity(initial),
                ..BufferState::default()
            }),
            closed: AtomicBool::new(false),
        }
    }

    /// Number of buffered records
    pub fn len(&self) -> usize {
        self.state.read().map(|s| s.records.len()).unwrap_or(0)
    }

    /// Check if the buffer is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Records evicted by the capacity limit so far
    pub fn evicted(&self) -> usize {
        self.state.read().map(|s| s.evicted).unwrap_or(0)
    }

    /// Whether `drain` has already run
    pub fn is_drained(&self) -> bool {
        self.state.read().map(|s| s.drained).unwrap_or(true)
    }

    /// Snapshot of the buffered records
    pub fn records(&self) -> Vec<LogRecord> {
        self.state
            .read()
            .map(|s| s.records.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Deliver every buffered record to `target` in insertion order, then clear
    ///
    /// Only the first call delivers anything. If the capacity limit evicted
    /// records, a WARNING record saying how many is delivered first.
    pub fn drain(&self, target: &dyn Sink) -> DrainReport {
        let (records, evicted) = {
            let Ok(mut state) = self.state.write() else {
                return DrainReport::default();
            };
            if state.drained {
                return DrainReport::default();
            }
            state.drained = true;
            (std::mem::take(&mut state.records), state.evicted)
        };

        let mut report = DrainReport {
            evicted,
            ..DrainReport::default()
        };

        let notice = (evicted > 0).then(|| {
            let logger = records
                .front()
                .map(|r| r.logger.clone())
                .unwrap_or_default();
            let mut notice = LogRecord::new(
                Level::Warning,
                logger,
                format!("{} early log records were dropped before file logging started", evicted),
            );
            if let Some(first) = records.front() {
                notice.timestamp = first.timestamp;
            }
            notice
        });

        for record in notice.iter().chain(records.iter()) {
            match target.accept(record) {
                Ok(()) => report.delivered += 1,
                Err(_) => report.failed += 1,
            }
        }
        report
    }
}

impl Sink for MemoryBufferSink {
    fn kind(&self) -> SinkKind {
        SinkKind::MemoryBuffer
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
        if record.level < self.level() {
            return Ok(());
        }

        if let Ok(mut state) = self.state.write() {
            // A drained buffer is spent
            if state.drained {
                return Ok(());
            }
            if let Some(capacity) = self.capacity {
                if state.records.len() >= capacity {
                    state.records.pop_front();
                    state.evicted += 1;
                }
            }
            state.records.push_back(record.clone());
        }
        Ok(())
    }

    fn flush(&self) -> Result<()> {
        // Nothing to flush until there is a target
        Ok(())
    }

    fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        if let Ok(mut state) = self.state.write() {
            state.records.clear();
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::testing::CollectingSink;

    fn record(message: &str) -> LogRecord {
        LogRecord::new(Level::Info, "app", message)
    }

    #[test]
    fn test_buffer_preserves_insertion_order() {
        let buffer = MemoryBufferSink::new(Level::Debug, None);
        buffer.accept(&record("message 1")).unwrap();
        buffer.accept(&record("message 2")).unwrap();
        buffer.accept(&record("message 3")).unwrap();

        let messages: Vec<String> = buffer.records().into_iter().map(|r| r.message).collect();
        assert_eq!(messages, vec!["message 1", "message 2", "message 3"]);
    }

    #[test]
    fn test_buffer_filters_below_level() {
        let buffer = MemoryBufferSink::new(Level::Warning, None);
        buffer
            .accept(&LogRecord::new(Level::Debug, "app", "noise"))
            .unwrap();
        buffer
            .accept(&LogRecord::new(Level::Error, "app", "signal"))
            .unwrap();
        assert_eq!(buffer.len(), 1);
    }

    #[test]
    fn test_buffer_capacity_evicts_oldest() {
        let buffer = MemoryBufferSink::new(Level::Debug, Some(3));

        for i in 0..5 {
            buffer.accept(&record(&format!("msg {}", i))).unwrap();
        }

        assert_eq!(buffer.len(), 3);
        assert_eq!(buffer.evicted(), 2);
        let entries = buffer.records();
        assert_eq!(entries[0].message, "msg 2");
        assert_eq!(entries[1].message, "msg 3");
        assert_eq!(entries[2].message, "msg 4");
    }

    #[test]
    fn test_drain_delivers_in_order_and_clears() {
        let buffer = MemoryBufferSink::new(Level::Debug, None);
        let target = CollectingSink::new(Level::Debug);
        buffer.accept(&record("first")).unwrap();
        buffer.accept(&record("second")).unwrap();

        let report = buffer.drain(&target);

        assert_eq!(report.delivered, 2);
        assert_eq!(report.evicted, 0);
        assert_eq!(target.messages(), vec!["first", "second"]);
        assert!(buffer.is_empty());
        assert!(buffer.is_drained());
    }

    #[test]
    fn test_drain_is_one_shot() {
        let buffer = MemoryBufferSink::new(Level::Debug, None);
        let target = CollectingSink::new(Level::Debug);
        buffer.accept(&record("only once")).unwrap();

        buffer.drain(&target);
        // Accepts after the drain do not resurrect the buffer
        buffer.accept(&record("late")).unwrap();
        let second = buffer.drain(&target);

        assert_eq!(second, DrainReport::default());
        assert_eq!(target.messages(), vec!["only once"]);
    }

    #[test]
    fn test_drain_announces_evicted_records() {
        let buffer = MemoryBufferSink::new(Level::Debug, Some(2));
        let target = CollectingSink::new(Level::Debug);
        for i in 0..4 {
            buffer.accept(&record(&format!("msg {}", i))).unwrap();
        }

        let report = buffer.drain(&target);

        assert_eq!(report.evicted, 2);
        assert_eq!(report.delivered, 3);
        let messages = target.messages();
        assert!(messages[0].starts_with("2 early log records were dropped"));
        assert_eq!(&messages[1..], &["msg 2", "msg 3"]);
    }

    #[test]
    fn test_drain_respects_target_level() {
        let buffer = MemoryBufferSink::new(Level::Debug, None);
        let target = CollectingSink::new(Level::Error);
        buffer
            .accept(&LogRecord::new(Level::Debug, "app", "debug"))
            .unwrap();
        buffer
            .accept(&LogRecord::new(Level::Error, "app", "error"))
            .unwrap();

        buffer.drain(&target);
        assert_eq!(target.messages(), vec!["error"]);
    }

    #[test]
    fn test_close_is_idempotent_and_rejects_accept() {
        let buffer = MemoryBufferSink::new(Level::Debug, None);
        buffer.accept(&record("discarded")).unwrap();
        buffer.close().unwrap();
        buffer.close().unwrap();

        assert!(buffer.is_empty());
        assert!(buffer.flush().is_ok());
        assert!(matches!(
            buffer.accept(&record("late")),
            Err(LogError::ClosedSink)
        ));
    }
}

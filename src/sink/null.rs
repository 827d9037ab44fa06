//! Sink that discards everything

use crate::error::Result;
use crate::level::Level;
use crate::record::LogRecord;

use super::{Sink, SinkKind};

/// A sink that discards all records and never fails
///
/// Attached to the root before bootstrap and after shutdown so that log
/// calls always have somewhere to go.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl Sink for NullSink {
    fn kind(&self) -> SinkKind {
        SinkKind::Null
    }

    fn level(&self) -> Level {
        Level::Debug
    }

    fn set_level(&self, _level: Level) {}

    #[inline]
    fn accept(&self, _record: &LogRecord) -> Result<()> {
        Ok(())
    }

    fn flush(&self) -> Result<()> {
        Ok(())
    }

    fn close(&self) -> Result<()> {
        Ok(())
    }

    fn is_closed(&self) -> bool {
        false
    }
}

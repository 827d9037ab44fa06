//! Named logger tree
//!
//! One root logger per application name owns every sink. All other names
//! are direct children of the root: they own no sinks, optionally filter by
//! their own level and always propagate to the root, which never forwards
//! records anywhere else.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockWriteGuard};

use crate::error::LogError;
use crate::level::{AtomicLevel, Level};
use crate::record::{Fields, LogRecord};
use crate::sink::{NullSink, Sink, SinkKind};

/// The root logger and the sinks attached to it
pub(crate) struct RootLogger {
    name: String,
    level: AtomicLevel,
    sinks: RwLock<Vec<Arc<dyn Sink>>>,
}

impl RootLogger {
    fn new(name: String) -> Self {
        Self {
            name,
            level: AtomicLevel::new(Level::Debug),
            sinks: RwLock::new(vec![Arc::new(NullSink) as Arc<dyn Sink>]),
        }
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn level(&self) -> Level {
        self.level.get()
    }

    pub(crate) fn set_level(&self, level: Level) {
        self.level.set(level);
    }

    /// Offer `record` to every attached sink in attachment order
    ///
    /// Sink failures are reported and absorbed; this never fails.
    pub(crate) fn dispatch(&self, record: &LogRecord) {
        if record.level < self.level() {
            return;
        }
        let Ok(sinks) = self.sinks.read() else {
            return;
        };
        for (index, sink) in sinks.iter().enumerate() {
            if let Err(err) = sink.accept(record) {
                report_sink_failure(&sinks, index, &err, record);
            }
        }
    }

    /// Exclusive access to the sink list for structural changes
    ///
    /// Dispatch blocks while the guard is held, so keep the section short.
    pub(crate) fn sinks_mut(&self) -> RwLockWriteGuard<'_, Vec<Arc<dyn Sink>>> {
        self.sinks
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub(crate) fn sinks(&self) -> Vec<Arc<dyn Sink>> {
        self.sinks
            .read()
            .map(|s| s.clone())
            .unwrap_or_default()
    }
}

/// Tell someone that a sink failed, once, without raising
fn report_sink_failure(
    sinks: &[Arc<dyn Sink>],
    failed: usize,
    err: &LogError,
    record: &LogRecord,
) {
    let kind = sinks[failed].kind();
    if matches!(err, LogError::ClosedSink) {
        tracing::error!("Record offered to closed {} sink on logger {}", kind, record.logger);
        return;
    }

    let console = sinks
        .iter()
        .enumerate()
        .find(|(i, s)| *i != failed && s.kind() == SinkKind::Console && !s.is_degraded())
        .map(|(_, s)| s);

    let diagnostic = format!("{} sink failed and was disabled: {}", kind, err);
    match console {
        Some(console) => {
            let notice = LogRecord::new(Level::Error, record.logger.clone(), diagnostic);
            if console.accept(&notice).is_err() {
                tracing::warn!("{}", notice.message);
            }
        }
        None => tracing::warn!("{}", diagnostic),
    }
}

/// A named child logger
struct ChildLogger {
    name: String,
    level: RwLock<Option<Level>>,
}

/// Handle used to emit records
///
/// Cheap to clone. Handles for the same name share their level setting.
#[derive(Clone)]
pub struct Logger {
    child: Option<Arc<ChildLogger>>,
    root: Arc<RootLogger>,
}

impl Logger {
    /// Full name of this logger
    pub fn name(&self) -> &str {
        match &self.child {
            Some(child) => &child.name,
            None => self.root.name(),
        }
    }

    /// Whether this is the root logger
    pub fn is_root(&self) -> bool {
        self.child.is_none()
    }

    /// Whether records are forwarded to a parent
    ///
    /// Children always forward to the root; the root forwards nowhere.
    pub fn propagates(&self) -> bool {
        !self.is_root()
    }

    /// This logger's own level; `None` for a child that defers to the root
    pub fn level(&self) -> Option<Level> {
        match &self.child {
            Some(child) => child.level.read().map(|l| *l).unwrap_or(None),
            None => Some(self.root.level()),
        }
    }

    /// Set this logger's own level
    ///
    /// For the root, `None` means "accept everything".
    pub fn set_level(&self, level: Option<Level>) {
        match &self.child {
            Some(child) => {
                if let Ok(mut current) = child.level.write() {
                    *current = level;
                }
            }
            None => self.root.set_level(level.unwrap_or(Level::Debug)),
        }
    }

    /// Whether a record at `level` would reach the root's sinks
    pub fn is_enabled_for(&self, level: Level) -> bool {
        let local = self.level().unwrap_or(Level::Debug);
        level >= local && level >= self.root.level()
    }

    /// Emit a record
    pub fn log(&self, level: Level, message: impl Into<String>) {
        self.log_with(level, message, Fields::new());
    }

    /// Emit a record with structured fields
    pub fn log_with(&self, level: Level, message: impl Into<String>, fields: Fields) {
        if let Some(child) = &self.child {
            let local = child.level.read().map(|l| *l).unwrap_or(None);
            if local.map_or(false, |min| level < min) {
                return;
            }
        }
        let record = LogRecord::new(level, self.name(), message).with_fields(fields);
        self.root.dispatch(&record);
    }

    pub fn debug(&self, message: impl Into<String>) {
        self.log(Level::Debug, message);
    }

    pub fn info(&self, message: impl Into<String>) {
        self.log(Level::Info, message);
    }

    pub fn warning(&self, message: impl Into<String>) {
        self.log(Level::Warning, message);
    }

    pub fn error(&self, message: impl Into<String>) {
        self.log(Level::Error, message);
    }

    pub fn critical(&self, message: impl Into<String>) {
        self.log(Level::Critical, message);
    }
}

impl std::fmt::Debug for Logger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Logger")
            .field("name", &self.name())
            .field("level", &self.level())
            .field("propagates", &self.propagates())
            .finish()
    }
}

/// Two-level map from logger names to the single root
pub struct Registry {
    root: Arc<RootLogger>,
    children: RwLock<HashMap<String, Arc<ChildLogger>>>,
}

impl Registry {
    /// Create a registry whose root owns only a `NullSink`
    pub fn new(root_name: impl Into<String>) -> Self {
        Self {
            root: Arc::new(RootLogger::new(root_name.into())),
            children: RwLock::new(HashMap::new()),
        }
    }

    /// Name of the root logger
    pub fn root_name(&self) -> &str {
        self.root.name()
    }

    /// The root logger
    pub fn root(&self) -> Logger {
        Logger {
            child: None,
            root: Arc::clone(&self.root),
        }
    }

    /// Logger for `name`, created on first request
    ///
    /// An empty name or the root's own name returns the root.
    pub fn get_logger(&self, name: &str) -> Logger {
        let name = name.trim();
        if name.is_empty() || name == self.root.name() {
            return self.root();
        }

        if let Some(child) = self.children.read().ok().and_then(|c| c.get(name).cloned()) {
            return Logger {
                child: Some(child),
                root: Arc::clone(&self.root),
            };
        }

        let child = match self.children.write() {
            Ok(mut children) => Arc::clone(children.entry(name.to_string()).or_insert_with(|| {
                Arc::new(ChildLogger {
                    name: name.to_string(),
                    level: RwLock::new(None),
                })
            })),
            Err(_) => Arc::new(ChildLogger {
                name: name.to_string(),
                level: RwLock::new(None),
            }),
        };
        Logger {
            child: Some(child),
            root: Arc::clone(&self.root),
        }
    }

    /// Kinds of the sinks attached to the root, in attachment order
    pub fn sink_kinds(&self) -> Vec<SinkKind> {
        self.root.sinks().iter().map(|s| s.kind()).collect()
    }

    /// Number of attached sinks of `kind`
    pub fn count_sinks(&self, kind: SinkKind) -> usize {
        self.sink_kinds().into_iter().filter(|k| *k == kind).count()
    }

    pub(crate) fn root_logger(&self) -> &Arc<RootLogger> {
        &self.root
    }

    pub(crate) fn forget_children(&self) {
        if let Ok(mut children) = self.children.write() {
            children.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::testing::{CollectingSink, FailingSink, SharedWriter};
    use crate::sink::ConsoleSink;

    fn registry_with_collector(level: Level) -> (Registry, Arc<CollectingSink>) {
        let registry = Registry::new("app");
        let collector = Arc::new(CollectingSink::new(level));
        {
            let mut sinks = registry.root_logger().sinks_mut();
            sinks.clear();
            sinks.push(collector.clone());
        }
        (registry, collector)
    }

    #[test]
    fn test_empty_name_returns_root() {
        let registry = Registry::new("app");
        assert!(registry.get_logger("").is_root());
        assert!(registry.get_logger("app").is_root());
        assert_eq!(registry.get_logger("").name(), "app");
    }

    #[test]
    fn test_root_owns_null_sink_before_bootstrap() {
        let registry = Registry::new("app");
        assert_eq!(registry.sink_kinds(), vec![SinkKind::Null]);

        // Must not panic or print anything
        registry.get_logger("x").info("before bootstrap");
        registry.root().critical("before bootstrap");
    }

    #[test]
    fn test_child_propagates_to_root_sinks() {
        let (registry, collector) = registry_with_collector(Level::Debug);
        let child = registry.get_logger("app.module");

        assert!(child.propagates());
        assert!(!registry.root().propagates());

        child.info("from child");
        assert_eq!(collector.messages(), vec!["from child"]);
    }

    #[test]
    fn test_child_records_carry_child_name() {
        let (registry, collector) = registry_with_collector(Level::Debug);
        registry.get_logger("app.ui.pages").warning("careful");

        let records = collector.records.lock().unwrap();
        assert_eq!(records[0].logger, "app.ui.pages");
        assert_eq!(records[0].level, Level::Warning);
    }

    #[test]
    fn test_same_name_shares_level() {
        let registry = Registry::new("app");
        let a = registry.get_logger("app.db");
        let b = registry.get_logger("app.db");
        a.set_level(Some(Level::Error));
        assert_eq!(b.level(), Some(Level::Error));
    }

    #[test]
    fn test_child_level_is_checked_locally() {
        let (registry, collector) = registry_with_collector(Level::Debug);
        let child = registry.get_logger("app.noisy");
        child.set_level(Some(Level::Warning));

        child.info("suppressed");
        child.error("kept");

        assert_eq!(collector.messages(), vec!["kept"]);
        assert!(!child.is_enabled_for(Level::Info));
    }

    #[test]
    fn test_root_level_is_authoritative() {
        let (registry, collector) = registry_with_collector(Level::Debug);
        registry.root().set_level(Some(Level::Error));
        let child = registry.get_logger("app.verbose");
        child.set_level(Some(Level::Debug));

        child.debug("child allows, root refuses");
        child.critical("both allow");

        assert_eq!(collector.messages(), vec!["both allow"]);
    }

    #[test]
    fn test_sinks_filter_by_their_own_level() {
        let (registry, collector) = registry_with_collector(Level::Warning);
        registry.root().info("below sink level");
        registry.root().error("above sink level");
        assert_eq!(collector.messages(), vec!["above sink level"]);
    }

    #[test]
    fn test_fields_reach_sinks() {
        let (registry, collector) = registry_with_collector(Level::Debug);
        let mut fields = Fields::new();
        fields.insert("user".to_string(), serde_json::json!("ada"));
        registry.root().log_with(Level::Info, "login", fields.clone());

        let records = collector.records.lock().unwrap();
        assert_eq!(records[0].fields, fields);
    }

    #[test]
    fn test_failing_sink_is_reported_once_to_console() {
        let registry = Registry::new("app");
        let writer = SharedWriter::default();
        let failing = Arc::new(FailingSink::new());
        {
            let mut sinks = registry.root_logger().sinks_mut();
            sinks.clear();
            sinks.push(failing.clone());
            sinks.push(Arc::new(ConsoleSink::with_writer(
                Level::Debug,
                Box::new(writer.clone()),
            )));
        }

        registry.root().info("first");
        registry.root().info("second");

        let output = writer.contents();
        assert_eq!(output.matches("sink failed and was disabled").count(), 1);
        assert!(output.contains("first"));
        assert!(output.contains("second"));
        assert!(failing.is_degraded());
    }

    #[test]
    fn test_failing_sink_without_console_does_not_panic() {
        let registry = Registry::new("app");
        {
            let mut sinks = registry.root_logger().sinks_mut();
            sinks.clear();
            sinks.push(Arc::new(FailingSink::new()));
        }
        registry.root().error("nobody hears this");
        registry.root().error("or this");
    }

    #[test]
    fn test_concurrent_logging_from_many_threads() {
        let (registry, collector) = registry_with_collector(Level::Debug);
        let registry = Arc::new(registry);

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || {
                    let logger = registry.get_logger(&format!("app.worker{}", t));
                    for i in 0..50 {
                        logger.info(format!("{}-{}", t, i));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(collector.messages().len(), 400);
    }
}

//! Logger lifecycle management
//!
//! Moves the root logger through its phases:
//!
//! 1. `Uninitialized` - only a `NullSink`, so early log calls never fail
//! 2. `Bootstrapped` - memory buffer plus optional console
//! 3. `FileEnabled` - rotating file, buffer drained into it and discarded
//! 4. `ShutDown` - every sink flushed and closed, later records dropped
//!
//! Every transition is idempotent. There is exactly one manager per root
//! name in the process; `LifecycleManager::for_name` hands out that instance.

use std::collections::HashMap;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};

use crate::config::{LogConfig, RotationPolicy};
use crate::error::Result;
use crate::level::Level;
use crate::record::LogRecord;
use crate::registry::{Logger, Registry};
use crate::sink::{ConsoleSink, MemoryBufferSink, NullSink, RotatingFileSink, Sink, SinkKind};

/// Message of the record emitted when shutdown begins
pub const SHUTDOWN_MARKER: &str = "Logger shutdown started";

/// Produces the writer behind each new console sink
pub type MakeConsoleWriter = Arc<dyn Fn() -> Box<dyn Write + Send> + Send + Sync>;

/// Observable lifecycle phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseKind {
    Uninitialized,
    Bootstrapped,
    FileEnabled,
    ShutDown,
}

/// Phase together with the sinks that only exist in that phase
enum Phase {
    Uninitialized,
    Bootstrapped { buffer: Arc<MemoryBufferSink> },
    FileEnabled { file: Arc<RotatingFileSink> },
    ShutDown,
}

impl Phase {
    fn kind(&self) -> PhaseKind {
        match self {
            Phase::Uninitialized => PhaseKind::Uninitialized,
            Phase::Bootstrapped { .. } => PhaseKind::Bootstrapped,
            Phase::FileEnabled { .. } => PhaseKind::FileEnabled,
            Phase::ShutDown => PhaseKind::ShutDown,
        }
    }
}

struct ManagerState {
    phase: Phase,
    console: Option<Arc<ConsoleSink>>,
    /// Last applied configuration; its name always equals the root name
    config: LogConfig,
}

/// Whether `attached` is the same allocation as `sink`
fn same_sink<T: Sink>(attached: &Arc<dyn Sink>, sink: &Arc<T>) -> bool {
    std::ptr::eq(
        Arc::as_ptr(attached) as *const u8,
        Arc::as_ptr(sink) as *const u8,
    )
}

/// Whether `requested` names the file already open at `open` (absolute)
fn is_same_file(open: &Path, requested: &Path) -> bool {
    let resolved = match (requested.parent(), requested.file_name()) {
        (Some(parent), Some(name)) => {
            let parent = if parent.as_os_str().is_empty() {
                Path::new(".")
            } else {
                parent
            };
            parent
                .canonicalize()
                .map(|p| p.join(name))
                .unwrap_or_else(|_| requested.to_path_buf())
        }
        _ => requested.to_path_buf(),
    };
    open == resolved
}

fn close_quietly(sink: &dyn Sink) {
    if let Err(e) = sink.flush().and_then(|_| sink.close()) {
        tracing::warn!("Failed to close {} sink: {}", sink.kind(), e);
    }
}

fn managers() -> &'static Mutex<HashMap<String, Arc<LifecycleManager>>> {
    static MANAGERS: OnceLock<Mutex<HashMap<String, Arc<LifecycleManager>>>> = OnceLock::new();
    MANAGERS.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Owns the root logger of one application name and its sinks
pub struct LifecycleManager {
    registry: Registry,
    state: Mutex<ManagerState>,
    console_writer: Mutex<MakeConsoleWriter>,
}

impl LifecycleManager {
    fn new(name: &str) -> Self {
        let stdout: MakeConsoleWriter = Arc::new(|| Box::new(io::stdout()));
        Self {
            registry: Registry::new(name),
            state: Mutex::new(ManagerState {
                phase: Phase::Uninitialized,
                console: None,
                config: LogConfig::named(name),
            }),
            console_writer: Mutex::new(stdout),
        }
    }

    /// The process-wide manager for root logger `name`, created on first use
    ///
    /// Every call with the same name returns the same instance, so sinks
    /// are never attached twice for one root.
    pub fn for_name(name: &str) -> Arc<Self> {
        let name = name.trim();
        let mut all = managers()
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Arc::clone(
            all.entry(name.to_string())
                .or_insert_with(|| Arc::new(Self::new(name))),
        )
    }

    /// Every manager created so far
    pub fn all() -> Vec<Arc<Self>> {
        managers()
            .lock()
            .map(|all| all.values().cloned().collect())
            .unwrap_or_default()
    }

    fn lock_state(&self) -> MutexGuard<'_, ManagerState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Name of the root logger
    pub fn name(&self) -> &str {
        self.registry.root_name()
    }

    /// Current phase
    pub fn phase(&self) -> PhaseKind {
        self.lock_state().phase.kind()
    }

    /// Last applied (or pending) configuration
    pub fn config(&self) -> LogConfig {
        self.lock_state().config.clone()
    }

    /// The logger tree owned by this manager
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Logger for `name` under this manager's root
    pub fn get_logger(&self, name: &str) -> Logger {
        self.registry.get_logger(name)
    }

    /// The root logger
    pub fn root(&self) -> Logger {
        self.registry.root()
    }

    /// Path of the active log file, once file logging is enabled
    pub fn file_path(&self) -> Option<PathBuf> {
        match &self.lock_state().phase {
            Phase::FileEnabled { file } => Some(file.path().to_path_buf()),
            _ => None,
        }
    }

    /// Records waiting in the early-startup buffer
    pub fn buffered_records(&self) -> Vec<LogRecord> {
        match &self.lock_state().phase {
            Phase::Bootstrapped { buffer } => buffer.records(),
            _ => Vec::new(),
        }
    }

    /// Replace the writer used by console sinks created from now on
    pub fn set_console_writer<F>(&self, make: F)
    where
        F: Fn() -> Box<dyn Write + Send> + Send + Sync + 'static,
    {
        if let Ok(mut current) = self.console_writer.lock() {
            *current = Arc::new(make);
        }
    }

    fn make_console(&self, level: Level) -> Arc<ConsoleSink> {
        let out = match self.console_writer.lock() {
            Ok(make) => make(),
            Err(_) => Box::new(io::stdout()),
        };
        Arc::new(ConsoleSink::with_writer(level, out))
    }

    /// Store `config` for the next bootstrap without attaching anything
    ///
    /// Has no effect once the manager has left `Uninitialized`.
    pub fn configure(&self, config: &LogConfig) -> Result<()> {
        config.validate()?;
        let mut state = self.lock_state();
        if let Phase::Uninitialized = state.phase {
            state.config = self.own_config(config);
        }
        Ok(())
    }

    fn own_config(&self, config: &LogConfig) -> LogConfig {
        if config.name != self.name() {
            tracing::warn!(
                "Root logger name cannot change; keeping '{}' instead of '{}'",
                self.name(),
                config.name
            );
        }
        LogConfig {
            name: self.name().to_string(),
            ..config.clone()
        }
    }

    /// Attach the memory buffer and, if enabled, the console sink
    ///
    /// A no-op once bootstrapped, file-enabled or shut down.
    pub fn bootstrap(&self, config: &LogConfig) -> Result<()> {
        config.validate()?;
        let mut state = self.lock_state();
        match state.phase {
            Phase::Uninitialized => {
                let config = self.own_config(config);
                self.bootstrap_locked(&mut state, config);
            }
            Phase::ShutDown => tracing::debug!("Logger bootstrap skipped - already shut down"),
            _ => tracing::debug!("Logger bootstrap skipped - already initialized"),
        }
        Ok(())
    }

    fn bootstrap_locked(&self, state: &mut ManagerState, config: LogConfig) {
        tracing::debug!("Logger bootstrap started for '{}'", self.name());

        let buffer = Arc::new(MemoryBufferSink::new(config.level, config.buffer_capacity));
        let console = config
            .console_enabled
            .then(|| self.make_console(config.level));

        let root = self.registry.root_logger();
        {
            let mut sinks = root.sinks_mut();
            let external: Vec<Arc<dyn Sink>> = sinks
                .drain(..)
                .filter(|s| s.kind() != SinkKind::Null)
                .collect();
            sinks.push(buffer.clone());
            if let Some(console) = &console {
                sinks.push(console.clone());
                tracing::debug!("Console sink attached");
            }
            sinks.extend(external);
        }
        root.set_level(config.level);

        state.phase = Phase::Bootstrapped { buffer };
        state.console = console;
        state.config = config;
        tracing::debug!("Logger bootstrap completed");
    }

    /// Start writing to `path`, draining everything buffered so far into it
    ///
    /// Bootstraps implicitly (with the stored configuration) when called
    /// first. Repeating the call with the same path only applies `policy`;
    /// a different path closes the current file before opening the new one.
    pub fn enable_file_logging(&self, path: impl AsRef<Path>, policy: RotationPolicy) -> Result<()> {
        policy.validate()?;
        let path = path.as_ref();

        let mut state = self.lock_state();
        if let Phase::Uninitialized = state.phase {
            let config = state.config.clone();
            self.bootstrap_locked(&mut state, config);
        }

        tracing::debug!("Enabling file logging");
        match &state.phase {
            Phase::ShutDown => {
                tracing::debug!("File logging skipped - already shut down");
                return Ok(());
            }
            Phase::FileEnabled { file } if is_same_file(file.path(), path) => {
                tracing::debug!("File logging already enabled - skipping");
                return file.set_policy(policy);
            }
            _ => {}
        }

        let level = state.config.level;
        let capacity = state.config.buffer_capacity;
        let phase = std::mem::replace(&mut state.phase, Phase::ShutDown);
        let next = match phase {
            Phase::Bootstrapped { buffer } => {
                match RotatingFileSink::open(path, policy, level) {
                    Ok(file) => {
                        let file = Arc::new(file);
                        self.swap_buffer_for_file(&buffer, &file);
                        Phase::FileEnabled { file }
                    }
                    Err(e) => {
                        state.phase = Phase::Bootstrapped { buffer };
                        return Err(e);
                    }
                }
            }
            Phase::FileEnabled { file: previous } => {
                // Dispatch waits until the replacement sink is in place
                let root = self.registry.root_logger();
                let mut sinks = root.sinks_mut();
                let slot = sinks.iter().position(|s| same_sink(s, &previous));
                close_quietly(previous.as_ref());
                tracing::debug!("Closed previous log file {}", previous.path().display());

                let (replacement, outcome) = match RotatingFileSink::open(path, policy, level) {
                    Ok(file) => {
                        let file = Arc::new(file);
                        (file.clone() as Arc<dyn Sink>, Ok(Phase::FileEnabled { file }))
                    }
                    Err(e) => {
                        // Buffer again so nothing is lost until the next attempt
                        let buffer = Arc::new(MemoryBufferSink::new(level, capacity));
                        (buffer.clone() as Arc<dyn Sink>, Err((buffer, e)))
                    }
                };
                match slot {
                    Some(index) => sinks[index] = replacement,
                    None => sinks.insert(0, replacement),
                }
                drop(sinks);

                match outcome {
                    Ok(phase) => phase,
                    Err((buffer, e)) => {
                        state.phase = Phase::Bootstrapped { buffer };
                        return Err(e);
                    }
                }
            }
            other => other,
        };
        state.phase = next;

        tracing::debug!("File sink attached");
        tracing::info!("File logging enabled: {}", path.display());
        Ok(())
    }

    /// `enable_file_logging` with the path and rotation of the stored config
    pub fn enable_file_logging_from_config(&self) -> Result<()> {
        let config = self.config();
        self.enable_file_logging(config.file_path_or_default(), config.rotation_policy())
    }

    /// Replace the buffer with the file sink in one structural step
    fn swap_buffer_for_file(&self, buffer: &Arc<MemoryBufferSink>, file: &Arc<RotatingFileSink>) {
        let root = self.registry.root_logger();
        {
            let mut sinks = root.sinks_mut();
            tracing::debug!("Flushing memory buffer to file");
            let report = buffer.drain(file.as_ref());
            if report.failed > 0 {
                tracing::warn!("{} buffered records could not be written", report.failed);
            }
            match sinks.iter().position(|s| same_sink(s, buffer)) {
                Some(index) => sinks[index] = file.clone(),
                None => sinks.insert(0, file.clone()),
            }
        }
        close_quietly(buffer.as_ref());
    }

    /// Apply a new level and console setting
    ///
    /// Never creates or removes the buffer or file sink and never renames
    /// the root. Before bootstrap the configuration is only stored.
    pub fn update_config(&self, config: &LogConfig) -> Result<()> {
        config.validate()?;
        let mut state = self.lock_state();
        let config = match state.phase {
            Phase::ShutDown => {
                tracing::debug!("Config update skipped - already shut down");
                return Ok(());
            }
            _ => self.own_config(config),
        };

        let root = self.registry.root_logger();
        root.set_level(config.level);

        if let Phase::Uninitialized = state.phase {
            state.config = config;
            return Ok(());
        }
        match &state.phase {
            Phase::Bootstrapped { buffer } => buffer.set_level(config.level),
            Phase::FileEnabled { file } => {
                file.set_level(config.level);
                file.set_policy(config.rotation_policy())?;
            }
            Phase::Uninitialized | Phase::ShutDown => {}
        }

        match (config.console_enabled, state.console.take()) {
            (true, Some(console)) => {
                console.set_level(config.level);
                state.console = Some(console);
            }
            (true, None) => {
                let console = self.make_console(config.level);
                root.sinks_mut().push(console.clone());
                state.console = Some(console);
                tracing::debug!("Console sink attached");
            }
            (false, Some(console)) => {
                root.sinks_mut().retain(|s| !same_sink(s, &console));
                close_quietly(console.as_ref());
                tracing::debug!("Console sink detached");
            }
            (false, None) => {}
        }

        state.config = config;
        Ok(())
    }

    /// Attach a caller-provided sink after the managed ones
    ///
    /// The root owns it from now on and closes it at shutdown.
    pub fn attach_sink(&self, sink: Arc<dyn Sink>) {
        let state = self.lock_state();
        if let Phase::ShutDown = state.phase {
            close_quietly(sink.as_ref());
            return;
        }
        self.registry.root_logger().sinks_mut().push(sink);
    }

    /// Flush and close every attached sink, exactly once
    ///
    /// The shutdown marker is logged first so it still reaches the file.
    /// Afterwards the root only has a `NullSink` and log calls are dropped.
    pub fn shutdown(&self) {
        let mut state = self.lock_state();
        if let Phase::ShutDown = state.phase {
            tracing::debug!("Logger shutdown skipped - already shut down");
            return;
        }

        self.registry.root().log(Level::Info, SHUTDOWN_MARKER);

        if let Phase::Bootstrapped { buffer } = &state.phase {
            if !buffer.is_empty() {
                tracing::debug!(
                    "Discarding {} buffered records; file logging was never enabled",
                    buffer.len()
                );
            }
        }

        let sinks = std::mem::replace(
            &mut *self.registry.root_logger().sinks_mut(),
            vec![Arc::new(NullSink) as Arc<dyn Sink>],
        );
        for sink in &sinks {
            if let Err(e) = sink.flush() {
                tracing::warn!("Failed to flush {} sink: {}", sink.kind(), e);
            }
        }
        for sink in &sinks {
            if let Err(e) = sink.close() {
                tracing::warn!("Failed to close {} sink: {}", sink.kind(), e);
            }
        }

        state.phase = Phase::ShutDown;
        state.console = None;
        tracing::debug!("Logger shutdown completed");
    }

    /// Return to `Uninitialized`, closing everything; for test harnesses
    pub fn reset(&self) {
        let mut state = self.lock_state();
        let root = self.registry.root_logger();
        let sinks = std::mem::replace(
            &mut *root.sinks_mut(),
            vec![Arc::new(NullSink) as Arc<dyn Sink>],
        );
        for sink in &sinks {
            close_quietly(sink.as_ref());
        }
        root.set_level(Level::Debug);
        self.registry.forget_children();

        state.phase = Phase::Uninitialized;
        state.console = None;
        state.config = LogConfig::named(self.name());
    }
}

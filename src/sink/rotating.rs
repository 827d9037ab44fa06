//! Size-based rotating log file
//!
//! Writes one formatted line per record to the active file. When a write
//! would push the file past the size threshold, the file is rotated first:
//! closed, moved into the numbered backup chain and reopened empty.

use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, OnceLock};

use parking_lot::FairMutex;

use crate::config::RotationPolicy;
use crate::error::{LogError, Result};
use crate::level::{AtomicLevel, Level};
use crate::record::LogRecord;

use super::retention::{prune_backups, shift_backups};
use super::{Sink, SinkKind};

/// Paths currently held open by a `RotatingFileSink` in this process
fn open_paths() -> &'static Mutex<HashSet<PathBuf>> {
    static OPEN_PATHS: OnceLock<Mutex<HashSet<PathBuf>>> = OnceLock::new();
    OPEN_PATHS.get_or_init(|| Mutex::new(HashSet::new()))
}

/// Exclusive claim on a log file path, released on drop
#[derive(Debug)]
struct PathClaim {
    path: PathBuf,
}

impl PathClaim {
    fn acquire(path: &Path) -> Result<Self> {
        let mut paths = open_paths()
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if !paths.insert(path.to_path_buf()) {
            return Err(LogError::PathInUse(path.to_path_buf()));
        }
        Ok(Self {
            path: path.to_path_buf(),
        })
    }
}

impl Drop for PathClaim {
    fn drop(&mut self) {
        if let Ok(mut paths) = open_paths().lock() {
            paths.remove(&self.path);
        }
    }
}

/// Ensure the parent directory exists and return an absolute path for `path`
fn resolve_path(path: &Path) -> Result<PathBuf> {
    let open_err = |source| LogError::Open {
        path: path.to_path_buf(),
        source,
    };

    let file_name = path
        .file_name()
        .ok_or_else(|| LogError::config(format!("'{}' is not a file path", path.display())))?;

    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&parent).map_err(open_err)?;
    let parent = parent.canonicalize().map_err(open_err)?;

    Ok(parent.join(file_name))
}

fn open_append(path: &Path) -> std::io::Result<(File, u64)> {
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    let size = file.metadata()?.len();
    Ok((file, size))
}

struct FileState {
    /// Open handle; `None` once closed or degraded
    file: Option<File>,
    /// Bytes in the active file
    size: u64,
    policy: RotationPolicy,
    closed: bool,
    claim: Option<PathClaim>,
}

/// A log file that rotates to numbered backups when it grows too large
///
/// Writers are served in arrival order: the write path is guarded by a fair
/// mutex, so records offered while a rotation is in progress queue up and
/// are written, in order, to the fresh file.
pub struct RotatingFileSink {
    path: PathBuf,
    level: AtomicLevel,
    state: FairMutex<FileState>,
    degraded: AtomicBool,
    closed: AtomicBool,
}

impl RotatingFileSink {
    /// Open (or create) the log file at `path` for appending
    ///
    /// Creates missing parent directories and prunes stale backups above the
    /// policy's count. Fails with `PathInUse` if another sink in this process
    /// already holds the same file.
    pub fn open(path: impl AsRef<Path>, policy: RotationPolicy, level: Level) -> Result<Self> {
        policy.validate()?;
        let path = resolve_path(path.as_ref())?;
        let claim = PathClaim::acquire(&path)?;

        match prune_backups(&path, policy.backup_count) {
            Ok(0) => {}
            Ok(count) => tracing::debug!("Pruned {} stale backups of {}", count, path.display()),
            Err(e) => tracing::warn!("Failed to prune backups of {}: {}", path.display(), e),
        }

        let (file, size) = open_append(&path).map_err(|source| LogError::Open {
            path: path.clone(),
            source,
        })?;

        Ok(Self {
            path,
            level: AtomicLevel::new(level),
            state: FairMutex::new(FileState {
                file: Some(file),
                size,
                policy,
                closed: false,
                claim: Some(claim),
            }),
            degraded: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        })
    }

    /// Absolute path of the active file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current rotation policy
    pub fn policy(&self) -> RotationPolicy {
        self.state.lock().policy
    }

    /// Replace the rotation policy; takes effect on the next write
    pub fn set_policy(&self, policy: RotationPolicy) -> Result<()> {
        policy.validate()?;
        self.state.lock().policy = policy;
        Ok(())
    }

    /// Bytes currently in the active file
    pub fn active_size(&self) -> u64 {
        self.state.lock().size
    }

    fn rotate(&self, state: &mut FileState) -> std::io::Result<()> {
        if let Some(mut file) = state.file.take() {
            let _ = file.flush();
        }

        let backup_count = state.policy.backup_count;
        match shift_backups(&self.path, backup_count) {
            Ok(()) => {
                let file = OpenOptions::new()
                    .create(true)
                    .write(true)
                    .truncate(true)
                    .open(&self.path)?;
                state.file = Some(file);
                state.size = 0;
                tracing::debug!("Rotated log file {}", self.path.display());
                if let Err(e) = prune_backups(&self.path, backup_count) {
                    tracing::warn!("Failed to prune backups of {}: {}", self.path.display(), e);
                }
            }
            Err(e) => {
                // Keep writing to the same file rather than lose the record
                tracing::warn!("Failed to rotate {}: {}", self.path.display(), e);
                let (file, size) = open_append(&self.path)?;
                state.file = Some(file);
                state.size = size;
            }
        }
        Ok(())
    }

    fn degrade(&self, state: &mut FileState) {
        state.file = None;
        self.degraded.store(true, Ordering::Release);
    }
}

impl Sink for RotatingFileSink {
    fn kind(&self) -> SinkKind {
        SinkKind::RotatingFile
    }

    fn level(&self) -> Level {
        self.level.get()
    }

    fn set_level(&self, level: Level) {
        self.level.set(level);
    }

    fn accept(&self, record: &LogRecord) -> Result<()> {
        if record.level < self.level() {
            return Ok(());
        }

        let mut line = record.file_line();
        line.push('\n');
        let len = line.len() as u64;

        let mut state = self.state.lock();
        if state.closed {
            return Err(LogError::ClosedSink);
        }
        if self.degraded.load(Ordering::Acquire) {
            return Ok(());
        }

        if state.size > 0 && state.size + len > state.policy.max_bytes {
            if let Err(e) = self.rotate(&mut state) {
                self.degrade(&mut state);
                return Err(LogError::write(SinkKind::RotatingFile, e));
            }
        }

        let Some(file) = state.file.as_mut() else {
            return Ok(());
        };
        match file.write_all(line.as_bytes()) {
            Ok(()) => {
                state.size += len;
                Ok(())
            }
            Err(e) => {
                self.degrade(&mut state);
                Err(LogError::write(SinkKind::RotatingFile, e))
            }
        }
    }

    fn flush(&self) -> Result<()> {
        let mut state = self.state.lock();
        if state.closed {
            return Ok(());
        }
        if let Some(file) = state.file.as_mut() {
            file.flush()
                .map_err(|e| LogError::write(SinkKind::RotatingFile, e))?;
        }
        Ok(())
    }

    fn close(&self) -> Result<()> {
        let mut state = self.state.lock();
        if state.closed {
            return Ok(());
        }
        state.closed = true;
        self.closed.store(true, Ordering::Release);

        let result = match state.file.take() {
            Some(mut file) => file
                .flush()
                .and_then(|_| file.sync_all())
                .map_err(|e| LogError::write(SinkKind::RotatingFile, e)),
            None => Ok(()),
        };
        state.claim = None;
        result
    }

    fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::Acquire)
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl Drop for RotatingFileSink {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

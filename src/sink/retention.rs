//! Numbered backup management for rotated log files
//!
//! Backups live next to the active file as `<name>.1` (newest) up to
//! `<name>.N` (oldest).

use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Path of backup number `index` for `active`
pub fn backup_path(active: &Path, index: usize) -> PathBuf {
    let mut name = active
        .file_name()
        .map(OsString::from)
        .unwrap_or_default();
    name.push(format!(".{}", index));
    active.with_file_name(name)
}

/// Parse the backup index of `candidate` if it is a backup of `active_name`
fn backup_index(active_name: &str, candidate: &str) -> Option<usize> {
    let suffix = candidate.strip_prefix(active_name)?.strip_prefix('.')?;
    if suffix.is_empty() || !suffix.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    suffix.parse().ok()
}

/// Delete backups of `active` whose index is above `keep`
///
/// Returns the number of files deleted.
pub fn prune_backups(active: &Path, keep: usize) -> io::Result<usize> {
    let Some(dir) = active.parent() else {
        return Ok(0);
    };
    let dir = if dir.as_os_str().is_empty() {
        Path::new(".")
    } else {
        dir
    };
    if !dir.exists() {
        return Ok(0);
    }
    let Some(active_name) = active.file_name().and_then(|n| n.to_str()) else {
        return Ok(0);
    };

    let mut deleted_count = 0;

    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();

        // Only process backups of this log file
        let Some(index) = path
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(|name| backup_index(active_name, name))
        else {
            continue;
        };

        if index > keep && entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
            fs::remove_file(&path)?;
            deleted_count += 1;
        }
    }

    Ok(deleted_count)
}

/// Move the active file into the backup chain
///
/// `<name>.{k}` becomes `<name>.{k+1}` for every k below `count`, the backup
/// at `count` is deleted, and the active file becomes `<name>.1`. With a
/// count of zero the active file is deleted instead.
pub(crate) fn shift_backups(active: &Path, count: usize) -> io::Result<()> {
    if count == 0 {
        return remove_if_exists(active);
    }

    remove_if_exists(&backup_path(active, count))?;
    for index in (1..count).rev() {
        let from = backup_path(active, index);
        if from.exists() {
            fs::rename(&from, backup_path(active, index + 1))?;
        }
    }
    if active.exists() {
        fs::rename(active, backup_path(active, 1))?;
    }
    Ok(())
}

fn remove_if_exists(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

//! Process-wide entry points
//!
//! One root name is "active" at a time; `get_logger` resolves names
//! against it so modules can fetch loggers without carrying a manager.

use std::sync::{Arc, OnceLock, RwLock};

use crate::config::{LogConfig, DEFAULT_ROOT_NAME};
use crate::error::Result;
use crate::lifecycle::LifecycleManager;
use crate::registry::Logger;

fn active_root() -> &'static RwLock<String> {
    static ACTIVE: OnceLock<RwLock<String>> = OnceLock::new();
    ACTIVE.get_or_init(|| RwLock::new(DEFAULT_ROOT_NAME.to_string()))
}

fn set_active_root(name: &str) {
    let mut active = active_root()
        .write()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    *active = name.to_string();
}

/// Name of the root logger `get_logger` resolves against
pub fn active_root_name() -> String {
    active_root()
        .read()
        .map(|name| name.clone())
        .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
}

/// Manager of the active root
pub fn active_manager() -> Arc<LifecycleManager> {
    LifecycleManager::for_name(&active_root_name())
}

/// Make `config.name` the active root and return its manager
///
/// The configuration is stored for the first `bootstrap`; nothing is
/// attached yet. A manager that is already running keeps its settings.
pub fn create_bootstrapper(config: LogConfig) -> Result<Arc<LifecycleManager>> {
    config.validate()?;
    let manager = LifecycleManager::for_name(&config.name);
    manager.configure(&config)?;
    set_active_root(manager.name());
    Ok(manager)
}

/// Logger `name` under the active root
///
/// An empty name, or the root's own name, returns the root logger.
pub fn get_logger(name: &str) -> Logger {
    active_manager().get_logger(name)
}

/// Shut down every manager in the process
///
/// Meant for exit paths; managers already shut down are left alone.
pub fn shutdown_all() {
    for manager in LifecycleManager::all() {
        manager.shutdown();
    }
}

//! Logstage - staged logging lifecycle for applications
//!
//! A named logger tree whose root owns every sink. Logging works from the
//! first line of `main`: records are held in memory until the log file is
//! known, then written to a size-rotated file in their original order.
//!
//! ```no_run
//! use logstage::{LifecycleManager, LogConfig, RotationPolicy};
//!
//! let manager = LifecycleManager::for_name("my_app");
//! manager.bootstrap(&LogConfig::named("my_app"))?;
//! manager.get_logger("my_app.startup").info("reading settings");
//!
//! manager.enable_file_logging("logs/my_app.log", RotationPolicy::default())?;
//! manager.shutdown();
//! # Ok::<(), logstage::LogError>(())
//! ```

pub mod bridge;
pub mod config;
pub mod error;
pub mod global;
pub mod level;
pub mod lifecycle;
pub mod record;
pub mod registry;
pub mod settings;
pub mod sink;

pub use bridge::{init_tracing_bridge, TreeLayer};
pub use config::{LogConfig, RotationPolicy};
pub use error::{LogError, Result};
pub use global::{active_manager, create_bootstrapper, get_logger, shutdown_all};
pub use level::Level;
pub use lifecycle::{LifecycleManager, PhaseKind, SHUTDOWN_MARKER};
pub use record::{Fields, LogRecord};
pub use registry::{Logger, Registry};
pub use settings::{parse_size_to_bytes, LogSettings};
pub use sink::{Sink, SinkKind};

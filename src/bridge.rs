//! Forward `tracing` events into the logger tree
//!
//! Libraries that log through `tracing` end up in the same sinks as
//! records logged through [`Logger`](crate::Logger). The target `a::b`
//! becomes logger `a.b` under the manager's root.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::Layer;

use crate::error::{LogError, Result};
use crate::level::Level;
use crate::lifecycle::LifecycleManager;
use crate::record::Fields;

/// Target prefix of this crate's own diagnostics
const OWN_TARGET: &str = env!("CARGO_CRATE_NAME");

fn is_own_target(target: &str) -> bool {
    target
        .strip_prefix(OWN_TARGET)
        .map_or(false, |rest| rest.is_empty() || rest.starts_with("::"))
}

/// Map a tracing target to a dotted logger name
pub fn logger_name_for_target(target: &str) -> String {
    target.replace("::", ".")
}

/// Collects the message and the remaining fields of one event
#[derive(Default)]
struct EventVisitor {
    message: Option<String>,
    fields: Fields,
}

impl EventVisitor {
    fn insert(&mut self, field: &Field, value: Value) {
        if field.name() == "message" {
            self.message = Some(match value {
                Value::String(text) => text,
                other => other.to_string(),
            });
        } else {
            self.fields.insert(field.name().to_string(), value);
        }
    }
}

impl Visit for EventVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.insert(field, Value::String(format!("{:?}", value)));
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.insert(field, Value::String(value.to_string()));
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.insert(field, Value::from(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.insert(field, Value::from(value));
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.insert(field, Value::from(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.insert(field, Value::Bool(value));
    }
}

/// `tracing_subscriber` layer that dispatches events to a manager's root
pub struct TreeLayer {
    manager: Arc<LifecycleManager>,
}

impl TreeLayer {
    pub fn new(manager: Arc<LifecycleManager>) -> Self {
        Self { manager }
    }
}

impl<S: Subscriber> Layer<S> for TreeLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        if is_own_target(metadata.target()) {
            return;
        }

        let logger = self
            .manager
            .get_logger(&logger_name_for_target(metadata.target()));
        let level = Level::from(*metadata.level());
        if !logger.is_enabled_for(level) {
            return;
        }

        let mut visitor = EventVisitor::default();
        event.record(&mut visitor);
        logger.log_with(level, visitor.message.unwrap_or_default(), visitor.fields);
    }
}

/// Install a global subscriber that feeds `manager`'s tree
///
/// Filtering follows `RUST_LOG`, defaulting to `info`. Fails if another
/// global subscriber is already installed.
pub fn init_tracing_bridge(manager: Arc<LifecycleManager>) -> Result<()> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info".into());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(TreeLayer::new(manager))
        .try_init()
        .map_err(|e| LogError::config(format!("cannot install tracing bridge: {}", e)))
}

//! Collectors sample a host resource and report their own health
//!
//! The scheduler only depends on the [`Collector`] contract. Adding a new
//! collector means implementing the trait and listing it in [`builtin`].

pub mod disk;
pub mod memory;

use std::sync::Arc;

use async_trait::async_trait;

use crate::{CheckResult, Deadline, Settings, error::PluginResult, registry::Plugin};

/// Contract every collector implements
#[async_trait]
pub trait Collector: Plugin {
    /// Apply the collector-specific settings from the configuration
    fn init(&self, settings: &Settings) -> PluginResult<()>;

    /// Perform one collection
    ///
    /// Implementations should check `deadline` at their own suspension
    /// points; the scheduler additionally enforces it from the outside.
    async fn collect(&self, deadline: Deadline) -> PluginResult<Vec<CheckResult>>;

    /// Release any resource held by the collector
    async fn cleanup(&self) -> PluginResult<()>;
}

/// Every collector shipped with the monitor
pub fn builtin() -> Vec<Arc<dyn Collector>> {
    vec![
        Arc::new(disk::DiskCollector::new()),
        Arc::new(memory::MemoryCollector::new()),
    ]
}

const BYTES_PER_GB: f64 = 1024.0 * 1024.0 * 1024.0;

pub(crate) fn bytes_to_gb(bytes: u64) -> f64 {
    bytes as f64 / BYTES_PER_GB
}

/// Read an optional number from the settings, falling back to `default`
pub(crate) fn number_or(settings: &Settings, key: &str, default: f64) -> PluginResult<f64> {
    match settings.get(key) {
        None | Some(serde_json::Value::Null) => Ok(default),
        Some(value) => value.as_f64().ok_or_else(|| {
            crate::error::PluginError::Config(format!("'{key}' must be a number"))
        }),
    }
}

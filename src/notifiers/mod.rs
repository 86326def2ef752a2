//! Notifiers deliver unhealthy check results to an external channel

pub mod discord;
pub mod email;
pub mod webhook;

use std::sync::Arc;

use async_trait::async_trait;

use crate::{CheckResult, Deadline, Settings, error::PluginResult, registry::Plugin};

/// Contract every notifier implements
#[async_trait]
pub trait Notifier: Plugin {
    /// Apply the notifier-specific settings from the configuration
    fn init(&self, settings: &Settings) -> PluginResult<()>;

    /// Deliver the given results, finishing before `deadline`
    async fn notify(&self, deadline: Deadline, results: &[CheckResult]) -> PluginResult<()>;

    /// Release any resource held by the notifier
    async fn close(&self) -> PluginResult<()>;
}

/// Every notifier shipped with the monitor
pub fn builtin() -> Vec<Arc<dyn Notifier>> {
    vec![
        Arc::new(email::EmailNotifier::new()),
        Arc::new(webhook::WebhookNotifier::new()),
        Arc::new(discord::DiscordNotifier::new()),
    ]
}

/// The subset of `results` that is worth notifying about
pub(crate) fn unhealthy(results: &[CheckResult]) -> Vec<&CheckResult> {
    results.iter().filter(|r| !r.healthy).collect()
}

pub(crate) fn required_str<'a>(settings: &'a Settings, key: &str) -> PluginResult<&'a str> {
    settings
        .get(key)
        .and_then(serde_json::Value::as_str)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| crate::error::PluginError::Config(format!("missing '{key}'")))
}

pub(crate) fn optional_str(settings: &Settings, key: &str) -> Option<String> {
    settings
        .get(key)
        .and_then(serde_json::Value::as_str)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

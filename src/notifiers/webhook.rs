//! Generic JSON webhook notifier
//!
//! POSTs `{ "host": ..., "issues": [...] }` to the configured URL.

use async_trait::async_trait;
use parking_lot::RwLock;
use reqwest::Client;
use serde::Serialize;
use tracing::{debug, error, instrument};

use crate::{
    CheckResult, Deadline, Settings,
    error::{PluginError, PluginResult},
    registry::Plugin,
    util::get_host_name,
};

use super::{Notifier, required_str, unhealthy};

pub const NAME: &str = "webhook";

#[derive(Debug, Serialize)]
pub struct WebhookPayload<'a> {
    pub host: String,
    pub issues: Vec<&'a CheckResult>,
}

#[derive(Debug)]
pub struct WebhookNotifier {
    /// Reused across requests
    client: Client,
    url: RwLock<Option<String>>,
}

impl WebhookNotifier {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
            url: RwLock::new(None),
        }
    }

    pub fn url(&self) -> Option<String> {
        self.url.read().clone()
    }
}

impl Default for WebhookNotifier {
    fn default() -> Self {
        Self::new()
    }
}

impl Plugin for WebhookNotifier {
    fn name(&self) -> &str {
        NAME
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    fn init(&self, settings: &Settings) -> PluginResult<()> {
        let url = required_str(settings, "url")?;
        reqwest::Url::parse(url)
            .map_err(|e| PluginError::Config(format!("invalid 'url' {url}: {e}")))?;
        *self.url.write() = Some(url.to_string());
        Ok(())
    }

    #[instrument(skip_all, fields(notifier = NAME))]
    async fn notify(&self, deadline: Deadline, results: &[CheckResult]) -> PluginResult<()> {
        let issues = unhealthy(results);
        if issues.is_empty() {
            return Ok(());
        }

        let url = self
            .url()
            .ok_or_else(|| PluginError::Notify("webhook notifier not initialized".to_string()))?;

        let payload = WebhookPayload {
            host: get_host_name(),
            issues,
        };

        let response = self
            .client
            .post(&url)
            .timeout(deadline.remaining())
            .json(&payload)
            .send()
            .await
            .map_err(|e| PluginError::Notify(format!("webhook request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!("webhook returned {status}: {body}");
            return Err(PluginError::Notify(format!("webhook returned {status}: {body}")));
        }

        debug!("webhook notification sent for {} issue(s)", payload.issues.len());
        Ok(())
    }

    async fn close(&self) -> PluginResult<()> {
        Ok(())
    }
}

use async_trait::async_trait;
use parking_lot::RwLock;
use reqwest::Client;
use serde::Serialize;
use tracing::{error, info, instrument, warn};

use crate::{
    CheckResult, Deadline, Settings, Severity,
    error::{PluginError, PluginResult},
    registry::Plugin,
};

use super::{Notifier, optional_str, required_str, unhealthy};

pub const NAME: &str = "discord";

/// Discord rejects messages with more embeds than this
const MAX_EMBEDS: usize = 10;

const COLOR_CRITICAL: u32 = 15158332; // Red
const COLOR_WARNING: u32 = 15105570; // Orange

#[derive(Debug, Clone, Serialize)]
pub struct Message {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub embeds: Vec<Embed>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Embed {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<u32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<EmbedField>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub footer: Option<EmbedFooter>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct EmbedFooter {
    pub text: String,
}

#[derive(Default)]
pub struct MessageBuilder {
    content: Option<String>,
    embeds: Vec<Embed>,
}

impl MessageBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn content(mut self, content: impl ToString) -> Self {
        self.content = Some(content.to_string());
        self
    }

    pub fn add_embed(mut self, embed: Embed) -> Self {
        self.embeds.push(embed);
        self
    }

    pub fn build(self) -> Message {
        Message {
            content: self.content,
            embeds: self.embeds,
        }
    }
}

#[derive(Debug, Clone, Default)]
struct DiscordSettings {
    url: String,
    user_id: Option<String>,
}

/// Posts unhealthy results to a Discord webhook, one embed per result
#[derive(Debug)]
pub struct DiscordNotifier {
    client: Client,
    settings: RwLock<Option<DiscordSettings>>,
}

impl DiscordNotifier {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
            settings: RwLock::new(None),
        }
    }

    pub fn build_message(&self, results: &[&CheckResult]) -> Message {
        let user_id = self.settings.read().as_ref().and_then(|s| s.user_id.clone());

        let mut builder = MessageBuilder::new();
        let content = match user_id {
            Some(user_id) => format!("<@{user_id}> {} issue(s) detected", results.len()),
            None => format!("{} issue(s) detected", results.len()),
        };
        builder = builder.content(content);

        if results.len() > MAX_EMBEDS {
            warn!(
                "{} results exceed discord's embed limit, only the first {MAX_EMBEDS} are attached",
                results.len()
            );
        }

        for result in results.iter().take(MAX_EMBEDS) {
            builder = builder.add_embed(build_embed(result));
        }

        builder.build()
    }
}

impl Default for DiscordNotifier {
    fn default() -> Self {
        Self::new()
    }
}

fn build_embed(result: &CheckResult) -> Embed {
    let color = match result.max_severity() {
        Some(Severity::Critical) => COLOR_CRITICAL,
        _ => COLOR_WARNING,
    };

    let mut metrics: Vec<_> = result.metrics.iter().collect();
    metrics.sort_by(|a, b| a.0.cmp(b.0));

    Embed {
        title: Some(format!("⚠️ {} alert", result.collector)),
        description: result.message.clone(),
        color: Some(color),
        fields: metrics
            .into_iter()
            .map(|(name, value)| EmbedField {
                name: name.clone(),
                value: format!("{value:.2}"),
                inline: true,
            })
            .collect(),
        footer: Some(EmbedFooter {
            text: format!("Collector: {}", result.collector),
        }),
        timestamp: Some(result.timestamp.to_rfc3339()),
    }
}

impl Plugin for DiscordNotifier {
    fn name(&self) -> &str {
        NAME
    }
}

#[async_trait]
impl Notifier for DiscordNotifier {
    fn init(&self, settings: &Settings) -> PluginResult<()> {
        let url = required_str(settings, "url")?;
        reqwest::Url::parse(url)
            .map_err(|e| PluginError::Config(format!("invalid 'url' {url}: {e}")))?;
        let url = url.to_string();
        let user_id = optional_str(settings, "user_id");
        *self.settings.write() = Some(DiscordSettings { url, user_id });
        Ok(())
    }

    #[instrument(skip_all, fields(notifier = NAME))]
    async fn notify(&self, deadline: Deadline, results: &[CheckResult]) -> PluginResult<()> {
        let issues = unhealthy(results);
        if issues.is_empty() {
            return Ok(());
        }

        let url = self
            .settings
            .read()
            .as_ref()
            .map(|s| s.url.clone())
            .ok_or_else(|| PluginError::Notify("discord notifier not initialized".to_string()))?;

        let message = self.build_message(&issues);

        let response = self
            .client
            .post(&url)
            .timeout(deadline.remaining())
            .json(&message)
            .send()
            .await
            .map_err(|e| PluginError::Notify(format!("failed to send Discord message: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!("Discord message failed with status: {status}");
            return Err(PluginError::Notify(format!(
                "Discord API returned {status}: {body}"
            )));
        }

        info!("successfully sent Discord message");
        Ok(())
    }

    async fn close(&self) -> PluginResult<()> {
        Ok(())
    }
}

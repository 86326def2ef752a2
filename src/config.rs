use std::collections::BTreeMap;
use std::time::Duration;

use anyhow::{Context, bail};
use tracing::trace;

use crate::Settings;

#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct Config {
    #[serde(default)]
    pub monitor: MonitorConfig,

    #[serde(default)]
    pub collectors: BTreeMap<String, CollectorConfig>,

    #[serde(default)]
    pub notifiers: BTreeMap<String, NotifierConfig>,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct MonitorConfig {
    /// Interval used by collectors without an override
    #[serde(default = "default_interval")]
    pub default_interval_seconds: i64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            default_interval_seconds: default_interval(),
        }
    }
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct CollectorConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Absent or non-positive means "use the default interval"
    #[serde(default)]
    pub interval_seconds: Option<i64>,

    #[serde(default)]
    pub settings: Option<Settings>,
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct NotifierConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default)]
    pub settings: Option<Settings>,
}

fn default_interval() -> i64 {
    60
}

impl Config {
    /// Names of the enabled collectors, in configuration order
    pub fn enabled_collectors(&self) -> impl Iterator<Item = (&str, &CollectorConfig)> {
        self.collectors
            .iter()
            .filter(|(_, c)| c.enabled)
            .map(|(name, c)| (name.as_str(), c))
    }

    /// Names of the enabled notifiers, in configuration order
    pub fn enabled_notifiers(&self) -> impl Iterator<Item = (&str, &NotifierConfig)> {
        self.notifiers
            .iter()
            .filter(|(_, n)| n.enabled)
            .map(|(name, n)| (name.as_str(), n))
    }

    /// Resolved interval of a collector in seconds
    ///
    /// Returns 0 for unknown or disabled collectors so callers can treat any
    /// non-positive value as "cannot be scheduled".
    pub fn collector_interval_secs(&self, name: &str) -> i64 {
        match self.collectors.get(name) {
            Some(collector) if collector.enabled => collector
                .interval_seconds
                .filter(|secs| *secs > 0)
                .unwrap_or(self.monitor.default_interval_seconds),
            _ => 0,
        }
    }

    pub fn collector_interval(&self, name: &str) -> Option<Duration> {
        u64::try_from(self.collector_interval_secs(name))
            .ok()
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.monitor.default_interval_seconds <= 0 {
            bail!(
                "monitor.default_interval_seconds must be greater than 0 (got {})",
                self.monitor.default_interval_seconds
            );
        }

        if let Some(name) = self.collectors.keys().chain(self.notifiers.keys()).find(|n| n.is_empty()) {
            bail!("plugin names must not be empty (found {name:?})");
        }

        Ok(())
    }
}

pub fn parse_config(content: &str) -> anyhow::Result<Config> {
    let config: Config =
        serde_json::from_str(content).context("Invalid configuration file provided!")?;
    config.validate()?;
    Ok(config)
}

pub fn read_config_file(path: &str) -> anyhow::Result<Config> {
    let file_content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {path}"))?;
    parse_config(&file_content)
        .with_context(|| format!("Failed to load config file: {path}"))
        .inspect(|config| trace!("loaded config: {config:?}"))
}

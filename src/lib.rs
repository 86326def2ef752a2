pub mod collectors;
pub mod config;
pub mod error;
pub mod notifiers;
pub mod pipeline;
pub mod registry;
pub mod scheduler;
pub mod service;
pub mod util;

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

/// Opaque, plugin-specific settings taken verbatim from the configuration file.
pub type Settings = serde_json::Map<String, serde_json::Value>;

/// Outcome of a single check performed by a collector.
///
/// A collector invocation yields a batch of these. Health is self-reported by
/// the collector; `thresholds` only describes what was checked.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckResult {
    pub healthy: bool,
    pub collector: String,
    pub timestamp: DateTime<Utc>,

    /// Human readable description, only present for unhealthy results
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    #[serde(default)]
    pub metrics: HashMap<String, f64>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub thresholds: Vec<Threshold>,

    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl CheckResult {
    pub fn healthy(collector: impl Into<String>) -> Self {
        Self {
            healthy: true,
            collector: collector.into(),
            timestamp: Utc::now(),
            message: None,
            metrics: HashMap::new(),
            thresholds: Vec::new(),
            metadata: HashMap::new(),
        }
    }

    pub fn unhealthy(collector: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            healthy: false,
            message: Some(message.into()),
            ..Self::healthy(collector)
        }
    }

    pub fn with_metric(mut self, name: impl Into<String>, value: f64) -> Self {
        self.metrics.insert(name.into(), value);
        self
    }

    pub fn with_threshold(mut self, threshold: Threshold) -> Self {
        self.thresholds.push(threshold);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Highest severity among the evaluated thresholds, if any were recorded.
    pub fn max_severity(&self) -> Option<Severity> {
        self.thresholds.iter().map(|t| t.severity).max()
    }
}

/// Descriptive record of a rule a collector evaluated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Threshold {
    pub kind: ThresholdKind,
    pub metric: String,
    pub operator: Operator,
    pub value: f64,
    pub severity: Severity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThresholdKind {
    Absolute,
    Percentage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    LessThan,
    GreaterThan,
    Equals,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Warning,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Warning => write!(f, "warning"),
            Severity::Critical => write!(f, "critical"),
        }
    }
}

/// Point in time by which a plugin invocation has to finish.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline(Instant);

impl Deadline {
    pub fn at(instant: Instant) -> Self {
        Self(instant)
    }

    pub fn after(budget: Duration) -> Self {
        Self(Instant::now() + budget)
    }

    pub fn instant(&self) -> Instant {
        self.0
    }

    /// Time left until the deadline, zero once it has passed.
    pub fn remaining(&self) -> Duration {
        self.0.saturating_duration_since(Instant::now())
    }

    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.0
    }
}

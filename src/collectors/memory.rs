use async_trait::async_trait;
use parking_lot::RwLock;
use sysinfo::{MemoryRefreshKind, RefreshKind, System};
use tracing::{instrument, trace};

use crate::{
    CheckResult, Deadline, Operator, Settings, Severity, Threshold, ThresholdKind,
    error::{PluginError, PluginResult},
    registry::Plugin,
};

use super::{Collector, bytes_to_gb, number_or};

pub const NAME: &str = "memory";

const DEFAULT_THRESHOLD_PERCENT: f64 = 90.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryUsage {
    pub total_bytes: u64,
    pub used_bytes: u64,
    pub free_bytes: u64,
}

/// Reports system memory usage against a single percentage threshold
#[derive(Debug)]
pub struct MemoryCollector {
    threshold_percent: RwLock<f64>,
}

impl MemoryCollector {
    pub fn new() -> Self {
        Self {
            threshold_percent: RwLock::new(DEFAULT_THRESHOLD_PERCENT),
        }
    }

    pub fn threshold_percent(&self) -> f64 {
        *self.threshold_percent.read()
    }
}

impl Default for MemoryCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl Plugin for MemoryCollector {
    fn name(&self) -> &str {
        NAME
    }
}

#[async_trait]
impl Collector for MemoryCollector {
    fn init(&self, settings: &Settings) -> PluginResult<()> {
        let threshold = number_or(settings, "threshold_percent", DEFAULT_THRESHOLD_PERCENT)?;
        *self.threshold_percent.write() = threshold;
        Ok(())
    }

    #[instrument(skip_all, fields(collector = NAME))]
    async fn collect(&self, deadline: Deadline) -> PluginResult<Vec<CheckResult>> {
        if deadline.is_expired() {
            return Err(PluginError::Collection("deadline exceeded".to_string()));
        }

        let usage = tokio::time::timeout_at(deadline.instant(), tokio::task::spawn_blocking(sample))
            .await
            .map_err(|_| PluginError::Collection("deadline exceeded while reading memory".to_string()))?
            .map_err(|e| PluginError::Collection(format!("memory sampling task failed: {e}")))?;

        let result = evaluate(self.threshold_percent(), usage);
        trace!("collected memory metrics: {result:?}");
        Ok(vec![result])
    }

    async fn cleanup(&self) -> PluginResult<()> {
        Ok(())
    }
}

fn sample() -> MemoryUsage {
    let sys = System::new_with_specifics(
        RefreshKind::nothing().with_memory(MemoryRefreshKind::nothing().with_ram()),
    );

    MemoryUsage {
        total_bytes: sys.total_memory(),
        used_bytes: sys.used_memory(),
        free_bytes: sys.free_memory(),
    }
}

pub fn evaluate(threshold_percent: f64, usage: MemoryUsage) -> CheckResult {
    let used_percent = if usage.total_bytes == 0 {
        0.0
    } else {
        usage.used_bytes as f64 / usage.total_bytes as f64 * 100.0
    };

    let result = if used_percent > threshold_percent {
        CheckResult::unhealthy(
            NAME,
            format!(
                "High memory usage: {used_percent:.2}% used (threshold: {threshold_percent:.2}%)"
            ),
        )
    } else {
        CheckResult::healthy(NAME)
    };

    result
        .with_metric("total_gb", bytes_to_gb(usage.total_bytes))
        .with_metric("used_gb", bytes_to_gb(usage.used_bytes))
        .with_metric("free_gb", bytes_to_gb(usage.free_bytes))
        .with_metric("used_percent", used_percent)
        .with_threshold(Threshold {
            kind: ThresholdKind::Percentage,
            metric: "used_percent".to_string(),
            operator: Operator::GreaterThan,
            value: threshold_percent,
            severity: Severity::Warning,
        })
}

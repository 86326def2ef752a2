//! Disk space collector
//!
//! Stats the filesystem behind each configured path. A path is
//! unhealthy when its free space drops below `threshold_gb` or its usage
//! exceeds `threshold_percent`.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use nix::sys::statvfs::statvfs;
use parking_lot::RwLock;
use serde_json::Value;
use tracing::{debug, instrument, trace};

use crate::{
    CheckResult, Deadline, Operator, Settings, Severity, Threshold, ThresholdKind,
    error::{PluginError, PluginResult},
    registry::Plugin,
};

use super::{Collector, bytes_to_gb, number_or};

pub const NAME: &str = "disk_space";

const DEFAULT_THRESHOLD_GB: f64 = 5.0;
const DEFAULT_THRESHOLD_PERCENT: f64 = 90.0;

#[derive(Debug, Clone, PartialEq)]
pub struct PathConfig {
    pub path: PathBuf,
    pub threshold_gb: f64,
    pub threshold_percent: f64,
}

/// Raw numbers of the filesystem a path lives on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiskUsage {
    pub total_bytes: u64,
    pub available_bytes: u64,
}

#[derive(Debug, Default)]
pub struct DiskCollector {
    paths: RwLock<Vec<PathConfig>>,
}

impl DiskCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn paths(&self) -> Vec<PathConfig> {
        self.paths.read().clone()
    }
}

impl Plugin for DiskCollector {
    fn name(&self) -> &str {
        NAME
    }
}

#[async_trait]
impl Collector for DiskCollector {
    fn init(&self, settings: &Settings) -> PluginResult<()> {
        let paths = parse_paths(settings)?;
        debug!("monitoring {} path(s)", paths.len());
        *self.paths.write() = paths;
        Ok(())
    }

    #[instrument(skip_all, fields(collector = NAME))]
    async fn collect(&self, deadline: Deadline) -> PluginResult<Vec<CheckResult>> {
        let paths = self.paths();
        if paths.is_empty() {
            return Err(PluginError::Collection(
                "no paths configured, collector not initialized".to_string(),
            ));
        }

        let mut results = Vec::with_capacity(paths.len());
        for path in paths {
            if deadline.is_expired() {
                return Err(PluginError::Collection(
                    "deadline exceeded while reading disks".to_string(),
                ));
            }

            // statvfs may block on network filesystems
            let target = path.path.clone();
            let usage = tokio::time::timeout_at(
                deadline.instant(),
                tokio::task::spawn_blocking(move || usage_of(&target)),
            )
            .await
            .map_err(|_| {
                PluginError::Collection(format!(
                    "deadline exceeded while reading {}",
                    path.path.display()
                ))
            })?
            .map_err(|e| PluginError::Collection(format!("disk sampling task failed: {e}")))??;

            results.push(evaluate(&path, usage));
        }

        trace!("collected disk metrics: {results:?}");
        Ok(results)
    }

    async fn cleanup(&self) -> PluginResult<()> {
        Ok(())
    }
}

fn parse_paths(settings: &Settings) -> PluginResult<Vec<PathConfig>> {
    let raw = settings
        .get("paths")
        .ok_or_else(|| PluginError::Config("missing 'paths' configuration".to_string()))?;

    let Value::Array(entries) = raw else {
        return Err(PluginError::Config("'paths' should be an array".to_string()));
    };

    let mut paths = Vec::with_capacity(entries.len());
    for entry in entries {
        let Value::Object(entry) = entry else {
            return Err(PluginError::Config("each path should be an object".to_string()));
        };

        let path = entry
            .get("path")
            .and_then(Value::as_str)
            .ok_or_else(|| PluginError::Config("path must be a string".to_string()))?;

        let path = std::path::absolute(path)
            .map_err(|e| PluginError::Config(format!("could not resolve path {path}: {e}")))?;

        paths.push(PathConfig {
            path,
            threshold_gb: number_or(entry, "threshold_gb", DEFAULT_THRESHOLD_GB)?,
            threshold_percent: number_or(entry, "threshold_percent", DEFAULT_THRESHOLD_PERCENT)?,
        });
    }

    if paths.is_empty() {
        return Err(PluginError::Config("no valid paths configured".to_string()));
    }

    Ok(paths)
}

/// Usage of the filesystem `path` lives on, following symlinks
pub fn usage_of(path: &Path) -> PluginResult<DiskUsage> {
    let stat = statvfs(path).map_err(|e| {
        PluginError::Collection(format!("failed to get disk stats for {}: {e}", path.display()))
    })?;

    let block_size = stat.fragment_size() as u64;
    Ok(DiskUsage {
        total_bytes: (stat.blocks() as u64).saturating_mul(block_size),
        available_bytes: (stat.blocks_available() as u64).saturating_mul(block_size),
    })
}

/// Turn raw usage numbers into a check result for `path`
pub fn evaluate(path: &PathConfig, usage: DiskUsage) -> CheckResult {
    let total_gb = bytes_to_gb(usage.total_bytes);
    let free_gb = bytes_to_gb(usage.available_bytes);
    let used_gb = bytes_to_gb(usage.total_bytes.saturating_sub(usage.available_bytes));
    let used_percent = if usage.total_bytes == 0 {
        0.0
    } else {
        used_gb / total_gb * 100.0
    };

    let display = path.path.display();
    let message = if free_gb < path.threshold_gb {
        Some(format!(
            "Low disk space on {display}: {free_gb:.2}GB free (threshold: {:.2}GB)",
            path.threshold_gb
        ))
    } else if used_percent > path.threshold_percent {
        Some(format!(
            "High disk usage on {display}: {used_percent:.2}% used (threshold: {:.2}%)",
            path.threshold_percent
        ))
    } else {
        None
    };

    let result = match message {
        Some(message) => CheckResult::unhealthy(NAME, message),
        None => CheckResult::healthy(NAME),
    };

    result
        .with_metric("total_gb", total_gb)
        .with_metric("free_gb", free_gb)
        .with_metric("used_gb", used_gb)
        .with_metric("used_percent", used_percent)
        .with_threshold(Threshold {
            kind: ThresholdKind::Absolute,
            metric: "free_gb".to_string(),
            operator: Operator::LessThan,
            value: path.threshold_gb,
            severity: Severity::Critical,
        })
        .with_threshold(Threshold {
            kind: ThresholdKind::Percentage,
            metric: "used_percent".to_string(),
            operator: Operator::GreaterThan,
            value: path.threshold_percent,
            severity: Severity::Warning,
        })
        .with_metadata("path", display.to_string())
}

//! Result pipeline - turns a result batch into notifications
//!
//! ```text
//! Vec<CheckResult> → partition by `healthy` → (none unhealthy: done)
//!                                           → notifier 1 → notifier 2 → ... → aggregate errors
//! ```
//!
//! Health is taken from each result's own flag, thresholds are never
//! re-evaluated here. Notifiers are called one after another under a single
//! shared deadline; a failing notifier never prevents the next one from
//! being attempted.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tracing::{debug, error, info, instrument, warn};

use crate::{
    CheckResult, Deadline,
    error::{DispatchError, PluginError, panic_message},
    notifiers::Notifier,
};

/// Budget for delivering one batch to all notifiers
pub const NOTIFY_TIMEOUT: Duration = Duration::from_secs(30);

pub struct ResultPipeline {
    /// Enabled and initialized notifiers, fixed at startup
    notifiers: Vec<Arc<dyn Notifier>>,
    timeout: Duration,
}

impl ResultPipeline {
    pub fn new(notifiers: Vec<Arc<dyn Notifier>>) -> Self {
        Self {
            notifiers,
            timeout: NOTIFY_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn notifier_names(&self) -> Vec<&str> {
        self.notifiers.iter().map(|n| n.name()).collect()
    }

    /// Process the batch produced by one collector invocation
    #[instrument(skip_all, fields(results = results.len()))]
    pub async fn process(&self, results: Vec<CheckResult>) -> Result<(), DispatchError> {
        let (unhealthy, healthy): (Vec<_>, Vec<_>) =
            results.into_iter().partition(|result| !result.healthy);

        debug!("{} healthy, {} unhealthy", healthy.len(), unhealthy.len());

        if unhealthy.is_empty() {
            return Ok(());
        }

        for result in &unhealthy {
            warn!(
                collector = %result.collector,
                "unhealthy result: {}",
                result.message.as_deref().unwrap_or_default()
            );
        }

        self.dispatch(&unhealthy).await
    }

    async fn dispatch(&self, results: &[CheckResult]) -> Result<(), DispatchError> {
        if self.notifiers.is_empty() {
            debug!("no notifier enabled, dropping {} unhealthy result(s)", results.len());
            return Ok(());
        }

        let deadline = Deadline::after(self.timeout);
        let mut errors = DispatchError::default();

        for notifier in &self.notifiers {
            let name = notifier.name();
            let attempt = AssertUnwindSafe(notifier.notify(deadline, results))
                .catch_unwind()
                .map(|outcome| {
                    outcome.unwrap_or_else(|payload| {
                        Err(PluginError::Notify(format!(
                            "notifier panicked: {}",
                            panic_message(payload.as_ref())
                        )))
                    })
                });
            let outcome = tokio::time::timeout_at(deadline.instant(), attempt)
                .await
                .unwrap_or_else(|_| Err(PluginError::Timeout(self.timeout)));

            match outcome {
                Ok(()) => info!(notifier = name, "notification sent for {} issue(s)", results.len()),
                Err(e) => {
                    error!(notifier = name, "notification failed: {e}");
                    errors.push(name, e);
                }
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            error!("{errors}");
            Err(errors)
        }
    }
}

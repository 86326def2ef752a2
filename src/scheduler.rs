//! Task scheduler - one periodic loop per enabled collector
//!
//! ## Message Flow
//!
//! ```text
//! Timer tick → collect (≤ 30s) → ResultPipeline → [notifiers]
//!     ↑
//!     └─── shutdown token (checked before every tick)
//! ```
//!
//! Each loop owns a child of the service-wide shutdown token. Cancellation is
//! cooperative: it is observed while waiting for the next tick, an invocation
//! that already started runs to completion or to its own timeout.

use std::collections::HashMap;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, trace};

use crate::{
    Deadline,
    collectors::Collector,
    error::{DispatchError, PluginError, StartupError, panic_message},
    pipeline::ResultPipeline,
};

/// Budget for a single collector invocation
pub const COLLECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Why a single cycle failed; never fatal for the loop
#[derive(Debug)]
enum CycleError {
    Collection(PluginError),
    Dispatch(DispatchError),
}

impl fmt::Display for CycleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CycleError::Collection(err) => write!(f, "error collecting metrics: {}", err),
            CycleError::Dispatch(err) => write!(f, "error dispatching results: {}", err),
        }
    }
}

/// The loop driving a single collector
///
/// Invocations of the same collector are strictly sequential since the
/// collection happens inline in the loop body.
pub struct CollectorTask {
    collector: Arc<dyn Collector>,
    pipeline: Arc<ResultPipeline>,
    interval_duration: Duration,
    timeout: Duration,
    cancel: CancellationToken,
}

impl CollectorTask {
    /// Run until the cancellation token fires
    #[instrument(skip(self), fields(collector = %self.collector.name()))]
    pub async fn run(self) {
        debug!("starting collector task every {:?}", self.interval_duration);

        // first tick completes immediately
        let mut ticker = interval(self.interval_duration);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;

                _ = self.cancel.cancelled() => {
                    debug!("received shutdown signal");
                    break;
                }

                _ = ticker.tick() => {
                    if let Err(e) = self.run_once().await {
                        error!("{e}");
                    }
                }
            }
        }

        debug!("collector task stopped");
    }

    async fn run_once(&self) -> Result<(), CycleError> {
        trace!("collecting");
        let deadline = Deadline::after(self.timeout);

        // a panicking collector must not take the loop down with it
        let invocation = AssertUnwindSafe(self.collector.collect(deadline))
            .catch_unwind()
            .map(|outcome| {
                outcome.unwrap_or_else(|payload| {
                    Err(PluginError::Collection(format!(
                        "collector panicked: {}",
                        panic_message(payload.as_ref())
                    )))
                })
            });

        let results = tokio::time::timeout_at(deadline.instant(), invocation)
            .await
            .unwrap_or_else(|_| Err(PluginError::Timeout(self.timeout)))
            .map_err(CycleError::Collection)?;

        trace!("collected {} result(s)", results.len());

        self.pipeline
            .process(results)
            .await
            .map_err(CycleError::Dispatch)
    }
}

/// Cancellation and completion handle of a spawned [`CollectorTask`]
pub struct TaskHandle {
    cancel: CancellationToken,
    join: JoinHandle<()>,
}

impl TaskHandle {
    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }
}

/// Owns every collector loop of the service
pub struct TaskScheduler {
    shutdown: CancellationToken,
    tasks: Mutex<HashMap<String, TaskHandle>>,
    timeout: Duration,
}

impl TaskScheduler {
    pub fn new(shutdown: CancellationToken) -> Self {
        Self {
            shutdown,
            tasks: Mutex::new(HashMap::new()),
            timeout: COLLECT_TIMEOUT,
        }
    }

    /// Override the per-invocation budget
    pub fn with_collect_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Spawn the loop of `collector`, ticking every `every`
    ///
    /// Fails on a zero interval or if the collector already has a loop.
    pub fn spawn(
        &self,
        collector: Arc<dyn Collector>,
        every: Duration,
        pipeline: Arc<ResultPipeline>,
    ) -> Result<(), StartupError> {
        let name = collector.name().to_string();

        if every.is_zero() {
            return Err(StartupError::InvalidInterval {
                collector: name,
                seconds: 0,
            });
        }

        let mut tasks = self.tasks.lock();
        if tasks.contains_key(&name) {
            return Err(StartupError::DuplicateTask(name));
        }

        let cancel = self.shutdown.child_token();
        let task = CollectorTask {
            collector,
            pipeline,
            interval_duration: every,
            timeout: self.timeout,
            cancel: cancel.clone(),
        };

        let join = tokio::spawn(task.run());
        tasks.insert(name.clone(), TaskHandle { cancel, join });
        drop(tasks);

        info!(collector = %name, "collector task started with interval {every:?}");
        Ok(())
    }

    /// Names of the collectors with a task handle
    pub fn scheduled(&self) -> Vec<String> {
        self.tasks.lock().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.tasks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.lock().is_empty()
    }

    /// Cancel every loop and wait until all of them have exited
    ///
    /// Returns only after each loop acknowledged completion, so callers may
    /// release collector resources afterwards.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();

        let handles: Vec<(String, TaskHandle)> = self.tasks.lock().drain().collect();
        debug!("waiting for {} collector task(s)", handles.len());

        let joins = handles.into_iter().map(|(name, handle)| {
            handle.cancel.cancel();
            async move {
                if let Err(e) = handle.join.await {
                    error!(collector = %name, "collector task ended abnormally: {e}");
                }
            }
        });
        futures::future::join_all(joins).await;

        debug!("all collector tasks stopped");
    }
}

impl fmt::Debug for TaskScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskScheduler")
            .field("tasks", &self.scheduled())
            .field("timeout", &self.timeout)
            .finish()
    }
}

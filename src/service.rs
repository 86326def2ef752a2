//! Monitor service - startup ordering and graceful shutdown
//!
//! ```text
//! start(): Uninitialized → Registering → Initializing → Scheduling → Running
//! stop():  Running → Stopping → (cancel + join loops) → (cleanup/close) → Stopped
//! ```
//!
//! Every stage must succeed before the next one begins. A failed start never
//! leaves loops behind: whatever was spawned is cancelled and joined, plugins
//! are released and the service ends up `Stopped`.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::{
    collectors::{self, Collector},
    config::Config,
    error::StartupError,
    notifiers::{self, Notifier},
    pipeline::{NOTIFY_TIMEOUT, ResultPipeline},
    registry::Registry,
    scheduler::TaskScheduler,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    Uninitialized,
    Registering,
    Initializing,
    Scheduling,
    Running,
    Stopping,
    Stopped,
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ServiceState::Uninitialized => "uninitialized",
            ServiceState::Registering => "registering",
            ServiceState::Initializing => "initializing",
            ServiceState::Scheduling => "scheduling",
            ServiceState::Running => "running",
            ServiceState::Stopping => "stopping",
            ServiceState::Stopped => "stopped",
        };
        write!(f, "{name}")
    }
}

/// Plugins handed to the service, registered on start
struct Available {
    collectors: Vec<Arc<dyn Collector>>,
    notifiers: Vec<Arc<dyn Notifier>>,
}

pub struct MonitorService {
    config: Config,
    collectors: Registry<dyn Collector>,
    notifiers: Registry<dyn Notifier>,
    available: Mutex<Available>,
    state: Mutex<ServiceState>,

    /// Serialises `start` and `stop`
    lifecycle: tokio::sync::Mutex<()>,
    scheduler: TaskScheduler,
    notify_timeout: Duration,
}

impl MonitorService {
    /// Service running the built-in collectors and notifiers
    pub fn new(config: Config) -> Self {
        Self::with_plugins(config, collectors::builtin(), notifiers::builtin())
    }

    pub fn with_plugins(
        config: Config,
        collectors: Vec<Arc<dyn Collector>>,
        notifiers: Vec<Arc<dyn Notifier>>,
    ) -> Self {
        Self {
            config,
            collectors: Registry::new("collector"),
            notifiers: Registry::new("notifier"),
            available: Mutex::new(Available {
                collectors,
                notifiers,
            }),
            state: Mutex::new(ServiceState::Uninitialized),
            lifecycle: tokio::sync::Mutex::new(()),
            scheduler: TaskScheduler::new(CancellationToken::new()),
            notify_timeout: NOTIFY_TIMEOUT,
        }
    }

    /// Override the collect and notify sub-deadlines
    pub fn with_timeouts(mut self, collect: Duration, notify: Duration) -> Self {
        self.scheduler = TaskScheduler::new(CancellationToken::new()).with_collect_timeout(collect);
        self.notify_timeout = notify;
        self
    }

    pub fn state(&self) -> ServiceState {
        *self.state.lock()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn collectors(&self) -> &Registry<dyn Collector> {
        &self.collectors
    }

    pub fn notifiers(&self) -> &Registry<dyn Notifier> {
        &self.notifiers
    }

    /// Names of the collectors that currently have a running loop
    pub fn scheduled_collectors(&self) -> Vec<String> {
        let mut names = self.scheduler.scheduled();
        names.sort();
        names
    }

    fn set_state(&self, next: ServiceState) {
        let mut state = self.state.lock();
        debug!("{} → {}", *state, next);
        *state = next;
    }

    /// Register, initialize and schedule everything the configuration enables
    #[instrument(skip(self))]
    pub async fn start(&self) -> Result<(), StartupError> {
        let _guard = self.lifecycle.lock().await;

        let current = self.state();
        if current != ServiceState::Uninitialized {
            return Err(StartupError::InvalidState(current.to_string()));
        }

        match self.bring_up() {
            Ok(()) => {
                self.set_state(ServiceState::Running);
                info!(
                    "monitor started with {} collector task(s)",
                    self.scheduler.len()
                );
                Ok(())
            }
            Err(e) => {
                error!("startup failed: {e}");
                self.scheduler.shutdown().await;
                self.release().await;
                self.set_state(ServiceState::Stopped);
                Err(e)
            }
        }
    }

    fn bring_up(&self) -> Result<(), StartupError> {
        self.set_state(ServiceState::Registering);
        self.register()?;

        self.set_state(ServiceState::Initializing);
        let (collectors, notifiers) = self.initialize()?;

        self.set_state(ServiceState::Scheduling);
        self.schedule(collectors, notifiers)
    }

    fn register(&self) -> Result<(), StartupError> {
        let Available {
            collectors,
            notifiers,
        } = std::mem::replace(
            &mut *self.available.lock(),
            Available {
                collectors: Vec::new(),
                notifiers: Vec::new(),
            },
        );

        for collector in collectors {
            self.collectors.register(collector)?;
        }
        for notifier in notifiers {
            self.notifiers.register(notifier)?;
        }

        debug!(
            "registered {} collector(s) and {} notifier(s)",
            self.collectors.len(),
            self.notifiers.len()
        );
        Ok(())
    }

    /// Configure every enabled plugin that has a registry entry
    #[allow(clippy::type_complexity)]
    fn initialize(
        &self,
    ) -> Result<(Vec<Arc<dyn Collector>>, Vec<Arc<dyn Notifier>>), StartupError> {
        let mut collectors = Vec::new();
        for (name, config) in self.config.enabled_collectors() {
            let Some(collector) = self.collectors.get(name) else {
                warn!("collector {name} is enabled but not registered, skipping");
                continue;
            };

            let settings = config.settings.clone().unwrap_or_default();
            collector
                .init(&settings)
                .map_err(|source| StartupError::Config {
                    plugin: name.to_string(),
                    source,
                })?;

            info!("initialized collector {name}");
            collectors.push(collector);
        }

        let mut notifiers = Vec::new();
        for (name, config) in self.config.enabled_notifiers() {
            let Some(notifier) = self.notifiers.get(name) else {
                warn!("notifier {name} is enabled but not registered, skipping");
                continue;
            };

            let settings = config.settings.clone().unwrap_or_default();
            notifier
                .init(&settings)
                .map_err(|source| StartupError::Config {
                    plugin: name.to_string(),
                    source,
                })?;

            info!("initialized notifier {name}");
            notifiers.push(notifier);
        }

        Ok((collectors, notifiers))
    }

    fn schedule(
        &self,
        collectors: Vec<Arc<dyn Collector>>,
        notifiers: Vec<Arc<dyn Notifier>>,
    ) -> Result<(), StartupError> {
        // resolve every interval before the first loop exists
        let scheduled = collectors
            .into_iter()
            .map(|collector| {
                let name = collector.name();
                match self.config.collector_interval(name) {
                    Some(every) => Ok((collector, every)),
                    None => Err(StartupError::InvalidInterval {
                        collector: name.to_string(),
                        seconds: self.config.collector_interval_secs(name),
                    }),
                }
            })
            .collect::<Result<Vec<_>, _>>()?;

        let pipeline = Arc::new(ResultPipeline::new(notifiers).with_timeout(self.notify_timeout));
        debug!("notifying via {:?}", pipeline.notifier_names());

        for (collector, every) in scheduled {
            self.scheduler.spawn(collector, every, pipeline.clone())?;
        }

        Ok(())
    }

    /// Stop all loops, then release every registered plugin
    ///
    /// Only acts on a running service; any other call returns immediately.
    #[instrument(skip(self))]
    pub async fn stop(&self) {
        let _guard = self.lifecycle.lock().await;

        if self.state() != ServiceState::Running {
            debug!("service is {}, nothing to stop", self.state());
            return;
        }

        self.set_state(ServiceState::Stopping);
        info!("stopping monitor");

        self.scheduler.shutdown().await;
        self.release().await;

        self.set_state(ServiceState::Stopped);
        info!("monitor stopped");
    }

    /// Best-effort cleanup of every registered plugin
    async fn release(&self) {
        for collector in self.collectors.list_all() {
            if let Err(e) = collector.cleanup().await {
                error!(collector = collector.name(), "cleanup failed: {e}");
            }
        }

        for notifier in self.notifiers.list_all() {
            if let Err(e) = notifier.close().await {
                error!(notifier = notifier.name(), "close failed: {e}");
            }
        }
    }
}

impl fmt::Debug for MonitorService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MonitorService")
            .field("state", &self.state())
            .field("collectors", &self.collectors)
            .field("notifiers", &self.notifiers)
            .field("scheduler", &self.scheduler)
            .finish()
    }
}

impl Default for MonitorService {
    fn default() -> Self {
        Self::new(Config::default())
    }
}

//! Error types for the monitoring core
//!
//! Startup errors are fatal, steady-state errors are isolated to a single
//! collection cycle or notifier, shutdown errors are only ever logged.

use std::fmt;
use std::time::Duration;

/// Result type alias for plugin operations
pub type PluginResult<T> = Result<T, PluginError>;

/// Errors raised when populating a registry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistrationError {
    /// The plugin reported an empty name
    InvalidName,

    /// A plugin with this name is already registered
    DuplicateName(String),
}

impl fmt::Display for RegistrationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistrationError::InvalidName => write!(f, "plugin has an empty name"),
            RegistrationError::DuplicateName(name) => {
                write!(f, "plugin with name '{}' already registered", name)
            }
        }
    }
}

impl std::error::Error for RegistrationError {}

/// Errors reported by collectors and notifiers
#[derive(Debug)]
pub enum PluginError {
    /// The plugin rejected its settings
    Config(String),

    /// A single collection failed
    Collection(String),

    /// The invocation did not finish within its sub-deadline
    Timeout(Duration),

    /// Delivering a notification failed
    Notify(String),

    /// Releasing plugin resources failed
    Cleanup(String),

    /// I/O error (sockets, filesystem)
    Io(std::io::Error),
}

impl fmt::Display for PluginError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PluginError::Config(msg) => write!(f, "invalid configuration: {}", msg),
            PluginError::Collection(msg) => write!(f, "collection failed: {}", msg),
            PluginError::Timeout(after) => write!(f, "timed out after {:?}", after),
            PluginError::Notify(msg) => write!(f, "notification failed: {}", msg),
            PluginError::Cleanup(msg) => write!(f, "cleanup failed: {}", msg),
            PluginError::Io(err) => write!(f, "I/O error: {}", err),
        }
    }
}

impl std::error::Error for PluginError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PluginError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for PluginError {
    fn from(err: std::io::Error) -> Self {
        PluginError::Io(err)
    }
}

/// Human readable text of a caught panic payload
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Aggregate of every notifier that failed for one result batch
#[derive(Debug, Default)]
pub struct DispatchError {
    pub failures: Vec<(String, PluginError)>,
}

impl DispatchError {
    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn len(&self) -> usize {
        self.failures.len()
    }

    pub fn push(&mut self, notifier: impl Into<String>, error: PluginError) {
        self.failures.push((notifier.into(), error));
    }
}

impl fmt::Display for DispatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "notification errors: [")?;
        for (i, (notifier, error)) in self.failures.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{} notification failed: {}", notifier, error)?;
        }
        write!(f, "]")
    }
}

impl std::error::Error for DispatchError {}

/// Errors that abort `MonitorService::start`
#[derive(Debug)]
pub enum StartupError {
    /// A plugin could not be registered
    Registration(RegistrationError),

    /// An enabled plugin rejected its settings
    Config { plugin: String, source: PluginError },

    /// The resolved interval of an enabled collector is not positive
    InvalidInterval { collector: String, seconds: i64 },

    /// A task loop already exists for this collector
    DuplicateTask(String),

    /// `start` was called outside of the `Uninitialized` state
    InvalidState(String),
}

impl fmt::Display for StartupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StartupError::Registration(err) => write!(f, "registration failed: {}", err),
            StartupError::Config { plugin, source } => {
                write!(f, "failed to initialize '{}': {}", plugin, source)
            }
            StartupError::InvalidInterval { collector, seconds } => {
                write!(f, "invalid interval for collector {}: {}s", collector, seconds)
            }
            StartupError::DuplicateTask(name) => {
                write!(f, "a task for collector {} is already running", name)
            }
            StartupError::InvalidState(state) => {
                write!(f, "service cannot be started from state {}", state)
            }
        }
    }
}

impl std::error::Error for StartupError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StartupError::Registration(err) => Some(err),
            StartupError::Config { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<RegistrationError> for StartupError {
    fn from(err: RegistrationError) -> Self {
        StartupError::Registration(err)
    }
}

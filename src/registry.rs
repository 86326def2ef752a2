//! Name → instance registry shared by collectors and notifiers
//!
//! Entries are registered once and live for the rest of the process. The map
//! sits behind a reader/writer lock; the critical sections are limited to map
//! operations, callers receive cloned `Arc`s and never hold the lock while
//! talking to a plugin.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{error, trace};

use crate::error::RegistrationError;

/// Anything that can be stored in a [`Registry`]
pub trait Plugin: Send + Sync {
    /// Stable, unique, non-empty name of the plugin
    fn name(&self) -> &str;
}

pub struct Registry<T: ?Sized> {
    /// What is stored here ("collector", "notifier"), used for logging
    kind: &'static str,
    entries: RwLock<HashMap<String, Arc<T>>>,
}

impl<T: Plugin + ?Sized> Registry<T> {
    pub fn new(kind: &'static str) -> Self {
        Self {
            kind,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Register a plugin under its own name
    ///
    /// Fails if the name is empty or already taken. The existing entry is
    /// left untouched in the latter case.
    pub fn register(&self, plugin: Arc<T>) -> Result<(), RegistrationError> {
        let name = plugin.name().to_string();
        if name.is_empty() {
            let err = RegistrationError::InvalidName;
            error!(kind = self.kind, "failed to register {}: {err}", self.kind);
            return Err(err);
        }

        let mut entries = self.entries.write();
        if entries.contains_key(&name) {
            drop(entries);
            let err = RegistrationError::DuplicateName(name);
            error!(kind = self.kind, "failed to register {}: {err}", self.kind);
            return Err(err);
        }

        trace!(kind = self.kind, "registered {name}");
        entries.insert(name, plugin);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<T>> {
        self.entries.read().get(name).cloned()
    }

    /// Snapshot of all registered plugins, in no particular order
    pub fn list_all(&self) -> Vec<Arc<T>> {
        self.entries.read().values().cloned().collect()
    }

    /// Snapshot of all registered names, in no particular order
    pub fn list_names(&self) -> Vec<String> {
        self.entries.read().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl<T: ?Sized> fmt::Debug for Registry<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("kind", &self.kind)
            .field("entries", &self.entries.read().len())
            .finish()
    }
}

//! Process-wide plugin directory
//!
//! The shared registry the bridge keeps in sync with namespace lifecycle. Every
//! entry is tagged with the context that owns it so teardown can remove exactly
//! what that context registered.

use crate::error::RegistryError;
use crate::types::ContextId;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

/// Opaque handle of a registered plugin
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PluginHandle(u64);

impl PluginHandle {
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

/// A registration request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginRegistration {
    pub service: String,
    pub provider: String,
    pub owner: ContextId,
    pub namespace: String,
}

/// A registered plugin as seen by whoever enumerates the registry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverRegistryEntry {
    pub handle: PluginHandle,
    pub service: String,
    pub provider: String,
    /// Context the provider was loaded from
    pub owner: ContextId,
    pub namespace: String,
}

/// A shared, process-wide registry of plugins
pub trait PluginRegistry: Send + Sync {
    fn register(&self, registration: PluginRegistration) -> Result<PluginHandle, RegistryError>;

    fn deregister(&self, handle: PluginHandle) -> Result<(), RegistryError>;

    /// Snapshot of current entries
    fn entries(&self) -> Vec<DriverRegistryEntry>;
}

/// In-process driver directory
#[derive(Debug, Default)]
pub struct DriverDirectory {
    entries: RwLock<BTreeMap<PluginHandle, DriverRegistryEntry>>,
    next_handle: AtomicU64,
}

static GLOBAL_DIRECTORY: OnceLock<Arc<DriverDirectory>> = OnceLock::new();

impl DriverDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// The directory shared by the whole process
    pub fn global() -> Arc<DriverDirectory> {
        GLOBAL_DIRECTORY
            .get_or_init(|| Arc::new(DriverDirectory::new()))
            .clone()
    }

    /// Registered providers of `service`, in registration order
    pub fn providers(&self, service: &str) -> Vec<DriverRegistryEntry> {
        self.entries
            .read()
            .values()
            .filter(|entry| entry.service == service)
            .cloned()
            .collect()
    }

    /// Entries owned by `owner`
    pub fn owned_by(&self, owner: ContextId) -> Vec<DriverRegistryEntry> {
        self.entries
            .read()
            .values()
            .filter(|entry| entry.owner == owner)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl PluginRegistry for DriverDirectory {
    fn register(&self, registration: PluginRegistration) -> Result<PluginHandle, RegistryError> {
        let mut entries = self.entries.write();
        let duplicate = entries.values().any(|entry| {
            entry.owner == registration.owner
                && entry.service == registration.service
                && entry.provider == registration.provider
        });
        if duplicate {
            return Err(RegistryError::Rejected {
                service: registration.service,
                provider: registration.provider,
                reason: format!("already registered by {}", registration.owner),
            });
        }

        let handle = PluginHandle(self.next_handle.fetch_add(1, Ordering::Relaxed) + 1);
        entries.insert(
            handle,
            DriverRegistryEntry {
                handle,
                service: registration.service,
                provider: registration.provider,
                owner: registration.owner,
                namespace: registration.namespace,
            },
        );
        Ok(handle)
    }

    fn deregister(&self, handle: PluginHandle) -> Result<(), RegistryError> {
        self.entries
            .write()
            .remove(&handle)
            .map(|_| ())
            .ok_or(RegistryError::UnknownHandle(handle.0))
    }

    fn entries(&self) -> Vec<DriverRegistryEntry> {
        self.entries.read().values().cloned().collect()
    }
}

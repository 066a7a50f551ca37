//! External registry bridge
//!
//! Keeps a shared [`PluginRegistry`] consistent with namespace lifecycle. When a
//! context is installed, providers listed in its service manifests are registered,
//! but only those the context defines itself; providers merely reachable through a
//! parent belong to someone else. When a context is retired, every registry entry
//! tagged with its identity is removed.
//!
//! The registry is outside this crate's control, so failures are logged and never
//! abort a namespace add or remove.

pub mod directory;

use crate::context::IsolatedCodeContext;
use crate::extract::naming::service_manifest_path;
use crate::types::ContextId;
use directory::{PluginRegistration, PluginRegistry};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Bridge settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Service names whose providers are registered
    #[serde(default = "default_services")]
    pub services: Vec<String>,

    /// Directory holding provider manifests, one file per service
    #[serde(default = "default_manifest_prefix")]
    pub manifest_prefix: String,
}

fn default_services() -> Vec<String> {
    vec!["sql.Driver".to_string()]
}

fn default_manifest_prefix() -> String {
    "META-INF/services/".to_string()
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            services: default_services(),
            manifest_prefix: default_manifest_prefix(),
        }
    }
}

pub struct ExternalRegistryBridge {
    registry: Arc<dyn PluginRegistry>,
    config: BridgeConfig,
}

impl ExternalRegistryBridge {
    pub fn new(registry: Arc<dyn PluginRegistry>, config: BridgeConfig) -> Self {
        Self { registry, config }
    }

    pub fn registry(&self) -> &Arc<dyn PluginRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Register providers defined by `context`; returns how many were registered
    ///
    /// Runs while holding the context open, so a concurrent retire waits for it
    /// and its cleanup sees every entry registered here.
    pub fn initialize(&self, context: &IsolatedCodeContext) -> usize {
        let Ok(_flight) = context.enter() else {
            debug!(
                namespace = %context.namespace(),
                context = %context.id(),
                "Context retired before its providers were registered"
            );
            return 0;
        };
        let mut registered = 0;
        for service in &self.config.services {
            for provider in self.discover(context, service) {
                let artifact = match context.resolve(&provider) {
                    Ok(artifact) => artifact,
                    Err(e) => {
                        warn!(
                            namespace = %context.namespace(),
                            service = %service,
                            provider = %provider,
                            error = %e,
                            "Provider listed in manifest could not be resolved"
                        );
                        continue;
                    }
                };

                if artifact.defining_context() != context.id() {
                    trace!(
                        namespace = %context.namespace(),
                        provider = %provider,
                        owner = %artifact.defining_context(),
                        "Skipping provider defined by another context"
                    );
                    continue;
                }

                let registration = PluginRegistration {
                    service: service.clone(),
                    provider: provider.clone(),
                    owner: context.id(),
                    namespace: context.namespace().to_string(),
                };
                match self.registry.register(registration) {
                    Ok(handle) => {
                        debug!(
                            namespace = %context.namespace(),
                            service = %service,
                            provider = %provider,
                            handle = handle.as_u64(),
                            "Registered provider"
                        );
                        registered += 1;
                    }
                    Err(e) => warn!(
                        namespace = %context.namespace(),
                        provider = %provider,
                        error = %e,
                        "Failed to register provider"
                    ),
                }
            }
        }
        registered
    }

    /// Deregister every entry owned by `owner`; returns how many were removed
    ///
    /// Calling it again for the same owner removes nothing.
    pub fn cleanup(&self, owner: ContextId, namespace: &str) -> usize {
        let mut removed = 0;
        for entry in self.registry.entries() {
            if entry.owner != owner {
                continue;
            }
            match self.registry.deregister(entry.handle) {
                Ok(()) => {
                    debug!(
                        namespace = %namespace,
                        provider = %entry.provider,
                        handle = entry.handle.as_u64(),
                        "Deregistered provider"
                    );
                    removed += 1;
                }
                Err(e) => warn!(
                    namespace = %namespace,
                    provider = %entry.provider,
                    error = %e,
                    "Failed to deregister provider"
                ),
            }
        }
        removed
    }

    /// Provider ids listed for `service` in every manifest reachable from `context`
    fn discover(&self, context: &IsolatedCodeContext, service: &str) -> Vec<String> {
        let path = service_manifest_path(&self.config.manifest_prefix, service);
        let manifests = match context.find_resources(&path) {
            Ok(manifests) => manifests,
            Err(e) => {
                warn!(
                    namespace = %context.namespace(),
                    manifest = %path,
                    error = %e,
                    "Failed to read service manifests"
                );
                return Vec::new();
            }
        };

        let mut seen = BTreeSet::new();
        let mut providers = Vec::new();
        for manifest in manifests {
            for provider in parse_manifest(manifest.bytes()) {
                if seen.insert(provider.clone()) {
                    providers.push(provider);
                }
            }
        }
        providers
    }
}

/// Provider ids from a manifest: one per line, `#` starts a comment
pub fn parse_manifest(bytes: &[u8]) -> Vec<String> {
    String::from_utf8_lossy(bytes)
        .lines()
        .map(|line| line.split('#').next().unwrap_or("").trim())
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

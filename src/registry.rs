//! Namespace registry: name to current isolated context.
//!
//! Every add or remove publishes a fully built [`IsolatedCodeContext`] (or removes
//! one) with a single map operation, so concurrent readers observe either the old
//! or the new context, never a partial one. The displaced context is retired after
//! the swap: it stops accepting resolutions, waits for those in flight, has its
//! bridge registrations removed and is then disposed.

use crate::bridge::directory::{DriverDirectory, PluginRegistry};
use crate::bridge::{BridgeConfig, ExternalRegistryBridge};
use crate::config::{MaterializerKind, NamespaceConfig, NsloadConfig};
use crate::context::fingerprint::compute_fingerprint;
use crate::context::materialize::{DescriptorMaterializer, Materializer, RawMaterializer};
use crate::context::source::CodeSource;
use crate::context::IsolatedCodeContext;
use crate::error::NamespaceError;
use crate::extract::{ArtifactMap, ExtractorConfig, ResourceExtractor};
use crate::resource::ResourceDefinition;
use crate::types::{ContextId, ResolutionOrder, DEFAULT_NAMESPACE_ID};
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// Snapshot of one registered namespace
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamespaceInfo {
    pub name: String,
    pub context: ContextId,
    pub fingerprint: String,
    pub entries: usize,
    pub order: ResolutionOrder,
    pub created_at: DateTime<Utc>,
}

/// Builder for [`NamespaceRegistry`]
pub struct RegistryBuilder {
    extractor: ExtractorConfig,
    bridge: BridgeConfig,
    plugins: Option<Arc<dyn PluginRegistry>>,
    materializer: Arc<dyn Materializer>,
    default_order: ResolutionOrder,
    host: Option<Arc<dyn CodeSource>>,
}

impl Default for RegistryBuilder {
    fn default() -> Self {
        Self {
            extractor: ExtractorConfig::default(),
            bridge: BridgeConfig::default(),
            plugins: None,
            materializer: Arc::new(RawMaterializer),
            default_order: ResolutionOrder::default(),
            host: None,
        }
    }
}

impl RegistryBuilder {
    pub fn extractor(mut self, config: ExtractorConfig) -> Self {
        self.extractor = config;
        self
    }

    pub fn bridge(mut self, config: BridgeConfig) -> Self {
        self.bridge = config;
        self
    }

    /// Plugin registry kept in sync; defaults to [`DriverDirectory::global`]
    pub fn plugins(mut self, plugins: Arc<dyn PluginRegistry>) -> Self {
        self.plugins = Some(plugins);
        self
    }

    pub fn materializer(mut self, materializer: Arc<dyn Materializer>) -> Self {
        self.materializer = materializer;
        self
    }

    pub fn default_order(mut self, order: ResolutionOrder) -> Self {
        self.default_order = order;
        self
    }

    /// Host source every namespace context delegates to
    pub fn host(mut self, host: Arc<dyn CodeSource>) -> Self {
        self.host = Some(host);
        self
    }

    pub fn build(self) -> NamespaceRegistry {
        let plugins = self
            .plugins
            .unwrap_or_else(|| DriverDirectory::global() as Arc<dyn PluginRegistry>);
        NamespaceRegistry {
            namespaces: DashMap::new(),
            default_defined: AtomicBool::new(false),
            extractor: ResourceExtractor::new(self.extractor),
            bridge: ExternalRegistryBridge::new(plugins, self.bridge),
            materializer: self.materializer,
            default_order: self.default_order,
            host: self.host,
        }
    }
}

/// Concurrent map of namespace name to its current context
pub struct NamespaceRegistry {
    namespaces: DashMap<String, Arc<IsolatedCodeContext>>,
    default_defined: AtomicBool,
    extractor: ResourceExtractor,
    bridge: ExternalRegistryBridge,
    materializer: Arc<dyn Materializer>,
    default_order: ResolutionOrder,
    host: Option<Arc<dyn CodeSource>>,
}

impl NamespaceRegistry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    /// Registry with default settings and the process-wide driver directory
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Build a registry from configuration and install every configured namespace
    pub fn from_config(
        config: &NsloadConfig,
        plugins: Arc<dyn PluginRegistry>,
        host: Option<Arc<dyn CodeSource>>,
    ) -> Result<Self, NamespaceError> {
        let materializer: Arc<dyn Materializer> = match config.namespaces.materializer {
            MaterializerKind::Raw => Arc::new(RawMaterializer),
            MaterializerKind::Descriptor => Arc::new(DescriptorMaterializer),
        };
        let mut builder = Self::builder()
            .extractor(config.extractor.clone())
            .bridge(config.bridge.clone())
            .plugins(plugins)
            .materializer(materializer)
            .default_order(config.namespaces.default_order);
        if let Some(host) = host {
            builder = builder.host(host);
        }
        let registry = builder.build();

        for namespace in config.namespaces.resolved() {
            registry.apply(&namespace)?;
        }
        info!(
            namespaces = registry.namespaces.len(),
            "Namespace registry initialized from configuration"
        );
        Ok(registry)
    }

    pub fn bridge(&self) -> &ExternalRegistryBridge {
        &self.bridge
    }

    pub fn extractor(&self) -> &ResourceExtractor {
        &self.extractor
    }

    pub fn default_order(&self) -> ResolutionOrder {
        self.default_order
    }

    pub fn host(&self) -> Option<&Arc<dyn CodeSource>> {
        self.host.as_ref()
    }

    /// Install or replace `name` with the default resolution order
    pub fn add_namespace(
        &self,
        name: &str,
        resources: &[ResourceDefinition],
    ) -> Result<(), NamespaceError> {
        self.add_namespace_with_order(name, resources, self.default_order)
    }

    /// Install or replace `name`
    ///
    /// Extraction runs before anything is published; if it fails the previous
    /// context for `name` stays in place.
    pub fn add_namespace_with_order(
        &self,
        name: &str,
        resources: &[ResourceDefinition],
        order: ResolutionOrder,
    ) -> Result<(), NamespaceError> {
        validate_name(name)?;
        let entries = self.extractor.extract_all(resources)?;
        self.install(name, entries, order);
        Ok(())
    }

    /// Reconcile `name` with `config`
    ///
    /// Returns `false` when the namespace already holds identical content in the
    /// same order, in which case nothing is replaced.
    pub fn apply(&self, config: &NamespaceConfig) -> Result<bool, NamespaceError> {
        validate_name(&config.name)?;
        let definitions = config.to_definitions()?;
        let order = config.order.unwrap_or(self.default_order);
        let entries = self.extractor.extract_all(&definitions)?;

        if let Some(current) = self.get_context(&config.name) {
            let fingerprint = compute_fingerprint(&entries, order);
            if current.order() == order && *current.fingerprint() == fingerprint {
                debug!(namespace = %config.name, "Namespace unchanged, skipping");
                return Ok(false);
            }
        }

        self.install(&config.name, entries, order);
        Ok(true)
    }

    /// Remove `name`; returns whether it was present
    pub fn remove_namespace(&self, name: &str) -> bool {
        let removed = match self.namespaces.entry(name.to_string()) {
            Entry::Occupied(entry) => {
                if name == DEFAULT_NAMESPACE_ID {
                    self.default_defined.store(false, Ordering::Release);
                }
                Some(entry.remove())
            }
            Entry::Vacant(_) => None,
        };

        match removed {
            Some(context) => {
                info!(namespace = %name, context = %context.id(), "Namespace removed");
                self.retire(&context);
                true
            }
            None => false,
        }
    }

    pub fn has_namespace(&self, name: &str) -> bool {
        self.namespaces.contains_key(name)
    }

    /// Current context of `name`
    pub fn get_context(&self, name: &str) -> Option<Arc<IsolatedCodeContext>> {
        self.namespaces.get(name).map(|entry| Arc::clone(entry.value()))
    }

    pub fn is_default_namespace_defined(&self) -> bool {
        self.default_defined.load(Ordering::Acquire)
    }

    /// Listing of every namespace, sorted by name
    pub fn namespaces(&self) -> Vec<NamespaceInfo> {
        let mut listing: Vec<NamespaceInfo> = self
            .namespaces
            .iter()
            .map(|entry| {
                let context = entry.value();
                NamespaceInfo {
                    name: entry.key().clone(),
                    context: context.id(),
                    fingerprint: hex::encode(context.fingerprint()),
                    entries: context.len(),
                    order: context.order(),
                    created_at: context.created_at(),
                }
            })
            .collect();
        listing.sort_by(|a, b| a.name.cmp(&b.name));
        listing
    }

    pub fn len(&self) -> usize {
        self.namespaces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.namespaces.is_empty()
    }

    fn install(&self, name: &str, entries: ArtifactMap, order: ResolutionOrder) {
        let mut builder = IsolatedCodeContext::builder(name, entries)
            .order(order)
            .materializer(Arc::clone(&self.materializer));
        if let Some(host) = &self.host {
            builder = builder.parent(host);
        }
        let context = builder.build();

        // the default flag changes under the same shard lock as the map entry
        let previous = match self.namespaces.entry(name.to_string()) {
            Entry::Occupied(mut entry) => {
                if name == DEFAULT_NAMESPACE_ID {
                    self.default_defined.store(true, Ordering::Release);
                }
                Some(entry.insert(Arc::clone(&context)))
            }
            Entry::Vacant(entry) => {
                if name == DEFAULT_NAMESPACE_ID {
                    self.default_defined.store(true, Ordering::Release);
                }
                entry.insert(Arc::clone(&context));
                None
            }
        };

        info!(
            namespace = %name,
            context = %context.id(),
            entries = context.len(),
            replaced = previous.is_some(),
            "Namespace installed"
        );

        if let Some(previous) = previous {
            self.retire(&previous);
        }
        self.bridge.initialize(&context);
    }

    fn retire(&self, context: &IsolatedCodeContext) {
        context.begin_shutdown();
        let removed = self.bridge.cleanup(context.id(), context.namespace());
        context.finish_shutdown();
        debug!(
            namespace = %context.namespace(),
            context = %context.id(),
            deregistered = removed,
            "Context retired"
        );
    }
}

impl Default for NamespaceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for NamespaceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NamespaceRegistry")
            .field("namespaces", &self.namespaces.len())
            .field("default_order", &self.default_order)
            .field("host", &self.host.as_ref().map(|host| host.label().to_string()))
            .finish()
    }
}

fn validate_name(name: &str) -> Result<(), NamespaceError> {
    if name.trim().is_empty() {
        return Err(NamespaceError::InvalidArgument(
            "namespace name must not be blank".to_string(),
        ));
    }
    Ok(())
}

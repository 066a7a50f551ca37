//! Integration surface for serialization and execution layers
//!
//! A layer that deserializes or runs namespace-tagged objects brackets the work
//! with [`NamespaceService::setup_namespace`] / [`NamespaceService::cleanup_namespace`]
//! or uses the scoped helpers on [`NamespaceServiceExt`]. [`NoOpNamespaceService`] stands in when the feature
//! is disabled.

use crate::activation;
use crate::bridge::directory::PluginRegistry;
use crate::config::NsloadConfig;
use crate::context::materialize::Artifact;
use crate::context::source::CodeSource;
use crate::context::IsolatedCodeContext;
use crate::error::NamespaceError;
use crate::registry::NamespaceRegistry;
use crate::resource::ResourceDefinition;
use crate::types::{ArtifactKey, ContextId, DEFAULT_NAMESPACE_ID};
use std::sync::Arc;
use tracing::info;

pub trait NamespaceService: Send + Sync {
    fn is_enabled(&self) -> bool;

    fn add_namespace(
        &self,
        name: &str,
        resources: &[ResourceDefinition],
    ) -> Result<(), NamespaceError>;

    fn remove_namespace(&self, name: &str) -> bool;

    fn has_namespace(&self, name: &str) -> bool;

    fn is_default_namespace_defined(&self) -> bool;

    fn context_for_namespace(&self, name: &str) -> Option<Arc<IsolatedCodeContext>>;

    /// Context a scoped operation on `namespace` runs under
    ///
    /// `None` means the default namespace if one is defined, otherwise nothing.
    /// A named namespace that does not exist is an error.
    fn scoped_context(
        &self,
        namespace: Option<&str>,
    ) -> Result<Option<Arc<IsolatedCodeContext>>, NamespaceError>;

    /// Activate `namespace` on this thread; returns whether anything was activated
    fn setup_namespace(&self, namespace: Option<&str>) -> Result<bool, NamespaceError> {
        match self.scoped_context(namespace)? {
            Some(context) => {
                activation::push(&context);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Undo a [`setup_namespace`](NamespaceService::setup_namespace) on this thread
    fn cleanup_namespace(&self, namespace: Option<&str>) -> Result<bool, NamespaceError> {
        if !self.is_enabled() {
            return Ok(false);
        }
        let name = match namespace {
            Some(name) => name,
            None if self.is_default_namespace_defined() => DEFAULT_NAMESPACE_ID,
            None => return Ok(false),
        };
        activation::pop(name)?;
        Ok(true)
    }
}

/// Scoped helpers for any [`NamespaceService`], trait objects included
pub trait NamespaceServiceExt {
    /// Run `body` with `namespace` active
    fn run_scoped<F>(&self, namespace: Option<&str>, body: F) -> Result<(), NamespaceError>
    where
        F: FnOnce();

    /// Run `body` with `namespace` active and return its result
    ///
    /// The activation is closed before returning, including when `body` panics.
    fn call_scoped<F, R>(&self, namespace: Option<&str>, body: F) -> Result<R, NamespaceError>
    where
        F: FnOnce() -> R;
}

impl<S> NamespaceServiceExt for S
where
    S: NamespaceService + ?Sized,
{
    fn run_scoped<F>(&self, namespace: Option<&str>, body: F) -> Result<(), NamespaceError>
    where
        F: FnOnce(),
    {
        self.call_scoped(namespace, body)
    }

    fn call_scoped<F, R>(&self, namespace: Option<&str>, body: F) -> Result<R, NamespaceError>
    where
        F: FnOnce() -> R,
    {
        match self.scoped_context(namespace)? {
            Some(context) => Ok(activation::call_scoped(&context, body)),
            None => Ok(body()),
        }
    }
}

impl NamespaceService for NamespaceRegistry {
    fn is_enabled(&self) -> bool {
        true
    }

    fn add_namespace(
        &self,
        name: &str,
        resources: &[ResourceDefinition],
    ) -> Result<(), NamespaceError> {
        NamespaceRegistry::add_namespace(self, name, resources)
    }

    fn remove_namespace(&self, name: &str) -> bool {
        NamespaceRegistry::remove_namespace(self, name)
    }

    fn has_namespace(&self, name: &str) -> bool {
        NamespaceRegistry::has_namespace(self, name)
    }

    fn is_default_namespace_defined(&self) -> bool {
        NamespaceRegistry::is_default_namespace_defined(self)
    }

    fn context_for_namespace(&self, name: &str) -> Option<Arc<IsolatedCodeContext>> {
        self.get_context(name)
    }

    fn scoped_context(
        &self,
        namespace: Option<&str>,
    ) -> Result<Option<Arc<IsolatedCodeContext>>, NamespaceError> {
        match namespace {
            Some(name) => self
                .get_context(name)
                .map(Some)
                .ok_or_else(|| NamespaceError::UnknownNamespace(name.to_string())),
            None => Ok(self.get_context(DEFAULT_NAMESPACE_ID)),
        }
    }
}

/// Service used when namespaces are disabled; every operation does nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpNamespaceService;

impl NamespaceService for NoOpNamespaceService {
    fn is_enabled(&self) -> bool {
        false
    }

    fn add_namespace(
        &self,
        _name: &str,
        _resources: &[ResourceDefinition],
    ) -> Result<(), NamespaceError> {
        Ok(())
    }

    fn remove_namespace(&self, _name: &str) -> bool {
        false
    }

    fn has_namespace(&self, _name: &str) -> bool {
        false
    }

    fn is_default_namespace_defined(&self) -> bool {
        false
    }

    fn context_for_namespace(&self, _name: &str) -> Option<Arc<IsolatedCodeContext>> {
        None
    }

    fn scoped_context(
        &self,
        _namespace: Option<&str>,
    ) -> Result<Option<Arc<IsolatedCodeContext>>, NamespaceError> {
        Ok(None)
    }
}

/// Build the service described by `config`
///
/// Disabled configurations get [`NoOpNamespaceService`].
pub fn namespace_service(
    config: &NsloadConfig,
    plugins: Arc<dyn PluginRegistry>,
    host: Option<Arc<dyn CodeSource>>,
) -> Result<Arc<dyn NamespaceService>, NamespaceError> {
    config.ensure_valid()?;
    if !config.namespaces.enabled {
        info!("Namespaces disabled, using no-op service");
        return Ok(Arc::new(NoOpNamespaceService));
    }
    let registry = NamespaceRegistry::from_config(config, plugins, host)?;
    Ok(Arc::new(registry))
}

/// Resolves through whichever namespace is active on the calling thread
///
/// Picks the current context of the active namespace, or the host when nothing
/// is active or the active namespace has since been removed.
pub struct NamespaceAwareResolver {
    id: ContextId,
    registry: Arc<NamespaceRegistry>,
}

impl NamespaceAwareResolver {
    pub fn new(registry: Arc<NamespaceRegistry>) -> Self {
        Self {
            id: ContextId::next(),
            registry,
        }
    }

    /// The source a lookup on this thread would go to right now
    pub fn pick(&self) -> Option<Arc<dyn CodeSource>> {
        let active = activation::current_namespace()
            .and_then(|namespace| self.registry.get_context(&namespace));
        match active {
            Some(context) => Some(context as Arc<dyn CodeSource>),
            None => self.registry.host().cloned(),
        }
    }

    fn not_found(&self, key: &ArtifactKey) -> NamespaceError {
        NamespaceError::ArtifactNotFound {
            key: key.clone(),
            context: self.id,
        }
    }
}

impl CodeSource for NamespaceAwareResolver {
    fn identity(&self) -> ContextId {
        self.id
    }

    fn label(&self) -> &str {
        "namespace-aware"
    }

    fn lookup(&self, key: &ArtifactKey) -> Result<Artifact, NamespaceError> {
        match self.pick() {
            Some(source) => source.lookup(key),
            None => Err(self.not_found(key)),
        }
    }

    fn lookup_all(&self, key: &ArtifactKey) -> Result<Vec<Artifact>, NamespaceError> {
        match self.pick() {
            Some(source) => source.lookup_all(key),
            None => Ok(Vec::new()),
        }
    }
}

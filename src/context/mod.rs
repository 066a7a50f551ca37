//! Isolated code contexts
//!
//! An [`IsolatedCodeContext`] is the immutable resolution unit owned by one version
//! of a namespace. It holds a snapshot of compressed entries, a resolution order and
//! an optional non-owning reference to a delegate [`CodeSource`]. Replacing a
//! namespace builds a new context; the old one is shut down, never mutated.
//!
//! Shutdown is a two step transition (`ShuttingDown`, then `Disposed`). Entering
//! `ShuttingDown` waits for resolutions already running against the context to
//! finish, so a resolution either completes with the prior content or fails with
//! [`NamespaceError::ContextShutdown`].

pub mod fingerprint;
pub mod materialize;
pub mod source;

use crate::error::NamespaceError;
use crate::extract::ArtifactMap;
use crate::types::{ArtifactKey, ContextId, ContextState, Fingerprint, ResolutionOrder};
use chrono::{DateTime, Utc};
use materialize::{Artifact, Materializer, Origin, RawMaterializer};
use parking_lot::{Condvar, Mutex};
use source::CodeSource;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, warn};

/// Builder for [`IsolatedCodeContext`]
pub struct ContextBuilder {
    namespace: String,
    entries: ArtifactMap,
    order: ResolutionOrder,
    parent: Option<Weak<dyn CodeSource>>,
    materializer: Arc<dyn Materializer>,
}

impl ContextBuilder {
    pub fn new(namespace: impl Into<String>, entries: ArtifactMap) -> Self {
        Self {
            namespace: namespace.into(),
            entries,
            order: ResolutionOrder::default(),
            parent: None,
            materializer: Arc::new(RawMaterializer),
        }
    }

    pub fn order(mut self, order: ResolutionOrder) -> Self {
        self.order = order;
        self
    }

    /// Delegate source. Only a weak reference is kept.
    pub fn parent(mut self, parent: &Arc<dyn CodeSource>) -> Self {
        self.parent = Some(Arc::downgrade(parent));
        self
    }

    pub fn parent_weak(mut self, parent: Option<Weak<dyn CodeSource>>) -> Self {
        self.parent = parent;
        self
    }

    pub fn materializer(mut self, materializer: Arc<dyn Materializer>) -> Self {
        self.materializer = materializer;
        self
    }

    pub fn build(self) -> Arc<IsolatedCodeContext> {
        let id = ContextId::next();
        let fingerprint = fingerprint::compute_fingerprint(&self.entries, self.order);
        Arc::new(IsolatedCodeContext {
            id,
            origin: Origin {
                context: id,
                namespace: Arc::from(self.namespace.as_str()),
            },
            entries: self.entries,
            order: self.order,
            parent: self.parent,
            materializer: self.materializer,
            fingerprint,
            created_at: Utc::now(),
            state: AtomicU8::new(ContextState::Active as u8),
            shutdown_logged: AtomicBool::new(false),
            in_flight: Mutex::new(0),
            drained: Condvar::new(),
        })
    }
}

/// Immutable, versioned resolution unit of one namespace
pub struct IsolatedCodeContext {
    id: ContextId,
    origin: Origin,
    entries: ArtifactMap,
    order: ResolutionOrder,
    parent: Option<Weak<dyn CodeSource>>,
    materializer: Arc<dyn Materializer>,
    fingerprint: Fingerprint,
    created_at: DateTime<Utc>,
    state: AtomicU8,
    shutdown_logged: AtomicBool,
    in_flight: Mutex<usize>,
    drained: Condvar,
}

/// Marks one resolution running against a context
pub(crate) struct InFlight<'a> {
    context: &'a IsolatedCodeContext,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        let mut count = self.context.in_flight.lock();
        *count -= 1;
        if *count == 0 {
            self.context.drained.notify_all();
        }
    }
}

impl IsolatedCodeContext {
    pub fn builder(namespace: impl Into<String>, entries: ArtifactMap) -> ContextBuilder {
        ContextBuilder::new(namespace, entries)
    }

    pub fn id(&self) -> ContextId {
        self.id
    }

    pub fn namespace(&self) -> &str {
        &self.origin.namespace
    }

    pub fn order(&self) -> ResolutionOrder {
        self.order
    }

    pub fn fingerprint(&self) -> &Fingerprint {
        &self.fingerprint
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Keys held by this context itself, in key order
    pub fn keys(&self) -> impl Iterator<Item = &ArtifactKey> {
        self.entries.keys()
    }

    pub fn contains_local(&self, key: &ArtifactKey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn state(&self) -> ContextState {
        ContextState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn is_active(&self) -> bool {
        self.state() == ContextState::Active
    }

    /// Resolve a code unit by canonical id
    pub fn resolve(&self, id: &str) -> Result<Artifact, NamespaceError> {
        self.lookup(&ArtifactKey::code(id))
    }

    /// Every code unit matching `id` across this context and its parent chain
    pub fn enumerate(&self, id: &str) -> Result<Vec<Artifact>, NamespaceError> {
        self.lookup_all(&ArtifactKey::code(id))
    }

    /// Resolve a data file by path
    pub fn find_resource(&self, path: &str) -> Result<Artifact, NamespaceError> {
        self.lookup(&ArtifactKey::data(path))
    }

    /// Every data file at `path` across this context and its parent chain
    pub fn find_resources(&self, path: &str) -> Result<Vec<Artifact>, NamespaceError> {
        self.lookup_all(&ArtifactKey::data(path))
    }

    /// Resolve from this context's own entries only, never the parent
    pub fn find_local(&self, key: &ArtifactKey) -> Result<Option<Artifact>, NamespaceError> {
        let _flight = self.enter()?;
        self.materialize_local(key)
    }

    /// Resolve the ids `artifact` declares links to through its defining source
    ///
    /// A unit defined by a parent links against the parent, not against this
    /// context, mirroring how the unit itself was found.
    pub fn resolve_links(&self, artifact: &Artifact) -> Result<Vec<Artifact>, NamespaceError> {
        let defining = artifact.defining_context();
        if defining == self.id {
            return artifact
                .links()
                .iter()
                .map(|link| self.resolve(link))
                .collect();
        }

        let mut next = self.parent_source();
        while let Some(source) = next {
            if source.identity() == defining {
                return artifact
                    .links()
                    .iter()
                    .map(|link| source.lookup(&ArtifactKey::code(link.as_str())))
                    .collect();
            }
            next = source.parent_source();
        }

        Err(NamespaceError::ArtifactNotFound {
            key: artifact.key().clone(),
            context: self.id,
        })
    }

    /// Retire this context: `ShuttingDown`, then `Disposed`
    pub fn shutdown(&self) {
        self.begin_shutdown();
        self.finish_shutdown();
    }

    /// Move to `ShuttingDown` and wait for in-flight resolutions to drain
    ///
    /// Returns `false` if the context had already left `Active`.
    pub(crate) fn begin_shutdown(&self) -> bool {
        let mut count = self.in_flight.lock();
        if self.state() != ContextState::Active {
            return false;
        }
        self.state
            .store(ContextState::ShuttingDown as u8, Ordering::Release);
        debug!(
            namespace = %self.namespace(),
            context = %self.id,
            in_flight = *count,
            "Context shutting down"
        );
        while *count > 0 {
            self.drained.wait(&mut count);
        }
        true
    }

    pub(crate) fn finish_shutdown(&self) {
        let previous = self
            .state
            .fetch_max(ContextState::Disposed as u8, Ordering::AcqRel);
        if previous != ContextState::Disposed as u8 {
            debug!(namespace = %self.namespace(), context = %self.id, "Context disposed");
        }
    }

    /// Hold the context open; shutdown waits until the guard drops
    pub(crate) fn enter(&self) -> Result<InFlight<'_>, NamespaceError> {
        let mut count = self.in_flight.lock();
        if self.state() != ContextState::Active {
            drop(count);
            return Err(self.shutdown_error());
        }
        *count += 1;
        Ok(InFlight { context: self })
    }

    fn shutdown_error(&self) -> NamespaceError {
        if !self.shutdown_logged.swap(true, Ordering::AcqRel) {
            warn!(
                namespace = %self.namespace(),
                context = %self.id,
                "Resolution attempted on a retired context; it was disposed when its namespace \
                 was replaced or removed"
            );
        }
        NamespaceError::ContextShutdown {
            context: self.id,
            namespace: self.namespace().to_string(),
        }
    }

    fn materialize_local(&self, key: &ArtifactKey) -> Result<Option<Artifact>, NamespaceError> {
        match self.entries.get(key) {
            Some(entry) => {
                let bytes = entry.decompress()?;
                self.materializer
                    .materialize(key, bytes, &self.origin)
                    .map(Some)
            }
            None => Ok(None),
        }
    }

    fn not_found(&self, key: &ArtifactKey) -> NamespaceError {
        NamespaceError::ArtifactNotFound {
            key: key.clone(),
            context: self.id,
        }
    }

    fn delegate(&self, key: &ArtifactKey) -> Result<Artifact, NamespaceError> {
        match self.parent_source() {
            Some(parent) => parent.lookup(key).map_err(|e| {
                if e.is_not_found() {
                    self.not_found(key)
                } else {
                    e
                }
            }),
            None => Err(self.not_found(key)),
        }
    }

    fn delegate_all(&self, key: &ArtifactKey) -> Result<Vec<Artifact>, NamespaceError> {
        match self.parent_source() {
            Some(parent) => parent.lookup_all(key),
            None => Ok(Vec::new()),
        }
    }
}

impl CodeSource for IsolatedCodeContext {
    fn identity(&self) -> ContextId {
        self.id
    }

    fn label(&self) -> &str {
        self.namespace()
    }

    fn lookup(&self, key: &ArtifactKey) -> Result<Artifact, NamespaceError> {
        let _flight = self.enter()?;
        match self.order {
            ResolutionOrder::ChildFirst => match self.materialize_local(key)? {
                Some(artifact) => Ok(artifact),
                None => self.delegate(key),
            },
            ResolutionOrder::ParentFirst => match self.delegate(key) {
                Ok(artifact) => Ok(artifact),
                Err(e) if e.is_not_found() => {
                    self.materialize_local(key)?.ok_or_else(|| self.not_found(key))
                }
                Err(e) => Err(e),
            },
        }
    }

    fn lookup_all(&self, key: &ArtifactKey) -> Result<Vec<Artifact>, NamespaceError> {
        let _flight = self.enter()?;
        let local = self.materialize_local(key)?;
        let inherited = self.delegate_all(key)?;

        let mut all = Vec::with_capacity(inherited.len() + 1);
        match self.order {
            ResolutionOrder::ChildFirst => {
                all.extend(local);
                all.extend(inherited);
            }
            ResolutionOrder::ParentFirst => {
                all.extend(inherited);
                all.extend(local);
            }
        }
        Ok(all)
    }

    fn parent_source(&self) -> Option<Arc<dyn CodeSource>> {
        self.parent.as_ref().and_then(Weak::upgrade)
    }
}

impl std::fmt::Debug for IsolatedCodeContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IsolatedCodeContext")
            .field("id", &self.id)
            .field("namespace", &self.namespace())
            .field("order", &self.order)
            .field("entries", &self.entries.len())
            .field("state", &self.state())
            .field("fingerprint", &fingerprint::short_hex(&self.fingerprint))
            .finish()
    }
}

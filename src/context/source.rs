//! The resolution seam shared by isolated contexts and host sources.

use crate::context::materialize::{Artifact, Materializer, Origin, RawMaterializer};
use crate::error::NamespaceError;
use crate::extract::{ArtifactMap, ResourceExtractor};
use crate::resource::ResourceDefinition;
use crate::types::{ArtifactKey, ContextId};
use std::sync::Arc;

/// Something that can resolve artifact keys
pub trait CodeSource: Send + Sync {
    /// Identity used for ownership checks and bridge attribution
    fn identity(&self) -> ContextId;

    /// Namespace name or another human readable label
    fn label(&self) -> &str;

    /// First match, following this source's resolution order
    fn lookup(&self, key: &ArtifactKey) -> Result<Artifact, NamespaceError>;

    /// Every match along the delegation chain, in resolution order
    fn lookup_all(&self, key: &ArtifactKey) -> Result<Vec<Artifact>, NamespaceError>;

    /// The delegate this source falls back to, if it is still alive
    fn parent_source(&self) -> Option<Arc<dyn CodeSource>> {
        None
    }

    fn find_resource(&self, path: &str) -> Result<Artifact, NamespaceError> {
        self.lookup(&ArtifactKey::data(path))
    }

    fn find_resources(&self, path: &str) -> Result<Vec<Artifact>, NamespaceError> {
        self.lookup_all(&ArtifactKey::data(path))
    }
}

/// Immutable source for the member's own artifacts
///
/// Has no parent and never shuts down. Typically installed as the host parent of
/// every namespace context.
pub struct StaticCodeSource {
    id: ContextId,
    origin: Origin,
    entries: ArtifactMap,
    materializer: Arc<dyn Materializer>,
}

impl StaticCodeSource {
    pub fn new(label: &str, entries: ArtifactMap) -> Self {
        Self::with_materializer(label, entries, Arc::new(RawMaterializer))
    }

    pub fn with_materializer(
        label: &str,
        entries: ArtifactMap,
        materializer: Arc<dyn Materializer>,
    ) -> Self {
        let id = ContextId::next();
        Self {
            id,
            origin: Origin {
                context: id,
                namespace: Arc::from(label),
            },
            entries,
            materializer,
        }
    }

    /// Build from raw definitions with the default extractor
    pub fn from_definitions(
        label: &str,
        resources: &[ResourceDefinition],
    ) -> Result<Self, NamespaceError> {
        let entries = ResourceExtractor::default().extract_all(resources)?;
        Ok(Self::new(label, entries))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn materialize(&self, key: &ArtifactKey) -> Result<Option<Artifact>, NamespaceError> {
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
}

impl CodeSource for StaticCodeSource {
    fn identity(&self) -> ContextId {
        self.id
    }

    fn label(&self) -> &str {
        &self.origin.namespace
    }

    fn lookup(&self, key: &ArtifactKey) -> Result<Artifact, NamespaceError> {
        self.materialize(key)?
            .ok_or_else(|| NamespaceError::ArtifactNotFound {
                key: key.clone(),
                context: self.id,
            })
    }

    fn lookup_all(&self, key: &ArtifactKey) -> Result<Vec<Artifact>, NamespaceError> {
        Ok(self.materialize(key)?.into_iter().collect())
    }
}

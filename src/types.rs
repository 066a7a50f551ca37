//! Core identifiers shared across the crate.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Reserved name of the fallback namespace
pub const DEFAULT_NAMESPACE_ID: &str = "default";

/// BLAKE3 digest of a context's entries
pub type Fingerprint = [u8; 32];

static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a code context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContextId(u64);

impl ContextId {
    /// Allocate the next identity
    pub fn next() -> Self {
        ContextId(NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ctx#{}", self.0)
    }
}

/// Kind of a stored artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    /// Code unit, addressed by canonical dotted id
    Code,
    /// Any other file, addressed by path
    DataFile,
}

/// Type-tagged lookup key, so a code unit and a data file may share a base name
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ArtifactKey {
    pub kind: ArtifactKind,
    pub id: String,
}

impl ArtifactKey {
    pub fn code(id: impl Into<String>) -> Self {
        Self {
            kind: ArtifactKind::Code,
            id: id.into(),
        }
    }

    pub fn data(path: impl Into<String>) -> Self {
        Self {
            kind: ArtifactKind::DataFile,
            id: path.into(),
        }
    }
}

impl fmt::Display for ArtifactKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            ArtifactKind::Code => write!(f, "code:{}", self.id),
            ArtifactKind::DataFile => write!(f, "file:{}", self.id),
        }
    }
}

/// Lookup policy between a context and its delegate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionOrder {
    /// Own entries first, then the parent
    #[default]
    ChildFirst,
    /// Parent first, own entries on a parent miss
    ParentFirst,
}

/// Lifecycle of a code context. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum ContextState {
    Active = 0,
    ShuttingDown = 1,
    Disposed = 2,
}

impl ContextState {
    pub(crate) fn from_u8(raw: u8) -> Self {
        match raw {
            0 => ContextState::Active,
            1 => ContextState::ShuttingDown,
            _ => ContextState::Disposed,
        }
    }
}

//! Error types for namespace isolation and dynamic code loading.

use crate::types::{ArtifactKey, ContextId};
use thiserror::Error;

/// Errors raised by the registry, extraction and resolution paths
#[derive(Debug, Error)]
pub enum NamespaceError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Malformed resource '{id}': {reason}")]
    ResourceFormat { id: String, reason: String },

    #[error("Duplicate resource {0} in one extraction")]
    DuplicateResource(ArtifactKey),

    #[error("Artifact rejected by name filter: {0}")]
    ArtifactRejected(String),

    #[error("Artifact not found: {key} (searched from context {context})")]
    ArtifactNotFound { key: ArtifactKey, context: ContextId },

    #[error("Context {context} for namespace '{namespace}' has been shut down")]
    ContextShutdown { context: ContextId, namespace: String },

    #[error("Stored artifact {key} is corrupt: {reason}")]
    CorruptArtifact { key: ArtifactKey, reason: String },

    #[error("There is no namespace defined with name '{0}'")]
    UnknownNamespace(String),

    #[error("Activation error: {0}")]
    Activation(#[from] ActivationError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl NamespaceError {
    /// True for the not-found outcome of a resolution
    pub fn is_not_found(&self) -> bool {
        matches!(self, NamespaceError::ArtifactNotFound { .. })
    }

    /// True when the resolving context was already retired
    pub fn is_shutdown(&self) -> bool {
        matches!(self, NamespaceError::ContextShutdown { .. })
    }
}

impl From<config::ConfigError> for NamespaceError {
    fn from(err: config::ConfigError) -> Self {
        NamespaceError::Config(err.to_string())
    }
}

/// Activation stack misuse. These are caller bugs and are never retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ActivationError {
    #[error("Attempted to deactivate namespace '{requested}' but the active frame is '{active}'")]
    Mismatch { requested: String, active: String },

    #[error("Attempted to deactivate namespace '{0}' but no namespace is active")]
    NotActive(String),
}

/// Failures reported by a shared plugin registry
#[derive(Debug, Clone, Error)]
pub enum RegistryError {
    #[error("Plugin '{provider}' for service '{service}' rejected: {reason}")]
    Rejected {
        service: String,
        provider: String,
        reason: String,
    },

    #[error("Unknown plugin handle: {0}")]
    UnknownHandle(u64),
}

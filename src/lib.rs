//! nsload: namespace isolation and dynamic code loading
//!
//! User-supplied bundles of code units and data files are installed under a
//! namespace name. Each namespace resolves through its own immutable
//! [`IsolatedCodeContext`], optionally delegating to a host source, and can be
//! replaced or removed at runtime without disturbing other namespaces. A
//! thread-local activation stack tells resolution which namespace is current, and
//! a bridge keeps a shared plugin registry in step with namespace lifecycle.

pub mod activation;
pub mod bridge;
pub mod config;
pub mod context;
pub mod error;
pub mod extract;
pub mod logging;
pub mod registry;
pub mod resource;
pub mod service;
pub mod types;

pub use activation::{ActivationGuard, ActivationSnapshot, ActivationStack};
pub use bridge::directory::{DriverDirectory, DriverRegistryEntry, PluginRegistry};
pub use bridge::{BridgeConfig, ExternalRegistryBridge};
pub use config::{ConfigLoader, NamespaceConfig, NsloadConfig};
pub use context::materialize::{Artifact, DescriptorMaterializer, Materializer, RawMaterializer};
pub use context::source::{CodeSource, StaticCodeSource};
pub use context::IsolatedCodeContext;
pub use error::{ActivationError, NamespaceError, RegistryError};
pub use extract::{ArtifactMap, ExtractorConfig, ResourceEntry, ResourceExtractor};
pub use registry::{NamespaceInfo, NamespaceRegistry};
pub use resource::{ResourceDefinition, ResourceType};
pub use service::{
    NamespaceAwareResolver, NamespaceService, NamespaceServiceExt, NoOpNamespaceService,
};
pub use types::{
    ArtifactKey, ArtifactKind, ContextId, ContextState, ResolutionOrder, DEFAULT_NAMESPACE_ID,
};

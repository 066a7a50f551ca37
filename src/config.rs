//! Configuration
//!
//! Static namespace definitions and engine settings. Sources are layered with the
//! `config` crate: built-in defaults, then `nsload.toml` (plus
//! `nsload.{NSLOAD_ENV}.toml` when that variable is set), then `NSLOAD__*`
//! environment variables.

use crate::bridge::BridgeConfig;
use crate::error::NamespaceError;
use crate::extract::naming::has_extension;
use crate::extract::walker::Walker;
use crate::extract::ExtractorConfig;
use crate::logging::LoggingConfig;
use crate::resource::{ResourceDefinition, ResourceType};
use crate::types::ResolutionOrder;
use config::{ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

mod merge {
    pub mod merge_policy;
}
mod sources {
    pub mod workspace_file;
}

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NsloadConfig {
    #[serde(default)]
    pub namespaces: NamespacesConfig,

    #[serde(default)]
    pub extractor: ExtractorConfig,

    #[serde(default)]
    pub bridge: BridgeConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// How stored bytes become artifacts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaterializerKind {
    /// Opaque bytes, no declared links
    #[default]
    Raw,
    /// Bytes may start with a unit header declaring links
    Descriptor,
}

/// Namespace feature settings and static definitions
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NamespacesConfig {
    /// When false the no-op service is used and nothing is installed
    #[serde(default)]
    pub enabled: bool,

    #[serde(default)]
    pub default_order: ResolutionOrder,

    #[serde(default)]
    pub materializer: MaterializerKind,

    /// Namespaces installed at startup, keyed by name
    #[serde(default)]
    pub namespaces: BTreeMap<String, NamespaceConfig>,
}

impl NamespacesConfig {
    /// Configured namespaces with their names filled in from the map keys
    pub fn resolved(&self) -> Vec<NamespaceConfig> {
        self.namespaces
            .iter()
            .map(|(key, namespace)| {
                let mut namespace = namespace.clone();
                if namespace.name.is_empty() {
                    namespace.name = key.clone();
                }
                namespace
            })
            .collect()
    }
}

/// One namespace: its name, resolution order and resources
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamespaceConfig {
    /// Defaults to the key the namespace is listed under
    #[serde(default)]
    pub name: String,

    /// Overrides `namespaces.default_order`
    #[serde(default)]
    pub order: Option<ResolutionOrder>,

    #[serde(default)]
    pub resources: Option<Vec<ResourceConfig>>,
}

impl NamespaceConfig {
    /// Namespace whose resources are carried inline
    pub fn inline(name: impl Into<String>, resources: Vec<ResourceDefinition>) -> Self {
        Self {
            name: name.into(),
            order: None,
            resources: Some(resources.into_iter().map(ResourceConfig::from).collect()),
        }
    }

    /// Read every resource into a definition
    ///
    /// Absent resources are an invalid argument; an empty list is allowed.
    pub fn to_definitions(&self) -> Result<Vec<ResourceDefinition>, NamespaceError> {
        let resources = self.resources.as_ref().ok_or_else(|| {
            NamespaceError::InvalidArgument(format!(
                "namespace '{}' has no resources defined",
                self.name
            ))
        })?;
        resources.iter().map(ResourceConfig::to_definition).collect()
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("Namespace name cannot be blank".to_string());
        }
        let Some(resources) = &self.resources else {
            return Err("Resources must be defined".to_string());
        };
        let mut ids = BTreeMap::new();
        for resource in resources {
            resource.validate()?;
            if ids.insert(resource.id.as_str(), ()).is_some() {
                return Err(format!("Duplicate resource id '{}'", resource.id));
            }
        }
        Ok(())
    }
}

/// One resource: exactly one of `path`, `payload_hex` or `dir`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceConfig {
    pub id: String,

    /// Inferred when absent: `dir` is an archive, as is a `path` ending in
    /// `.jar` or `.zip`; anything else is a single code unit
    #[serde(default)]
    pub kind: Option<ResourceType>,

    #[serde(default)]
    pub path: Option<PathBuf>,

    #[serde(default)]
    pub payload_hex: Option<String>,

    #[serde(default)]
    pub dir: Option<PathBuf>,
}

impl From<ResourceDefinition> for ResourceConfig {
    fn from(definition: ResourceDefinition) -> Self {
        Self {
            id: definition.id,
            kind: Some(definition.kind),
            path: None,
            payload_hex: Some(hex::encode(&definition.payload)),
            dir: None,
        }
    }
}

impl ResourceConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.id.trim().is_empty() {
            return Err("Resource id cannot be blank".to_string());
        }
        let sources = [
            self.path.is_some(),
            self.payload_hex.is_some(),
            self.dir.is_some(),
        ]
        .iter()
        .filter(|set| **set)
        .count();
        if sources != 1 {
            return Err(format!(
                "Resource '{}' must set exactly one of path, payload_hex or dir",
                self.id
            ));
        }
        if self.dir.is_some() && self.kind.is_some_and(|kind| kind != ResourceType::Archive) {
            return Err(format!("Directory resource '{}' can only be an archive", self.id));
        }
        Ok(())
    }

    pub fn resolved_kind(&self) -> ResourceType {
        if let Some(kind) = self.kind {
            return kind;
        }
        if self.dir.is_some() {
            return ResourceType::Archive;
        }
        let archive_extensions = ["jar".to_string(), "zip".to_string()];
        match &self.path {
            Some(path) if has_extension(&path.to_string_lossy(), &archive_extensions) => {
                ResourceType::Archive
            }
            _ => ResourceType::Code,
        }
    }

    pub fn to_definition(&self) -> Result<ResourceDefinition, NamespaceError> {
        self.validate().map_err(NamespaceError::InvalidArgument)?;
        let kind = self.resolved_kind();

        if let Some(dir) = &self.dir {
            return Walker::new(dir).pack(self.id.clone());
        }
        let payload = match &self.path {
            Some(path) => std::fs::read(path)?,
            None => {
                let encoded = self.payload_hex.as_deref().unwrap_or_default();
                hex::decode(encoded.trim()).map_err(|e| NamespaceError::ResourceFormat {
                    id: self.id.clone(),
                    reason: format!("invalid hex payload: {}", e),
                })?
            }
        };
        Ok(ResourceDefinition::new(self.id.clone(), kind, payload))
    }
}

/// Configuration validation errors
#[derive(Debug, Clone)]
pub enum ValidationError {
    Namespace(String, String),
    Extractor(String),
    Bridge(String),
    Logging(String),
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::Namespace(name, msg) => write!(f, "Namespace '{}': {}", name, msg),
            ValidationError::Extractor(msg) => write!(f, "Extractor: {}", msg),
            ValidationError::Bridge(msg) => write!(f, "Bridge: {}", msg),
            ValidationError::Logging(msg) => write!(f, "Logging: {}", msg),
        }
    }
}

impl std::error::Error for ValidationError {}

impl NsloadConfig {
    /// Validate the entire configuration
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        for (key, namespace) in &self.namespaces.namespaces {
            if !namespace.name.is_empty() && namespace.name != *key {
                errors.push(ValidationError::Namespace(
                    key.clone(),
                    format!("name '{}' does not match its key", namespace.name),
                ));
            }
        }
        for namespace in self.namespaces.resolved() {
            if let Err(e) = namespace.validate() {
                errors.push(ValidationError::Namespace(namespace.name.clone(), e));
            }
        }

        if let Err(e) = self.extractor.validate() {
            errors.push(ValidationError::Extractor(e));
        }

        if self.bridge.services.iter().any(|s| s.trim().is_empty()) {
            errors.push(ValidationError::Bridge(
                "Service names cannot be blank".to_string(),
            ));
        }

        if let Err(e) = self.logging.validate() {
            errors.push(ValidationError::Logging(e));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Validate, folding every problem into one error
    pub fn ensure_valid(&self) -> Result<(), NamespaceError> {
        self.validate().map_err(|errors| {
            let messages: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
            NamespaceError::Config(format!(
                "Configuration validation failed:\n{}",
                messages.join("\n")
            ))
        })
    }
}

/// Loads [`NsloadConfig`] from layered sources
pub struct ConfigLoader;

impl ConfigLoader {
    /// Defaults, `nsload.toml` files in `dir`, then the environment
    pub fn load(dir: &Path) -> Result<NsloadConfig, ConfigError> {
        let builder = merge::merge_policy::builder_with_defaults()?;
        let builder = sources::workspace_file::add_to_builder(builder, dir)?;
        builder
            .add_source(env_source())
            .build()?
            .try_deserialize()
    }

    /// Defaults, one explicit file, then the environment
    pub fn load_from_file(path: &Path) -> Result<NsloadConfig, ConfigError> {
        merge::merge_policy::builder_with_defaults()?
            .add_source(File::from(path).required(true))
            .add_source(env_source())
            .build()?
            .try_deserialize()
    }

    /// Parse a TOML document without consulting files or the environment
    pub fn from_toml_str(toml: &str) -> Result<NsloadConfig, ConfigError> {
        merge::merge_policy::builder_with_defaults()?
            .add_source(File::from_str(toml, config::FileFormat::Toml))
            .build()?
            .try_deserialize()
    }

    /// Built-in defaults only
    pub fn default() -> NsloadConfig {
        NsloadConfig::default()
    }
}

fn env_source() -> Environment {
    Environment::with_prefix("NSLOAD")
        .separator("__")
        .try_parsing(true)
}

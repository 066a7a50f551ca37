//! Resource extraction
//!
//! Normalizes raw resource definitions (single code units, archives, archives of
//! archives) into a canonical artifact map keyed by [`ArtifactKey`]. Payloads are
//! stored zlib-compressed and only inflated when an artifact is resolved.

pub mod filter;
pub mod naming;
pub mod walker;

use crate::error::NamespaceError;
use crate::resource::{ResourceDefinition, ResourceType};
use crate::types::ArtifactKey;
use filter::{NameFilter, NameFilterConfig};
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::{Cursor, Read, Write};
use tracing::debug;
use zip::ZipArchive;

/// Canonical artifact map produced by one extraction
pub type ArtifactMap = BTreeMap<ArtifactKey, ResourceEntry>;

/// A normalized, compressed artifact
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceEntry {
    pub key: ArtifactKey,
    /// zlib-compressed payload
    pub payload: Vec<u8>,
    /// Size of the payload before compression
    pub original_len: u64,
}

impl ResourceEntry {
    /// Compress `bytes` into a new entry
    pub fn compress(key: ArtifactKey, bytes: &[u8]) -> Result<Self, NamespaceError> {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(bytes)?;
        let payload = encoder.finish()?;
        Ok(Self {
            key,
            payload,
            original_len: bytes.len() as u64,
        })
    }

    /// Inflate the stored payload
    pub fn decompress(&self) -> Result<Vec<u8>, NamespaceError> {
        let mut decoder = ZlibDecoder::new(self.payload.as_slice());
        let mut out = Vec::with_capacity(self.original_len as usize);
        decoder
            .read_to_end(&mut out)
            .map_err(|e| NamespaceError::CorruptArtifact {
                key: self.key.clone(),
                reason: e.to_string(),
            })?;
        Ok(out)
    }
}

/// Extraction settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractorConfig {
    /// File extensions (without dot) identifying code units inside archives
    #[serde(default = "default_code_extensions")]
    pub code_extensions: Vec<String>,

    /// File extensions identifying nested archives in an `ArchivesInZip` bundle
    #[serde(default = "default_archive_extensions")]
    pub archive_extensions: Vec<String>,

    /// Allow/deny lists applied to canonical code ids
    #[serde(default)]
    pub filter: NameFilterConfig,
}

fn default_code_extensions() -> Vec<String> {
    vec!["class".to_string()]
}

fn default_archive_extensions() -> Vec<String> {
    vec!["jar".to_string(), "zip".to_string()]
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            code_extensions: default_code_extensions(),
            archive_extensions: default_archive_extensions(),
            filter: NameFilterConfig::default(),
        }
    }
}

impl ExtractorConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.code_extensions.is_empty() {
            return Err("At least one code extension is required".to_string());
        }
        if self
            .code_extensions
            .iter()
            .chain(self.archive_extensions.iter())
            .any(|ext| ext.is_empty() || ext.starts_with('.'))
        {
            return Err("Extensions must be non-empty and given without a leading dot".to_string());
        }
        Ok(())
    }
}

/// Turns resource definitions into canonical artifact maps
#[derive(Debug, Clone)]
pub struct ResourceExtractor {
    config: ExtractorConfig,
    filter: NameFilter,
}

impl ResourceExtractor {
    pub fn new(config: ExtractorConfig) -> Self {
        let filter = NameFilter::new(&config.filter);
        Self { config, filter }
    }

    pub fn config(&self) -> &ExtractorConfig {
        &self.config
    }

    /// Extract one definition into a fresh map
    pub fn extract(&self, resource: &ResourceDefinition) -> Result<ArtifactMap, NamespaceError> {
        let mut map = ArtifactMap::new();
        self.extract_into(resource, &mut map)?;
        Ok(map)
    }

    /// Extract every definition of a namespace into one map
    ///
    /// Duplicates across definitions are rejected the same way as duplicates
    /// inside a single archive.
    pub fn extract_all(
        &self,
        resources: &[ResourceDefinition],
    ) -> Result<ArtifactMap, NamespaceError> {
        let mut map = ArtifactMap::new();
        for resource in resources {
            self.extract_into(resource, &mut map)?;
        }
        Ok(map)
    }

    fn extract_into(
        &self,
        resource: &ResourceDefinition,
        map: &mut ArtifactMap,
    ) -> Result<(), NamespaceError> {
        match resource.kind {
            ResourceType::Code => self.extract_single(resource, map),
            ResourceType::Archive => self.extract_archive(&resource.id, &resource.payload, map),
            ResourceType::ArchivesInZip => self.extract_nested(resource, map),
        }
    }

    fn extract_single(
        &self,
        resource: &ResourceDefinition,
        map: &mut ArtifactMap,
    ) -> Result<(), NamespaceError> {
        let id = naming::canonical_code_id(&resource.id, &self.config.code_extensions).ok_or_else(
            || NamespaceError::ResourceFormat {
                id: resource.id.clone(),
                reason: "not a valid code unit name".to_string(),
            },
        )?;
        self.filter.check(&id)?;
        insert(map, ResourceEntry::compress(ArtifactKey::code(id), &resource.payload)?)
    }

    fn extract_archive(
        &self,
        id: &str,
        bytes: &[u8],
        map: &mut ArtifactMap,
    ) -> Result<(), NamespaceError> {
        let mut archive = ZipArchive::new(Cursor::new(bytes)).map_err(|e| format_error(id, e))?;
        let mut added = 0usize;

        for index in 0..archive.len() {
            let mut file = archive.by_index(index).map_err(|e| format_error(id, e))?;
            if file.is_dir() {
                continue;
            }
            let name = file.name().to_string();
            let mut content = entry_buffer(file.size());
            file.read_to_end(&mut content)
                .map_err(|e| format_error(id, format!("entry '{}': {}", name, e)))?;

            let Some(key) = naming::classify_entry(&name, &self.config.code_extensions) else {
                return Err(format_error(id, format!("unusable entry name '{}'", name)));
            };
            if key.kind == crate::types::ArtifactKind::Code {
                self.filter.check(&key.id)?;
            }
            insert(map, ResourceEntry::compress(key, &content)?)?;
            added += 1;
        }

        debug!(resource = %id, entries = added, "Extracted archive");
        Ok(())
    }

    fn extract_nested(
        &self,
        resource: &ResourceDefinition,
        map: &mut ArtifactMap,
    ) -> Result<(), NamespaceError> {
        let mut outer = ZipArchive::new(Cursor::new(resource.payload.as_slice()))
            .map_err(|e| format_error(&resource.id, e))?;

        for index in 0..outer.len() {
            let mut file = outer
                .by_index(index)
                .map_err(|e| format_error(&resource.id, e))?;
            let name = file.name().to_string();
            if file.is_dir() || !naming::has_extension(&name, &self.config.archive_extensions) {
                debug!(resource = %resource.id, entry = %name, "Skipping non-archive entry");
                continue;
            }
            let mut inner = entry_buffer(file.size());
            file.read_to_end(&mut inner)
                .map_err(|e| format_error(&resource.id, format!("entry '{}': {}", name, e)))?;
            drop(file);

            let inner_id = format!("{}!{}", resource.id, name);
            self.extract_archive(&inner_id, &inner, map)?;
        }
        Ok(())
    }
}

impl Default for ResourceExtractor {
    fn default() -> Self {
        Self::new(ExtractorConfig::default())
    }
}

fn insert(map: &mut ArtifactMap, entry: ResourceEntry) -> Result<(), NamespaceError> {
    if map.contains_key(&entry.key) {
        return Err(NamespaceError::DuplicateResource(entry.key));
    }
    map.insert(entry.key.clone(), entry);
    Ok(())
}

/// Largest preallocation made from a size declared in an archive header
const MAX_ENTRY_PREALLOC: u64 = 1 << 20;

/// Read buffer for an entry; the declared size is only a hint
fn entry_buffer(declared: u64) -> Vec<u8> {
    Vec::with_capacity(declared.min(MAX_ENTRY_PREALLOC) as usize)
}

fn format_error(id: &str, reason: impl std::fmt::Display) -> NamespaceError {
    NamespaceError::ResourceFormat {
        id: id.to_string(),
        reason: reason.to_string(),
    }
}

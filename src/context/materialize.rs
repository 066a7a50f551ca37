//! Materialization of stored artifacts
//!
//! The platform-specific step of turning bytes into an instantiable unit lives
//! behind [`Materializer`]. This crate never executes code; materializers only
//! produce an [`Artifact`] carrying the bytes, its defining context and the ids it
//! declares links to.

use crate::error::NamespaceError;
use crate::types::{ArtifactKey, ArtifactKind, ContextId};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Where an artifact was defined
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Origin {
    pub context: ContextId,
    pub namespace: Arc<str>,
}

/// A resolved artifact
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    key: ArtifactKey,
    bytes: Vec<u8>,
    origin: Origin,
    links: Vec<String>,
}

impl Artifact {
    pub fn new(key: ArtifactKey, bytes: Vec<u8>, origin: Origin, links: Vec<String>) -> Self {
        Self {
            key,
            bytes,
            origin,
            links,
        }
    }

    pub fn key(&self) -> &ArtifactKey {
        &self.key
    }

    pub fn id(&self) -> &str {
        &self.key.id
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// Identity of the context whose own entries held this artifact
    pub fn defining_context(&self) -> ContextId {
        self.origin.context
    }

    pub fn defining_namespace(&self) -> &str {
        &self.origin.namespace
    }

    /// Ids of code units this artifact declares links to (supertype first)
    pub fn links(&self) -> &[String] {
        &self.links
    }
}

/// Pluggable per-platform materialization step
pub trait Materializer: Send + Sync {
    fn materialize(
        &self,
        key: &ArtifactKey,
        bytes: Vec<u8>,
        origin: &Origin,
    ) -> Result<Artifact, NamespaceError>;
}

/// Treats every payload as opaque bytes with no links
#[derive(Debug, Clone, Copy, Default)]
pub struct RawMaterializer;

impl Materializer for RawMaterializer {
    fn materialize(
        &self,
        key: &ArtifactKey,
        bytes: Vec<u8>,
        origin: &Origin,
    ) -> Result<Artifact, NamespaceError> {
        Ok(Artifact::new(key.clone(), bytes, origin.clone(), Vec::new()))
    }
}

/// Header prefix recognized by [`DescriptorMaterializer`]
pub const UNIT_HEADER_PREFIX: &str = "@unit ";

/// Link declarations carried by a code unit
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitHeader {
    #[serde(default)]
    pub extends: Option<String>,
    #[serde(default)]
    pub implements: Vec<String>,
}

impl UnitHeader {
    /// Render a unit: header line followed by `body`
    pub fn encode(&self, body: &[u8]) -> Vec<u8> {
        // UnitHeader only holds strings, serialization cannot fail
        let json = serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string());
        let mut out = Vec::with_capacity(UNIT_HEADER_PREFIX.len() + json.len() + 1 + body.len());
        out.extend_from_slice(UNIT_HEADER_PREFIX.as_bytes());
        out.extend_from_slice(json.as_bytes());
        out.push(b'\n');
        out.extend_from_slice(body);
        out
    }

    fn links(&self) -> Vec<String> {
        self.extends
            .iter()
            .chain(self.implements.iter())
            .cloned()
            .collect()
    }
}

/// Reads link declarations from an optional `@unit {json}` first line
///
/// Code units without a header have no links. Data files are never parsed.
#[derive(Debug, Clone, Copy, Default)]
pub struct DescriptorMaterializer;

impl Materializer for DescriptorMaterializer {
    fn materialize(
        &self,
        key: &ArtifactKey,
        bytes: Vec<u8>,
        origin: &Origin,
    ) -> Result<Artifact, NamespaceError> {
        if key.kind != ArtifactKind::Code {
            return Ok(Artifact::new(key.clone(), bytes, origin.clone(), Vec::new()));
        }

        let header = match parse_header(&bytes) {
            Some(Ok(header)) => header,
            Some(Err(e)) => {
                return Err(NamespaceError::CorruptArtifact {
                    key: key.clone(),
                    reason: format!("invalid unit header: {}", e),
                })
            }
            None => UnitHeader::default(),
        };
        let links = header.links();
        Ok(Artifact::new(key.clone(), bytes, origin.clone(), links))
    }
}

fn parse_header(bytes: &[u8]) -> Option<Result<UnitHeader, serde_json::Error>> {
    let rest = bytes.strip_prefix(UNIT_HEADER_PREFIX.as_bytes())?;
    let line_end = rest.iter().position(|b| *b == b'\n').unwrap_or(rest.len());
    Some(serde_json::from_slice(&rest[..line_end]))
}

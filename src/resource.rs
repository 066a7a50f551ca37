//! Raw resource definitions as supplied by configuration or an administrative API.

use serde::{Deserialize, Serialize};

/// Shape of a raw resource payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    /// A single code unit
    Code,
    /// A zip-format archive of code units and data files
    Archive,
    /// A zip archive whose entries are themselves archives
    ArchivesInZip,
}

/// One user-supplied resource
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceDefinition {
    /// Identifier: the unit's name for `Code`, a free-form label for archives
    pub id: String,
    pub kind: ResourceType,
    #[serde(with = "hex_payload")]
    pub payload: Vec<u8>,
}

impl ResourceDefinition {
    pub fn new(id: impl Into<String>, kind: ResourceType, payload: Vec<u8>) -> Self {
        Self {
            id: id.into(),
            kind,
            payload,
        }
    }

    pub fn code(id: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self::new(id, ResourceType::Code, payload.into())
    }

    pub fn archive(id: impl Into<String>, payload: Vec<u8>) -> Self {
        Self::new(id, ResourceType::Archive, payload)
    }

    pub fn archives_in_zip(id: impl Into<String>, payload: Vec<u8>) -> Self {
        Self::new(id, ResourceType::ArchivesInZip, payload)
    }
}

impl std::fmt::Debug for ResourceDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceDefinition")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("payload_len", &self.payload.len())
            .finish()
    }
}

mod hex_payload {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        hex::decode(encoded).map_err(serde::de::Error::custom)
    }
}

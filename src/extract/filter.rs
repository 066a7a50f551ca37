//! Allow/deny filtering of code unit names.

use crate::error::NamespaceError;
use serde::{Deserialize, Serialize};

/// Prefix lists matched against canonical code ids
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameFilterConfig {
    /// When non-empty, only ids starting with one of these prefixes are accepted
    #[serde(default)]
    pub allow: Vec<String>,

    /// Ids starting with one of these prefixes are always rejected
    #[serde(default)]
    pub deny: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct NameFilter {
    allow: Vec<String>,
    deny: Vec<String>,
}

impl NameFilter {
    pub fn new(config: &NameFilterConfig) -> Self {
        Self {
            allow: config.allow.clone(),
            deny: config.deny.clone(),
        }
    }

    pub fn is_allowed(&self, id: &str) -> bool {
        if self.deny.iter().any(|prefix| id.starts_with(prefix.as_str())) {
            return false;
        }
        self.allow.is_empty() || self.allow.iter().any(|prefix| id.starts_with(prefix.as_str()))
    }

    pub fn check(&self, id: &str) -> Result<(), NamespaceError> {
        if self.is_allowed(id) {
            Ok(())
        } else {
            Err(NamespaceError::ArtifactRejected(id.to_string()))
        }
    }
}

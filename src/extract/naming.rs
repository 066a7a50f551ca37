//! Canonical artifact naming
//!
//! Code units are addressed by dotted ids (`com.acme.Store`), derived from archive
//! paths (`com/acme/Store.class`). Everything else keeps its path.

use crate::types::ArtifactKey;

/// True if `name` ends with `.<ext>` for one of `extensions`
pub fn has_extension(name: &str, extensions: &[String]) -> bool {
    strip_extension(name, extensions).is_some()
}

fn strip_extension<'a>(name: &'a str, extensions: &[String]) -> Option<&'a str> {
    extensions.iter().find_map(|ext| {
        name.strip_suffix(ext.as_str())
            .and_then(|rest| rest.strip_suffix('.'))
    })
}

/// Convert a code unit name to its dotted id
///
/// Accepts either a path with a code extension or an already dotted id.
/// Returns `None` for names with empty segments.
pub fn canonical_code_id(name: &str, code_extensions: &[String]) -> Option<String> {
    let trimmed = name.trim().trim_start_matches('/');
    let base = strip_extension(trimmed, code_extensions).unwrap_or(trimmed);
    let dotted = base.replace(['/', '\\'], ".");
    if dotted.is_empty() || dotted.split('.').any(|segment| segment.is_empty()) {
        return None;
    }
    Some(dotted)
}

/// Classify an archive entry into a type-tagged key
pub fn classify_entry(name: &str, code_extensions: &[String]) -> Option<ArtifactKey> {
    let path = name.trim_start_matches('/');
    if path.is_empty() {
        return None;
    }
    if has_extension(path, code_extensions) {
        canonical_code_id(path, code_extensions).map(ArtifactKey::code)
    } else {
        Some(ArtifactKey::data(path))
    }
}

/// Manifest path listing providers of `service`
pub fn service_manifest_path(prefix: &str, service: &str) -> String {
    format!("{}{}", prefix, service)
}

//! Shared test utilities for integration tests
//!
//! In-memory archive builders, unit helpers and serialized access to the
//! `NSLOAD_*` environment variables.

use nsload::bridge::directory::DriverDirectory;
use nsload::context::materialize::{DescriptorMaterializer, UnitHeader};
use nsload::{NamespaceRegistry, ResourceDefinition};
use std::io::{Cursor, Write};
use std::sync::{Arc, Mutex};
use zip::write::FileOptions;
use zip::ZipWriter;

/// Serializes environment variable access across tests in this binary
static ENV_MUTEX: Mutex<()> = Mutex::new(());

/// Build a zip archive from `(entry name, bytes)` pairs
pub fn zip_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    for (name, bytes) in entries {
        if name.ends_with('/') {
            writer.add_directory(*name, FileOptions::default()).unwrap();
        } else {
            writer.start_file(*name, FileOptions::default()).unwrap();
            writer.write_all(bytes).unwrap();
        }
    }
    writer.finish().unwrap().into_inner()
}

pub fn archive(id: &str, entries: &[(&str, &[u8])]) -> ResourceDefinition {
    ResourceDefinition::archive(id, zip_bytes(entries))
}

pub fn code(id: &str, bytes: &[u8]) -> ResourceDefinition {
    ResourceDefinition::code(id, bytes.to_vec())
}

/// A unit body with a link header
pub fn unit(extends: Option<&str>, implements: &[&str], body: &[u8]) -> Vec<u8> {
    UnitHeader {
        extends: extends.map(str::to_string),
        implements: implements.iter().map(|s| s.to_string()).collect(),
    }
    .encode(body)
}

/// Registry with its own driver directory
pub fn registry_with_directory() -> (NamespaceRegistry, Arc<DriverDirectory>) {
    let directory = Arc::new(DriverDirectory::new());
    let registry = NamespaceRegistry::builder()
        .plugins(directory.clone())
        .materializer(Arc::new(DescriptorMaterializer))
        .build();
    (registry, directory)
}

pub fn registry() -> NamespaceRegistry {
    registry_with_directory().0
}

/// Run `f` with `vars` set, restoring previous values afterwards
pub fn with_env<F, R>(vars: &[(&str, &str)], f: F) -> R
where
    F: FnOnce() -> R,
{
    let _guard = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    let previous: Vec<(String, Option<String>)> = vars
        .iter()
        .map(|(key, _)| (key.to_string(), std::env::var(key).ok()))
        .collect();
    for (key, value) in vars {
        std::env::set_var(key, value);
    }

    let result = f();

    for (key, value) in previous {
        match value {
            Some(value) => std::env::set_var(&key, value),
            None => std::env::remove_var(&key),
        }
    }
    result
}

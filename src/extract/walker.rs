//! Directory bundles
//!
//! Walks a directory of code units and data files and packs it into an
//! in-memory archive, so directory-backed namespaces go through the same
//! extraction path as uploaded archives.

use crate::error::NamespaceError;
use crate::resource::ResourceDefinition;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Directory walker configuration
#[derive(Debug, Clone)]
pub struct WalkerConfig {
    /// Whether to follow symbolic links (default: false)
    pub follow_symlinks: bool,
    /// Entry names to skip anywhere in the tree
    pub ignore_patterns: Vec<String>,
}

impl Default for WalkerConfig {
    fn default() -> Self {
        Self {
            follow_symlinks: false,
            ignore_patterns: vec![".git".to_string(), ".DS_Store".to_string()],
        }
    }
}

/// A file found under the bundle root
#[derive(Debug, Clone)]
pub struct BundleFile {
    /// Path relative to the root, `/`-separated
    pub name: String,
    pub path: PathBuf,
}

/// Directory bundle walker
pub struct Walker {
    root: PathBuf,
    config: WalkerConfig,
}

impl Walker {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            config: WalkerConfig::default(),
        }
    }

    pub fn with_config(root: impl Into<PathBuf>, config: WalkerConfig) -> Self {
        Self {
            root: root.into(),
            config,
        }
    }

    /// Collect all files, sorted by name
    pub fn walk(&self) -> Result<Vec<BundleFile>, NamespaceError> {
        let mut files = Vec::new();

        let walker = WalkDir::new(&self.root)
            .follow_links(self.config.follow_symlinks)
            .into_iter()
            .filter_entry(|entry| !self.should_ignore(entry));

        for entry in walker {
            let entry = entry.map_err(|e| {
                NamespaceError::Io(std::io::Error::new(
                    std::io::ErrorKind::Other,
                    format!("Failed to walk {:?}: {}", self.root, e),
                ))
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path().to_path_buf();
            files.push(BundleFile {
                name: relative_name(&self.root, &path),
                path,
            });
        }

        files.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(files)
    }

    /// Pack the directory into an archive definition with the given id
    pub fn pack(&self, id: impl Into<String>) -> Result<ResourceDefinition, NamespaceError> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        let options = FileOptions::default().compression_method(CompressionMethod::Stored);

        for file in self.walk()? {
            let bytes = std::fs::read(&file.path)?;
            writer
                .start_file(file.name.as_str(), options)
                .map_err(|e| pack_error(&self.root, e))?;
            writer.write_all(&bytes)?;
        }

        let cursor = writer.finish().map_err(|e| pack_error(&self.root, e))?;
        Ok(ResourceDefinition::archive(id, cursor.into_inner()))
    }

    fn should_ignore(&self, entry: &DirEntry) -> bool {
        let name = entry.file_name().to_string_lossy();
        self.config
            .ignore_patterns
            .iter()
            .any(|pattern| name == pattern.as_str())
    }
}

fn relative_name(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

fn pack_error(root: &Path, err: impl std::fmt::Display) -> NamespaceError {
    NamespaceError::ResourceFormat {
        id: root.display().to_string(),
        reason: err.to_string(),
    }
}

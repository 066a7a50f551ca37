//! File source: `nsload.toml` and `nsload.{NSLOAD_ENV}.toml` in a directory

use config::builder::DefaultState;
use config::{ConfigBuilder, ConfigError, File};
use std::path::Path;
use tracing::debug;

/// Add the directory's config files to `builder`, base file first
pub fn add_to_builder(
    mut builder: ConfigBuilder<DefaultState>,
    dir: &Path,
) -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    let mut candidates = vec![dir.join("nsload.toml")];
    if let Ok(env_name) = std::env::var("NSLOAD_ENV") {
        candidates.push(dir.join(format!("nsload.{}.toml", env_name)));
    }

    for path in candidates {
        if path.exists() {
            debug!(config_path = %path.display(), "Adding configuration file");
            builder = builder.add_source(File::from(path.as_path()).required(false));
        }
    }
    Ok(builder)
}

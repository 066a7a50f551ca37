//! Layering defaults: values every later source may override.

use config::builder::DefaultState;
use config::{Config, ConfigBuilder, ConfigError};

/// Config builder with the engine defaults applied
pub fn builder_with_defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    Config::builder()
        .set_default("namespaces.enabled", false)?
        .set_default("namespaces.default_order", "child_first")?
        .set_default("bridge.manifest_prefix", "META-INF/services/")?
        .set_default("logging.level", "info")
}

//! TOML file sources.

use crate::config::paths::xdg_root;
use config::builder::DefaultState;
use config::{ConfigBuilder, ConfigError, File, FileFormat};
use std::path::Path;

/// Add a required config file.
pub fn add_to_builder(
    builder: ConfigBuilder<DefaultState>,
    path: &Path,
) -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::NotFound(path.display().to_string()));
    }
    Ok(builder.add_source(File::from(path).format(FileFormat::Toml).required(true)))
}

/// Add `$XDG_CONFIG_HOME/histcache/config.toml` when it exists.
pub fn add_global_to_builder(
    builder: ConfigBuilder<DefaultState>,
) -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    match xdg_root::config_file() {
        Some(path) => Ok(builder.add_source(
            File::from(path.as_path())
                .format(FileFormat::Toml)
                .required(false),
        )),
        None => Ok(builder),
    }
}

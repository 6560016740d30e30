//! MergeService: orchestrates sources, applies defaults, deserializes to CacheConfig.

use super::policy;
use crate::config::sources::{environment, file};
use crate::config::CacheConfig;
use config::ConfigError;
use std::path::Path;

/// Merge service for config composition.
pub struct MergeService;

impl MergeService {
    /// Precedence: defaults (lowest) -> global file -> environment (highest).
    pub fn load() -> Result<CacheConfig, ConfigError> {
        let builder = policy::builder_with_defaults()?;
        let builder = file::add_global_to_builder(builder)?;
        let builder = environment::add_to_builder(builder)?;

        builder.build()?.try_deserialize()
    }

    /// Precedence: defaults (lowest) -> `path` -> environment (highest).
    pub fn load_from_file(path: &Path) -> Result<CacheConfig, ConfigError> {
        let builder = policy::builder_with_defaults()?;
        let builder = file::add_to_builder(builder, path)?;
        let builder = environment::add_to_builder(builder)?;

        builder.build()?.try_deserialize()
    }
}

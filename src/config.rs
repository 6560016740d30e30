//! Configuration
//!
//! Layered configuration: built-in defaults, then an optional TOML file, then
//! `HISTCACHE__SECTION__KEY` environment variables.

pub mod facade;
pub mod merge;
pub mod paths;
pub mod sources;
pub mod store_paths;

pub use facade::ConfigLoader;
pub use store_paths::StoreConfig;

use crate::error::ApiError;
use crate::logging::LoggingConfig;
use crate::watch::WatchSettings;
use serde::{Deserialize, Serialize};

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub watch: WatchSettings,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl CacheConfig {
    pub fn validate(&self) -> Result<(), ApiError> {
        if self.watch.page_size == 0 {
            return Err(ApiError::ConfigError(
                "watch.page_size must be at least 1".to_string(),
            ));
        }
        if self.store.change_buffer == 0 {
            return Err(ApiError::ConfigError(
                "store.change_buffer must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

//! StoreConfig and store path resolution.

use crate::config::paths::xdg_root;
use crate::error::ApiError;
use crate::store::persistence::DEFAULT_CHANGE_BUFFER;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

fn default_change_buffer() -> usize {
    DEFAULT_CHANGE_BUFFER
}

/// Content store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Store directory; None means the XDG data directory
    #[serde(default)]
    pub path: Option<PathBuf>,

    /// Keep the store in memory only
    #[serde(default)]
    pub temporary: bool,

    /// Change feed capacity before slow subscribers start losing events
    #[serde(default = "default_change_buffer")]
    pub change_buffer: usize,
}

impl StoreConfig {
    /// Resolve the on-disk location of the store.
    pub fn resolve_path(&self) -> Result<PathBuf, ApiError> {
        match &self.path {
            Some(path) if !path.as_os_str().is_empty() => Ok(path.clone()),
            _ => xdg_root::default_store_dir(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: None,
            temporary: false,
            change_buffer: default_change_buffer(),
        }
    }
}

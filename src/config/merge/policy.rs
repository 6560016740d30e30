//! Built-in defaults every load starts from.

use crate::store::persistence::DEFAULT_CHANGE_BUFFER;
use config::builder::DefaultState;
use config::{Config, ConfigBuilder, ConfigError};

pub(crate) fn builder_with_defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    Config::builder()
        .set_default("store.temporary", false)?
        .set_default("store.change_buffer", DEFAULT_CHANGE_BUFFER as u64)?
        .set_default("watch.page_size", 50u64)?
        .set_default("watch.debounce_ms", 100u64)
}

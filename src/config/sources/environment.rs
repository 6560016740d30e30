//! Environment variable source: HISTCACHE__* prefix with __ separator

use config::builder::DefaultState;
use config::ConfigBuilder;
use config::ConfigError;
use config::Environment;

/// Add environment variable overlay to builder.
/// `HISTCACHE__WATCH__PAGE_SIZE=20` sets `watch.page_size`.
pub fn add_to_builder(
    builder: ConfigBuilder<DefaultState>,
) -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    Ok(builder.add_source(
        Environment::with_prefix("HISTCACHE")
            .separator("__")
            .try_parsing(true),
    ))
}

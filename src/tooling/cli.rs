//! CLI Tooling
//!
//! Command-line interface over `HistoryCache`: seed the store from JSON pages,
//! inspect records and windows, and follow a live window.

use crate::api::HistoryCache;
use crate::config::{CacheConfig, ConfigLoader};
use crate::error::ApiError;
use crate::filter::SearchParams;
use crate::logging::init_logging;
use crate::record::ContentRecord;
use crate::store::UpsertStatus;
use crate::types::Hid;
use crate::watch::WatchSettings;
use crate::window::ContentWindow;
use clap::{Parser, Subcommand};
use futures::StreamExt;
use std::fmt::Write as _;
use std::path::PathBuf;
use tracing::{info, warn};

/// Histcache CLI - local cache of history contents
#[derive(Parser)]
#[command(name = "histcache")]
#[command(about = "Local cache and windowed live queries over history contents")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file path (overrides default config loading)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Log format (json, text)
    #[arg(long)]
    pub log_format: Option<String>,

    /// Log output (stdout, stderr, file, file+stderr, both)
    #[arg(long)]
    pub log_output: Option<String>,

    /// Log file path (if output includes "file")
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Ingest a page of records from a JSON array file
    Ingest {
        /// Path to the JSON file
        file: PathBuf,
        /// Replace records that are already cached
        #[arg(long)]
        overwrite: bool,
    },
    /// Look up one record by content id
    Get {
        /// Content id (history-type-id)
        content_id: String,
    },
    /// Print the window around a hid
    Window {
        history_id: String,
        hid: Hid,
        /// Matches on each side of the hid (defaults to config)
        #[arg(long)]
        page_size: Option<usize>,
        /// Filter text, e.g. "deleted:any tag:raw"
        #[arg(long, default_value = "")]
        filter: String,
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// Count records matching a filter
    Count {
        history_id: String,
        #[arg(long, default_value = "")]
        filter: String,
    },
    /// Remove every cached record
    Wipe,
    /// Follow the window around a hid, one JSON line per update, until Ctrl-C
    Watch {
        history_id: String,
        hid: Hid,
        #[arg(long, default_value = "")]
        filter: String,
        /// Debounce period in milliseconds (defaults to config)
        #[arg(long)]
        debounce_ms: Option<u64>,
    },
}

/// CLI execution context
pub struct CliContext {
    cache: HistoryCache,
}

impl CliContext {
    /// Load configuration, install logging, and open the store.
    pub fn new(cli: &Cli) -> Result<Self, ApiError> {
        let mut config = ConfigLoader::resolve(cli.config.as_deref())?;
        if let Some(level) = &cli.log_level {
            config.logging.level = level.clone();
        }
        if let Some(format) = &cli.log_format {
            config.logging.format = format.clone();
        }
        if let Some(output) = &cli.log_output {
            config.logging.output = output.clone();
        }
        if let Some(file) = &cli.log_file {
            config.logging.file = Some(file.clone());
        }
        init_logging(Some(&config.logging))?;
        Self::from_config(&config)
    }

    /// Open the store without touching global logging state.
    pub fn from_config(config: &CacheConfig) -> Result<Self, ApiError> {
        Ok(Self {
            cache: HistoryCache::open(config)?,
        })
    }

    pub fn cache(&self) -> &HistoryCache {
        &self.cache
    }

    pub async fn execute(&self, command: &Commands) -> Result<String, ApiError> {
        match command {
            Commands::Ingest { file, overwrite } => self.ingest(file, *overwrite),
            Commands::Get { content_id } => match self.cache.lookup(content_id)? {
                Some(record) => Ok(serde_json::to_string_pretty(&record)?),
                None => Ok(format!("Not found: {}", content_id)),
            },
            Commands::Window {
                history_id,
                hid,
                page_size,
                filter,
                format,
            } => {
                let params = SearchParams::parse(filter);
                let window = match page_size {
                    Some(page_size) => crate::window::build_window(
                        self.cache.store().as_ref(),
                        history_id,
                        *hid,
                        &params,
                        *page_size,
                    )?,
                    None => self.cache.window(history_id, *hid, &params)?,
                };
                match format.as_str() {
                    "json" => Ok(serde_json::to_string_pretty(&window)?),
                    "text" => Ok(format_window_text(&window)),
                    other => Err(ApiError::ConfigError(format!(
                        "Invalid format: {} (must be 'text' or 'json')",
                        other
                    ))),
                }
            }
            Commands::Count { history_id, filter } => {
                let count = self
                    .cache
                    .count(history_id, &SearchParams::parse(filter))?;
                Ok(count.to_string())
            }
            Commands::Wipe => {
                self.cache.reset_history()?;
                self.cache.flush()?;
                Ok("Store wiped".to_string())
            }
            Commands::Watch {
                history_id,
                hid,
                filter,
                debounce_ms,
            } => {
                let mut settings: WatchSettings = self.cache.settings();
                if let Some(ms) = debounce_ms {
                    settings.debounce = std::time::Duration::from_millis(*ms);
                }
                self.watch(history_id, *hid, SearchParams::parse(filter), settings)
                    .await
            }
        }
    }

    fn ingest(&self, file: &std::path::Path, overwrite: bool) -> Result<String, ApiError> {
        let raw = std::fs::read_to_string(file)?;
        let records: Vec<ContentRecord> = serde_json::from_str(&raw)?;
        let outcomes = self.cache.ingest_page(records, overwrite)?;
        self.cache.flush()?;

        let count = |status: UpsertStatus| outcomes.iter().filter(|o| o.status == status).count();
        Ok(format!(
            "Ingested {} records ({} inserted, {} updated, {} skipped)",
            outcomes.len(),
            count(UpsertStatus::Inserted),
            count(UpsertStatus::Updated),
            count(UpsertStatus::Skipped)
        ))
    }

    async fn watch(
        &self,
        history_id: &str,
        hid: Hid,
        params: SearchParams,
        settings: WatchSettings,
    ) -> Result<String, ApiError> {
        let positions = futures::stream::iter([hid]).chain(futures::stream::pending());
        let mut windows = self
            .cache
            .watch_with(positions, history_id, params, settings);
        info!(history_id, hid, "Watching history contents");

        let mut emitted = 0usize;
        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => break,
                next = windows.next() => match next {
                    Some(Ok(window)) => {
                        emitted += 1;
                        println!("{}", serde_json::to_string(&window)?);
                    }
                    Some(Err(e)) => warn!(error = %e, "Window update failed"),
                    None => break,
                },
            }
        }
        windows.close();
        Ok(format!("Watch stopped after {} windows", emitted))
    }
}

/// One line per record: hid, state, flags, name.
pub fn format_window_text(window: &ContentWindow) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "Window at hid {} ({} items)",
        window.start_key,
        window.len()
    );
    for record in &window.contents {
        let mut flags = String::new();
        if record.is_deleted {
            flags.push('D');
        }
        if record.is_hidden() {
            flags.push('H');
        }
        let marker = if record.hid == window.start_key { '>' } else { ' ' };
        let _ = writeln!(
            out,
            "{}{:>6}  {:<10} {:<2} {}",
            marker,
            record.hid,
            record.state,
            flags,
            record.name.as_deref().unwrap_or("")
        );
    }
    out.trim_end().to_string()
}

//! History Cache API
//!
//! Entry point used by the network layer (page ingest, reset) and the UI
//! (live windows, point lookups). Owns one explicitly constructed store; no
//! global state.

use crate::config::CacheConfig;
use crate::error::ApiError;
use crate::filter::SearchParams;
use crate::record::ContentRecord;
use crate::store::{ContentStore, SledContentStore, UpsertOutcome, UpsertStatus};
use crate::types::{Hid, HistoryId};
use crate::watch::{watch_history_contents, WatchSettings, WindowStream};
use crate::window::{build_window, ContentWindow};
use futures::Stream;
use std::sync::Arc;
use tracing::{info, instrument};

/// Application facade over a content store
#[derive(Clone)]
pub struct HistoryCache {
    store: Arc<dyn ContentStore>,
    settings: WatchSettings,
}

impl HistoryCache {
    pub fn new(store: Arc<dyn ContentStore>, settings: WatchSettings) -> Self {
        Self { store, settings }
    }

    /// Open the store described by `config`.
    pub fn open(config: &CacheConfig) -> Result<Self, ApiError> {
        config.validate()?;
        let store = if config.store.temporary {
            SledContentStore::temporary(config.store.change_buffer)?
        } else {
            let path = config.store.resolve_path()?;
            std::fs::create_dir_all(&path)?;
            SledContentStore::new(&path, config.store.change_buffer)?
        };
        Ok(Self::new(Arc::new(store), config.watch))
    }

    pub fn store(&self) -> &Arc<dyn ContentStore> {
        &self.store
    }

    pub fn settings(&self) -> WatchSettings {
        self.settings
    }

    /// Write one fetched page. `overwrite == false` keeps existing records.
    #[instrument(skip(self, records), fields(count = records.len()))]
    pub fn ingest_page(
        &self,
        records: Vec<ContentRecord>,
        overwrite: bool,
    ) -> Result<Vec<UpsertOutcome>, ApiError> {
        let outcomes = self.store.upsert_many(records, overwrite)?;
        let skipped = outcomes
            .iter()
            .filter(|o| o.status == UpsertStatus::Skipped)
            .count();
        info!(
            written = outcomes.len() - skipped,
            skipped,
            overwrite,
            "Ingested content page"
        );
        Ok(outcomes)
    }

    /// Drop every cached record, e.g. before switching histories.
    pub fn reset_history(&self) -> Result<(), ApiError> {
        self.store.wipe()?;
        Ok(())
    }

    pub fn lookup(&self, content_id: &str) -> Result<Option<ContentRecord>, ApiError> {
        Ok(self.store.get(content_id)?)
    }

    /// One-shot window with the configured page size.
    pub fn window(
        &self,
        history_id: &str,
        target_hid: Hid,
        params: &SearchParams,
    ) -> Result<ContentWindow, ApiError> {
        Ok(build_window(
            self.store.as_ref(),
            history_id,
            target_hid,
            params,
            self.settings.page_size,
        )?)
    }

    pub fn count(&self, history_id: &str, params: &SearchParams) -> Result<usize, ApiError> {
        Ok(self
            .store
            .count(history_id, &|r: &ContentRecord| params.predicate(r))?)
    }

    /// Live windows following `positions`, using the configured settings.
    pub fn watch<S>(
        &self,
        positions: S,
        history_id: impl Into<HistoryId>,
        params: SearchParams,
    ) -> WindowStream
    where
        S: Stream<Item = Hid> + Send + Unpin + 'static,
    {
        self.watch_with(positions, history_id, params, self.settings)
    }

    pub fn watch_with<S>(
        &self,
        positions: S,
        history_id: impl Into<HistoryId>,
        params: SearchParams,
        settings: WatchSettings,
    ) -> WindowStream
    where
        S: Stream<Item = Hid> + Send + Unpin + 'static,
    {
        watch_history_contents(
            Arc::clone(&self.store),
            positions,
            history_id,
            params,
            settings,
        )
    }

    pub fn flush(&self) -> Result<(), ApiError> {
        Ok(self.store.flush()?)
    }
}

//! Content Store
//!
//! Persistent, indexed collection of content records with point lookups,
//! hid-ordered range scans, and a change feed. Acts as the single shared
//! mutable resource behind every window.

pub mod persistence;

use crate::error::StoreError;
use crate::record::ContentRecord;
use crate::types::{ContentKey, Hid, HistoryId};
use tokio::sync::broadcast;

pub use persistence::SledContentStore;

/// Direction of a hid range scan
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanOrder {
    /// `hid >= from`, smallest first
    Ascending,
    /// `hid <= from`, largest first
    Descending,
}

/// Whether a write created or replaced a record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Insert,
    Update,
}

/// A committed write to one record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordChange {
    pub key: ContentKey,
    pub history_id: HistoryId,
    pub hid: Hid,
    pub kind: ChangeKind,
}

/// Store change feed event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeEvent {
    Record(RecordChange),
    /// Every record was removed.
    Reset,
}

impl ChangeEvent {
    pub fn history_id(&self) -> Option<&str> {
        match self {
            ChangeEvent::Record(change) => Some(&change.history_id),
            ChangeEvent::Reset => None,
        }
    }
}

/// What an upsert did with one record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertStatus {
    Inserted,
    Updated,
    /// Key already present and overwriting was not allowed.
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpsertOutcome {
    pub key: ContentKey,
    pub history_id: HistoryId,
    pub hid: Hid,
    pub status: UpsertStatus,
}

impl UpsertOutcome {
    pub fn was_update(&self) -> bool {
        self.status == UpsertStatus::Updated
    }

    pub(crate) fn change(&self) -> Option<ChangeEvent> {
        let kind = match self.status {
            UpsertStatus::Inserted => ChangeKind::Insert,
            UpsertStatus::Updated => ChangeKind::Update,
            UpsertStatus::Skipped => return None,
        };
        Some(ChangeEvent::Record(RecordChange {
            key: self.key.clone(),
            history_id: self.history_id.clone(),
            hid: self.hid,
            kind,
        }))
    }
}

/// Content store interface
///
/// Reads always return owned copies. Change events for a key are published in
/// the order its writes commit.
pub trait ContentStore: Send + Sync {
    /// Insert or replace one record by its derived key.
    fn upsert_one(&self, record: ContentRecord) -> Result<UpsertOutcome, StoreError>;

    /// Ingest a page. With `allow_overwrite == false` existing keys are left untouched.
    fn upsert_many(
        &self,
        records: Vec<ContentRecord>,
        allow_overwrite: bool,
    ) -> Result<Vec<UpsertOutcome>, StoreError>;

    fn get(&self, key: &str) -> Result<Option<ContentRecord>, StoreError>;

    /// Up to `limit` records of `history_id` matching `predicate`, strictly
    /// ordered by hid and starting at `from` (inclusive) in `order`.
    fn range_by_hid(
        &self,
        history_id: &str,
        predicate: &dyn Fn(&ContentRecord) -> bool,
        order: ScanOrder,
        from: Hid,
        limit: usize,
    ) -> Result<Vec<ContentRecord>, StoreError>;

    /// Number of records of `history_id` matching `predicate`.
    fn count(
        &self,
        history_id: &str,
        predicate: &dyn Fn(&ContentRecord) -> bool,
    ) -> Result<usize, StoreError>;

    /// Smallest and largest stored hid of a history.
    fn hid_bounds(&self, history_id: &str) -> Result<Option<(Hid, Hid)>, StoreError>;

    /// Remove every record and publish `ChangeEvent::Reset`.
    fn wipe(&self) -> Result<(), StoreError>;

    /// Make committed writes durable.
    fn flush(&self) -> Result<(), StoreError> {
        Ok(())
    }

    /// Subscribe to the change feed. Slow receivers lose the oldest events.
    fn changes(&self) -> broadcast::Receiver<ChangeEvent>;
}

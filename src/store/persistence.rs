//! Sled-backed content store
//!
//! Two trees: `contents` maps content keys to JSON records, `hid_index` maps
//! `history_id 0x00 hid(be) content_key` to the content key so a history's
//! records can be scanned in hid order in either direction.

use super::{ChangeEvent, ContentStore, ScanOrder, UpsertOutcome, UpsertStatus};
use crate::error::StoreError;
use crate::record::ContentRecord;
use crate::types::Hid;
use parking_lot::Mutex;
use sled::transaction::{ConflictableTransactionError, ConflictableTransactionResult};
use sled::Transactional;
use std::path::Path;
use tokio::sync::broadcast;
use tracing::{debug, info, trace, warn};

const CONTENTS_TREE: &str = "contents";
const HID_INDEX_TREE: &str = "hid_index";
const HID_WIDTH: usize = std::mem::size_of::<Hid>();

/// Default capacity of the change feed ring buffer
pub const DEFAULT_CHANGE_BUFFER: usize = 1024;

fn history_prefix(history_id: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(history_id.len() + 1 + HID_WIDTH);
    key.extend_from_slice(history_id.as_bytes());
    key.push(0);
    key
}

fn hid_prefix(history_id: &str, hid: Hid) -> Vec<u8> {
    let mut key = history_prefix(history_id);
    key.extend_from_slice(&hid.to_be_bytes());
    key
}

fn index_key(history_id: &str, hid: Hid, content_key: &str) -> Vec<u8> {
    let mut key = hid_prefix(history_id, hid);
    key.extend_from_slice(content_key.as_bytes());
    key
}

fn decode_hid(index_key: &[u8], prefix_len: usize) -> Option<Hid> {
    let bytes = index_key.get(prefix_len..prefix_len + HID_WIDTH)?;
    Some(Hid::from_be_bytes(bytes.try_into().ok()?))
}

/// Sled implementation of `ContentStore`
pub struct SledContentStore {
    db: sled::Db,
    contents: sled::Tree,
    hid_index: sled::Tree,
    /// Held across commit and publish so event order matches commit order
    write_lock: Mutex<()>,
    changes_tx: broadcast::Sender<ChangeEvent>,
}

impl SledContentStore {
    /// Open (or create) a store at `path`
    pub fn new(path: &Path, change_buffer: usize) -> Result<Self, StoreError> {
        let db = sled::open(path)?;
        info!(path = %path.display(), "Opened content store");
        Self::from_db(db, change_buffer)
    }

    /// In-memory store that disappears when dropped
    pub fn temporary(change_buffer: usize) -> Result<Self, StoreError> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::from_db(db, change_buffer)
    }

    pub fn from_db(db: sled::Db, change_buffer: usize) -> Result<Self, StoreError> {
        let contents = db.open_tree(CONTENTS_TREE)?;
        let hid_index = db.open_tree(HID_INDEX_TREE)?;
        let (changes_tx, _) = broadcast::channel(change_buffer.max(1));
        Ok(Self {
            db,
            contents,
            hid_index,
            write_lock: Mutex::new(()),
            changes_tx,
        })
    }

    /// Live change feed subscriptions
    pub fn subscriber_count(&self) -> usize {
        self.changes_tx.receiver_count()
    }

    fn publish(&self, event: ChangeEvent) {
        if self.changes_tx.send(event).is_err() {
            trace!("no subscribers for content change");
        }
    }

    fn write_page(
        &self,
        records: &[ContentRecord],
        allow_overwrite: bool,
    ) -> Result<Vec<UpsertOutcome>, StoreError> {
        for record in records {
            record.validate()?;
        }
        let encoded = records
            .iter()
            .map(|r| Ok((r.content_id(), serde_json::to_vec(r)?)))
            .collect::<Result<Vec<_>, StoreError>>()?;

        let _guard = self.write_lock.lock();
        let outcomes = (&self.contents, &self.hid_index).transaction(
            |(contents, index)| -> ConflictableTransactionResult<Vec<UpsertOutcome>, StoreError> {
                let mut outcomes = Vec::with_capacity(records.len());
                for (record, (key, bytes)) in records.iter().zip(&encoded) {
                    let status = match contents.get(key.as_bytes())? {
                        Some(_) if !allow_overwrite => UpsertStatus::Skipped,
                        Some(previous) => {
                            let old: ContentRecord = serde_json::from_slice(&previous)
                                .map_err(|e| ConflictableTransactionError::Abort(e.into()))?;
                            if old.hid != record.hid {
                                index.remove(index_key(&old.history_id, old.hid, key))?;
                            }
                            UpsertStatus::Updated
                        }
                        None => UpsertStatus::Inserted,
                    };
                    if status != UpsertStatus::Skipped {
                        contents.insert(key.as_bytes(), bytes.as_slice())?;
                        index.insert(
                            index_key(&record.history_id, record.hid, key),
                            key.as_bytes(),
                        )?;
                    }
                    outcomes.push(UpsertOutcome {
                        key: key.clone(),
                        history_id: record.history_id.clone(),
                        hid: record.hid,
                        status,
                    });
                }
                Ok(outcomes)
            },
        )?;

        for outcome in &outcomes {
            if let Some(event) = outcome.change() {
                self.publish(event);
            }
        }
        Ok(outcomes)
    }

    fn load(&self, key: &[u8]) -> Result<Option<ContentRecord>, StoreError> {
        match self.contents.get(key)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Resolve an index entry, skipping entries that no longer match their record.
    fn resolve(
        &self,
        history_id: &str,
        entry: sled::Result<(sled::IVec, sled::IVec)>,
    ) -> Result<Option<ContentRecord>, StoreError> {
        let (index_key, content_key) = entry?;
        let Some(record) = self.load(&content_key)? else {
            warn!(
                history_id,
                key = %String::from_utf8_lossy(&content_key),
                "Dangling hid index entry"
            );
            return Ok(None);
        };
        if record.history_id != history_id {
            warn!(
                history_id,
                owner = %record.history_id,
                key = %record.content_id(),
                "Hid index entry points into another history"
            );
            return Ok(None);
        }
        let indexed_hid = decode_hid(&index_key, history_id.len() + 1);
        if indexed_hid != Some(record.hid) {
            debug!(history_id, hid = record.hid, "Skipping stale hid index entry");
            return Ok(None);
        }
        Ok(Some(record))
    }
}

impl ContentStore for SledContentStore {
    fn upsert_one(&self, record: ContentRecord) -> Result<UpsertOutcome, StoreError> {
        let mut outcomes = self.write_page(std::slice::from_ref(&record), true)?;
        outcomes
            .pop()
            .ok_or_else(|| StoreError::Unavailable("upsert produced no outcome".to_string()))
    }

    fn upsert_many(
        &self,
        records: Vec<ContentRecord>,
        allow_overwrite: bool,
    ) -> Result<Vec<UpsertOutcome>, StoreError> {
        if records.is_empty() {
            return Ok(Vec::new());
        }
        let outcomes = self.write_page(&records, allow_overwrite)?;
        debug!(
            count = outcomes.len(),
            written = outcomes
                .iter()
                .filter(|o| o.status != UpsertStatus::Skipped)
                .count(),
            allow_overwrite,
            "Upserted content page"
        );
        Ok(outcomes)
    }

    fn get(&self, key: &str) -> Result<Option<ContentRecord>, StoreError> {
        self.load(key.as_bytes())
    }

    fn range_by_hid(
        &self,
        history_id: &str,
        predicate: &dyn Fn(&ContentRecord) -> bool,
        order: ScanOrder,
        from: Hid,
        limit: usize,
    ) -> Result<Vec<ContentRecord>, StoreError> {
        let mut found = Vec::new();
        if limit == 0 {
            return Ok(found);
        }

        let prefix = history_prefix(history_id);
        let entries: Box<dyn Iterator<Item = sled::Result<(sled::IVec, sled::IVec)>>> = match order
        {
            ScanOrder::Ascending => {
                let mut end = prefix.clone();
                if let Some(sep) = end.last_mut() {
                    *sep = 1;
                }
                Box::new(self.hid_index.range(hid_prefix(history_id, from)..end))
            }
            ScanOrder::Descending => {
                // Content keys are UTF-8 and never contain 0xFF.
                let mut end = hid_prefix(history_id, from);
                end.push(0xFF);
                Box::new(self.hid_index.range(prefix..end).rev())
            }
        };

        for entry in entries {
            if let Some(record) = self.resolve(history_id, entry)? {
                if predicate(&record) {
                    found.push(record);
                    if found.len() >= limit {
                        break;
                    }
                }
            }
        }
        Ok(found)
    }

    fn count(
        &self,
        history_id: &str,
        predicate: &dyn Fn(&ContentRecord) -> bool,
    ) -> Result<usize, StoreError> {
        let mut total = 0;
        for entry in self.hid_index.scan_prefix(history_prefix(history_id)) {
            if let Some(record) = self.resolve(history_id, entry)? {
                if predicate(&record) {
                    total += 1;
                }
            }
        }
        Ok(total)
    }

    fn hid_bounds(&self, history_id: &str) -> Result<Option<(Hid, Hid)>, StoreError> {
        let prefix = history_prefix(history_id);
        let mut scan = self.hid_index.scan_prefix(&prefix);
        let first = match scan.next() {
            Some(entry) => entry?.0,
            None => return Ok(None),
        };
        let last = match scan.next_back() {
            Some(entry) => entry?.0,
            None => first.clone(),
        };
        match (decode_hid(&first, prefix.len()), decode_hid(&last, prefix.len())) {
            (Some(min), Some(max)) => Ok(Some((min, max))),
            _ => Err(StoreError::Unavailable(format!(
                "corrupt hid index entry for history {}",
                history_id
            ))),
        }
    }

    fn wipe(&self) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock();
        self.contents.clear()?;
        self.hid_index.clear()?;
        info!("Wiped content store");
        self.publish(ChangeEvent::Reset);
        Ok(())
    }

    fn flush(&self) -> Result<(), StoreError> {
        let bytes = self.db.flush()?;
        trace!(bytes, "Flushed content store");
        Ok(())
    }

    fn changes(&self) -> broadcast::Receiver<ChangeEvent> {
        self.changes_tx.subscribe()
    }
}

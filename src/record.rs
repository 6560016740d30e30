//! Content Records
//!
//! Cached representation of one dataset or dataset collection inside a history,
//! and the derivation of its primary key.

use crate::error::StoreError;
use crate::types::{ContentKey, Hid, HistoryId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of content item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    Dataset,
    DatasetCollection,
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Dataset => "dataset",
            ContentType::DatasetCollection => "dataset_collection",
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn default_visible() -> bool {
    true
}

/// ContentRecord: one history item as cached locally
///
/// Only identity, position, and the visibility flags are interpreted by the
/// cache. Searchable fields are typed; everything else rides along in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentRecord {
    pub history_id: HistoryId,
    #[serde(rename = "history_content_type")]
    pub content_type: ContentType,
    pub id: String,
    pub hid: Hid,
    #[serde(default, rename = "deleted")]
    pub is_deleted: bool,
    #[serde(default = "default_visible")]
    pub visible: bool,
    #[serde(default)]
    pub state: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extension: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_time: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl ContentRecord {
    /// Minimal visible, non-deleted record. Mostly useful for seeding.
    pub fn new(
        history_id: impl Into<HistoryId>,
        content_type: ContentType,
        id: impl Into<String>,
        hid: Hid,
    ) -> Self {
        Self {
            history_id: history_id.into(),
            content_type,
            id: id.into(),
            hid,
            is_deleted: false,
            visible: true,
            state: String::new(),
            name: None,
            extension: None,
            tags: Vec::new(),
            update_time: None,
            extra: serde_json::Map::new(),
        }
    }

    pub fn content_id(&self) -> ContentKey {
        derive_key(&self.history_id, self.content_type, &self.id)
    }

    pub fn is_hidden(&self) -> bool {
        !self.visible
    }

    /// Reject records whose identity cannot produce a usable key or index entry.
    pub fn validate(&self) -> Result<(), StoreError> {
        if self.history_id.is_empty() {
            return Err(StoreError::InvalidRecord("missing history_id".to_string()));
        }
        if self.history_id.contains('\0') {
            return Err(StoreError::InvalidRecord(format!(
                "history_id {:?} contains NUL",
                self.history_id
            )));
        }
        // `-` separates key components; a history id containing one could
        // collide with another history's keys.
        if self.history_id.contains('-') {
            return Err(StoreError::InvalidRecord(format!(
                "history_id {:?} contains '-'",
                self.history_id
            )));
        }
        if self.id.is_empty() {
            return Err(StoreError::InvalidRecord(format!(
                "missing id for hid {} in history {}",
                self.hid, self.history_id
            )));
        }
        if self.hid == 0 {
            return Err(StoreError::InvalidRecord(format!(
                "missing hid for {} {}",
                self.content_type, self.id
            )));
        }
        Ok(())
    }
}

/// Derive the primary key of a content item.
///
/// Pure function of `(history_id, content_type, id)`. Injective for valid
/// records: history ids carry no `-` and neither content type name does.
pub fn derive_key(history_id: &str, content_type: ContentType, id: &str) -> ContentKey {
    format!("{}-{}-{}", history_id, content_type.as_str(), id)
}

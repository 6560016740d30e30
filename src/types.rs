//! Core types for the history content cache.

/// HistoryId: identity of the history that owns a content item
pub type HistoryId = String;

/// Hid: ordinal position of a content item within its history
pub type Hid = u64;

/// ContentKey: derived primary key of a cached content item
pub type ContentKey = String;

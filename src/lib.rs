//! Histcache: Local History Contents Cache
//!
//! Persistent cache of history content items with hid-ordered range scans,
//! a change feed, and live windowed queries for virtualized list views.

pub mod api;
pub mod config;
pub mod error;
pub mod filter;
pub mod logging;
pub mod record;
pub mod store;
pub mod tooling;
pub mod types;
pub mod watch;
pub mod window;

pub use api::HistoryCache;
pub use error::{ApiError, StoreError, WatchError};
pub use filter::SearchParams;
pub use record::{derive_key, ContentRecord, ContentType};
pub use store::{ChangeEvent, ContentStore, ScanOrder, SledContentStore};
pub use watch::{watch_history_contents, WatchSettings, WindowStream};
pub use window::{build_window, ContentWindow};

//! Integration tests for the history contents cache

mod store_contract;
mod watch_sessions;

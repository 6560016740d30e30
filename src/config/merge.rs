//! Source composition for configuration loading.

pub(crate) mod policy;
pub mod service;

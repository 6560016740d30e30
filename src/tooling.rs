//! Tooling & Integration Layer
//!
//! Command-line access to the cache for seeding, inspection, and watching.

pub mod cli;

pub use cli::{Cli, CliContext, Commands};

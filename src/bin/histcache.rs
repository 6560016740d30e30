//! Histcache CLI Binary
//!
//! Command-line interface for the local history contents cache.

use anyhow::Context;
use clap::Parser;
use histcache::tooling::cli::{Cli, CliContext};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let context = CliContext::new(&cli).context("Error initializing cache")?;
    let output = context.execute(&cli.command).await?;
    if !output.is_empty() {
        println!("{}", output);
    }
    Ok(())
}

//! GrantScout CLI: discover AU/NZ research funding opportunities.
//!
//! Crawls funder websites, extracts grant records with an LLM, merges them
//! with structured feeds and exports CSV/JSON for analysis.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli).await
}

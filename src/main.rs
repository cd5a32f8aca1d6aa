// SPDX-License-Identifier: MIT OR Apache-2.0

//! photogrep - Local semantic photo search tool
//!
//! Indexes a photo directory with a CLIP-style encoder and answers free-text
//! queries by cosine similarity.

mod cli;
mod query;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use cli::{Cli, Commands};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    // Initialize tracing with PHOTOGREP_LOG env var (e.g., PHOTOGREP_LOG=debug photogrep index)
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_env("PHOTOGREP_LOG").unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    let format = cli.format;

    match cli.command {
        Commands::Index { path } => {
            query::index::run(path.as_deref(), format)?;
        }
        Commands::Search { query, path, limit } => {
            query::search::run(&query, path.as_deref(), limit, format)?;
        }
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "photogrep", &mut std::io::stdout());
        }
    }

    Ok(())
}

// SPDX-License-Identifier: MIT OR Apache-2.0

//! CLI argument parsing using clap

use clap::{Parser, Subcommand};
use clap_complete::Shell;

/// photogrep - Local semantic photo search
///
/// Embeds every photo under a directory with a CLIP-style encoder and ranks
/// them against free-text descriptions.
#[derive(Parser, Debug)]
#[command(name = "photogrep")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Output format (text or json)
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Output format for results
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Embed every photo not yet indexed and report the pass
    Index {
        /// Photo library to index (defaults to current directory)
        #[arg(short, long)]
        path: Option<String>,
    },

    /// Rank photos by similarity to a text description
    #[command(alias = "s")]
    Search {
        /// Description of the photo (empty lists every indexed photo)
        query: String,

        /// Photo library to search (defaults to current directory)
        #[arg(short, long)]
        path: Option<String>,

        /// Maximum number of results
        #[arg(short = 'm', long = "limit", visible_alias = "max-results")]
        limit: Option<usize>,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

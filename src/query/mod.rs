// SPDX-License-Identifier: MIT OR Apache-2.0

//! Command runners for index and search

pub mod index;
pub mod search;

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use photogrep::config::Config;
use photogrep::embedding::{ClipEncoder, InMemoryEmbeddingStore};
use photogrep::indexer::DirectoryPhotoSource;
use photogrep::PhotoSearch;

use crate::cli::OutputFormat;

/// Resolve the library root (defaults to current directory)
pub(crate) fn resolve_root(path: Option<&str>) -> Result<PathBuf> {
    let root = path
        .map(PathBuf::from)
        .or_else(|| std::env::current_dir().ok())
        .ok_or_else(|| anyhow::anyhow!("Cannot determine current directory"))?;
    if !root.is_dir() {
        anyhow::bail!("Photo library not found: {}", root.display());
    }
    root.canonicalize()
        .with_context(|| format!("Failed to resolve {}", root.display()))
}

/// Build a service over the library at `root` from its configuration
pub(crate) fn build_service(root: &Path, config: &Config) -> PhotoSearch {
    let source = DirectoryPhotoSource::new(root).with_extensions(&config.index().extensions());
    let encoder = ClipEncoder::new(config.encoder().build());

    let mut builder = PhotoSearch::builder(
        Arc::new(source),
        Arc::new(encoder),
        Arc::new(InMemoryEmbeddingStore::new()),
        config.encoder().build_tokenizer(),
    )
    .with_index_options(config.index().options());
    if let Some(translator) = config.translator().build() {
        builder = builder.with_translator(translator);
    }
    builder.build()
}

/// Progress bar for an indexing pass; hidden unless printing text
pub(crate) fn index_progress(format: OutputFormat) -> ProgressBar {
    if format != OutputFormat::Text {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(0);
    if let Ok(style) = ProgressStyle::default_bar()
        .template("[{bar:40.cyan/blue}] {pos}/{len} photos | Encoding")
    {
        pb.set_style(style.progress_chars("##."));
    }
    pb
}

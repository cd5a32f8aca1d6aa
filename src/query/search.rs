// SPDX-License-Identifier: MIT OR Apache-2.0

//! Search command
//!
//! The store lives in memory, so each invocation indexes the library before
//! ranking it.

use anyhow::{Context, Result};
use colored::Colorize;
use serde::Serialize;
use std::time::Instant;

use photogrep::config::Config;
use photogrep::output::{colorize_path, colorize_score, use_colors};
use photogrep::SearchResult;

use crate::cli::OutputFormat;

#[derive(Serialize)]
struct SearchOutput<'a> {
    query: &'a str,
    model: &'a str,
    indexed: usize,
    results: &'a [SearchResult],
}

/// Run the search command
pub fn run(
    query: &str,
    path: Option<&str>,
    limit: Option<usize>,
    format: OutputFormat,
) -> Result<()> {
    let start_time = Instant::now();
    let use_color = use_colors() && format == OutputFormat::Text;

    let root = super::resolve_root(path)?;
    let config = Config::load_for_dir(&root);
    let max_results = config.merge_max_results(limit);
    let service = super::build_service(&root, &config);
    let model = service.model_name().to_string();

    let progress = super::index_progress(format);
    service
        .trigger_indexing_with_progress(&model, &progress)
        .with_context(|| format!("Failed to index {}", root.display()))?;

    let ranked = service
        .search(query, &model)
        .with_context(|| format!("Search failed for: {}", query))?;
    let shown = &ranked.results[..ranked.results.len().min(max_results)];

    match format {
        OutputFormat::Json => {
            let output = SearchOutput {
                query,
                model: &model,
                indexed: service.indexed_count(&model),
                results: shown,
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Text => {
            if shown.is_empty() {
                if use_color {
                    println!("{} No photos found for: {}", "✗".red(), query.yellow());
                } else {
                    println!("No photos found for: {}", query);
                }
                return Ok(());
            }

            for result in shown {
                println!(
                    "{}  {}",
                    colorize_score(result.score, use_color),
                    colorize_path(&result.asset_id, use_color)
                );
            }

            let elapsed = start_time.elapsed();
            println!(
                "\n{} of {} photos in {:.2}s",
                shown.len(),
                service.indexed_count(&model),
                elapsed.as_secs_f64()
            );
        }
    }

    Ok(())
}

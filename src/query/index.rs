// SPDX-License-Identifier: MIT OR Apache-2.0

//! Index command

use anyhow::{Context, Result};
use colored::Colorize;

use photogrep::config::Config;
use photogrep::indexer::IndexReport;
use photogrep::output::{colorize_count, colorize_warning, use_colors};

use crate::cli::OutputFormat;

/// Run the index command
pub fn run(path: Option<&str>, format: OutputFormat) -> Result<()> {
    let root = super::resolve_root(path)?;
    let config = Config::load_for_dir(&root);
    let service = super::build_service(&root, &config);

    let progress = super::index_progress(format);
    let report = service
        .trigger_indexing_with_progress(service.model_name(), &progress)
        .with_context(|| format!("Failed to index {}", root.display()))?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Text => print_report(&report, use_colors()),
    }
    Ok(())
}

/// Print a pass summary as text
fn print_report(report: &IndexReport, use_color: bool) {
    let check = if use_color {
        "✓".green().to_string()
    } else {
        "✓".to_string()
    };

    if report.already_indexed > 0 {
        println!(
            "{} Indexed {} photos ({} unchanged, {} total)",
            check,
            colorize_count(report.indexed, use_color),
            report.already_indexed,
            report.total_assets
        );
    } else {
        println!(
            "{} Indexed {} photos",
            check,
            colorize_count(report.indexed, use_color)
        );
    }

    if report.unavailable > 0 {
        eprintln!(
            "{} {} photos could not be read",
            colorize_warning("Warning:", use_color),
            report.unavailable
        );
    }
    if report.failed > 0 {
        eprintln!(
            "{} {} photos failed to encode",
            colorize_warning("Warning:", use_color),
            report.failed
        );
    }
    if report.scan_errors > 0 {
        eprintln!(
            "{} {} library entries could not be listed, stale embeddings kept",
            colorize_warning("Warning:", use_color),
            report.scan_errors
        );
    }
    if report.evicted > 0 {
        println!("Removed {} stale embeddings", report.evicted);
    }
}

// SPDX-License-Identifier: MIT OR Apache-2.0

//! Output and color utilities for consistent terminal formatting
//!
//! Provides shared color functions respecting NO_COLOR environment variable.

use colored::Colorize;

/// Check if colors should be used (respects NO_COLOR env var)
pub fn use_colors() -> bool {
    std::env::var("NO_COLOR").is_err()
}

/// Colorize asset path (cyan)
pub fn colorize_path(text: &str, use_color: bool) -> String {
    if use_color {
        text.cyan().to_string()
    } else {
        text.to_string()
    }
}

/// Format a similarity score; strong matches green, weak ones dimmed
pub fn colorize_score(score: f32, use_color: bool) -> String {
    let text = format!("{:.4}", score);
    if !use_color {
        return text;
    }
    if score >= 0.25 {
        text.green().to_string()
    } else if score <= 0.0 {
        text.dimmed().to_string()
    } else {
        text.yellow().to_string()
    }
}

/// Colorize a count in summaries (bold)
pub fn colorize_count(count: usize, use_color: bool) -> String {
    if use_color {
        count.to_string().bold().to_string()
    } else {
        count.to_string()
    }
}

/// Colorize a warning label (red)
pub fn colorize_warning(text: &str, use_color: bool) -> String {
    if use_color {
        text.red().to_string()
    } else {
        text.to_string()
    }
}

//! Git operations for codegate
//!
//! This module provides repository detection, diff extraction for staged
//! changes and commits, and file selection.

mod repo;

use std::path::Path;

use glob::{MatchOptions, Pattern};
use tracing::warn;

pub use repo::{DiffSource, GitRepo};

/// Select the files to review
///
/// `file_types` is a case-insensitive extension whitelist (leading dot
/// optional, empty means everything); `exclude` is a list of glob patterns.
pub fn filter_files(files: &[String], file_types: &[String], exclude: &[String]) -> Vec<String> {
    let extensions: Vec<String> = file_types
        .iter()
        .map(|t| t.trim_start_matches('.').to_lowercase())
        .filter(|t| !t.is_empty())
        .collect();

    let patterns: Vec<Pattern> = exclude
        .iter()
        .filter_map(|p| match Pattern::new(p) {
            Ok(pattern) => Some(pattern),
            Err(e) => {
                warn!(pattern = %p, error = %e, "Ignoring invalid exclude pattern");
                None
            }
        })
        .collect();

    let options = MatchOptions {
        case_sensitive: true,
        require_literal_separator: true,
        require_literal_leading_dot: false,
    };

    files
        .iter()
        .filter(|f| {
            extensions.is_empty()
                || Path::new(f.as_str())
                    .extension()
                    .map(|e| extensions.contains(&e.to_string_lossy().to_lowercase()))
                    .unwrap_or(false)
        })
        .filter(|f| !patterns.iter().any(|p| p.matches_with(f, options)))
        .cloned()
        .collect()
}

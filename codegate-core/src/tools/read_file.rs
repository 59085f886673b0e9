//! `read_file`: paged file reads inside the repository

use std::path::Path;

use serde::{Deserialize, Serialize};

use super::{resolve_in_root, ToolError};

pub(crate) const DEFAULT_START_LINE: usize = 1;
pub(crate) const DEFAULT_MAX_LINES: usize = 200;
const MAX_FILE_SIZE: u64 = 100 * 1024;
const BLOCKED_PATTERNS: &[&str] = &[".env", ".git/objects", "node_modules"];

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadFileArgs {
    pub path: String,
    pub start_line: Option<usize>,
    pub max_lines: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadFileResult {
    pub content: String,
    pub start_line: usize,
    pub end_line: usize,
    pub total_lines: usize,
    pub total: usize,
    pub has_more: bool,
}

pub(crate) fn read_file(root: &Path, args: &ReadFileArgs) -> Result<ReadFileResult, ToolError> {
    let absolute = resolve_in_root(root, &args.path)?;

    if let Some(pattern) = BLOCKED_PATTERNS.iter().find(|p| args.path.contains(*p)) {
        return Err(ToolError::AccessDenied(format!("{pattern} files are blocked")));
    }

    if !absolute.exists() {
        return Err(ToolError::NotFound {
            kind: "File",
            path: args.path.clone(),
        });
    }

    let metadata = std::fs::metadata(&absolute)?;
    if !metadata.is_file() {
        return Err(ToolError::WrongKind {
            kind: "file",
            path: args.path.clone(),
        });
    }
    if metadata.len() > MAX_FILE_SIZE {
        return Err(ToolError::TooLarge {
            size: metadata.len(),
            max: MAX_FILE_SIZE,
        });
    }

    let bytes = std::fs::read(&absolute)?;
    let text = String::from_utf8_lossy(&bytes);
    let lines: Vec<&str> = text.split('\n').collect();
    let total = lines.len();

    let start = args.start_line.unwrap_or(DEFAULT_START_LINE).max(1);
    let max_lines = args.max_lines.unwrap_or(DEFAULT_MAX_LINES);
    let end = total.min(start.saturating_add(max_lines).saturating_sub(1));

    let content = if start <= end {
        lines[start - 1..end].join("\n")
    } else {
        String::new()
    };

    Ok(ReadFileResult {
        content,
        start_line: start,
        end_line: end,
        total_lines: total,
        total,
        has_more: end < total,
    })
}

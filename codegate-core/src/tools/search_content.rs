//! `search_content`: regex search over tracked files with `git grep`

use std::path::Path;
use std::process::Stdio;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tokio::process::Command;

use super::{resolve_in_root, ToolError};

pub(crate) const DEFAULT_OFFSET: usize = 0;
pub(crate) const DEFAULT_LIMIT: usize = 20;
const MAX_CONTENT_CHARS: usize = 200;

/// `file:line:content`
static GREP_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(.+?):(\d+):(.*)$").unwrap());

#[derive(Debug, Clone, Deserialize)]
pub struct SearchContentArgs {
    pub pattern: String,
    pub path: Option<String>,
    pub offset: Option<usize>,
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchMatch {
    pub file: String,
    pub line: u64,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchContentResult {
    pub matches: Vec<SearchMatch>,
    pub total: usize,
    pub has_more: bool,
}

fn parse_line(line: &str) -> Option<SearchMatch> {
    let caps = GREP_LINE.captures(line)?;
    Some(SearchMatch {
        file: caps[1].to_string(),
        line: caps[2].parse().ok()?,
        content: caps[3].chars().take(MAX_CONTENT_CHARS).collect(),
    })
}

pub(crate) async fn search_content(
    root: &Path,
    args: &SearchContentArgs,
) -> Result<SearchContentResult, ToolError> {
    let search_path = args.path.as_deref().unwrap_or(".");
    resolve_in_root(root, search_path)?;

    let output = Command::new("git")
        .args(["grep", "-n", "-I", "--no-color", "-E", "-e"])
        .arg(&args.pattern)
        .arg("--")
        .arg(search_path)
        .current_dir(root)
        .stdin(Stdio::null())
        .output()
        .await?;

    // git grep exits with 1 when nothing matched
    if !output.status.success() && output.status.code() != Some(1) {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(ToolError::Failed(format!("Search failed: {}", stderr.trim())));
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    let lines: Vec<&str> = stdout.lines().filter(|l| !l.is_empty()).collect();
    let total = lines.len();

    let offset = args.offset.unwrap_or(DEFAULT_OFFSET);
    let limit = args.limit.unwrap_or(DEFAULT_LIMIT);
    let matches = lines
        .into_iter()
        .skip(offset)
        .take(limit)
        .filter_map(parse_line)
        .collect();

    Ok(SearchContentResult {
        matches,
        total,
        has_more: offset.saturating_add(limit) < total,
    })
}

//! `list_directory`: recursive, paged directory listing

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{resolve_in_root, ToolError};

pub(crate) const DEFAULT_DEPTH: usize = 1;
pub(crate) const DEFAULT_OFFSET: usize = 0;
pub(crate) const DEFAULT_LIMIT: usize = 50;

const EXCLUDED_NAMES: &[&str] = &[
    "node_modules",
    ".git",
    ".idea",
    ".vscode",
    "dist",
    "build",
    "coverage",
    "__pycache__",
    ".DS_Store",
    "Thumbs.db",
];

/// Hidden entries that are still listed
const ALLOWED_HIDDEN_PREFIXES: &[&str] = &[".codegate", ".eslintrc", ".prettierrc"];

#[derive(Debug, Clone, Deserialize)]
pub struct ListDirectoryArgs {
    pub path: String,
    pub depth: Option<usize>,
    pub offset: Option<usize>,
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryType {
    // Declared first so directories sort before files
    Dir,
    File,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DirectoryEntry {
    /// Path relative to the listed directory
    pub name: String,
    #[serde(rename = "type")]
    pub kind: EntryType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListDirectoryResult {
    pub entries: Vec<DirectoryEntry>,
    pub total: usize,
    pub has_more: bool,
}

fn is_excluded(name: &str) -> bool {
    if name.starts_with('.') && !ALLOWED_HIDDEN_PREFIXES.iter().any(|p| name.starts_with(p)) {
        return true;
    }
    EXCLUDED_NAMES.contains(&name)
}

fn collect(dir: &Path, base: &Path, max_depth: usize, depth: usize, out: &mut Vec<DirectoryEntry>) {
    if depth >= max_depth {
        return;
    }

    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            debug!(dir = %dir.display(), error = %e, "Skipping unreadable directory");
            return;
        }
    };

    for entry in entries.flatten() {
        let file_name = entry.file_name();
        let name = file_name.to_string_lossy();
        if is_excluded(&name) {
            continue;
        }

        let path = entry.path();
        let relative = path
            .strip_prefix(base)
            .unwrap_or(&path)
            .to_string_lossy()
            .replace('\\', "/");

        // Follows symlinks, like a stat call
        let Ok(metadata) = std::fs::metadata(&path) else {
            continue;
        };

        if metadata.is_dir() {
            out.push(DirectoryEntry {
                name: relative,
                kind: EntryType::Dir,
                size: None,
            });
            collect(&path, base, max_depth, depth + 1, out);
        } else if metadata.is_file() {
            out.push(DirectoryEntry {
                name: relative,
                kind: EntryType::File,
                size: Some(metadata.len()),
            });
        }
    }
}

pub(crate) fn list_directory(
    root: &Path,
    args: &ListDirectoryArgs,
) -> Result<ListDirectoryResult, ToolError> {
    let absolute = resolve_in_root(root, &args.path)?;

    if !absolute.exists() {
        return Err(ToolError::NotFound {
            kind: "Directory",
            path: args.path.clone(),
        });
    }
    if !absolute.is_dir() {
        return Err(ToolError::WrongKind {
            kind: "directory",
            path: args.path.clone(),
        });
    }

    let depth = args.depth.unwrap_or(DEFAULT_DEPTH);
    let offset = args.offset.unwrap_or(DEFAULT_OFFSET);
    let limit = args.limit.unwrap_or(DEFAULT_LIMIT);

    let mut entries = Vec::new();
    collect(&absolute, &absolute, depth, 0, &mut entries);
    entries.sort_by(|a, b| a.kind.cmp(&b.kind).then_with(|| a.name.cmp(&b.name)));

    let total = entries.len();
    let page = entries.into_iter().skip(offset).take(limit).collect();

    Ok(ListDirectoryResult {
        entries: page,
        total,
        has_more: offset.saturating_add(limit) < total,
    })
}

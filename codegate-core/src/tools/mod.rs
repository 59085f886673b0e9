//! Repository tools the reviewer can call during an agent review
//!
//! The set of tools is closed ([`ToolKind`]); an unknown name is a typed
//! failure, not a panic. Every failure (including a panicking executor) is
//! turned into an error-bearing [`ToolResult`] so one bad call never fails
//! its siblings or the round.

mod list_directory;
mod read_file;
mod search_content;

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::path::{Component, Path, PathBuf};
use std::str::FromStr;

use async_trait::async_trait;
use futures::future::join_all;
use futures::FutureExt;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{debug, warn};

use crate::agent::{ToolCall, ToolResult};

pub use list_directory::{DirectoryEntry, EntryType, ListDirectoryArgs, ListDirectoryResult};
pub use read_file::{ReadFileArgs, ReadFileResult};
pub use search_content::{SearchContentArgs, SearchContentResult, SearchMatch};

/// Errors produced by tool execution
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("{kind} not found: {path}")]
    NotFound { kind: &'static str, path: String },

    #[error("Not a {kind}: {path}")]
    WrongKind { kind: &'static str, path: String },

    #[error("File too large: {size} bytes (max {max})")]
    TooLarge { size: u64, max: u64 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Failed(String),
}

/// The tools available to the reviewer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolKind {
    ReadFile,
    SearchContent,
    ListDirectory,
}

impl ToolKind {
    /// All tools, in the order they are offered to the reviewer
    pub fn all() -> &'static [ToolKind] {
        &[
            ToolKind::ReadFile,
            ToolKind::SearchContent,
            ToolKind::ListDirectory,
        ]
    }

    /// Wire name of this tool
    pub fn name(&self) -> &'static str {
        match self {
            ToolKind::ReadFile => "read_file",
            ToolKind::SearchContent => "search_content",
            ToolKind::ListDirectory => "list_directory",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            ToolKind::ReadFile => {
                "Read the contents of a file, paged by lines. Use it to see full source \
                 files, type definitions or configuration."
            }
            ToolKind::SearchContent => {
                "Search file contents in the repository with an extended regular \
                 expression. Use it to find definitions, call sites or usages."
            }
            ToolKind::ListDirectory => {
                "List the entries of a directory to understand the project layout. \
                 Can recurse into subdirectories."
            }
        }
    }

    /// JSON schema of the tool arguments
    pub fn parameters(&self) -> Value {
        match self {
            ToolKind::ReadFile => json!({
                "type": "object",
                "properties": {
                    "path": {
                        "type": "string",
                        "description": "File path relative to the repository root"
                    },
                    "startLine": {
                        "type": "number",
                        "description": format!("First line to read (1-based), default {}", read_file::DEFAULT_START_LINE)
                    },
                    "maxLines": {
                        "type": "number",
                        "description": format!("Maximum number of lines, default {}", read_file::DEFAULT_MAX_LINES)
                    }
                },
                "required": ["path"]
            }),
            ToolKind::SearchContent => json!({
                "type": "object",
                "properties": {
                    "pattern": {
                        "type": "string",
                        "description": "Search pattern (extended regular expression)"
                    },
                    "path": {
                        "type": "string",
                        "description": "Path to search, relative to the repository root; defaults to the whole repository"
                    },
                    "offset": {
                        "type": "number",
                        "description": format!("Number of matches to skip, default {}", search_content::DEFAULT_OFFSET)
                    },
                    "limit": {
                        "type": "number",
                        "description": format!("Maximum number of matches, default {}", search_content::DEFAULT_LIMIT)
                    }
                },
                "required": ["pattern"]
            }),
            ToolKind::ListDirectory => json!({
                "type": "object",
                "properties": {
                    "path": {
                        "type": "string",
                        "description": "Directory path relative to the repository root"
                    },
                    "depth": {
                        "type": "number",
                        "description": format!("Recursion depth, default {} (direct children only)", list_directory::DEFAULT_DEPTH)
                    },
                    "offset": {
                        "type": "number",
                        "description": format!("Number of entries to skip, default {}", list_directory::DEFAULT_OFFSET)
                    },
                    "limit": {
                        "type": "number",
                        "description": format!("Maximum number of entries, default {}", list_directory::DEFAULT_LIMIT)
                    }
                },
                "required": ["path"]
            }),
        }
    }

    pub fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters(),
        }
    }
}

impl std::fmt::Display for ToolKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for ToolKind {
    type Err = ToolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "read_file" => Ok(ToolKind::ReadFile),
            "search_content" => Ok(ToolKind::SearchContent),
            "list_directory" => Ok(ToolKind::ListDirectory),
            _ => Err(ToolError::UnknownTool(s.to_string())),
        }
    }
}

/// Description of a tool as offered to the reviewer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// Executes tools on behalf of a conversation
///
/// Implementations must be safe to call concurrently.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    /// Tools offered to the reviewer
    fn definitions(&self) -> Vec<ToolDefinition> {
        ToolKind::all().iter().map(ToolKind::definition).collect()
    }

    /// Run one tool with its raw arguments
    async fn execute(&self, kind: ToolKind, args: &Map<String, Value>) -> Result<Value, ToolError>;
}

/// Execute one call, mapping every failure into the result
pub async fn execute_call(executor: &dyn ToolExecutor, call: &ToolCall) -> ToolResult {
    let kind = match call.name.parse::<ToolKind>() {
        Ok(kind) => kind,
        Err(e) => {
            warn!(tool = %call.name, "Reviewer requested an unknown tool");
            return ToolResult::failure(call, e.to_string());
        }
    };

    debug!(tool = %kind, id = %call.id, "Executing tool");
    match AssertUnwindSafe(executor.execute(kind, &call.arguments))
        .catch_unwind()
        .await
    {
        Ok(Ok(value)) => ToolResult::success(call, value),
        Ok(Err(e)) => ToolResult::failure(call, e.to_string()),
        Err(panic) => {
            let message = panic_message(panic.as_ref());
            warn!(tool = %kind, error = %message, "Tool panicked");
            ToolResult::failure(call, format!("Tool panicked: {message}"))
        }
    }
}

/// Execute a batch concurrently; results come back in request order
pub async fn execute_batch(executor: &dyn ToolExecutor, calls: &[ToolCall]) -> Vec<ToolResult> {
    join_all(calls.iter().map(|call| execute_call(executor, call))).await
}

/// Best-effort text of a panic payload
pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Deserialize raw tool arguments
pub fn parse_args<T: DeserializeOwned>(args: &Map<String, Value>) -> Result<T, ToolError> {
    serde_json::from_value(Value::Object(args.clone()))
        .map_err(|e| ToolError::InvalidArguments(e.to_string()))
}

/// Resolve `relative` against `root`, refusing anything outside it
///
/// `root` must already be canonical. The check runs lexically first so
/// missing paths are still confined, then again on the canonical path so
/// symlinks cannot escape.
pub fn resolve_in_root(root: &Path, relative: &str) -> Result<PathBuf, ToolError> {
    let normalized = normalize(&root.join(relative));
    if !normalized.starts_with(root) {
        return Err(outside_root());
    }

    match normalized.canonicalize() {
        Ok(canonical) if canonical.starts_with(root) => Ok(canonical),
        Ok(_) => Err(outside_root()),
        Err(_) => Ok(normalized),
    }
}

fn outside_root() -> ToolError {
    ToolError::AccessDenied("path outside project root".to_string())
}

fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other),
        }
    }
    out
}

/// Tools backed by a repository checkout
#[derive(Debug, Clone)]
pub struct RepoTools {
    root: PathBuf,
}

impl RepoTools {
    /// Create tools rooted at `root` (canonicalized when possible)
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let root = root.canonicalize().unwrap_or(root);
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl ToolExecutor for RepoTools {
    async fn execute(&self, kind: ToolKind, args: &Map<String, Value>) -> Result<Value, ToolError> {
        match kind {
            ToolKind::ReadFile => {
                let args: ReadFileArgs = parse_args(args)?;
                let root = self.root.clone();
                let result = blocking(move || read_file::read_file(&root, &args)).await?;
                to_json(&result)
            }
            ToolKind::ListDirectory => {
                let args: ListDirectoryArgs = parse_args(args)?;
                let root = self.root.clone();
                let result = blocking(move || list_directory::list_directory(&root, &args)).await?;
                to_json(&result)
            }
            ToolKind::SearchContent => {
                let args: SearchContentArgs = parse_args(args)?;
                let result = search_content::search_content(&self.root, &args).await?;
                to_json(&result)
            }
        }
    }
}

fn to_json<T: Serialize>(value: &T) -> Result<Value, ToolError> {
    serde_json::to_value(value).map_err(|e| ToolError::Failed(e.to_string()))
}

async fn blocking<T, F>(f: F) -> Result<T, ToolError>
where
    F: FnOnce() -> Result<T, ToolError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ToolError::Failed(format!("Tool task failed: {e}")))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::call;
    use tempfile::TempDir;

    struct PanickingTools;

    #[async_trait]
    impl ToolExecutor for PanickingTools {
        async fn execute(&self, kind: ToolKind, _args: &Map<String, Value>) -> Result<Value, ToolError> {
            match kind {
                ToolKind::ReadFile => panic!("read exploded"),
                _ => Ok(json!({"ok": true})),
            }
        }
    }

    #[test]
    fn test_tool_kind_round_trip() {
        for kind in ToolKind::all() {
            assert_eq!(kind.name().parse::<ToolKind>().unwrap(), *kind);
        }
        let err = "rm_rf".parse::<ToolKind>().unwrap_err();
        assert_eq!(err.to_string(), "Unknown tool: rm_rf");
    }

    #[test]
    fn test_definitions_have_required_args() {
        let defs: Vec<ToolDefinition> = ToolKind::all().iter().map(ToolKind::definition).collect();
        assert_eq!(defs.len(), 3);
        assert_eq!(defs[0].name, "read_file");
        assert_eq!(defs[0].parameters["required"], json!(["path"]));
        assert_eq!(defs[1].parameters["required"], json!(["pattern"]));
    }

    #[test]
    fn test_parse_args_rejects_bad_types() {
        let mut args = Map::new();
        args.insert("path".into(), json!(42));
        let err = parse_args::<ReadFileArgs>(&args).unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }

    #[tokio::test]
    async fn test_panicking_tool_becomes_error_result() {
        let calls = vec![
            call("1", "read_file", json!({"path": "a"})),
            call("2", "list_directory", json!({"path": "."})),
        ];
        let results = execute_batch(&PanickingTools, &calls).await;
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].error(), Some("Tool panicked: read exploded"));
        assert_eq!(results[1].result(), Some(&json!({"ok": true})));
    }

    #[test]
    fn test_resolve_in_root() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().canonicalize().unwrap();
        std::fs::write(root.join("a.txt"), "x").unwrap();

        assert_eq!(resolve_in_root(&root, "a.txt").unwrap(), root.join("a.txt"));
        assert_eq!(resolve_in_root(&root, "./sub/../a.txt").unwrap(), root.join("a.txt"));
        assert_eq!(resolve_in_root(&root, "missing.rs").unwrap(), root.join("missing.rs"));

        let err = resolve_in_root(&root, "../outside.txt").unwrap_err();
        assert_eq!(err.to_string(), "Access denied: path outside project root");
        assert!(resolve_in_root(&root, "/etc/passwd").is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_resolve_rejects_symlink_escape() {
        let outside = TempDir::new().unwrap();
        let dir = TempDir::new().unwrap();
        let root = dir.path().canonicalize().unwrap();
        std::os::unix::fs::symlink(outside.path(), root.join("link")).unwrap();

        assert!(matches!(
            resolve_in_root(&root, "link"),
            Err(ToolError::AccessDenied(_))
        ));
    }

    #[tokio::test]
    async fn test_repo_tools_reports_missing_file() {
        let dir = TempDir::new().unwrap();
        let tools = RepoTools::new(dir.path());
        let result = execute_call(&tools, &call("1", "read_file", json!({"path": "nope.rs"}))).await;
        assert_eq!(result.error(), Some("File not found: nope.rs"));
    }
}

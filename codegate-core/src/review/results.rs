//! Review units, completed items and the shared result set

use std::fmt;
use std::str::FromStr;
use std::sync::{Mutex, PoisonError};

use serde::{Deserialize, Serialize};

/// File name used for the whole-diff unit
pub const SUMMARY_UNIT: &str = "Summary";

/// Which review units a run produces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ReviewMode {
    /// One review of the whole diff
    Summary,
    /// One review per file
    #[default]
    Files,
    /// Per-file reviews, then the whole-diff review
    Both,
}

impl ReviewMode {
    pub fn name(&self) -> &'static str {
        match self {
            ReviewMode::Summary => "summary",
            ReviewMode::Files => "files",
            ReviewMode::Both => "both",
        }
    }

    /// Whether files are reviewed one by one
    pub fn reviews_files(&self) -> bool {
        matches!(self, ReviewMode::Files | ReviewMode::Both)
    }

    /// Whether the whole diff gets a review
    pub fn reviews_summary(&self) -> bool {
        matches!(self, ReviewMode::Summary | ReviewMode::Both)
    }
}

impl fmt::Display for ReviewMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for ReviewMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "summary" => Ok(ReviewMode::Summary),
            "files" => Ok(ReviewMode::Files),
            "both" => Ok(ReviewMode::Both),
            _ => Err(format!("Unknown review mode: {} (expected summary, files or both)", s)),
        }
    }
}

/// A changed file and its diff
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileChange {
    pub path: String,
    pub diff: String,
}

impl FileChange {
    pub fn new(path: impl Into<String>, diff: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            diff: diff.into(),
        }
    }
}

/// The units of one dispatch
#[derive(Debug, Clone)]
pub struct DispatchPlan {
    mode: ReviewMode,
    files: Vec<FileChange>,
    summary_diff: String,
}

impl DispatchPlan {
    /// Per-file review only
    pub fn files(files: Vec<FileChange>) -> Self {
        Self {
            mode: ReviewMode::Files,
            files,
            summary_diff: String::new(),
        }
    }

    /// Whole-diff review only; `paths` are passed along as the touched files
    pub fn summary(paths: Vec<String>, diff: impl Into<String>) -> Self {
        Self {
            mode: ReviewMode::Summary,
            files: paths.into_iter().map(|p| FileChange::new(p, "")).collect(),
            summary_diff: diff.into(),
        }
    }

    /// Per-file reviews followed by the whole-diff review
    pub fn both(files: Vec<FileChange>, diff: impl Into<String>) -> Self {
        Self {
            mode: ReviewMode::Both,
            files,
            summary_diff: diff.into(),
        }
    }

    pub fn mode(&self) -> ReviewMode {
        self.mode
    }

    pub fn file_changes(&self) -> &[FileChange] {
        &self.files
    }

    pub fn paths(&self) -> Vec<String> {
        self.files.iter().map(|f| f.path.clone()).collect()
    }

    pub fn summary_diff(&self) -> &str {
        &self.summary_diff
    }

    /// Number of file units
    pub fn file_units(&self) -> usize {
        if self.mode.reviews_files() {
            self.files.len()
        } else {
            0
        }
    }

    /// Number of units this plan dispatches, the summary unit included
    pub fn expected_units(&self) -> usize {
        self.file_units() + usize::from(self.mode.reviews_summary())
    }

    pub(crate) fn into_parts(self) -> (ReviewMode, Vec<FileChange>, String) {
        (self.mode, self.files, self.summary_diff)
    }
}

/// A completed review unit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewItem {
    pub file: String,
    pub review: String,
    pub diff: String,
    pub done: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ReviewItem {
    pub fn completed(file: impl Into<String>, review: impl Into<String>, diff: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            review: review.into(),
            diff: diff.into(),
            done: true,
            error: None,
        }
    }

    pub fn with_error(mut self, error: Option<String>) -> Self {
        self.error = error;
        self
    }
}

/// Live status for a viewer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub files: Vec<ReviewItem>,
    pub done: bool,
}

#[derive(Debug, Default)]
struct ResultState {
    items: Vec<ReviewItem>,
    dispatched: usize,
}

/// Completed items of one run, shared by its workers and readers
///
/// Items are appended once each; readers only ever see snapshots.
#[derive(Debug, Default)]
pub struct ResultSet {
    state: Mutex<ResultState>,
}

impl ResultSet {
    /// Create a set expecting `dispatched` units
    pub fn new(dispatched: usize) -> Self {
        Self {
            state: Mutex::new(ResultState {
                items: Vec::new(),
                dispatched,
            }),
        }
    }

    /// Create a set sized for `plan`
    pub fn for_plan(plan: &DispatchPlan) -> Self {
        Self::new(plan.expected_units())
    }

    /// Append a completed item and return the completed count
    pub fn push(&self, item: ReviewItem) -> usize {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.items.push(item);
        state.items.len()
    }

    /// Completed items in completion order
    pub fn items(&self) -> Vec<ReviewItem> {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .items
            .clone()
    }

    pub fn completed(&self) -> usize {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .items
            .len()
    }

    pub fn dispatched(&self) -> usize {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .dispatched
    }

    /// Snapshot of the done items and whether every dispatched unit finished
    pub fn snapshot(&self) -> StatusSnapshot {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let files: Vec<ReviewItem> = state.items.iter().filter(|i| i.done).cloned().collect();
        let done = files.len() >= state.dispatched;
        StatusSnapshot { files, done }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_review_mode_parse() {
        assert_eq!("files".parse::<ReviewMode>().unwrap(), ReviewMode::Files);
        assert_eq!("BOTH".parse::<ReviewMode>().unwrap(), ReviewMode::Both);
        assert!("everything".parse::<ReviewMode>().is_err());
        assert_eq!(ReviewMode::default(), ReviewMode::Files);
        assert_eq!(ReviewMode::Summary.to_string(), "summary");
    }

    #[test]
    fn test_expected_units() {
        let files = vec![FileChange::new("a.rs", "d1"), FileChange::new("b.rs", "d2")];
        let plan = DispatchPlan::files(files.clone());
        assert_eq!(plan.expected_units(), 2);
        assert_eq!(plan.file_changes()[1].diff, "d2");
        assert_eq!(DispatchPlan::both(files, "all").expected_units(), 3);

        let summary = DispatchPlan::summary(vec!["a.rs".into(), "b.rs".into()], "all");
        assert_eq!(summary.expected_units(), 1);
        assert_eq!(summary.file_units(), 0);
        assert_eq!(summary.paths(), vec!["a.rs", "b.rs"]);
    }

    #[test]
    fn test_snapshot_counts_summary_unit() {
        let results = ResultSet::new(2);
        assert!(!results.snapshot().done);

        assert_eq!(results.push(ReviewItem::completed("a.rs", "ok", "d")), 1);
        let snapshot = results.snapshot();
        assert_eq!(snapshot.files.len(), 1);
        assert!(!snapshot.done);

        assert_eq!(results.push(ReviewItem::completed(SUMMARY_UNIT, "ok", "d")), 2);
        assert!(results.snapshot().done);
    }

    #[test]
    fn test_empty_plan_is_done() {
        assert!(ResultSet::new(0).snapshot().done);
    }

    #[test]
    fn test_item_serialization_skips_missing_error() {
        let value = serde_json::to_value(ReviewItem::completed("a.rs", "r", "d")).unwrap();
        assert_eq!(
            value,
            serde_json::json!({"file": "a.rs", "review": "r", "diff": "d", "done": true})
        );
    }
}

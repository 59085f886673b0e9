//! Final review report and its on-disk export

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::Result;

use super::results::{ReviewMode, StatusSnapshot};

/// Run metadata shown alongside the reviews
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportMeta {
    pub id: String,
    pub provider: String,
    pub model: String,
    pub datetime: String,
    pub subtitle: String,
    pub mode: ReviewMode,
    pub ai_invoked: bool,
    pub ai_succeeded: bool,
    /// Failure description, empty on success
    pub status: String,
}

/// Reviews of one run plus its metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    pub meta: ReportMeta,
    #[serde(flatten)]
    pub snapshot: StatusSnapshot,
}

impl Report {
    pub fn new(meta: ReportMeta, snapshot: StatusSnapshot) -> Self {
        Self { meta, snapshot }
    }

    /// Badge text for the AI outcome
    pub fn ai_status(&self) -> &'static str {
        match (self.meta.ai_invoked, self.meta.ai_succeeded) {
            (false, _) => "AI: Pending",
            (true, false) => "AI: Failed",
            (true, true) => "AI: Done",
        }
    }

    pub fn to_markdown(&self) -> String {
        let meta = &self.meta;
        let mut out = String::new();
        let _ = writeln!(out, "# Code review {}", meta.id);
        let _ = writeln!(out);
        let _ = writeln!(out, "{}", meta.subtitle);
        let _ = writeln!(out);
        let _ = writeln!(
            out,
            "- Reviewer: {} / {}\n- Date: {}\n- Mode: {}\n- Status: {}",
            meta.provider,
            meta.model,
            meta.datetime,
            meta.mode,
            self.ai_status()
        );
        if !meta.status.is_empty() {
            let _ = writeln!(out, "- Details: {}", meta.status);
        }

        for item in &self.snapshot.files {
            let _ = writeln!(out, "\n## {}\n", item.file);
            let _ = writeln!(out, "{}", item.review.trim_end());
            if !item.diff.is_empty() {
                let _ = writeln!(out, "\n<details><summary>Diff</summary>\n");
                let _ = writeln!(out, "```diff\n{}\n```\n", item.diff.trim_end());
                let _ = writeln!(out, "</details>");
            }
        }
        out
    }

    /// Write `review-<id>.md` and `review-<id>.json` into `dir`
    pub fn write_to(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        std::fs::create_dir_all(dir)?;

        let markdown = dir.join(format!("review-{}.md", self.meta.id));
        std::fs::write(&markdown, self.to_markdown())?;

        let json = dir.join(format!("review-{}.json", self.meta.id));
        std::fs::write(&json, serde_json::to_string_pretty(self)?)?;

        Ok(vec![markdown, json])
    }

    /// Like [`Report::write_to`], logging failures instead of returning them
    pub fn export(&self, dir: &Path) -> Vec<PathBuf> {
        match self.write_to(dir) {
            Ok(paths) => {
                info!(dir = %dir.display(), id = %self.meta.id, "Saved review report");
                paths
            }
            Err(e) => {
                warn!(dir = %dir.display(), error = %e, "Failed to save review report");
                Vec::new()
            }
        }
    }
}

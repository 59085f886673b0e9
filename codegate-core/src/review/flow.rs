//! End-to-end review of one change: select files, dispatch, report

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{Local, NaiveDateTime};
use tracing::{debug, info, warn};

use crate::agent::{Orchestrator, Reviewer, RunOptions};
use crate::config::Config;
use crate::git::{filter_files, DiffSource, GitRepo};
use crate::tools::RepoTools;
use crate::Result;

use super::dispatcher::{DispatchObserver, DispatchOptions, Dispatcher, ReviewEngine};
use super::report::{Report, ReportMeta};
use super::results::{DispatchPlan, FileChange, ResultSet, ReviewMode};

/// A change ready to be dispatched
#[derive(Debug, Clone)]
pub struct PreparedReview {
    pub meta: ReportMeta,
    pub plan: DispatchPlan,
}

impl PreparedReview {
    pub fn id(&self) -> &str {
        &self.meta.id
    }

    /// Result set sized for this review
    pub fn result_set(&self) -> Arc<ResultSet> {
        Arc::new(ResultSet::for_plan(&self.plan))
    }
}

/// Outcome of file selection
#[derive(Debug, Clone)]
pub enum Preparation {
    /// The change touches no files
    NoFiles,
    /// Every changed file was filtered out
    AllFiltered { changed: usize },
    Ready(PreparedReview),
}

/// Wires configuration, repository and reviewer into a dispatch
pub struct ReviewFlow {
    config: Config,
    reviewer: Arc<dyn Reviewer>,
    root: PathBuf,
}

impl ReviewFlow {
    pub fn new(config: Config, reviewer: Arc<dyn Reviewer>, root: impl Into<PathBuf>) -> Self {
        Self {
            config,
            reviewer,
            root: root.into(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Collect and filter the files of `source` and build the dispatch plan
    pub fn prepare(&self, repo: &GitRepo, source: &DiffSource) -> Result<Preparation> {
        let changed = repo.changed_files(source)?;
        if changed.is_empty() {
            return Ok(Preparation::NoFiles);
        }

        let review = &self.config.review;
        let mut files = filter_files(&changed, &review.file_types, &review.exclude);
        if files.is_empty() {
            return Ok(Preparation::AllFiltered {
                changed: changed.len(),
            });
        }

        let max_files = self.config.limits.max_files.max(1);
        if files.len() > max_files {
            warn!(
                files = files.len(),
                max_files, "Too many files, reviewing only the first ones"
            );
            files.truncate(max_files);
        }

        let mode = review.mode;
        let plan = match mode {
            ReviewMode::Files => DispatchPlan::files(file_changes(repo, source, &files)),
            ReviewMode::Summary => DispatchPlan::summary(files, whole_diff(repo, source)),
            ReviewMode::Both => {
                DispatchPlan::both(file_changes(repo, source, &files), whole_diff(repo, source))
            }
        };

        let now = Local::now().naive_local();
        let meta = ReportMeta {
            id: report_id(&now),
            provider: self.reviewer.name().to_string(),
            model: self.reviewer.model().to_string(),
            datetime: now.format("%Y-%m-%d %H:%M:%S").to_string(),
            subtitle: subtitle(repo, source),
            mode,
            ai_invoked: false,
            ai_succeeded: false,
            status: String::new(),
        };

        info!(
            id = %meta.id,
            source = %source,
            mode = %mode,
            files = plan.file_changes().len(),
            "Prepared review"
        );
        Ok(Preparation::Ready(PreparedReview { meta, plan }))
    }

    /// Agent engine when enabled, otherwise one direct call per unit
    pub fn engine(&self) -> ReviewEngine {
        let agent = &self.config.agent;
        if !agent.enabled {
            return ReviewEngine::direct(self.reviewer.clone());
        }

        let tools = Arc::new(RepoTools::new(self.root.clone()));
        let orchestrator = Orchestrator::new(self.reviewer.clone(), tools);
        let options = RunOptions::new(agent.budget())
            .on_iteration(|iteration, calls| {
                info!(iteration, calls, "Reviewer requested context");
            })
            .on_tool_call(|call| {
                info!(tool = %call.name, args = ?call.arguments, "Running tool");
            });
        ReviewEngine::agent(orchestrator, options)
    }

    pub fn dispatcher(&self) -> Dispatcher {
        let options = DispatchOptions::new(self.config.review.prompt.clone())
            .with_concurrency(self.config.reviewer.resolved_concurrency())
            .with_diff_limit(self.config.limits.diff_limit());
        Dispatcher::new(self.engine(), options)
    }

    /// Dispatch a prepared review and assemble its report
    pub async fn execute(
        &self,
        prepared: PreparedReview,
        results: Arc<ResultSet>,
        observer: Option<Arc<dyn DispatchObserver>>,
    ) -> Report {
        let PreparedReview { mut meta, plan } = prepared;

        let mut dispatcher = self.dispatcher();
        if let Some(observer) = observer {
            dispatcher = dispatcher.with_observer(observer);
        }
        let stats = dispatcher.run(plan, results.clone()).await;

        meta.ai_invoked = stats.invoked > 0;
        meta.ai_succeeded = stats.succeeded > 0;
        meta.status = stats
            .last_error
            .map(|e| format!("LLM call failed: {e}"))
            .unwrap_or_default();

        Report::new(meta, results.snapshot())
    }
}

/// `YYYYMMDD-HHMMSS`
pub fn report_id(time: &NaiveDateTime) -> String {
    time.format("%Y%m%d-%H%M%S").to_string()
}

fn file_changes(repo: &GitRepo, source: &DiffSource, files: &[String]) -> Vec<FileChange> {
    files
        .iter()
        .map(|path| {
            let diff = repo.file_diff(source, path).unwrap_or_else(|e| {
                warn!(file = %path, error = %e, "Failed to read file diff");
                String::new()
            });
            FileChange::new(path.clone(), diff)
        })
        .collect()
}

fn whole_diff(repo: &GitRepo, source: &DiffSource) -> String {
    match repo.diff_text(source) {
        Ok(diff) => diff,
        Err(e) => {
            warn!(error = %e, "Failed to read the whole diff, summary will be empty");
            String::new()
        }
    }
}

/// `Branch: <name>` plus the change summary or its shortstat
fn subtitle(repo: &GitRepo, source: &DiffSource) -> String {
    let branch = match repo.current_branch() {
        Ok(Some(name)) => name,
        Ok(None) => "HEAD".to_string(),
        Err(e) => {
            debug!(error = %e, "Could not resolve branch");
            "unknown".to_string()
        }
    };

    let info = repo
        .change_summary(source)
        .ok()
        .flatten()
        .or_else(|| repo.shortstat(source).ok().filter(|s| !s.is_empty()));

    match info {
        Some(info) => format!("Branch: {branch} | {info}"),
        None => format!("Branch: {branch}"),
    }
}

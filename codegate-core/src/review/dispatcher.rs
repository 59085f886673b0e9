//! Bounded concurrent review of the units of a change
//!
//! A fixed pool of tokio workers drains a shared queue of file units. Each
//! unit is reviewed exactly once; a failing or panicking review is recorded
//! as that unit's review text and never stops its siblings. In summary and
//! both modes the whole-diff unit runs after the pool has drained.

use std::collections::VecDeque;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use futures::FutureExt;
use tracing::{debug, error, info, warn};

use crate::agent::{Orchestrator, ReviewInput, Reviewer, RunOptions};
use crate::budget::{clamp_concurrency, DiffLimit};
use crate::tools::panic_message;
use crate::Result;

use super::results::{DispatchPlan, FileChange, ResultSet, ReviewItem, ReviewMode, SUMMARY_UNIT};

/// How a single unit gets reviewed
#[derive(Clone)]
pub enum ReviewEngine {
    /// One reviewer call per unit, no tools
    Direct { reviewer: Arc<dyn Reviewer> },
    /// A bounded tool-using conversation per unit
    Agent {
        orchestrator: Orchestrator,
        options: RunOptions,
    },
}

impl ReviewEngine {
    pub fn direct(reviewer: Arc<dyn Reviewer>) -> Self {
        ReviewEngine::Direct { reviewer }
    }

    pub fn agent(orchestrator: Orchestrator, options: RunOptions) -> Self {
        ReviewEngine::Agent {
            orchestrator,
            options,
        }
    }

    pub fn is_agent(&self) -> bool {
        matches!(self, ReviewEngine::Agent { .. })
    }

    fn reviewer(&self) -> &Arc<dyn Reviewer> {
        match self {
            ReviewEngine::Direct { reviewer } => reviewer,
            ReviewEngine::Agent { orchestrator, .. } => orchestrator.reviewer(),
        }
    }

    /// Reviewer name for logs and reports
    pub fn name(&self) -> &str {
        self.reviewer().name()
    }

    pub fn model(&self) -> &str {
        self.reviewer().model()
    }

    /// Review one diff
    pub async fn review(&self, prompt: &str, diff: &str, files: &[String]) -> Result<String> {
        match self {
            ReviewEngine::Direct { reviewer } => reviewer.review(prompt, diff).await,
            ReviewEngine::Agent {
                orchestrator,
                options,
            } => {
                let input = ReviewInput::new(prompt, diff, files.to_vec());
                orchestrator.run(&input, options).await
            }
        }
    }
}

/// Progress notifications from a dispatch
///
/// Calls are synchronous and must not block.
pub trait DispatchObserver: Send + Sync {
    /// A unit finished; `completed` increases by one with every call
    fn on_progress(&self, _unit: &str, _completed: usize, _total: usize) {}

    /// The first file of a files-mode run finished; fires at most once
    fn on_first_file_completed(&self) {}
}

/// Dispatch settings
#[derive(Debug, Clone)]
pub struct DispatchOptions {
    concurrency: usize,
    pub diff_limit: DiffLimit,
    pub prompt: String,
}

impl DispatchOptions {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            concurrency: 1,
            diff_limit: DiffLimit::default(),
            prompt: prompt.into(),
        }
    }

    /// Worker count, clamped to the supported range
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = clamp_concurrency(concurrency);
        self
    }

    pub fn with_diff_limit(mut self, limit: DiffLimit) -> Self {
        self.diff_limit = limit;
        self
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }
}

/// Counters for one dispatch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchStats {
    /// Units for which the reviewer was invoked
    pub invoked: usize,
    /// Units that produced a review
    pub succeeded: usize,
    /// Last failure message, if any unit failed
    pub last_error: Option<String>,
}

/// State shared by the workers of one run
struct RunContext {
    mode: ReviewMode,
    total: usize,
    results: Arc<ResultSet>,
    queue: Mutex<VecDeque<FileChange>>,
    // Serializes progress notifications so counts arrive in order
    progress: Mutex<usize>,
    first_file_fired: AtomicBool,
    invoked: AtomicUsize,
    succeeded: AtomicUsize,
    last_error: Mutex<Option<String>>,
}

/// Fans reviews out over a fixed worker pool
#[derive(Clone)]
pub struct Dispatcher {
    engine: ReviewEngine,
    options: DispatchOptions,
    observer: Option<Arc<dyn DispatchObserver>>,
}

impl Dispatcher {
    pub fn new(engine: ReviewEngine, options: DispatchOptions) -> Self {
        Self {
            engine,
            options,
            observer: None,
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn DispatchObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn engine(&self) -> &ReviewEngine {
        &self.engine
    }

    /// Review every unit of `plan`, appending to `results`
    pub async fn run(&self, plan: DispatchPlan, results: Arc<ResultSet>) -> DispatchStats {
        let total = plan.expected_units();
        let (mode, files, summary_diff) = plan.into_parts();
        let paths: Vec<String> = files.iter().map(|f| f.path.clone()).collect();

        let queue: VecDeque<FileChange> = if mode.reviews_files() {
            files.into()
        } else {
            VecDeque::new()
        };
        let workers = self.options.concurrency.min(queue.len());

        let ctx = Arc::new(RunContext {
            mode,
            total,
            results,
            queue: Mutex::new(queue),
            progress: Mutex::new(0),
            first_file_fired: AtomicBool::new(false),
            invoked: AtomicUsize::new(0),
            succeeded: AtomicUsize::new(0),
            last_error: Mutex::new(None),
        });

        info!(
            mode = %mode,
            units = total,
            workers,
            reviewer = self.engine.name(),
            "Starting review dispatch"
        );

        let handles: Vec<_> = (0..workers)
            .map(|worker| {
                let dispatcher = self.clone();
                let ctx = ctx.clone();
                tokio::spawn(async move { dispatcher.worker(worker, ctx).await })
            })
            .collect();

        for handle in handles {
            if let Err(e) = handle.await {
                error!(error = %e, "Review worker failed");
            }
        }

        if mode.reviews_summary() {
            if summary_diff.is_empty() {
                warn!("Whole diff is empty, summary review may be meaningless");
            }
            let (review, error) = self.review_unit(&ctx, &summary_diff, &paths).await;
            let item = ReviewItem::completed(SUMMARY_UNIT, review, summary_diff).with_error(error);
            self.complete(&ctx, SUMMARY_UNIT, item);
        }

        let stats = DispatchStats {
            invoked: ctx.invoked.load(Ordering::SeqCst),
            succeeded: ctx.succeeded.load(Ordering::SeqCst),
            last_error: ctx
                .last_error
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone(),
        };
        info!(
            invoked = stats.invoked,
            succeeded = stats.succeeded,
            "Review dispatch finished"
        );
        stats
    }

    async fn worker(&self, worker: usize, ctx: Arc<RunContext>) {
        loop {
            let next = ctx
                .queue
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .pop_front();
            let Some(change) = next else {
                break;
            };

            debug!(worker, file = %change.path, "Reviewing file");
            let diff = self.options.diff_limit.apply(&change.diff).into_owned();
            let files = std::slice::from_ref(&change.path);
            let (review, error) = self.review_unit(&ctx, &diff, files).await;

            let recorded_diff = if diff.is_empty() {
                format!("diff --git a/{0} b/{0}", change.path)
            } else {
                diff
            };
            let item = ReviewItem::completed(change.path.clone(), review, recorded_diff)
                .with_error(error);
            self.complete(&ctx, &change.path, item);
        }
    }

    /// Run the engine, turning errors and panics into failure text
    async fn review_unit(
        &self,
        ctx: &RunContext,
        diff: &str,
        files: &[String],
    ) -> (String, Option<String>) {
        ctx.invoked.fetch_add(1, Ordering::SeqCst);
        let outcome = AssertUnwindSafe(self.engine.review(&self.options.prompt, diff, files))
            .catch_unwind()
            .await;

        let message = match outcome {
            Ok(Ok(review)) => {
                ctx.succeeded.fetch_add(1, Ordering::SeqCst);
                return (review, None);
            }
            Ok(Err(e)) => e.to_string(),
            Err(panic) => format!("reviewer panicked: {}", panic_message(panic.as_ref())),
        };

        warn!(files = ?files, error = %message, "Review failed");
        *ctx.last_error.lock().unwrap_or_else(PoisonError::into_inner) = Some(message.clone());
        (failure_text(&message), Some(message))
    }

    fn complete(&self, ctx: &RunContext, unit: &str, item: ReviewItem) {
        let mut progress = ctx.progress.lock().unwrap_or_else(PoisonError::into_inner);
        let completed = ctx.results.push(item);
        *progress += 1;

        if let Some(observer) = &self.observer {
            observer.on_progress(unit, *progress, ctx.total);
            if ctx.mode == ReviewMode::Files
                && completed == 1
                && !ctx.first_file_fired.swap(true, Ordering::SeqCst)
            {
                observer.on_first_file_completed();
            }
        }
    }
}

/// Review text recorded for a failed unit
pub fn failure_text(message: &str) -> String {
    format!("No AI review was generated.\nError: {message}")
}

//! Review command - Review staged changes or a commit

use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use clap::Args;
use codegate_core::{
    Config, DiffSource, DispatchObserver, GitRepo, Preparation, Report, ReviewFlow, ReviewMode,
};
use codegate_llm::ChatReviewer;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::live::{self, LiveView};

/// Arguments for the review command
#[derive(Args, Debug, Default)]
pub struct ReviewArgs {
    /// Review this commit instead of the staged changes
    #[arg(short, long)]
    pub commit: Option<String>,

    /// Review mode: summary, files or both (overrides config)
    #[arg(short, long)]
    pub mode: Option<ReviewMode>,

    /// Let the reviewer read and search the repository
    #[arg(long)]
    pub agent: bool,

    /// Do not open the browser
    #[arg(long)]
    pub no_open: bool,

    /// Keep the live view running until Enter is pressed
    #[arg(short, long)]
    pub wait: bool,
}

/// What a finished review run left running
pub struct ReviewOutcome {
    pub live: Option<LiveView>,
}

impl ReviewArgs {
    /// Execute the review command
    pub async fn execute(&self, config: Config, repo: &GitRepo) -> anyhow::Result<()> {
        let outcome = self.run(config, repo).await?;

        if let Some(live) = outcome.live {
            if self.wait && live.is_served() {
                println!("Press Enter to stop the live view...");
                let mut line = String::new();
                BufReader::new(tokio::io::stdin()).read_line(&mut line).await?;
            }
            live.shutdown().await;
        }
        Ok(())
    }

    /// Run the review and leave the live view up
    pub async fn run(&self, mut config: Config, repo: &GitRepo) -> anyhow::Result<ReviewOutcome> {
        if let Some(mode) = self.mode {
            config.review.mode = mode;
        }
        if self.agent {
            config.agent.enabled = true;
        }
        if self.no_open {
            config.ui.open_browser = false;
        }

        let source = self
            .commit
            .clone()
            .map(DiffSource::Commit)
            .unwrap_or_default();
        let root = repo.root().to_path_buf();

        let reviewer = ChatReviewer::from_config(&config.reviewer)?;
        let flow = ReviewFlow::new(config.clone(), Arc::new(reviewer), &root);

        let prepared = match flow.prepare(repo, &source)? {
            Preparation::NoFiles => {
                println!("No changes to review in {}.", source);
                return Ok(ReviewOutcome { live: None });
            }
            Preparation::AllFiltered { changed } => {
                println!(
                    "{} changed file(s), none left to review after filtering.",
                    changed
                );
                return Ok(ReviewOutcome { live: None });
            }
            Preparation::Ready(prepared) => prepared,
        };

        let mode = prepared.plan.mode();
        println!(
            "Reviewing {} file(s) in {} with {} ({}), mode: {}",
            prepared.plan.file_changes().len(),
            source,
            prepared.meta.provider,
            prepared.meta.model,
            mode
        );

        let results = prepared.result_set();
        let live = LiveView::start(config.ui.port, &prepared.meta, results.clone()).await;
        println!("Preview: {}", live.url());

        // Files mode opens once there is something to show
        let open = config.ui.open_browser;
        let defer_open = open && mode == ReviewMode::Files;
        if open && !defer_open {
            live::open_browser(live.url());
        }

        let progress: Arc<dyn DispatchObserver> = Arc::new(ProgressPrinter {
            open_url: defer_open.then(|| live.url().to_string()),
        });
        let report = flow.execute(prepared, results, Some(progress)).await;

        print_summary(&report);
        let saved = report.export(&config.output_dir(&root));
        if let Some(path) = saved.first() {
            println!("Report saved to {}", display_relative(path, &root));
        }

        Ok(ReviewOutcome { live: Some(live) })
    }
}

/// Prints a line per completed unit and opens the deferred live view
struct ProgressPrinter {
    open_url: Option<String>,
}

impl DispatchObserver for ProgressPrinter {
    fn on_progress(&self, unit: &str, completed: usize, total: usize) {
        println!("Analyzing [{}/{}] {}", completed, total, unit);
        let _ = std::io::stdout().flush();
    }

    fn on_first_file_completed(&self) {
        if let Some(url) = &self.open_url {
            live::open_browser(url);
        }
    }
}

fn print_summary(report: &Report) {
    let failed = report
        .snapshot
        .files
        .iter()
        .filter(|item| item.error.is_some())
        .count();
    println!();
    println!(
        "{} | {} unit(s) reviewed, {} failed",
        report.ai_status(),
        report.snapshot.files.len(),
        failed
    );
    if !report.meta.status.is_empty() {
        eprintln!("{}", report.meta.status);
    }
}

fn display_relative(path: &Path, root: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .display()
        .to_string()
}

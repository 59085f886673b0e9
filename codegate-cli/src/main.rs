//! Codegate CLI - AI review for commits
//!
//! Reviews staged changes or a commit with a language model and shows the
//! results in a live browser view.

mod commands;
mod live;

use clap::{Parser, Subcommand};
use codegate_core::{Config, GitRepo, Provider};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use commands::{HookArgs, InitArgs, ReviewArgs};

/// codegate: AI commit review
#[derive(Parser, Debug)]
#[command(name = "codegate")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Reviewer provider (overrides config and env)
    #[arg(long, global = true, env = "CODEGATE_PROVIDER")]
    provider: Option<Provider>,

    /// Model to use (overrides config and env)
    #[arg(long, global = true, env = "CODEGATE_MODEL")]
    model: Option<String>,

    /// Reviewer endpoint base URL (overrides config and env)
    #[arg(long, global = true, env = "CODEGATE_BASE_URL")]
    base_url: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Review staged changes or a commit
    #[command(visible_alias = "r")]
    Review(ReviewArgs),

    /// Write a default .codegate.toml
    Init(InitArgs),

    /// Manage the pre-commit hook
    Hook(HookArgs),

    /// Show current configuration
    Config,

    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // RUST_LOG wins; --verbose raises the default to debug for codegate crates
    let default_filter = if cli.verbose {
        "warn,codegate=debug,codegate_core=debug,codegate_llm=debug"
    } else {
        "warn"
    };
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .init();

    let cwd = std::env::current_dir()?;
    let repo = GitRepo::open(&cwd);
    let root = repo.as_ref().map(|r| r.root().to_path_buf()).ok();

    // Load configuration with overrides
    let config = Config::load_with_overrides(
        root.as_deref(),
        cli.provider,
        cli.model.clone(),
        cli.base_url.clone(),
    )?;

    tracing::debug!(
        provider = %config.reviewer.provider,
        model = ?config.reviewer.model,
        mode = %config.review.mode,
        agent = config.agent.enabled,
        "Configuration loaded"
    );

    match cli.command {
        Some(Commands::Review(args)) => args.execute(config, &repo?).await?,
        Some(Commands::Init(args)) => args.execute(&repo?)?,
        Some(Commands::Hook(args)) => args.execute(config, &repo?).await?,
        Some(Commands::Config) => print_config(&config, root.as_deref())?,
        Some(Commands::Version) => {
            println!("codegate {}", env!("CARGO_PKG_VERSION"));
        }
        None => {
            println!("codegate - AI review for commits");
            println!();
            println!("Use --help for usage information");
        }
    }

    Ok(())
}

fn print_config(config: &Config, root: Option<&std::path::Path>) -> anyhow::Result<()> {
    println!("Codegate Configuration");
    println!("======================");
    println!();
    match Config::find_config_file(root) {
        Some(path) => println!("Config file: {}", path.display()),
        None => println!("Config file: (not found - using defaults)"),
    }
    println!("Model: {}", config.reviewer.resolved_model().unwrap_or_else(|e| e.to_string()));
    println!("Endpoint: {}", config.reviewer.resolved_base_url());
    println!("Concurrency: {}", config.reviewer.resolved_concurrency());
    println!();
    print!("{}", config.to_toml()?);
    Ok(())
}

//! Pre-commit hook management

use std::fs;
use std::io::{BufRead, BufReader, IsTerminal, Write};
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Args, Subcommand};
use codegate_core::{Config, GitRepo};
use tracing::debug;

use super::ReviewArgs;

/// Line the hook script runs
pub const HOOK_COMMAND: &str = "codegate hook run";

const SHEBANG: &str = "#!/usr/bin/env sh";

/// Hook management commands
#[derive(Args, Debug)]
pub struct HookArgs {
    #[command(subcommand)]
    pub command: HookCommand,
}

#[derive(Subcommand, Debug)]
pub enum HookCommand {
    /// Add codegate to the pre-commit hook
    Install,

    /// Remove codegate from the pre-commit hook
    Uninstall,

    /// Review staged changes and confirm the commit (called by the hook)
    Run {
        /// Review even without a terminal to confirm on
        #[arg(short, long)]
        force: bool,
    },
}

impl HookArgs {
    /// Execute the hook command
    pub async fn execute(&self, config: Config, repo: &GitRepo) -> anyhow::Result<()> {
        match &self.command {
            HookCommand::Install => {
                let path = install(repo)?;
                println!("Installed pre-commit hook: {}", path.display());
                Ok(())
            }
            HookCommand::Uninstall => {
                match uninstall(repo)? {
                    Some(path) => println!("Removed codegate from {}", path.display()),
                    None => println!("No codegate pre-commit hook found"),
                }
                Ok(())
            }
            HookCommand::Run { force } => run_hook(config, repo, *force).await,
        }
    }
}

/// Path of the repository's pre-commit hook
pub fn hook_path(repo: &GitRepo) -> PathBuf {
    repo.git_dir().join("hooks").join("pre-commit")
}

/// Add the hook command to the pre-commit script, creating it when missing
pub fn install(repo: &GitRepo) -> anyhow::Result<PathBuf> {
    let path = hook_path(repo);
    let existing = match fs::read_to_string(&path) {
        Ok(content) => Some(content),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
        Err(e) => return Err(e).with_context(|| format!("reading {}", path.display())),
    };

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(&path, with_hook_line(existing.as_deref()))
        .with_context(|| format!("writing {}", path.display()))?;
    make_executable(&path)?;
    Ok(path)
}

/// Remove the hook command; deletes the script when nothing else is left
pub fn uninstall(repo: &GitRepo) -> anyhow::Result<Option<PathBuf>> {
    let path = hook_path(repo);
    let Ok(content) = fs::read_to_string(&path) else {
        return Ok(None);
    };
    if !content.lines().any(|l| l.trim() == HOOK_COMMAND) {
        return Ok(None);
    }

    match without_hook_line(&content) {
        Some(rest) => fs::write(&path, rest)?,
        None => fs::remove_file(&path)?,
    }
    Ok(Some(path))
}

/// Script content with the hook command appended once
fn with_hook_line(existing: Option<&str>) -> String {
    match existing {
        Some(content) if content.lines().any(|l| l.trim() == HOOK_COMMAND) => content.to_string(),
        Some(content) if !content.trim().is_empty() => {
            format!("{}\n{}\n", content.trim_end(), HOOK_COMMAND)
        }
        _ => format!("{SHEBANG}\n{HOOK_COMMAND}\n"),
    }
}

/// Script content without the hook command, or `None` if only the shebang
/// would remain
fn without_hook_line(content: &str) -> Option<String> {
    let kept: Vec<&str> = content
        .lines()
        .filter(|l| l.trim() != HOOK_COMMAND)
        .collect();
    let meaningful = kept
        .iter()
        .any(|l| !l.trim().is_empty() && !l.starts_with("#!"));
    meaningful.then(|| format!("{}\n", kept.join("\n").trim_end()))
}

#[cfg(unix)]
fn make_executable(path: &Path) -> anyhow::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let mut permissions = fs::metadata(path)?.permissions();
    permissions.set_mode(0o755);
    fs::set_permissions(path, permissions)?;
    Ok(())
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> anyhow::Result<()> {
    Ok(())
}

/// Review, then ask whether the commit should go ahead
async fn run_hook(config: Config, repo: &GitRepo, force: bool) -> anyhow::Result<()> {
    let mut terminal = Terminal::open();
    if terminal.is_none() && !force {
        println!("codegate: no terminal available, skipping review");
        return Ok(());
    }

    if let Some(terminal) = terminal.as_mut() {
        if !terminal.confirm("Review staged changes with AI?")? {
            println!("Review skipped");
            return Ok(());
        }
    }

    let outcome = ReviewArgs::default().run(config, repo).await?;

    let proceed = match terminal.as_mut() {
        Some(terminal) => terminal.confirm("Proceed with the commit?")?,
        None => true,
    };
    if let Some(live) = outcome.live {
        live.shutdown().await;
    }

    if !proceed {
        anyhow::bail!("Commit cancelled");
    }
    println!("Commit confirmed");
    Ok(())
}

/// Where hook prompts are read from
///
/// Git runs hooks with stdin detached, so prompts fall back to `/dev/tty`.
enum Terminal {
    Stdin,
    Tty(BufReader<fs::File>),
}

impl Terminal {
    fn open() -> Option<Self> {
        if std::io::stdin().is_terminal() {
            return Some(Terminal::Stdin);
        }
        match fs::File::open("/dev/tty") {
            Ok(file) => Some(Terminal::Tty(BufReader::new(file))),
            Err(e) => {
                debug!(error = %e, "No controlling terminal");
                None
            }
        }
    }

    /// Ask a yes/no question; an empty answer means yes
    fn confirm(&mut self, question: &str) -> anyhow::Result<bool> {
        print!("{question} [Y/n] ");
        std::io::stdout().flush()?;

        let mut answer = String::new();
        match self {
            Terminal::Stdin => std::io::stdin().lock().read_line(&mut answer)?,
            Terminal::Tty(reader) => reader.read_line(&mut answer)?,
        };
        Ok(parse_answer(&answer))
    }
}

fn parse_answer(answer: &str) -> bool {
    !matches!(answer.trim().to_lowercase().as_str(), "n" | "no")
}

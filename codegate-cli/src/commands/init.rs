//! Init command - Write a default configuration file

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Args;
use codegate_core::config::PROJECT_CONFIG_FILE;
use codegate_core::{Config, GitRepo};

use super::hook;

const HEADER: &str = "\
# codegate configuration
#
# Every key is optional; missing keys use the defaults shown here.
# Providers: ollama, openai, deepseek, mistral, zhipu, aliyun, volcengine
# API keys are read from the provider's environment variable
# (e.g. DEEPSEEK_API_KEY) or from reviewer.api_key.

";

/// Arguments for the init command
#[derive(Args, Debug)]
pub struct InitArgs {
    /// Overwrite an existing config file
    #[arg(short, long)]
    pub force: bool,

    /// Also install the pre-commit hook
    #[arg(long)]
    pub hook: bool,
}

impl InitArgs {
    /// Execute the init command
    pub fn execute(&self, repo: &GitRepo) -> anyhow::Result<()> {
        let path = write_config(repo.root(), self.force)?;
        println!("Wrote {}", path.display());

        if self.hook {
            let hook = hook::install(repo)?;
            println!("Installed pre-commit hook: {}", hook.display());
        }
        Ok(())
    }
}

/// Write the default config to `<root>/.codegate.toml`
pub fn write_config(root: &Path, force: bool) -> anyhow::Result<PathBuf> {
    let path = Config::project_config_path(root);
    if path.exists() && !force {
        anyhow::bail!(
            "{} already exists (use --force to overwrite)",
            PROJECT_CONFIG_FILE
        );
    }

    let content = format!("{}{}", HEADER, Config::default().to_toml()?);
    fs::write(&path, content).with_context(|| format!("writing {}", path.display()))?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_write_config_round_trips() {
        let dir = TempDir::new().unwrap();
        let path = write_config(dir.path(), false).unwrap();
        assert_eq!(path, dir.path().join(".codegate.toml"));

        let loaded = Config::load_from_file(&path).unwrap();
        assert_eq!(loaded.ui.port, 5175);
        assert_eq!(loaded.review.exclude, vec!["**/package-lock.json"]);
    }

    #[test]
    fn test_existing_config_needs_force() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(".codegate.toml"), "[ui]\nport = 1\n").unwrap();

        let err = write_config(dir.path(), false).unwrap_err();
        assert!(err.to_string().contains("already exists"));

        write_config(dir.path(), true).unwrap();
        let loaded = Config::load(Some(dir.path())).unwrap();
        assert_eq!(loaded.ui.port, 5175);
    }
}

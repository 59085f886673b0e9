//! Configuration management for codegate
//!
//! Configuration is loaded with the following priority (highest to lowest):
//! 1. CLI flags
//! 2. Environment variables (CODEGATE_*)
//! 3. Config file (`.codegate.toml` in the repository root, else
//!    `~/.config/codegate/config.toml`)
//! 4. Default values
//!
//! Every section uses serde defaults, so a file only needs the keys it changes.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::budget::{self, AgentBudget, DiffLimit};
use crate::review::ReviewMode;
use crate::{Error, Result};

/// File name of the per-repository config
pub const PROJECT_CONFIG_FILE: &str = ".codegate.toml";

const DEFAULT_PROMPT: &str = "As a senior code review engineer, review this change from the \
perspectives of security, performance, code style, and test coverage. Point out issues and \
suggestions for improvement, and provide necessary example patches.";

/// Reviewer backends speaking the OpenAI chat-completions format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    #[default]
    Ollama,
    #[serde(rename = "openai")]
    OpenAI,
    DeepSeek,
    Mistral,
    Zhipu,
    Aliyun,
    Volcengine,
}

impl Provider {
    pub fn all() -> &'static [Provider] {
        &[
            Provider::Ollama,
            Provider::OpenAI,
            Provider::DeepSeek,
            Provider::Mistral,
            Provider::Zhipu,
            Provider::Aliyun,
            Provider::Volcengine,
        ]
    }

    pub fn name(&self) -> &'static str {
        match self {
            Provider::Ollama => "ollama",
            Provider::OpenAI => "openai",
            Provider::DeepSeek => "deepseek",
            Provider::Mistral => "mistral",
            Provider::Zhipu => "zhipu",
            Provider::Aliyun => "aliyun",
            Provider::Volcengine => "volcengine",
        }
    }

    /// Base URL of the OpenAI-compatible endpoint
    pub fn default_base_url(&self) -> &'static str {
        match self {
            Provider::Ollama => "http://localhost:11434/v1",
            Provider::OpenAI => "https://api.openai.com/v1",
            Provider::DeepSeek => "https://api.deepseek.com",
            Provider::Mistral => "https://api.mistral.ai/v1",
            Provider::Zhipu => "https://open.bigmodel.cn/api/paas/v4",
            Provider::Aliyun => "https://dashscope.aliyuncs.com/compatible-mode/v1",
            Provider::Volcengine => "https://ark.cn-beijing.volces.com/api/v3",
        }
    }

    /// Default model; Volcengine endpoints are per-account and have none
    pub fn default_model(&self) -> Option<&'static str> {
        match self {
            Provider::Ollama => Some("qwen2.5-coder"),
            Provider::OpenAI => Some("gpt-4o"),
            Provider::DeepSeek => Some("deepseek-chat"),
            Provider::Mistral => Some("mistral-large-latest"),
            Provider::Zhipu => Some("glm-4"),
            Provider::Aliyun => Some("qwen-plus"),
            Provider::Volcengine => None,
        }
    }

    /// Environment variable holding the API key
    pub fn default_api_key_env(&self) -> Option<&'static str> {
        match self {
            Provider::Ollama => None,
            Provider::OpenAI => Some("OPENAI_API_KEY"),
            Provider::DeepSeek => Some("DEEPSEEK_API_KEY"),
            Provider::Mistral => Some("MISTRAL_API_KEY"),
            Provider::Zhipu => Some("ZHIPU_API_KEY"),
            Provider::Aliyun => Some("DASHSCOPE_API_KEY"),
            Provider::Volcengine => Some("VOLCENGINE_API_KEY"),
        }
    }

    pub fn default_concurrency(&self) -> usize {
        match self {
            Provider::DeepSeek => 4,
            _ => 1,
        }
    }

    pub fn requires_api_key(&self) -> bool {
        !matches!(self, Provider::Ollama)
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for Provider {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let lower = s.to_lowercase();
        Provider::all()
            .iter()
            .copied()
            .find(|p| p.name() == lower)
            .ok_or_else(|| {
                let names: Vec<&str> = Provider::all().iter().map(Provider::name).collect();
                format!("Unknown provider: {} (expected one of: {})", s, names.join(", "))
            })
    }
}

/// Reviewer connection settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ReviewerConfig {
    pub provider: Provider,

    /// Model name; provider default when unset
    pub model: Option<String>,

    /// Endpoint base URL; provider default when unset
    pub base_url: Option<String>,

    /// Environment variable with the API key; provider default when unset
    pub api_key_env: Option<String>,

    /// Inline API key, used when the environment variable is not set
    pub api_key: Option<String>,

    /// Files reviewed in parallel; provider default when unset
    pub concurrency: Option<usize>,

    /// Per-request timeout
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,

    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

impl Default for ReviewerConfig {
    fn default() -> Self {
        Self {
            provider: Provider::default(),
            model: None,
            base_url: None,
            api_key_env: None,
            api_key: None,
            concurrency: None,
            timeout: Duration::from_secs(120),
            temperature: None,
            max_tokens: None,
        }
    }
}

impl ReviewerConfig {
    /// Model to request
    pub fn resolved_model(&self) -> Result<String> {
        self.model
            .clone()
            .or_else(|| self.provider.default_model().map(str::to_string))
            .ok_or_else(|| {
                Error::Config(format!(
                    "No model configured for provider '{}'. Set reviewer.model in {}",
                    self.provider, PROJECT_CONFIG_FILE
                ))
            })
    }

    pub fn resolved_base_url(&self) -> String {
        self.base_url
            .clone()
            .unwrap_or_else(|| self.provider.default_base_url().to_string())
    }

    pub fn resolved_api_key_env(&self) -> Option<String> {
        self.api_key_env
            .clone()
            .or_else(|| self.provider.default_api_key_env().map(str::to_string))
    }

    /// API key from the environment, falling back to the inline key
    pub fn resolved_api_key(&self) -> Option<String> {
        self.resolved_api_key_env()
            .and_then(|var| std::env::var(var).ok())
            .filter(|k| !k.is_empty())
            .or_else(|| self.api_key.clone().filter(|k| !k.is_empty()))
    }

    /// Worker count, clamped to the supported range
    pub fn resolved_concurrency(&self) -> usize {
        budget::clamp_concurrency(
            self.concurrency
                .unwrap_or_else(|| self.provider.default_concurrency()),
        )
    }

    /// Switch provider, dropping settings that belonged to the previous one
    pub fn set_provider(&mut self, provider: Provider) {
        if provider != self.provider {
            self.provider = provider;
            self.model = None;
            self.base_url = None;
            self.api_key_env = None;
            self.concurrency = None;
        }
    }
}

/// Agent review settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Let the reviewer call repository tools
    pub enabled: bool,
    pub max_iterations: u32,
    pub max_tool_calls: u32,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_iterations: budget::DEFAULT_MAX_ITERATIONS,
            max_tool_calls: budget::DEFAULT_MAX_TOOL_CALLS,
        }
    }
}

impl AgentConfig {
    pub fn budget(&self) -> AgentBudget {
        AgentBudget::new(self.max_iterations, self.max_tool_calls)
    }
}

/// What gets reviewed and how
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ReviewConfig {
    pub mode: ReviewMode,
    /// Reviewer instructions
    pub prompt: String,
    /// Extension whitelist; empty reviews every file
    pub file_types: Vec<String>,
    /// Glob patterns of files to skip
    pub exclude: Vec<String>,
}

impl Default for ReviewConfig {
    fn default() -> Self {
        Self {
            mode: ReviewMode::default(),
            prompt: DEFAULT_PROMPT.to_string(),
            file_types: Vec::new(),
            exclude: vec!["**/package-lock.json".to_string()],
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Lines kept from each file diff
    pub max_diff_lines: usize,
    /// Files reviewed per run
    pub max_files: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_diff_lines: budget::DEFAULT_MAX_DIFF_LINES,
            max_files: 100,
        }
    }
}

impl LimitsConfig {
    pub fn diff_limit(&self) -> DiffLimit {
        DiffLimit::new(self.max_diff_lines)
    }
}

/// Live view settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UiConfig {
    pub open_browser: bool,
    pub port: u16,
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            open_browser: true,
            port: 5175,
        }
    }
}

/// Report output settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Report directory, relative to the repository root
    pub dir: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from(".review-logs"),
        }
    }
}

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub reviewer: ReviewerConfig,
    pub agent: AgentConfig,
    pub review: ReviewConfig,
    pub limits: LimitsConfig,
    pub ui: UiConfig,
    pub output: OutputConfig,
}

impl Config {
    /// Load configuration for a repository
    ///
    /// Uses `.codegate.toml` in `repo_root` when present, else the user config
    /// file, else defaults.
    pub fn load(repo_root: Option<&Path>) -> Result<Self> {
        match Self::find_config_file(repo_root) {
            Some(path) => {
                debug!(path = %path.display(), "Loading configuration");
                Self::load_from_file(&path)
            }
            None => Ok(Self::default()),
        }
    }

    /// The config file `load` would read
    pub fn find_config_file(repo_root: Option<&Path>) -> Option<PathBuf> {
        repo_root
            .map(Self::project_config_path)
            .filter(|p| p.exists())
            .or_else(|| Self::default_config_path().filter(|p| p.exists()))
    }

    /// Load configuration from a specific file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(Error::Io)?;
        toml::from_str(&contents).map_err(|e| {
            Error::Config(format!("Failed to parse config {}: {}", path.display(), e))
        })
    }

    /// `<root>/.codegate.toml`
    pub fn project_config_path(repo_root: &Path) -> PathBuf {
        repo_root.join(PROJECT_CONFIG_FILE)
    }

    /// Get the default config file path
    ///
    /// Returns `~/.config/codegate/config.toml` on Unix
    pub fn default_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("codegate").join("config.toml"))
    }

    /// Apply environment variable overrides
    ///
    /// Supported variables:
    /// - CODEGATE_PROVIDER: Reviewer provider
    /// - CODEGATE_MODEL: Model to use
    /// - CODEGATE_BASE_URL: Endpoint base URL
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    fn with_overrides_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(provider) = lookup("CODEGATE_PROVIDER") {
            match provider.parse() {
                Ok(provider) => self.reviewer.set_provider(provider),
                Err(e) => warn!(error = %e, "Ignoring CODEGATE_PROVIDER"),
            }
        }

        if let Some(model) = lookup("CODEGATE_MODEL") {
            self.reviewer.model = Some(model);
        }

        if let Some(base_url) = lookup("CODEGATE_BASE_URL") {
            self.reviewer.base_url = Some(base_url);
        }

        self
    }

    /// Apply CLI flag overrides
    pub fn with_cli_overrides(
        mut self,
        provider: Option<Provider>,
        model: Option<String>,
        base_url: Option<String>,
    ) -> Self {
        if let Some(provider) = provider {
            self.reviewer.set_provider(provider);
        }

        if let Some(m) = model {
            self.reviewer.model = Some(m);
        }

        if let Some(url) = base_url {
            self.reviewer.base_url = Some(url);
        }

        self
    }

    /// Load configuration with all overrides applied
    ///
    /// Priority: CLI > env > config file > defaults
    pub fn load_with_overrides(
        repo_root: Option<&Path>,
        provider: Option<Provider>,
        model: Option<String>,
        base_url: Option<String>,
    ) -> Result<Self> {
        Ok(Self::load(repo_root)?
            .with_env_overrides()
            .with_cli_overrides(provider, model, base_url))
    }

    /// Render as TOML, for `init` and `config`
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))
    }

    /// Report directory resolved against the repository root
    pub fn output_dir(&self, repo_root: &Path) -> PathBuf {
        if self.output.dir.is_absolute() {
            self.output.dir.clone()
        } else {
            repo_root.join(&self.output.dir)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.reviewer.provider, Provider::Ollama);
        assert_eq!(config.reviewer.resolved_model().unwrap(), "qwen2.5-coder");
        assert_eq!(config.reviewer.timeout, Duration::from_secs(120));
        assert!(!config.agent.enabled);
        assert_eq!(config.agent.budget(), AgentBudget::new(5, 10));
        assert_eq!(config.review.mode, ReviewMode::Files);
        assert_eq!(config.review.exclude, vec!["**/package-lock.json"]);
        assert_eq!(config.limits.max_diff_lines, 10_000);
        assert_eq!(config.limits.max_files, 100);
        assert_eq!(config.ui.port, 5175);
        assert_eq!(config.output.dir, PathBuf::from(".review-logs"));
    }

    #[test]
    fn test_parse_toml() {
        let toml = r#"
[reviewer]
provider = "deepseek"
timeout = "30s"
temperature = 0.2

[agent]
enabled = true
max_tool_calls = 4

[review]
mode = "both"
file_types = ["rs", "ts"]
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.reviewer.provider, Provider::DeepSeek);
        assert_eq!(config.reviewer.timeout, Duration::from_secs(30));
        assert_eq!(config.reviewer.resolved_concurrency(), 4);
        assert_eq!(config.reviewer.resolved_base_url(), "https://api.deepseek.com");
        assert_eq!(
            config.reviewer.resolved_api_key_env().as_deref(),
            Some("DEEPSEEK_API_KEY")
        );
        assert!(config.agent.enabled);
        assert_eq!(config.agent.max_iterations, 5);
        assert_eq!(config.agent.max_tool_calls, 4);
        assert_eq!(config.review.mode, ReviewMode::Both);
        // untouched keys keep their defaults
        assert_eq!(config.review.exclude, vec!["**/package-lock.json"]);
        assert_eq!(config.ui.port, 5175);
    }

    #[test]
    fn test_volcengine_requires_model() {
        let mut reviewer = ReviewerConfig::default();
        reviewer.set_provider(Provider::Volcengine);
        assert!(reviewer.resolved_model().is_err());
        reviewer.model = Some("ep-123".to_string());
        assert_eq!(reviewer.resolved_model().unwrap(), "ep-123");
    }

    #[test]
    fn test_concurrency_clamped() {
        let reviewer = ReviewerConfig {
            concurrency: Some(32),
            ..ReviewerConfig::default()
        };
        assert_eq!(reviewer.resolved_concurrency(), 8);
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("CODEGATE_PROVIDER", "openai"),
            ("CODEGATE_MODEL", "gpt-4o-mini"),
        ]
        .into_iter()
        .collect();
        let config = Config::default().with_overrides_from(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(config.reviewer.provider, Provider::OpenAI);
        assert_eq!(config.reviewer.model.as_deref(), Some("gpt-4o-mini"));
        assert_eq!(config.reviewer.resolved_base_url(), "https://api.openai.com/v1");
    }

    #[test]
    fn test_invalid_env_provider_ignored() {
        let config = Config::default()
            .with_overrides_from(|k| (k == "CODEGATE_PROVIDER").then(|| "nope".to_string()));
        assert_eq!(config.reviewer.provider, Provider::Ollama);
    }

    #[test]
    fn test_cli_overrides_reset_provider_settings() {
        let mut config = Config::default();
        config.reviewer.model = Some("llama3".to_string());
        config.reviewer.base_url = Some("http://gpu-box:11434/v1".to_string());

        let config = config.with_cli_overrides(Some(Provider::Mistral), None, None);
        assert_eq!(config.reviewer.resolved_model().unwrap(), "mistral-large-latest");
        assert_eq!(config.reviewer.resolved_base_url(), "https://api.mistral.ai/v1");

        let config = config.with_cli_overrides(None, Some("codestral".into()), None);
        assert_eq!(config.reviewer.resolved_model().unwrap(), "codestral");
    }

    #[test]
    fn test_provider_parse() {
        assert_eq!("OpenAI".parse::<Provider>().unwrap(), Provider::OpenAI);
        let err = "anthropic".parse::<Provider>().unwrap_err();
        assert!(err.contains("Unknown provider: anthropic"));
    }

    #[test]
    fn test_project_config_wins() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join(PROJECT_CONFIG_FILE),
            "[ui]\nport = 9000\n",
        )
        .unwrap();
        let config = Config::load(Some(dir.path())).unwrap();
        assert_eq!(config.ui.port, 9000);
    }

    #[test]
    fn test_bad_file_is_config_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(PROJECT_CONFIG_FILE);
        std::fs::write(&path, "[ui\nport = ").unwrap();
        assert!(matches!(Config::load_from_file(&path), Err(Error::Config(_))));
    }

    #[test]
    fn test_to_toml_round_trip() {
        let rendered = Config::default().to_toml().unwrap();
        let parsed: Config = toml::from_str(&rendered).unwrap();
        assert_eq!(parsed.reviewer.timeout, Duration::from_secs(120));
        assert_eq!(parsed.review.prompt, DEFAULT_PROMPT);
    }

    #[test]
    fn test_output_dir() {
        let config = Config::default();
        assert_eq!(
            config.output_dir(Path::new("/repo")),
            PathBuf::from("/repo/.review-logs")
        );
    }
}

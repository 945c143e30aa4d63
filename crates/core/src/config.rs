//! Configuration management for Bastion.
//!
//! This module handles loading and merging configuration from multiple sources:
//! - Built-in defaults
//! - Config files (.bastion/config.yaml)
//! - Environment variables
//! - Command-line flags
//!
//! The resulting [`AppConfig`] is built once at startup and handed to each
//! component by reference. No component reads the environment on its own.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::error::{AppError, AppResult};

/// Name of the shared read-only corpus.
pub const COMMON_CORPUS: &str = "common_dataset";

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Path to the workspace root (contains .bastion/)
    pub workspace: PathBuf,

    /// Optional config file path
    pub config_file: Option<PathBuf>,

    /// Log level override
    pub log_level: Option<String>,

    /// Log output format ("text" or "json")
    pub log_format: String,

    /// Verbose mode (enables debug logging)
    pub verbose: bool,

    /// Disable colored output
    pub no_color: bool,

    /// External service endpoints and credentials
    pub service: ServiceConfig,

    /// Retrieval and post-processing settings
    pub retrieval: RetrievalConfig,

    /// Prompt assembly settings
    pub prompt: PromptConfig,

    /// Dialogue provider settings
    pub dialogue: DialogueConfig,

    /// Guard policy
    pub guard: GuardPolicy,
}

/// Endpoints, credentials and timeouts for the external collaborators.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServiceConfig {
    /// API prefix shared by search and dialogue (e.g. "http://host:9002/api")
    pub base_url: String,

    /// Personal/group token used for dialogue and private corpora
    pub user_token: String,

    /// Per-corpus tokens; corpora not listed use `user_token`
    pub corpus_tokens: HashMap<String, String>,

    /// Per-request timeout in seconds
    pub timeout_secs: u64,

    /// Backoff before the single retry, in milliseconds
    pub backoff_ms: u64,

    /// Upper bound for any backoff, in milliseconds
    pub max_backoff_ms: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        let mut corpus_tokens = HashMap::new();
        corpus_tokens.insert(COMMON_CORPUS.to_string(), "token_common".to_string());

        Self {
            base_url: "http://localhost:9002/api".to_string(),
            user_token: String::new(),
            corpus_tokens,
            timeout_secs: 30,
            backoff_ms: 300,
            max_backoff_ms: 2000,
        }
    }
}

impl ServiceConfig {
    /// Token to present when searching `corpus_id`.
    pub fn token_for_corpus(&self, corpus_id: &str) -> &str {
        let key = corpus_id.trim().to_lowercase();
        self.corpus_tokens
            .iter()
            .find(|(name, _)| name.to_lowercase() == key)
            .map(|(_, token)| token.as_str())
            .unwrap_or(&self.user_token)
    }
}

/// Retrieval settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RetrievalConfig {
    /// Corpus used when a RAG query names none
    pub default_corpus: String,

    /// Snippet count used when a RAG query names none
    pub default_top_k: usize,

    /// Similarity metric requested from the search service
    pub metric_type: String,

    /// Server-side score threshold sent with each search
    pub score_threshold: f32,

    /// Client-side minimum score for a hit to become a snippet
    pub min_score: f32,

    /// Hard cap on each snippet's text, in characters
    pub max_snippet_chars: usize,

    /// Optional filter expression forwarded to the search service
    pub expr: Option<String>,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            default_corpus: COMMON_CORPUS.to_string(),
            default_top_k: 5,
            metric_type: "COSINE".to_string(),
            score_threshold: 0.0,
            min_score: 0.6,
            max_snippet_chars: 500,
            expr: None,
        }
    }
}

/// Prompt assembly settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PromptConfig {
    /// Upper bound on the assembled prompt, in characters
    pub max_prompt_chars: usize,

    /// Prompt definition to load from .bastion/prompts/ (built-in when absent)
    pub prompt_id: Option<String>,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            max_prompt_chars: 8000,
            prompt_id: None,
        }
    }
}

/// Dialogue provider settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DialogueConfig {
    /// Provider kind ("http" or "ollama")
    pub provider: String,

    /// Endpoint override (defaults to `service.baseUrl` for "http")
    pub endpoint: Option<String>,

    /// Model identifier (used by "ollama")
    pub model: String,

    /// Sampling temperature
    pub temperature: f32,

    /// Maximum tokens to generate
    pub max_tokens: u32,
}

impl Default for DialogueConfig {
    fn default() -> Self {
        Self {
            provider: "http".to_string(),
            endpoint: None,
            model: "llama3.2".to_string(),
            temperature: 0.7,
            max_tokens: 300,
        }
    }
}

/// Repeated-substring detection settings.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RepeatPolicy {
    /// Minimum length of the repeated unit, in characters
    pub min_length: usize,

    /// Minimum number of consecutive occurrences
    pub min_repeats: usize,
}

impl Default for RepeatPolicy {
    fn default() -> Self {
        Self {
            min_length: 14,
            min_repeats: 10,
        }
    }
}

/// Where guard audit records go.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditTarget {
    None,
    Tracing,
    Jsonl,
}

/// Guard policy. Every domain judgment lives here, not in the guard code.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GuardPolicy {
    /// Maximum query length, in characters
    pub max_input_chars: usize,

    /// Maximum answer length, in characters. Longer answers are refused unscanned.
    pub max_output_chars: usize,

    /// Case-insensitive literal terms refused in queries
    pub blocked_terms: Vec<String>,

    /// Regular expressions refused in queries
    pub blocked_patterns: Vec<String>,

    /// Case-insensitive literal terms refused in answers
    pub output_blocked_terms: Vec<String>,

    /// Regular expressions refused in answers
    pub output_blocked_patterns: Vec<String>,

    /// Repeated-substring detection (applies to queries and answers)
    pub repeat: RepeatPolicy,

    /// Fixed answer for refused queries
    pub input_refusal: String,

    /// Fixed answer replacing refused model output
    pub output_refusal: String,

    /// Audit destination
    pub audit: AuditTarget,
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl Default for GuardPolicy {
    fn default() -> Self {
        Self {
            max_input_chars: 2000,
            max_output_chars: 8000,
            blocked_terms: strings(&[
                // Jailbreak instructions
                "ignore previous",
                "forget everything",
                "system prompt",
                "忽略之前",
                "忘掉",
                "系统提示词",
                "you are now",
                "roleplay as",
                "pretend to be",
                "你现在是",
                "扮演",
                "disregard instructions",
                "override system",
                "bypass safety",
                "忽略指令",
                "重写系统",
                "绕过安全",
                // Inappropriate content
                "violence",
                "terror",
                "暴力",
                "恐怖",
                "极端",
                "色情",
                // Personal data
                "private key",
                "api_key",
                "个人信息",
                "私有密钥",
                // Attack tooling
                "反序列化利用",
                "注入语句",
                "爆破字典",
                "绕过waf",
            ]),
            blocked_patterns: strings(&[r"(?i)\b0day\b", r"(?i)\brce\s+(exp|exploit|poc)\b"]),
            output_blocked_terms: strings(&["系统指令", "system prompt", "系统提示词"]),
            output_blocked_patterns: strings(&[
                r"-----BEGIN [A-Z ]*PRIVATE KEY-----",
                r"(?i)\b(api[_-]?key|secret|access[_-]?token)\s*[:=]\s*\S{8,}",
                r"\bAKIA[0-9A-Z]{16}\b",
            ]),
            repeat: RepeatPolicy::default(),
            input_refusal: "您的请求包含敏感信息，请检查您的请求是否合法！".to_string(),
            output_refusal: "很抱歉，暂时无法向您提供相关信息！".to_string(),
            audit: AuditTarget::Tracing,
        }
    }
}

/// Full configuration file structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct ConfigFile {
    workspace: Option<WorkspaceConfig>,
    logging: Option<LoggingConfig>,
    service: Option<ServiceConfig>,
    retrieval: Option<RetrievalConfig>,
    prompt: Option<PromptConfig>,
    dialogue: Option<DialogueConfig>,
    guard: Option<GuardPolicy>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct WorkspaceConfig {
    path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct LoggingConfig {
    level: Option<String>,
    color: Option<bool>,
    format: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            workspace: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            config_file: None,
            log_level: None,
            log_format: "text".to_string(),
            verbose: false,
            no_color: false,
            service: ServiceConfig::default(),
            retrieval: RetrievalConfig::default(),
            prompt: PromptConfig::default(),
            dialogue: DialogueConfig::default(),
            guard: GuardPolicy::default(),
        }
    }
}

/// Known dialogue providers.
pub const KNOWN_DIALOGUE_PROVIDERS: [&str; 2] = ["http", "ollama"];

impl AppConfig {
    /// Load configuration from defaults, the YAML file and environment variables.
    ///
    /// Environment variables:
    /// - `BASTION_WORKSPACE`: Override workspace path
    /// - `BASTION_CONFIG`: Path to config file
    /// - `BASTION_BASE_URL`: API prefix of the search/dialogue services
    /// - `BASTION_USER_TOKEN`: Personal/group token
    /// - `BASTION_COMMON_TOKEN`: Token for the shared `common_dataset` corpus
    /// - `BASTION_DEFAULT_CORPUS`: Corpus used when a query names none
    /// - `BASTION_TOP_K`: Default snippet count
    /// - `BASTION_TIMEOUT`: Request timeout in seconds
    /// - `RUST_LOG`: Log level
    /// - `NO_COLOR`: Disable colored output
    ///
    /// # Example
    /// ```no_run
    /// use bastion_core::config::AppConfig;
    ///
    /// let config = AppConfig::load().expect("Failed to load config");
    /// println!("Workspace: {:?}", config.workspace);
    /// ```
    pub fn load() -> AppResult<Self> {
        Self::load_with(None, None)
    }

    /// Like [`AppConfig::load`], but an explicit workspace or config file
    /// wins over `BASTION_WORKSPACE` / `BASTION_CONFIG`.
    pub fn load_with(workspace: Option<PathBuf>, config_file: Option<PathBuf>) -> AppResult<Self> {
        let mut config = Self::default();

        let workspace =
            workspace.or_else(|| std::env::var_os("BASTION_WORKSPACE").map(PathBuf::from));
        if let Some(workspace) = workspace {
            config.workspace = workspace;
        }

        config.config_file =
            config_file.or_else(|| std::env::var_os("BASTION_CONFIG").map(PathBuf::from));

        if !config.workspace.exists() {
            return Err(AppError::Config(format!(
                "Workspace directory does not exist: {:?}",
                config.workspace
            )));
        }

        let config_path = config
            .config_file
            .clone()
            .unwrap_or_else(|| config.state_dir().join("config.yaml"));

        if config_path.exists() {
            config = config.merge_yaml(&config_path)?;
        }

        // Environment variables override YAML config
        config.apply_env(|key| std::env::var(key).ok())?;

        Ok(config)
    }

    /// Apply environment overrides read through `lookup`.
    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> AppResult<()> {
        if let Some(base_url) = lookup("BASTION_BASE_URL") {
            self.service.base_url = base_url;
        }

        if let Some(token) = lookup("BASTION_USER_TOKEN") {
            self.service.user_token = token;
        }

        if let Some(token) = lookup("BASTION_COMMON_TOKEN") {
            self.service
                .corpus_tokens
                .insert(COMMON_CORPUS.to_string(), token);
        }

        if let Some(corpus) = lookup("BASTION_DEFAULT_CORPUS") {
            self.retrieval.default_corpus = corpus;
        }

        if let Some(top_k) = lookup("BASTION_TOP_K") {
            self.retrieval.default_top_k = top_k.trim().parse().map_err(|_| {
                AppError::Config(format!("BASTION_TOP_K must be a positive integer: {}", top_k))
            })?;
        }

        if let Some(timeout) = lookup("BASTION_TIMEOUT") {
            self.service.timeout_secs = timeout.trim().parse().map_err(|_| {
                AppError::Config(format!("BASTION_TIMEOUT must be seconds: {}", timeout))
            })?;
        }

        self.log_level = lookup("RUST_LOG").or(self.log_level.take());

        if lookup("NO_COLOR").is_some() {
            self.no_color = true;
        }

        Ok(())
    }

    /// Merge YAML configuration file into this config.
    fn merge_yaml(&self, path: &Path) -> AppResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            AppError::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;

        let config_file: ConfigFile = serde_yaml::from_str(&contents).map_err(|e| {
            AppError::Config(format!("Failed to parse config file {:?}: {}", path, e))
        })?;

        Ok(self.merge(config_file))
    }

    fn merge(&self, config_file: ConfigFile) -> Self {
        let mut result = self.clone();

        if let Some(path) = config_file.workspace.and_then(|ws| ws.path) {
            result.workspace = PathBuf::from(path);
        }

        if let Some(logging) = config_file.logging {
            if let Some(level) = logging.level {
                result.log_level = Some(level);
            }
            if let Some(color) = logging.color {
                result.no_color = !color;
            }
            if let Some(format) = logging.format {
                result.log_format = format;
            }
        }

        if let Some(service) = config_file.service {
            result.service = service;
        }
        if let Some(retrieval) = config_file.retrieval {
            result.retrieval = retrieval;
        }
        if let Some(prompt) = config_file.prompt {
            result.prompt = prompt;
        }
        if let Some(dialogue) = config_file.dialogue {
            result.dialogue = dialogue;
        }
        if let Some(guard) = config_file.guard {
            result.guard = guard;
        }

        result
    }

    /// Apply CLI overrides to the configuration.
    ///
    /// Command-line flags take precedence over environment variables.
    #[allow(clippy::too_many_arguments)]
    pub fn with_overrides(
        mut self,
        workspace: Option<PathBuf>,
        config_file: Option<PathBuf>,
        base_url: Option<String>,
        log_level: Option<String>,
        log_format: Option<String>,
        verbose: bool,
        no_color: bool,
    ) -> Self {
        if let Some(workspace) = workspace {
            self.workspace = workspace;
        }

        if let Some(config_file) = config_file {
            self.config_file = Some(config_file);
        }

        if let Some(base_url) = base_url {
            self.service.base_url = base_url;
        }

        if let Some(log_level) = log_level {
            self.log_level = Some(log_level);
        }

        if let Some(log_format) = log_format {
            self.log_format = log_format;
        }

        if verbose {
            self.verbose = true;
            // Verbose mode implies debug logging
            if self.log_level.is_none() {
                self.log_level = Some("debug".to_string());
            }
        }

        if no_color {
            self.no_color = true;
        }

        self
    }

    /// Get the path to the .bastion directory.
    pub fn state_dir(&self) -> PathBuf {
        self.workspace.join(".bastion")
    }

    /// Ensure the .bastion directory exists.
    pub fn ensure_state_dir(&self) -> AppResult<()> {
        let state_dir = self.state_dir();
        if !state_dir.exists() {
            std::fs::create_dir_all(&state_dir).map_err(|e| {
                AppError::Config(format!("Failed to create .bastion directory: {}", e))
            })?;
        }
        Ok(())
    }

    /// Path of the JSONL audit log.
    pub fn audit_log_path(&self) -> PathBuf {
        self.state_dir().join("audit.jsonl")
    }

    /// Validate the configuration before any component is built.
    pub fn validate(&self) -> AppResult<()> {
        if self.service.base_url.trim().is_empty() {
            return Err(AppError::Config("service.baseUrl cannot be empty".to_string()));
        }

        if self.service.timeout_secs == 0 {
            return Err(AppError::Config(
                "service.timeoutSecs must be at least 1".to_string(),
            ));
        }

        if self.retrieval.default_top_k == 0 {
            return Err(AppError::Config(
                "retrieval.defaultTopK must be at least 1".to_string(),
            ));
        }

        if self.retrieval.default_corpus.trim().is_empty() {
            return Err(AppError::Config(
                "retrieval.defaultCorpus cannot be empty".to_string(),
            ));
        }

        if self.retrieval.max_snippet_chars < 2 {
            return Err(AppError::Config(
                "retrieval.maxSnippetChars must be at least 2".to_string(),
            ));
        }

        if self.guard.max_input_chars == 0 {
            return Err(AppError::Config(
                "guard.maxInputChars must be at least 1".to_string(),
            ));
        }

        if self.guard.max_output_chars == 0 {
            return Err(AppError::Config(
                "guard.maxOutputChars must be at least 1".to_string(),
            ));
        }

        let provider = self.dialogue.provider.to_lowercase();
        if !KNOWN_DIALOGUE_PROVIDERS.contains(&provider.as_str()) {
            return Err(AppError::Config(format!(
                "Unknown dialogue provider: {}. Supported: {}",
                self.dialogue.provider,
                KNOWN_DIALOGUE_PROVIDERS.join(", ")
            )));
        }

        Ok(())
    }
}

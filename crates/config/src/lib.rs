//! Configuration loading, validation, and management for LoopGuard.
//!
//! Loads configuration from `~/.loopguard/config.toml` with environment
//! variable overrides. Validates all settings at load time and again when
//! converting into the runtime `Budget` / `ConvergenceConfig` types.

use loopguard_budget::Budget;
use loopguard_convergence::ConvergenceConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// The root configuration structure.
///
/// Maps directly to `~/.loopguard/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Per-session resource limits
    #[serde(default)]
    pub budget: BudgetSection,

    /// Convergence detector tuning
    #[serde(default)]
    pub convergence: ConvergenceSection,

    /// Optional critic model used as the similarity oracle
    #[serde(default)]
    pub critic: CriticConfig,
}

/// `[budget]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetSection {
    #[serde(default = "default_max_tool_calls")]
    pub max_tool_calls: u32,
    #[serde(default = "default_max_depth")]
    pub max_depth: u32,
    #[serde(default = "default_time_budget_secs")]
    pub time_budget_secs: u64,
    #[serde(default = "default_max_input_tokens")]
    pub max_input_tokens: u64,
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u64,
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f64,
    #[serde(default = "default_max_search_calls")]
    pub max_search_calls: u32,
    #[serde(default = "default_max_qa_calls")]
    pub max_qa_calls: u32,
    #[serde(default = "default_max_entity_calls")]
    pub max_entity_calls: u32,
    #[serde(default = "default_convergence_threshold")]
    pub convergence_threshold: f64,
    #[serde(default = "default_convergence_window")]
    pub convergence_window: usize,
}

fn default_max_tool_calls() -> u32 {
    20
}
fn default_max_depth() -> u32 {
    5
}
fn default_time_budget_secs() -> u64 {
    300
}
fn default_max_input_tokens() -> u64 {
    100_000
}
fn default_max_output_tokens() -> u64 {
    20_000
}
fn default_min_confidence() -> f64 {
    0.3
}
fn default_max_search_calls() -> u32 {
    10
}
fn default_max_qa_calls() -> u32 {
    5
}
fn default_max_entity_calls() -> u32 {
    10
}
fn default_convergence_threshold() -> f64 {
    0.85
}
fn default_convergence_window() -> usize {
    3
}

impl Default for BudgetSection {
    fn default() -> Self {
        Self {
            max_tool_calls: default_max_tool_calls(),
            max_depth: default_max_depth(),
            time_budget_secs: default_time_budget_secs(),
            max_input_tokens: default_max_input_tokens(),
            max_output_tokens: default_max_output_tokens(),
            min_confidence: default_min_confidence(),
            max_search_calls: default_max_search_calls(),
            max_qa_calls: default_max_qa_calls(),
            max_entity_calls: default_max_entity_calls(),
            convergence_threshold: default_convergence_threshold(),
            convergence_window: default_convergence_window(),
        }
    }
}

/// `[convergence]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConvergenceSection {
    #[serde(default = "default_window_size")]
    pub window_size: usize,
    #[serde(default = "default_min_responses")]
    pub min_responses: usize,
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f64,
    #[serde(default = "default_convergence_ratio")]
    pub convergence_ratio: f64,
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f64,
    #[serde(default = "default_confidence_decay")]
    pub confidence_decay: f64,
    #[serde(default = "default_max_age_minutes")]
    pub max_age_minutes: u64,
    #[serde(default = "default_stability_window_secs")]
    pub stability_window_secs: u64,
    #[serde(default = "default_true")]
    pub use_critic_model: bool,
    #[serde(default = "default_critic_weight")]
    pub critic_weight: f64,
    #[serde(default = "default_critic_timeout_secs")]
    pub critic_timeout_secs: u64,
    #[serde(default = "default_critic_max_chars")]
    pub critic_max_chars: usize,
}

fn default_window_size() -> usize {
    3
}
fn default_min_responses() -> usize {
    2
}
fn default_similarity_threshold() -> f64 {
    0.7
}
fn default_convergence_ratio() -> f64 {
    0.6
}
fn default_confidence_decay() -> f64 {
    0.1
}
fn default_max_age_minutes() -> u64 {
    30
}
fn default_stability_window_secs() -> u64 {
    10
}
fn default_true() -> bool {
    true
}
fn default_critic_weight() -> f64 {
    0.7
}
fn default_critic_timeout_secs() -> u64 {
    10
}
fn default_critic_max_chars() -> usize {
    1000
}

impl Default for ConvergenceSection {
    fn default() -> Self {
        Self {
            window_size: default_window_size(),
            min_responses: default_min_responses(),
            similarity_threshold: default_similarity_threshold(),
            convergence_ratio: default_convergence_ratio(),
            min_confidence: default_min_confidence(),
            confidence_decay: default_confidence_decay(),
            max_age_minutes: default_max_age_minutes(),
            stability_window_secs: default_stability_window_secs(),
            use_critic_model: true,
            critic_weight: default_critic_weight(),
            critic_timeout_secs: default_critic_timeout_secs(),
            critic_max_chars: default_critic_max_chars(),
        }
    }
}

/// `[critic]` section: the LLM consulted as similarity oracle.
#[derive(Clone, Serialize, Deserialize)]
pub struct CriticConfig {
    /// Off by default; lexical similarity only
    #[serde(default)]
    pub enabled: bool,

    /// Provider name ("openrouter", "openai", "ollama", ...)
    #[serde(default = "default_critic_provider")]
    pub provider: String,

    #[serde(default = "default_critic_model")]
    pub model: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Override the provider's base URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    #[serde(default = "default_critic_max_tokens")]
    pub max_tokens: u32,
}

fn default_critic_provider() -> String {
    "openrouter".into()
}
fn default_critic_model() -> String {
    "openai/gpt-4o-mini".into()
}
fn default_critic_max_tokens() -> u32 {
    200
}

impl Default for CriticConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            provider: default_critic_provider(),
            model: default_critic_model(),
            api_key: None,
            api_url: None,
            max_tokens: default_critic_max_tokens(),
        }
    }
}

/// Redact a secret for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for CriticConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CriticConfig")
            .field("enabled", &self.enabled)
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .field("max_tokens", &self.max_tokens)
            .finish()
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.loopguard/config.toml).
    ///
    /// Also checks environment variables:
    /// - `LOOPGUARD_API_KEY` (highest priority), `OPENROUTER_API_KEY`,
    ///   `OPENAI_API_KEY` for the critic key
    /// - `LOOPGUARD_CRITIC_PROVIDER`, `LOOPGUARD_CRITIC_MODEL`
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::load_from(&Self::config_path())?;
        config.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        tracing::debug!(path = %path.display(), "Loaded config");
        Ok(config)
    }

    /// Apply environment overrides through `lookup` (normally `std::env::var`).
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if self.critic.api_key.is_none() {
            self.critic.api_key = lookup("LOOPGUARD_API_KEY")
                .or_else(|| lookup("OPENROUTER_API_KEY"))
                .or_else(|| lookup("OPENAI_API_KEY"));
        }

        if let Some(provider) = lookup("LOOPGUARD_CRITIC_PROVIDER") {
            self.critic.provider = provider;
        }

        if let Some(model) = lookup("LOOPGUARD_CRITIC_MODEL") {
            self.critic.model = model;
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".loopguard")
    }

    /// Path of the default config file.
    pub fn config_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.to_budget()?;
        self.to_convergence_config()?;

        if self.critic.enabled {
            if self.critic.provider.trim().is_empty() {
                return Err(ConfigError::ValidationError(
                    "critic.provider must not be empty".into(),
                ));
            }
            if self.critic.model.trim().is_empty() {
                return Err(ConfigError::ValidationError(
                    "critic.model must not be empty".into(),
                ));
            }
        }

        Ok(())
    }

    /// Convert the `[budget]` section into a validated [`Budget`].
    pub fn to_budget(&self) -> Result<Budget, ConfigError> {
        let b = &self.budget;
        let budget = Budget {
            max_tool_calls: b.max_tool_calls,
            max_depth: b.max_depth,
            time_budget: Duration::from_secs(b.time_budget_secs),
            max_input_tokens: b.max_input_tokens,
            max_output_tokens: b.max_output_tokens,
            min_confidence: b.min_confidence,
            max_search_calls: b.max_search_calls,
            max_qa_calls: b.max_qa_calls,
            max_entity_calls: b.max_entity_calls,
            convergence_threshold: b.convergence_threshold,
            convergence_window: b.convergence_window,
        };
        Ok(budget.validated()?)
    }

    /// Convert the `[convergence]` section into a validated [`ConvergenceConfig`].
    pub fn to_convergence_config(&self) -> Result<ConvergenceConfig, ConfigError> {
        let c = &self.convergence;
        let config = ConvergenceConfig {
            window_size: c.window_size,
            min_responses: c.min_responses,
            similarity_threshold: c.similarity_threshold,
            convergence_ratio: c.convergence_ratio,
            min_confidence: c.min_confidence,
            confidence_decay: c.confidence_decay,
            max_age: Duration::from_secs(c.max_age_minutes.saturating_mul(60)),
            stability_window: Duration::from_secs(c.stability_window_secs),
            use_critic_model: c.use_critic_model,
            critic_weight: c.critic_weight,
            critic_timeout: Duration::from_secs(c.critic_timeout_secs),
            critic_max_chars: c.critic_max_chars,
        };
        Ok(config.validated()?)
    }

    /// Check if a critic API key is available (from config or environment).
    pub fn has_critic_key(&self) -> bool {
        self.critic.api_key.is_some()
    }

    /// Generate a default config TOML string (for `onboard` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

impl From<loopguard_core::ValidationError> for ConfigError {
    fn from(e: loopguard_core::ValidationError) -> Self {
        Self::ValidationError(e.to_string())
    }
}

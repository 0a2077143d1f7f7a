//! Configuration system for Courier.
//!
//! Uses `figment` for layered configuration: defaults -> config file -> environment -> overrides.
//! Configuration is loaded from the user config directory (`config.toml`) and/or
//! `.courier/config.toml` in the workspace directory.

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;
use crate::skills::DeclarativeSkillConfig;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CourierConfig {
    #[serde(default)]
    pub router: RouterConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    /// Skills declared in configuration rather than compiled in.
    #[serde(default)]
    pub skills: Vec<DeclarativeSkillConfig>,
}

impl CourierConfig {
    /// Reject settings that load but cannot work.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let fallback = &self.router.fallback;
        if fallback.max_command_len == 0 {
            return Err(ConfigError::Invalid {
                message: "router.fallback.max_command_len must be greater than zero".into(),
            });
        }
        if fallback.enabled && fallback.timeout_ms == 0 {
            return Err(ConfigError::Invalid {
                message: "router.fallback.timeout_ms must be greater than zero".into(),
            });
        }
        for (i, skill) in self.skills.iter().enumerate() {
            if self.skills[..i].iter().any(|s| s.name == skill.name) {
                return Err(ConfigError::Invalid {
                    message: format!("skill '{}' is declared more than once", skill.name),
                });
            }
        }
        Ok(())
    }
}

/// Router behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterConfig {
    /// Fail `Router::start()` when a rule is shadowed by an earlier one,
    /// instead of only logging it.
    #[serde(default)]
    pub strict_rule_order: bool,
    /// Conversations whose pronoun state is kept before the least recently
    /// active one is dropped (default: 1024).
    #[serde(default = "default_max_conversations")]
    pub max_conversations: usize,
    #[serde(default)]
    pub cache: RouteCacheConfig,
    #[serde(default)]
    pub fallback: FallbackConfig,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            strict_rule_order: false,
            max_conversations: default_max_conversations(),
            cache: RouteCacheConfig::default(),
            fallback: FallbackConfig::default(),
        }
    }
}

fn default_max_conversations() -> usize {
    crate::router::pronouns::DEFAULT_MAX_CONVERSATIONS
}

/// Route cache sizing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteCacheConfig {
    /// Entry lifetime in seconds (default: 300).
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
    /// Maximum entries before the oldest insert is evicted (default: 500).
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
}

fn default_ttl_secs() -> u64 {
    300
}
fn default_max_entries() -> usize {
    500
}

impl Default for RouteCacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_ttl_secs(),
            max_entries: default_max_entries(),
        }
    }
}

impl RouteCacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

/// Generative fallback router settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FallbackConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Completion deadline in milliseconds (default: 5000).
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Longest accepted command, in characters (default: 200).
    #[serde(default = "default_max_command_len")]
    pub max_command_len: usize,
    /// Messages with more words than this skip the fallback (default: 40).
    #[serde(default = "default_max_message_words")]
    pub max_message_words: usize,
}

fn default_true() -> bool {
    true
}
fn default_timeout_ms() -> u64 {
    5000
}
fn default_max_command_len() -> usize {
    200
}
fn default_max_message_words() -> usize {
    40
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            timeout_ms: default_timeout_ms(),
            max_command_len: default_max_command_len(),
            max_message_words: default_max_message_words(),
        }
    }
}

impl FallbackConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Completion service settings for the OpenAI-compatible provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Base URL of the chat-completions API.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    /// Name of the environment variable holding the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default)]
    pub temperature: f32,
    /// Per-request HTTP timeout in milliseconds (default: 30000).
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}
fn default_max_tokens() -> u32 {
    64
}
fn default_request_timeout_ms() -> u64 {
    30_000
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            model: default_model(),
            api_key_env: default_api_key_env(),
            max_tokens: default_max_tokens(),
            temperature: 0.0,
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

impl LlmConfig {
    /// Whether the provider points at a local endpoint that needs no key.
    pub fn is_local(&self) -> bool {
        self.base_url.contains("localhost") || self.base_url.contains("127.0.0.1")
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

fn user_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("dev", "courier", "courier")
        .map(|dirs| dirs.config_dir().join("config.toml"))
}

/// Load configuration from layered sources.
///
/// Priority (highest to lowest):
/// 1. Explicit overrides (passed as argument)
/// 2. Environment variables (prefixed with `COURIER_`)
/// 3. Workspace-local config (`.courier/config.toml`)
/// 4. User config (`~/.config/courier/config.toml`)
/// 5. Built-in defaults
pub fn load_config(
    workspace: Option<&Path>,
    overrides: Option<&CourierConfig>,
) -> Result<CourierConfig, ConfigError> {
    let mut figment = Figment::from(Serialized::defaults(CourierConfig::default()));

    if let Some(user_config) = user_config_path()
        && user_config.exists()
    {
        figment = figment.merge(Toml::file(&user_config));
    }

    if let Some(ws) = workspace {
        let ws_config = ws.join(".courier").join("config.toml");
        if ws_config.exists() {
            figment = figment.merge(Toml::file(&ws_config));
        }
    }

    // COURIER_ROUTER__FALLBACK__TIMEOUT_MS, COURIER_LLM__MODEL, ...
    figment = figment.merge(Env::prefixed("COURIER_").split("__"));

    if let Some(overrides) = overrides {
        figment = figment.merge(Serialized::defaults(overrides));
    }

    let config: CourierConfig = figment.extract()?;
    config.validate()?;
    Ok(config)
}

/// Load configuration from a single explicit file, layered over defaults.
pub fn load_config_file(path: &Path) -> Result<CourierConfig, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::Invalid {
            message: format!("config file not found: {}", path.display()),
        });
    }
    let config: CourierConfig = Figment::from(Serialized::defaults(CourierConfig::default()))
        .merge(Toml::file(path))
        .extract()?;
    config.validate()?;
    Ok(config)
}

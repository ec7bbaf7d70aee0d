use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

pub const DEFAULT_PORT: u16 = 8787;
pub const DEFAULT_BIND: &str = "127.0.0.1";
pub const DEFAULT_MODEL: &str = "google/gemini-2.5-flash";
pub const DEFAULT_UPSTREAM_URL: &str = "https://ai.gateway.lovable.dev";
pub const DEFAULT_CHAT_PATH: &str = "/v1/chat/completions";
pub const MAX_REVIEW_LIST: usize = 200; // hard cap for GET /reviews
pub const API_KEY_ENV: &str = "SIMPLIFICATOR_API_KEY";

/// Top-level config (simplificator.toml + SIMPLIFICATOR_* env overrides).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SimplificatorConfig {
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub review: ReviewConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            bind: DEFAULT_BIND.to_string(),
        }
    }
}

/// The OpenAI-compatible chat-completion gateway both chat and scoring talk to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    /// Bearer token. When absent the gateway answers chat from the scripted
    /// advisor and refuses reviews.
    pub api_key: Option<String>,
    #[serde(default = "default_upstream_url")]
    pub base_url: String,
    #[serde(default = "default_chat_path")]
    pub chat_path: String,
    #[serde(default = "default_model")]
    pub model: String,
    /// Whole-request timeout; a stream cut by it surfaces as a transport error.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_upstream_url(),
            chat_path: default_chat_path(),
            model: default_model(),
            timeout_secs: default_timeout_secs(),
            max_tokens: default_max_tokens(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

/// Limits applied when sanitizing a verdict returned by the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewConfig {
    #[serde(default = "default_max_title_chars")]
    pub max_title_chars: usize,
    #[serde(default = "default_max_suggestion_chars")]
    pub max_suggestion_chars: usize,
    #[serde(default = "default_suggestion_count")]
    pub suggestion_count: usize,
    /// Submissions longer than these (in chars, after trimming) are rejected.
    #[serde(default = "default_max_code_chars")]
    pub max_code_chars: usize,
    #[serde(default = "default_max_description_chars")]
    pub max_description_chars: usize,
}

impl Default for ReviewConfig {
    fn default() -> Self {
        Self {
            max_title_chars: default_max_title_chars(),
            max_suggestion_chars: default_max_suggestion_chars(),
            suggestion_count: default_suggestion_count(),
            max_code_chars: default_max_code_chars(),
            max_description_chars: default_max_description_chars(),
        }
    }
}

fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_bind() -> String {
    DEFAULT_BIND.to_string()
}
fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}
fn default_upstream_url() -> String {
    DEFAULT_UPSTREAM_URL.to_string()
}
fn default_chat_path() -> String {
    DEFAULT_CHAT_PATH.to_string()
}
fn default_timeout_secs() -> u64 {
    120
}
fn default_max_tokens() -> u32 {
    2048
}
fn default_max_title_chars() -> usize {
    100
}
fn default_max_suggestion_chars() -> usize {
    300
}
fn default_suggestion_count() -> usize {
    3
}
fn default_max_code_chars() -> usize {
    5000
}
fn default_max_description_chars() -> usize {
    1000
}
fn default_db_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.simplificator/simplificator.db", home)
}

impl SimplificatorConfig {
    /// Load config from a TOML file with SIMPLIFICATOR_* env var overrides.
    ///
    /// Nested keys use a double underscore, e.g.
    /// `SIMPLIFICATOR_UPSTREAM__API_KEY`. The flat `SIMPLIFICATOR_API_KEY`
    /// is honoured when no key was configured any other way.
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        let figment = Figment::new()
            .merge(Toml::file(&path))
            .merge(Env::prefixed("SIMPLIFICATOR_").split("__"));

        let mut config = Self::from_figment(figment)?;
        if config.upstream.api_key.is_none() {
            config.upstream.api_key = std::env::var(API_KEY_ENV).ok().filter(|k| !k.is_empty());
        }
        Ok(config)
    }

    pub fn from_figment(figment: Figment) -> crate::error::Result<Self> {
        figment
            .extract()
            .map_err(|e| crate::error::SimplificatorError::Config(e.to_string()))
    }

    /// Full URL of the chat-completions endpoint.
    pub fn chat_url(&self) -> String {
        format!(
            "{}{}",
            self.upstream.base_url.trim_end_matches('/'),
            self.upstream.chat_path
        )
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.simplificator/simplificator.toml", home)
}

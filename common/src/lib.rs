/*!
common/src/lib.rs

Shared configuration types and helpers for FinBrief.

This file provides:
- Config data structures (deserialized from TOML, every section has defaults)
- An async loader merging a default file with an optional override file
- Environment lookups for credentials, which never live in the TOML files
*/

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

/// Fatal configuration problems, detected before any network I/O happens.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("required environment variable `{0}` is not set")]
    MissingEnv(String),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// One RSS/Atom search endpoint queried by the collector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedSourceConfig {
    /// Label stored on every collected item (e.g. "Google News")
    pub label: String,
    /// Endpoint without query string
    pub endpoint: String,
    /// Search terms, URL-encoded into the `q` parameter
    pub query: String,
    /// Extra query parameters appended after `q`
    #[serde(default)]
    pub params: BTreeMap<String, String>,
}

impl FeedSourceConfig {
    pub fn google_news() -> Self {
        let mut params = BTreeMap::new();
        params.insert("hl".to_string(), "ko".to_string());
        params.insert("gl".to_string(), "KR".to_string());
        params.insert("ceid".to_string(), "KR:ko".to_string());
        Self {
            label: "Google News".to_string(),
            endpoint: "https://news.google.com/rss/search".to_string(),
            query: "재테크 OR 주식 OR 투자 when:1d".to_string(),
            params,
        }
    }
}

/// Collector section
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectorConfig {
    pub sources: Vec<FeedSourceConfig>,
    /// Items kept per source, in feed order
    pub max_items: usize,
    /// Titles containing any of these substrings are dropped
    pub block_keywords: Vec<String>,
    pub timeout_seconds: u64,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            sources: vec![FeedSourceConfig::google_news()],
            max_items: 20,
            block_keywords: ["이벤트", "할인", "쿠폰", "광고", "[PR]", "협찬", "제공:"]
                .iter()
                .map(|k| k.to_string())
                .collect(),
            timeout_seconds: 30,
        }
    }
}

/// Text-generation backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmAdapter {
    Gemini,
    /// Any OpenAI-compatible chat completions endpoint
    #[serde(rename = "openai")]
    OpenAi,
}

/// What the analyzer does when the model's answer is not the expected JSON.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParseFailurePolicy {
    /// Substitute the fixed placeholder analysis and flag the run as degraded
    Placeholder,
    /// Fail the run
    Abort,
}

/// LLM section
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub adapter: LlmAdapter,
    /// Overrides the adapter's default endpoint
    pub api_url: Option<String>,
    pub api_key_env: String,
    pub model: String,
    pub timeout_seconds: u64,
    pub max_tokens: usize,
    pub temperature: f32,
    pub on_parse_failure: ParseFailurePolicy,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            adapter: LlmAdapter::Gemini,
            api_url: None,
            api_key_env: "GEMINI_API_KEY".to_string(),
            model: "gemini-2.5-flash".to_string(),
            timeout_seconds: 60,
            max_tokens: 2048,
            temperature: 0.7,
            on_parse_failure: ParseFailurePolicy::Placeholder,
        }
    }
}

impl LlmConfig {
    pub fn api_key(&self) -> Result<String, ConfigError> {
        require_env(&self.api_key_env)
    }

    pub fn endpoint(&self) -> String {
        match (&self.api_url, self.adapter) {
            (Some(url), _) => url.clone(),
            (None, LlmAdapter::Gemini) => "https://generativelanguage.googleapis.com".to_string(),
            (None, LlmAdapter::OpenAi) => "https://api.openai.com/v1/chat/completions".to_string(),
        }
    }
}

/// Transactional email section
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MailConfig {
    pub api_url: String,
    pub api_key_env: String,
    pub from_env: String,
    /// Environment variable holding the public site URL used in unsubscribe links
    pub base_url_env: String,
    pub default_base_url: String,
    pub max_concurrent_sends: usize,
    pub timeout_seconds: u64,
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.resend.com".to_string(),
            api_key_env: "RESEND_API_KEY".to_string(),
            from_env: "RESEND_FROM_EMAIL".to_string(),
            base_url_env: "FINBRIEF_BASE_URL".to_string(),
            default_base_url: "https://finbrief.vercel.app".to_string(),
            max_concurrent_sends: 10,
            timeout_seconds: 30,
        }
    }
}

/// Credentials needed to send mail
#[derive(Debug, Clone)]
pub struct MailCredentials {
    pub api_key: String,
    pub from: String,
    pub base_url: String,
}

impl MailConfig {
    pub fn credentials(&self) -> Result<MailCredentials, ConfigError> {
        self.credentials_from(|name| std::env::var(name).ok())
    }

    pub fn credentials_from<F>(&self, lookup: F) -> Result<MailCredentials, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_key = require_from(&self.api_key_env, &lookup)?;
        let from = require_from(&self.from_env, &lookup)?;
        let base_url = lookup(&self.base_url_env)
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| self.default_base_url.clone());
        Ok(MailCredentials {
            api_key,
            from,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

/// Where subscriber rows live
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Sqlite,
    Supabase,
}

/// Subscriber store section
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SubscriberStoreConfig {
    pub backend: StoreBackend,
    pub database_url_env: String,
    pub default_database_url: String,
    pub supabase_url_env: String,
    pub supabase_key_env: String,
    pub timeout_seconds: u64,
}

impl Default for SubscriberStoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Sqlite,
            database_url_env: "DATABASE_URL".to_string(),
            default_database_url: "sqlite://data/finbrief.db".to_string(),
            supabase_url_env: "SUPABASE_URL".to_string(),
            supabase_key_env: "SUPABASE_SERVICE_ROLE_KEY".to_string(),
            timeout_seconds: 30,
        }
    }
}

/// Resolved connection details for the configured backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreConnection {
    Sqlite { url: String },
    Supabase { url: String, service_key: String },
}

impl SubscriberStoreConfig {
    pub fn connection(&self) -> Result<StoreConnection, ConfigError> {
        self.connection_from(|name| std::env::var(name).ok())
    }

    pub fn connection_from<F>(&self, lookup: F) -> Result<StoreConnection, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        match self.backend {
            StoreBackend::Sqlite => Ok(StoreConnection::Sqlite {
                url: lookup(&self.database_url_env)
                    .unwrap_or_else(|| self.default_database_url.clone()),
            }),
            StoreBackend::Supabase => Ok(StoreConnection::Supabase {
                url: require_from(&self.supabase_url_env, &lookup)?,
                service_key: require_from(&self.supabase_key_env, &lookup)?,
            }),
        }
    }
}

/// Briefing archive section
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiveConfig {
    /// Directory holding one `YYYY-MM-DD.json` per run
    pub dir: String,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            dir: "data".to_string(),
        }
    }
}

/// HTTP server section
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub address: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1".to_string(),
            port: 8000,
        }
    }
}

/// Top-level application configuration (deserialized from finbrief.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub collector: CollectorConfig,
    pub llm: LlmConfig,
    pub mail: MailConfig,
    pub subscribers: SubscriberStoreConfig,
    pub archive: ArchiveConfig,
    pub server: ServerConfig,
}

impl Config {
    /// Load configuration with an optional default file and an optional override file.
    /// If both are present, they are merged (override takes precedence).
    pub async fn load_with_defaults(default_path: Option<&Path>, override_path: Option<&Path>) -> Result<Self> {
        let mut config_value = toml::Value::Table(toml::map::Map::new());

        for path in [default_path, override_path].into_iter().flatten() {
            if path.exists() {
                let data = tokio::fs::read_to_string(path)
                    .await
                    .with_context(|| format!("Failed to read config: {}", path.display()))?;
                let val: toml::Value = toml::from_str(&data)
                    .with_context(|| format!("Failed to parse configuration: {}", path.display()))?;
                merge_toml(&mut config_value, val);
            }
        }

        let cfg: Config = config_value.try_into().context("Failed to parse merged configuration")?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Reject values that would make a run meaningless.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.collector.sources.is_empty() {
            return Err(ConfigError::Invalid("collector.sources must not be empty".into()));
        }
        if self.collector.max_items == 0 {
            return Err(ConfigError::Invalid("collector.max_items must be at least 1".into()));
        }
        if self.mail.max_concurrent_sends == 0 {
            return Err(ConfigError::Invalid("mail.max_concurrent_sends must be at least 1".into()));
        }
        if self.llm.model.trim().is_empty() {
            return Err(ConfigError::Invalid("llm.model must not be empty".into()));
        }
        Ok(())
    }
}

fn merge_toml(a: &mut toml::Value, b: toml::Value) {
    match (a, b) {
        (toml::Value::Table(a_map), toml::Value::Table(b_map)) => {
            for (k, v) in b_map {
                if let Some(a_val) = a_map.get_mut(&k) {
                    merge_toml(a_val, v);
                } else {
                    a_map.insert(k, v);
                }
            }
        }
        (a_val, b_val) => *a_val = b_val,
    }
}

/// Read a required environment variable. Empty values count as missing.
pub fn require_env(name: &str) -> Result<String, ConfigError> {
    require_from(name, &|n: &str| std::env::var(n).ok())
}

fn require_from<F>(name: &str, lookup: &F) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(name)
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| ConfigError::MissingEnv(name.to_string()))
}

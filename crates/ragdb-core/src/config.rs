//! Layered configuration loader and typed settings.
//!
//! Uses Figment to merge `config.toml` + `config.<env>.toml` + `APP_*` env vars
//! (`__` separates nesting, e.g. `APP_STORE__URI`). Every section has serde
//! defaults so an empty environment still yields a usable, if unconfigured,
//! service.

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Error, Result};

pub const DEFAULT_ALPHA: f32 = 0.5;
pub const DEFAULT_CANDIDATES: usize = 50;
pub const DEFAULT_MIN_HITS: usize = 5;

pub struct Config {
    figment: Figment,
}

impl Config {
    pub fn load() -> Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());

        let mut figment = Figment::from(Serialized::defaults(Settings::default()))
            .merge(Toml::file("config.toml"));
        match env_name.as_str() {
            "dev" | "development" => figment = figment.merge(Toml::file("config.dev.toml")),
            "prod" | "production" => figment = figment.merge(Toml::file("config.prod.toml")),
            "test" | "testing" => figment = figment.merge(Toml::file("config.test.toml")),
            _ => {}
        }
        figment = figment.merge(Env::prefixed("APP_").split("__"));
        Ok(Self { figment })
    }

    pub fn from_figment(figment: Figment) -> Self {
        Self { figment }
    }

    pub fn get<T>(&self, key: &str) -> Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        self.figment
            .extract_inner(key)
            .map_err(|e| Error::Configuration(format!("Failed to get '{key}': {e}")))
    }

    pub fn settings(&self) -> Result<Settings> {
        self.figment
            .extract()
            .map_err(|e| Error::Configuration(e.to_string()))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub server: ServerSettings,
    pub store: StoreSettings,
    pub embedding: EmbeddingSettings,
    pub reranker: RerankerSettings,
    pub generator: GeneratorSettings,
    pub retrieval: RetrievalSettings,
    pub cache: CacheSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub bind: String,
    pub request_timeout_secs: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self { bind: "127.0.0.1:8090".to_string(), request_timeout_secs: 30 }
    }
}

impl ServerSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }
}

/// Location of the vector table and the lexical index. An empty `uri` means
/// retrieval is not configured.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
    pub uri: String,
    pub text_index_dir: Option<String>,
    pub table: String,
    pub allow_migrate: bool,
    pub ann_min_rows: usize,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            uri: String::new(),
            text_index_dir: None,
            table: "documents".to_string(),
            allow_migrate: true,
            ann_min_rows: 256,
        }
    }
}

impl StoreSettings {
    pub fn is_configured(&self) -> bool {
        !self.uri.trim().is_empty()
    }

    pub fn uri_path(&self) -> PathBuf {
        expand_path(&self.uri)
    }

    /// Lexical index directory; defaults to a sibling of the vector store.
    pub fn text_index_path(&self) -> PathBuf {
        match &self.text_index_dir {
            Some(dir) if !dir.trim().is_empty() => expand_path(dir),
            _ => self.uri_path().join("lexical"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    pub provider: String,
    pub endpoint: String,
    pub model: String,
    pub api_key: Option<String>,
    pub api_key_env: Option<String>,
    pub dimension: Option<usize>,
    pub timeout_secs: u64,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            provider: String::new(),
            endpoint: String::new(),
            model: String::new(),
            api_key: None,
            api_key_env: None,
            dimension: None,
            timeout_secs: 30,
        }
    }
}

impl EmbeddingSettings {
    pub fn is_configured(&self) -> bool {
        !self.endpoint.trim().is_empty() || self.provider.eq_ignore_ascii_case("hash")
    }

    pub fn resolved_api_key(&self) -> Option<String> {
        resolve_secret(self.api_key.as_deref(), self.api_key_env.as_deref())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RerankerSettings {
    pub endpoint: String,
    pub model: String,
    pub api_key: Option<String>,
    pub timeout_ms: u64,
    pub min_candidates: usize,
}

impl Default for RerankerSettings {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            model: String::new(),
            api_key: None,
            timeout_ms: 3000,
            min_candidates: 16,
        }
    }
}

impl RerankerSettings {
    pub fn is_configured(&self) -> bool {
        !self.endpoint.trim().is_empty()
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms.max(1))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorSettings {
    pub endpoint: String,
    pub model: String,
    pub api_key: Option<String>,
    pub api_key_env: Option<String>,
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for GeneratorSettings {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            model: "deepseek-ai/DeepSeek-R1".to_string(),
            api_key: None,
            api_key_env: None,
            timeout_secs: 30,
            max_retries: 3,
            max_tokens: 1024,
            temperature: 0.7,
        }
    }
}

impl GeneratorSettings {
    pub fn is_configured(&self) -> bool {
        !self.endpoint.trim().is_empty()
    }

    pub fn resolved_api_key(&self) -> Option<String> {
        resolve_secret(self.api_key.as_deref(), self.api_key_env.as_deref())
    }
}

/// Fusion and fallback tuning. Out-of-range values fall back to defaults
/// through the accessor methods rather than failing the load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalSettings {
    pub alpha: Option<f32>,
    pub candidates: usize,
    pub min_hits: usize,
    pub result_limit: usize,
    pub pipeline_version: String,
    pub hyde: bool,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            alpha: None,
            candidates: DEFAULT_CANDIDATES,
            min_hits: DEFAULT_MIN_HITS,
            result_limit: 5,
            pipeline_version: "hybrid-v1".to_string(),
            hyde: true,
        }
    }
}

impl RetrievalSettings {
    pub fn alpha(&self) -> f32 {
        clamp_alpha(self.alpha)
    }

    pub fn candidate_limit(&self) -> usize {
        if self.candidates == 0 { DEFAULT_CANDIDATES } else { self.candidates }
    }

    pub fn min_hits(&self) -> usize {
        if self.min_hits == 0 { DEFAULT_MIN_HITS } else { self.min_hits }
    }
}

/// Cache tiers and the advisory lock. An empty `url` keeps both in-process;
/// a `redis://` URL shares them across replicas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    pub enabled: bool,
    pub url: String,
    pub timeout_ms: u64,
    pub max_entries: u64,
    pub retrieval_ttl_secs: u64,
    pub rerank_ttl_secs: u64,
    pub answer_ttl_secs: u64,
    pub lock_ttl_secs: u64,
    pub lock_poll_attempts: u32,
    pub lock_poll_interval_ms: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            url: String::new(),
            timeout_ms: 500,
            max_entries: 10_000,
            retrieval_ttl_secs: 20 * 60,
            rerank_ttl_secs: 60 * 60,
            answer_ttl_secs: 10 * 60,
            lock_ttl_secs: 5,
            lock_poll_attempts: 50,
            lock_poll_interval_ms: 100,
        }
    }
}

impl CacheSettings {
    pub fn shared_url(&self) -> Option<&str> {
        Some(self.url.trim()).filter(|u| !u.is_empty())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms.max(1))
    }
}

/// `None`, NaN and values outside `[0, 1]` all mean "use the default".
pub fn clamp_alpha(alpha: Option<f32>) -> f32 {
    match alpha {
        Some(a) if (0.0..=1.0).contains(&a) => a,
        _ => DEFAULT_ALPHA,
    }
}

fn resolve_secret(inline: Option<&str>, env_name: Option<&str>) -> Option<String> {
    if let Some(v) = inline.map(str::trim).filter(|v| !v.is_empty()) {
        return Some(v.to_string());
    }
    env_name
        .and_then(|name| env::var(name).ok())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Expand a user-provided path string:
/// - Expands leading '~' to the user's home directory
/// - Expands ${VAR} and $VAR environment variables
/// - Returns a PathBuf without attempting to canonicalize
pub fn expand_path<S: AsRef<str>>(input: S) -> PathBuf {
    let s = input.as_ref();
    let expanded_env = shellexpand::env(s).unwrap_or(std::borrow::Cow::Borrowed(s));
    let expanded = shellexpand::tilde(&expanded_env);
    PathBuf::from(expanded.as_ref())
}

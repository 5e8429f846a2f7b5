//! Agent configuration with builder pattern and environment variable support.
//!
//! Configuration is resolved in order: explicit values → environment variables → defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::AgentError;

/// Default provider.
pub const DEFAULT_PROVIDER: &str = "groq";
/// Default chat model for both agents.
pub const DEFAULT_MODEL: &str = "llama-3.1-8b-instant";
/// Default max tokens for the single-shot agent.
const DEFAULT_MAX_TOKENS: u32 = 1500;
/// Default max tokens per reasoning turn.
const DEFAULT_REASONING_MAX_TOKENS: u32 = 2000;
/// Default sampling temperature.
const DEFAULT_TEMPERATURE: f32 = 0.1;
/// Default per-request timeout in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 120;
/// Default whole-session deadline for the reasoning agent.
const DEFAULT_SESSION_TIMEOUT_SECS: u64 = 300;
/// Default reasoning loop bound.
const DEFAULT_MAX_ITERATIONS: usize = 6;
/// Default cache TTL (24 h).
const DEFAULT_CACHE_TTL_SECS: u64 = 86_400;
/// Default in-memory context cache capacity.
const DEFAULT_LRU_CAPACITY: usize = 256;
/// Default cache directory, relative to the working directory.
const DEFAULT_CACHE_DIR: &str = ".pvkg";

/// File name of the single-shot answer cache.
pub const ANSWER_CACHE_FILE: &str = "answer_cache.json";
/// File name of the reasoning session cache.
pub const REASONING_CACHE_FILE: &str = "reasoning_cache.json";

fn env_parse<T: std::str::FromStr>(names: &[&str]) -> Option<T> {
    names
        .iter()
        .find_map(|name| std::env::var(name).ok().and_then(|v| v.trim().parse().ok()))
}

fn env_string(names: &[&str]) -> Option<String> {
    names
        .iter()
        .find_map(|name| std::env::var(name).ok().filter(|v| !v.trim().is_empty()))
}

/// Where and for how long results are cached.
///
/// Needs no credentials, so cache administration works offline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheSettings {
    /// Directory holding the cache files.
    pub dir: PathBuf,
    /// Time to live of persisted entries.
    pub ttl: Duration,
    /// Capacity of the in-memory context cache.
    pub lru_capacity: usize,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            dir: PathBuf::from(DEFAULT_CACHE_DIR),
            ttl: Duration::from_secs(DEFAULT_CACHE_TTL_SECS),
            lru_capacity: DEFAULT_LRU_CAPACITY,
        }
    }
}

impl CacheSettings {
    /// Defaults overlaid with `PVKG_CACHE_DIR`, `PVKG_CACHE_TTL_SECONDS` /
    /// `CACHE_TTL_SECONDS` and `PVKG_LRU_CAPACITY` / `LRU_MAXSIZE`.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            dir: env_string(&["PVKG_CACHE_DIR"]).map_or(defaults.dir, PathBuf::from),
            ttl: env_parse(&["PVKG_CACHE_TTL_SECONDS", "CACHE_TTL_SECONDS"])
                .map_or(defaults.ttl, Duration::from_secs),
            lru_capacity: env_parse(&["PVKG_LRU_CAPACITY", "LRU_MAXSIZE"])
                .unwrap_or(defaults.lru_capacity),
        }
    }

    /// Same settings rooted in another directory.
    #[must_use]
    pub fn with_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dir = dir.into();
        self
    }

    /// Path of the answer cache file.
    #[must_use]
    pub fn answer_path(&self) -> PathBuf {
        self.dir.join(ANSWER_CACHE_FILE)
    }

    /// Path of the reasoning session cache file.
    #[must_use]
    pub fn reasoning_path(&self) -> PathBuf {
        self.dir.join(REASONING_CACHE_FILE)
    }
}

/// Configuration for the agent system.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// LLM provider name (`"groq"` or `"openai"`).
    pub provider: String,
    /// API key for the provider. Empty when built without credentials.
    pub api_key: String,
    /// Optional base URL override (for proxies or compatible APIs).
    pub base_url: Option<String>,
    /// Model for the single-shot agent.
    pub model: String,
    /// Model for the reasoning agent.
    pub reasoning_model: String,
    /// Maximum tokens for single-shot answers.
    pub max_tokens: u32,
    /// Maximum tokens per reasoning turn.
    pub reasoning_max_tokens: u32,
    /// Sampling temperature.
    pub temperature: f32,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Wall-clock bound on a whole reasoning session.
    pub session_timeout: Duration,
    /// Maximum model calls per reasoning session.
    pub max_iterations: usize,
    /// Directory containing prompt template files.
    ///
    /// Missing files fall back to the compiled-in prompts individually.
    pub prompt_dir: Option<PathBuf>,
    /// Emit a fact-base overview when no category matches a query.
    pub overview_fallback: bool,
    /// Cache location and limits.
    pub cache: CacheSettings,
}

impl AgentConfig {
    /// Creates a new builder for `AgentConfig`.
    #[must_use]
    pub fn builder() -> AgentConfigBuilder {
        AgentConfigBuilder::default()
    }

    /// Creates configuration from environment variables with defaults.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::ApiKeyMissing`] if no API key is found.
    pub fn from_env() -> Result<Self, AgentError> {
        Self::builder().from_env().build()
    }

    /// Returns true when an API key is present.
    #[must_use]
    pub fn has_credentials(&self) -> bool {
        !self.api_key.trim().is_empty()
    }
}

/// Builder for [`AgentConfig`].
#[derive(Debug, Clone, Default)]
pub struct AgentConfigBuilder {
    provider: Option<String>,
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    reasoning_model: Option<String>,
    max_tokens: Option<u32>,
    reasoning_max_tokens: Option<u32>,
    temperature: Option<f32>,
    timeout: Option<Duration>,
    session_timeout: Option<Duration>,
    max_iterations: Option<usize>,
    prompt_dir: Option<PathBuf>,
    overview_fallback: Option<bool>,
    cache: Option<CacheSettings>,
}

impl AgentConfigBuilder {
    /// Populates unset fields from environment variables.
    #[must_use]
    pub fn from_env(mut self) -> Self {
        if self.provider.is_none() {
            self.provider = env_string(&["PVKG_PROVIDER"]);
        }
        if self.api_key.is_none() {
            self.api_key = env_string(&["PVKG_API_KEY", "GROQ_API_KEY", "OPENAI_API_KEY"]);
        }
        if self.base_url.is_none() {
            self.base_url = env_string(&["PVKG_BASE_URL", "OPENAI_BASE_URL"]);
        }
        if self.model.is_none() {
            self.model = env_string(&["PVKG_MODEL"]);
        }
        if self.reasoning_model.is_none() {
            self.reasoning_model = env_string(&["PVKG_REASONING_MODEL"]);
        }
        if self.max_iterations.is_none() {
            self.max_iterations = env_parse(&["PVKG_MAX_ITERATIONS"]);
        }
        if self.prompt_dir.is_none() {
            self.prompt_dir = env_string(&["PVKG_PROMPT_DIR"]).map(PathBuf::from);
        }
        if self.overview_fallback.is_none() {
            self.overview_fallback = env_parse(&["PVKG_OVERVIEW_FALLBACK"]);
        }
        if self.cache.is_none() {
            self.cache = Some(CacheSettings::from_env());
        }
        self
    }

    /// Sets the LLM provider name.
    #[must_use]
    pub fn provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    /// Sets the API key.
    #[must_use]
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Sets the base URL override.
    #[must_use]
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Sets the single-shot model.
    #[must_use]
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Sets the reasoning model.
    #[must_use]
    pub fn reasoning_model(mut self, model: impl Into<String>) -> Self {
        self.reasoning_model = Some(model.into());
        self
    }

    /// Sets the single-shot max tokens.
    #[must_use]
    pub const fn max_tokens(mut self, n: u32) -> Self {
        self.max_tokens = Some(n);
        self
    }

    /// Sets the per-turn reasoning max tokens.
    #[must_use]
    pub const fn reasoning_max_tokens(mut self, n: u32) -> Self {
        self.reasoning_max_tokens = Some(n);
        self
    }

    /// Sets the sampling temperature.
    #[must_use]
    pub const fn temperature(mut self, t: f32) -> Self {
        self.temperature = Some(t);
        self
    }

    /// Sets the request timeout.
    #[must_use]
    pub const fn timeout(mut self, duration: Duration) -> Self {
        self.timeout = Some(duration);
        self
    }

    /// Sets the reasoning session deadline.
    #[must_use]
    pub const fn session_timeout(mut self, duration: Duration) -> Self {
        self.session_timeout = Some(duration);
        self
    }

    /// Sets the maximum reasoning iterations.
    #[must_use]
    pub const fn max_iterations(mut self, n: usize) -> Self {
        self.max_iterations = Some(n);
        self
    }

    /// Sets the prompt template directory.
    #[must_use]
    pub fn prompt_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.prompt_dir = Some(dir.into());
        self
    }

    /// Enables or disables the overview fallback.
    #[must_use]
    pub const fn overview_fallback(mut self, enabled: bool) -> Self {
        self.overview_fallback = Some(enabled);
        self
    }

    /// Sets the cache settings.
    #[must_use]
    pub fn cache(mut self, cache: CacheSettings) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Roots the cache in `dir`, keeping the other cache settings.
    #[must_use]
    pub fn cache_dir(mut self, dir: &Path) -> Self {
        self.cache = Some(self.cache.unwrap_or_default().with_dir(dir));
        self
    }

    /// Builds the [`AgentConfig`].
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::ApiKeyMissing`] if no API key was set.
    pub fn build(self) -> Result<AgentConfig, AgentError> {
        if self.api_key.as_deref().is_none_or(|k| k.trim().is_empty()) {
            return Err(AgentError::ApiKeyMissing);
        }
        Ok(self.build_unauthenticated())
    }

    /// Builds without requiring an API key.
    ///
    /// Enough for cache administration and context inspection; creating a
    /// provider from the result fails with [`AgentError::ApiKeyMissing`].
    #[must_use]
    pub fn build_unauthenticated(self) -> AgentConfig {
        let model = self.model.unwrap_or_else(|| DEFAULT_MODEL.to_string());
        AgentConfig {
            provider: self.provider.unwrap_or_else(|| DEFAULT_PROVIDER.to_string()),
            api_key: self.api_key.unwrap_or_default(),
            base_url: self.base_url,
            reasoning_model: self.reasoning_model.unwrap_or_else(|| model.clone()),
            model,
            max_tokens: self.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            reasoning_max_tokens: self
                .reasoning_max_tokens
                .unwrap_or(DEFAULT_REASONING_MAX_TOKENS),
            temperature: self.temperature.unwrap_or(DEFAULT_TEMPERATURE),
            timeout: self
                .timeout
                .unwrap_or(Duration::from_secs(DEFAULT_TIMEOUT_SECS)),
            session_timeout: self
                .session_timeout
                .unwrap_or(Duration::from_secs(DEFAULT_SESSION_TIMEOUT_SECS)),
            max_iterations: self
                .max_iterations
                .unwrap_or(DEFAULT_MAX_ITERATIONS)
                .max(1),
            prompt_dir: self.prompt_dir,
            overview_fallback: self.overview_fallback.unwrap_or(false),
            cache: self.cache.unwrap_or_default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let config = AgentConfig::builder()
            .api_key("test-key")
            .build()
            .unwrap_or_else(|_| unreachable!());
        assert_eq!(config.provider, "groq");
        assert_eq!(config.model, DEFAULT_MODEL);
        assert_eq!(config.reasoning_model, DEFAULT_MODEL);
        assert_eq!(config.max_tokens, 1500);
        assert_eq!(config.reasoning_max_tokens, 2000);
        assert_eq!(config.max_iterations, 6);
        assert!(!config.overview_fallback);
        assert_eq!(config.cache.ttl, Duration::from_secs(86_400));
        assert_eq!(config.cache.lru_capacity, 256);
    }

    #[test]
    fn test_builder_missing_api_key() {
        assert!(matches!(
            AgentConfig::builder().build(),
            Err(AgentError::ApiKeyMissing)
        ));
        assert!(matches!(
            AgentConfig::builder().api_key("  ").build(),
            Err(AgentError::ApiKeyMissing)
        ));
    }

    #[test]
    fn test_unauthenticated_build() {
        let config = AgentConfig::builder().build_unauthenticated();
        assert!(!config.has_credentials());
    }

    #[test]
    fn test_builder_custom_values() {
        let config = AgentConfig::builder()
            .api_key("key")
            .provider("openai")
            .model("gpt-4o-mini")
            .max_iterations(0)
            .timeout(Duration::from_secs(30))
            .cache_dir(Path::new("/tmp/pvkg-cache"))
            .build()
            .unwrap_or_else(|_| unreachable!());
        assert_eq!(config.provider, "openai");
        assert_eq!(config.reasoning_model, "gpt-4o-mini");
        assert_eq!(config.max_iterations, 1);
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert_eq!(
            config.cache.answer_path(),
            PathBuf::from("/tmp/pvkg-cache/answer_cache.json")
        );
    }
}

//! Configuration management for the Grok MCP Server
//!
//! Resolves environment-style keys into an immutable settings record.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{ConfigError, GrokMcpError, Result};

/// Which live-search strategy the client uses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchMode {
    /// Native search first, simulated search when native fails
    Auto,
    /// Only the upstream's native live search
    Native,
    /// Only the JSON-prompted simulation
    Simulated,
}

impl FromStr for SearchMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(SearchMode::Auto),
            "native" => Ok(SearchMode::Native),
            "simulated" => Ok(SearchMode::Simulated),
            other => Err(format!(
                "expected one of auto, native, simulated (got '{}')",
                other
            )),
        }
    }
}

/// Configuration for the Grok MCP Server
#[derive(Clone)]
pub struct Config {
    /// Grok API key
    pub api_key: String,

    /// Grok API base URL (no trailing slash)
    pub base_url: String,

    /// Model used when a tool call does not name one
    pub default_model: String,

    /// Temperature used when a tool call does not set one
    pub default_temperature: f64,

    /// Max tokens used when a tool call does not set one
    pub default_max_tokens: u32,

    /// Tracing filter directive
    pub log_level: String,

    /// Shared secret callers must present; `None` disables the check
    pub auth_token: Option<String>,

    /// Server name reported on `initialize`
    pub server_name: String,

    /// Server version reported on `initialize`
    pub server_version: String,

    /// Timeout for each upstream call
    pub request_timeout: Duration,

    /// Response cache time-to-live
    pub cache_ttl: Duration,

    /// Response cache capacity
    pub cache_max_entries: usize,

    /// Maximum in-flight upstream calls
    pub max_concurrent_requests: usize,

    /// Minimum spacing between upstream dispatches
    pub min_request_interval: Duration,

    /// Maximum callers allowed to wait for a limiter slot
    pub max_queue_depth: usize,

    /// Live-search strategy
    pub search_mode: SearchMode,
}

impl Config {
    /// Load configuration from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup
    pub fn from_vars<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let api_key = get(env::API_KEY).ok_or_else(|| {
            GrokMcpError::Config(ConfigError::MissingEnvVar {
                var: env::API_KEY.to_string(),
            })
        })?;

        let base_url = get(env::BASE_URL).unwrap_or_else(|| grok::DEFAULT_BASE_URL.to_string());
        url::Url::parse(&base_url).map_err(|e| invalid(env::BASE_URL, e.to_string()))?;
        let base_url = base_url.trim_end_matches('/').to_string();

        let default_temperature: f64 =
            parse_or(get(env::DEFAULT_TEMPERATURE), env::DEFAULT_TEMPERATURE, grok::DEFAULT_TEMPERATURE)?;
        if !(0.0..=1.0).contains(&default_temperature) {
            return Err(invalid(env::DEFAULT_TEMPERATURE, "must be between 0 and 1"));
        }

        let default_max_tokens: u32 =
            parse_or(get(env::DEFAULT_MAX_TOKENS), env::DEFAULT_MAX_TOKENS, grok::DEFAULT_MAX_TOKENS)?;
        if default_max_tokens == 0 {
            return Err(invalid(env::DEFAULT_MAX_TOKENS, "must be a positive integer"));
        }

        let max_concurrent_requests: usize =
            parse_or(get(env::MAX_CONCURRENT), env::MAX_CONCURRENT, limits::MAX_CONCURRENT)?;
        if max_concurrent_requests == 0 {
            return Err(invalid(env::MAX_CONCURRENT, "must be at least 1"));
        }

        let max_queue_depth: usize =
            parse_or(get(env::MAX_QUEUE_DEPTH), env::MAX_QUEUE_DEPTH, limits::MAX_QUEUE_DEPTH)?;
        if max_queue_depth == 0 {
            return Err(invalid(env::MAX_QUEUE_DEPTH, "must be at least 1"));
        }

        let search_mode = match get(env::SEARCH_MODE) {
            Some(raw) => raw.parse::<SearchMode>().map_err(|e: String| invalid(env::SEARCH_MODE, e))?,
            None => SearchMode::Auto,
        };

        Ok(Self {
            api_key,
            base_url,
            default_model: get(env::DEFAULT_MODEL).unwrap_or_else(|| grok::DEFAULT_MODEL.to_string()),
            default_temperature,
            default_max_tokens,
            log_level: get(env::LOG_LEVEL).unwrap_or_else(|| "info".to_string()),
            auth_token: get(env::AUTH_TOKEN),
            server_name: get(env::SERVER_NAME).unwrap_or_else(|| "grok-mcp".to_string()),
            server_version: get(env::SERVER_VERSION)
                .unwrap_or_else(|| env!("CARGO_PKG_VERSION").to_string()),
            request_timeout: Duration::from_secs(parse_or(
                get(env::REQUEST_TIMEOUT_SECS),
                env::REQUEST_TIMEOUT_SECS,
                limits::REQUEST_TIMEOUT_SECS,
            )?),
            cache_ttl: Duration::from_secs(parse_or(
                get(env::CACHE_TTL_SECS),
                env::CACHE_TTL_SECS,
                limits::CACHE_TTL_SECS,
            )?),
            cache_max_entries: parse_or(
                get(env::CACHE_MAX_ENTRIES),
                env::CACHE_MAX_ENTRIES,
                limits::CACHE_MAX_ENTRIES,
            )?,
            max_concurrent_requests,
            min_request_interval: Duration::from_millis(parse_or(
                get(env::MIN_INTERVAL_MS),
                env::MIN_INTERVAL_MS,
                limits::MIN_INTERVAL_MS,
            )?),
            max_queue_depth,
            search_mode,
        })
    }

    /// Whether tool calls must present the shared secret
    pub fn auth_enabled(&self) -> bool {
        self.auth_token.is_some()
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("default_model", &self.default_model)
            .field("default_temperature", &self.default_temperature)
            .field("default_max_tokens", &self.default_max_tokens)
            .field("log_level", &self.log_level)
            .field("auth_enabled", &self.auth_enabled())
            .field("server_name", &self.server_name)
            .field("server_version", &self.server_version)
            .field("request_timeout", &self.request_timeout)
            .field("cache_ttl", &self.cache_ttl)
            .field("cache_max_entries", &self.cache_max_entries)
            .field("max_concurrent_requests", &self.max_concurrent_requests)
            .field("min_request_interval", &self.min_request_interval)
            .field("max_queue_depth", &self.max_queue_depth)
            .field("search_mode", &self.search_mode)
            .finish()
    }
}

fn parse_or<T: FromStr>(raw: Option<String>, var: &str, default: T) -> Result<T>
where
    T::Err: fmt::Display,
{
    match raw {
        Some(value) => value
            .parse()
            .map_err(|e: T::Err| invalid(var, format!("'{}': {}", value, e))),
        None => Ok(default),
    }
}

fn invalid(var: &str, message: impl Into<String>) -> GrokMcpError {
    GrokMcpError::Config(ConfigError::InvalidValue {
        var: var.to_string(),
        message: message.into(),
    })
}

/// Environment variable names
pub mod env {
    pub const API_KEY: &str = "XAI_API_KEY";
    pub const BASE_URL: &str = "XAI_BASE_URL";
    pub const DEFAULT_MODEL: &str = "GROK_DEFAULT_MODEL";
    pub const DEFAULT_TEMPERATURE: &str = "GROK_DEFAULT_TEMPERATURE";
    pub const DEFAULT_MAX_TOKENS: &str = "GROK_DEFAULT_MAX_TOKENS";
    pub const LOG_LEVEL: &str = "LOG_LEVEL";
    pub const AUTH_TOKEN: &str = "MCP_AUTH_TOKEN";
    pub const SERVER_NAME: &str = "MCP_SERVER_NAME";
    pub const SERVER_VERSION: &str = "MCP_SERVER_VERSION";
    pub const REQUEST_TIMEOUT_SECS: &str = "GROK_REQUEST_TIMEOUT_SECS";
    pub const CACHE_TTL_SECS: &str = "GROK_CACHE_TTL_SECS";
    pub const CACHE_MAX_ENTRIES: &str = "GROK_CACHE_MAX_ENTRIES";
    pub const MAX_CONCURRENT: &str = "GROK_MAX_CONCURRENT";
    pub const MIN_INTERVAL_MS: &str = "GROK_MIN_INTERVAL_MS";
    pub const MAX_QUEUE_DEPTH: &str = "GROK_MAX_QUEUE_DEPTH";
    pub const SEARCH_MODE: &str = "GROK_SEARCH_MODE";
}

/// Limiter, cache and timeout defaults
pub mod limits {
    pub const REQUEST_TIMEOUT_SECS: u64 = 30;
    pub const CACHE_TTL_SECS: u64 = 300;
    pub const CACHE_MAX_ENTRIES: usize = 100;
    pub const MAX_CONCURRENT: usize = 2;
    pub const MIN_INTERVAL_MS: u64 = 500;
    pub const MAX_QUEUE_DEPTH: usize = 64;
}

/// Grok API constants
pub mod grok {
    /// Base URL for the Grok API
    pub const DEFAULT_BASE_URL: &str = "https://api.x.ai/v1";

    pub const DEFAULT_MODEL: &str = "grok-4";
    pub const DEFAULT_TEMPERATURE: f64 = 0.7;
    pub const DEFAULT_MAX_TOKENS: u32 = 4000;

    /// Returned by `get_models` when the models endpoint cannot be reached
    pub const FALLBACK_MODELS: &[&str] = &[
        "grok-4",
        "grok-4-fast",
        "grok-code-fast-1",
        "grok-3",
        "grok-3-mini",
        "grok-2-vision-1212",
    ];

    /// Returned by ask/chat when the upstream produced no choices
    pub const NO_RESPONSE: &str = "No response generated";
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_vars(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_config_defaults() {
        let config = config_from(&[("XAI_API_KEY", "xai-test")]).unwrap();
        assert_eq!(config.base_url, "https://api.x.ai/v1");
        assert_eq!(config.default_model, "grok-4");
        assert_eq!(config.default_max_tokens, 4000);
        assert_eq!(config.max_concurrent_requests, 2);
        assert_eq!(config.min_request_interval, Duration::from_millis(500));
        assert_eq!(config.search_mode, SearchMode::Auto);
        assert!(!config.auth_enabled());
    }

    #[test]
    fn test_missing_api_key_is_rejected() {
        let err = config_from(&[]).unwrap_err();
        assert!(matches!(
            err,
            GrokMcpError::Config(ConfigError::MissingEnvVar { ref var }) if var == "XAI_API_KEY"
        ));

        let blank = config_from(&[("XAI_API_KEY", "   ")]);
        assert!(blank.is_err());
    }

    #[test]
    fn test_out_of_range_values_are_rejected() {
        assert!(config_from(&[("XAI_API_KEY", "k"), ("GROK_DEFAULT_TEMPERATURE", "1.5")]).is_err());
        assert!(config_from(&[("XAI_API_KEY", "k"), ("GROK_DEFAULT_MAX_TOKENS", "0")]).is_err());
        assert!(config_from(&[("XAI_API_KEY", "k"), ("GROK_DEFAULT_MAX_TOKENS", "lots")]).is_err());
        assert!(config_from(&[("XAI_API_KEY", "k"), ("XAI_BASE_URL", "not a url")]).is_err());
        assert!(config_from(&[("XAI_API_KEY", "k"), ("GROK_SEARCH_MODE", "bing")]).is_err());
        assert!(config_from(&[("XAI_API_KEY", "k"), ("GROK_MAX_CONCURRENT", "0")]).is_err());

        let err = config_from(&[("XAI_API_KEY", "k"), ("GROK_MAX_QUEUE_DEPTH", "0")]).unwrap_err();
        assert!(matches!(
            err,
            GrokMcpError::Config(ConfigError::InvalidValue { ref var, .. }) if var == "GROK_MAX_QUEUE_DEPTH"
        ));
    }

    #[test]
    fn test_overrides_and_trailing_slash() {
        let config = config_from(&[
            ("XAI_API_KEY", "k"),
            ("XAI_BASE_URL", "http://127.0.0.1:8080/v1/"),
            ("MCP_AUTH_TOKEN", "abc"),
            ("GROK_SEARCH_MODE", "Simulated"),
        ])
        .unwrap();
        assert_eq!(config.base_url, "http://127.0.0.1:8080/v1");
        assert_eq!(config.auth_token.as_deref(), Some("abc"));
        assert_eq!(config.search_mode, SearchMode::Simulated);
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let config = config_from(&[("XAI_API_KEY", "xai-super-secret"), ("MCP_AUTH_TOKEN", "hunter2")])
            .unwrap();
        let debug = format!("{:?}", config);
        assert!(!debug.contains("xai-super-secret"));
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("auth_enabled: true"));
    }
}

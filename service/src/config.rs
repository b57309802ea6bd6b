//! Service configuration.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use xrate_common::Currency;
use xrate_fx::{
    FileCacheStore, FxResult, HttpRateSource, HttpRateSourceConfig, RateResolver, ResolverConfig,
};

/// Main service configuration.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// HTTP listen address.
    pub listen_addr: String,
    /// Path of the JSON cache file.
    pub cache_file: PathBuf,
    /// Rate source endpoint root.
    pub source_url: String,
    /// Rate source API key.
    pub source_api_key: Option<String>,
    /// Log level.
    pub log_level: String,
    /// Emit JSON logs.
    pub log_json: bool,
    /// Resolver configuration.
    pub resolver: ResolverConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".to_string(),
            cache_file: PathBuf::from("xrate-cache.json"),
            source_url: HttpRateSourceConfig::default().base_url,
            source_api_key: None,
            log_level: "info".to_string(),
            log_json: false,
            resolver: ResolverConfig::default(),
        }
    }
}

impl ServiceConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(addr) = std::env::var("XRATE_LISTEN_ADDR") {
            config.listen_addr = addr;
        }

        if let Ok(path) = std::env::var("XRATE_CACHE_FILE") {
            config.cache_file = PathBuf::from(path);
        }

        if let Ok(url) = std::env::var("XRATE_SOURCE_URL") {
            config.source_url = url;
        }

        config.source_api_key = std::env::var("XRATE_API_KEY")
            .or_else(|_| std::env::var("API_KEY"))
            .ok()
            .filter(|key| !key.is_empty());

        if let Ok(base) = std::env::var("XRATE_CANONICAL_BASE").or_else(|_| std::env::var("CANONICAL_BASE")) {
            config.resolver.canonical_base = Currency::new(base);
        }

        if let Ok(secs) = std::env::var("XRATE_TTL_SECS") {
            if let Some(ttl) = secs.parse().ok().and_then(chrono::Duration::try_seconds) {
                config.resolver.default_ttl = ttl;
            }
        }

        if let Ok(ms) = std::env::var("XRATE_FETCH_TIMEOUT_MS") {
            if let Ok(ms) = ms.parse() {
                config.resolver.fetch_timeout = Duration::from_millis(ms);
            }
        }

        if let Ok(ms) = std::env::var("XRATE_STORE_TIMEOUT_MS") {
            if let Ok(ms) = ms.parse() {
                config.resolver.store_timeout = Duration::from_millis(ms);
            }
        }

        if let Ok(level) = std::env::var("LOG_LEVEL") {
            config.log_level = level;
        }

        if let Ok(json) = std::env::var("XRATE_LOG_JSON") {
            config.log_json = matches!(json.to_ascii_lowercase().as_str(), "1" | "true" | "yes");
        }

        config
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), String> {
        self.listen_addr
            .parse::<SocketAddr>()
            .map_err(|e| format!("Invalid listen address '{}': {}", self.listen_addr, e))?;

        if self.cache_file.as_os_str().is_empty() {
            return Err("Cache file path cannot be empty".to_string());
        }

        if !self.source_url.starts_with("http://") && !self.source_url.starts_with("https://") {
            return Err(format!("Source URL must be http(s): '{}'", self.source_url));
        }

        self.resolver.validate()
    }

    /// Build a resolver over the HTTP source and the file cache.
    pub fn build_resolver(&self) -> FxResult<RateResolver> {
        let source = HttpRateSource::new(HttpRateSourceConfig {
            base_url: self.source_url.clone(),
            api_key: self.source_api_key.clone(),
            timeout: self.resolver.fetch_timeout,
            ttl: self.resolver.default_ttl,
        })?;
        let store = FileCacheStore::new(&self.cache_file);

        Ok(RateResolver::new(
            Arc::new(source),
            Arc::new(store),
            self.resolver.clone(),
        ))
    }
}

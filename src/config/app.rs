//! Top-level application configuration (§6 Config inputs): file-based via `serde`+`toml`,
//! with environment-variable overrides applied at startup: load the file, then apply
//! `BIZCRAWL_*` overrides on top, env wins.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyPoolSettings {
    pub endpoints: Vec<String>,
    pub quarantine_threshold: u32,
    pub degraded_mode_allowed: bool,
}

impl Default for ProxyPoolSettings {
    fn default() -> Self {
        Self { endpoints: Vec::new(), quarantine_threshold: 3, degraded_mode_allowed: true }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConcurrencySettings {
    pub global_limit: usize,
    pub per_domain_limit: usize,
    pub slow_domain_limit: usize,
    pub acquire_timeout_secs: u64,
}

impl Default for ConcurrencySettings {
    fn default() -> Self {
        Self { global_limit: 1000, per_domain_limit: 15, slow_domain_limit: 10, acquire_timeout_secs: 30 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerSettings {
    pub failure_threshold: u32,
    pub recovery_timeout_secs: u64,
    pub half_open_max_tests: u32,
}

impl Default for CircuitBreakerSettings {
    fn default() -> Self {
        Self { failure_threshold: 12, recovery_timeout_secs: 30, half_open_max_tests: 3 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkerSettings {
    pub max_chunk_tokens: usize,
    pub overhead_tokens: usize,
    pub chars_per_token: f64,
}

impl Default for ChunkerSettings {
    fn default() -> Self {
        Self { max_chunk_tokens: 2000, overhead_tokens: 0, chars_per_token: 3.5 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdaptiveSettings {
    pub window_hours: u64,
    pub base_timeout_secs: f64,
    pub llm_concurrency: u32,
}

impl Default for AdaptiveSettings {
    fn default() -> Self {
        Self { window_hours: 6, base_timeout_secs: 15.0, llm_concurrency: 100 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiSettings {
    pub bind_addr: String,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self { bind_addr: "0.0.0.0:8080".to_string() }
    }
}

/// Everything the engine needs at startup: pool/governor/breaker knobs, chunker budget,
/// adaptive-config baseline, and the paths to the two tunable JSON side-files (§6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub proxy_pool: ProxyPoolSettings,
    pub concurrency: ConcurrencySettings,
    pub circuit_breaker: CircuitBreakerSettings,
    pub chunker: ChunkerSettings,
    pub adaptive: AdaptiveSettings,
    pub api: ApiSettings,
    pub strategy_bundle_path: Option<String>,
    pub protection_signatures_path: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            proxy_pool: ProxyPoolSettings::default(),
            concurrency: ConcurrencySettings::default(),
            circuit_breaker: CircuitBreakerSettings::default(),
            chunker: ChunkerSettings::default(),
            adaptive: AdaptiveSettings::default(),
            api: ApiSettings::default(),
            strategy_bundle_path: None,
            protection_signatures_path: None,
        }
    }
}

impl AppConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let mut config: AppConfig = toml::from_str(&content)?;
        config.apply_env_overrides();
        Ok(config)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// `BIZCRAWL_*` overrides applied after file load — env wins over file so operators
    /// can tune a running deployment without a redeploy.
    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("BIZCRAWL_PROXY_ENDPOINTS") {
            self.proxy_pool.endpoints = v.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect();
        }
        if let Ok(v) = std::env::var("BIZCRAWL_GLOBAL_CONCURRENCY") {
            if let Ok(n) = v.parse() {
                self.concurrency.global_limit = n;
            }
        }
        if let Ok(v) = std::env::var("BIZCRAWL_PER_DOMAIN_CONCURRENCY") {
            if let Ok(n) = v.parse() {
                self.concurrency.per_domain_limit = n;
            }
        }
        if let Ok(v) = std::env::var("BIZCRAWL_CIRCUIT_FAILURE_THRESHOLD") {
            if let Ok(n) = v.parse() {
                self.circuit_breaker.failure_threshold = n;
            }
        }
        if let Ok(v) = std::env::var("BIZCRAWL_CHUNK_MAX_TOKENS") {
            if let Ok(n) = v.parse() {
                self.chunker.max_chunk_tokens = n;
            }
        }
        if let Ok(v) = std::env::var("BIZCRAWL_LLM_CONCURRENCY") {
            if let Ok(n) = v.parse() {
                self.adaptive.llm_concurrency = n;
            }
        }
        if let Ok(v) = std::env::var("BIZCRAWL_BIND_ADDR") {
            self.api.bind_addr = v;
        }
        if let Ok(v) = std::env::var("BIZCRAWL_STRATEGY_BUNDLE_PATH") {
            self.strategy_bundle_path = Some(v);
        }
        if let Ok(v) = std::env::var("BIZCRAWL_PROTECTION_SIGNATURES_PATH") {
            self.protection_signatures_path = Some(v);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_round_trips_through_toml() {
        let config = AppConfig::default();
        let serialized = toml::to_string(&config).unwrap();
        let deserialized: AppConfig = toml::from_str(&serialized).unwrap();
        assert_eq!(deserialized.concurrency.global_limit, config.concurrency.global_limit);
    }

    #[test]
    fn env_override_replaces_file_value() {
        // SAFETY: test-only, single-threaded env mutation scoped to this test body.
        unsafe {
            std::env::set_var("BIZCRAWL_GLOBAL_CONCURRENCY", "42");
        }
        let mut config = AppConfig::default();
        config.apply_env_overrides();
        assert_eq!(config.concurrency.global_limit, 42);
        unsafe {
            std::env::remove_var("BIZCRAWL_GLOBAL_CONCURRENCY");
        }
    }
}

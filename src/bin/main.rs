use anyhow::{Context, Result};
use bizcrawl_engine::chunker::ChunkerConfig;
use bizcrawl_engine::config::defaults;
use bizcrawl_engine::{
    AdaptiveConfig, AppConfig, AppState, BreakerConfig, CircuitBreaker, ConcurrencyGovernor,
    GovernorConfig, InMemoryPersistence, ProtectionDetector, ProtectionSignatures, ProxyPool,
    ProxyPoolConfig, Scraper, ScraperConfig, SiteAnalyzer, StrategyBundle, StrategySelector, router,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    bizcrawl_engine::init_logging()?;

    let config_path = std::env::var("BIZCRAWL_CONFIG").unwrap_or_else(|_| "bizcrawl.toml".to_string());
    let app_config = if std::path::Path::new(&config_path).exists() {
        AppConfig::load_from_file(&config_path).context("loading app config")?
    } else {
        info!(path = %config_path, "no config file found, writing defaults and continuing");
        let config = AppConfig::default();
        config.save_to_file(&config_path).ok();
        config
    };

    let proxy_endpoints: Vec<(String, u32)> = app_config
        .proxy_pool
        .endpoints
        .iter()
        .cloned()
        .map(|endpoint| (endpoint, 1))
        .collect();
    let proxy_pool = Arc::new(ProxyPool::new(
        proxy_endpoints,
        ProxyPoolConfig {
            quarantine_threshold: app_config.proxy_pool.quarantine_threshold,
            degraded_mode_allowed: app_config.proxy_pool.degraded_mode_allowed,
            ..ProxyPoolConfig::default()
        },
    ));

    let governor = Arc::new(ConcurrencyGovernor::new(GovernorConfig {
        global_limit: app_config.concurrency.global_limit,
        per_domain_limit: app_config.concurrency.per_domain_limit,
        slow_domain_limit: app_config.concurrency.slow_domain_limit,
        acquire_timeout: Duration::from_secs(app_config.concurrency.acquire_timeout_secs),
        ..GovernorConfig::default()
    }));

    let breaker = Arc::new(CircuitBreaker::new(BreakerConfig {
        failure_threshold: app_config.circuit_breaker.failure_threshold,
        recovery_timeout: Duration::from_secs(app_config.circuit_breaker.recovery_timeout_secs),
        half_open_max_tests: app_config.circuit_breaker.half_open_max_tests,
    }));

    let protection_signatures = match &app_config.protection_signatures_path {
        Some(path) => ProtectionSignatures::load_from_file(path).context("loading protection signatures")?,
        None => ProtectionSignatures::default(),
    };
    let protection_detector = Arc::new(ProtectionDetector::new(protection_signatures.clone()));

    let analyzer = Arc::new(SiteAnalyzer::new(
        Duration::from_secs(10),
        defaults::DEFAULT_APP_USER_AGENT,
        ProtectionDetector::new(protection_signatures),
    ));

    let strategy_bundle = match &app_config.strategy_bundle_path {
        Some(path) => StrategyBundle::load_from_file(path).context("loading strategy bundle")?,
        None => StrategyBundle::default(),
    };
    let strategy_selector = Arc::new(StrategySelector::new(strategy_bundle));

    let scraper = Arc::new(Scraper::new(
        proxy_pool,
        governor,
        breaker,
        protection_detector,
        analyzer,
        strategy_selector,
        ScraperConfig::default(),
    )?);

    let adaptive_config = Arc::new(AdaptiveConfig::new(
        Duration::from_secs(app_config.adaptive.window_hours * 3600),
        app_config.adaptive.base_timeout_secs,
        app_config.adaptive.llm_concurrency,
    ));
    // Held for future wiring: a pipeline embedding the scraper feeds classified
    // failures back in via `record_failure` (§4.10); the bare engine binary doesn't
    // originate any on its own.
    let _adaptive_config = adaptive_config;

    let persistence = Arc::new(InMemoryPersistence::new(Vec::new()));
    let chunker_config = ChunkerConfig {
        max_chunk_tokens: app_config.chunker.max_chunk_tokens,
        overhead_tokens: app_config.chunker.overhead_tokens,
        chars_per_token: app_config.chunker.chars_per_token,
    };

    let state = AppState::new(persistence, scraper, chunker_config);

    let bind_addr = app_config.api.bind_addr.clone();
    info!(bind_addr = %bind_addr, "starting bizcrawl engine");

    let listener = tokio::net::TcpListener::bind(&bind_addr).await.context("binding API listener")?;
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving API")?;

    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown signal received, draining in-flight work");
}

//! Cross-module integration coverage for the scraper's infrastructure stack (§4.1-§4.3):
//! proxy selection, the two-level concurrency governor, and the circuit breaker, used the
//! way `Scraper` composes them rather than each in isolation.

use bizcrawl_engine::model::CircuitState;
use bizcrawl_engine::{
    BreakerConfig, CircuitBreaker, ConcurrencyGovernor, GovernorConfig, ProxyPool, ProxyPoolConfig,
};
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn a_request_acquires_a_proxy_and_a_governor_ticket_together() {
    let pool = ProxyPool::new(
        vec![("http://proxy-a:8080".to_string(), 1), ("http://proxy-b:8080".to_string(), 1)],
        ProxyPoolConfig::default(),
    );
    let governor = ConcurrencyGovernor::new(GovernorConfig::default());

    let proxy = pool.get_next().expect("pool has two healthy proxies");
    let ticket = governor.acquire("https://example.com/page").await.expect("capacity available");

    assert_eq!(ticket.domain(), "example.com");
    assert!(!proxy.endpoint.is_empty());
    drop(ticket);

    assert_eq!(governor.metrics().active_requests, 0);
}

#[tokio::test]
async fn repeated_transport_failures_quarantine_the_proxy_and_open_the_breaker() {
    let pool = ProxyPool::new(vec![("http://flaky:8080".to_string(), 1)], ProxyPoolConfig::default());
    let breaker = CircuitBreaker::new(BreakerConfig { failure_threshold: 3, ..BreakerConfig::default() });

    for _ in 0..3 {
        pool.record_failure("http://flaky:8080");
        breaker.record_failure("https://flaky.example.com/a", false);
    }

    assert!(pool.get_next().is_none(), "sole proxy should be quarantined");
    assert_eq!(breaker.get_state("https://flaky.example.com/a"), CircuitState::Open);
    assert!(breaker.is_open("https://flaky.example.com/a"));
}

#[tokio::test]
async fn protection_failures_quarantine_neither_the_proxy_pool_nor_the_breaker() {
    // Protection responses (Cloudflare/WAF/Captcha/Bot) are a site property, not an
    // infrastructure fault (§4.1, §4.3) — callers must not route them into either
    // `ProxyPool::record_failure` or `CircuitBreaker::record_failure(..., true)`'s
    // counted path.
    let breaker = CircuitBreaker::new(BreakerConfig { failure_threshold: 1, ..BreakerConfig::default() });
    for _ in 0..10 {
        breaker.record_failure("https://protected.example.com/a", true);
    }
    assert!(!breaker.is_open("https://protected.example.com/a"));
}

#[tokio::test]
async fn governor_caps_global_concurrency_across_many_domains() {
    let governor = Arc::new(ConcurrencyGovernor::new(GovernorConfig {
        global_limit: 5,
        per_domain_limit: 100,
        slow_domain_limit: 1,
        acquire_timeout: Duration::from_millis(100),
        slow_domain_restore_successes: 3,
    }));

    let mut tickets = Vec::new();
    for i in 0..5 {
        let url = format!("https://site{i}.example.com");
        tickets.push(governor.acquire(&url).await.unwrap());
    }
    assert_eq!(governor.metrics().active_requests, 5);

    let overflow = governor.acquire("https://site6.example.com").await;
    assert!(overflow.is_err(), "global cap should reject the sixth concurrent acquirer");

    tickets.clear();
    assert_eq!(governor.metrics().active_requests, 0);
    assert!(governor.acquire("https://site6.example.com").await.is_ok());
}

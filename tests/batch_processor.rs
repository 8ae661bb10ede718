//! Integration coverage for the batch orchestrator (§4.9): exercises `BatchProcessor`
//! wired to a real `Scraper` against unreachable targets, so every company fails fast
//! (connection refused) while the pagination, instance fan-out, flush, and checkpoint
//! machinery still runs end to end.

use bizcrawl_engine::model::{BatchConfig, BatchStatus};
use bizcrawl_engine::persistence::PendingCompany;
use bizcrawl_engine::{
    AdaptiveConfig, BatchProcessor, BreakerConfig, ChunkerConfig, CircuitBreaker,
    ConcurrencyGovernor, ErrorKind, GovernorConfig, InMemoryPersistence, ProtectionDetector,
    ProtectionSignatures, ProxyPool, ProxyPoolConfig, Scraper, ScraperConfig, SiteAnalyzer,
    StrategyBundle, StrategySelector,
};
use std::sync::Arc;
use std::time::Duration;

fn unreachable_company(id: i64) -> PendingCompany {
    PendingCompany {
        id,
        cnpj: format!("cnpj-{id}"),
        // Port 9 (discard) on loopback refuses connections immediately, no DNS lookup.
        website_url: "http://127.0.0.1:9/".to_string(),
        status: "alto".to_string(),
    }
}

fn small_batch_config() -> BatchConfig {
    BatchConfig { worker_count: 4, flush_size: 10, instances: 2, ..BatchConfig::default() }
}

fn test_scraper() -> Arc<Scraper> {
    let proxy_pool = Arc::new(ProxyPool::new(Vec::new(), ProxyPoolConfig::default()));
    let governor = Arc::new(ConcurrencyGovernor::new(GovernorConfig::default()));
    let breaker = Arc::new(CircuitBreaker::new(BreakerConfig::default()));
    let protection_detector = Arc::new(ProtectionDetector::new(ProtectionSignatures::default()));
    let analyzer = Arc::new(SiteAnalyzer::new(
        Duration::from_secs(5),
        "bizcrawl-engine-tests/1.0",
        ProtectionDetector::new(ProtectionSignatures::default()),
    ));
    let strategy_selector = Arc::new(StrategySelector::new(StrategyBundle::default()));

    Arc::new(
        Scraper::new(proxy_pool, governor, breaker, protection_detector, analyzer, strategy_selector, ScraperConfig::default())
            .expect("scraper construction should not fail"),
    )
}

#[tokio::test]
async fn batch_processes_every_pending_company_exactly_once() {
    let companies: Vec<_> = (1..=6).map(unreachable_company).collect();
    let persistence = Arc::new(InMemoryPersistence::new(companies));
    let scraper = test_scraper();
    let processor = Arc::new(BatchProcessor::new(persistence.clone(), scraper, ChunkerConfig::default()));

    let start = processor.start(small_batch_config()).await.unwrap();
    assert_eq!(start.total_companies, 6);

    // Every company fails the unreachable fetch near-instantly, so this settles quickly.
    for _ in 0..200 {
        if let Some(snapshot) = processor.status().await {
            if snapshot.processed >= 6 {
                break;
            }
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    let snapshot = processor.status().await.expect("batch should still report a snapshot");
    assert_eq!(snapshot.processed, 6);
    assert_eq!(snapshot.error_count, 6);
    assert_eq!(snapshot.success_count, 0);
    assert_eq!(persistence.outcome_count(), 6);
}

#[tokio::test]
async fn cancel_stops_the_batch_and_reports_cancelled() {
    let companies: Vec<_> = (1..=500).map(unreachable_company).collect();
    let persistence = Arc::new(InMemoryPersistence::new(companies));
    let scraper = test_scraper();
    let processor = Arc::new(BatchProcessor::new(persistence, scraper, ChunkerConfig::default()));

    processor.start(small_batch_config()).await.unwrap();
    processor.cancel().await.unwrap();

    let snapshot = processor.status().await.unwrap();
    assert_eq!(snapshot.status, BatchStatus::Cancelled);
}

#[tokio::test]
async fn starting_a_second_batch_while_one_runs_fails() {
    let companies: Vec<_> = (1..=500).map(unreachable_company).collect();
    let persistence = Arc::new(InMemoryPersistence::new(companies));
    let scraper = test_scraper();
    let processor = Arc::new(BatchProcessor::new(persistence, scraper, ChunkerConfig::default()));

    processor.start(small_batch_config()).await.unwrap();
    let second = processor.start(small_batch_config()).await;
    assert!(second.is_err(), "a second concurrent batch must be rejected");
}

#[test]
fn breaker_blocks_the_domain_a_repeatedly_failing_scrape_would_hit() {
    let breaker = CircuitBreaker::new(BreakerConfig { failure_threshold: 3, ..BreakerConfig::default() });
    for _ in 0..3 {
        breaker.record_failure("http://127.0.0.1:9/", false);
    }
    assert!(breaker.is_open("http://127.0.0.1:9/"));
}

#[test]
fn adaptive_config_tracks_failures_observed_during_a_batch() {
    let adaptive = AdaptiveConfig::new(Duration::from_secs(3600), 10.0, 50);
    for i in 0..5 {
        adaptive.record_failure("127.0.0.1", ErrorKind::Connection, format!("cnpj-{i}"));
    }
    assert_eq!(adaptive.window_event_count(), 5);
}

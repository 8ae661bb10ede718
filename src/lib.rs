// C1-C10 business-intelligence scraping engine: proxy pool, concurrency governor,
// circuit breaker, protection detection, site analysis, strategy selection, scraper,
// chunker, batch processor, and adaptive config, fronted by an axum control API.
pub mod adaptive;
pub mod analyzer;
pub mod api;
pub mod batch;
pub mod breaker;
pub mod chunker;
pub mod config;
pub mod core;
pub mod governor;
pub mod model;
pub mod persistence;
pub mod protection;
pub mod proxy;
pub mod scraper;
pub mod strategy;
pub mod utils;

// Re-exports for convenience
pub use core::{EngineError, ErrorKind, ErrorUtils};

pub use adaptive::{AdaptiveConfig, AdaptiveSnapshot, FailureEvent};
pub use analyzer::SiteAnalyzer;
pub use api::{AppState, router};
pub use batch::{BatchProcessor, StartBatchResponse};
pub use breaker::{BreakerConfig, CircuitBreaker};
pub use chunker::{ChunkerConfig, chunk_pages, chunk_scrape_result};
pub use governor::{ConcurrencyGovernor, GovernorConfig, GovernorTicket};
pub use persistence::{InMemoryPersistence, Persistence};
pub use protection::{ProtectionDetector, ProtectionSignatures};
pub use proxy::{ProxyPool, ProxyPoolConfig};
pub use scraper::{Scraper, ScraperConfig};
pub use strategy::{StrategyBundle, StrategySelector};

pub use config::AppConfig;

pub use utils::init_logging;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

//! Data model shared across components.

pub mod batch;
pub mod chunk;
pub mod circuit;
pub mod proxy;
pub mod scrape;
pub mod site_profile;

pub use batch::{
    BatchCheckpoint, BatchConfig, BatchStatus, BatchStatusSnapshot, CheckpointConfig,
    InfrastructureStatus, InstanceCheckpoint, InstanceStatus, LastError, ProcessingTimeStats,
};
pub use chunk::Chunk;
pub use circuit::{BreakerAggregateStatus, CircuitState, DomainCircuit, DomainCircuitStatus};
pub use proxy::{Proxy, ProxyPoolStatus};
pub use scrape::{LinkFunnelCounts, ScrapeResult, ScrapeTimings, ScrapedPage};
pub use site_profile::{
    ProtectionType, RetryRecommendation, ScrapingStrategy, SiteProfile, SiteType, StrategyConfig,
};

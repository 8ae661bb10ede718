// Configuration management module

pub mod app;
pub mod defaults;

// Re-export common configuration types
pub use app::{
    AdaptiveSettings, ApiSettings, AppConfig, ChunkerSettings, CircuitBreakerSettings,
    ConcurrencySettings, ProxyPoolSettings,
};

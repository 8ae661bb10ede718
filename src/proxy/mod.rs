//! Proxy pool: round-robin or weighted endpoint selection with exponential-backoff
//! quarantine after repeated failures, and a degraded-mode fallback when no healthy
//! proxy remains.

mod pool;

pub use pool::{ProxyPool, ProxyPoolConfig};

//! Proxy pool data model (§3 Proxy, §4.1 Proxy Pool).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single proxy endpoint and its health accounting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Proxy {
    pub endpoint: String,
    pub weight: u32,
    pub consecutive_failures: u32,
    pub last_failure_ts: Option<DateTime<Utc>>,
    pub last_success_ts: Option<DateTime<Utc>>,
    pub quarantined_until: Option<DateTime<Utc>>,
}

impl Proxy {
    pub fn new(endpoint: impl Into<String>, weight: u32) -> Self {
        Self {
            endpoint: endpoint.into(),
            weight: weight.max(1),
            consecutive_failures: 0,
            last_failure_ts: None,
            last_success_ts: None,
            quarantined_until: None,
        }
    }

    /// A quarantined proxy is never selected until `now >= quarantined_until` (§3 invariant).
    pub fn is_quarantined_at(&self, now: DateTime<Utc>) -> bool {
        self.quarantined_until.is_some_and(|until| now < until)
    }

    /// Selection bias for weighted mode: `weight / (1 + consecutive_failures)`.
    pub fn selection_bias(&self) -> f64 {
        self.weight as f64 / (1.0 + self.consecutive_failures as f64)
    }
}

/// Pool-level counters returned by `status()`.
#[derive(Debug, Clone, Serialize)]
pub struct ProxyPoolStatus {
    pub total: usize,
    pub healthy: usize,
    pub quarantined: usize,
    pub per_proxy_failures: Vec<(String, u32)>,
}

use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, RwLock, Semaphore};
use tokio::time::timeout;

#[derive(Debug, Error)]
pub enum GovernorError {
    #[error("concurrency governor timed out acquiring a ticket for domain {0}")]
    Timeout(String),
}

#[derive(Debug, Clone)]
pub struct GovernorConfig {
    pub global_limit: usize,
    pub per_domain_limit: usize,
    /// Reduced cap applied to domains marked slow.
    pub slow_domain_limit: usize,
    pub acquire_timeout: Duration,
    /// Consecutive successes required to restore a slow domain to its normal cap.
    pub slow_domain_restore_successes: u32,
}

impl Default for GovernorConfig {
    fn default() -> Self {
        Self {
            global_limit: 1000,
            per_domain_limit: 15,
            slow_domain_limit: 10,
            acquire_timeout: Duration::from_secs(30),
            slow_domain_restore_successes: 3,
        }
    }
}

struct DomainState {
    semaphore: Arc<Semaphore>,
    slow: bool,
    consecutive_successes: u32,
}

#[derive(Debug, Default, Serialize)]
pub struct GovernorMetrics {
    pub active_requests: u64,
    pub total_requests: u64,
    pub peak_concurrent: u64,
    pub total_wait_ms: u64,
}

/// Enforces a global cap and a per-domain cap simultaneously; a request must hold one
/// token of each, acquired global-first-then-domain and released in reverse (§4.2).
pub struct ConcurrencyGovernor {
    global: Arc<Semaphore>,
    domains: RwLock<HashMap<String, DomainState>>,
    config: GovernorConfig,
    active: AtomicI64,
    peak: AtomicI64,
    total_requests: AtomicU64,
    total_wait_ms: AtomicU64,
    domain_request_counts: RwLock<HashMap<String, u64>>,
}

impl ConcurrencyGovernor {
    pub fn new(config: GovernorConfig) -> Self {
        Self {
            global: Arc::new(Semaphore::new(config.global_limit)),
            domains: RwLock::new(HashMap::new()),
            config,
            active: AtomicI64::new(0),
            peak: AtomicI64::new(0),
            total_requests: AtomicU64::new(0),
            total_wait_ms: AtomicU64::new(0),
            domain_request_counts: RwLock::new(HashMap::new()),
        }
    }

    async fn domain_semaphore(&self, domain: &str) -> Arc<Semaphore> {
        {
            let domains = self.domains.read().await;
            if let Some(state) = domains.get(domain) {
                return state.semaphore.clone();
            }
        }
        let mut domains = self.domains.write().await;
        domains
            .entry(domain.to_string())
            .or_insert_with(|| DomainState {
                semaphore: Arc::new(Semaphore::new(self.config.per_domain_limit)),
                slow: false,
                consecutive_successes: 0,
            })
            .semaphore
            .clone()
    }

    /// Acquires global then domain tokens, with a shared timeout budget split across
    /// both acquisitions (the domain wait uses whatever budget remains).
    pub async fn acquire(&self, url: &str) -> Result<GovernorTicket<'_>, GovernorError> {
        let domain = extract_domain(url);
        let start = std::time::Instant::now();
        let budget = self.config.acquire_timeout;

        let global_permit = timeout(budget, self.global.clone().acquire_owned())
            .await
            .map_err(|_| GovernorError::Timeout(domain.clone()))?
            .expect("global semaphore never closed");

        let remaining = budget.saturating_sub(start.elapsed());
        let domain_sem = self.domain_semaphore(&domain).await;
        let domain_permit = timeout(remaining, domain_sem.acquire_owned())
            .await
            .map_err(|_| GovernorError::Timeout(domain.clone()))?
            .expect("domain semaphore never closed");

        self.total_wait_ms
            .fetch_add(start.elapsed().as_millis() as u64, Ordering::Relaxed);
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        {
            let mut counts = self.domain_request_counts.write().await;
            *counts.entry(domain.clone()).or_insert(0) += 1;
        }

        let now_active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now_active, Ordering::SeqCst);

        Ok(GovernorTicket {
            governor: self,
            domain,
            _domain_permit: domain_permit,
            _global_permit: global_permit,
        })
    }

    /// Marks a domain slow; its per-domain cap drops to `slow_domain_limit` for
    /// subsequent acquirers. Already-held tickets are unaffected (§4.2).
    pub async fn mark_slow(&self, domain: &str) {
        let mut domains = self.domains.write().await;
        let entry = domains.entry(domain.to_string()).or_insert_with(|| DomainState {
            semaphore: Arc::new(Semaphore::new(self.config.per_domain_limit)),
            slow: false,
            consecutive_successes: 0,
        });
        if !entry.slow {
            entry.slow = true;
            entry.consecutive_successes = 0;
            entry.semaphore = Arc::new(Semaphore::new(self.config.slow_domain_limit));
        }
    }

    pub async fn unmark_slow(&self, domain: &str) {
        let mut domains = self.domains.write().await;
        if let Some(entry) = domains.get_mut(domain) {
            if entry.slow {
                entry.slow = false;
                entry.consecutive_successes = 0;
                entry.semaphore = Arc::new(Semaphore::new(self.config.per_domain_limit));
            }
        }
    }

    /// Records a success for the automatic slow-domain-restore policy: after
    /// `slow_domain_restore_successes` consecutive successes, the domain is unmarked.
    pub async fn record_domain_outcome(&self, domain: &str, success: bool) {
        let should_restore = {
            let mut domains = self.domains.write().await;
            let Some(entry) = domains.get_mut(domain) else {
                return;
            };
            if !entry.slow {
                return;
            }
            if success {
                entry.consecutive_successes += 1;
            } else {
                entry.consecutive_successes = 0;
            }
            entry.consecutive_successes >= self.config.slow_domain_restore_successes
        };
        if should_restore {
            self.unmark_slow(domain).await;
        }
    }

    pub fn metrics(&self) -> GovernorMetrics {
        GovernorMetrics {
            active_requests: self.active.load(Ordering::SeqCst).max(0) as u64,
            total_requests: self.total_requests.load(Ordering::Relaxed),
            peak_concurrent: self.peak.load(Ordering::SeqCst).max(0) as u64,
            total_wait_ms: self.total_wait_ms.load(Ordering::Relaxed),
        }
    }

    pub async fn domain_request_count(&self, domain: &str) -> u64 {
        self.domain_request_counts
            .read()
            .await
            .get(domain)
            .copied()
            .unwrap_or(0)
    }
}

/// A scoped ticket holding one global and one domain permit. Dropping it releases the
/// domain permit first, then the global permit — the reverse of acquisition order.
pub struct GovernorTicket<'a> {
    governor: &'a ConcurrencyGovernor,
    domain: String,
    _domain_permit: OwnedSemaphorePermit,
    _global_permit: OwnedSemaphorePermit,
}

impl GovernorTicket<'_> {
    pub fn domain(&self) -> &str {
        &self.domain
    }
}

impl Drop for GovernorTicket<'_> {
    fn drop(&mut self) {
        self.governor.active.fetch_sub(1, Ordering::SeqCst);
    }
}

fn extract_domain(url: &str) -> String {
    crate::core::utils::ErrorUtils::extract_domain(url).unwrap_or_else(|| url.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration as StdDuration;

    #[tokio::test]
    async fn global_and_domain_caps_are_both_respected() {
        let governor = Arc::new(ConcurrencyGovernor::new(GovernorConfig {
            global_limit: 3,
            per_domain_limit: 2,
            slow_domain_limit: 1,
            acquire_timeout: StdDuration::from_millis(200),
            slow_domain_restore_successes: 3,
        }));

        let t1 = governor.acquire("https://a.example.com/x").await.unwrap();
        let t2 = governor.acquire("https://a.example.com/y").await.unwrap();
        // third acquisition for same domain should time out: domain cap is 2
        let res = governor.acquire("https://a.example.com/z").await;
        assert!(res.is_err());
        drop(t1);
        drop(t2);
    }

    #[tokio::test]
    async fn different_domains_share_global_cap_independently() {
        let governor = ConcurrencyGovernor::new(GovernorConfig {
            global_limit: 2,
            per_domain_limit: 5,
            slow_domain_limit: 1,
            acquire_timeout: StdDuration::from_millis(200),
            slow_domain_restore_successes: 3,
        });

        let _t1 = governor.acquire("https://a.example.com").await.unwrap();
        let _t2 = governor.acquire("https://b.example.com").await.unwrap();
        let res = governor.acquire("https://c.example.com").await;
        assert!(res.is_err(), "global cap of 2 should block a third domain");
    }

    #[tokio::test]
    async fn slow_domain_restores_after_consecutive_successes() {
        let governor = ConcurrencyGovernor::new(GovernorConfig {
            global_limit: 10,
            per_domain_limit: 5,
            slow_domain_limit: 1,
            acquire_timeout: StdDuration::from_millis(200),
            slow_domain_restore_successes: 2,
        });
        governor.mark_slow("a.example.com").await;
        {
            let domains = governor.domains.read().await;
            assert!(domains.get("a.example.com").unwrap().slow);
        }
        governor.record_domain_outcome("a.example.com", true).await;
        governor.record_domain_outcome("a.example.com", true).await;
        let domains = governor.domains.read().await;
        assert!(!domains.get("a.example.com").unwrap().slow);
    }
}

use crate::model::{Proxy, ProxyPoolStatus};
use chrono::Utc;
use rand::Rng;
use std::collections::HashSet;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct ProxyPoolConfig {
    /// Consecutive failures before quarantine (`F_quarantine`, default 3).
    pub quarantine_threshold: u32,
    pub base_backoff: Duration,
    pub max_backoff: Duration,
    pub weighted: bool,
    /// If no healthy proxy exists: proceed without one (degraded) vs fail fast.
    pub degraded_mode_allowed: bool,
}

impl Default for ProxyPoolConfig {
    fn default() -> Self {
        Self {
            quarantine_threshold: 3,
            base_backoff: Duration::from_secs(10),
            max_backoff: Duration::from_secs(600),
            weighted: false,
            degraded_mode_allowed: true,
        }
    }
}

/// Owns a finite list of proxies loaded at startup. All mutations are serialized through
/// a single lock (§4.1 concurrency note); selection is O(#proxies).
pub struct ProxyPool {
    proxies: Mutex<Vec<Proxy>>,
    round_robin_index: AtomicUsize,
    config: ProxyPoolConfig,
}

impl ProxyPool {
    pub fn new(endpoints: Vec<(String, u32)>, config: ProxyPoolConfig) -> Self {
        let proxies = endpoints
            .into_iter()
            .map(|(endpoint, weight)| Proxy::new(endpoint, weight))
            .collect();
        Self {
            proxies: Mutex::new(proxies),
            round_robin_index: AtomicUsize::new(0),
            config,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.proxies.lock().unwrap().is_empty()
    }

    /// A healthy proxy, or `None` if the pool is exhausted. Round-robin over
    /// non-quarantined proxies; if `weighted`, bias by `weight / (1 + consecutive_failures)`.
    pub fn get_next(&self) -> Option<Proxy> {
        self.select(|_| true)
    }

    /// A healthy proxy not in `excluded`, used by retry paths.
    pub fn get_excluding(&self, excluded: &HashSet<String>) -> Option<Proxy> {
        self.select(|p| !excluded.contains(&p.endpoint))
    }

    fn select(&self, predicate: impl Fn(&Proxy) -> bool) -> Option<Proxy> {
        let now = Utc::now();
        let proxies = self.proxies.lock().unwrap();
        let candidates: Vec<usize> = proxies
            .iter()
            .enumerate()
            .filter(|(_, p)| !p.is_quarantined_at(now) && predicate(p))
            .map(|(i, _)| i)
            .collect();

        if candidates.is_empty() {
            return None;
        }

        let chosen = if self.config.weighted {
            let total: f64 = candidates.iter().map(|&i| proxies[i].selection_bias()).sum();
            if total <= 0.0 {
                candidates[0]
            } else {
                let mut r = rand::thread_rng().gen_range(0.0..total);
                let mut pick = candidates[candidates.len() - 1];
                for &i in &candidates {
                    let bias = proxies[i].selection_bias();
                    if r < bias {
                        pick = i;
                        break;
                    }
                    r -= bias;
                }
                pick
            }
        } else {
            let idx = self.round_robin_index.fetch_add(1, Ordering::Relaxed);
            candidates[idx % candidates.len()]
        };

        Some(proxies[chosen].clone())
    }

    /// Resets `consecutive_failures` and clears quarantine.
    pub fn record_success(&self, endpoint: &str) {
        let mut proxies = self.proxies.lock().unwrap();
        if let Some(p) = proxies.iter_mut().find(|p| p.endpoint == endpoint) {
            p.consecutive_failures = 0;
            p.quarantined_until = None;
            p.last_success_ts = Some(Utc::now());
        }
    }

    /// Increments failures; quarantines once the threshold is reached, with backoff
    /// growing as `min(base * 2^k, cap)`.
    pub fn record_failure(&self, endpoint: &str) {
        let mut proxies = self.proxies.lock().unwrap();
        if let Some(p) = proxies.iter_mut().find(|p| p.endpoint == endpoint) {
            p.consecutive_failures += 1;
            p.last_failure_ts = Some(Utc::now());

            if p.consecutive_failures >= self.config.quarantine_threshold {
                let k = p.consecutive_failures - self.config.quarantine_threshold;
                let backoff = self
                    .config
                    .base_backoff
                    .saturating_mul(1u32.checked_shl(k.min(20)).unwrap_or(u32::MAX))
                    .min(self.config.max_backoff);
                p.quarantined_until = Some(Utc::now() + chrono::Duration::from_std(backoff).unwrap());
            }
        }
    }

    pub fn status(&self) -> ProxyPoolStatus {
        let now = Utc::now();
        let proxies = self.proxies.lock().unwrap();
        let healthy = proxies.iter().filter(|p| !p.is_quarantined_at(now)).count();
        ProxyPoolStatus {
            total: proxies.len(),
            healthy,
            quarantined: proxies.len() - healthy,
            per_proxy_failures: proxies
                .iter()
                .map(|p| (p.endpoint.clone(), p.consecutive_failures))
                .collect(),
        }
    }

    pub fn degraded_mode_allowed(&self) -> bool {
        self.config.degraded_mode_allowed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool(n: usize) -> ProxyPool {
        let endpoints = (0..n).map(|i| (format!("http://proxy{i}:8080"), 1)).collect();
        ProxyPool::new(endpoints, ProxyPoolConfig::default())
    }

    #[test]
    fn round_robin_fairness_over_10p_requests() {
        let p = pool(4);
        let mut counts = std::collections::HashMap::new();
        for _ in 0..40 {
            let picked = p.get_next().unwrap();
            *counts.entry(picked.endpoint).or_insert(0u32) += 1;
        }
        for count in counts.values() {
            assert!((9..=11).contains(count), "count {count} outside fairness band");
        }
    }

    #[test]
    fn quarantined_proxy_never_selected() {
        let p = pool(2);
        let target = "http://proxy0:8080".to_string();
        for _ in 0..3 {
            p.record_failure(&target);
        }
        for _ in 0..20 {
            let picked = p.get_next().unwrap();
            assert_ne!(picked.endpoint, target);
        }
    }

    #[test]
    fn success_clears_quarantine() {
        let p = pool(1);
        let target = "http://proxy0:8080".to_string();
        for _ in 0..5 {
            p.record_failure(&target);
        }
        assert!(p.get_next().is_none());
        p.record_success(&target);
        assert!(p.get_next().is_some());
    }

    #[test]
    fn exclusion_set_is_respected() {
        let p = pool(3);
        let mut excluded = HashSet::new();
        excluded.insert("http://proxy0:8080".to_string());
        excluded.insert("http://proxy1:8080".to_string());
        for _ in 0..10 {
            let picked = p.get_excluding(&excluded).unwrap();
            assert_eq!(picked.endpoint, "http://proxy2:8080");
        }
    }
}

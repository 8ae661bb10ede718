use crate::core::error::ErrorKind;
use crate::model::ScrapingStrategy;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::collections::VecDeque;
use std::sync::RwLock;
use std::time::Duration;

const CLOUDFLARE_THRESHOLD: f64 = 0.30;
const AGGRESSIVE_THRESHOLD: f64 = 0.50;
const TIMEOUT_THRESHOLD: f64 = 0.20;
const RATE_LIMIT_THRESHOLD: f64 = 0.25;
const TIMEOUT_MULTIPLIER: f64 = 1.5;
const MAX_TIMEOUT_SECS: f64 = 60.0;
const LLM_CONCURRENCY_DECAY: f64 = 0.8;
const MIN_LLM_CONCURRENCY: u32 = 1;

/// A single recorded failure feeding the sliding window below.
#[derive(Debug, Clone)]
pub struct FailureEvent {
    pub domain: String,
    pub category: ErrorKind,
    pub at: DateTime<Utc>,
    pub company_id: String,
}

/// A point-in-time configuration snapshot handed to a worker at the start of one company's
/// scrape. Workers that started earlier keep whatever snapshot they captured — adaptive
/// changes never retroactively affect in-flight requests (§4.10).
#[derive(Debug, Clone, Copy)]
pub struct AdaptiveSnapshot {
    pub default_strategy: ScrapingStrategy,
    pub default_timeout_s: f64,
    pub llm_concurrency: u32,
}

struct Inner {
    window: ChronoDuration,
    events: VecDeque<FailureEvent>,
    snapshot: AdaptiveSnapshot,
    base_timeout_s: f64,
    base_llm_concurrency: u32,
}

/// C10 — observes a sliding window of classified failures and atomically promotes the
/// default strategy, timeout, and LLM concurrency cap. Read via `snapshot()` once per
/// company at dispatch time, never mid-request (§9 design notes).
pub struct AdaptiveConfig {
    inner: RwLock<Inner>,
}

impl AdaptiveConfig {
    pub fn new(window: Duration, base_timeout_s: f64, base_llm_concurrency: u32) -> Self {
        let snapshot = AdaptiveSnapshot {
            default_strategy: ScrapingStrategy::Standard,
            default_timeout_s: base_timeout_s,
            llm_concurrency: base_llm_concurrency,
        };
        Self {
            inner: RwLock::new(Inner {
                window: ChronoDuration::from_std(window).unwrap_or(ChronoDuration::hours(6)),
                events: VecDeque::new(),
                snapshot,
                base_timeout_s,
                base_llm_concurrency,
            }),
        }
    }

    /// The config a worker should use for the company it is about to start.
    pub fn snapshot(&self) -> AdaptiveSnapshot {
        self.inner.read().unwrap().snapshot
    }

    /// Records one classified failure and recomputes the snapshot (§4.10).
    pub fn record_failure(&self, domain: impl Into<String>, category: ErrorKind, company_id: impl Into<String>) {
        let mut inner = self.inner.write().unwrap();
        let now = Utc::now();
        inner.events.push_back(FailureEvent {
            domain: domain.into(),
            category,
            at: now,
            company_id: company_id.into(),
        });
        prune_expired(&mut inner.events, now, inner.window);
        recompute(&mut inner);
    }

    /// Forces a recompute against the current window without adding an event — used by a
    /// periodic sweep so idle windows eventually decay back to the baseline.
    pub fn refresh(&self) {
        let mut inner = self.inner.write().unwrap();
        let now = Utc::now();
        let window = inner.window;
        prune_expired(&mut inner.events, now, window);
        recompute(&mut inner);
    }

    pub fn window_event_count(&self) -> usize {
        self.inner.read().unwrap().events.len()
    }
}

fn prune_expired(events: &mut VecDeque<FailureEvent>, now: DateTime<Utc>, window: ChronoDuration) {
    while let Some(front) = events.front() {
        if now - front.at > window {
            events.pop_front();
        } else {
            break;
        }
    }
}

fn recompute(inner: &mut Inner) {
    let total = inner.events.len();
    if total == 0 {
        inner.snapshot = AdaptiveSnapshot {
            default_strategy: ScrapingStrategy::Standard,
            default_timeout_s: inner.base_timeout_s,
            llm_concurrency: inner.base_llm_concurrency,
        };
        return;
    }

    let protection_count = inner
        .events
        .iter()
        .filter(|e| matches!(e.category, ErrorKind::Cloudflare | ErrorKind::Waf | ErrorKind::Captcha))
        .count();
    let timeout_count = inner.events.iter().filter(|e| e.category == ErrorKind::Timeout).count();
    let rate_limit_count = inner.events.iter().filter(|e| e.category == ErrorKind::RateLimit).count();

    let protection_share = protection_count as f64 / total as f64;
    let timeout_share = timeout_count as f64 / total as f64;
    let rate_limit_share = rate_limit_count as f64 / total as f64;

    let default_strategy = if protection_share > AGGRESSIVE_THRESHOLD {
        ScrapingStrategy::Aggressive
    } else if protection_share > CLOUDFLARE_THRESHOLD {
        ScrapingStrategy::Robust
    } else {
        ScrapingStrategy::Standard
    };

    let default_timeout_s = if timeout_share > TIMEOUT_THRESHOLD {
        (inner.base_timeout_s * TIMEOUT_MULTIPLIER).min(MAX_TIMEOUT_SECS)
    } else {
        inner.base_timeout_s
    };

    let llm_concurrency = if rate_limit_share > RATE_LIMIT_THRESHOLD {
        (((inner.base_llm_concurrency as f64) * LLM_CONCURRENCY_DECAY).floor() as u32).max(MIN_LLM_CONCURRENCY)
    } else {
        inner.base_llm_concurrency
    };

    inner.snapshot = AdaptiveSnapshot { default_strategy, default_timeout_s, llm_concurrency };
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> AdaptiveConfig {
        AdaptiveConfig::new(Duration::from_secs(6 * 3600), 20.0, 100)
    }

    #[test]
    fn baseline_snapshot_before_any_failures() {
        let cfg = config();
        let snap = cfg.snapshot();
        assert_eq!(snap.default_strategy, ScrapingStrategy::Standard);
        assert_eq!(snap.default_timeout_s, 20.0);
        assert_eq!(snap.llm_concurrency, 100);
    }

    #[test]
    fn protection_share_above_30pct_promotes_to_robust() {
        let cfg = config();
        for i in 0..10 {
            let category = if i < 4 { ErrorKind::Cloudflare } else { ErrorKind::Dns };
            cfg.record_failure("example.com", category, format!("c{i}"));
        }
        assert_eq!(cfg.snapshot().default_strategy, ScrapingStrategy::Robust);
    }

    #[test]
    fn protection_share_above_50pct_promotes_to_aggressive() {
        let cfg = config();
        for i in 0..10 {
            let category = if i < 6 { ErrorKind::Waf } else { ErrorKind::Dns };
            cfg.record_failure("example.com", category, format!("c{i}"));
        }
        assert_eq!(cfg.snapshot().default_strategy, ScrapingStrategy::Aggressive);
    }

    #[test]
    fn timeout_share_above_20pct_scales_timeout_capped_at_60s() {
        let cfg = AdaptiveConfig::new(Duration::from_secs(6 * 3600), 50.0, 100);
        for i in 0..10 {
            let category = if i < 3 { ErrorKind::Timeout } else { ErrorKind::Dns };
            cfg.record_failure("example.com", category, format!("c{i}"));
        }
        assert_eq!(cfg.snapshot().default_timeout_s, 60.0);
    }

    #[test]
    fn rate_limit_share_above_25pct_decays_llm_concurrency() {
        let cfg = config();
        for i in 0..10 {
            let category = if i < 3 { ErrorKind::RateLimit } else { ErrorKind::Dns };
            cfg.record_failure("example.com", category, format!("c{i}"));
        }
        assert_eq!(cfg.snapshot().llm_concurrency, 80);
    }

    #[test]
    fn events_outside_the_window_are_pruned_on_refresh() {
        let cfg = AdaptiveConfig::new(Duration::from_millis(1), 20.0, 100);
        cfg.record_failure("example.com", ErrorKind::Cloudflare, "c0");
        std::thread::sleep(Duration::from_millis(20));
        cfg.refresh();
        assert_eq!(cfg.window_event_count(), 0);
        assert_eq!(cfg.snapshot().default_strategy, ScrapingStrategy::Standard);
    }
}

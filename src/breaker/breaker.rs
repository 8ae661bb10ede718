use crate::core::utils::ErrorUtils;
use crate::model::{BreakerAggregateStatus, CircuitState, DomainCircuit, DomainCircuitStatus};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct BreakerConfig {
    pub failure_threshold: u32,
    pub recovery_timeout: Duration,
    pub half_open_max_tests: u32,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 12,
            recovery_timeout: Duration::from_secs(30),
            half_open_max_tests: 3,
        }
    }
}

/// Per-domain failure breaker. Injected into the scraper rather than reached for as a
/// global, so tests can run several independently configured breakers side by side.
pub struct CircuitBreaker {
    circuits: Mutex<HashMap<String, DomainCircuit>>,
    config: BreakerConfig,
    total_blocked: AtomicU64,
    total_opened: AtomicU64,
}

impl CircuitBreaker {
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            circuits: Mutex::new(HashMap::new()),
            config,
            total_blocked: AtomicU64::new(0),
            total_opened: AtomicU64::new(0),
        }
    }

    fn domain_of(url: &str) -> String {
        ErrorUtils::extract_domain(url).unwrap_or_else(|| "unknown".to_string())
    }

    /// Moves an OPEN circuit to HALF_OPEN once `recovery_timeout` has elapsed.
    fn refresh_state(&self, circuit: &mut DomainCircuit) {
        if circuit.state == CircuitState::Open {
            if let Some(opened_at) = circuit.opened_at {
                let elapsed = Utc::now().signed_duration_since(opened_at);
                if elapsed >= chrono::Duration::from_std(self.config.recovery_timeout).unwrap() {
                    circuit.state = CircuitState::HalfOpen;
                    circuit.half_open_tests_done = 0;
                }
            }
        }
    }

    /// Whether a request to `url`'s domain should be blocked. Also advances
    /// OPEN -> HALF_OPEN as a side effect, matching the Python implementation.
    pub fn is_open(&self, url: &str) -> bool {
        let domain = Self::domain_of(url);
        let mut circuits = self.circuits.lock().unwrap();
        let circuit = circuits
            .entry(domain)
            .or_insert_with(|| DomainCircuit::new(Self::domain_of(url)));
        self.refresh_state(circuit);

        match circuit.state {
            CircuitState::Open => {
                self.total_blocked.fetch_add(1, Ordering::Relaxed);
                true
            }
            // Admits the test request without blocking; only `record_success`/
            // `record_failure` advance `half_open_tests_done` (§4.3), so a single
            // admit+outcome pair counts once, not twice.
            CircuitState::HalfOpen => false,
            CircuitState::Closed => false,
        }
    }

    /// Records a failure. Protection failures (Cloudflare/WAF/Captcha/Bot) must not be
    /// passed here with `is_protection = true` counted against the breaker (§4.3, §7).
    pub fn record_failure(&self, url: &str, is_protection: bool) {
        if is_protection {
            return;
        }
        let domain = Self::domain_of(url);
        let mut circuits = self.circuits.lock().unwrap();
        let circuit = circuits
            .entry(domain.clone())
            .or_insert_with(|| DomainCircuit::new(domain));

        circuit.failures += 1;

        match circuit.state {
            CircuitState::HalfOpen => {
                circuit.state = CircuitState::Open;
                circuit.opened_at = Some(Utc::now());
            }
            CircuitState::Closed => {
                if circuit.failures >= self.config.failure_threshold {
                    circuit.state = CircuitState::Open;
                    circuit.opened_at = Some(Utc::now());
                    self.total_opened.fetch_add(1, Ordering::Relaxed);
                }
            }
            CircuitState::Open => {}
        }
    }

    pub fn record_success(&self, url: &str) {
        let domain = Self::domain_of(url);
        let mut circuits = self.circuits.lock().unwrap();
        let circuit = circuits
            .entry(domain.clone())
            .or_insert_with(|| DomainCircuit::new(domain));

        circuit.successes += 1;

        match circuit.state {
            CircuitState::HalfOpen => {
                circuit.half_open_tests_done += 1;
                if circuit.half_open_tests_done >= self.config.half_open_max_tests {
                    circuit.state = CircuitState::Closed;
                    circuit.failures = 0;
                }
            }
            CircuitState::Closed => {
                circuit.failures = 0;
            }
            CircuitState::Open => {}
        }
    }

    pub fn get_state(&self, url: &str) -> CircuitState {
        let domain = Self::domain_of(url);
        let mut circuits = self.circuits.lock().unwrap();
        let circuit = circuits
            .entry(domain.clone())
            .or_insert_with(|| DomainCircuit::new(domain));
        self.refresh_state(circuit);
        circuit.state
    }

    pub fn reset(&self, url: Option<&str>) {
        let mut circuits = self.circuits.lock().unwrap();
        match url {
            Some(url) => {
                circuits.remove(&Self::domain_of(url));
            }
            None => circuits.clear(),
        }
    }

    pub fn status(&self) -> BreakerAggregateStatus {
        let mut circuits = self.circuits.lock().unwrap();
        let mut out = BreakerAggregateStatus {
            total_blocked: self.total_blocked.load(Ordering::Relaxed),
            total_opened: self.total_opened.load(Ordering::Relaxed),
            ..Default::default()
        };
        for circuit in circuits.values_mut() {
            self.refresh_state(circuit);
            match circuit.state {
                CircuitState::Closed => out.closed += 1,
                CircuitState::Open => out.open += 1,
                CircuitState::HalfOpen => out.half_open += 1,
            }
        }
        out
    }

    pub fn domain_status(&self, url: &str) -> DomainCircuitStatus {
        let domain = Self::domain_of(url);
        let mut circuits = self.circuits.lock().unwrap();
        let circuit = circuits
            .entry(domain.clone())
            .or_insert_with(|| DomainCircuit::new(domain));
        self.refresh_state(circuit);

        let remaining_timeout_s = match (circuit.state, circuit.opened_at) {
            (CircuitState::Open, Some(opened_at)) => {
                let elapsed = Utc::now().signed_duration_since(opened_at).num_milliseconds() as f64 / 1000.0;
                Some((self.config.recovery_timeout.as_secs_f64() - elapsed).max(0.0))
            }
            _ => None,
        };

        DomainCircuitStatus {
            domain: circuit.domain.clone(),
            state: circuit.state,
            failures: circuit.failures,
            remaining_timeout_s,
        }
    }

    pub fn open_circuits(&self) -> Vec<DomainCircuitStatus> {
        let domains: Vec<String> = {
            let circuits = self.circuits.lock().unwrap();
            circuits.keys().cloned().collect()
        };
        domains
            .into_iter()
            .map(|d| self.domain_status(&d))
            .filter(|s| s.state == CircuitState::Open)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opens_after_threshold_consecutive_failures() {
        let breaker = CircuitBreaker::new(BreakerConfig {
            failure_threshold: 3,
            ..Default::default()
        });
        for _ in 0..2 {
            breaker.record_failure("https://slow.example.com/a", false);
        }
        assert!(!breaker.is_open("https://slow.example.com/a"));
        breaker.record_failure("https://slow.example.com/a", false);
        assert!(breaker.is_open("https://slow.example.com/a"));
    }

    #[test]
    fn protection_failures_never_count_toward_threshold() {
        let breaker = CircuitBreaker::new(BreakerConfig {
            failure_threshold: 2,
            ..Default::default()
        });
        for _ in 0..10 {
            breaker.record_failure("https://waf.example.com/a", true);
        }
        assert!(!breaker.is_open("https://waf.example.com/a"));
    }

    #[test]
    fn half_open_closes_after_enough_test_successes() {
        let breaker = CircuitBreaker::new(BreakerConfig {
            failure_threshold: 1,
            recovery_timeout: Duration::from_millis(0),
            half_open_max_tests: 2,
        });
        breaker.record_failure("https://a.example.com", false);
        // recovery_timeout is 0, so the very first is_open call already flips
        // OPEN -> HALF_OPEN before admitting the check, so it returns false.
        assert!(!breaker.is_open("https://a.example.com"));
        assert_eq!(breaker.get_state("https://a.example.com"), CircuitState::HalfOpen);
        breaker.record_success("https://a.example.com");
        assert_eq!(breaker.get_state("https://a.example.com"), CircuitState::HalfOpen);
        breaker.record_success("https://a.example.com");
        assert_eq!(breaker.get_state("https://a.example.com"), CircuitState::Closed);
    }

    #[test]
    fn half_open_failure_reopens_immediately() {
        let breaker = CircuitBreaker::new(BreakerConfig {
            failure_threshold: 1,
            recovery_timeout: Duration::from_millis(50),
            half_open_max_tests: 3,
        });
        breaker.record_failure("https://a.example.com", false);
        assert!(breaker.is_open("https://a.example.com")); // recovery_timeout hasn't elapsed yet
        std::thread::sleep(Duration::from_millis(60));
        assert!(!breaker.is_open("https://a.example.com")); // flips to half-open
        breaker.record_failure("https://a.example.com", false);
        // reopened with a fresh opened_at, so it won't flip back to half-open yet
        assert!(breaker.is_open("https://a.example.com"));
    }

    #[test]
    fn reset_clears_tracked_domain() {
        let breaker = CircuitBreaker::new(BreakerConfig {
            failure_threshold: 1,
            ..Default::default()
        });
        breaker.record_failure("https://a.example.com", false);
        assert!(breaker.is_open("https://a.example.com"));
        breaker.reset(Some("https://a.example.com"));
        assert_eq!(breaker.get_state("https://a.example.com"), CircuitState::Closed);
    }
}

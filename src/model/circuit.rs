//! Circuit breaker data model (§3 DomainCircuit, §4.3 Circuit Breaker).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

/// Per-domain breaker state. Invariant: `state == Open ⟹ opened_at.is_some()`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainCircuit {
    pub domain: String,
    pub state: CircuitState,
    pub failures: u32,
    pub successes: u32,
    pub opened_at: Option<DateTime<Utc>>,
    pub half_open_tests_done: u32,
}

impl DomainCircuit {
    pub fn new(domain: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            state: CircuitState::Closed,
            failures: 0,
            successes: 0,
            opened_at: None,
            half_open_tests_done: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DomainCircuitStatus {
    pub domain: String,
    pub state: CircuitState,
    pub failures: u32,
    pub remaining_timeout_s: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct BreakerAggregateStatus {
    pub closed: usize,
    pub open: usize,
    pub half_open: usize,
    pub total_blocked: u64,
    pub total_opened: u64,
}

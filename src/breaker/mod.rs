//! Circuit breaker: per-domain CLOSED/OPEN/HALF_OPEN state machine, injected as a
//! component rather than a global singleton.

mod breaker;

pub use breaker::{BreakerConfig, CircuitBreaker};

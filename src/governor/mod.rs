//! Concurrency governor: a two-level semaphore (global, then per-domain) acquired in
//! that order and released in reverse via an RAII guard, with automatic per-domain
//! cap reduction for slow domains.

mod ticket;

pub use ticket::{GovernorConfig, GovernorError, GovernorMetrics, GovernorTicket, ConcurrencyGovernor};

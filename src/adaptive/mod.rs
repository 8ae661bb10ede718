//! Adaptive config: observes classified failures over a sliding window and atomically
//! adjusts the default strategy, timeout, and LLM concurrency cap.

mod config;

pub use config::{AdaptiveConfig, AdaptiveSnapshot, FailureEvent};

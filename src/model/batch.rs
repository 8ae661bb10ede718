//! Batch job data model (§3 BatchJob, §4.9 Batch Processor, §6 status endpoint).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchStatus {
    Pending,
    Running,
    Completed,
    Cancelled,
    Error,
}

#[derive(Debug, Clone, Serialize)]
pub struct InstanceStatus {
    pub id: usize,
    pub status: String,
    pub processed: u64,
    pub success: u64,
    pub errors: u64,
    pub throughput_per_min: f64,
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct ProcessingTimeStats {
    pub avg: f64,
    pub min: f64,
    pub max: f64,
    pub p50: f64,
    pub p60: f64,
    pub p70: f64,
    pub p80: f64,
    pub p90: f64,
    pub p95: f64,
    pub p99: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct LastError {
    pub company_id: String,
    pub domain: Option<String>,
    pub category: String,
    pub message: String,
}

/// Full status snapshot, the shape `GET /scrape/batch/status` returns (§6).
#[derive(Debug, Clone, Serialize)]
pub struct BatchStatusSnapshot {
    pub batch_id: String,
    pub status: BatchStatus,
    pub total: u64,
    pub processed: u64,
    pub success_count: u64,
    pub error_count: u64,
    pub success_rate_pct: f64,
    pub remaining: u64,
    pub in_progress: u64,
    pub peak_in_progress: u64,
    pub throughput_per_min: f64,
    pub eta_minutes: Option<f64>,
    pub elapsed_seconds: f64,
    pub flushes_done: u64,
    pub buffer_size: usize,
    pub processing_time_ms: ProcessingTimeStats,
    pub error_breakdown: HashMap<String, u64>,
    pub pages_per_company_avg: f64,
    pub total_retries: u64,
    pub infrastructure: InfrastructureStatus,
    pub last_errors: Vec<LastError>,
    pub instances: Vec<InstanceStatus>,
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct InfrastructureStatus {
    pub proxy_pool: serde_json::Value,
    pub concurrency: serde_json::Value,
    pub circuit_breaker: serde_json::Value,
}

/// Configuration a batch is started with (§6 Start batch).
#[derive(Debug, Clone)]
pub struct BatchConfig {
    pub limit: Option<u64>,
    pub worker_count: u32,
    pub flush_size: usize,
    pub instances: u32,
    pub status_filter: Vec<String>,
    pub checkpoint: Option<CheckpointConfig>,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            limit: None,
            worker_count: 2000,
            flush_size: 1000,
            instances: 10,
            status_filter: vec!["muito_alto".into(), "alto".into(), "medio".into()],
            checkpoint: None,
        }
    }
}

/// Enables periodic checkpoint persistence for a batch (§4.9a). Off by default.
#[derive(Debug, Clone)]
pub struct CheckpointConfig {
    pub path: PathBuf,
    pub interval: Duration,
}

/// Per-instance slice of a [`BatchCheckpoint`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceCheckpoint {
    pub id: usize,
    pub processed: u64,
    pub success: u64,
    pub errors: u64,
}

/// Periodic snapshot written to `CheckpointConfig::path` so a restart after a crash can
/// resume pagination from `cursor` instead of re-scanning from the start (§4.9a).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchCheckpoint {
    pub batch_id: String,
    pub cursor: i64,
    pub processed: u64,
    pub success: u64,
    pub errors: u64,
    pub instances: Vec<InstanceCheckpoint>,
    pub saved_at: chrono::DateTime<chrono::Utc>,
}

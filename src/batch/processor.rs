use crate::chunker::{ChunkerConfig, chunk_scrape_result};
use crate::model::{
    BatchCheckpoint, BatchConfig, BatchStatus, BatchStatusSnapshot, InfrastructureStatus,
    InstanceCheckpoint, InstanceStatus, LastError, ProcessingTimeStats,
};
use crate::persistence::{ChunkRecord, Persistence, ScrapeOutcomeRecord};
use crate::scraper::Scraper;
use rand::Rng;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, Mutex, Notify, RwLock};
use tracing::{debug, error, info, warn};

const PAGE_SIZE: i64 = 500;
const MAX_LAST_ERRORS: usize = 10;
const MAX_LATENCY_SAMPLES: usize = 20_000;

/// Bounds buffer growth ahead of a flush (§4.9 backpressure).
fn backpressure_limit(flush_size: usize) -> usize {
    flush_size * 2
}

struct Counters {
    processed: AtomicU64,
    success: AtomicU64,
    errors: AtomicU64,
    in_progress: AtomicI64,
    peak_in_progress: AtomicI64,
    flushes_done: AtomicU64,
    total_retries: AtomicU64,
    pages_fetched_total: AtomicU64,
}

impl Counters {
    fn new() -> Self {
        Self {
            processed: AtomicU64::new(0),
            success: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            in_progress: AtomicI64::new(0),
            peak_in_progress: AtomicI64::new(0),
            flushes_done: AtomicU64::new(0),
            total_retries: AtomicU64::new(0),
            pages_fetched_total: AtomicU64::new(0),
        }
    }
}

struct InstanceCounters {
    id: usize,
    processed: AtomicU64,
    success: AtomicU64,
    errors: AtomicU64,
}

struct RunningBatch {
    batch_id: String,
    config: BatchConfig,
    total: u64,
    started_at: Instant,
    cancel: Arc<AtomicBool>,
    status: RwLock<BatchStatus>,
    counters: Counters,
    instances: Vec<InstanceCounters>,
    buffer: Mutex<Vec<ChunkRecord>>,
    buffer_not_full: Notify,
    error_breakdown: Mutex<HashMap<String, u64>>,
    last_errors: Mutex<VecDeque<LastError>>,
    latencies_ms: Mutex<Vec<u64>>,
    /// Last `after` cursor handed out by `paginate`, snapshotted into checkpoints (§4.9a).
    cursor: AtomicI64,
}

/// C9 — runs one batch at a time: cursor-paginated fan-out across `instances`
/// partitions, each with its own worker pool, a shared flush buffer, and percentile
/// progress reporting (§4.9).
pub struct BatchProcessor {
    persistence: Arc<dyn Persistence>,
    scraper: Arc<Scraper>,
    chunker_config: ChunkerConfig,
    running: Arc<RwLock<Option<Arc<RunningBatch>>>>,
}

pub struct StartBatchResponse {
    pub batch_id: String,
    pub total_companies: u64,
}

impl BatchProcessor {
    pub fn new(persistence: Arc<dyn Persistence>, scraper: Arc<Scraper>, chunker_config: ChunkerConfig) -> Self {
        Self {
            persistence,
            scraper,
            chunker_config,
            running: Arc::new(RwLock::new(None)),
        }
    }

    /// Starts a batch; fails if one is already running (§6, HTTP 409 at the API layer).
    pub async fn start(&self, config: BatchConfig) -> anyhow::Result<StartBatchResponse> {
        {
            let guard = self.running.read().await;
            if let Some(running) = guard.as_ref() {
                if matches!(*running.status.read().await, BatchStatus::Running) {
                    anyhow::bail!("a batch is already running");
                }
            }
        }

        let resumed = match &config.checkpoint {
            Some(cp) => load_checkpoint(&cp.path).await,
            None => None,
        };

        let total = self.count_pending(&config).await?;
        let batch_id = resumed.as_ref().map(|c| c.batch_id.clone()).unwrap_or_else(random_batch_id);

        let instances = (0..config.instances as usize)
            .map(|id| {
                let resumed = resumed.as_ref().and_then(|c| c.instances.iter().find(|i| i.id == id));
                InstanceCounters {
                    id,
                    processed: AtomicU64::new(resumed.map(|i| i.processed).unwrap_or(0)),
                    success: AtomicU64::new(resumed.map(|i| i.success).unwrap_or(0)),
                    errors: AtomicU64::new(resumed.map(|i| i.errors).unwrap_or(0)),
                }
            })
            .collect();

        let running = Arc::new(RunningBatch {
            batch_id: batch_id.clone(),
            config: config.clone(),
            total,
            started_at: Instant::now(),
            cancel: Arc::new(AtomicBool::new(false)),
            status: RwLock::new(BatchStatus::Running),
            counters: Counters::new(),
            instances,
            buffer: Mutex::new(Vec::new()),
            buffer_not_full: Notify::new(),
            error_breakdown: Mutex::new(HashMap::new()),
            last_errors: Mutex::new(VecDeque::new()),
            latencies_ms: Mutex::new(Vec::new()),
            cursor: AtomicI64::new(resumed.as_ref().map(|c| c.cursor).unwrap_or(0)),
        });

        if let Some(cp) = &resumed {
            running.counters.processed.store(cp.processed, Ordering::Relaxed);
            running.counters.success.store(cp.success, Ordering::Relaxed);
            running.counters.errors.store(cp.errors, Ordering::Relaxed);
            info!(batch_id = %batch_id, cursor = cp.cursor, "resumed batch from checkpoint");
        }

        *self.running.write().await = Some(running.clone());

        let persistence = self.persistence.clone();
        let scraper = self.scraper.clone();
        let chunker_config = self.chunker_config.clone();
        let running_for_task = running.clone();
        let slot = self.running.clone();

        tokio::spawn(async move {
            run_batch(running_for_task.clone(), persistence, scraper, chunker_config).await;
            let mut status = running_for_task.status.write().await;
            if *status == BatchStatus::Running {
                *status = BatchStatus::Completed;
            }
            drop(status);
            info!(batch_id = %running_for_task.batch_id, "batch finished");
            // Leave the finished batch visible for one last status() read; the API layer
            // clears the slot once the caller fetches a terminal status.
            let _ = slot;
        });

        Ok(StartBatchResponse { batch_id, total_companies: total })
    }

    /// Sets the cancel flag; the background task drains in-flight work and performs one
    /// final flush before transitioning to `Cancelled` (§4.9, §8 property 9).
    pub async fn cancel(&self) -> anyhow::Result<()> {
        let guard = self.running.read().await;
        let Some(running) = guard.as_ref() else {
            anyhow::bail!("no active batch");
        };
        running.cancel.store(true, Ordering::SeqCst);
        *running.status.write().await = BatchStatus::Cancelled;
        Ok(())
    }

    pub async fn status(&self) -> Option<BatchStatusSnapshot> {
        let guard = self.running.read().await;
        let running = guard.as_ref()?;

        let processed = running.counters.processed.load(Ordering::Relaxed);
        let success = running.counters.success.load(Ordering::Relaxed);
        let errors = running.counters.errors.load(Ordering::Relaxed);
        let elapsed = running.started_at.elapsed().as_secs_f64().max(0.001);
        let throughput_per_min = (processed as f64) / elapsed * 60.0;
        let remaining = running.total.saturating_sub(processed);
        let eta_minutes = if throughput_per_min > 0.0 {
            Some((remaining as f64) / throughput_per_min)
        } else {
            None
        };

        let latencies = running.latencies_ms.lock().await;
        let processing_time_ms = percentile_stats(&latencies);
        drop(latencies);

        let error_breakdown = running.error_breakdown.lock().await.clone();
        let last_errors: Vec<LastError> = running.last_errors.lock().await.iter().cloned().collect();
        let buffer_size = running.buffer.lock().await.len();

        let instances = running
            .instances
            .iter()
            .map(|i| InstanceStatus {
                id: i.id,
                status: "running".to_string(),
                processed: i.processed.load(Ordering::Relaxed),
                success: i.success.load(Ordering::Relaxed),
                errors: i.errors.load(Ordering::Relaxed),
                throughput_per_min: (i.processed.load(Ordering::Relaxed) as f64) / elapsed * 60.0,
            })
            .collect();

        let pages_fetched_total = running.counters.pages_fetched_total.load(Ordering::Relaxed);
        let pages_per_company_avg = if processed > 0 {
            pages_fetched_total as f64 / processed as f64
        } else {
            0.0
        };

        Some(BatchStatusSnapshot {
            batch_id: running.batch_id.clone(),
            status: *running.status.read().await,
            total: running.total,
            processed,
            success_count: success,
            error_count: errors,
            success_rate_pct: if processed > 0 { (success as f64 / processed as f64) * 100.0 } else { 0.0 },
            remaining,
            in_progress: running.counters.in_progress.load(Ordering::Relaxed).max(0) as u64,
            peak_in_progress: running.counters.peak_in_progress.load(Ordering::Relaxed).max(0) as u64,
            throughput_per_min,
            eta_minutes,
            elapsed_seconds: elapsed,
            flushes_done: running.counters.flushes_done.load(Ordering::Relaxed),
            buffer_size,
            processing_time_ms,
            error_breakdown,
            pages_per_company_avg,
            total_retries: running.counters.total_retries.load(Ordering::Relaxed),
            infrastructure: InfrastructureStatus::default(),
            last_errors,
            instances,
        })
    }

    async fn count_pending(&self, config: &BatchConfig) -> anyhow::Result<u64> {
        let mut total = 0u64;
        let mut after = 0i64;
        loop {
            let page = self.persistence.list_pending(&config.status_filter, after, PAGE_SIZE).await?;
            if page.is_empty() {
                break;
            }
            after = page.last().unwrap().id;
            total += page.len() as u64;
            if let Some(limit) = config.limit {
                if total >= limit {
                    total = limit;
                    break;
                }
            }
        }
        Ok(total)
    }
}

async fn run_batch(
    running: Arc<RunningBatch>,
    persistence: Arc<dyn Persistence>,
    scraper: Arc<Scraper>,
    chunker_config: ChunkerConfig,
) {
    let (tx, rx) = mpsc::channel(running.config.worker_count.max(1) as usize * 4);
    let rx = Arc::new(Mutex::new(rx));

    let checkpoint_handle = running.config.checkpoint.clone().map(|cp_config| {
        let running = running.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(cp_config.interval);
            loop {
                ticker.tick().await;
                if let Err(err) = save_checkpoint(&running, &cp_config.path).await {
                    error!(error = %err, "failed to save batch checkpoint");
                } else {
                    debug!(batch_id = %running.batch_id, "batch checkpoint saved");
                }
            }
        })
    });

    let paginator = tokio::spawn(paginate(running.clone(), persistence.clone(), tx));

    let instances = running.config.instances.max(1);
    let workers_per_instance = (running.config.worker_count / instances).max(1);
    let mut worker_handles = Vec::new();

    for instance_id in 0..instances as usize {
        for _ in 0..workers_per_instance {
            let running = running.clone();
            let persistence = persistence.clone();
            let scraper = scraper.clone();
            let chunker_config = chunker_config.clone();
            let rx = rx.clone();
            worker_handles.push(tokio::spawn(async move {
                worker_loop(running, persistence, scraper, chunker_config, rx, instance_id).await;
            }));
        }
    }

    let _ = paginator.await;
    for h in worker_handles {
        let _ = h.await;
    }
    if let Some(handle) = checkpoint_handle {
        handle.abort();
    }

    final_flush(&running, &persistence).await;
}

async fn paginate(
    running: Arc<RunningBatch>,
    persistence: Arc<dyn Persistence>,
    tx: mpsc::Sender<crate::persistence::PendingCompany>,
) {
    let mut after = running.cursor.load(Ordering::Relaxed);
    let mut dispatched = 0u64;
    loop {
        if running.cancel.load(Ordering::SeqCst) {
            break;
        }
        let page = match persistence.list_pending(&running.config.status_filter, after, PAGE_SIZE).await {
            Ok(p) => p,
            Err(err) => {
                warn!(error = %err, "pagination failed, stopping batch intake");
                break;
            }
        };
        if page.is_empty() {
            break;
        }
        after = page.last().unwrap().id;
        running.cursor.store(after, Ordering::Relaxed);
        for company in page {
            if let Some(limit) = running.config.limit {
                if dispatched >= limit {
                    return;
                }
            }
            if running.cancel.load(Ordering::SeqCst) {
                return;
            }
            dispatched += 1;
            if tx.send(company).await.is_err() {
                return;
            }
        }
    }
}

async fn worker_loop(
    running: Arc<RunningBatch>,
    persistence: Arc<dyn Persistence>,
    scraper: Arc<Scraper>,
    chunker_config: ChunkerConfig,
    rx: Arc<Mutex<mpsc::Receiver<crate::persistence::PendingCompany>>>,
    instance_id: usize,
) {
    loop {
        if running.cancel.load(Ordering::SeqCst) {
            break;
        }
        let company = {
            let mut rx = rx.lock().await;
            rx.recv().await
        };
        let Some(company) = company else { break };

        let started = Instant::now();
        let in_progress = running.counters.in_progress.fetch_add(1, Ordering::SeqCst) + 1;
        running.counters.peak_in_progress.fetch_max(in_progress, Ordering::SeqCst);

        let result = scraper.scrape_company(&company.website_url).await;
        let success = result.success();
        let pages_fetched = usize::from(result.main_page.is_some()) + result.subpages.iter().filter(|p| p.success()).count();

        if success {
            let chunks = chunk_scrape_result(&result, &chunker_config);
            let records: Vec<ChunkRecord> = chunks
                .into_iter()
                .map(|chunk| ChunkRecord { cnpj: company.cnpj.clone(), chunk })
                .collect();
            enqueue_chunks(&running, &persistence, records).await;
        } else if let Some(reason) = &result.main_page_fail_reason {
            let mut breakdown = running.error_breakdown.lock().await;
            *breakdown.entry(reason.clone()).or_insert(0) += 1;
            drop(breakdown);

            let mut last = running.last_errors.lock().await;
            if last.len() >= MAX_LAST_ERRORS {
                last.pop_front();
            }
            last.push_back(LastError {
                company_id: company.cnpj.clone(),
                domain: crate::core::utils::ErrorUtils::extract_domain(&company.website_url),
                category: reason.clone(),
                message: format!("scrape failed for {}", company.website_url),
            });
        }

        let _ = persistence
            .save_scrape_outcome(
                &company.cnpj,
                &ScrapeOutcomeRecord {
                    success,
                    fail_reason: result.main_page_fail_reason.clone(),
                    pages_fetched,
                    strategy_used: result.strategy_used.map(|s| format!("{s:?}")),
                },
            )
            .await;

        running.counters.in_progress.fetch_sub(1, Ordering::SeqCst);
        running.counters.processed.fetch_add(1, Ordering::Relaxed);
        running.counters.pages_fetched_total.fetch_add(pages_fetched as u64, Ordering::Relaxed);
        let inst = &running.instances[instance_id];
        inst.processed.fetch_add(1, Ordering::Relaxed);
        if success {
            running.counters.success.fetch_add(1, Ordering::Relaxed);
            inst.success.fetch_add(1, Ordering::Relaxed);
        } else {
            running.counters.errors.fetch_add(1, Ordering::Relaxed);
            inst.errors.fetch_add(1, Ordering::Relaxed);
        }

        let mut latencies = running.latencies_ms.lock().await;
        if latencies.len() < MAX_LATENCY_SAMPLES {
            latencies.push(started.elapsed().as_millis() as u64);
        }
    }
}

/// Pushes `records` onto the shared buffer; blocks the caller past `2 * flush_size`
/// (backpressure) and flushes once `flush_size` is reached.
async fn enqueue_chunks(running: &Arc<RunningBatch>, persistence: &Arc<dyn Persistence>, records: Vec<ChunkRecord>) {
    loop {
        let len = running.buffer.lock().await.len();
        if len < backpressure_limit(running.config.flush_size) {
            break;
        }
        running.buffer_not_full.notified().await;
    }

    let mut buffer = running.buffer.lock().await;
    buffer.extend(records);
    let should_flush = buffer.len() >= running.config.flush_size;
    let drained = if should_flush { Some(std::mem::take(&mut *buffer)) } else { None };
    drop(buffer);

    running.buffer_not_full.notify_waiters();

    if let Some(drained) = drained {
        flush(running, persistence, drained).await;
    }
}

async fn flush(running: &Arc<RunningBatch>, persistence: &Arc<dyn Persistence>, records: Vec<ChunkRecord>) {
    if records.is_empty() {
        return;
    }
    match persistence.bulk_insert_chunks(&records).await {
        Ok(()) => {
            running.counters.flushes_done.fetch_add(1, Ordering::Relaxed);
        }
        Err(err) => {
            warn!(error = %err, count = records.len(), "bulk insert failed, records dropped");
        }
    }
    running.buffer_not_full.notify_waiters();
}

async fn final_flush(running: &Arc<RunningBatch>, persistence: &Arc<dyn Persistence>) {
    let mut buffer = running.buffer.lock().await;
    let drained = std::mem::take(&mut *buffer);
    drop(buffer);
    flush(running, persistence, drained).await;
}

fn percentile_stats(samples: &[u64]) -> ProcessingTimeStats {
    if samples.is_empty() {
        return ProcessingTimeStats::default();
    }
    let mut sorted = samples.to_vec();
    sorted.sort_unstable();
    let pct = |p: f64| -> f64 {
        let idx = ((sorted.len() as f64 - 1.0) * p).round() as usize;
        sorted[idx.min(sorted.len() - 1)] as f64
    };
    ProcessingTimeStats {
        avg: sorted.iter().sum::<u64>() as f64 / sorted.len() as f64,
        min: sorted[0] as f64,
        max: sorted[sorted.len() - 1] as f64,
        p50: pct(0.50),
        p60: pct(0.60),
        p70: pct(0.70),
        p80: pct(0.80),
        p90: pct(0.90),
        p95: pct(0.95),
        p99: pct(0.99),
    }
}

/// Snapshots `running`'s cursor and counters to `path` (§4.9a).
async fn save_checkpoint(running: &Arc<RunningBatch>, path: &std::path::Path) -> anyhow::Result<()> {
    let instances = running
        .instances
        .iter()
        .map(|i| InstanceCheckpoint {
            id: i.id,
            processed: i.processed.load(Ordering::Relaxed),
            success: i.success.load(Ordering::Relaxed),
            errors: i.errors.load(Ordering::Relaxed),
        })
        .collect();

    let checkpoint = BatchCheckpoint {
        batch_id: running.batch_id.clone(),
        cursor: running.cursor.load(Ordering::Relaxed),
        processed: running.counters.processed.load(Ordering::Relaxed),
        success: running.counters.success.load(Ordering::Relaxed),
        errors: running.counters.errors.load(Ordering::Relaxed),
        instances,
        saved_at: chrono::Utc::now(),
    };

    let json = serde_json::to_string_pretty(&checkpoint)?;
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }
    tokio::fs::write(path, json).await?;
    Ok(())
}

/// Loads a checkpoint written by `save_checkpoint`, if `path` exists and parses.
async fn load_checkpoint(path: &std::path::Path) -> Option<BatchCheckpoint> {
    let content = tokio::fs::read_to_string(path).await.ok()?;
    match serde_json::from_str(&content) {
        Ok(checkpoint) => Some(checkpoint),
        Err(err) => {
            warn!(error = %err, path = %path.display(), "ignoring unparsable batch checkpoint");
            None
        }
    }
}

fn random_batch_id() -> String {
    const CHARS: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
    let mut rng = rand::thread_rng();
    (0..12).map(|_| CHARS[rng.gen_range(0..CHARS.len())] as char).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_running(batch_id: &str, cursor: i64) -> Arc<RunningBatch> {
        let instances = vec![
            InstanceCounters { id: 0, processed: AtomicU64::new(40), success: AtomicU64::new(38), errors: AtomicU64::new(2) },
            InstanceCounters { id: 1, processed: AtomicU64::new(10), success: AtomicU64::new(9), errors: AtomicU64::new(1) },
        ];
        let counters = Counters::new();
        counters.processed.store(50, Ordering::Relaxed);
        counters.success.store(47, Ordering::Relaxed);
        counters.errors.store(3, Ordering::Relaxed);

        Arc::new(RunningBatch {
            batch_id: batch_id.to_string(),
            config: BatchConfig::default(),
            total: 1000,
            started_at: Instant::now(),
            cancel: Arc::new(AtomicBool::new(false)),
            status: RwLock::new(BatchStatus::Running),
            counters,
            instances,
            buffer: Mutex::new(Vec::new()),
            buffer_not_full: Notify::new(),
            error_breakdown: Mutex::new(HashMap::new()),
            last_errors: Mutex::new(VecDeque::new()),
            latencies_ms: Mutex::new(Vec::new()),
            cursor: AtomicI64::new(cursor),
        })
    }

    #[tokio::test]
    async fn checkpoint_round_trips_cursor_and_counters() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("batch-checkpoint.json");
        let running = sample_running("abc123xyz000", 4500);

        save_checkpoint(&running, &path).await.unwrap();
        let loaded = load_checkpoint(&path).await.expect("checkpoint should parse");

        assert_eq!(loaded.batch_id, "abc123xyz000");
        assert_eq!(loaded.cursor, 4500);
        assert_eq!(loaded.processed, 50);
        assert_eq!(loaded.success, 47);
        assert_eq!(loaded.errors, 3);
        assert_eq!(loaded.instances.len(), 2);
        assert_eq!(loaded.instances[0].processed, 40);
        assert_eq!(loaded.instances[1].errors, 1);
    }

    #[tokio::test]
    async fn missing_checkpoint_file_resumes_from_scratch() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("does-not-exist.json");
        assert!(load_checkpoint(&path).await.is_none());
    }

    #[tokio::test]
    async fn unparsable_checkpoint_file_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("corrupt.json");
        tokio::fs::write(&path, b"not json").await.unwrap();
        assert!(load_checkpoint(&path).await.is_none());
    }
}

//! Shared application state handed to every axum handler, plus the bounded
//! Accept-and-background job queue (§6, §9 redesign note: fire-and-forget work re-architected
//! as a bounded in-process queue so depth is observable and shutdown can drain it).

use crate::chunker::{chunk_scrape_result, ChunkerConfig};
use crate::persistence::{ChunkRecord, Persistence, ScrapeOutcomeRecord};
use crate::scraper::Scraper;
use crate::BatchProcessor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};

const JOB_QUEUE_CAPACITY: usize = 256;

/// Single-company background scrape queue backing the Accept-and-background endpoint.
/// Bounded so a caller gets a clear rejection instead of unbounded memory growth, and so
/// `depth()` can feed a health check.
pub struct JobQueue {
    tx: mpsc::Sender<String>,
    depth: Arc<AtomicUsize>,
}

impl JobQueue {
    pub fn new(persistence: Arc<dyn Persistence>, scraper: Arc<Scraper>, chunker_config: ChunkerConfig) -> Self {
        let (tx, rx) = mpsc::channel(JOB_QUEUE_CAPACITY);
        let depth = Arc::new(AtomicUsize::new(0));
        tokio::spawn(run_worker(rx, depth.clone(), persistence, scraper, chunker_config));
        Self { tx, depth }
    }

    /// Enqueues `cnpj`; fails (without blocking) if the queue is at capacity.
    pub fn enqueue(&self, cnpj: String) -> anyhow::Result<()> {
        self.tx
            .try_send(cnpj)
            .map(|()| {
                self.depth.fetch_add(1, Ordering::Relaxed);
            })
            .map_err(|_| anyhow::anyhow!("job queue is full"))
    }

    pub fn depth(&self) -> usize {
        self.depth.load(Ordering::Relaxed)
    }
}

async fn run_worker(
    mut rx: mpsc::Receiver<String>,
    depth: Arc<AtomicUsize>,
    persistence: Arc<dyn Persistence>,
    scraper: Arc<Scraper>,
    chunker_config: ChunkerConfig,
) {
    while let Some(cnpj) = rx.recv().await {
        depth.fetch_sub(1, Ordering::Relaxed);
        let website_url = match find_website_url(&persistence, &cnpj).await {
            Some(url) => url,
            None => {
                warn!(cnpj = %cnpj, "accept-and-background: company not found among pending rows");
                continue;
            }
        };

        let result = scraper.scrape_company(&website_url).await;
        let success = result.success();
        let pages_fetched = usize::from(result.main_page.is_some()) + result.subpages.iter().filter(|p| p.success()).count();

        if success {
            let chunks = chunk_scrape_result(&result, &chunker_config);
            let records: Vec<ChunkRecord> = chunks.into_iter().map(|chunk| ChunkRecord { cnpj: cnpj.clone(), chunk }).collect();
            if let Err(err) = persistence.bulk_insert_chunks(&records).await {
                warn!(error = %err, cnpj = %cnpj, "accept-and-background: chunk insert failed");
            }
        }

        let _ = persistence
            .save_scrape_outcome(
                &cnpj,
                &ScrapeOutcomeRecord {
                    success,
                    fail_reason: result.main_page_fail_reason.clone(),
                    pages_fetched,
                    strategy_used: result.strategy_used.map(|s| format!("{s:?}")),
                },
            )
            .await;

        info!(cnpj = %cnpj, success, "accept-and-background job finished");
    }
}

/// `list_pending` is the only lookup the persistence boundary exposes (§6: "interface only,
/// no schema"); a single accepted job is rare enough that a linear scan here is fine.
async fn find_website_url(persistence: &Arc<dyn Persistence>, cnpj: &str) -> Option<String> {
    let mut after = 0i64;
    loop {
        let page = persistence.list_pending(&[], after, 500).await.ok()?;
        if page.is_empty() {
            return None;
        }
        after = page.last()?.id;
        if let Some(row) = page.iter().find(|row| row.cnpj == cnpj) {
            return Some(row.website_url.clone());
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub batch_processor: Arc<BatchProcessor>,
    pub job_queue: Arc<JobQueue>,
}

impl AppState {
    pub fn new(persistence: Arc<dyn Persistence>, scraper: Arc<Scraper>, chunker_config: ChunkerConfig) -> Self {
        let batch_processor = Arc::new(BatchProcessor::new(persistence.clone(), scraper.clone(), chunker_config.clone()));
        let job_queue = Arc::new(JobQueue::new(persistence, scraper, chunker_config));
        Self { batch_processor, job_queue }
    }
}

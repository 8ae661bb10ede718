//! Persistence boundary the core requires (§6): cursor pagination, bulk chunk insert,
//! and per-company outcome recording. Interface only — no schema is assumed.

mod memory;

pub use memory::InMemoryPersistence;

use crate::model::Chunk;
use async_trait::async_trait;

#[derive(Debug, Clone)]
pub struct PendingCompany {
    pub id: i64,
    pub cnpj: String,
    pub website_url: String,
    pub status: String,
}

#[derive(Debug, Clone)]
pub struct ChunkRecord {
    pub cnpj: String,
    pub chunk: Chunk,
}

#[derive(Debug, Clone)]
pub struct ScrapeOutcomeRecord {
    pub success: bool,
    pub fail_reason: Option<String>,
    pub pages_fetched: usize,
    pub strategy_used: Option<String>,
}

/// Implemented by whatever backs company/chunk storage. `list_pending` is the only
/// allowed read path for the work loop — cursor-only, no offset scans (§4.9, §9).
#[async_trait]
pub trait Persistence: Send + Sync {
    async fn list_pending(
        &self,
        status_filter: &[String],
        after_id: i64,
        limit: i64,
    ) -> anyhow::Result<Vec<PendingCompany>>;

    /// All-or-nothing: if this returns `Err`, none of `records` are visible to a
    /// subsequent `list_pending`/read (§8 property 8).
    async fn bulk_insert_chunks(&self, records: &[ChunkRecord]) -> anyhow::Result<()>;

    async fn save_scrape_outcome(
        &self,
        cnpj: &str,
        outcome: &ScrapeOutcomeRecord,
    ) -> anyhow::Result<()>;
}

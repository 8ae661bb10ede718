use super::{ChunkRecord, PendingCompany, Persistence, ScrapeOutcomeRecord};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Mutex;

/// Reference `Persistence` implementation for tests and local runs: seeded with a fixed
/// company list, keeps inserted chunks and outcomes in memory.
pub struct InMemoryPersistence {
    companies: Vec<PendingCompany>,
    scraped: Mutex<HashSet<String>>,
    chunks: Mutex<Vec<ChunkRecord>>,
    outcomes: Mutex<Vec<(String, ScrapeOutcomeRecord)>>,
}

impl InMemoryPersistence {
    pub fn new(companies: Vec<PendingCompany>) -> Self {
        Self {
            companies,
            scraped: Mutex::new(HashSet::new()),
            chunks: Mutex::new(Vec::new()),
            outcomes: Mutex::new(Vec::new()),
        }
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.lock().unwrap().len()
    }

    pub fn outcome_count(&self) -> usize {
        self.outcomes.lock().unwrap().len()
    }
}

#[async_trait]
impl Persistence for InMemoryPersistence {
    async fn list_pending(
        &self,
        status_filter: &[String],
        after_id: i64,
        limit: i64,
    ) -> anyhow::Result<Vec<PendingCompany>> {
        let scraped = self.scraped.lock().unwrap();
        let page = self
            .companies
            .iter()
            .filter(|c| c.id > after_id)
            .filter(|c| status_filter.is_empty() || status_filter.contains(&c.status))
            .filter(|c| !scraped.contains(&c.cnpj))
            .take(limit.max(0) as usize)
            .cloned()
            .collect();
        Ok(page)
    }

    async fn bulk_insert_chunks(&self, records: &[ChunkRecord]) -> anyhow::Result<()> {
        let mut chunks = self.chunks.lock().unwrap();
        chunks.extend_from_slice(records);
        Ok(())
    }

    async fn save_scrape_outcome(
        &self,
        cnpj: &str,
        outcome: &ScrapeOutcomeRecord,
    ) -> anyhow::Result<()> {
        self.scraped.lock().unwrap().insert(cnpj.to_string());
        self.outcomes.lock().unwrap().push((cnpj.to_string(), outcome.clone()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn company(id: i64, status: &str) -> PendingCompany {
        PendingCompany {
            id,
            cnpj: format!("cnpj-{id}"),
            website_url: format!("https://company{id}.example.com"),
            status: status.to_string(),
        }
    }

    #[tokio::test]
    async fn cursor_pagination_visits_every_row_exactly_once() {
        let companies: Vec<_> = (1..=25).map(|i| company(i, "alto")).collect();
        let store = InMemoryPersistence::new(companies);

        let mut seen = Vec::new();
        let mut after = 0i64;
        loop {
            let page = store.list_pending(&["alto".to_string()], after, 7).await.unwrap();
            if page.is_empty() {
                break;
            }
            after = page.last().unwrap().id;
            seen.extend(page.into_iter().map(|c| c.id));
        }
        assert_eq!(seen, (1..=25).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn scraped_companies_are_excluded_from_subsequent_pages() {
        let companies = vec![company(1, "alto"), company(2, "alto")];
        let store = InMemoryPersistence::new(companies);
        store
            .save_scrape_outcome(
                "cnpj-1",
                &ScrapeOutcomeRecord { success: true, fail_reason: None, pages_fetched: 3, strategy_used: None },
            )
            .await
            .unwrap();

        let page = store.list_pending(&["alto".to_string()], 0, 10).await.unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].id, 2);
    }
}

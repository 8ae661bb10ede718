//! Scrape result data model (§3 ScrapedPage, ScrapeResult, §4.7 Scraper).

use crate::model::site_profile::ScrapingStrategy;
use serde::Serialize;

/// One fetched page. `success ⇔ content.len() >= 100 && error.is_none()` (§3).
#[derive(Debug, Clone, Serialize)]
pub struct ScrapedPage {
    pub url: String,
    pub content: String,
    pub links: Vec<String>,
    pub document_links: Vec<String>,
    pub status_code: Option<u16>,
    pub response_time_ms: u64,
    pub error: Option<String>,
}

impl ScrapedPage {
    pub fn success(&self) -> bool {
        self.content.len() >= 100 && self.error.is_none()
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ScrapeTimings {
    pub probe_time_ms: u64,
    pub main_scrape_time_ms: u64,
    pub subpages_time_ms: u64,
    pub total_time_ms: u64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct LinkFunnelCounts {
    pub links_found: usize,
    pub links_after_filter: usize,
    pub links_selected: usize,
    pub subpages_fetched: usize,
    pub subpages_succeeded: usize,
}

/// Aggregates the main page, subpage results, and timings for one company (§3).
#[derive(Debug, Clone, Serialize)]
pub struct ScrapeResult {
    pub company_url: String,
    pub main_page: Option<ScrapedPage>,
    pub subpages: Vec<ScrapedPage>,
    pub timings: ScrapeTimings,
    pub funnel: LinkFunnelCounts,
    pub strategy_used: Option<ScrapingStrategy>,
    /// Closed vocabulary: NO_RESPONSE | CLOUDFLARE | BLOCKED | TIMEOUT | EMPTY_CONTENT |
    /// SSL_ERROR | NOT_FOUND | OTHER. `None` when the main page succeeded.
    pub main_page_fail_reason: Option<String>,
}

impl ScrapeResult {
    pub fn new(company_url: impl Into<String>) -> Self {
        Self {
            company_url: company_url.into(),
            main_page: None,
            subpages: Vec::new(),
            timings: ScrapeTimings::default(),
            funnel: LinkFunnelCounts::default(),
            strategy_used: None,
            main_page_fail_reason: None,
        }
    }

    pub fn success(&self) -> bool {
        self.main_page.as_ref().is_some_and(ScrapedPage::success)
    }

    /// Concatenated text of every successfully fetched page, in fetch order, for C8 input.
    pub fn concatenated_text(&self) -> (String, Vec<String>) {
        let mut text = String::new();
        let mut sources = Vec::new();
        if let Some(main) = &self.main_page {
            if main.success() {
                text.push_str(&main.content);
                text.push('\n');
                sources.push(main.url.clone());
            }
        }
        for page in &self.subpages {
            if page.success() {
                text.push_str(&page.content);
                text.push('\n');
                sources.push(page.url.clone());
            }
        }
        (text, sources)
    }
}

//! Scraper: fetches a company's pages through the proxy pool, governor and breaker.

mod engine;
mod fetch;
mod links;

pub use engine::{Scraper, ScraperConfig};
pub use fetch::FetchOutcome;
pub use links::{extract_same_origin_links, extract_visible_text};

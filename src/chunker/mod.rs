//! Chunker: splits a scrape's extracted text into token-bounded, lossless chunks.

mod chunker;

pub use chunker::{ChunkerConfig, chunk_pages, chunk_scrape_result, estimate_tokens};

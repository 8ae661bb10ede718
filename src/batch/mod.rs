//! Batch processor: multi-instance, multi-worker orchestration over the scraper +
//! chunker pipeline, with cursor pagination and flush-buffer persistence.

mod processor;

pub use processor::{BatchProcessor, StartBatchResponse};

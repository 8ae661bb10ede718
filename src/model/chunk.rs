//! Chunk data model (§3 Chunk, §4.8 Chunker).

use serde::Serialize;

/// A token-bounded contiguous slice of preprocessed page text (§3).
///
/// Invariants enforced by the chunker, not by this type: `Σ len(content_i) ==
/// len(preprocessed_input)` and `token_count <= max_chunk_tokens` (with safety margin).
#[derive(Debug, Clone, Serialize)]
pub struct Chunk {
    pub index: usize,
    pub total_chunks: usize,
    pub content: String,
    pub token_count: usize,
    pub pages_included: Vec<String>,
}

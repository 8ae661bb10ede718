use crate::model::{Chunk, ScrapeResult};
use std::collections::HashSet;

/// A window used only for the repetition heuristic, not a real tokenizer unit.
const REPETITION_WINDOW_CHARS: usize = 80;

#[derive(Debug, Clone)]
pub struct ChunkerConfig {
    pub max_chunk_tokens: usize,
    /// Fixed allowance for a system prompt and per-message framing, subtracted from
    /// `max_chunk_tokens` before any chunk is sized (§4.8).
    pub overhead_tokens: usize,
    /// `estimate_tokens(s) = ceil(chars(s) / chars_per_token)` — a pluggable
    /// approximation (§9 design notes), conservative default 3.5.
    pub chars_per_token: f64,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            max_chunk_tokens: 2000,
            overhead_tokens: 0,
            chars_per_token: 3.5,
        }
    }
}

pub fn estimate_tokens(text: &str, chars_per_token: f64) -> usize {
    (text.chars().count() as f64 / chars_per_token).ceil() as usize
}

/// Deterministic preprocessing: trims each line and drops blank lines. Page text
/// arriving here has already had scripts/styles stripped and intra-line whitespace
/// collapsed during extraction (§4.7 step 3); this is the chunker's own, idempotent pass.
fn preprocess(text: &str) -> String {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// `1 - unique_line_ratio`, computed over fixed-width windows rather than newline-delimited
/// lines so that repetition is detected even in content with no line breaks at all (e.g. a
/// single very long repeated run).
fn repetition_rate(text: &str) -> f64 {
    let chars: Vec<char> = text.chars().collect();
    if chars.len() < REPETITION_WINDOW_CHARS * 2 {
        return 0.0;
    }
    let windows: Vec<String> = chars
        .chunks(REPETITION_WINDOW_CHARS)
        .map(|c| c.iter().collect())
        .collect();
    let total = windows.len();
    let unique = windows.iter().collect::<HashSet<_>>().len();
    1.0 - (unique as f64 / total as f64)
}

fn rfind_char_in_range(chars: &[char], start: usize, end: usize, target: char) -> Option<usize> {
    chars[start..end].iter().rposition(|&c| c == target).map(|i| start + i)
}

fn rfind_whitespace_in_range(chars: &[char], start: usize, end: usize) -> Option<usize> {
    chars[start..end]
        .iter()
        .rposition(|c| c.is_whitespace())
        .map(|i| start + i)
}

/// One page's contribution to the concatenated input, tracked by char offsets into the
/// preprocessed whole so each chunk can report which source pages it drew from.
struct PageSpan {
    start: usize,
    end: usize,
    url: String,
}

/// Splits the concatenated visible text of a scrape's successful pages into token-bounded,
/// lossless chunks (§4.8).
pub fn chunk_scrape_result(result: &ScrapeResult, config: &ChunkerConfig) -> Vec<Chunk> {
    let mut pages: Vec<(&str, &str)> = Vec::new();
    if let Some(main) = result.main_page.as_ref().filter(|p| p.success()) {
        pages.push((main.url.as_str(), main.content.as_str()));
    }
    for page in result.subpages.iter().filter(|p| p.success()) {
        pages.push((page.url.as_str(), page.content.as_str()));
    }
    chunk_pages(&pages, config)
}

/// Same as [`chunk_scrape_result`] but over raw `(url, text)` pairs, for direct testing
/// and reuse outside the scraper pipeline.
pub fn chunk_pages(pages: &[(&str, &str)], config: &ChunkerConfig) -> Vec<Chunk> {
    let mut prep = String::new();
    let mut spans = Vec::new();

    for (url, text) in pages {
        let cleaned = preprocess(text);
        if cleaned.is_empty() {
            continue;
        }
        if !prep.is_empty() {
            prep.push('\n');
        }
        let start = prep.chars().count();
        prep.push_str(&cleaned);
        let end = prep.chars().count();
        spans.push(PageSpan { start, end, url: (*url).to_string() });
    }

    if prep.is_empty() {
        return Vec::new();
    }

    let margin = (0.05 + 0.15 * repetition_rate(&prep)).clamp(0.05, 0.20);
    let effective_budget = config.max_chunk_tokens.saturating_sub(config.overhead_tokens).max(1);
    let working_budget = ((effective_budget as f64) * (1.0 - margin)).floor().max(1.0) as usize;

    let chars: Vec<char> = prep.chars().collect();
    let total_len = chars.len();
    let mut cursor = 0usize;
    let mut slices: Vec<(usize, usize)> = Vec::new();

    while cursor < total_len {
        let target_chars = ((working_budget as f64) * config.chars_per_token).floor().max(1.0) as usize;
        let mut end = (cursor + target_chars).min(total_len);

        if end < total_len {
            if let Some(nl) = rfind_char_in_range(&chars, cursor, end, '\n') {
                if nl + 1 > cursor {
                    end = nl + 1;
                }
            } else if let Some(ws) = rfind_whitespace_in_range(&chars, cursor, end) {
                if ws + 1 > cursor {
                    end = ws + 1;
                }
            }
        }
        if end <= cursor {
            end = (cursor + 1).min(total_len);
        }

        // Fractional reduction: 0.95, 0.90, ... 0.50.
        let mut fraction = 1.0_f64;
        loop {
            let candidate_len = end - cursor;
            let tokens = estimate_tokens(&chars[cursor..end].iter().collect::<String>(), config.chars_per_token);
            if tokens <= working_budget || fraction <= 0.5 || candidate_len <= 1 {
                break;
            }
            fraction -= 0.05;
            let reduced = ((candidate_len as f64) * fraction).floor().max(1.0) as usize;
            end = cursor + reduced;
        }

        // Chars-per-token ratio cut, derived from the chunk itself.
        let mut candidate: String = chars[cursor..end].iter().collect();
        let mut tokens = estimate_tokens(&candidate, config.chars_per_token);
        if tokens > working_budget && candidate.chars().count() > 1 {
            let observed_ratio = (candidate.chars().count() as f64 / tokens.max(1) as f64).max(1.0);
            let target_len = ((working_budget as f64) * observed_ratio).floor().max(1.0) as usize;
            end = cursor + target_len.min(end - cursor);
            candidate = chars[cursor..end].iter().collect();
            tokens = estimate_tokens(&candidate, config.chars_per_token);
        }

        // Fine-trim, 100 chars at a time.
        while tokens > working_budget && end > cursor + 1 {
            end = end.saturating_sub(100).max(cursor + 1);
            candidate = chars[cursor..end].iter().collect();
            tokens = estimate_tokens(&candidate, config.chars_per_token);
        }

        slices.push((cursor, end));
        cursor = end;
    }

    let total_chunks = slices.len();
    slices
        .into_iter()
        .enumerate()
        .map(|(index, (start, end))| {
            let content: String = chars[start..end].iter().collect();
            let token_count = estimate_tokens(&content, config.chars_per_token);
            let pages_included = spans
                .iter()
                .filter(|span| span.start < end && span.end > start)
                .map(|span| span.url.clone())
                .collect();
            Chunk {
                index,
                total_chunks,
                content,
                token_count,
                pages_included,
            }
        })
        .collect()
}

//! Overlapping, word-aligned text chunker.
//!
//! Splits each candidate row's text columns into [`Chunk`]s of roughly
//! `chunk_size_tokens` tokens, consecutive chunks sharing about
//! `overlap_tokens` tokens.
//!
//! # Algorithm
//!
//! 1. Convert tokens to characters using a 4 chars/token ratio.
//! 2. If the remaining text fits in one chunk, emit it and stop.
//! 3. Otherwise cut at `start + chunk_chars`, moved back to the nearest
//!    preceding whitespace (the raw boundary when the span has none).
//! 4. Advance by `(chunk_size - overlap) * 4` characters, never past the
//!    previous cut, and move the new start back to the beginning of the
//!    word it lands in. The move back never returns into the first word
//!    of the previous span; when it would, the raw position is kept.
//!
//! Step 4 guarantees that every character of the source lies inside at
//! least one span. Offsets are in characters, not bytes.
//!
//! # Example
//!
//! ```rust
//! use pgsemantic_core::chunk::chunk_text;
//!
//! let spans = chunk_text("Hello world.", 100, 25);
//! assert_eq!(spans.len(), 1);
//! assert_eq!(spans[0].text, "Hello world.");
//! ```

use crate::models::{CandidateRow, Chunk};

/// Approximate characters-per-token ratio.
pub const CHARS_PER_TOKEN: usize = 4;

/// One span of a source string.
#[derive(Debug, Clone, PartialEq)]
pub struct Span {
    /// Inclusive start, in characters.
    pub start: usize,
    /// Exclusive end, in characters.
    pub end: usize,
    /// The span's text with surrounding whitespace trimmed.
    pub text: String,
}

/// Estimated token count: `ceil(chars / 4)`, at least 1.
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(CHARS_PER_TOKEN).max(1)
}

/// Split `text` into overlapping spans. Whitespace-only spans are
/// dropped; an empty or blank input yields no spans.
pub fn chunk_text(text: &str, chunk_size_tokens: usize, overlap_tokens: usize) -> Vec<Span> {
    let chars: Vec<char> = text.chars().collect();
    let n = chars.len();
    let chunk_chars = chunk_size_tokens.max(1) * CHARS_PER_TOKEN;
    let step = chunk_size_tokens.saturating_sub(overlap_tokens).max(1) * CHARS_PER_TOKEN;

    let mut spans = Vec::new();
    let mut start = 0usize;

    while start < n {
        if n - start <= chunk_chars {
            push_span(&mut spans, &chars, start, n);
            break;
        }

        let raw_end = start + chunk_chars;
        let end = (start + 1..=raw_end)
            .rev()
            .find(|&i| chars[i].is_whitespace())
            .unwrap_or(raw_end);
        push_span(&mut spans, &chars, start, end);

        let raw_next = (start + step).min(end);
        start = if chars[raw_next - 1].is_whitespace() || chars[raw_next].is_whitespace() {
            raw_next
        } else {
            (first_word_end(&chars, start) + 1..=raw_next)
                .rev()
                .find(|&j| chars[j - 1].is_whitespace())
                .unwrap_or(raw_next)
        };
    }

    spans
}

/// Index just past the first word at or after `from`.
fn first_word_end(chars: &[char], from: usize) -> usize {
    let mut i = from;
    while i < chars.len() && chars[i].is_whitespace() {
        i += 1;
    }
    while i < chars.len() && !chars[i].is_whitespace() {
        i += 1;
    }
    i
}

fn push_span(spans: &mut Vec<Span>, chars: &[char], start: usize, end: usize) {
    let text: String = chars[start..end].iter().collect();
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return;
    }
    spans.push(Span {
        start,
        end,
        text: trimmed.to_string(),
    });
}

/// Chunk every non-null, non-blank text column of every candidate row.
///
/// Chunk indices restart at 0 for each (row, column) pair.
pub fn chunk_candidates(
    source_table: &str,
    rows: &[CandidateRow],
    text_columns: &[String],
    chunk_size_tokens: usize,
    overlap_tokens: usize,
) -> Vec<Chunk> {
    let mut chunks = Vec::new();
    for row in rows {
        for column in text_columns {
            let Some(Some(value)) = row.column_values.get(column) else {
                continue;
            };
            if value.trim().is_empty() {
                continue;
            }
            for (idx, span) in chunk_text(value, chunk_size_tokens, overlap_tokens)
                .into_iter()
                .enumerate()
            {
                chunks.push(Chunk {
                    source_table: source_table.to_string(),
                    source_column: column.clone(),
                    row_id: row.row_id.clone(),
                    origin_rank: row.rank,
                    chunk_index: idx,
                    estimated_tokens: estimate_tokens(&span.text),
                    text: span.text,
                    start: span.start,
                    end: span.end,
                });
            }
        }
    }
    chunks
}

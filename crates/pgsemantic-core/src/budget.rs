//! Greedy token-budget truncation.

use crate::models::SelectedChunk;

/// Keep chunks in order while the running estimated-token total stays
/// within `max_output_tokens`; stop at the first chunk that would overflow.
///
/// A first chunk that alone exceeds the budget yields an empty list.
pub fn allocate(selected: Vec<SelectedChunk>, max_output_tokens: usize) -> Vec<SelectedChunk> {
    let mut total = 0usize;
    let mut kept = Vec::new();
    for chunk in selected {
        let tokens = chunk.chunk().estimated_tokens;
        if total + tokens > max_output_tokens {
            break;
        }
        total += tokens;
        kept.push(chunk);
    }
    kept
}

/// Sum of estimated tokens over `chunks`.
pub fn total_tokens(chunks: &[SelectedChunk]) -> usize {
    chunks.iter().map(|c| c.chunk().estimated_tokens).sum()
}

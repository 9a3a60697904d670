//! Maximal Marginal Relevance selection.
//!
//! Takes the BM25-sorted chunks, keeps the top `max_candidates`, and
//! reorders them greedily so that each pick maximizes
//! `λ · relevance − (1 − λ) · max_sim(selected)`, where relevance is the
//! BM25 score normalized by the pool maximum and similarity is the
//! Jaccard ratio of the two chunks' term sets.

use std::collections::HashSet;

use crate::bm25::tokenize;
use crate::models::{ScoredChunk, SelectedChunk};

/// Jaccard similarity of two term sets. Two empty sets are identical.
pub fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.len() + b.len() - intersection;
    if union == 0 {
        return 0.0;
    }
    intersection as f64 / union as f64
}

/// Select and reorder up to `max_candidates` chunks from a BM25-sorted
/// list.
pub fn select(ranked: Vec<ScoredChunk>, lambda: f64, max_candidates: usize) -> Vec<SelectedChunk> {
    let pool: Vec<ScoredChunk> = ranked.into_iter().take(max_candidates).collect();
    if pool.is_empty() {
        return Vec::new();
    }

    let max_score = pool.iter().map(|c| c.bm25_score).fold(0.0f64, f64::max);
    let relevance: Vec<f64> = pool
        .iter()
        .map(|c| {
            if max_score > 0.0 {
                c.bm25_score / max_score
            } else {
                0.0
            }
        })
        .collect();
    let terms: Vec<HashSet<String>> = pool
        .iter()
        .map(|c| tokenize(&c.chunk.text).into_iter().collect())
        .collect();

    // Highest similarity of each candidate to anything selected so far.
    let mut max_sim = vec![0.0f64; pool.len()];
    let mut remaining: Vec<usize> = (0..pool.len()).collect();
    let mut order: Vec<usize> = Vec::with_capacity(pool.len());

    while !remaining.is_empty() {
        let mut best_pos = 0;
        let mut best_mmr = f64::NEG_INFINITY;
        for (pos, &idx) in remaining.iter().enumerate() {
            let mmr = lambda * relevance[idx] - (1.0 - lambda) * max_sim[idx];
            let best_idx = remaining[best_pos];
            let better = mmr > best_mmr
                || (mmr == best_mmr && relevance[idx] > relevance[best_idx]);
            if better {
                best_pos = pos;
                best_mmr = mmr;
            }
        }

        let chosen = remaining.remove(best_pos);
        for &idx in &remaining {
            let sim = jaccard(&terms[idx], &terms[chosen]);
            if sim > max_sim[idx] {
                max_sim[idx] = sim;
            }
        }
        order.push(chosen);
    }

    let mut slots: Vec<Option<ScoredChunk>> = pool.into_iter().map(Some).collect();
    order
        .into_iter()
        .enumerate()
        .filter_map(|(selection_order, idx)| {
            slots[idx].take().map(|scored| SelectedChunk {
                scored,
                selection_order,
            })
        })
        .collect()
}

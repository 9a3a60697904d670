//! BM25 lexical reranking of chunks.
//!
//! The chunk set of one request is the corpus: document frequencies and
//! the average length come from the chunks being ranked, not from any
//! global index. The score is independent of the vector distance of the
//! parent row.
//!
//! ```text
//! IDF(t)   = ln(1 + (N - DF(t) + 0.5) / (DF(t) + 0.5))
//! score(c) = Σ_{t in query} IDF(t) · TF·(k1+1) / (TF + k1·(1 - b + b·len/avgLen))
//! ```

use std::cmp::Ordering;
use std::collections::HashMap;

use crate::models::{Chunk, ScoredChunk};

/// Term-frequency saturation.
pub const K1: f64 = 1.5;
/// Length normalization.
pub const B: f64 = 0.75;

/// Lowercase and split on anything that is not a letter or digit.
///
/// ```rust
/// use pgsemantic_core::bm25::tokenize;
///
/// assert_eq!(tokenize("Hello, World-42!"), vec!["hello", "world", "42"]);
/// ```
pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Corpus statistics over the tokenized chunks of one request.
struct Corpus {
    docs: Vec<Vec<String>>,
    doc_freq: HashMap<String, usize>,
    avg_len: f64,
}

impl Corpus {
    fn new(chunks: &[Chunk]) -> Self {
        let docs: Vec<Vec<String>> = chunks.iter().map(|c| tokenize(&c.text)).collect();
        let mut doc_freq: HashMap<String, usize> = HashMap::new();
        for doc in &docs {
            let mut seen: Vec<&str> = Vec::new();
            for token in doc {
                if !seen.contains(&token.as_str()) {
                    seen.push(token);
                    *doc_freq.entry(token.clone()).or_insert(0) += 1;
                }
            }
        }
        let total: usize = docs.iter().map(Vec::len).sum();
        let avg_len = if docs.is_empty() {
            0.0
        } else {
            total as f64 / docs.len() as f64
        };
        Self {
            docs,
            doc_freq,
            avg_len,
        }
    }

    fn idf(&self, term: &str) -> f64 {
        let n = self.docs.len() as f64;
        let df = self.doc_freq.get(term).copied().unwrap_or(0) as f64;
        (1.0 + (n - df + 0.5) / (df + 0.5)).ln()
    }
}

/// BM25 score of one tokenized document.
///
/// Every query token contributes, so a term repeated in the query counts
/// once per occurrence.
pub fn score_tokens(
    query_tokens: &[String],
    doc_tokens: &[String],
    avg_len: f64,
    idf: impl Fn(&str) -> f64,
) -> f64 {
    if query_tokens.is_empty() || doc_tokens.is_empty() || avg_len <= 0.0 {
        return 0.0;
    }
    let mut tf: HashMap<&str, usize> = HashMap::new();
    for t in doc_tokens {
        *tf.entry(t.as_str()).or_insert(0) += 1;
    }
    let len = doc_tokens.len() as f64;
    let mut score = 0.0;
    for q in query_tokens {
        let Some(&freq) = tf.get(q.as_str()) else {
            continue;
        };
        let freq = freq as f64;
        let numerator = freq * (K1 + 1.0);
        let denominator = freq + K1 * (1.0 - B + B * len / avg_len);
        score += idf(q) * numerator / denominator;
    }
    score
}

/// Deterministic ordering: score descending, then
/// `(origin_rank, source_column, chunk_index)` ascending.
pub fn compare_scored(a: &ScoredChunk, b: &ScoredChunk) -> Ordering {
    b.bm25_score
        .total_cmp(&a.bm25_score)
        .then_with(|| a.chunk.origin_rank.cmp(&b.chunk.origin_rank))
        .then_with(|| a.chunk.source_column.cmp(&b.chunk.source_column))
        .then_with(|| a.chunk.chunk_index.cmp(&b.chunk.chunk_index))
}

/// Score every chunk against `query` and sort by [`compare_scored`].
pub fn rank_chunks(chunks: Vec<Chunk>, query: &str) -> Vec<ScoredChunk> {
    let query_tokens = tokenize(query);
    let corpus = Corpus::new(&chunks);

    let mut scored: Vec<ScoredChunk> = chunks
        .into_iter()
        .zip(corpus.docs.iter())
        .map(|(chunk, doc)| {
            let bm25_score =
                score_tokens(&query_tokens, doc, corpus.avg_len, |t| corpus.idf(t));
            ScoredChunk { chunk, bm25_score }
        })
        .collect();

    scored.sort_by(compare_scored);
    scored
}

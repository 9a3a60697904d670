//! Column binding: pair each vector column with the text it embeds and
//! weight the pairs.
//!
//! Pairing strips a known embedding suffix from the vector column name
//! (`body_embedding` → `body`) and looks for a text-typed column of that
//! name. When no vector column pairs up this way, every text column is
//! bound to every vector column instead.
//!
//! Each bound text column is then classified as title-like or
//! content-like from its name, its catalog comment, and (when available)
//! the average length of a few sampled values. Title bindings receive
//! [`BinderOptions::title_weight_multiplier`] times the weight of content
//! bindings, and the weights of one search are normalized to sum to 1.

use std::collections::HashMap;

use crate::error::SearchError;
use crate::models::{ColumnBinding, ColumnDescriptor, TableInfo};

/// Suffixes tried in order; the first case-insensitive match is removed.
const VECTOR_SUFFIXES: &[&str] = &[
    "_embedding",
    "_embeddings",
    "_vector",
    "_vectors",
    "_emb",
    "embedding",
    "vector",
];

const TITLE_INDICATORS: &[&str] = &["title", "name", "heading", "header", "subject", "label"];

const CONTENT_INDICATORS: &[&str] = &[
    "content", "text", "body", "description", "detail", "article", "document", "passage",
];

/// Maximum sampled rows per column considered for classification.
pub const MAX_SAMPLE_ROWS: usize = 3;
/// Maximum characters of one sampled value considered for classification.
pub const MAX_SAMPLE_CHARS: usize = 1000;

/// Tunables for title/content weighting.
#[derive(Debug, Clone, PartialEq)]
pub struct BinderOptions {
    /// Weight of a title binding relative to a content binding.
    pub title_weight_multiplier: f64,
    /// Sampled average length (chars) below which a column is title-like.
    pub title_length_threshold: usize,
    /// Sampled average length (chars) above which a column is content-like.
    pub content_length_threshold: usize,
}

impl Default for BinderOptions {
    fn default() -> Self {
        Self {
            title_weight_multiplier: 2.0,
            title_length_threshold: 80,
            content_length_threshold: 500,
        }
    }
}

/// A vector column paired with its text column, before weighting.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnPair {
    pub vector_column: String,
    pub text_column: String,
    pub dimension: Option<usize>,
}

/// Derive the text column name a vector column most likely embeds.
///
/// Returns `None` when no suffix matches or nothing is left after
/// stripping it.
pub fn infer_text_column_name(vector_column: &str) -> Option<String> {
    let lower = vector_column.to_ascii_lowercase();
    for suffix in VECTOR_SUFFIXES {
        if lower.ends_with(suffix) {
            let stem = &vector_column[..vector_column.len() - suffix.len()];
            let stem = stem.trim_end_matches('_');
            if stem.is_empty() {
                return None;
            }
            return Some(stem.to_string());
        }
    }
    None
}

/// Pair vector columns with text columns.
///
/// Fails with [`SearchError::NoVectorColumns`] when the table has no
/// vector column and [`SearchError::NoTextColumns`] when neither suffix
/// pairing nor the all-pairs fallback yields a binding.
pub fn resolve_pairs(table: &TableInfo) -> Result<Vec<ColumnPair>, SearchError> {
    let vectors: Vec<&ColumnDescriptor> = table.vector_columns().collect();
    if vectors.is_empty() {
        return Err(SearchError::NoVectorColumns {
            table: table.qualified_name(),
        });
    }

    let mut pairs = Vec::new();
    for vec_col in &vectors {
        let Some(stem) = infer_text_column_name(&vec_col.name) else {
            continue;
        };
        let text_col = table
            .columns
            .iter()
            .find(|c| c.is_text() && c.name.eq_ignore_ascii_case(&stem));
        if let Some(text_col) = text_col {
            pairs.push(ColumnPair {
                vector_column: vec_col.name.clone(),
                text_column: text_col.name.clone(),
                dimension: vec_col.dimension,
            });
        }
    }

    if pairs.is_empty() {
        for text_col in table.columns.iter().filter(|c| c.is_text()) {
            for vec_col in &vectors {
                pairs.push(ColumnPair {
                    vector_column: vec_col.name.clone(),
                    text_column: text_col.name.clone(),
                    dimension: vec_col.dimension,
                });
            }
        }
    }

    if pairs.is_empty() {
        return Err(SearchError::NoTextColumns {
            table: table.qualified_name(),
        });
    }
    Ok(pairs)
}

/// Distinct text columns of `pairs`, in first-seen order.
pub fn text_columns(pairs: &[ColumnPair]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for p in pairs {
        if !out.contains(&p.text_column) {
            out.push(p.text_column.clone());
        }
    }
    out
}

fn matches_any(name: &str, indicators: &[&str]) -> bool {
    let lower = name.to_ascii_lowercase();
    indicators.iter().any(|i| lower.contains(i))
}

/// Average character length of up to [`MAX_SAMPLE_ROWS`] samples, each
/// capped at [`MAX_SAMPLE_CHARS`]. `None` when no non-empty sample exists.
fn average_sample_length(samples: &[String]) -> Option<usize> {
    let lengths: Vec<usize> = samples
        .iter()
        .take(MAX_SAMPLE_ROWS)
        .map(|s| s.chars().take(MAX_SAMPLE_CHARS).count())
        .filter(|&n| n > 0)
        .collect();
    if lengths.is_empty() {
        return None;
    }
    Some(lengths.iter().sum::<usize>() / lengths.len())
}

/// Decide whether a text column holds titles rather than body content.
///
/// Column name first, then catalog comment. A sampled average length only
/// overrides that decision at the extremes: below
/// [`BinderOptions::title_length_threshold`] the column is a title, above
/// [`BinderOptions::content_length_threshold`] it is content. Lengths in
/// between leave the name and comment verdict alone.
pub fn is_title_column(
    column: &ColumnDescriptor,
    samples: Option<&[String]>,
    opts: &BinderOptions,
) -> bool {
    let mut is_title = matches_any(&column.name, TITLE_INDICATORS)
        && !matches_any(&column.name, CONTENT_INDICATORS);

    if let Some(desc) = &column.description {
        if matches_any(desc, &["title", "heading", "name"]) {
            is_title = true;
        }
    }

    if let Some(avg) = samples.and_then(average_sample_length) {
        if avg < opts.title_length_threshold {
            is_title = true;
        } else if avg > opts.content_length_threshold {
            is_title = false;
        }
    }

    is_title
}

/// Weight the pairs into bindings whose weights sum to 1.0.
pub fn assign_weights(
    table: &TableInfo,
    pairs: &[ColumnPair],
    samples: &HashMap<String, Vec<String>>,
    opts: &BinderOptions,
) -> Vec<ColumnBinding> {
    let mut bindings: Vec<ColumnBinding> = pairs
        .iter()
        .map(|p| {
            let is_title = table
                .column(&p.text_column)
                .map(|c| {
                    is_title_column(c, samples.get(&p.text_column).map(Vec::as_slice), opts)
                })
                .unwrap_or(false);
            ColumnBinding {
                vector_column: p.vector_column.clone(),
                text_column: Some(p.text_column.clone()),
                dimension: p.dimension,
                weight: if is_title {
                    opts.title_weight_multiplier
                } else {
                    1.0
                },
                is_title,
            }
        })
        .collect();
    normalize_weights(&mut bindings);
    bindings
}

/// Scale weights so they sum to 1.0. An all-zero set becomes uniform.
pub fn normalize_weights(bindings: &mut [ColumnBinding]) {
    if bindings.is_empty() {
        return;
    }
    let total: f64 = bindings.iter().map(|b| b.weight).sum();
    if total > 0.0 && total.is_finite() {
        for b in bindings.iter_mut() {
            b.weight /= total;
        }
    } else {
        let uniform = 1.0 / bindings.len() as f64;
        for b in bindings.iter_mut() {
            b.weight = uniform;
        }
    }
}

/// Resolve pairs and weight them in one step.
pub fn bind_columns(
    table: &TableInfo,
    samples: &HashMap<String, Vec<String>>,
    opts: &BinderOptions,
) -> Result<Vec<ColumnBinding>, SearchError> {
    let pairs = resolve_pairs(table)?;
    Ok(assign_weights(table, &pairs, samples, opts))
}

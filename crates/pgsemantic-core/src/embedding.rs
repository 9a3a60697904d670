//! Embedding trait and vector utilities.
//!
//! Defines the [`Embedder`] trait that all embedding backends implement,
//! plus pure helpers for the pgvector literal format and the three
//! distance metrics. Concrete providers (OpenAI, Voyage, Ollama) live in
//! the `pgsemantic` app crate.

use anyhow::Result;
use async_trait::async_trait;

use crate::models::DistanceMetric;

/// A query embedding backend.
///
/// One implementation per provider, chosen once from configuration. The
/// pipeline calls [`embed`](Embedder::embed) exactly once per search and
/// never retries.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Returns the model identifier (e.g. `"text-embedding-3-small"`).
    fn model_name(&self) -> &str;
    /// Returns the embedding vector dimensionality (e.g. `1536`).
    fn dimensions(&self) -> usize;
    /// Embed a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// Render a vector as a pgvector literal, `[v1,v2,...]`, with six fixed
/// decimals per component.
///
/// ```rust
/// use pgsemantic_core::embedding::format_vector_literal;
///
/// assert_eq!(format_vector_literal(&[0.5, -1.0]), "[0.500000,-1.000000]");
/// ```
pub fn format_vector_literal(vector: &[f32]) -> String {
    let parts: Vec<String> = vector.iter().map(|v| format!("{:.6}", v)).collect();
    format!("[{}]", parts.join(","))
}

/// Compute cosine similarity between two embedding vectors.
///
/// Returns `0.0` for empty vectors, vectors of different lengths, or a
/// zero-magnitude operand.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;

    for (x, y) in a.iter().zip(b.iter()) {
        let (x, y) = (*x as f64, *y as f64);
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f64::EPSILON {
        return 0.0;
    }

    dot / denom
}

/// Distance between two vectors under `metric`, matching pgvector's
/// operators: `1 - cos` for `<=>`, Euclidean for `<->`, negated dot
/// product for `<#>`.
pub fn distance(metric: DistanceMetric, a: &[f32], b: &[f32]) -> f64 {
    match metric {
        DistanceMetric::Cosine => 1.0 - cosine_similarity(a, b),
        DistanceMetric::L2 => a
            .iter()
            .zip(b.iter())
            .map(|(x, y)| {
                let d = *x as f64 - *y as f64;
                d * d
            })
            .sum::<f64>()
            .sqrt(),
        DistanceMetric::InnerProduct => -a
            .iter()
            .zip(b.iter())
            .map(|(x, y)| *x as f64 * *y as f64)
            .sum::<f64>(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vector_literal_precision() {
        assert_eq!(format_vector_literal(&[]), "[]");
        assert_eq!(
            format_vector_literal(&[0.1234567, 2.0]),
            "[0.123457,2.000000]"
        );
    }

    #[test]
    fn test_cosine_identical() {
        let v = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_cosine_orthogonal() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![0.0, 1.0, 0.0];
        assert!(cosine_similarity(&a, &b).abs() < 1e-9);
    }

    #[test]
    fn test_cosine_mismatched_lengths() {
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
    }

    #[test]
    fn test_distance_metrics() {
        let a = vec![1.0, 0.0];
        let b = vec![0.0, 1.0];
        assert!((distance(DistanceMetric::Cosine, &a, &b) - 1.0).abs() < 1e-9);
        assert!((distance(DistanceMetric::L2, &a, &b) - 2f64.sqrt()).abs() < 1e-9);
        assert!((distance(DistanceMetric::InnerProduct, &a, &a) + 1.0).abs() < 1e-9);
    }
}

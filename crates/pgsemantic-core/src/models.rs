//! Core data models used throughout the retrieval pipeline.
//!
//! All values here are request-scoped: they are created when a search
//! starts, flow through the stages in [`crate::search`], and are dropped
//! once the response is formatted. The only long-lived value is the
//! [`TableInfo`] catalog entry, which stores share read-only.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::SearchError;

// ============ Request configuration ============

/// Vector distance metric, one per pgvector comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceMetric {
    #[default]
    Cosine,
    L2,
    InnerProduct,
}

impl DistanceMetric {
    /// The pgvector operator implementing this metric.
    pub fn operator(&self) -> &'static str {
        match self {
            DistanceMetric::Cosine => "<=>",
            DistanceMetric::L2 => "<->",
            DistanceMetric::InnerProduct => "<#>",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DistanceMetric::Cosine => "cosine",
            DistanceMetric::L2 => "l2",
            DistanceMetric::InnerProduct => "inner_product",
        }
    }
}

impl fmt::Display for DistanceMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DistanceMetric {
    type Err = SearchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cosine" => Ok(DistanceMetric::Cosine),
            "l2" | "euclidean" => Ok(DistanceMetric::L2),
            "inner_product" | "inner" | "ip" => Ok(DistanceMetric::InnerProduct),
            other => Err(SearchError::InvalidRequest(format!(
                "unknown distance_metric '{}': use cosine, l2, or inner_product",
                other
            ))),
        }
    }
}

/// Per-request tunables for one similarity search.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchConfig {
    /// Rows fetched from the vector search.
    pub top_n: usize,
    /// Maximum tokens per chunk.
    pub chunk_size_tokens: usize,
    /// Tokens shared by consecutive chunks of one column.
    pub overlap_tokens: usize,
    /// MMR trade-off: `1.0` = pure relevance, `0.0` = maximum diversity.
    pub lambda: f64,
    /// Output budget in estimated tokens.
    pub max_output_tokens: usize,
    pub distance_metric: DistanceMetric,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            top_n: 10,
            chunk_size_tokens: 100,
            overlap_tokens: 25,
            lambda: 0.6,
            max_output_tokens: 1000,
            distance_metric: DistanceMetric::Cosine,
        }
    }
}

impl SearchConfig {
    /// Check `top_n > 0`, `chunk_size_tokens > 0`,
    /// `overlap_tokens < chunk_size_tokens` and `lambda ∈ [0, 1]`.
    pub fn validate(&self) -> Result<(), SearchError> {
        if self.top_n == 0 {
            return Err(SearchError::InvalidRequest("top_n must be > 0".to_string()));
        }
        if self.chunk_size_tokens == 0 {
            return Err(SearchError::InvalidRequest(
                "chunk_size_tokens must be > 0".to_string(),
            ));
        }
        if self.overlap_tokens >= self.chunk_size_tokens {
            return Err(SearchError::InvalidRequest(format!(
                "overlap_tokens ({}) must be smaller than chunk_size_tokens ({})",
                self.overlap_tokens, self.chunk_size_tokens
            )));
        }
        if !(0.0..=1.0).contains(&self.lambda) {
            return Err(SearchError::InvalidRequest(format!(
                "lambda must be within [0.0, 1.0], got {}",
                self.lambda
            )));
        }
        if self.max_output_tokens == 0 {
            return Err(SearchError::InvalidRequest(
                "max_output_tokens must be > 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Size of the MMR candidate pool: `max(10, 2 · max_output_tokens / chunk_size_tokens)`.
    pub fn max_candidates(&self) -> usize {
        let per_budget = 2 * self.max_output_tokens / self.chunk_size_tokens.max(1);
        per_budget.max(10)
    }
}

// ============ Table metadata ============

/// One column of a table as described by the store's catalog.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnDescriptor {
    pub name: String,
    /// Declared type as rendered by the catalog (e.g. `text`, `vector(1536)`).
    pub data_type: String,
    pub is_vector: bool,
    /// Declared vector dimensionality, when the type carries one.
    pub dimension: Option<usize>,
    pub is_primary_key: bool,
    /// Column comment, if any.
    pub description: Option<String>,
}

impl ColumnDescriptor {
    /// Plain text column (text/varchar/char family), excluding vectors.
    pub fn is_text(&self) -> bool {
        if self.is_vector {
            return false;
        }
        let lower = self.data_type.to_ascii_lowercase();
        ["text", "character varying", "varchar", "character", "char"]
            .iter()
            .any(|t| lower.contains(t))
    }
}

/// Catalog entry for one table, view, or materialized view.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableInfo {
    pub schema: String,
    pub name: String,
    pub columns: Vec<ColumnDescriptor>,
}

impl TableInfo {
    /// `schema.name`.
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.schema, self.name)
    }

    pub fn column(&self, name: &str) -> Option<&ColumnDescriptor> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn vector_columns(&self) -> impl Iterator<Item = &ColumnDescriptor> {
        self.columns.iter().filter(|c| c.is_vector)
    }

    /// Column used as the row identifier and deterministic tie-breaker:
    /// the first primary-key column, else a column named `id`.
    pub fn row_key(&self) -> Option<&ColumnDescriptor> {
        self.columns
            .iter()
            .find(|c| c.is_primary_key)
            .or_else(|| self.columns.iter().find(|c| c.name == "id"))
    }
}

/// A `schema.table` reference parsed from user input.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableRef {
    pub schema: String,
    pub name: String,
}

impl TableRef {
    /// Parse `table` or `schema.table`; bare names resolve to `public`.
    pub fn parse(input: &str) -> Result<Self, SearchError> {
        let trimmed = input.trim();
        let (schema, name) = match trimmed.split_once('.') {
            Some((s, n)) => (s.trim(), n.trim()),
            None => ("public", trimmed),
        };
        if schema.is_empty() || name.is_empty() || name.contains('.') {
            return Err(SearchError::InvalidRequest(format!(
                "table_name '{}' must be 'table' or 'schema.table'",
                input
            )));
        }
        Ok(Self {
            schema: schema.to_string(),
            name: name.to_string(),
        })
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.schema, self.name)
    }
}

// ============ Pipeline values ============

/// One vector column paired with the text column it embeds.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnBinding {
    pub vector_column: String,
    /// Paired text column; `None` when the vector has no readable source text.
    pub text_column: Option<String>,
    pub dimension: Option<usize>,
    /// Relevance weight; all bindings of one search sum to 1.0.
    pub weight: f64,
    pub is_title: bool,
}

/// A row returned by the candidate retriever.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CandidateRow {
    /// Primary key rendered as text (or the rank when the table has none).
    pub row_id: String,
    /// 0-based position in ascending combined-distance order.
    pub rank: usize,
    /// Text column values; `None` for SQL NULL.
    pub column_values: BTreeMap<String, Option<String>>,
    pub combined_distance: f64,
}

/// A span of one candidate row's text column.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Chunk {
    pub source_table: String,
    pub source_column: String,
    pub row_id: String,
    pub origin_rank: usize,
    pub chunk_index: usize,
    pub text: String,
    /// Span start in characters, inclusive.
    pub start: usize,
    /// Span end in characters, exclusive.
    pub end: usize,
    pub estimated_tokens: usize,
}

/// A [`Chunk`] with its lexical relevance.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredChunk {
    #[serde(flatten)]
    pub chunk: Chunk,
    pub bm25_score: f64,
}

/// A [`ScoredChunk`] chosen by the diversity selector.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SelectedChunk {
    #[serde(flatten)]
    pub scored: ScoredChunk,
    pub selection_order: usize,
}

impl SelectedChunk {
    pub fn chunk(&self) -> &Chunk {
        &self.scored.chunk
    }

    pub fn score(&self) -> f64 {
        self.scored.bm25_score
    }
}

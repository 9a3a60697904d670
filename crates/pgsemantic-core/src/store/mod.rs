//! Storage abstraction for semantic search.
//!
//! The [`Store`] trait covers the read-only operations the pipeline
//! needs from a database: catalog lookups, an optional text sample for
//! column classification, and the single weighted nearest-neighbour
//! query. The PostgreSQL implementation lives in the `pgsemantic` app
//! crate; [`memory::InMemoryStore`] backs the tests.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{CandidateRow, ColumnBinding, DistanceMetric, TableInfo, TableRef};

/// Everything needed to run the candidate retrieval query.
#[derive(Debug, Clone)]
pub struct CandidateQuery {
    pub table: TableInfo,
    /// Bindings with their final (dimension-filtered, renormalized) weights.
    pub bindings: Vec<ColumnBinding>,
    /// Text columns to return with each row.
    pub text_columns: Vec<String>,
    pub query_vector: Vec<f32>,
    pub metric: DistanceMetric,
    pub limit: usize,
}

impl CandidateQuery {
    /// Total weight per vector column, in first-seen order.
    ///
    /// Several bindings can share a vector column (one per paired text
    /// column); their weights add up.
    pub fn vector_weights(&self) -> Vec<(String, f64)> {
        let mut out: Vec<(String, f64)> = Vec::new();
        for b in &self.bindings {
            match out.iter_mut().find(|(name, _)| *name == b.vector_column) {
                Some((_, w)) => *w += b.weight,
                None => out.push((b.vector_column.clone(), b.weight)),
            }
        }
        out
    }
}

/// Abstract read-only database backend.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`table_info`](Store::table_info) | Catalog entry for one table |
/// | [`list_tables`](Store::list_tables) | All catalogued tables |
/// | [`sample_text`](Store::sample_text) | A few values per text column |
/// | [`fetch_candidates`](Store::fetch_candidates) | Weighted vector search |
#[async_trait]
pub trait Store: Send + Sync {
    /// Human-readable identity of the backing database with any
    /// credentials removed.
    fn label(&self) -> String;

    /// Look up a table. `Ok(None)` when it does not exist.
    async fn table_info(&self, table: &TableRef) -> Result<Option<TableInfo>>;

    /// Every table known to the store, vector-enabled or not.
    async fn list_tables(&self) -> Result<Vec<TableInfo>>;

    /// Up to `limit` values per requested text column.
    async fn sample_text(
        &self,
        table: &TableInfo,
        columns: &[String],
        limit: usize,
    ) -> Result<HashMap<String, Vec<String>>>;

    /// Run the weighted distance query: rows ordered by ascending
    /// combined distance (ties by the table's row key), at most
    /// `query.limit`, ranks assigned 0..n-1.
    async fn fetch_candidates(&self, query: &CandidateQuery) -> Result<Vec<CandidateRow>>;
}

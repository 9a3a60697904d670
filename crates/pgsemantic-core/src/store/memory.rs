//! In-memory [`Store`] implementation for testing.
//!
//! Tables and rows live behind `std::sync::RwLock`. Candidate retrieval is
//! a brute-force scan computing the same weighted distance the SQL query
//! computes; ties keep insertion order. Rows missing any bound vector are
//! skipped.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::RwLock;

use anyhow::{bail, Result};
use async_trait::async_trait;

use crate::embedding::distance;
use crate::models::{CandidateRow, TableInfo, TableRef};

use super::{CandidateQuery, Store};

/// One row of an in-memory table.
#[derive(Debug, Clone, Default)]
pub struct MemoryRow {
    pub id: String,
    pub text: HashMap<String, Option<String>>,
    pub vectors: HashMap<String, Vec<f32>>,
}

impl MemoryRow {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    pub fn text(mut self, column: &str, value: &str) -> Self {
        self.text.insert(column.to_string(), Some(value.to_string()));
        self
    }

    pub fn null(mut self, column: &str) -> Self {
        self.text.insert(column.to_string(), None);
        self
    }

    pub fn vector(mut self, column: &str, value: Vec<f32>) -> Self {
        self.vectors.insert(column.to_string(), value);
        self
    }
}

struct StoredTable {
    info: TableInfo,
    rows: Vec<MemoryRow>,
}

/// In-memory store for tests.
pub struct InMemoryStore {
    tables: RwLock<Vec<StoredTable>>,
    fetches: AtomicUsize,
    fail_queries: AtomicBool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(Vec::new()),
            fetches: AtomicUsize::new(0),
            fail_queries: AtomicBool::new(false),
        }
    }

    /// Register a table, replacing any previous one with the same name.
    pub fn add_table(&self, info: TableInfo) {
        let mut tables = self.tables.write().unwrap();
        tables.retain(|t| !(t.info.schema == info.schema && t.info.name == info.name));
        tables.push(StoredTable {
            info,
            rows: Vec::new(),
        });
    }

    /// Append a row to a registered table (`schema.name` or bare name).
    pub fn insert_row(&self, table: &str, row: MemoryRow) -> Result<()> {
        let table_ref = TableRef::parse(table)?;
        let mut tables = self.tables.write().unwrap();
        let Some(stored) = tables
            .iter_mut()
            .find(|t| t.info.schema == table_ref.schema && t.info.name == table_ref.name)
        else {
            bail!("unknown table {}", table_ref);
        };
        stored.rows.push(row);
        Ok(())
    }

    /// Number of candidate queries served so far.
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    /// Make every subsequent candidate query fail.
    pub fn set_fail_queries(&self, fail: bool) {
        self.fail_queries.store(fail, Ordering::SeqCst);
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Store for InMemoryStore {
    fn label(&self) -> String {
        "in-memory".to_string()
    }

    async fn table_info(&self, table: &TableRef) -> Result<Option<TableInfo>> {
        let tables = self.tables.read().unwrap();
        Ok(tables
            .iter()
            .find(|t| t.info.schema == table.schema && t.info.name == table.name)
            .map(|t| t.info.clone()))
    }

    async fn list_tables(&self) -> Result<Vec<TableInfo>> {
        let tables = self.tables.read().unwrap();
        Ok(tables.iter().map(|t| t.info.clone()).collect())
    }

    async fn sample_text(
        &self,
        table: &TableInfo,
        columns: &[String],
        limit: usize,
    ) -> Result<HashMap<String, Vec<String>>> {
        let tables = self.tables.read().unwrap();
        let mut out = HashMap::new();
        let Some(stored) = tables
            .iter()
            .find(|t| t.info.schema == table.schema && t.info.name == table.name)
        else {
            return Ok(out);
        };
        for col in columns {
            let values: Vec<String> = stored
                .rows
                .iter()
                .filter_map(|r| r.text.get(col).cloned().flatten())
                .take(limit)
                .collect();
            out.insert(col.clone(), values);
        }
        Ok(out)
    }

    async fn fetch_candidates(&self, query: &CandidateQuery) -> Result<Vec<CandidateRow>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if self.fail_queries.load(Ordering::SeqCst) {
            bail!("simulated query failure");
        }

        let tables = self.tables.read().unwrap();
        let Some(stored) = tables
            .iter()
            .find(|t| t.info.schema == query.table.schema && t.info.name == query.table.name)
        else {
            bail!("relation \"{}\" does not exist", query.table.qualified_name());
        };

        let weights = query.vector_weights();
        let mut scored: Vec<(usize, f64)> = Vec::new();
        'rows: for (pos, row) in stored.rows.iter().enumerate() {
            let mut combined = 0.0;
            for (column, weight) in &weights {
                let Some(v) = row.vectors.get(column) else {
                    continue 'rows;
                };
                combined += weight * distance(query.metric, &query.query_vector, v);
            }
            scored.push((pos, combined));
        }
        scored.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));

        Ok(scored
            .into_iter()
            .take(query.limit)
            .enumerate()
            .map(|(rank, (pos, combined))| {
                let row = &stored.rows[pos];
                let column_values: BTreeMap<String, Option<String>> = query
                    .text_columns
                    .iter()
                    .map(|c| (c.clone(), row.text.get(c).cloned().flatten()))
                    .collect();
                CandidateRow {
                    row_id: row.id.clone(),
                    rank,
                    column_values,
                    combined_distance: combined,
                }
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ColumnBinding, ColumnDescriptor, DistanceMetric};

    fn column(name: &str, ty: &str, dims: Option<usize>) -> ColumnDescriptor {
        ColumnDescriptor {
            name: name.to_string(),
            data_type: ty.to_string(),
            is_vector: dims.is_some(),
            dimension: dims,
            is_primary_key: name == "id",
            description: None,
        }
    }

    fn setup() -> InMemoryStore {
        let store = InMemoryStore::new();
        store.add_table(TableInfo {
            schema: "public".to_string(),
            name: "docs".to_string(),
            columns: vec![
                column("id", "integer", None),
                column("content", "text", None),
                column("content_embedding", "vector(2)", Some(2)),
            ],
        });
        store
            .insert_row(
                "docs",
                MemoryRow::new("1")
                    .text("content", "far")
                    .vector("content_embedding", vec![0.0, 1.0]),
            )
            .unwrap();
        store
            .insert_row(
                "docs",
                MemoryRow::new("2")
                    .text("content", "near")
                    .vector("content_embedding", vec![1.0, 0.0]),
            )
            .unwrap();
        store
            .insert_row("docs", MemoryRow::new("3").text("content", "no vector"))
            .unwrap();
        store
    }

    fn query(table: TableInfo) -> CandidateQuery {
        CandidateQuery {
            table,
            bindings: vec![ColumnBinding {
                vector_column: "content_embedding".to_string(),
                text_column: Some("content".to_string()),
                dimension: Some(2),
                weight: 1.0,
                is_title: false,
            }],
            text_columns: vec!["content".to_string()],
            query_vector: vec![1.0, 0.0],
            metric: DistanceMetric::Cosine,
            limit: 10,
        }
    }

    #[tokio::test]
    async fn test_fetch_orders_by_distance() {
        let store = setup();
        let info = store
            .table_info(&TableRef::parse("docs").unwrap())
            .await
            .unwrap()
            .unwrap();
        let rows = store.fetch_candidates(&query(info)).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].row_id, "2");
        assert_eq!(rows[0].rank, 0);
        assert!(rows[0].combined_distance.abs() < 1e-9);
        assert_eq!(rows[1].row_id, "1");
        assert_eq!(store.fetch_count(), 1);
    }

    #[tokio::test]
    async fn test_sample_text_limits_rows() {
        let store = setup();
        let info = store.list_tables().await.unwrap().remove(0);
        let samples = store
            .sample_text(&info, &["content".to_string()], 2)
            .await
            .unwrap();
        assert_eq!(samples["content"], vec!["far".to_string(), "near".to_string()]);
    }

    #[tokio::test]
    async fn test_failure_switch() {
        let store = setup();
        let info = store.list_tables().await.unwrap().remove(0);
        store.set_fail_queries(true);
        assert!(store.fetch_candidates(&query(info)).await.is_err());
    }

    #[test]
    fn test_insert_into_unknown_table() {
        let store = InMemoryStore::new();
        assert!(store.insert_row("missing", MemoryRow::new("1")).is_err());
    }
}

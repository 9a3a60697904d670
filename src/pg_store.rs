//! PostgreSQL + pgvector implementation of the core [`Store`] trait.
//!
//! The catalog (every user table, view, and materialized view with its
//! columns) is read once when the store is created and then served from
//! memory. Each search costs at most two further statements: an optional
//! text sample built by [`build_sample_sql`] and the weighted distance
//! query built by [`build_candidate_sql`].

use std::collections::{BTreeMap, HashMap};

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::postgres::PgPool;
use sqlx::Row;
use tracing::{debug, info};

use pgsemantic_core::binder::MAX_SAMPLE_CHARS;
use pgsemantic_core::embedding::format_vector_literal;
use pgsemantic_core::models::{CandidateRow, ColumnDescriptor, TableInfo, TableRef};
use pgsemantic_core::store::{CandidateQuery, Store};

use crate::config::DatabaseConfig;
use crate::db;

const CATALOG_SQL: &str = r#"
SELECT
    n.nspname::text AS schema_name,
    c.relname::text AS table_name,
    a.attname::text AS column_name,
    format_type(a.atttypid, a.atttypmod) AS data_type,
    t.typname::text AS type_name,
    COALESCE(pk.is_pk, false) AS is_pk,
    col_description(c.oid, a.attnum) AS description
FROM pg_class c
JOIN pg_namespace n ON n.oid = c.relnamespace
JOIN pg_attribute a ON a.attrelid = c.oid
JOIN pg_type t ON t.oid = a.atttypid
LEFT JOIN LATERAL (
    SELECT true AS is_pk
    FROM pg_constraint con
    WHERE con.conrelid = c.oid
      AND con.contype = 'p'
      AND a.attnum = ANY(con.conkey)
    LIMIT 1
) pk ON true
WHERE c.relkind IN ('r', 'v', 'm', 'p')
  AND a.attnum > 0
  AND NOT a.attisdropped
  AND n.nspname NOT IN ('pg_catalog', 'information_schema')
  AND n.nspname NOT LIKE 'pg_toast%'
ORDER BY n.nspname, c.relname, a.attnum
"#;

/// Quote an SQL identifier, doubling embedded quotes.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn qualified_ident(table: &TableInfo) -> String {
    format!("{}.{}", quote_ident(&table.schema), quote_ident(&table.name))
}

/// Dimension declared by a `vector(N)` type, if any.
pub fn parse_vector_dimension(data_type: &str) -> Option<usize> {
    let inner = data_type
        .trim()
        .strip_prefix("vector(")?
        .strip_suffix(')')?;
    inner.trim().parse().ok()
}

/// The single retrieval statement: text columns in positions `2..`, row
/// key in position 0, combined distance in position 1.
///
/// `$1` is the query vector literal and `$2` the row limit.
pub fn build_candidate_sql(query: &CandidateQuery) -> String {
    let op = query.metric.operator();
    let weights = query.vector_weights();

    let distance_terms: Vec<String> = weights
        .iter()
        .map(|(column, weight)| format!("({} {} $1::vector) * {}", quote_ident(column), op, weight))
        .collect();
    let not_null: Vec<String> = weights
        .iter()
        .map(|(column, _)| format!("{} IS NOT NULL", quote_ident(column)))
        .collect();

    let mut select = Vec::with_capacity(query.text_columns.len() + 2);
    let row_key = query.table.row_key();
    select.push(match row_key {
        Some(key) => format!("{}::text AS row_id", quote_ident(&key.name)),
        None => "NULL::text AS row_id".to_string(),
    });
    select.push(format!("({}) AS weighted_distance", distance_terms.join(" + ")));
    for col in &query.text_columns {
        select.push(format!("{}::text", quote_ident(col)));
    }

    let order = match row_key {
        Some(key) => format!("weighted_distance, {}", quote_ident(&key.name)),
        None => "weighted_distance".to_string(),
    };

    format!(
        "SELECT {} FROM {} WHERE {} ORDER BY {} LIMIT $2",
        select.join(", "),
        qualified_ident(&query.table),
        not_null.join(" AND "),
        order
    )
}

/// The sampling statement: up to `$1` non-null values per column, each
/// cut to [`MAX_SAMPLE_CHARS`] characters. Position 0 is the index of the
/// column in `columns`, position 1 the value.
pub fn build_sample_sql(table: &TableInfo, columns: &[String]) -> String {
    let parts: Vec<String> = columns
        .iter()
        .enumerate()
        .map(|(i, c)| {
            let col = quote_ident(c);
            format!(
                "(SELECT {} AS column_index, left({}::text, {}) AS sample FROM {} WHERE {} IS NOT NULL LIMIT $1)",
                i,
                col,
                MAX_SAMPLE_CHARS,
                qualified_ident(table),
                col
            )
        })
        .collect();
    parts.join(" UNION ALL ")
}

/// Read-only store over one PostgreSQL database.
pub struct PgStore {
    pool: PgPool,
    label: String,
    catalog: Vec<TableInfo>,
}

impl PgStore {
    /// Connect and load the catalog.
    pub async fn connect(db: &DatabaseConfig) -> Result<Self> {
        let pool = db::connect(db).await?;
        let catalog = load_catalog(&pool).await?;
        info!(
            database = %db::sanitize_url(&db.url),
            tables = catalog.len(),
            "catalog loaded"
        );
        Ok(Self {
            pool,
            label: db::sanitize_url(&db.url),
            catalog,
        })
    }
}

/// Read every user table, view, and materialized view with its columns.
pub async fn load_catalog(pool: &PgPool) -> Result<Vec<TableInfo>> {
    let rows = sqlx::query(CATALOG_SQL)
        .fetch_all(pool)
        .await
        .context("Failed to read table catalog")?;

    let mut tables: Vec<TableInfo> = Vec::new();
    for row in rows {
        let schema: String = row.try_get("schema_name")?;
        let name: String = row.try_get("table_name")?;
        let data_type: String = row.try_get("data_type")?;
        let type_name: String = row.try_get("type_name")?;
        let is_vector = type_name == "vector";
        let column = ColumnDescriptor {
            name: row.try_get("column_name")?,
            dimension: if is_vector {
                parse_vector_dimension(&data_type)
            } else {
                None
            },
            data_type,
            is_vector,
            is_primary_key: row.try_get("is_pk")?,
            description: row.try_get("description")?,
        };

        match tables.last_mut() {
            Some(t) if t.schema == schema && t.name == name => t.columns.push(column),
            _ => tables.push(TableInfo {
                schema,
                name,
                columns: vec![column],
            }),
        }
    }
    Ok(tables)
}

#[async_trait]
impl Store for PgStore {
    fn label(&self) -> String {
        self.label.clone()
    }

    async fn table_info(&self, table: &TableRef) -> Result<Option<TableInfo>> {
        Ok(self
            .catalog
            .iter()
            .find(|t| t.schema == table.schema && t.name == table.name)
            .cloned())
    }

    async fn list_tables(&self) -> Result<Vec<TableInfo>> {
        Ok(self.catalog.clone())
    }

    async fn sample_text(
        &self,
        table: &TableInfo,
        columns: &[String],
        limit: usize,
    ) -> Result<HashMap<String, Vec<String>>> {
        let mut out: HashMap<String, Vec<String>> = HashMap::new();
        if columns.is_empty() {
            return Ok(out);
        }
        let sql = build_sample_sql(table, columns);
        let rows = sqlx::query(&sql)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;

        for row in rows {
            let index: i32 = row.try_get(0)?;
            let value: Option<String> = row.try_get(1)?;
            let Some(col) = usize::try_from(index).ok().and_then(|i| columns.get(i)) else {
                continue;
            };
            if let Some(v) = value {
                out.entry(col.clone()).or_default().push(v);
            }
        }
        Ok(out)
    }

    async fn fetch_candidates(&self, query: &CandidateQuery) -> Result<Vec<CandidateRow>> {
        let sql = build_candidate_sql(query);
        debug!(sql = %sql, "candidate query");

        let rows = sqlx::query(&sql)
            .bind(format_vector_literal(&query.query_vector))
            .bind(query.limit as i64)
            .fetch_all(&self.pool)
            .await?;

        let mut candidates = Vec::with_capacity(rows.len());
        for (rank, row) in rows.into_iter().enumerate() {
            let row_id: Option<String> = row.try_get(0)?;
            let combined_distance: f64 = row.try_get(1)?;
            let mut column_values = BTreeMap::new();
            for (i, col) in query.text_columns.iter().enumerate() {
                let value: Option<String> = row.try_get(i + 2)?;
                column_values.insert(col.clone(), value);
            }
            candidates.push(CandidateRow {
                row_id: row_id.unwrap_or_else(|| rank.to_string()),
                rank,
                column_values,
                combined_distance,
            });
        }
        Ok(candidates)
    }
}

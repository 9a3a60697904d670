//! Error taxonomy for the retrieval pipeline.
//!
//! Every variant is user-actionable: it carries a stable machine code
//! ([`SearchError::code`]) and a remediation hint ([`SearchError::hint`])
//! that the tool layer renders into a diagnostic response. Empty results
//! and exhausted budgets are not errors; see
//! [`SearchOutcome`](crate::search::SearchOutcome).

use thiserror::Error;

/// Errors that abort a similarity search request.
#[derive(Debug, Error)]
pub enum SearchError {
    /// A request parameter is out of range or malformed.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The requested table is not present in the catalog.
    #[error("table '{table}' not found")]
    TableNotFound { table: String },

    /// The table has no pgvector-typed columns.
    #[error("no vector columns found in table '{table}'")]
    NoVectorColumns { table: String },

    /// No text column could be paired with any vector column.
    #[error("no text columns found corresponding to vector columns in table '{table}'")]
    NoTextColumns { table: String },

    /// The query embedding does not match any bound vector column.
    #[error(
        "query embedding has {query_dims} dimensions but vector columns expect {}",
        format_dims(.column_dims)
    )]
    DimensionMismatch {
        query_dims: usize,
        column_dims: Vec<usize>,
    },

    /// The embedding collaborator failed.
    #[error("failed to generate query embedding: {0}")]
    EmbeddingGenerationFailed(String),

    /// The store rejected or failed the query.
    #[error("query execution failed: {0}")]
    QueryExecutionFailed(String),

    /// The request was cancelled or timed out before completing.
    #[error("search cancelled: {0}")]
    Cancelled(String),
}

fn format_dims(dims: &[usize]) -> String {
    dims.iter()
        .map(|d| d.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

impl SearchError {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            SearchError::InvalidRequest(_) => "invalid_request",
            SearchError::TableNotFound { .. } => "table_not_found",
            SearchError::NoVectorColumns { .. } => "no_vector_columns",
            SearchError::NoTextColumns { .. } => "no_text_columns",
            SearchError::DimensionMismatch { .. } => "dimension_mismatch",
            SearchError::EmbeddingGenerationFailed(_) => "embedding_failed",
            SearchError::QueryExecutionFailed(_) => "query_failed",
            SearchError::Cancelled(_) => "cancelled",
        }
    }

    /// Remediation text shown to the caller alongside the error.
    pub fn hint(&self) -> String {
        match self {
            SearchError::InvalidRequest(_) => {
                "Check the request parameters: top_n and chunk_size_tokens must be positive, \
                 lambda must be within [0, 1], distance_metric must be cosine, l2 or inner_product."
                    .to_string()
            }
            SearchError::TableNotFound { table } => format!(
                "The table may be misspelled, live in another schema (use 'schema.table'), \
                 or belong to a different database. List vector-enabled tables with \
                 list_vector_tables(), or retry with similarity_search(table_name=\"schema_name.{}\").",
                table.rsplit_once('.').map_or(table.as_str(), |(_, name)| name)
            ),
            SearchError::NoVectorColumns { .. } => {
                "This tool needs a table with pgvector columns. Find candidates with \
                 list_vector_tables(); if none exist, the pgvector extension may be missing \
                 (CREATE EXTENSION vector)."
                    .to_string()
            }
            SearchError::NoTextColumns { .. } => {
                "Vector columns store embeddings; the source text must live in a companion \
                 text column, e.g. 'content_embedding' -> 'content' or 'title_vector' -> 'title'. \
                 Try another table from list_vector_tables()."
                    .to_string()
            }
            SearchError::DimensionMismatch { .. } => {
                "The configured embedding model produces vectors of a different size than the \
                 table's vector columns. Configure the model that was used to build the embeddings."
                    .to_string()
            }
            SearchError::EmbeddingGenerationFailed(_) => {
                "Check the embedding configuration: provider enabled, API key present, \
                 and the embedding service reachable."
                    .to_string()
            }
            SearchError::QueryExecutionFailed(_) => {
                "The similarity query failed in the database. Check permissions, that the \
                 pgvector extension is installed, and that the table has not changed."
                    .to_string()
            }
            SearchError::Cancelled(_) => {
                "The request was cancelled before completion. Retry, or lower top_n to make \
                 the search cheaper."
                    .to_string()
            }
        }
    }
}

/// Convenience result type for the pipeline.
pub type Result<T> = std::result::Result<T, SearchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dimension_mismatch_message() {
        let err = SearchError::DimensionMismatch {
            query_dims: 3,
            column_dims: vec![4, 1536],
        };
        assert_eq!(
            err.to_string(),
            "query embedding has 3 dimensions but vector columns expect 4, 1536"
        );
        assert_eq!(err.code(), "dimension_mismatch");
    }

    #[test]
    fn test_table_hint_mentions_table() {
        let err = SearchError::TableNotFound {
            table: "articles".to_string(),
        };
        assert!(err.hint().contains("schema_name.articles"));
    }

    #[test]
    fn test_table_hint_drops_given_schema() {
        let err = SearchError::TableNotFound {
            table: "public.articles".to_string(),
        };
        let hint = err.hint();
        assert!(hint.contains("schema_name.articles"));
        assert!(!hint.contains("schema_name.public.articles"));
    }
}

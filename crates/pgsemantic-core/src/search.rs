//! The search pipeline: binding, retrieval, chunking, BM25, MMR, budget.
//!
//! [`run_search`] drives the six stages for one request against any
//! [`Store`] and [`Embedder`]. It performs at most two store round trips
//! (an optional text sample and the candidate query) and one embedding
//! call. Dropping the returned future cancels whichever of those is in
//! flight; no partial report is produced.

use serde::Serialize;
use tracing::{debug, warn};

use crate::binder::{self, BinderOptions};
use crate::bm25;
use crate::budget;
use crate::chunk;
use crate::embedding::Embedder;
use crate::error::{Result, SearchError};
use crate::mmr;
use crate::models::{CandidateRow, ColumnBinding, SearchConfig, SelectedChunk, TableRef};
use crate::store::{CandidateQuery, Store};

/// One similarity search request.
#[derive(Debug, Clone)]
pub struct SearchRequest {
    /// `table` or `schema.table`.
    pub table: String,
    pub query: String,
    pub config: SearchConfig,
    pub binder: BinderOptions,
    /// Rows sampled per text column for title detection; 0 disables the
    /// sampling round trip.
    pub sample_rows: usize,
}

impl SearchRequest {
    pub fn new(table: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            query: query.into(),
            config: SearchConfig::default(),
            binder: BinderOptions::default(),
            sample_rows: binder::MAX_SAMPLE_ROWS,
        }
    }
}

/// How a successful search ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchOutcome {
    /// At least one chunk fit the budget.
    Results,
    /// No row (or no non-empty text) qualified.
    EmptyResult,
    /// Chunks were selected but the first one alone exceeds the budget.
    BudgetExhausted,
}

/// Everything a formatter needs to render one search.
#[derive(Debug, Clone, Serialize)]
pub struct SearchReport {
    /// `schema.table`.
    pub table: String,
    pub query: String,
    pub config: SearchConfig,
    /// Bindings actually used by the retrieval query.
    pub bindings: Vec<ColumnBinding>,
    pub candidates: Vec<CandidateRow>,
    /// Chunks produced before ranking.
    pub chunk_count: usize,
    /// Chunks chosen by MMR before budgeting.
    pub selected_count: usize,
    /// Final, budgeted chunks in selection order.
    pub results: Vec<SelectedChunk>,
    pub total_tokens: usize,
    pub outcome: SearchOutcome,
}

/// Keep bindings whose declared dimension matches the query vector (or
/// is unknown) and renormalize their weights.
pub fn filter_by_dimension(
    bindings: Vec<ColumnBinding>,
    query_dims: usize,
) -> Result<Vec<ColumnBinding>> {
    let column_dims: Vec<usize> = bindings.iter().filter_map(|b| b.dimension).collect();
    let mut kept: Vec<ColumnBinding> = bindings
        .into_iter()
        .filter(|b| b.dimension.map_or(true, |d| d == query_dims))
        .collect();
    if kept.is_empty() {
        let mut column_dims = column_dims;
        column_dims.sort_unstable();
        column_dims.dedup();
        return Err(SearchError::DimensionMismatch {
            query_dims,
            column_dims,
        });
    }
    binder::normalize_weights(&mut kept);
    Ok(kept)
}

/// Run one search end to end.
pub async fn run_search<S, E>(store: &S, embedder: &E, req: &SearchRequest) -> Result<SearchReport>
where
    S: Store + ?Sized,
    E: Embedder + ?Sized,
{
    req.config.validate()?;
    if req.query.trim().is_empty() {
        return Err(SearchError::InvalidRequest(
            "query_text must not be empty".to_string(),
        ));
    }
    let table_ref = TableRef::parse(&req.table)?;

    let table = store
        .table_info(&table_ref)
        .await
        .map_err(|e| SearchError::QueryExecutionFailed(format!("{:#}", e)))?
        .ok_or_else(|| SearchError::TableNotFound {
            table: table_ref.to_string(),
        })?;

    // Stage 1: column binding.
    let pairs = binder::resolve_pairs(&table)?;
    let samples = if req.sample_rows > 0 {
        let columns = binder::text_columns(&pairs);
        match store.sample_text(&table, &columns, req.sample_rows).await {
            Ok(s) => s,
            Err(e) => {
                warn!(table = %table_ref, error = %e, "text sampling failed, using name heuristics");
                Default::default()
            }
        }
    } else {
        Default::default()
    };
    let bindings = binder::assign_weights(&table, &pairs, &samples, &req.binder);
    debug!(table = %table_ref, bindings = bindings.len(), "columns bound");

    // Stage 2: candidate retrieval.
    let query_vector = embedder
        .embed(&req.query)
        .await
        .map_err(|e| SearchError::EmbeddingGenerationFailed(format!("{:#}", e)))?;
    if query_vector.is_empty() {
        return Err(SearchError::EmbeddingGenerationFailed(format!(
            "{} returned an empty vector",
            embedder.model_name()
        )));
    }
    let bindings = filter_by_dimension(bindings, query_vector.len())?;
    let text_columns: Vec<String> = {
        let mut cols: Vec<String> = Vec::new();
        for c in bindings.iter().filter_map(|b| b.text_column.as_ref()) {
            if !cols.contains(c) {
                cols.push(c.clone());
            }
        }
        cols
    };

    let candidate_query = CandidateQuery {
        table: table.clone(),
        bindings: bindings.clone(),
        text_columns: text_columns.clone(),
        query_vector,
        metric: req.config.distance_metric,
        limit: req.config.top_n,
    };
    let candidates = store
        .fetch_candidates(&candidate_query)
        .await
        .map_err(|e| SearchError::QueryExecutionFailed(format!("{:#}", e)))?;
    debug!(candidates = candidates.len(), "candidates fetched");

    let qualified = table.qualified_name();
    let mut report = SearchReport {
        table: qualified.clone(),
        query: req.query.clone(),
        config: req.config.clone(),
        bindings,
        candidates: Vec::new(),
        chunk_count: 0,
        selected_count: 0,
        results: Vec::new(),
        total_tokens: 0,
        outcome: SearchOutcome::EmptyResult,
    };
    if candidates.is_empty() {
        return Ok(report);
    }

    // Stage 3: chunking.
    let chunks = chunk::chunk_candidates(
        &qualified,
        &candidates,
        &text_columns,
        req.config.chunk_size_tokens,
        req.config.overlap_tokens,
    );
    report.candidates = candidates;
    report.chunk_count = chunks.len();
    debug!(chunks = chunks.len(), "candidates chunked");
    if chunks.is_empty() {
        return Ok(report);
    }

    // Stage 4: BM25.
    let ranked = bm25::rank_chunks(chunks, &req.query);

    // Stage 5: MMR.
    let selected = mmr::select(ranked, req.config.lambda, req.config.max_candidates());
    report.selected_count = selected.len();
    debug!(selected = selected.len(), "chunks selected");

    // Stage 6: budget.
    let results = budget::allocate(selected, req.config.max_output_tokens);
    report.total_tokens = budget::total_tokens(&results);
    debug!(
        results = results.len(),
        tokens = report.total_tokens,
        "budget applied"
    );
    report.outcome = if results.is_empty() {
        SearchOutcome::BudgetExhausted
    } else {
        SearchOutcome::Results
    };
    report.results = results;
    Ok(report)
}

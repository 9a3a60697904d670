//! Request handling for the two search tools.
//!
//! Turns loosely-typed tool parameters into a validated
//! [`SearchRequest`], runs the pipeline under the configured request
//! timeout, and renders the outcome. Pipeline failures are returned as
//! diagnostic [`ToolOutput`]s rather than errors so callers always get
//! remediation text.

use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::{info, warn};

use pgsemantic_core::embedding::Embedder;
use pgsemantic_core::models::DistanceMetric;
use pgsemantic_core::store::Store;
use pgsemantic_core::{run_search, SearchError, SearchRequest};

use crate::config::SearchDefaults;
use crate::format::{render_error, render_report, render_vector_tables, OutputFormat};
use crate::traits::ToolOutput;

/// Parameters of a `similarity_search` call. Unset fields fall back to
/// `[search]` defaults.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchParams {
    pub table_name: String,
    pub query_text: String,
    #[serde(default)]
    pub top_n: Option<usize>,
    #[serde(default)]
    pub chunk_size_tokens: Option<usize>,
    #[serde(default)]
    pub lambda: Option<f64>,
    #[serde(default)]
    pub max_output_tokens: Option<usize>,
    #[serde(default)]
    pub distance_metric: Option<String>,
    #[serde(default)]
    pub output_format: Option<String>,
}

impl SearchParams {
    pub fn new(table_name: impl Into<String>, query_text: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
            query_text: query_text.into(),
            ..Default::default()
        }
    }
}

/// Merge request parameters over the configured defaults.
///
/// The overlap is always derived from the effective chunk size.
pub fn build_request(
    params: &SearchParams,
    defaults: &SearchDefaults,
) -> std::result::Result<(SearchRequest, OutputFormat), SearchError> {
    let mut config = defaults.search_config()?;
    if let Some(top_n) = params.top_n {
        config.top_n = top_n;
    }
    if let Some(chunk_size_tokens) = params.chunk_size_tokens {
        config.chunk_size_tokens = chunk_size_tokens;
        config.overlap_tokens = defaults.overlap_for(chunk_size_tokens);
    }
    if let Some(lambda) = params.lambda {
        config.lambda = lambda;
    }
    if let Some(max_output_tokens) = params.max_output_tokens {
        config.max_output_tokens = max_output_tokens;
    }
    if let Some(metric) = params.distance_metric.as_deref() {
        config.distance_metric = metric.parse::<DistanceMetric>()?;
    }
    let format = match params.output_format.as_deref() {
        Some(f) => f.parse::<OutputFormat>()?,
        None => OutputFormat::Full,
    };
    config.validate()?;

    let mut req = SearchRequest::new(&params.table_name, &params.query_text);
    req.config = config;
    req.binder = defaults.binder_options();
    req.sample_rows = defaults.sample_rows;
    Ok((req, format))
}

/// Run one similarity search and render it.
pub async fn similarity_search(
    store: &dyn Store,
    embedder: &dyn Embedder,
    defaults: &SearchDefaults,
    params: &SearchParams,
) -> ToolOutput {
    let database = store.label();
    let (req, format) = match build_request(params, defaults) {
        Ok(r) => r,
        Err(e) => return ToolOutput::error(render_error(&e, &database)),
    };

    let limit = Duration::from_secs(defaults.request_timeout_secs);
    let result = match tokio::time::timeout(limit, run_search(store, embedder, &req)).await {
        Ok(result) => result,
        Err(_) => Err(SearchError::Cancelled(format!(
            "timed out after {}s",
            defaults.request_timeout_secs
        ))),
    };

    match result {
        Ok(report) => {
            info!(
                table = %report.table,
                candidates = report.candidates.len(),
                results = report.results.len(),
                tokens = report.total_tokens,
                outcome = ?report.outcome,
                "search completed"
            );
            ToolOutput::text(render_report(&report, format, &database))
        }
        Err(e) => {
            warn!(code = e.code(), error = %e, "search failed");
            ToolOutput::error(render_error(&e, &database))
        }
    }
}

/// List the store's tables that carry at least one vector column.
pub async fn list_vector_tables(store: &dyn Store) -> Result<ToolOutput> {
    let tables = store
        .list_tables()
        .await
        .context("Failed to list tables")?;
    Ok(ToolOutput::text(render_vector_tables(&tables, &store.label())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pgsemantic_core::models::SearchConfig;

    #[test]
    fn test_defaults_fill_unset_params() {
        let defaults = SearchDefaults::default();
        let (req, format) = build_request(&SearchParams::new("docs", "q"), &defaults).unwrap();
        assert_eq!(req.config, SearchConfig::default());
        assert_eq!(format, OutputFormat::Full);
        assert_eq!(req.sample_rows, 3);
    }

    #[test]
    fn test_configured_defaults_are_the_base() {
        let defaults = SearchDefaults {
            top_n: 4,
            chunk_size_tokens: 60,
            lambda: 0.3,
            distance_metric: "l2".to_string(),
            ..SearchDefaults::default()
        };
        let (req, _) = build_request(&SearchParams::new("docs", "q"), &defaults).unwrap();
        assert_eq!(req.config, defaults.search_config().unwrap());
        assert_eq!(req.config.overlap_tokens, 15);

        let mut params = SearchParams::new("docs", "q");
        params.lambda = Some(0.9);
        let (req, _) = build_request(&params, &defaults).unwrap();
        assert_eq!(req.config.lambda, 0.9);
        assert_eq!(req.config.top_n, 4);
        assert_eq!(req.config.distance_metric, DistanceMetric::L2);

        let broken = SearchDefaults {
            distance_metric: "hamming".to_string(),
            ..SearchDefaults::default()
        };
        assert!(matches!(
            build_request(&SearchParams::new("docs", "q"), &broken),
            Err(SearchError::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_overlap_follows_chunk_size() {
        let mut params = SearchParams::new("docs", "q");
        params.chunk_size_tokens = Some(40);
        params.distance_metric = Some("l2".to_string());
        params.output_format = Some("ids_only".to_string());
        let (req, format) = build_request(&params, &SearchDefaults::default()).unwrap();
        assert_eq!(req.config.chunk_size_tokens, 40);
        assert_eq!(req.config.overlap_tokens, 10);
        assert_eq!(req.config.distance_metric, DistanceMetric::L2);
        assert_eq!(format, OutputFormat::IdsOnly);
    }

    #[test]
    fn test_rejects_out_of_range_values() {
        let defaults = SearchDefaults::default();
        let mut params = SearchParams::new("docs", "q");
        params.lambda = Some(1.5);
        assert!(matches!(
            build_request(&params, &defaults),
            Err(SearchError::InvalidRequest(_))
        ));

        let mut params = SearchParams::new("docs", "q");
        params.top_n = Some(0);
        assert!(build_request(&params, &defaults).is_err());

        let mut params = SearchParams::new("docs", "q");
        params.output_format = Some("xml".to_string());
        assert!(build_request(&params, &defaults).is_err());
    }
}

//! Tool-level tests against the in-memory store.
//!
//! Every test builds its own store and registry, so fetch counts and
//! failure switches never leak between tests.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::json;

use pgsemantic::config::{Config, EmbeddingConfig, SearchDefaults, ServerConfig};
use pgsemantic::embedding::DisabledEmbedder;
use pgsemantic::registry::{ConnectionRegistry, DEFAULT_TENANT};
use pgsemantic::search::{build_request, SearchParams};
use pgsemantic::traits::{ToolContext, ToolRegistry};
use pgsemantic_core::embedding::{distance, Embedder};
use pgsemantic_core::models::{ColumnBinding, ColumnDescriptor, DistanceMetric, TableInfo};
use pgsemantic_core::store::memory::{InMemoryStore, MemoryRow};
use pgsemantic_core::store::{CandidateQuery, Store};
use pgsemantic_core::{run_search, SearchOutcome};

/// Answers only after `delay`.
struct SlowEmbedder {
    delay: Duration,
}

#[async_trait]
impl Embedder for SlowEmbedder {
    fn model_name(&self) -> &str {
        "slow"
    }
    fn dimensions(&self) -> usize {
        3
    }
    async fn embed(&self, _text: &str) -> anyhow::Result<Vec<f32>> {
        tokio::time::sleep(self.delay).await;
        Ok(vec![1.0, 0.0, 0.0])
    }
}

/// Returns the same vector for every query.
struct FixedEmbedder(Vec<f32>);

#[async_trait]
impl Embedder for FixedEmbedder {
    fn model_name(&self) -> &str {
        "fixed"
    }
    fn dimensions(&self) -> usize {
        self.0.len()
    }
    async fn embed(&self, _text: &str) -> anyhow::Result<Vec<f32>> {
        Ok(self.0.clone())
    }
}

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

const ARTICLES: &[(&str, &str, &str, [f32; 3])] = &[
    (
        "1",
        "Indexing vectors in PostgreSQL",
        "pgvector adds a vector column type to PostgreSQL together with distance operators. \
         An HNSW index trades build time and memory for fast approximate nearest neighbour \
         search, while IVFFlat indexes build quickly but need a training step over existing \
         rows. Both index types support cosine, euclidean and inner product distance. \
         Choosing lists and probes for IVFFlat controls the recall and latency trade off.",
        [1.0, 0.0, 0.0],
    ),
    (
        "2",
        "Tuning HNSW parameters",
        "The m parameter sets how many neighbours each HNSW node keeps, and ef_construction \
         sets the size of the candidate list while building. Larger values raise recall at \
         the cost of memory and build time. At query time ef_search bounds the candidate \
         list; raising it makes vector search slower but more accurate.",
        [0.9, 0.1, 0.0],
    ),
    (
        "3",
        "Sourdough basics",
        "A sourdough starter is a culture of wild yeast and lactic acid bacteria. Feed it \
         flour and water daily, keep it warm, and use it when it doubles in size. Long cold \
         fermentation develops flavour and makes the crumb more open.",
        [0.0, 1.0, 0.0],
    ),
    (
        "4",
        "Chunking text for retrieval",
        "Retrieval quality depends on chunk size. Small chunks give precise matches but lose \
         context, large chunks keep context but dilute relevance. Overlapping windows keep \
         sentences that straddle a boundary searchable from both sides.",
        [0.7, 0.0, 0.3],
    ),
    (
        "5",
        "Rust ownership",
        "Every value in Rust has a single owner. Borrowing lends access without moving the \
         value, and the borrow checker enforces that mutable borrows are exclusive.",
        [0.0, 0.0, 1.0],
    ),
];

/// `public.articles` with title and content embeddings, plus
/// `public.users` without vectors.
fn fixture() -> Arc<InMemoryStore> {
    let store = InMemoryStore::new();
    store.add_table(TableInfo {
        schema: "public".to_string(),
        name: "articles".to_string(),
        columns: vec![
            column("id", "bigint", None),
            column("title", "text", None),
            column("content", "text", None),
            column("title_embedding", "vector(3)", Some(3)),
            column("content_embedding", "vector(3)", Some(3)),
        ],
    });
    for (id, title, content, v) in ARTICLES {
        store
            .insert_row(
                "articles",
                MemoryRow::new(*id)
                    .text("title", title)
                    .text("content", content)
                    .vector("title_embedding", v.to_vec())
                    .vector("content_embedding", v.to_vec()),
            )
            .unwrap();
    }

    store.add_table(TableInfo {
        schema: "public".to_string(),
        name: "users".to_string(),
        columns: vec![column("id", "bigint", None), column("email", "text", None)],
    });
    Arc::new(store)
}

fn config_with(search: SearchDefaults) -> Arc<Config> {
    Arc::new(Config {
        databases: BTreeMap::new(),
        embedding: EmbeddingConfig::default(),
        search,
        server: ServerConfig::default(),
    })
}

async fn context_for(
    store: Arc<InMemoryStore>,
    embedder: Arc<dyn Embedder>,
    config: Arc<Config>,
) -> ToolContext {
    let registry = Arc::new(ConnectionRegistry::new(BTreeMap::new()));
    registry.seed(DEFAULT_TENANT, store).await;
    ToolContext::new(config, registry, embedder, DEFAULT_TENANT)
}

async fn context_with(store: Arc<InMemoryStore>, embedder: Arc<dyn Embedder>) -> ToolContext {
    context_for(store, embedder, config_with(SearchDefaults::default())).await
}

async fn context(store: Arc<InMemoryStore>) -> ToolContext {
    context_with(store, Arc::new(FixedEmbedder(vec![1.0, 0.0, 0.0]))).await
}

/// `T` from a `Total: n chunks, ~T tokens` footer.
fn footer_tokens(text: &str) -> usize {
    let line = text
        .lines()
        .find(|l| l.starts_with("Total:"))
        .expect("footer line");
    let after = line.split('~').nth(1).expect("token count");
    after
        .split_whitespace()
        .next()
        .unwrap()
        .parse()
        .unwrap()
}

#[tokio::test]
async fn test_single_query_within_budget() {
    let store = fixture();
    let ctx = context(store.clone()).await;
    let tools = ToolRegistry::with_builtins();

    let output = tools
        .call(
            "similarity_search",
            json!({
                "table_name": "articles",
                "query_text": "vector index recall",
                "top_n": 5,
                "chunk_size_tokens": 100,
                "max_output_tokens": 500,
                "lambda": 0.6
            }),
            &ctx,
        )
        .await
        .unwrap();

    assert!(!output.is_error, "{}", output.text);
    assert_eq!(store.fetch_count(), 1);
    assert!(output.text.contains("Database: in-memory"));
    assert!(output.text.contains("Table: public.articles"));
    assert!(output.text.contains("Source: public.articles."));
    assert!(footer_tokens(&output.text) <= 500);
}

#[tokio::test]
async fn test_title_columns_weighted_higher() {
    let ctx = context(fixture()).await;
    let output = ToolRegistry::with_builtins()
        .call(
            "similarity_search",
            json!({"table_name": "public.articles", "query_text": "hnsw"}),
            &ctx,
        )
        .await
        .unwrap();

    assert!(output.text.contains("title → title_embedding (66.7%) [title]"));
    assert!(output.text.contains("content → content_embedding (33.3%) [content]"));
}

#[tokio::test]
async fn test_table_without_vectors_is_diagnosed() {
    let store = fixture();
    let ctx = context(store.clone()).await;
    let output = ToolRegistry::with_builtins()
        .call(
            "similarity_search",
            json!({"table_name": "users", "query_text": "anything"}),
            &ctx,
        )
        .await
        .unwrap();

    assert!(output.is_error);
    assert!(output.text.contains("no_vector_columns"));
    assert!(output.text.contains("list_vector_tables()"));
    assert_eq!(store.fetch_count(), 0);
}

#[tokio::test]
async fn test_missing_table_is_diagnosed() {
    let ctx = context(fixture()).await;
    let output = ToolRegistry::with_builtins()
        .call(
            "similarity_search",
            json!({"table_name": "kb.missing", "query_text": "q"}),
            &ctx,
        )
        .await
        .unwrap();
    assert!(output.is_error);
    assert!(output.text.contains("table_not_found"));
    assert!(output.text.contains("kb.missing"));
}

#[tokio::test]
async fn test_weighted_distance_matches_hand_computation() {
    let store = InMemoryStore::new();
    let info = TableInfo {
        schema: "public".to_string(),
        name: "docs".to_string(),
        columns: vec![
            column("id", "bigint", None),
            column("title", "text", None),
            column("content", "text", None),
            column("title_embedding", "vector(3)", Some(3)),
            column("content_embedding", "vector(3)", Some(3)),
        ],
    };
    store.add_table(info.clone());
    let rows: [(&str, [f32; 3], [f32; 3]); 3] = [
        ("a", [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
        ("b", [0.0, 1.0, 0.0], [1.0, 0.0, 0.0]),
        ("c", [0.6, 0.8, 0.0], [0.6, 0.0, 0.8]),
    ];
    for (id, t, c) in &rows {
        store
            .insert_row(
                "docs",
                MemoryRow::new(*id)
                    .text("title", id)
                    .text("content", id)
                    .vector("title_embedding", t.to_vec())
                    .vector("content_embedding", c.to_vec()),
            )
            .unwrap();
    }

    let binding = |vector: &str, text: &str, weight: f64, is_title: bool| ColumnBinding {
        vector_column: vector.to_string(),
        text_column: Some(text.to_string()),
        dimension: Some(3),
        weight,
        is_title,
    };
    let query_vector = vec![1.0, 0.0, 0.0];
    let query = CandidateQuery {
        table: info,
        bindings: vec![
            binding("title_embedding", "title", 0.7, true),
            binding("content_embedding", "content", 0.3, false),
        ],
        text_columns: vec!["title".to_string(), "content".to_string()],
        query_vector: query_vector.clone(),
        metric: DistanceMetric::Cosine,
        limit: 3,
    };
    let candidates = store.fetch_candidates(&query).await.unwrap();
    assert_eq!(candidates.len(), 3);

    let mut expected: Vec<(&str, f64)> = rows
        .iter()
        .map(|(id, t, c)| {
            let d = 0.7 * distance(DistanceMetric::Cosine, &query_vector, t)
                + 0.3 * distance(DistanceMetric::Cosine, &query_vector, c);
            (*id, d)
        })
        .collect();
    expected.sort_by(|a, b| a.1.total_cmp(&b.1));

    // a: 0.7*0 + 0.3*1 = 0.3; c: 0.7*0.4 + 0.3*0.4 = 0.4; b: 0.7*1 + 0.3*0 = 0.7
    assert_eq!(
        candidates.iter().map(|c| c.row_id.as_str()).collect::<Vec<_>>(),
        vec!["a", "c", "b"]
    );
    for (row, (id, d)) in candidates.iter().zip(&expected) {
        assert_eq!(row.row_id, *id);
        assert!((row.combined_distance - d).abs() < 1e-6);
    }
    assert!((candidates[0].combined_distance - 0.3).abs() < 1e-6);
    assert!((candidates[1].combined_distance - 0.4).abs() < 1e-6);
    assert!((candidates[2].combined_distance - 0.7).abs() < 1e-6);
}

#[tokio::test]
async fn test_pure_relevance_keeps_bm25_order() {
    let store = fixture();
    let embedder = FixedEmbedder(vec![1.0, 0.0, 0.0]);
    let mut params = SearchParams::new("articles", "vector search recall index");
    params.lambda = Some(1.0);
    params.chunk_size_tokens = Some(20);
    params.max_output_tokens = Some(100_000);
    let (req, _) = build_request(&params, &SearchDefaults::default()).unwrap();

    let report = run_search(store.as_ref(), &embedder, &req).await.unwrap();
    assert_eq!(report.outcome, SearchOutcome::Results);
    assert!(report.chunk_count >= 10, "only {} chunks", report.chunk_count);
    assert_eq!(report.results.len(), report.chunk_count);

    let scores: Vec<f64> = report.results.iter().map(|r| r.score()).collect();
    for pair in scores.windows(2) {
        assert!(pair[0] >= pair[1], "scores not descending: {:?}", scores);
    }
}

#[tokio::test]
async fn test_summary_and_ids_only_formats() {
    let ctx = context(fixture()).await;
    let tools = ToolRegistry::with_builtins();

    let summary = tools
        .call(
            "similarity_search",
            json!({"table_name": "articles", "query_text": "hnsw", "output_format": "summary"}),
            &ctx,
        )
        .await
        .unwrap();
    assert!(summary.text.starts_with("Similarity Search Results (Summary)"));
    assert!(summary.text.contains("1. Score: "));

    let ids = tools
        .call(
            "similarity_search",
            json!({"table_name": "articles", "query_text": "hnsw", "output_format": "ids_only", "top_n": 2}),
            &ctx,
        )
        .await
        .unwrap();
    assert!(ids.text.starts_with("Similarity Search Results (IDs Only)"));
    assert!(ids.text.contains("1. ID: 1 | Distance: 0.0000"));
    assert!(ids.text.contains("Total: 2 results"));
}

#[tokio::test]
async fn test_budget_exhausted_and_empty_outcomes() {
    let ctx = context(fixture()).await;
    let tools = ToolRegistry::with_builtins();
    let output = tools
        .call(
            "similarity_search",
            json!({"table_name": "articles", "query_text": "hnsw", "max_output_tokens": 1}),
            &ctx,
        )
        .await
        .unwrap();
    assert!(!output.is_error);
    assert!(output.text.contains("no chunk fits within the token budget"));

    let store = InMemoryStore::new();
    store.add_table(TableInfo {
        schema: "public".to_string(),
        name: "notes".to_string(),
        columns: vec![
            column("id", "bigint", None),
            column("body", "text", None),
            column("body_embedding", "vector(3)", Some(3)),
        ],
    });
    store
        .insert_row(
            "notes",
            MemoryRow::new("1")
                .null("body")
                .vector("body_embedding", vec![1.0, 0.0, 0.0]),
        )
        .unwrap();
    let ctx = context(Arc::new(store)).await;
    let output = tools
        .call(
            "similarity_search",
            json!({"table_name": "notes", "query_text": "anything"}),
            &ctx,
        )
        .await
        .unwrap();
    assert!(output.text.starts_with("No results found for query: \"anything\""));
}

#[tokio::test]
async fn test_collaborator_failures_are_diagnosed() {
    let tools = ToolRegistry::with_builtins();
    let params = json!({"table_name": "articles", "query_text": "hnsw"});

    let ctx = context_with(fixture(), Arc::new(DisabledEmbedder)).await;
    let output = tools.call("similarity_search", params.clone(), &ctx).await.unwrap();
    assert!(output.is_error);
    assert!(output.text.contains("embedding_failed"));

    let ctx = context_with(fixture(), Arc::new(FixedEmbedder(vec![1.0; 4]))).await;
    let output = tools.call("similarity_search", params.clone(), &ctx).await.unwrap();
    assert!(output.is_error);
    assert!(output.text.contains("4 dimensions but vector columns expect 3"));

    let store = fixture();
    store.set_fail_queries(true);
    let ctx = context(store).await;
    let output = tools.call("similarity_search", params, &ctx).await.unwrap();
    assert!(output.is_error);
    assert!(output.text.contains("query_failed"));
}

#[tokio::test]
async fn test_request_timeout_cancels_search() {
    let store = fixture();
    let search = SearchDefaults {
        request_timeout_secs: 1,
        ..SearchDefaults::default()
    };
    let embedder = Arc::new(SlowEmbedder {
        delay: Duration::from_secs(10),
    });
    let ctx = context_for(store.clone(), embedder, config_with(search)).await;

    let started = Instant::now();
    let output = ToolRegistry::with_builtins()
        .call(
            "similarity_search",
            json!({"table_name": "articles", "query_text": "hnsw"}),
            &ctx,
        )
        .await
        .unwrap();

    assert!(started.elapsed() < Duration::from_secs(5));
    assert!(output.is_error);
    assert!(output.text.contains("cancelled"), "{}", output.text);
    assert!(output.text.contains("timed out after 1s"));
    assert_eq!(store.fetch_count(), 0);
}

#[tokio::test]
async fn test_invalid_parameters_and_unknown_tenant() {
    let ctx = context(fixture()).await;
    let tools = ToolRegistry::with_builtins();

    let err = tools
        .call("similarity_search", json!({"table_name": "articles"}), &ctx)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("query_text"));

    let output = tools
        .call(
            "similarity_search",
            json!({"table_name": "articles", "query_text": "q", "lambda": 2.0}),
            &ctx,
        )
        .await
        .unwrap();
    assert!(output.is_error);
    assert!(output.text.contains("invalid_request"));

    let err = tools
        .call(
            "similarity_search",
            json!({"table_name": "articles", "query_text": "q"}),
            &ctx.for_tenant("acme"),
        )
        .await
        .unwrap_err();
    assert!(err.to_string().contains("not found"));
}

#[tokio::test]
async fn test_list_vector_tables() {
    let ctx = context(fixture()).await;
    let output = ToolRegistry::with_builtins()
        .call("list_vector_tables", json!({}), &ctx)
        .await
        .unwrap();
    assert!(output.text.contains("public.articles"));
    assert!(output.text.contains("title_embedding (vector, 3 dims)"));
    assert!(!output.text.contains("public.users"));
}

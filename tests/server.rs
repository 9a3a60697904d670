//! HTTP surface tests against a router bound to an ephemeral port.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use pgsemantic::config::{Config, EmbeddingConfig, SearchDefaults, ServerConfig};
use pgsemantic::registry::{ConnectionRegistry, DEFAULT_TENANT};
use pgsemantic::server::router;
use pgsemantic::traits::{ToolContext, ToolRegistry};
use pgsemantic_core::embedding::Embedder;
use pgsemantic_core::models::{ColumnDescriptor, TableInfo};
use pgsemantic_core::store::memory::{InMemoryStore, MemoryRow};

struct FixedEmbedder;

#[async_trait]
impl Embedder for FixedEmbedder {
    fn model_name(&self) -> &str {
        "fixed"
    }
    fn dimensions(&self) -> usize {
        2
    }
    async fn embed(&self, _text: &str) -> anyhow::Result<Vec<f32>> {
        Ok(vec![1.0, 0.0])
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

fn store(body: &str) -> Arc<InMemoryStore> {
    let store = InMemoryStore::new();
    store.add_table(TableInfo {
        schema: "public".to_string(),
        name: "notes".to_string(),
        columns: vec![
            column("id", "integer", None),
            column("body", "text", None),
            column("body_embedding", "vector(2)", Some(2)),
        ],
    });
    store
        .insert_row(
            "notes",
            MemoryRow::new("1")
                .text("body", body)
                .vector("body_embedding", vec![1.0, 0.0]),
        )
        .unwrap();
    Arc::new(store)
}

/// Serve a router with two tenants and return its base URL.
async fn spawn_server() -> String {
    let registry = Arc::new(ConnectionRegistry::new(BTreeMap::new()));
    registry
        .seed(DEFAULT_TENANT, store("default tenant note about backups"))
        .await;
    registry
        .seed("acme", store("acme tenant note about invoices"))
        .await;

    let config = Arc::new(Config {
        databases: BTreeMap::new(),
        embedding: EmbeddingConfig::default(),
        search: SearchDefaults::default(),
        server: ServerConfig::default(),
    });
    let ctx = ToolContext::new(config, registry, Arc::new(FixedEmbedder), DEFAULT_TENANT);
    let app = router(Arc::new(ToolRegistry::with_builtins()), ctx);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

#[tokio::test]
async fn test_health_and_tool_list() {
    let base = spawn_server().await;
    let client = reqwest::Client::new();

    let health: Value = client
        .get(format!("{}/health", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["status"], "ok");
    assert_eq!(health["version"], env!("CARGO_PKG_VERSION"));

    let list: Value = client
        .get(format!("{}/tools/list", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let names: Vec<&str> = list["tools"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["similarity_search", "list_vector_tables"]);
    assert_eq!(list["tools"][0]["builtin"], true);
    assert_eq!(
        list["tools"][0]["parameters"]["required"],
        json!(["table_name", "query_text"])
    );
}

#[tokio::test]
async fn test_tool_call_routes_by_tenant() {
    let base = spawn_server().await;
    let client = reqwest::Client::new();
    let params = json!({"table_name": "notes", "query_text": "note"});

    let resp = client
        .post(format!("{}/tools/similarity_search", base))
        .json(&params)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["result"]["is_error"], false);
    assert!(body["result"]["text"].as_str().unwrap().contains("backups"));

    let body: Value = client
        .post(format!("{}/tools/similarity_search", base))
        .header("X-Tenant", "acme")
        .json(&params)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let text = body["result"]["text"].as_str().unwrap();
    assert!(text.contains("invoices"));
    assert!(!text.contains("backups"));
}

#[tokio::test]
async fn test_error_statuses() {
    let base = spawn_server().await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{}/tools/similarity_search", base))
        .json(&json!({"table_name": "notes"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "bad_request");

    let resp = client
        .post(format!("{}/tools/drop_table", base))
        .json(&json!({}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);

    let resp = client
        .post(format!("{}/tools/list_vector_tables", base))
        .header("X-Tenant", "nobody")
        .json(&json!({}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "not_found");
}

#[tokio::test]
async fn test_search_diagnostic_is_not_an_http_error() {
    let base = spawn_server().await;
    let resp = reqwest::Client::new()
        .post(format!("{}/tools/similarity_search", base))
        .json(&json!({"table_name": "missing", "query_text": "q"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["result"]["is_error"], true);
    assert!(body["result"]["text"]
        .as_str()
        .unwrap()
        .contains("table_not_found"));
}

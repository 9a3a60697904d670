//! Tool trait and registry.
//!
//! Every surface (the HTTP API, the MCP endpoint, and the CLI) dispatches
//! through a [`ToolRegistry`]. Tools receive JSON parameters that have
//! already been checked by [`validate_params`] and a [`ToolContext`]
//! scoped to one tenant.
//!
//! # Built-in tools
//!
//! | Name | Purpose |
//! |------|---------|
//! | `similarity_search` | Weighted vector search, chunked, reranked, and budgeted |
//! | `list_vector_tables` | Tables with pgvector columns and their dimensions |

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info_span, Instrument};
use uuid::Uuid;

use pgsemantic_core::embedding::Embedder;
use pgsemantic_core::store::Store;

use crate::config::Config;
use crate::registry::{tenant_fingerprint, ConnectionRegistry};
use crate::search::{list_vector_tables, similarity_search, SearchParams};

/// Rendered tool result. `is_error` marks diagnostics for failed
/// searches; the text still carries remediation advice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolOutput {
    pub text: String,
    pub is_error: bool,
}

impl ToolOutput {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_error: false,
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_error: true,
        }
    }
}

/// A callable tool.
///
/// `execute` returns `Err` only for failures outside the search itself,
/// such as an unknown tenant or an unreachable database.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn is_builtin(&self) -> bool {
        false
    }
    /// JSON Schema of the accepted parameters.
    fn parameters_schema(&self) -> Value;
    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<ToolOutput>;
}

/// Per-request context handed to tools.
#[derive(Clone)]
pub struct ToolContext {
    pub config: Arc<Config>,
    pub registry: Arc<ConnectionRegistry>,
    pub embedder: Arc<dyn Embedder>,
    pub tenant: String,
}

impl ToolContext {
    pub fn new(
        config: Arc<Config>,
        registry: Arc<ConnectionRegistry>,
        embedder: Arc<dyn Embedder>,
        tenant: impl Into<String>,
    ) -> Self {
        Self {
            config,
            registry,
            embedder,
            tenant: tenant.into(),
        }
    }

    /// Same context for another tenant.
    pub fn for_tenant(&self, tenant: impl Into<String>) -> Self {
        Self {
            tenant: tenant.into(),
            ..self.clone()
        }
    }

    /// The store for this context's tenant.
    pub async fn store(&self) -> Result<Arc<dyn Store>> {
        self.registry.get(&self.tenant).await
    }
}

/// Summary of a tool for `GET /tools/list`.
#[derive(Debug, Clone, Serialize)]
pub struct ToolInfo {
    pub name: String,
    pub description: String,
    pub builtin: bool,
    pub parameters: Value,
}

impl ToolInfo {
    pub fn of(tool: &dyn Tool) -> Self {
        Self {
            name: tool.name().to_string(),
            description: tool.description().to_string(),
            builtin: tool.is_builtin(),
            parameters: tool.parameters_schema(),
        }
    }
}

pub struct SimilaritySearchTool;

#[async_trait]
impl Tool for SimilaritySearchTool {
    fn name(&self) -> &str {
        "similarity_search"
    }

    fn description(&self) -> &str {
        "Semantic search over a pgvector table: finds the nearest rows by weighted \
         vector distance, splits their text into chunks, reranks them with BM25, \
         diversifies with MMR, and returns as many chunks as fit the token budget"
    }

    fn is_builtin(&self) -> bool {
        true
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "table_name": { "type": "string", "description": "Table to search, 'table' or 'schema.table'" },
                "query_text": { "type": "string", "description": "Natural language query" },
                "top_n": { "type": "integer", "description": "Rows fetched by the vector search" },
                "chunk_size_tokens": { "type": "integer", "description": "Approximate tokens per chunk" },
                "lambda": { "type": "number", "description": "MMR balance: 1.0 pure relevance, 0.0 pure diversity" },
                "max_output_tokens": { "type": "integer", "description": "Token budget for returned chunks" },
                "distance_metric": {
                    "type": "string",
                    "enum": ["cosine", "l2", "euclidean", "inner_product", "inner", "ip"],
                    "description": "euclidean is an alias of l2; inner and ip are aliases of inner_product"
                },
                "output_format": { "type": "string", "enum": ["full", "summary", "ids_only"], "default": "full" }
            },
            "required": ["table_name", "query_text"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<ToolOutput> {
        let params: SearchParams =
            serde_json::from_value(params).context("invalid similarity_search parameters")?;
        let store = ctx.store().await?;
        Ok(similarity_search(
            store.as_ref(),
            ctx.embedder.as_ref(),
            &ctx.config.search,
            &params,
        )
        .await)
    }
}

pub struct ListVectorTablesTool;

#[async_trait]
impl Tool for ListVectorTablesTool {
    fn name(&self) -> &str {
        "list_vector_tables"
    }

    fn description(&self) -> &str {
        "List tables that have pgvector columns, with their vector and text columns"
    }

    fn is_builtin(&self) -> bool {
        true
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {}
        })
    }

    async fn execute(&self, _params: Value, ctx: &ToolContext) -> Result<ToolOutput> {
        let store = ctx.store().await?;
        list_vector_tables(store.as_ref()).await
    }
}

/// Ordered set of tools.
pub struct ToolRegistry {
    tools: Vec<Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self { tools: Vec::new() }
    }

    /// Registry with `similarity_search` and `list_vector_tables`.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(SimilaritySearchTool));
        registry.register(Box::new(ListVectorTablesTool));
        registry
    }

    pub fn register(&mut self, tool: Box<dyn Tool>) {
        self.tools.push(tool);
    }

    pub fn tools(&self) -> &[Box<dyn Tool>] {
        &self.tools
    }

    pub fn find(&self, name: &str) -> Option<&dyn Tool> {
        self.tools
            .iter()
            .find(|t| t.name() == name)
            .map(|t| t.as_ref())
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Validate parameters and run the named tool inside a request span.
    pub async fn call(&self, name: &str, params: Value, ctx: &ToolContext) -> Result<ToolOutput> {
        let Some(tool) = self.find(name) else {
            bail!("tool '{}' not found", name);
        };
        let params = validate_params(&tool.parameters_schema(), &params)?;

        let span = info_span!(
            "tool",
            request_id = %Uuid::new_v4(),
            tool = name,
            tenant = %tenant_fingerprint(&ctx.tenant),
        );
        async move {
            let output = tool.execute(params, ctx).await?;
            debug!(is_error = output.is_error, bytes = output.text.len(), "tool finished");
            Ok(output)
        }
        .instrument(span)
        .await
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Check parameters against a tool's schema.
///
/// Verifies required fields, JSON types, and enum membership, and fills
/// in schema defaults for missing optional fields.
pub fn validate_params(schema: &Value, params: &Value) -> Result<Value> {
    let params_obj = match params {
        Value::Object(map) => map.clone(),
        Value::Null => serde_json::Map::new(),
        other => bail!("invalid parameters: expected an object, got {}", json_type_name(other)),
    };

    let properties = schema
        .get("properties")
        .and_then(|p| p.as_object())
        .cloned()
        .unwrap_or_default();

    let required: Vec<&str> = schema
        .get("required")
        .and_then(|r| r.as_array())
        .map(|arr| arr.iter().filter_map(|v| v.as_str()).collect())
        .unwrap_or_default();

    for field in &required {
        if !params_obj.contains_key(*field) {
            bail!("invalid parameters: missing required parameter '{}'", field);
        }
    }

    let mut result = params_obj.clone();
    for (prop_name, prop_schema) in &properties {
        let Some(value) = params_obj.get(prop_name) else {
            if let Some(default) = prop_schema.get("default") {
                result.insert(prop_name.clone(), default.clone());
            }
            continue;
        };

        if let Some(expected) = prop_schema.get("type").and_then(|t| t.as_str()) {
            let type_ok = match expected {
                "string" => value.is_string(),
                "integer" => value.is_i64() || value.is_u64(),
                "number" => value.is_number(),
                "boolean" => value.is_boolean(),
                "array" => value.is_array(),
                "object" => value.is_object(),
                _ => true,
            };
            if !type_ok {
                bail!(
                    "invalid parameters: '{}' must be of type '{}', got {}",
                    prop_name,
                    expected,
                    json_type_name(value)
                );
            }
        }

        if let Some(allowed) = prop_schema.get("enum").and_then(|e| e.as_array()) {
            if !allowed.contains(value) {
                let names: Vec<String> = allowed.iter().map(|v| v.to_string()).collect();
                bail!(
                    "invalid parameters: '{}' must be one of [{}], got {}",
                    prop_name,
                    names.join(", "),
                    value
                );
            }
        }
    }

    Ok(Value::Object(result))
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

//! MCP Streamable HTTP bridge.
//!
//! Exposes the [`ToolRegistry`] over the MCP JSON-RPC protocol at `/mcp`.
//! The tenant comes from the `X-Tenant` header of the HTTP request that
//! carried the call, as on the REST surface.

use std::borrow::Cow;
use std::sync::Arc;

use axum::http::request::Parts;
use rmcp::model::*;
use rmcp::service::RequestContext;
use rmcp::{ErrorData as McpError, RoleServer, ServerHandler};
use tracing::info;

use crate::registry::DEFAULT_TENANT;
use crate::traits::{ToolContext, ToolRegistry};

/// Header selecting the tenant database.
pub const TENANT_HEADER: &str = "x-tenant";

/// Each MCP session gets a clone; everything inside is shared.
#[derive(Clone)]
pub struct McpBridge {
    tools: Arc<ToolRegistry>,
    ctx: ToolContext,
}

impl McpBridge {
    pub fn new(tools: Arc<ToolRegistry>, ctx: ToolContext) -> Self {
        Self { tools, ctx }
    }

    fn to_mcp_tool(tool: &dyn crate::traits::Tool) -> Tool {
        let input_schema = match tool.parameters_schema() {
            serde_json::Value::Object(map) => Arc::new(map),
            _ => Arc::new(serde_json::Map::new()),
        };

        Tool {
            name: Cow::Owned(tool.name().to_string()),
            title: None,
            description: Some(Cow::Owned(tool.description().to_string())),
            input_schema,
            output_schema: None,
            annotations: Some(ToolAnnotations::new().read_only(true)),
            execution: None,
            icons: None,
            meta: None,
        }
    }

    fn tenant(context: &RequestContext<RoleServer>) -> String {
        context
            .extensions
            .get::<Parts>()
            .and_then(|parts| parts.headers.get(TENANT_HEADER))
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .unwrap_or(DEFAULT_TENANT)
            .to_string()
    }
}

impl ServerHandler for McpBridge {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::LATEST,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: "pgsemantic".to_string(),
                title: Some("pgsemantic".to_string()),
                version: env!("CARGO_PKG_VERSION").to_string(),
                description: None,
                icons: None,
                website_url: None,
            },
            instructions: Some(
                "Semantic search over PostgreSQL tables with pgvector embeddings. \
                 Call list_vector_tables to discover searchable tables, then \
                 similarity_search with a table name and a natural language query."
                    .to_string(),
            ),
        }
    }

    fn list_tools(
        &self,
        _request: Option<PaginatedRequestParams>,
        _context: RequestContext<RoleServer>,
    ) -> impl std::future::Future<Output = Result<ListToolsResult, McpError>> + Send + '_ {
        let tools: Vec<Tool> = self
            .tools
            .tools()
            .iter()
            .map(|t| Self::to_mcp_tool(t.as_ref()))
            .collect();
        std::future::ready(Ok(ListToolsResult::with_all_items(tools)))
    }

    fn get_tool(&self, name: &str) -> Option<Tool> {
        self.tools.find(name).map(Self::to_mcp_tool)
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParams,
        context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        if self.tools.find(&request.name).is_none() {
            return Err(McpError::new(
                ErrorCode::METHOD_NOT_FOUND,
                format!("no tool registered with name: {}", request.name),
                None,
            ));
        }

        let params = request
            .arguments
            .map(serde_json::Value::Object)
            .unwrap_or(serde_json::Value::Object(serde_json::Map::new()));
        let ctx = self.ctx.for_tenant(Self::tenant(&context));

        tokio::select! {
            result = self.tools.call(&request.name, params, &ctx) => match result {
                Ok(output) if output.is_error => {
                    Ok(CallToolResult::error(vec![Content::text(output.text)]))
                }
                Ok(output) => Ok(CallToolResult::success(vec![Content::text(output.text)])),
                Err(e) => Ok(CallToolResult::error(vec![Content::text(format!("{:#}", e))])),
            },
            _ = context.ct.cancelled() => {
                info!(tool = %request.name, "tool call cancelled by client");
                Err(McpError::new(
                    ErrorCode::INTERNAL_ERROR,
                    format!("{} cancelled", request.name),
                    None,
                ))
            }
        }
    }
}

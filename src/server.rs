//! HTTP server.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (returns version) |
//! | `GET`  | `/tools/list` | Registered tools with parameter schemas |
//! | `POST` | `/tools/{name}` | Call a tool; `X-Tenant` selects the database |
//! | `*`    | `/mcp` | MCP Streamable HTTP endpoint |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "invalid parameters: ..." } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404), `timeout` (408),
//! `tool_error` (500). A search that ran but failed is not an HTTP error:
//! it returns 200 with `is_error: true` and a diagnostic text.

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use rmcp::transport::streamable_http_server::{
    session::local::LocalSessionManager, StreamableHttpService,
};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::mcp::{McpBridge, TENANT_HEADER};
use crate::registry::DEFAULT_TENANT;
use crate::traits::{ToolContext, ToolInfo, ToolOutput, ToolRegistry};

#[derive(Clone)]
struct AppState {
    tools: Arc<ToolRegistry>,
    ctx: ToolContext,
}

/// Build the router. `ctx` carries the default tenant; handlers swap in
/// the tenant named by each request.
pub fn router(tools: Arc<ToolRegistry>, ctx: ToolContext) -> Router {
    let bridge = McpBridge::new(tools.clone(), ctx.clone());
    let mcp = StreamableHttpService::new(
        move || Ok(bridge.clone()),
        LocalSessionManager::default().into(),
        Default::default(),
    );

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/tools/list", get(handle_list_tools))
        .route("/tools/{name}", post(handle_tool_call))
        .nest_service("/mcp", mcp)
        .layer(cors)
        .with_state(AppState { tools, ctx })
}

/// Serve until the process is terminated.
pub async fn run_server(tools: Arc<ToolRegistry>, ctx: ToolContext) -> anyhow::Result<()> {
    let bind_addr = ctx.config.server.bind.clone();
    for t in tools.tools() {
        info!(tool = t.name(), "registered POST /tools/{}", t.name());
    }

    let app = router(tools, ctx);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!(bind = %bind_addr, "listening (MCP endpoint at /mcp)");
    axum::serve(listener, app).await?;
    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn app_error(status: StatusCode, code: &str, message: String) -> AppError {
    AppError {
        status,
        code: code.to_string(),
        message,
    }
}

/// Map a tool failure to a status by its message.
fn classify_tool_error(tool_name: &str, err: anyhow::Error) -> AppError {
    let msg = format!("{:#}", err);
    let message = format!("{}: {}", tool_name, msg);

    if msg.contains("not found") {
        app_error(StatusCode::NOT_FOUND, "not_found", message)
    } else if msg.contains("invalid") || msg.contains("missing required") {
        app_error(StatusCode::BAD_REQUEST, "bad_request", message)
    } else if msg.contains("timed out") {
        app_error(StatusCode::REQUEST_TIMEOUT, "timeout", message)
    } else {
        app_error(StatusCode::INTERNAL_SERVER_ERROR, "tool_error", message)
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ GET /tools/list ============

#[derive(Serialize)]
struct ToolListResponse {
    tools: Vec<ToolInfo>,
}

async fn handle_list_tools(State(state): State<AppState>) -> Json<ToolListResponse> {
    let tools = state
        .tools
        .tools()
        .iter()
        .map(|t| ToolInfo::of(t.as_ref()))
        .collect();
    Json(ToolListResponse { tools })
}

// ============ POST /tools/{name} ============

#[derive(Serialize)]
struct ToolCallResponse {
    result: ToolOutput,
}

fn tenant_from(headers: &HeaderMap) -> String {
    headers
        .get(TENANT_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .unwrap_or(DEFAULT_TENANT)
        .to_string()
}

async fn handle_tool_call(
    State(state): State<AppState>,
    Path(name): Path<String>,
    headers: HeaderMap,
    Json(params): Json<serde_json::Value>,
) -> Result<Json<ToolCallResponse>, AppError> {
    if state.tools.find(&name).is_none() {
        return Err(app_error(
            StatusCode::NOT_FOUND,
            "not_found",
            format!("no tool registered with name: {}", name),
        ));
    }

    let ctx = state.ctx.for_tenant(tenant_from(&headers));
    let result = state
        .tools
        .call(&name, params, &ctx)
        .await
        .map_err(|e| classify_tool_error(&name, e))?;
    Ok(Json(ToolCallResponse { result }))
}

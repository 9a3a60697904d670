//! # pgsemantic
//!
//! Semantic search over existing PostgreSQL tables that carry pgvector
//! embeddings, shaped for LLM context windows.
//!
//! A query is embedded once, matched against every vector column of the
//! target table in a single weighted distance query, and the matching
//! rows' text is chunked, reranked with BM25, diversified with MMR, and
//! trimmed to a token budget. The pipeline itself lives in
//! `pgsemantic-core`; this crate adds configuration, embedding providers,
//! the PostgreSQL store, and the CLI, HTTP, and MCP surfaces.
//!
//! ## Architecture
//!
//! ```text
//!   CLI ─────────┐
//!   HTTP /tools ─┼──▶ ToolRegistry ──▶ ConnectionRegistry ──▶ PgStore
//!   MCP /mcp ────┘    (similarity_search,        (tenant)         │
//!                      list_vector_tables)                         ▼
//!                                          pgsemantic_core::run_search
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`db`] | Connection pool and URL redaction |
//! | [`embedding`] | OpenAI, Voyage, and Ollama query embedders |
//! | [`pg_store`] | PostgreSQL implementation of the core `Store` |
//! | [`registry`] | Lazily connected stores per tenant |
//! | [`search`] | Parameter merging, timeout, rendering |
//! | [`format`] | `full`, `summary`, and `ids_only` output |
//! | [`traits`] | `Tool` trait, built-in tools, registry |
//! | [`server`] | HTTP API |
//! | [`mcp`] | MCP Streamable HTTP bridge |

pub mod config;
pub mod db;
pub mod embedding;
pub mod format;
pub mod mcp;
pub mod pg_store;
pub mod registry;
pub mod search;
pub mod server;
pub mod traits;

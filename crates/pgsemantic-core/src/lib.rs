//! # pgsemantic core
//!
//! Runtime-free retrieval logic for semantic search over pgvector tables:
//! data models, column binding, chunking, BM25 reranking, MMR selection,
//! token budgeting, and the store and embedding traits the pipeline runs
//! against.
//!
//! This crate contains no tokio, sqlx, or HTTP dependencies. The
//! PostgreSQL store, embedding providers, and tool surfaces live in the
//! `pgsemantic` app crate.

pub mod binder;
pub mod bm25;
pub mod budget;
pub mod chunk;
pub mod embedding;
pub mod error;
pub mod mmr;
pub mod models;
pub mod search;
pub mod store;

pub use error::SearchError;
pub use search::{run_search, SearchOutcome, SearchReport, SearchRequest};

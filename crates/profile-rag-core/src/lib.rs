//! # Profile RAG Core
//!
//! Runtime-free retrieval logic shared by every `profile-rag` frontend:
//! data models, the header-aware chunker, the context formatter, the
//! index/embedding/rerank traits with their in-memory implementations,
//! and dense-first result fusion.
//!
//! This crate has no tokio, sqlx, HTTP, or filesystem dependencies. The
//! application crate supplies concrete backends and drives the async
//! pipeline.

pub mod chunk;
pub mod embedding;
pub mod error;
pub mod format;
pub mod fusion;
pub mod index;
pub mod models;
pub mod rerank;

pub use error::{RagError, Result};

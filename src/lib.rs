//! # Profile RAG
//!
//! Hybrid retrieval over one person's documents (resumes, notes, project
//! write-ups). Every document is chunked once and written to two parallel
//! indexes: a sparse keyword index and a dense embedding index. Queries hit
//! both, merge dense-first, and rerank the deduplicated shortlist.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────┐   ┌──────────────────┐   ┌─────────────────┐
//! │ CLI / HTTP│──▶│ ingest           │──▶│ sparse index    │
//! │ (prag)    │   │ chunk+summarize  │   │ dense index     │
//! └───────────┘   │ +format+write    │   └────────┬────────┘
//!                 └──────────────────┘            │
//!                 ┌──────────────────┐            │
//!                 │ search           │◀───────────┘
//!                 │ merge → rerank   │
//!                 └──────────────────┘
//! ```
//!
//! Chunking, formatting, fusion, reranking, and the provider traits live in
//! the runtime-free `profile-rag-core` crate. This crate adds the async
//! pipeline, concrete providers (SQLite, Pinecone, OpenAI, Ollama), the
//! profile store, and the CLI and HTTP surfaces.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`context`] | Explicitly constructed provider handles |
//! | [`ingest`] | Ingestion pipeline |
//! | [`search`] | Hybrid retrieval |
//! | [`writer`] | Owner clear and batched dual writes |
//! | [`summarize`] | Document summaries for dense context |
//! | [`guard`] | Timeouts and cancellation for remote calls |
//! | [`sqlite_index`] | SQLite FTS5 / vector index backend |
//! | [`pinecone`] | Hosted index and reranker backend |
//! | [`embedding`] | Remote embedding providers |
//! | [`completion`] | Chat completion providers |
//! | [`profiles`] | User profile store |
//! | [`server`] | HTTP server |
//! | [`cli`] | Command runners for `prag` |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod cli;
pub mod completion;
pub mod config;
pub mod context;
pub mod db;
pub mod embedding;
pub mod guard;
pub mod ingest;
pub mod migrate;
pub mod pinecone;
pub mod profiles;
pub mod search;
pub mod server;
pub mod sqlite_index;
pub mod summarize;
pub mod writer;

pub use profile_rag_core as core;

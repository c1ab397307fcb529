//! Index abstraction for the sparse and dense chunk stores.
//!
//! Every chunk is written to two indexes, one per [`IndexKind`]. The
//! [`VectorIndex`] trait is the seam between the ingestion/retrieval
//! pipeline and a concrete backend (in-memory, SQLite, hosted).
//!
//! Records are scoped by owner: ingestion clears an owner's records and
//! rewrites them, and searches only see the requesting owner's records.
//!
//! # Operations
//!
//! | Method | Purpose |
//! |--------|---------|
//! | [`upsert`](VectorIndex::upsert) | Insert or replace records by id |
//! | [`delete_owner`](VectorIndex::delete_owner) | Remove every record of one owner |
//! | [`search`](VectorIndex::search) | Top-K hits for a query within one owner |

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{IndexKind, IndexRecord, SearchHit};

/// A named, owner-scoped collection of chunk records.
///
/// No ordering or locking is promised across concurrent callers; a record
/// upserted twice with the same id keeps the last write.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Which of the two parallel indexes this is.
    fn kind(&self) -> IndexKind;

    /// Physical index name (e.g. `"documents-sparse"`).
    fn name(&self) -> &str;

    /// Insert or replace records. Idempotent per record id.
    async fn upsert(&self, records: &[IndexRecord]) -> Result<()>;

    /// Remove every record belonging to `owner_id`.
    async fn delete_owner(&self, owner_id: &str) -> Result<()>;

    /// Return up to `top_k` hits for `query` among `owner_id`'s records,
    /// best first.
    async fn search(&self, query: &str, top_k: usize, owner_id: &str) -> Result<Vec<SearchHit>>;
}

//! Error taxonomy shared by ingestion and retrieval.
//!
//! Provider traits ([`VectorIndex`](crate::index::VectorIndex),
//! [`Embedder`](crate::embedding::Embedder), [`Reranker`](crate::rerank::Reranker))
//! return `anyhow::Result` so backends can attach free-form context. Pipeline
//! boundaries convert those failures into a [`RagError`], which carries a
//! stable machine-readable [`code`](RagError::code) for the CLI and HTTP layers.

use thiserror::Error;

use crate::models::IndexKind;

#[derive(Debug, Error)]
pub enum RagError {
    /// Missing or malformed caller input (empty query, no files, bad chunking config).
    #[error("validation failed: {0}")]
    Validation(String),

    /// An embedding, search, rerank, or completion provider failed or timed out.
    #[error("{stage} failed: {message}")]
    Upstream { stage: String, message: String },

    /// Some batches of a file→index stream were written before a batch failed.
    #[error("partial write to {index} index: {written} chunks written, batch {failed_batch} failed: {message}")]
    PartialWrite {
        index: IndexKind,
        written: usize,
        failed_batch: usize,
        message: String,
    },

    /// No indexed content exists for the requested owner.
    #[error("not found: {0}")]
    NotFound(String),

    /// The call tree was cancelled before completion.
    #[error("cancelled: {0}")]
    Cancelled(String),
}

impl RagError {
    pub fn validation(message: impl Into<String>) -> Self {
        RagError::Validation(message.into())
    }

    /// Wrap a provider failure, keeping the whole `anyhow` context chain.
    pub fn upstream(stage: impl Into<String>, err: &anyhow::Error) -> Self {
        RagError::Upstream {
            stage: stage.into(),
            message: format!("{:#}", err),
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            RagError::Validation(_) => "validation_error",
            RagError::Upstream { .. } => "upstream_error",
            RagError::PartialWrite { .. } => "partial_write",
            RagError::NotFound(_) => "not_found",
            RagError::Cancelled(_) => "cancelled",
        }
    }
}

pub type Result<T> = std::result::Result<T, RagError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upstream_keeps_context_chain() {
        let err = anyhow::anyhow!("connection refused").context("dense search");
        let rag = RagError::upstream("search", &err);
        let display = rag.to_string();
        assert!(display.contains("search failed"));
        assert!(display.contains("dense search"));
        assert!(display.contains("connection refused"));
        assert_eq!(rag.code(), "upstream_error");
    }

    #[test]
    fn test_partial_write_display() {
        let err = RagError::PartialWrite {
            index: IndexKind::Dense,
            written: 100,
            failed_batch: 2,
            message: "HTTP 503".to_string(),
        };
        let display = err.to_string();
        assert!(display.contains("dense"));
        assert!(display.contains("100 chunks written"));
        assert!(display.contains("batch 2"));
        assert_eq!(err.code(), "partial_write");
    }

    #[test]
    fn test_codes_are_distinct() {
        let errors = [
            RagError::validation("q"),
            RagError::Upstream {
                stage: "rerank".into(),
                message: "x".into(),
            },
            RagError::NotFound("owner".into()),
            RagError::Cancelled("query".into()),
        ];
        let mut codes: Vec<&str> = errors.iter().map(|e| e.code()).collect();
        codes.dedup();
        assert_eq!(codes.len(), 4);
    }
}

//! Core data models that flow through ingestion and retrieval.
//!
//! A [`Document`] is transient input. The chunker turns it into immutable
//! [`Chunk`]s, each of which is stored once per index as an [`IndexRecord`].
//! Searches return [`SearchHit`]s, and the fused, reranked output is a list
//! of [`MergedResult`]s.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::format::format_chunk;

/// A source document submitted for ingestion. Never persisted directly.
#[derive(Debug, Clone)]
pub struct Document {
    pub text: String,
    pub file_name: String,
    pub owner_id: String,
    pub email: String,
}

/// 1-based inclusive line span of a chunk within its source document.
///
/// Serialized as a two-element array `[from, to]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "[usize; 2]", into = "[usize; 2]")]
pub struct LineRange {
    pub from: usize,
    pub to: usize,
}

impl From<[usize; 2]> for LineRange {
    fn from(v: [usize; 2]) -> Self {
        LineRange {
            from: v[0],
            to: v[1],
        }
    }
}

impl From<LineRange> for [usize; 2] {
    fn from(r: LineRange) -> Self {
        [r.from, r.to]
    }
}

/// The two parallel indexes every chunk is written to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexKind {
    /// Lexical / term-weighted matching.
    Sparse,
    /// Embedding-based semantic matching.
    Dense,
}

impl IndexKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            IndexKind::Sparse => "sparse",
            IndexKind::Dense => "dense",
        }
    }
}

impl fmt::Display for IndexKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An immutable slice of a document, ready for indexing.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Chunk {
    /// `<ownerId>-chunk-<sequenceIndex>`.
    pub id: String,
    pub sequence_index: usize,
    pub raw_text: String,
    /// Raw text prefixed with summary and heading context.
    pub formatted_text: String,
    pub line_range: LineRange,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub heading: Option<String>,
    pub file_name: String,
    pub owner_id: String,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_summary: Option<String>,
}

/// Build the chunk id for an owner and run-wide sequence index.
pub fn chunk_id(owner_id: &str, sequence_index: usize) -> String {
    format!("{}-chunk-{}", owner_id, sequence_index)
}

/// Typed metadata stored alongside each record in an index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordFields {
    /// The text this index searches and embeds.
    pub text: String,
    pub raw_text: String,
    pub sequence_index: usize,
    pub line_range: LineRange,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heading: Option<String>,
    pub file_name: String,
    pub owner_id: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_summary: Option<String>,
}

/// A keyed record as written to one index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexRecord {
    pub id: String,
    pub fields: RecordFields,
}

impl IndexRecord {
    /// Project a chunk into the record stored in `kind`.
    ///
    /// Only the dense record carries the document summary; the sparse record
    /// is formatted with heading context alone.
    pub fn for_index(chunk: &Chunk, kind: IndexKind) -> Self {
        let (text, document_summary) = match kind {
            IndexKind::Dense => (
                chunk.formatted_text.clone(),
                chunk.document_summary.clone(),
            ),
            IndexKind::Sparse => (
                format_chunk(&chunk.raw_text, None, chunk.heading.as_deref()),
                None,
            ),
        };
        IndexRecord {
            id: chunk.id.clone(),
            fields: RecordFields {
                text,
                raw_text: chunk.raw_text.clone(),
                sequence_index: chunk.sequence_index,
                line_range: chunk.line_range,
                heading: chunk.heading.clone(),
                file_name: chunk.file_name.clone(),
                owner_id: chunk.owner_id.clone(),
                email: chunk.email.clone(),
                document_summary,
            },
        }
    }
}

/// One ranked hit from a single index.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchHit {
    pub chunk_id: String,
    pub score: f64,
    pub source_index: IndexKind,
    pub fields: RecordFields,
}

/// A deduplicated hit with its rerank score.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MergedResult {
    #[serde(flatten)]
    pub hit: SearchHit,
    pub rerank_score: f64,
    /// Position in the dense-first merged list, used as the rerank tie-break.
    pub merge_rank: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_chunk() -> Chunk {
        Chunk {
            id: chunk_id("ana@example.com", 3),
            sequence_index: 3,
            raw_text: "Built the design system.".to_string(),
            formatted_text: format_chunk(
                "Built the design system.",
                Some("Senior engineer resume."),
                Some("Frontend Experience"),
            ),
            line_range: LineRange { from: 4, to: 6 },
            heading: Some("Frontend Experience".to_string()),
            file_name: "resume.md".to_string(),
            owner_id: "ana@example.com".to_string(),
            email: "ana@example.com".to_string(),
            document_summary: Some("Senior engineer resume.".to_string()),
        }
    }

    #[test]
    fn test_chunk_id_format() {
        assert_eq!(chunk_id("me", 0), "me-chunk-0");
        assert_eq!(chunk_id("a@b.c", 12), "a@b.c-chunk-12");
    }

    #[test]
    fn test_line_range_serializes_as_pair() {
        let json = serde_json::to_string(&LineRange { from: 2, to: 9 }).unwrap();
        assert_eq!(json, "[2,9]");
        let back: LineRange = serde_json::from_str("[5,7]").unwrap();
        assert_eq!(back, LineRange { from: 5, to: 7 });
    }

    #[test]
    fn test_only_dense_record_carries_summary() {
        let chunk = sample_chunk();
        let dense = IndexRecord::for_index(&chunk, IndexKind::Dense);
        let sparse = IndexRecord::for_index(&chunk, IndexKind::Sparse);

        assert_eq!(dense.id, sparse.id);
        assert_eq!(
            dense.fields.document_summary.as_deref(),
            Some("Senior engineer resume.")
        );
        assert!(dense.fields.text.starts_with("Summary: "));
        assert!(sparse.fields.document_summary.is_none());
        assert!(sparse.fields.text.starts_with("Heading: Frontend Experience"));
    }

    #[test]
    fn test_record_fields_omit_absent_optionals() {
        let mut chunk = sample_chunk();
        chunk.heading = None;
        chunk.document_summary = None;
        let record = IndexRecord::for_index(&chunk, IndexKind::Dense);
        let value = serde_json::to_value(&record.fields).unwrap();
        assert!(value.get("heading").is_none());
        assert!(value.get("documentSummary").is_none());
        assert_eq!(value["fileName"], "resume.md");
        assert_eq!(value["lineRange"], serde_json::json!([4, 6]));
    }

    #[test]
    fn test_index_kind_display() {
        assert_eq!(IndexKind::Sparse.to_string(), "sparse");
        assert_eq!(
            serde_json::to_string(&IndexKind::Dense).unwrap(),
            "\"dense\""
        );
    }
}

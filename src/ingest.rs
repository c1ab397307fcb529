//! Ingestion pipeline: chunk → summarize → format → dual write.
//!
//! # Flow
//!
//! 1. Validate the request (owner, email, at least one file).
//! 2. Chunk every file up front, assigning run-wide sequence offsets in
//!    submission order so chunk ids are unique across the whole run.
//! 3. Clear the owner from both indexes (concurrently, once per request).
//! 4. Process all files concurrently, each under its own child
//!    cancellation token: summarize, format, then write the sparse and
//!    dense record streams concurrently.
//!
//! Every submitted file gets exactly one [`FileReport`], in submission
//! order. Per-file failures never abort sibling files.

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use profile_rag_core::chunk::{build_chunks, split_document, Window};
use profile_rag_core::models::{Document, IndexKind, IndexRecord};
use profile_rag_core::RagError;

use crate::context::ServiceContext;
use crate::writer::{clear_owner, write_batches};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestFile {
    pub file_name: String,
    pub content: String,
}

#[derive(Debug, Clone)]
pub struct IngestRequest {
    pub owner_id: String,
    pub email: String,
    pub files: Vec<IngestFile>,
}

impl IngestRequest {
    /// Reject requests that could never write anything.
    pub fn validate(&self) -> Result<(), RagError> {
        if self.owner_id.trim().is_empty() {
            return Err(RagError::validation("owner id is required"));
        }
        if self.email.trim().is_empty() {
            return Err(RagError::validation("email is required"));
        }
        if self.files.is_empty() {
            return Err(RagError::validation("no files provided"));
        }
        Ok(())
    }
}

/// Machine-readable failure attached to a file report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileError {
    pub code: String,
    pub message: String,
}

impl From<&RagError> for FileError {
    fn from(e: &RagError) -> Self {
        FileError {
            code: e.code().to_string(),
            message: e.to_string(),
        }
    }
}

/// Outcome of ingesting one file.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileReport {
    pub file_name: String,
    /// Chunks present in both indexes.
    pub chunks_processed: usize,
    pub summary_applied: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<FileError>,
}

impl FileReport {
    fn failed(file_name: &str, chunks_processed: usize, summary_applied: bool, e: &RagError) -> Self {
        FileReport {
            file_name: file_name.to_string(),
            chunks_processed,
            summary_applied,
            error: Some(FileError::from(e)),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

struct PlannedFile {
    doc: Document,
    windows: Vec<Window>,
    first_index: usize,
}

/// Ingest a request's files for one owner, replacing the owner's content.
///
/// Fails only on validation errors; everything else is reported per file.
pub async fn ingest(
    ctx: &ServiceContext,
    request: IngestRequest,
    cancel: &CancellationToken,
) -> Result<Vec<FileReport>, RagError> {
    request.validate()?;
    let owner_id = request.owner_id.trim().to_string();
    let email = request.email.trim().to_string();

    let mut next_index = 0;
    let planned: Vec<PlannedFile> = request
        .files
        .into_iter()
        .map(|file| {
            let windows = split_document(&file.content, &ctx.chunking);
            let first_index = next_index;
            next_index += windows.len();
            PlannedFile {
                doc: Document {
                    text: file.content,
                    file_name: file.file_name,
                    owner_id: owner_id.clone(),
                    email: email.clone(),
                },
                windows,
                first_index,
            }
        })
        .collect();

    tracing::info!(
        owner = %owner_id,
        files = planned.len(),
        chunks = next_index,
        "ingestion planned"
    );

    if let Err(e) = clear_owner(ctx, &owner_id, cancel).await {
        tracing::warn!(owner = %owner_id, error = %e, "owner clear failed, no files written");
        return Ok(planned
            .iter()
            .map(|p| FileReport::failed(&p.doc.file_name, 0, false, &e))
            .collect());
    }

    let reports = join_all(planned.iter().map(|p| {
        let span = tracing::info_span!("ingest_file", file = %p.doc.file_name);
        process_file(ctx, p, cancel.child_token()).instrument(span)
    }))
    .await;

    Ok(reports)
}

async fn process_file(ctx: &ServiceContext, plan: &PlannedFile, cancel: CancellationToken) -> FileReport {
    let file_name = plan.doc.file_name.as_str();
    if cancel.is_cancelled() {
        return FileReport::failed(file_name, 0, false, &RagError::Cancelled("ingest".to_string()));
    }

    let summary = match &ctx.summarizer {
        Some(summarizer) if !plan.windows.is_empty() => {
            match summarizer.summary_for(&plan.doc.text, &cancel).await {
                Ok(summary) => summary,
                Err(e) => {
                    tracing::warn!(error = %e, "summary failed, file not ingested");
                    return FileReport::failed(file_name, 0, false, &e);
                }
            }
        }
        _ => None,
    };
    let summary_applied = summary.is_some();

    let chunks = build_chunks(&plan.doc, &plan.windows, plan.first_index, summary.as_deref());
    if chunks.is_empty() {
        tracing::info!("empty document, nothing to write");
        return FileReport {
            file_name: file_name.to_string(),
            chunks_processed: 0,
            summary_applied,
            error: None,
        };
    }

    let sparse_records: Vec<IndexRecord> = chunks
        .iter()
        .map(|c| IndexRecord::for_index(c, IndexKind::Sparse))
        .collect();
    let dense_records: Vec<IndexRecord> = chunks
        .iter()
        .map(|c| IndexRecord::for_index(c, IndexKind::Dense))
        .collect();

    let settings = &ctx.settings;
    let (sparse, dense) = tokio::join!(
        write_batches(
            ctx.sparse.as_ref(),
            &sparse_records,
            settings.batch_size,
            settings.index_timeout,
            &cancel
        ),
        write_batches(
            ctx.dense.as_ref(),
            &dense_records,
            settings.batch_size,
            settings.index_timeout,
            &cancel
        ),
    );

    let chunks_processed = sparse.written.min(dense.written);
    // Report the stream that got less far; dense wins a tie.
    let error = if sparse.written < dense.written {
        sparse.error.or(dense.error)
    } else {
        dense.error.or(sparse.error)
    };

    match error {
        Some(e) => FileReport::failed(file_name, chunks_processed, summary_applied, &e),
        None => {
            tracing::info!(chunks = chunks_processed, summary_applied, "file ingested");
            FileReport {
                file_name: file_name.to_string(),
                chunks_processed,
                summary_applied,
                error: None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(files: Vec<(&str, &str)>) -> IngestRequest {
        IngestRequest {
            owner_id: "ana@example.com".to_string(),
            email: "ana@example.com".to_string(),
            files: files
                .into_iter()
                .map(|(n, c)| IngestFile {
                    file_name: n.to_string(),
                    content: c.to_string(),
                })
                .collect(),
        }
    }

    #[tokio::test]
    async fn test_validation_errors() {
        let ctx = ServiceContext::in_memory();
        let token = CancellationToken::new();

        let err = ingest(&ctx, request(vec![]), &token).await.unwrap_err();
        assert_eq!(err.code(), "validation_error");

        let mut req = request(vec![("a.md", "x")]);
        req.email = "  ".to_string();
        assert!(ingest(&ctx, req, &token).await.is_err());
    }

    #[tokio::test]
    async fn test_reports_in_submission_order() {
        let ctx = ServiceContext::in_memory();
        let reports = ingest(
            &ctx,
            request(vec![("b.md", "## B\nbeta"), ("a.md", "## A\nalpha"), ("empty.md", "")]),
            &CancellationToken::new(),
        )
        .await
        .unwrap();
        let names: Vec<&str> = reports.iter().map(|r| r.file_name.as_str()).collect();
        assert_eq!(names, vec!["b.md", "a.md", "empty.md"]);
        assert_eq!(reports[2].chunks_processed, 0);
        assert!(reports.iter().all(|r| r.is_ok()));
    }

    #[tokio::test]
    async fn test_cancelled_request_fails_every_file() {
        let ctx = ServiceContext::in_memory();
        let token = CancellationToken::new();
        token.cancel();
        let reports = ingest(&ctx, request(vec![("a.md", "text"), ("b.md", "text")]), &token)
            .await
            .unwrap();
        assert_eq!(reports.len(), 2);
        for r in &reports {
            assert_eq!(r.error.as_ref().unwrap().code, "cancelled");
        }
    }

    #[test]
    fn test_report_serializes_camel_case() {
        let report = FileReport {
            file_name: "resume.md".to_string(),
            chunks_processed: 3,
            summary_applied: false,
            error: None,
        };
        let v = serde_json::to_value(&report).unwrap();
        assert_eq!(v["fileName"], "resume.md");
        assert_eq!(v["chunksProcessed"], 3);
        assert!(v.get("error").is_none());
    }
}

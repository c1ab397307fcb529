//! Hybrid retrieval: sparse + dense → merge → rerank.
//!
//! ```text
//!            ┌─ sparse.search(q, top_k) ─┐
//!   query ───┤                           ├─ merge_hits ─▶ rerank ─▶ top_n
//!            └─ dense.search(q, top_k)  ─┘  (dense first)
//! ```
//!
//! Both index queries run concurrently under the request's cancellation
//! token. If either fails the whole call fails, unless the caller opted
//! into partial results; in that case the failed side is listed in
//! [`SearchResponse::degraded`] and ranking continues on the other side.

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use profile_rag_core::fusion::merge_hits;
use profile_rag_core::models::{IndexKind, MergedResult, SearchHit};
use profile_rag_core::rerank::apply_rerank;
use profile_rag_core::RagError;

use crate::config::RerankText;
use crate::context::ServiceContext;
use crate::guard::guarded;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchRequest {
    pub query: String,
    /// Falls back to `retrieval.default_owner`.
    pub owner_id: Option<String>,
    pub top_n: Option<usize>,
    pub allow_partial: Option<bool>,
}

impl SearchRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Self::default()
        }
    }

    pub fn owner(mut self, owner_id: impl Into<String>) -> Self {
        self.owner_id = Some(owner_id.into());
        self
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
    /// Reranked, deduplicated results.
    pub results: Vec<MergedResult>,
    pub sparse_results: Vec<SearchHit>,
    pub dense_results: Vec<SearchHit>,
    /// Indexes whose query failed; non-empty only with partial results allowed.
    pub degraded: Vec<IndexKind>,
}

pub async fn search(
    ctx: &ServiceContext,
    request: &SearchRequest,
    cancel: &CancellationToken,
) -> Result<SearchResponse, RagError> {
    let query = request.query.trim();
    if query.is_empty() {
        return Err(RagError::validation("query is required"));
    }
    let settings = &ctx.settings;
    let owner = request
        .owner_id
        .as_deref()
        .map(str::trim)
        .filter(|o| !o.is_empty())
        .or(settings.default_owner.as_deref())
        .ok_or_else(|| RagError::validation("owner id is required"))?;
    let top_n = request.top_n.unwrap_or(settings.top_n);
    if top_n == 0 {
        return Err(RagError::validation("top_n must be at least 1"));
    }
    let allow_partial = request.allow_partial.unwrap_or(settings.allow_partial);

    let span = tracing::info_span!("search", owner = %owner);
    async move {
        let (sparse, dense) = tokio::join!(
            guarded(
                "sparse search",
                settings.index_timeout,
                cancel,
                ctx.sparse.search(query, settings.top_k, owner)
            ),
            guarded(
                "dense search",
                settings.index_timeout,
                cancel,
                ctx.dense.search(query, settings.top_k, owner)
            ),
        );

        let mut degraded = Vec::new();
        let (sparse_results, dense_results) = match (sparse, dense) {
            (Ok(s), Ok(d)) => (s, d),
            (Err(e @ RagError::Cancelled(_)), _) | (_, Err(e @ RagError::Cancelled(_))) => {
                return Err(e)
            }
            (Err(e), Ok(d)) if allow_partial => {
                tracing::warn!(error = %e, "sparse search failed, continuing with dense only");
                degraded.push(IndexKind::Sparse);
                (Vec::new(), d)
            }
            (Ok(s), Err(e)) if allow_partial => {
                tracing::warn!(error = %e, "dense search failed, continuing with sparse only");
                degraded.push(IndexKind::Dense);
                (s, Vec::new())
            }
            (Err(e), _) | (_, Err(e)) => return Err(e),
        };

        let candidates = merge_hits(&dense_results, &sparse_results);
        tracing::info!(
            sparse = sparse_results.len(),
            dense = dense_results.len(),
            merged = candidates.len(),
            "hybrid candidates merged"
        );
        if candidates.is_empty() {
            return Err(RagError::NotFound(format!(
                "no indexed content matches for owner {}",
                owner
            )));
        }

        let texts: Vec<String> = candidates
            .iter()
            .map(|hit| match settings.rerank_text {
                RerankText::Formatted => hit.fields.text.clone(),
                RerankText::Raw => hit.fields.raw_text.clone(),
            })
            .collect();
        let scores = guarded(
            "rerank",
            settings.rerank_timeout,
            cancel,
            ctx.reranker.rerank(query, &texts, top_n),
        )
        .await?;
        let results = apply_rerank(candidates, &scores, top_n)?;

        tracing::info!(results = results.len(), "search complete");
        Ok(SearchResponse {
            results,
            sparse_results,
            dense_results,
            degraded,
        })
    }
    .instrument(span)
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::{ingest, IngestFile, IngestRequest};

    async fn seeded() -> ServiceContext {
        let ctx = ServiceContext::in_memory();
        ingest(
            &ctx,
            IngestRequest {
                owner_id: "ana".to_string(),
                email: "ana@example.com".to_string(),
                files: vec![IngestFile {
                    file_name: "resume.md".to_string(),
                    content: "## Backend\nRust services and PostgreSQL.\n\n## Frontend Experience\nReact design system work.\n".to_string(),
                }],
            },
            &CancellationToken::new(),
        )
        .await
        .unwrap();
        ctx
    }

    #[tokio::test]
    async fn test_empty_query_is_validation_error() {
        let ctx = ServiceContext::in_memory();
        let err = search(&ctx, &SearchRequest::new("  ").owner("ana"), &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.code(), "validation_error");
    }

    #[tokio::test]
    async fn test_missing_owner_without_default() {
        let ctx = ServiceContext::in_memory();
        let err = search(&ctx, &SearchRequest::new("rust"), &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.code(), "validation_error");
    }

    #[tokio::test]
    async fn test_unknown_owner_is_not_found() {
        let ctx = seeded().await;
        let err = search(&ctx, &SearchRequest::new("rust").owner("bob"), &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.code(), "not_found");
    }

    #[tokio::test]
    async fn test_results_are_deduplicated_and_bounded() {
        let ctx = seeded().await;
        let mut req = SearchRequest::new("react design").owner("ana");
        req.top_n = Some(1);
        let resp = search(&ctx, &req, &CancellationToken::new()).await.unwrap();
        assert_eq!(resp.results.len(), 1);
        assert!(resp.degraded.is_empty());
        assert_eq!(resp.results[0].hit.fields.heading.as_deref(), Some("Frontend Experience"));
    }

    #[tokio::test]
    async fn test_cancelled_query() {
        let ctx = seeded().await;
        let token = CancellationToken::new();
        token.cancel();
        let err = search(&ctx, &SearchRequest::new("rust").owner("ana"), &token)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "cancelled");
    }
}

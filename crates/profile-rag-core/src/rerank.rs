//! Relevance reranking of fused candidates.
//!
//! A [`Reranker`] scores `(query, candidate text)` pairs and returns up to
//! `top_n` [`RerankScore`]s pointing back into the candidate list by index.
//! [`apply_rerank`] validates that output against the candidates and produces
//! the final ordered [`MergedResult`] list.
//!
//! # Ordering
//!
//! Results are sorted by rerank score, highest first. Equal scores keep
//! their dense-first merge order, so identical inputs always produce an
//! identical ranking.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashSet;

use crate::embedding::tokenize;
use crate::error::RagError;
use crate::models::{MergedResult, SearchHit};

/// Relevance score for the candidate at `index`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RerankScore {
    pub index: usize,
    pub score: f64,
}

/// Cross-encoder style relevance scorer.
#[async_trait]
pub trait Reranker: Send + Sync {
    fn model_name(&self) -> &str;

    /// Score `documents` against `query`, returning at most `top_n` entries.
    async fn rerank(
        &self,
        query: &str,
        documents: &[String],
        top_n: usize,
    ) -> Result<Vec<RerankScore>>;
}

/// Network-free reranker based on query-term coverage.
///
/// The score is the share of distinct query terms found in the candidate
/// (terms of four or more chars also match as a word prefix, so "engineer"
/// matches "engineering"), plus a small bonus for repeated matches.
#[derive(Debug, Clone, Default)]
pub struct LexicalReranker;

impl LexicalReranker {
    pub const MODEL_NAME: &'static str = "lexical-coverage-v1";

    fn score(terms: &[String], document: &str) -> f64 {
        if terms.is_empty() {
            return 0.0;
        }
        let tokens: Vec<String> = tokenize(document).collect();
        let mut covered = 0usize;
        let mut occurrences = 0usize;
        for term in terms {
            let hits = tokens
                .iter()
                .filter(|t| *t == term || (term.chars().count() >= 4 && t.starts_with(term.as_str())))
                .count();
            if hits > 0 {
                covered += 1;
                occurrences += hits;
            }
        }
        let coverage = covered as f64 / terms.len() as f64;
        let density = occurrences as f64 / (occurrences as f64 + 5.0);
        0.9 * coverage + 0.1 * density
    }
}

#[async_trait]
impl Reranker for LexicalReranker {
    fn model_name(&self) -> &str {
        Self::MODEL_NAME
    }

    async fn rerank(
        &self,
        query: &str,
        documents: &[String],
        top_n: usize,
    ) -> Result<Vec<RerankScore>> {
        let mut terms: Vec<String> = Vec::new();
        for t in tokenize(query) {
            if !terms.contains(&t) {
                terms.push(t);
            }
        }

        let mut scores: Vec<RerankScore> = documents
            .iter()
            .enumerate()
            .map(|(index, doc)| RerankScore {
                index,
                score: Self::score(&terms, doc),
            })
            .collect();
        scores.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
        scores.truncate(top_n);
        Ok(scores)
    }
}

/// Attach rerank scores to merged candidates and order them.
///
/// Fails with [`RagError::Upstream`] when the scorer returns an index outside
/// the candidate list, the same index twice, or a non-finite score.
pub fn apply_rerank(
    candidates: Vec<SearchHit>,
    scores: &[RerankScore],
    top_n: usize,
) -> Result<Vec<MergedResult>, RagError> {
    let mut seen = HashSet::with_capacity(scores.len());
    for s in scores {
        if s.index >= candidates.len() {
            return Err(invalid_output(format!(
                "index {} out of range for {} candidates",
                s.index,
                candidates.len()
            )));
        }
        if !seen.insert(s.index) {
            return Err(invalid_output(format!("duplicate index {}", s.index)));
        }
        if !s.score.is_finite() {
            return Err(invalid_output(format!("non-finite score for index {}", s.index)));
        }
    }

    let mut slots: Vec<Option<SearchHit>> = candidates.into_iter().map(Some).collect();
    let mut results: Vec<MergedResult> = scores
        .iter()
        .filter_map(|s| {
            slots[s.index].take().map(|hit| MergedResult {
                hit,
                rerank_score: s.score,
                merge_rank: s.index,
            })
        })
        .collect();

    results.sort_by(|a, b| {
        b.rerank_score
            .partial_cmp(&a.rerank_score)
            .unwrap_or(Ordering::Equal)
            .then(a.merge_rank.cmp(&b.merge_rank))
    });
    results.truncate(top_n);
    Ok(results)
}

fn invalid_output(message: String) -> RagError {
    RagError::Upstream {
        stage: "rerank".to_string(),
        message: format!("invalid reranker output: {}", message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{IndexKind, LineRange, RecordFields};

    fn hit(id: &str) -> SearchHit {
        SearchHit {
            chunk_id: id.to_string(),
            score: 0.5,
            source_index: IndexKind::Dense,
            fields: RecordFields {
                text: id.to_string(),
                raw_text: id.to_string(),
                sequence_index: 0,
                line_range: LineRange { from: 1, to: 1 },
                heading: None,
                file_name: "f.md".to_string(),
                owner_id: "o".to_string(),
                email: "o@x".to_string(),
                document_summary: None,
            },
        }
    }

    fn score(index: usize, score: f64) -> RerankScore {
        RerankScore { index, score }
    }

    #[test]
    fn test_sorted_non_increasing_and_truncated() {
        let hits = vec![hit("a"), hit("b"), hit("c"), hit("d")];
        let scores = [score(0, 0.1), score(1, 0.9), score(2, 0.5), score(3, 0.7)];
        let out = apply_rerank(hits, &scores, 3).unwrap();
        let ids: Vec<&str> = out.iter().map(|r| r.hit.chunk_id.as_str()).collect();
        assert_eq!(ids, vec!["b", "d", "c"]);
        assert!(out.windows(2).all(|w| w[0].rerank_score >= w[1].rerank_score));
    }

    #[test]
    fn test_ties_keep_merge_order() {
        let hits = vec![hit("a"), hit("b"), hit("c")];
        let scores = [score(2, 0.5), score(0, 0.5), score(1, 0.5)];
        let out = apply_rerank(hits, &scores, 10).unwrap();
        let ranks: Vec<usize> = out.iter().map(|r| r.merge_rank).collect();
        assert_eq!(ranks, vec![0, 1, 2]);
    }

    #[test]
    fn test_rejects_out_of_range_and_duplicates() {
        let err = apply_rerank(vec![hit("a")], &[score(3, 1.0)], 5).unwrap_err();
        assert_eq!(err.code(), "upstream_error");

        let err = apply_rerank(vec![hit("a"), hit("b")], &[score(0, 1.0), score(0, 0.5)], 5)
            .unwrap_err();
        assert!(err.to_string().contains("duplicate index 0"));

        let err = apply_rerank(vec![hit("a")], &[score(0, f64::NAN)], 5).unwrap_err();
        assert_eq!(err.code(), "upstream_error");
    }

    #[test]
    fn test_scores_may_cover_subset() {
        let out = apply_rerank(vec![hit("a"), hit("b")], &[score(1, 0.3)], 5).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].hit.chunk_id, "b");
    }

    #[tokio::test]
    async fn test_lexical_reranker_prefers_coverage() {
        let docs = vec![
            "Heading: Education\n\nMSc in mathematics".to_string(),
            "Heading: Frontend Experience\n\nfrontend work with React".to_string(),
            "Heading: Backend Experience\n\nwork on billing services".to_string(),
        ];
        let out = LexicalReranker.rerank("frontend work", &docs, 2).await.unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].index, 1);
        assert_eq!(out[1].index, 2);
        assert!(out[0].score >= out[1].score);
    }

    #[tokio::test]
    async fn test_lexical_reranker_prefix_match() {
        let docs = vec!["Senior engineering manager".to_string()];
        let out = LexicalReranker.rerank("engineer", &docs, 1).await.unwrap();
        assert!(out[0].score > 0.8);
    }
}

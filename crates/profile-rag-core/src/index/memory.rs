//! In-memory [`VectorIndex`] for tests and local runs.
//!
//! Records live in a `BTreeMap` behind `std::sync::RwLock`, so iteration
//! and tie-breaking are deterministic. The sparse variant scores with
//! Okapi BM25 over the owner's records; the dense variant embeds record
//! text with an [`Embedder`] and ranks by cosine similarity.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::{Arc, RwLock};

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::embedding::{cosine_similarity, tokenize, Embedder};
use crate::models::{IndexKind, IndexRecord, SearchHit};

use super::VectorIndex;

const BM25_K1: f64 = 1.2;
const BM25_B: f64 = 0.75;

struct StoredRecord {
    record: IndexRecord,
    tokens: Vec<String>,
    vector: Option<Vec<f32>>,
}

/// In-memory index; see the module docs for scoring.
pub struct InMemoryIndex {
    kind: IndexKind,
    name: String,
    embedder: Option<Arc<dyn Embedder>>,
    records: RwLock<BTreeMap<String, StoredRecord>>,
}

impl InMemoryIndex {
    /// A lexical index scored with BM25.
    pub fn sparse(name: impl Into<String>) -> Self {
        Self {
            kind: IndexKind::Sparse,
            name: name.into(),
            embedder: None,
            records: RwLock::new(BTreeMap::new()),
        }
    }

    /// A semantic index that embeds records and queries with `embedder`.
    pub fn dense(name: impl Into<String>, embedder: Arc<dyn Embedder>) -> Self {
        Self {
            kind: IndexKind::Dense,
            name: name.into(),
            embedder: Some(embedder),
            records: RwLock::new(BTreeMap::new()),
        }
    }

    /// Sorted ids of the records stored for `owner_id`.
    pub fn ids(&self, owner_id: &str) -> Result<Vec<String>> {
        let records = self.records.read().map_err(|_| poisoned())?;
        Ok(records
            .values()
            .filter(|s| s.record.fields.owner_id == owner_id)
            .map(|s| s.record.id.clone())
            .collect())
    }

    /// Fetch one stored record by id.
    pub fn get(&self, id: &str) -> Result<Option<IndexRecord>> {
        let records = self.records.read().map_err(|_| poisoned())?;
        Ok(records.get(id).map(|s| s.record.clone()))
    }

    fn sparse_scores(
        records: &BTreeMap<String, StoredRecord>,
        query: &str,
        owner_id: &str,
    ) -> Vec<(String, f64)> {
        let terms: BTreeSet<String> = tokenize(query).collect();
        let docs: Vec<&StoredRecord> = records
            .values()
            .filter(|s| s.record.fields.owner_id == owner_id)
            .collect();
        if terms.is_empty() || docs.is_empty() {
            return Vec::new();
        }

        let n = docs.len() as f64;
        let avgdl = docs.iter().map(|d| d.tokens.len()).sum::<usize>() as f64 / n;
        let mut df: HashMap<&str, usize> = HashMap::new();
        for d in &docs {
            let unique: HashSet<&str> = d.tokens.iter().map(String::as_str).collect();
            for t in unique {
                if terms.contains(t) {
                    *df.entry(t).or_insert(0) += 1;
                }
            }
        }

        docs.iter()
            .filter_map(|d| {
                let dl = d.tokens.len() as f64;
                let mut score = 0.0;
                for term in &terms {
                    let tf = d.tokens.iter().filter(|t| *t == term).count() as f64;
                    if tf == 0.0 {
                        continue;
                    }
                    let df = df.get(term.as_str()).copied().unwrap_or(0) as f64;
                    let idf = (1.0 + (n - df + 0.5) / (df + 0.5)).ln();
                    let norm = BM25_K1 * (1.0 - BM25_B + BM25_B * dl / avgdl.max(1.0));
                    score += idf * tf * (BM25_K1 + 1.0) / (tf + norm);
                }
                (score > 0.0).then(|| (d.record.id.clone(), score))
            })
            .collect()
    }
}

fn poisoned() -> anyhow::Error {
    anyhow!("in-memory index lock poisoned")
}

#[async_trait]
impl VectorIndex for InMemoryIndex {
    fn kind(&self) -> IndexKind {
        self.kind
    }

    fn name(&self) -> &str {
        &self.name
    }

    async fn upsert(&self, records: &[IndexRecord]) -> Result<()> {
        let vectors: Vec<Option<Vec<f32>>> = match &self.embedder {
            Some(embedder) => {
                let texts: Vec<String> = records.iter().map(|r| r.fields.text.clone()).collect();
                let vectors = embedder.embed(&texts).await?;
                if vectors.len() != records.len() {
                    return Err(anyhow!(
                        "embedder returned {} vectors for {} records",
                        vectors.len(),
                        records.len()
                    ));
                }
                vectors.into_iter().map(Some).collect()
            }
            None => vec![None; records.len()],
        };

        let mut stored = self.records.write().map_err(|_| poisoned())?;
        for (record, vector) in records.iter().zip(vectors) {
            stored.insert(
                record.id.clone(),
                StoredRecord {
                    record: record.clone(),
                    tokens: tokenize(&record.fields.text).collect(),
                    vector,
                },
            );
        }
        Ok(())
    }

    async fn delete_owner(&self, owner_id: &str) -> Result<()> {
        let mut stored = self.records.write().map_err(|_| poisoned())?;
        stored.retain(|_, s| s.record.fields.owner_id != owner_id);
        Ok(())
    }

    async fn search(&self, query: &str, top_k: usize, owner_id: &str) -> Result<Vec<SearchHit>> {
        let query_vec = match &self.embedder {
            Some(embedder) => {
                let mut out = embedder.embed(&[query.to_string()]).await?;
                Some(out.pop().ok_or_else(|| anyhow!("embedder returned no query vector"))?)
            }
            None => None,
        };

        let records = self.records.read().map_err(|_| poisoned())?;
        let mut scored: Vec<(String, f64)> = match &query_vec {
            Some(qv) => records
                .values()
                .filter(|s| s.record.fields.owner_id == owner_id)
                .filter_map(|s| {
                    s.vector
                        .as_ref()
                        .map(|v| (s.record.id.clone(), cosine_similarity(qv, v) as f64))
                })
                .collect(),
            None => Self::sparse_scores(&records, query, owner_id),
        };

        // Stable sort over id-ordered input: ties stay in id order.
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(top_k);

        Ok(scored
            .into_iter()
            .filter_map(|(id, score)| {
                records.get(&id).map(|s| SearchHit {
                    chunk_id: id,
                    score,
                    source_index: self.kind,
                    fields: s.record.fields.clone(),
                })
            })
            .collect())
    }
}

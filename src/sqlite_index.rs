//! SQLite-backed [`VectorIndex`].
//!
//! Both logical indexes share the `index_records` table, separated by
//! `index_name`. Record fields are stored as JSON so the stored shape is
//! exactly [`RecordFields`].
//!
//! | Kind | Scoring |
//! |------|---------|
//! | sparse | FTS5 BM25 over `index_records_fts` |
//! | dense | brute-force cosine similarity over stored embedding BLOBs |

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use std::sync::Arc;

use profile_rag_core::embedding::{blob_to_vec, cosine_similarity, tokenize, vec_to_blob, Embedder};
use profile_rag_core::index::VectorIndex;
use profile_rag_core::models::{IndexKind, IndexRecord, RecordFields, SearchHit};

pub struct SqliteIndex {
    pool: SqlitePool,
    kind: IndexKind,
    name: String,
    embedder: Option<Arc<dyn Embedder>>,
}

impl SqliteIndex {
    pub fn sparse(pool: SqlitePool, name: impl Into<String>) -> Self {
        Self {
            pool,
            kind: IndexKind::Sparse,
            name: name.into(),
            embedder: None,
        }
    }

    pub fn dense(pool: SqlitePool, name: impl Into<String>, embedder: Arc<dyn Embedder>) -> Self {
        Self {
            pool,
            kind: IndexKind::Dense,
            name: name.into(),
            embedder: Some(embedder),
        }
    }

    async fn keyword_search(&self, query: &str, top_k: usize, owner_id: &str) -> Result<Vec<SearchHit>> {
        let Some(fts_query) = fts_query(query) else {
            return Ok(Vec::new());
        };

        let rows = sqlx::query(
            r#"
            SELECT index_records_fts.id AS id,
                   index_records_fts.rank AS rank,
                   r.fields_json AS fields_json
            FROM index_records_fts
            JOIN index_records r
              ON r.index_name = index_records_fts.index_name AND r.id = index_records_fts.id
            WHERE index_records_fts MATCH ?
              AND index_records_fts.index_name = ?
              AND index_records_fts.owner_id = ?
            ORDER BY index_records_fts.rank, index_records_fts.id
            LIMIT ?
            "#,
        )
        .bind(&fts_query)
        .bind(&self.name)
        .bind(owner_id)
        .bind(top_k as i64)
        .fetch_all(&self.pool)
        .await
        .with_context(|| format!("FTS query on index '{}'", self.name))?;

        rows.iter()
            .map(|row| {
                let rank: f64 = row.get("rank");
                self.hit(row.get("id"), -rank, row.get("fields_json"))
            })
            .collect()
    }

    async fn vector_search(&self, query_vec: &[f32], top_k: usize, owner_id: &str) -> Result<Vec<SearchHit>> {
        let rows = sqlx::query(
            r#"
            SELECT id, embedding, fields_json
            FROM index_records
            WHERE index_name = ? AND owner_id = ? AND embedding IS NOT NULL
            ORDER BY id
            "#,
        )
        .bind(&self.name)
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await?;

        let mut scored: Vec<(String, f64, String)> = rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                let similarity = cosine_similarity(query_vec, &blob_to_vec(&blob)) as f64;
                (row.get("id"), similarity, row.get("fields_json"))
            })
            .collect();

        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(top_k);

        scored
            .into_iter()
            .map(|(id, score, fields)| self.hit(id, score, fields))
            .collect()
    }

    fn hit(&self, id: String, score: f64, fields_json: String) -> Result<SearchHit> {
        let fields: RecordFields = serde_json::from_str(&fields_json)
            .with_context(|| format!("Corrupt fields for record '{}'", id))?;
        Ok(SearchHit {
            chunk_id: id,
            score,
            source_index: self.kind,
            fields,
        })
    }
}

/// Build an FTS5 query that ORs the quoted query terms.
///
/// Quoting keeps user input from being parsed as FTS5 syntax.
fn fts_query(query: &str) -> Option<String> {
    let terms: Vec<String> = tokenize(query).map(|t| format!("\"{}\"", t)).collect();
    if terms.is_empty() {
        None
    } else {
        Some(terms.join(" OR "))
    }
}

#[async_trait]
impl VectorIndex for SqliteIndex {
    fn kind(&self) -> IndexKind {
        self.kind
    }

    fn name(&self) -> &str {
        &self.name
    }

    async fn upsert(&self, records: &[IndexRecord]) -> Result<()> {
        let vectors = match &self.embedder {
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
                Some(vectors)
            }
            None => None,
        };

        let mut tx = self.pool.begin().await?;

        for (i, record) in records.iter().enumerate() {
            let fields_json = serde_json::to_string(&record.fields)?;
            let blob = vectors.as_ref().map(|v| vec_to_blob(&v[i]));

            sqlx::query(
                r#"
                INSERT INTO index_records (index_name, id, owner_id, text, fields_json, embedding)
                VALUES (?, ?, ?, ?, ?, ?)
                ON CONFLICT(index_name, id) DO UPDATE SET
                    owner_id = excluded.owner_id,
                    text = excluded.text,
                    fields_json = excluded.fields_json,
                    embedding = excluded.embedding
                "#,
            )
            .bind(&self.name)
            .bind(&record.id)
            .bind(&record.fields.owner_id)
            .bind(&record.fields.text)
            .bind(&fields_json)
            .bind(blob)
            .execute(&mut *tx)
            .await?;

            sqlx::query("DELETE FROM index_records_fts WHERE index_name = ? AND id = ?")
                .bind(&self.name)
                .bind(&record.id)
                .execute(&mut *tx)
                .await?;

            sqlx::query(
                "INSERT INTO index_records_fts (index_name, id, owner_id, text) VALUES (?, ?, ?, ?)",
            )
            .bind(&self.name)
            .bind(&record.id)
            .bind(&record.fields.owner_id)
            .bind(&record.fields.text)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn delete_owner(&self, owner_id: &str) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM index_records_fts WHERE index_name = ? AND owner_id = ?")
            .bind(&self.name)
            .bind(owner_id)
            .execute(&mut *tx)
            .await?;

        sqlx::query("DELETE FROM index_records WHERE index_name = ? AND owner_id = ?")
            .bind(&self.name)
            .bind(owner_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn search(&self, query: &str, top_k: usize, owner_id: &str) -> Result<Vec<SearchHit>> {
        match &self.embedder {
            Some(embedder) => {
                let query_vec = embedder
                    .embed(&[query.to_string()])
                    .await?
                    .into_iter()
                    .next()
                    .ok_or_else(|| anyhow!("Empty embedding response"))?;
                self.vector_search(&query_vec, top_k, owner_id).await
            }
            None => self.keyword_search(query, top_k, owner_id).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fts_query_quotes_terms() {
        assert_eq!(fts_query("frontend work").as_deref(), Some("\"frontend\" OR \"work\""));
        assert_eq!(fts_query("C++ AND \"x\"").as_deref(), Some("\"c\" OR \"and\" OR \"x\""));
        assert_eq!(fts_query("  !! "), None);
    }
}

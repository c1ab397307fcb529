//! Hosted index and reranker client (Pinecone REST API).
//!
//! The hosted indexes use integrated embedding: records are upserted as
//! text and the service embeds them with the model configured on the index
//! (a sparse model for `documents-sparse`, a dense one for `documents`).
//! Each owner's records live in their own namespace, so clearing an owner
//! is a namespace-wide delete.
//!
//! | Operation | Endpoint |
//! |-----------|----------|
//! | upsert | `POST {host}/records/namespaces/{owner}/upsert` (NDJSON) |
//! | search | `POST {host}/records/namespaces/{owner}/search` |
//! | delete owner | `POST {host}/vectors/delete` with `deleteAll` |
//! | rerank | `POST https://api.pinecone.io/rerank` |
//!
//! Metadata values must be flat (strings, numbers, string lists), so the
//! line range travels as `["from", "to"]` strings.

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use profile_rag_core::index::VectorIndex;
use profile_rag_core::models::{IndexKind, IndexRecord, LineRange, RecordFields, SearchHit};
use profile_rag_core::rerank::{RerankScore, Reranker};

const API_VERSION: &str = "2025-01";
const RERANK_URL: &str = "https://api.pinecone.io/rerank";
const TEXT_FIELD: &str = "chunk_text";
const RETURN_FIELDS: [&str; 9] = [
    TEXT_FIELD,
    "rawText",
    "sequenceIndex",
    "lineRange",
    "heading",
    "fileName",
    "ownerId",
    "email",
    "documentSummary",
];

/// Authenticated HTTP client shared by the index and reranker.
#[derive(Clone)]
pub struct PineconeClient {
    http: reqwest::Client,
    api_key: String,
}

impl PineconeClient {
    /// Build a client from `PINECONE_API_KEY`.
    pub fn from_env(timeout_secs: u64) -> Result<Self> {
        let api_key = std::env::var("PINECONE_API_KEY")
            .map_err(|_| anyhow!("PINECONE_API_KEY environment variable not set"))?;
        Self::new(api_key, timeout_secs)
    }

    pub fn new(api_key: impl Into<String>, timeout_secs: u64) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;
        Ok(Self {
            http,
            api_key: api_key.into(),
        })
    }

    fn post(&self, url: impl reqwest::IntoUrl) -> reqwest::RequestBuilder {
        self.http
            .post(url)
            .header("Api-Key", &self.api_key)
            .header("X-Pinecone-API-Version", API_VERSION)
    }
}

async fn check(response: reqwest::Response, what: &str) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    bail!("Pinecone {} failed with {}: {}", what, status, body)
}

// ============ Record mapping ============

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FlatFields {
    #[serde(rename = "chunk_text")]
    chunk_text: String,
    raw_text: String,
    sequence_index: f64,
    line_range: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    heading: Option<String>,
    file_name: String,
    owner_id: String,
    email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    document_summary: Option<String>,
}

impl From<&RecordFields> for FlatFields {
    fn from(f: &RecordFields) -> Self {
        FlatFields {
            chunk_text: f.text.clone(),
            raw_text: f.raw_text.clone(),
            sequence_index: f.sequence_index as f64,
            line_range: vec![f.line_range.from.to_string(), f.line_range.to.to_string()],
            heading: f.heading.clone(),
            file_name: f.file_name.clone(),
            owner_id: f.owner_id.clone(),
            email: f.email.clone(),
            document_summary: f.document_summary.clone(),
        }
    }
}

impl TryFrom<FlatFields> for RecordFields {
    type Error = anyhow::Error;

    fn try_from(f: FlatFields) -> Result<Self> {
        let [from, to] = f.line_range.as_slice() else {
            bail!("lineRange must have two entries, got {}", f.line_range.len());
        };
        Ok(RecordFields {
            text: f.chunk_text,
            raw_text: f.raw_text,
            sequence_index: f.sequence_index as usize,
            line_range: LineRange {
                from: from.parse().context("lineRange[0]")?,
                to: to.parse().context("lineRange[1]")?,
            },
            heading: f.heading,
            file_name: f.file_name,
            owner_id: f.owner_id,
            email: f.email,
            document_summary: f.document_summary,
        })
    }
}

#[derive(Serialize)]
struct UpsertLine<'a> {
    #[serde(rename = "_id")]
    id: &'a str,
    #[serde(flatten)]
    fields: FlatFields,
}

/// Encode records as newline-delimited JSON.
fn to_ndjson(records: &[IndexRecord]) -> Result<String> {
    let mut body = String::new();
    for record in records {
        let line = UpsertLine {
            id: &record.id,
            fields: FlatFields::from(&record.fields),
        };
        body.push_str(&serde_json::to_string(&line)?);
        body.push('\n');
    }
    Ok(body)
}

#[derive(Deserialize)]
struct SearchResponse {
    result: SearchResult,
}

#[derive(Deserialize)]
struct SearchResult {
    #[serde(default)]
    hits: Vec<RawHit>,
}

#[derive(Deserialize)]
struct RawHit {
    #[serde(rename = "_id")]
    id: String,
    #[serde(rename = "_score")]
    score: f64,
    fields: FlatFields,
}

// ============ Index ============

/// One hosted index with integrated embedding.
pub struct PineconeIndex {
    client: PineconeClient,
    kind: IndexKind,
    name: String,
    host: String,
}

impl PineconeIndex {
    pub fn new(client: PineconeClient, kind: IndexKind, name: impl Into<String>, host: impl Into<String>) -> Self {
        let host = host.into();
        Self {
            client,
            kind,
            name: name.into(),
            host: host.trim_end_matches('/').to_string(),
        }
    }

    fn namespace_url(&self, owner_id: &str, op: &str) -> Result<reqwest::Url> {
        namespace_url(&self.host, owner_id, op)
    }
}

/// `{host}/records/namespaces/{owner}/{op}`, with the owner escaped as one path segment.
fn namespace_url(host: &str, owner_id: &str, op: &str) -> Result<reqwest::Url> {
    let mut url = reqwest::Url::parse(host).with_context(|| format!("invalid index host '{}'", host))?;
    url.path_segments_mut()
        .map_err(|_| anyhow!("index host '{}' cannot take a path", host))?
        .pop_if_empty()
        .extend(["records", "namespaces", owner_id, op]);
    Ok(url)
}

#[async_trait]
impl VectorIndex for PineconeIndex {
    fn kind(&self) -> IndexKind {
        self.kind
    }

    fn name(&self) -> &str {
        &self.name
    }

    async fn upsert(&self, records: &[IndexRecord]) -> Result<()> {
        let Some(first) = records.first() else {
            return Ok(());
        };
        // Namespaces are per owner; one upsert call never spans owners.
        let owner = &first.fields.owner_id;
        if records.iter().any(|r| &r.fields.owner_id != owner) {
            bail!("upsert batch spans several owners");
        }

        let response = self
            .client
            .post(self.namespace_url(owner, "upsert")?)
            .header("Content-Type", "application/x-ndjson")
            .body(to_ndjson(records)?)
            .send()
            .await
            .with_context(|| format!("upsert to '{}'", self.name))?;
        check(response, "upsert").await?;
        Ok(())
    }

    async fn delete_owner(&self, owner_id: &str) -> Result<()> {
        let response = self
            .client
            .post(format!("{}/vectors/delete", self.host))
            .json(&serde_json::json!({ "deleteAll": true, "namespace": owner_id }))
            .send()
            .await
            .with_context(|| format!("delete on '{}'", self.name))?;
        // An owner that was never ingested has no namespace yet.
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(());
        }
        check(response, "delete").await?;
        Ok(())
    }

    async fn search(&self, query: &str, top_k: usize, owner_id: &str) -> Result<Vec<SearchHit>> {
        let body = serde_json::json!({
            "query": {
                "inputs": { "text": query },
                "top_k": top_k,
            },
            "fields": RETURN_FIELDS,
        });
        let response = self
            .client
            .post(self.namespace_url(owner_id, "search")?)
            .json(&body)
            .send()
            .await
            .with_context(|| format!("search on '{}'", self.name))?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }
        let parsed: SearchResponse = check(response, "search").await?.json().await?;

        parsed
            .result
            .hits
            .into_iter()
            .map(|h| {
                Ok(SearchHit {
                    fields: RecordFields::try_from(h.fields)
                        .with_context(|| format!("malformed fields on record '{}'", h.id))?,
                    chunk_id: h.id,
                    score: h.score,
                    source_index: self.kind,
                })
            })
            .collect()
    }
}

// ============ Reranker ============

pub struct PineconeReranker {
    client: PineconeClient,
    model: String,
}

impl PineconeReranker {
    pub fn new(client: PineconeClient, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }
}

#[derive(Deserialize)]
struct RerankResponse {
    data: Vec<RerankScore>,
}

#[async_trait]
impl Reranker for PineconeReranker {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn rerank(&self, query: &str, documents: &[String], top_n: usize) -> Result<Vec<RerankScore>> {
        if documents.is_empty() {
            return Ok(Vec::new());
        }
        let docs: Vec<serde_json::Value> = documents
            .iter()
            .map(|d| serde_json::json!({ "text": d }))
            .collect();
        let body = serde_json::json!({
            "model": self.model,
            "query": query,
            "documents": docs,
            "top_n": top_n,
            "return_documents": false,
            "rank_fields": ["text"],
        });
        let response = self
            .client
            .post(RERANK_URL)
            .json(&body)
            .send()
            .await
            .context("rerank request")?;
        let parsed: RerankResponse = check(response, "rerank").await?.json().await?;
        Ok(parsed.data)
    }
}

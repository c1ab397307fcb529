//! Explicitly constructed provider handles.
//!
//! A [`ServiceContext`] is built once per process (or per test) and passed
//! by reference to [`ingest`](crate::ingest::ingest) and
//! [`search`](crate::search::search). It owns the two indexes, the
//! reranker, the optional summarizer, and the pipeline settings.

use anyhow::{anyhow, bail, Context, Result};
use std::sync::Arc;
use std::time::Duration;

use profile_rag_core::chunk::ChunkingParams;
use profile_rag_core::embedding::{Embedder, HashingEmbedder};
use profile_rag_core::index::memory::InMemoryIndex;
use profile_rag_core::index::VectorIndex;
use profile_rag_core::models::IndexKind;
use profile_rag_core::rerank::{LexicalReranker, Reranker};

use crate::completion::create_completer;
use crate::config::{Config, RerankText};
use crate::db;
use crate::embedding::create_embedder;
use crate::migrate;
use crate::pinecone::{PineconeClient, PineconeIndex, PineconeReranker};
use crate::sqlite_index::SqliteIndex;
use crate::summarize::Summarizer;

/// Tunables for ingestion and retrieval.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub batch_size: usize,
    pub index_timeout: Duration,
    pub rerank_timeout: Duration,
    pub top_k: usize,
    pub top_n: usize,
    pub rerank_text: RerankText,
    pub allow_partial: bool,
    pub default_owner: Option<String>,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl PipelineSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            batch_size: config.index.batch_size.max(1),
            index_timeout: Duration::from_secs(config.index.timeout_secs),
            rerank_timeout: Duration::from_secs(config.rerank.timeout_secs),
            top_k: config.retrieval.top_k,
            top_n: config.retrieval.top_n,
            rerank_text: config.retrieval.rerank_text,
            allow_partial: config.retrieval.allow_partial,
            default_owner: config.retrieval.default_owner.clone(),
        }
    }
}

pub struct ServiceContext {
    pub sparse: Arc<dyn VectorIndex>,
    pub dense: Arc<dyn VectorIndex>,
    pub reranker: Arc<dyn Reranker>,
    pub summarizer: Option<Summarizer>,
    pub chunking: ChunkingParams,
    pub settings: PipelineSettings,
}

impl ServiceContext {
    pub fn new(
        sparse: Arc<dyn VectorIndex>,
        dense: Arc<dyn VectorIndex>,
        reranker: Arc<dyn Reranker>,
    ) -> Self {
        Self {
            sparse,
            dense,
            reranker,
            summarizer: None,
            chunking: ChunkingParams::default(),
            settings: PipelineSettings::default(),
        }
    }

    /// In-memory indexes, hashing embedder, lexical reranker.
    pub fn in_memory() -> Self {
        let embedder: Arc<dyn Embedder> = Arc::new(HashingEmbedder::default());
        Self::new(
            Arc::new(InMemoryIndex::sparse("documents-sparse")),
            Arc::new(InMemoryIndex::dense("documents", embedder)),
            Arc::new(LexicalReranker),
        )
    }

    pub fn with_summarizer(mut self, summarizer: Summarizer) -> Self {
        self.summarizer = Some(summarizer);
        self
    }

    pub fn with_settings(mut self, settings: PipelineSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_chunking(mut self, chunking: ChunkingParams) -> Self {
        self.chunking = chunking;
        self
    }

    /// Build every provider named by the config.
    ///
    /// Credentials are read from the environment here, so a missing
    /// `PINECONE_API_KEY` or `OPENAI_API_KEY` fails at startup.
    pub async fn from_config(config: &Config) -> Result<Self> {
        let index_cfg = &config.index;

        let (sparse, dense): (Arc<dyn VectorIndex>, Arc<dyn VectorIndex>) =
            match index_cfg.backend.as_str() {
                "memory" => {
                    let embedder = create_embedder(&config.embedding)?;
                    (
                        Arc::new(InMemoryIndex::sparse(&index_cfg.sparse_name)),
                        Arc::new(InMemoryIndex::dense(&index_cfg.dense_name, embedder)),
                    )
                }
                "sqlite" => {
                    let embedder = create_embedder(&config.embedding)?;
                    let pool = db::connect(config).await?;
                    migrate::apply_schema(&pool).await?;
                    (
                        Arc::new(SqliteIndex::sparse(pool.clone(), &index_cfg.sparse_name)),
                        Arc::new(SqliteIndex::dense(pool, &index_cfg.dense_name, embedder)),
                    )
                }
                "pinecone" => {
                    let client = PineconeClient::from_env(index_cfg.timeout_secs)?;
                    let sparse_host = index_cfg
                        .sparse_host
                        .as_deref()
                        .ok_or_else(|| anyhow!("index.sparse_host is required"))?;
                    let dense_host = index_cfg
                        .dense_host
                        .as_deref()
                        .ok_or_else(|| anyhow!("index.dense_host is required"))?;
                    (
                        Arc::new(PineconeIndex::new(
                            client.clone(),
                            IndexKind::Sparse,
                            &index_cfg.sparse_name,
                            sparse_host,
                        )),
                        Arc::new(PineconeIndex::new(
                            client,
                            IndexKind::Dense,
                            &index_cfg.dense_name,
                            dense_host,
                        )),
                    )
                }
                other => bail!("Unknown index backend: {}", other),
            };

        let reranker: Arc<dyn Reranker> = match config.rerank.provider.as_str() {
            "lexical" => Arc::new(LexicalReranker),
            "pinecone" => Arc::new(PineconeReranker::new(
                PineconeClient::from_env(config.rerank.timeout_secs)?,
                &config.rerank.model,
            )),
            other => bail!("Unknown rerank provider: {}", other),
        };

        let summarizer = create_completer(&config.summary)
            .context("Failed to create summary completer")?
            .map(|completer| Summarizer::new(completer, &config.summary));

        let chunking = config
            .chunking
            .params()
            .map_err(|e| anyhow!("chunking: {}", e))?;

        tracing::info!(
            backend = %index_cfg.backend,
            sparse = %sparse.name(),
            dense = %dense.name(),
            reranker = %reranker.model_name(),
            summary = summarizer.is_some(),
            "service context ready"
        );

        Ok(Self {
            sparse,
            dense,
            reranker,
            summarizer,
            chunking,
            settings: PipelineSettings::from_config(config),
        })
    }
}

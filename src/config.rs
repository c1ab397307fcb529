//! Configuration parsing and validation.
//!
//! Profile RAG is configured with a TOML file (default
//! `config/prag.toml`). Every section and field has a default, so an
//! empty file yields a working local setup: SQLite-backed indexes, the
//! feature-hashing embedder, the lexical reranker, and no summarizer.
//!
//! # Example
//!
//! ```toml
//! [db]
//! path = "./data/prag.sqlite"
//!
//! [chunking]
//! chunk_size = 500
//! chunk_overlap = 80
//!
//! [index]
//! backend = "pinecone"          # "sqlite" | "memory" | "pinecone"
//! batch_size = 100
//! sparse_host = "https://documents-sparse-xxxx.svc.pinecone.io"
//! dense_host = "https://documents-xxxx.svc.pinecone.io"
//!
//! [rerank]
//! provider = "pinecone"         # "lexical" | "pinecone"
//! model = "bge-reranker-v2-m3"
//!
//! [retrieval]
//! top_k = 20
//! top_n = 10
//! rerank_text = "formatted"     # "formatted" | "raw"
//!
//! [summary]
//! provider = "openai"           # "disabled" | "openai"
//! on_failure = "degrade"        # "degrade" | "abort"
//!
//! [server]
//! bind = "127.0.0.1:8787"
//! ```
//!
//! Credentials are never read from this file: `OPENAI_API_KEY` and
//! `PINECONE_API_KEY` come from the environment.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use profile_rag_core::chunk::{ChunkingParams, DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub db: DbConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub rerank: RerankConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub summary: SummaryConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./data/prag.sqlite")
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
        }
    }
}

impl ChunkingConfig {
    pub fn params(&self) -> profile_rag_core::Result<ChunkingParams> {
        ChunkingParams::new(self.chunk_size, self.chunk_overlap)
    }
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}
fn default_chunk_overlap() -> usize {
    DEFAULT_CHUNK_OVERLAP
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    #[serde(default = "default_index_backend")]
    pub backend: String,
    #[serde(default = "default_index_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_sparse_name")]
    pub sparse_name: String,
    #[serde(default = "default_dense_name")]
    pub dense_name: String,
    /// Data-plane host of the hosted sparse index.
    #[serde(default)]
    pub sparse_host: Option<String>,
    /// Data-plane host of the hosted dense index.
    #[serde(default)]
    pub dense_host: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            backend: default_index_backend(),
            batch_size: default_index_batch_size(),
            sparse_name: default_sparse_name(),
            dense_name: default_dense_name(),
            sparse_host: None,
            dense_host: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_index_backend() -> String {
    "sqlite".to_string()
}
fn default_index_batch_size() -> usize {
    100
}
fn default_sparse_name() -> String {
    "documents-sparse".to_string()
}
fn default_dense_name() -> String {
    "documents".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_embedding_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: None,
            dims: None,
            url: None,
            batch_size: default_embedding_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_embedding_provider() -> String {
    "hash".to_string()
}
fn default_embedding_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct RerankConfig {
    #[serde(default = "default_rerank_provider")]
    pub provider: String,
    #[serde(default = "default_rerank_model")]
    pub model: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for RerankConfig {
    fn default() -> Self {
        Self {
            provider: default_rerank_provider(),
            model: default_rerank_model(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_rerank_provider() -> String {
    "lexical".to_string()
}
fn default_rerank_model() -> String {
    "bge-reranker-v2-m3".to_string()
}

/// Which stored text the reranker scores.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum RerankText {
    /// The record's indexed text, including heading and summary context.
    #[default]
    Formatted,
    /// The bare chunk text.
    Raw,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_top_n")]
    pub top_n: usize,
    #[serde(default)]
    pub rerank_text: RerankText,
    #[serde(default)]
    pub allow_partial: bool,
    #[serde(default)]
    pub default_owner: Option<String>,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            top_n: default_top_n(),
            rerank_text: RerankText::default(),
            allow_partial: false,
            default_owner: None,
        }
    }
}

fn default_top_k() -> usize {
    20
}
fn default_top_n() -> usize {
    10
}

/// What ingestion does when the summary call fails.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SummaryFailurePolicy {
    /// Continue with heading-only context.
    #[default]
    Degrade,
    /// Fail the file.
    Abort,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SummaryConfig {
    #[serde(default = "default_summary_provider")]
    pub provider: String,
    #[serde(default = "default_summary_model")]
    pub model: String,
    #[serde(default = "default_summary_url")]
    pub url: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_max_input_chars")]
    pub max_input_chars: usize,
    #[serde(default)]
    pub on_failure: SummaryFailurePolicy,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
}

impl Default for SummaryConfig {
    fn default() -> Self {
        Self {
            provider: default_summary_provider(),
            model: default_summary_model(),
            url: default_summary_url(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            max_input_chars: default_max_input_chars(),
            on_failure: SummaryFailurePolicy::default(),
            timeout_secs: default_timeout_secs(),
            system_prompt: default_system_prompt(),
        }
    }
}

impl SummaryConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_summary_provider() -> String {
    "disabled".to_string()
}
fn default_summary_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_summary_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_temperature() -> f32 {
    0.2
}
fn default_max_tokens() -> u32 {
    200
}
fn default_max_input_chars() -> usize {
    12_000
}
fn default_system_prompt() -> String {
    "Summarize the following document in two or three sentences. \
     Name the person, their role, and the main areas of experience. \
     Reply with the summary only."
        .to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8787".to_string()
}

/// Read, parse, and validate a config file.
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content)
}

/// Parse and validate config text.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).context("Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    config
        .chunking
        .params()
        .map_err(|e| anyhow::anyhow!("chunking: {}", e))?;

    match config.index.backend.as_str() {
        "sqlite" | "memory" => {}
        "pinecone" => {
            if config.index.sparse_host.is_none() || config.index.dense_host.is_none() {
                bail!("index.sparse_host and index.dense_host are required when backend is 'pinecone'");
            }
        }
        other => bail!(
            "Unknown index backend: '{}'. Must be sqlite, memory, or pinecone.",
            other
        ),
    }
    if config.index.batch_size == 0 {
        bail!("index.batch_size must be >= 1");
    }
    if config.index.sparse_name == config.index.dense_name {
        bail!("index.sparse_name and index.dense_name must differ");
    }

    match config.embedding.provider.as_str() {
        "hash" => {}
        "openai" | "ollama" => {
            if config.embedding.model.is_none() {
                bail!(
                    "embedding.model must be specified when provider is '{}'",
                    config.embedding.provider
                );
            }
            if config.embedding.dims.unwrap_or(0) == 0 {
                bail!(
                    "embedding.dims must be > 0 when provider is '{}'",
                    config.embedding.provider
                );
            }
        }
        other => bail!(
            "Unknown embedding provider: '{}'. Must be hash, openai, or ollama.",
            other
        ),
    }
    if config.embedding.batch_size == 0 {
        bail!("embedding.batch_size must be >= 1");
    }

    match config.rerank.provider.as_str() {
        "lexical" | "pinecone" => {}
        other => bail!(
            "Unknown rerank provider: '{}'. Must be lexical or pinecone.",
            other
        ),
    }

    if config.retrieval.top_k == 0 {
        bail!("retrieval.top_k must be >= 1");
    }
    if config.retrieval.top_n == 0 {
        bail!("retrieval.top_n must be >= 1");
    }

    match config.summary.provider.as_str() {
        "disabled" | "openai" => {}
        other => bail!(
            "Unknown summary provider: '{}'. Must be disabled or openai.",
            other
        ),
    }
    if config.summary.max_input_chars == 0 {
        bail!("summary.max_input_chars must be >= 1");
    }

    for (name, secs) in [
        ("index", config.index.timeout_secs),
        ("embedding", config.embedding.timeout_secs),
        ("rerank", config.rerank.timeout_secs),
        ("summary", config.summary.timeout_secs),
    ] {
        if secs == 0 {
            bail!("{}.timeout_secs must be >= 1", name);
        }
    }

    Ok(())
}

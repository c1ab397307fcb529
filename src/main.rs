//! # Profile RAG CLI (`prag`)
//!
//! ## Usage
//!
//! ```bash
//! prag --config ./config/prag.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `prag init` | Create the SQLite database and schema |
//! | `prag chunk <file>` | Preview chunking and context formatting |
//! | `prag ingest <paths...> --email <e>` | Replace an owner's indexed documents |
//! | `prag search "<query>"` | Hybrid search with reranking |
//! | `prag profile get\|put\|delete\|list` | Manage user profiles |
//! | `prag purge --owner <id>` | Remove an owner from both indexes |
//! | `prag serve` | Start the HTTP server |
//!
//! Logging goes to stderr and is controlled with `RUST_LOG`
//! (default `info`).

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use profile_rag::cli::{self, ProfileCommand};
use profile_rag::config::{self, Config};
use profile_rag::search::SearchRequest;
use profile_rag::server;

/// Profile RAG: hybrid sparse + dense retrieval over a person's documents.
#[derive(Parser)]
#[command(name = "prag", version, about)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/prag.toml`. See `config/prag.example.toml`.
    #[arg(long, global = true, default_value = "./config/prag.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Idempotent.
    Init,

    /// Show the chunks a file would produce, without indexing it.
    ///
    /// Uses default chunking settings when no config file exists.
    Chunk {
        file: PathBuf,

        #[arg(long, default_value = "preview")]
        owner: String,

        #[arg(long)]
        json: bool,
    },

    /// Ingest files for one owner, replacing what was indexed before.
    ///
    /// Directories are walked recursively for `.md` and `.txt` files.
    Ingest {
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        #[arg(long)]
        email: String,

        /// Owner id scoping the chunks. Defaults to the email.
        #[arg(long)]
        owner: Option<String>,

        /// JSON file saved as the owner's profile before ingesting.
        #[arg(long)]
        profile: Option<PathBuf>,
    },

    /// Search an owner's documents.
    Search {
        query: String,

        /// Defaults to `retrieval.default_owner`.
        #[arg(long)]
        owner: Option<String>,

        #[arg(long)]
        top_n: Option<usize>,

        /// Return single-index results instead of failing when one index errors.
        #[arg(long)]
        allow_partial: bool,

        #[arg(long)]
        json: bool,
    },

    /// Manage stored user profiles.
    Profile {
        #[command(subcommand)]
        action: ProfileAction,
    },

    /// Remove every chunk an owner has in both indexes.
    Purge {
        #[arg(long)]
        owner: String,
    },

    /// Start the HTTP server on `[server].bind`.
    Serve,
}

#[derive(Subcommand)]
enum ProfileAction {
    Get { email: String },
    /// Store the JSON object in `file` as the profile for `email`.
    Put { email: String, file: PathBuf },
    Delete { email: String },
    List,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Cli::parse();

    // Chunk preview works without a config file
    if let Commands::Chunk { file, owner, json } = &args.command {
        let cfg = config::load_config(&args.config).unwrap_or_else(|_| Config::default());
        return cli::run_chunk(&cfg, file, owner, *json);
    }

    let cfg = config::load_config(&args.config)?;

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, cancelling");
            on_signal.cancel();
        }
    });

    match args.command {
        Commands::Init => cli::run_init(&cfg).await?,
        Commands::Chunk { .. } => {
            // Handled above (before config loading)
            unreachable!()
        }
        Commands::Ingest {
            paths,
            email,
            owner,
            profile,
        } => {
            cli::run_ingest(
                &cfg,
                &paths,
                &email,
                owner.as_deref(),
                profile.as_deref(),
                &cancel,
            )
            .await?
        }
        Commands::Search {
            query,
            owner,
            top_n,
            allow_partial,
            json,
        } => {
            let request = SearchRequest {
                query,
                owner_id: owner,
                top_n,
                allow_partial: allow_partial.then_some(true),
            };
            cli::run_search(&cfg, &request, json, &cancel).await?
        }
        Commands::Profile { action } => {
            let command = match &action {
                ProfileAction::Get { email } => ProfileCommand::Get(email),
                ProfileAction::Put { email, file } => ProfileCommand::Put(email, file),
                ProfileAction::Delete { email } => ProfileCommand::Delete(email),
                ProfileAction::List => ProfileCommand::List,
            };
            cli::run_profile(&cfg, command).await?
        }
        Commands::Purge { owner } => cli::run_purge(&cfg, &owner, &cancel).await?,
        Commands::Serve => server::run_server(&cfg, cancel).await?,
    }

    Ok(())
}

//! Command runners behind the `prag` binary.
//!
//! Each `run_*` function owns the output of one subcommand. Pipeline calls
//! receive the caller's cancellation token so Ctrl-C stops in-flight
//! provider calls.

use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use walkdir::WalkDir;

use profile_rag_core::chunk::chunk_document;
use profile_rag_core::models::Document;

use crate::config::Config;
use crate::context::ServiceContext;
use crate::ingest::{ingest, IngestFile, IngestRequest};
use crate::profiles::ProfileStore;
use crate::search::{search, SearchRequest};
use crate::writer::clear_owner;
use crate::{db, migrate};

const INGEST_EXTENSIONS: &[&str] = &["md", "markdown", "txt"];

/// Expand `paths` into ingestible files, sorted per directory.
///
/// Explicit file arguments are kept whatever their extension.
pub fn collect_files(paths: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for path in paths {
        if path.is_file() {
            files.push(path.clone());
            continue;
        }
        if !path.is_dir() {
            bail!("No such file or directory: {}", path.display());
        }
        for entry in WalkDir::new(path).sort_by_file_name() {
            let entry = entry.with_context(|| format!("Failed to walk {}", path.display()))?;
            let ext = entry
                .path()
                .extension()
                .and_then(|e| e.to_str())
                .map(str::to_lowercase);
            if entry.file_type().is_file()
                && ext.is_some_and(|e| INGEST_EXTENSIONS.contains(&e.as_str()))
            {
                files.push(entry.into_path());
            }
        }
    }
    Ok(files)
}

pub async fn run_init(config: &Config) -> Result<()> {
    migrate::run_migrations(config).await?;
    println!("Database initialized at {}", config.db.path.display());
    Ok(())
}

/// Print the chunks a file would produce, without writing anything.
pub fn run_chunk(config: &Config, file: &Path, owner: &str, json: bool) -> Result<()> {
    let text = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let params = config
        .chunking
        .params()
        .map_err(|e| anyhow::anyhow!("chunking: {}", e))?;
    let doc = Document {
        text,
        file_name: display_name(file),
        owner_id: owner.to_string(),
        email: owner.to_string(),
    };
    let chunks = chunk_document(&doc, &params, None);

    if json {
        println!("{}", serde_json::to_string_pretty(&chunks)?);
        return Ok(());
    }
    for c in &chunks {
        println!(
            "{} lines {}-{} ({} chars)",
            c.id,
            c.line_range.from,
            c.line_range.to,
            c.raw_text.chars().count()
        );
        println!("{}\n", c.formatted_text);
    }
    println!("{} chunks", chunks.len());
    Ok(())
}

pub async fn run_ingest(
    config: &Config,
    paths: &[PathBuf],
    email: &str,
    owner: Option<&str>,
    profile: Option<&Path>,
    cancel: &CancellationToken,
) -> Result<()> {
    let files = collect_files(paths)?;
    if files.is_empty() {
        bail!("No .md or .txt files found");
    }

    let mut ingest_files = Vec::with_capacity(files.len());
    for path in &files {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        ingest_files.push(IngestFile {
            file_name: display_name(path),
            content,
        });
    }

    let request = IngestRequest {
        owner_id: owner.unwrap_or(email).to_string(),
        email: email.to_string(),
        files: ingest_files,
    };
    request.validate()?;

    if let Some(profile_path) = profile {
        let raw = std::fs::read_to_string(profile_path)
            .with_context(|| format!("Failed to read {}", profile_path.display()))?;
        let record: serde_json::Value = serde_json::from_str(&raw)
            .with_context(|| format!("Invalid profile JSON in {}", profile_path.display()))?;
        let pool = db::connect(config).await?;
        migrate::apply_schema(&pool).await?;
        ProfileStore::new(pool).put(email, &record).await?;
        println!("Profile saved for {}", email);
    }

    let ctx = ServiceContext::from_config(config).await?;
    let reports = ingest(&ctx, request, cancel).await?;

    let mut failed = 0;
    for r in &reports {
        match &r.error {
            None => println!(
                "  ok    {:<40} {} chunks{}",
                r.file_name,
                r.chunks_processed,
                if r.summary_applied { " (summarized)" } else { "" }
            ),
            Some(e) => {
                failed += 1;
                println!(
                    "  FAIL  {:<40} {} chunks  [{}] {}",
                    r.file_name, r.chunks_processed, e.code, e.message
                );
            }
        }
    }
    println!("{} files, {} failed", reports.len(), failed);
    if failed > 0 {
        bail!("{} of {} files failed", failed, reports.len());
    }
    Ok(())
}

pub async fn run_search(
    config: &Config,
    request: &SearchRequest,
    json: bool,
    cancel: &CancellationToken,
) -> Result<()> {
    let ctx = ServiceContext::from_config(config).await?;
    let resp = search(&ctx, request, cancel).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&resp)?);
        return Ok(());
    }
    if !resp.degraded.is_empty() {
        let sides: Vec<&str> = resp.degraded.iter().map(|k| k.as_str()).collect();
        println!("warning: partial results, failed: {}", sides.join(", "));
    }
    for (i, r) in resp.results.iter().enumerate() {
        let f = &r.hit.fields;
        println!(
            "{}. [{:.3}] {} {}:{}-{} ({})",
            i + 1,
            r.rerank_score,
            r.hit.chunk_id,
            f.file_name,
            f.line_range.from,
            f.line_range.to,
            f.heading.as_deref().unwrap_or("-")
        );
        println!("   {}", snippet(&f.raw_text, 160));
    }
    println!(
        "{} results ({} sparse, {} dense hits)",
        resp.results.len(),
        resp.sparse_results.len(),
        resp.dense_results.len()
    );
    Ok(())
}

pub enum ProfileCommand<'a> {
    Get(&'a str),
    Put(&'a str, &'a Path),
    Delete(&'a str),
    List,
}

pub async fn run_profile(config: &Config, command: ProfileCommand<'_>) -> Result<()> {
    let pool = db::connect(config).await?;
    migrate::apply_schema(&pool).await?;
    let store = ProfileStore::new(pool);

    match command {
        ProfileCommand::Get(email) => match store.get(email).await? {
            Some(entry) => println!("{}", serde_json::to_string_pretty(&entry)?),
            None => bail!("No profile for {}", email),
        },
        ProfileCommand::Put(email, file) => {
            let raw = std::fs::read_to_string(file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let record: serde_json::Value = serde_json::from_str(&raw)?;
            store.put(email, &record).await?;
            println!("Profile saved for {}", email);
        }
        ProfileCommand::Delete(email) => {
            if !store.delete(email).await? {
                bail!("No profile for {}", email);
            }
            println!("Profile deleted for {}", email);
        }
        ProfileCommand::List => {
            for entry in store.list().await? {
                println!("{}  {}", entry.updated_at.format("%Y-%m-%d %H:%M"), entry.email);
            }
        }
    }
    Ok(())
}

pub async fn run_purge(config: &Config, owner: &str, cancel: &CancellationToken) -> Result<()> {
    let ctx = ServiceContext::from_config(config).await?;
    clear_owner(&ctx, owner, cancel).await?;
    println!("Removed {} from both indexes", owner);
    Ok(())
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn snippet(text: &str, max: usize) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    match flat.char_indices().nth(max) {
        Some((i, _)) => format!("{}…", &flat[..i]),
        None => flat,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collect_files_filters_and_sorts() {
        let tmp = tempfile::TempDir::new().unwrap();
        std::fs::create_dir(tmp.path().join("sub")).unwrap();
        std::fs::write(tmp.path().join("b.md"), "b").unwrap();
        std::fs::write(tmp.path().join("a.txt"), "a").unwrap();
        std::fs::write(tmp.path().join("image.png"), "x").unwrap();
        std::fs::write(tmp.path().join("sub/c.MD"), "c").unwrap();

        let files = collect_files(&[tmp.path().to_path_buf()]).unwrap();
        let names: Vec<String> = files.iter().map(|p| display_name(p)).collect();
        assert_eq!(names, vec!["a.txt", "b.md", "c.MD"]);
    }

    #[test]
    fn test_collect_files_missing_path() {
        assert!(collect_files(&[PathBuf::from("/nonexistent/dir")]).is_err());
    }

    #[test]
    fn test_snippet() {
        assert_eq!(snippet("a\n  b", 10), "a b");
        assert_eq!(snippet("abcdef", 3), "abc…");
    }
}

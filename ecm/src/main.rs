mod archive;
mod clustering;
mod config;
mod db;
mod decay;
mod embeddings;
mod error;
mod ingestion;
mod keyword_store;
mod maintenance;
mod models;
mod retrieval;
mod vector_store;

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::db::traits::{ChunkStore, ClusterStore, EdgeStore};
use crate::db::{Database, LibSqlBackend};
use crate::embeddings::EmbeddingProvider;
use crate::error::{EcmError, Result};
use crate::keyword_store::LibSqlKeywordStore;
use crate::models::{ChunkSearchResult, SearchHit};
use crate::vector_store::LibSqlVectorStore;

#[derive(Parser)]
#[command(name = "ecm")]
#[command(about = "Entropic Causal Memory: a retrieval and memory engine for conversational transcripts")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Ingest a single transcript file.
    Ingest {
        path: PathBuf,
        #[arg(long, default_value = "default")]
        project: String,
    },
    /// Ingest every transcript file under a project directory tree.
    BatchIngest {
        dir: PathBuf,
        #[arg(long, default_value = "default")]
        project: String,
    },
    /// Hybrid search over ingested chunks; prints ranked results as JSON lines.
    Search {
        query: String,
        #[arg(long = "project")]
        projects: Vec<String>,
        #[arg(short = 'k', long, default_value_t = 10)]
        k: usize,
    },
    /// Run a full reclustering pass regardless of the maintenance threshold.
    Recluster {
        #[arg(long)]
        min_size: Option<usize>,
    },
    /// Emit counts of sessions, chunks, edges, clusters.
    Stats,
    /// Probe database and vector store reachability.
    Health,
    /// Export the full store to a tar-like archive.
    Export {
        #[arg(long)]
        output: PathBuf,
        #[arg(long)]
        no_encrypt: bool,
    },
    /// Import an archive produced by `export`.
    Import {
        file: PathBuf,
        #[arg(long)]
        merge: bool,
    },
    /// Remove ECM's persisted state.
    Uninstall {
        #[arg(long)]
        force: bool,
        #[arg(long)]
        keep_data: bool,
        #[arg(long)]
        dry_run: bool,
    },
}

struct Stores {
    db: Database,
    backend: LibSqlBackend,
    vectors: LibSqlVectorStore,
    keywords: LibSqlKeywordStore,
}

async fn open_stores(config: &Config) -> Result<Stores> {
    let db = Database::new(&config.storage.db_path, config.embeddings.dimensions).await?;
    let backend = LibSqlBackend::new(db.clone());
    let vectors = LibSqlVectorStore::new(db.clone());
    let keywords = LibSqlKeywordStore::new(db.clone());
    Ok(Stores { db, backend, vectors, keywords })
}

/// Walks `root` for `.jsonl` transcript files, pairing each with a session
/// id derived from its file stem — the same convention `ingest_file` expects
/// a caller to have already resolved.
fn discover_transcripts(root: &Path) -> Vec<(PathBuf, String)> {
    let mut out = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        let Ok(entries) = std::fs::read_dir(&dir) else { continue };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                stack.push(path);
            } else if path.extension().is_some_and(|e| e == "jsonl") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    out.push((path.clone(), stem.to_string()));
                }
            }
        }
    }
    out.sort_by(|a, b| a.0.cmp(&b.0));
    out
}

async fn cmd_ingest(config: &Config, path: &Path, project: &str) -> Result<()> {
    let stores = open_stores(config).await?;
    let embedder = EmbeddingProvider::new(&config.embeddings)?;
    let session_id = path
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| EcmError::Input(format!("cannot derive session id from {}", path.display())))?;

    let outcome = ingestion::ingest_file(&stores.backend, &stores.vectors, &embedder, config, path, project, session_id).await?;
    println!("{}", serde_json::to_string(&serde_json::json!({
        "session_id": outcome.session_id,
        "chunks_created": outcome.chunks_created,
        "edges_created": outcome.edges_created,
        "skipped": outcome.skipped,
    }))?);
    Ok(())
}

async fn cmd_batch_ingest(config: &Config, dir: &Path, project: &str) -> Result<()> {
    let stores = open_stores(config).await?;
    let embedder = EmbeddingProvider::new(&config.embeddings)?;

    let mut total_chunks = 0usize;
    let mut total_edges = 0usize;
    let mut files_ingested = 0usize;
    let mut files_skipped = 0usize;

    for (path, session_id) in discover_transcripts(dir) {
        match ingestion::ingest_file(&stores.backend, &stores.vectors, &embedder, config, &path, project, &session_id).await {
            Ok(outcome) => {
                total_chunks += outcome.chunks_created;
                total_edges += outcome.edges_created;
                if outcome.skipped {
                    files_skipped += 1;
                } else {
                    files_ingested += 1;
                }
            }
            Err(e) => {
                tracing::error!(path = %path.display(), error = %e, "Ingestion failed for this session; continuing with the rest");
            }
        }
    }

    println!("{}", serde_json::to_string(&serde_json::json!({
        "files_ingested": files_ingested,
        "files_skipped": files_skipped,
        "chunks_created": total_chunks,
        "edges_created": total_edges,
    }))?);
    Ok(())
}

/// Retrieval never surfaces a storage failure to the end user (propagation
/// policy, spec §7): on error this prints an empty, degraded result set
/// instead of a non-zero exit.
async fn cmd_search(config: &Config, query: &str, projects: &[String], k: usize) -> Result<()> {
    let stores = open_stores(config).await?;
    let embedder = EmbeddingProvider::new(&config.embeddings)?;
    let mut config = config.clone();
    config.retrieval.k = k;
    let project_filter = if projects.is_empty() { None } else { Some(projects) };

    let (hits, degraded): (Vec<ChunkSearchResult>, bool) = match retrieval::search(
        &stores.backend,
        &stores.vectors,
        &stores.keywords,
        &embedder,
        &config,
        query,
        project_filter,
        chrono::Utc::now(),
    )
    .await
    {
        Ok(hits) => (hits, false),
        Err(e) => {
            tracing::warn!(error = %e, "Search failed; returning a degraded empty result set");
            (Vec::new(), true)
        }
    };

    for hit in hits {
        let line = SearchHit { chunk: hit.chunk, score: hit.score, is_seed: hit.is_seed, degraded };
        println!("{}", serde_json::to_string(&line)?);
    }
    Ok(())
}

async fn cmd_recluster(config: &Config, min_size: Option<usize>) -> Result<()> {
    let stores = open_stores(config).await?;
    let mut config = config.clone();
    if let Some(min_size) = min_size {
        config.clustering.min_cluster_size = min_size;
    }

    let embeddings = stores.vectors.get_all().await?;
    let points: Vec<clustering::HdbscanInput> =
        embeddings.into_iter().map(|(chunk_id, embedding)| clustering::HdbscanInput { chunk_id, embedding }).collect();
    let n = points.len();
    let result = clustering::cluster(points, config.clustering.min_cluster_size, config.clustering.metric);

    stores.backend.replace_all_clusters(&result.clusters).await?;
    for chunk_id in stores.backend.get_all_chunk_ids().await? {
        let cluster_id = result.assignments.get(&chunk_id).cloned();
        stores.backend.set_cluster_id(&chunk_id, cluster_id.as_deref()).await?;
    }
    let conn = stores.db.connect()?;
    db::MetadataRepository::set_last_recluster_at(&conn, chrono::Utc::now()).await?;

    println!("{}", serde_json::to_string(&serde_json::json!({
        "points": n,
        "clusters": result.clusters.len(),
    }))?);
    Ok(())
}

async fn cmd_stats(config: &Config) -> Result<()> {
    let stores = open_stores(config).await?;
    println!("{}", serde_json::to_string(&serde_json::json!({
        "sessions": stores.backend.get_session_ids().await?.len(),
        "chunks": stores.backend.get_chunk_count().await?,
        "edges": stores.backend.get_edge_count().await?,
        "clusters": stores.backend.get_cluster_count().await?,
        "vectors": stores.vectors.count().await?,
    }))?);
    Ok(())
}

async fn cmd_health(config: &Config) -> Result<()> {
    use crate::vector_store::VectorStore;

    let db_ok = Database::new(&config.storage.db_path, config.embeddings.dimensions).await;
    let (db_ok, vectors_ok) = match db_ok {
        Ok(db) => {
            let vectors = LibSqlVectorStore::new(db);
            (true, vectors.count().await.is_ok())
        }
        Err(_) => (false, false),
    };

    let healthy = db_ok && vectors_ok;
    println!("{}", serde_json::to_string(&serde_json::json!({
        "database": db_ok,
        "vector_store": vectors_ok,
        "healthy": healthy,
    }))?);
    if !healthy {
        std::process::exit(1);
    }
    Ok(())
}

async fn cmd_export(config: &Config, output: &Path, no_encrypt: bool) -> Result<()> {
    let stores = open_stores(config).await?;

    let passphrase = if no_encrypt {
        None
    } else {
        Some(
            std::env::var("ECM_EXPORT_PASSWORD")
                .or_else(|_| rpassword_prompt("Archive passphrase: "))
                .map_err(|e| EcmError::Input(format!("no passphrase available: {e}")))?,
        )
    };
    let encryption = match &passphrase {
        None => archive::ExportEncryption::None,
        Some(p) => archive::ExportEncryption::Passphrase(p),
    };

    let bytes = archive::build_archive(&stores.backend, &stores.vectors, encryption).await?;
    std::fs::write(output, &bytes)?;
    println!("{}", serde_json::to_string(&serde_json::json!({
        "output": output.display().to_string(),
        "bytes": bytes.len(),
    }))?);
    Ok(())
}

/// A minimal stand-in for an interactive terminal prompt: the CLI dependency
/// stack has no readline/rpassword crate, so this reads one line from stdin.
/// Piping `ECM_EXPORT_PASSWORD` is the non-interactive path.
fn rpassword_prompt(prompt: &str) -> std::io::Result<String> {
    use std::io::Write;
    eprint!("{prompt}");
    std::io::stderr().flush()?;
    let mut line = String::new();
    std::io::stdin().read_line(&mut line)?;
    Ok(line.trim_end_matches(['\n', '\r']).to_string())
}

// `--merge` has no separate code path: restore_archive already leaves
// colliding rows untouched (chunk text is immutable, so there is nothing to
// merge field-by-field), so the flag is accepted for CLI-surface parity with
// the spec and otherwise a no-op.
async fn cmd_import(config: &Config, file: &Path, _merge: bool) -> Result<()> {
    let stores = open_stores(config).await?;
    let bytes = std::fs::read(file)?;

    let looks_encrypted = bytes.starts_with(&archive::crypto::MAGIC_HEADER);
    let passphrase = if looks_encrypted {
        Some(
            std::env::var("ECM_EXPORT_PASSWORD")
                .or_else(|_| rpassword_prompt("Archive passphrase: "))
                .map_err(|e| EcmError::Input(format!("no passphrase available: {e}")))?,
        )
    } else {
        None
    };
    let import_passphrase = match &passphrase {
        None => archive::ImportPassphrase::None,
        Some(p) => archive::ImportPassphrase::Passphrase(p),
    };

    let summary = archive::restore_archive(&stores.backend, &stores.vectors, &stores.db, &bytes, import_passphrase).await?;
    println!("{}", serde_json::to_string(&summary)?);
    Ok(())
}

fn cmd_uninstall(config: &Config, force: bool, keep_data: bool, dry_run: bool) -> Result<()> {
    let mut targets = vec![PathBuf::from(&config.storage.db_path)];
    if !keep_data {
        targets.push(PathBuf::from(&config.storage.vector_path));
    }

    if dry_run {
        println!("{}", serde_json::to_string(&serde_json::json!({
            "would_remove": targets.iter().map(|p| p.display().to_string()).collect::<Vec<_>>(),
        }))?);
        return Ok(());
    }

    if !force {
        return Err(EcmError::Input("uninstall requires --force (or --dry-run to preview)".into()));
    }

    let mut removed = Vec::new();
    for target in &targets {
        if target.is_dir() {
            std::fs::remove_dir_all(target).ok();
        } else {
            std::fs::remove_file(target).ok();
        }
        removed.push(target.display().to_string());
    }

    println!("{}", serde_json::to_string(&serde_json::json!({ "removed": removed }))?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "ecm=info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let config = Config::from_env();

    let result = match &args.command {
        Command::Ingest { path, project } => cmd_ingest(&config, path, project).await,
        Command::BatchIngest { dir, project } => cmd_batch_ingest(&config, dir, project).await,
        Command::Search { query, projects, k } => cmd_search(&config, query, projects, *k).await,
        Command::Recluster { min_size } => cmd_recluster(&config, *min_size).await,
        Command::Stats => cmd_stats(&config).await,
        Command::Health => cmd_health(&config).await,
        Command::Export { output, no_encrypt } => cmd_export(&config, output, *no_encrypt).await,
        Command::Import { file, merge } => cmd_import(&config, file, *merge).await,
        Command::Uninstall { force, keep_data, dry_run } => cmd_uninstall(&config, *force, *keep_data, *dry_run),
    };

    if let Err(e) = result {
        tracing::error!(error = %e, "Command failed");
        std::process::exit(e.exit_code());
    }

    Ok(())
}

//! Background upkeep tasks: vector TTL/FIFO cleanup, relational-store
//! vacuum, reclustering on a chunk-growth threshold, and project directory
//! discovery. Each returns a `TaskResult` rather than propagating; a failed
//! task is a reported fact, not a crash.

use std::path::Path;
use std::time::{Duration, Instant};

use serde_json::{json, Value};

use crate::clustering::{self, HdbscanInput};
use crate::config::Config;
use crate::db::traits::{ChunkStore, ClusterStore};
use crate::db::{Database, MetadataRepository};
use crate::error::Result;
use crate::vector_store::VectorStore;

#[derive(Debug, Clone)]
pub struct TaskResult {
    pub success: bool,
    pub duration: Duration,
    pub message: String,
    pub details: Value,
}

impl TaskResult {
    fn ok(start: Instant, message: impl Into<String>, details: Value) -> Self {
        Self { success: true, duration: start.elapsed(), message: message.into(), details }
    }

    fn failed(start: Instant, message: impl Into<String>) -> Self {
        Self { success: false, duration: start.elapsed(), message: message.into(), details: Value::Null }
    }
}

/// Deletes vectors past TTL, then FIFO-evicts down to the configured cap.
pub async fn cleanup_vectors(vectors: &impl VectorStore, config: &Config) -> TaskResult {
    let start = Instant::now();
    let run = async {
        let expired = vectors.cleanup_expired(config.maintenance.vector_ttl_days).await?;
        let evicted = vectors.evict_oldest(config.maintenance.vector_max_count).await?;
        Result::Ok((expired, evicted))
    };
    match run.await {
        Ok((expired, evicted)) => TaskResult::ok(
            start,
            format!("reaped {expired} expired, evicted {evicted} over cap"),
            json!({ "expired": expired, "evicted": evicted }),
        ),
        Err(e) => TaskResult::failed(start, e.to_string()),
    }
}

/// Compacts the relational store. SQLite's `VACUUM` rewrites the whole
/// file, so this should run during low-traffic windows.
pub async fn vacuum(db: &Database) -> TaskResult {
    let start = Instant::now();
    let run = async {
        let conn = db.connect()?;
        conn.execute_batch("VACUUM;").await?;
        Result::Ok(())
    };
    match run.await {
        Ok(()) => TaskResult::ok(start, "vacuum complete", Value::Null),
        Err(e) => TaskResult::failed(start, e.to_string()),
    }
}

/// Triggers a full reclustering pass if the number of chunks added since
/// the last run exceeds `maintenance.recluster_threshold`.
pub async fn update_clusters(
    backend: &(impl ChunkStore + ClusterStore + Sync),
    vectors: &impl VectorStore,
    db: &Database,
    config: &Config,
) -> TaskResult {
    let start = Instant::now();
    let run = async {
        let conn = db.connect()?;
        let since = MetadataRepository::get_last_recluster_at(&conn)
            .await?
            .unwrap_or_else(|| chrono::DateTime::<chrono::Utc>::UNIX_EPOCH);
        let added = backend.get_chunks_added_since(since).await?;
        if (added as u64) < config.maintenance.recluster_threshold {
            return Result::Ok(None);
        }

        let embeddings = vectors.get_all().await?;
        let points: Vec<HdbscanInput> =
            embeddings.into_iter().map(|(chunk_id, embedding)| HdbscanInput { chunk_id, embedding }).collect();
        let n = points.len();
        let result = clustering::cluster(points, config.clustering.min_cluster_size, config.clustering.metric);

        backend.replace_all_clusters(&result.clusters).await?;
        for chunk_id in backend.get_all_chunk_ids().await? {
            let cluster_id = result.assignments.get(&chunk_id).cloned();
            backend.set_cluster_id(&chunk_id, cluster_id.as_deref()).await?;
        }

        let now = chrono::Utc::now();
        MetadataRepository::set_last_recluster_at(&conn, now).await?;

        Result::Ok(Some((n, result.clusters.len())))
    };

    match run.await {
        Ok(Some((points, clusters))) => TaskResult::ok(
            start,
            format!("reclustered {points} points into {clusters} clusters"),
            json!({ "points": points, "clusters": clusters }),
        ),
        Ok(None) => TaskResult::ok(start, "below recluster threshold, skipped", Value::Null),
        Err(e) => TaskResult::failed(start, e.to_string()),
    }
}

/// Inspects `root` for project subdirectories holding transcript files not
/// yet seen, so the caller can queue them for ingestion.
pub fn scan_projects(root: &Path) -> TaskResult {
    let start = Instant::now();
    let entries = match std::fs::read_dir(root) {
        Ok(e) => e,
        Err(e) => return TaskResult::failed(start, format!("cannot read {}: {e}", root.display())),
    };

    let mut projects = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            let has_transcripts = std::fs::read_dir(&path)
                .map(|mut d| d.any(|f| f.map(|f| f.path().extension().is_some_and(|e| e == "jsonl")).unwrap_or(false)))
                .unwrap_or(false);
            if has_transcripts {
                if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                    projects.push(name.to_string());
                }
            }
        }
    }
    projects.sort();

    TaskResult::ok(
        start,
        format!("found {} project(s) with transcripts", projects.len()),
        json!({ "projects": projects }),
    )
}

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::decay::{weighted_edges, DecayConfig, WeightedEdge};
use crate::error::Result;
use crate::models::{Chunk, Cluster, Edge, EdgeDirection, IngestionCheckpoint};

/// CRUD and query operations over chunk rows.
#[async_trait]
pub trait ChunkStore: Send + Sync {
    async fn insert_chunk(&self, chunk: &Chunk) -> Result<()>;
    async fn get_chunk(&self, id: &str) -> Result<Option<Chunk>>;
    async fn get_chunks(&self, ids: &[String]) -> Result<Vec<Chunk>>;
    async fn delete_chunk(&self, id: &str) -> Result<bool>;
    async fn get_chunk_count(&self) -> Result<i64>;
    async fn get_session_ids(&self) -> Result<Vec<String>>;
    async fn get_all_chunk_ids(&self) -> Result<Vec<String>>;
    async fn set_cluster_id(&self, chunk_id: &str, cluster_id: Option<&str>) -> Result<()>;
    async fn get_chunks_added_since(&self, since: chrono::DateTime<chrono::Utc>) -> Result<i64>;
}

/// CRUD and traversal operations over the edge graph.
#[async_trait]
pub trait EdgeStore: Send + Sync {
    /// Inserts a forward/backward edge pair in one call, preserving the
    /// symmetry invariant.
    async fn insert_edge_pair(&self, forward: &Edge, backward: &Edge) -> Result<()>;
    async fn get_edge_count(&self) -> Result<i64>;
    async fn get_outgoing_edges(&self, chunk_id: &str, direction: EdgeDirection) -> Result<Vec<Edge>>;
    async fn get_all_edges(&self) -> Result<Vec<Edge>>;

    /// Outgoing edges with decay applied at `now`, live edges only, sorted
    /// by weight descending.
    async fn get_weighted_edges(
        &self,
        chunk_id: &str,
        now: DateTime<Utc>,
        decay_config: &DecayConfig,
        direction: EdgeDirection,
    ) -> Result<Vec<WeightedEdge>> {
        let edges = self.get_outgoing_edges(chunk_id, direction).await?;
        Ok(weighted_edges(edges, now, decay_config))
    }
}

/// CRUD over clusters; a reclustering run replaces the whole set atomically.
#[async_trait]
pub trait ClusterStore: Send + Sync {
    async fn replace_all_clusters(&self, clusters: &[Cluster]) -> Result<()>;
    async fn get_cluster_count(&self) -> Result<i64>;
    async fn get_cluster(&self, id: &str) -> Result<Option<Cluster>>;
    async fn get_all_clusters(&self) -> Result<Vec<Cluster>>;
}

/// Per-session ingestion progress.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    async fn get_checkpoint(&self, session_id: &str) -> Result<Option<IngestionCheckpoint>>;
    async fn upsert_checkpoint(&self, checkpoint: &IngestionCheckpoint) -> Result<()>;
}

/// Composed backend: every storage concern the engine depends on, backed by
/// one physical connection in the reference implementation.
#[async_trait]
pub trait DatabaseBackend: ChunkStore + EdgeStore + ClusterStore + CheckpointStore {
    async fn sync(&self) -> Result<()>;
}

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::db::connection::Database;
use crate::db::repository::{CheckpointRepository, ChunkRepository, ClusterRepository, EdgeRepository};
use crate::db::traits::{ChunkStore, ClusterStore, CheckpointStore, DatabaseBackend, EdgeStore};
use crate::error::Result;
use crate::models::{Chunk, Cluster, Edge, EdgeDirection, IngestionCheckpoint};

pub struct LibSqlBackend {
    db: Database,
}

impl LibSqlBackend {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ChunkStore for LibSqlBackend {
    async fn insert_chunk(&self, chunk: &Chunk) -> Result<()> {
        let conn = self.db.connect()?;
        ChunkRepository::create(&conn, chunk).await
    }
    async fn get_chunk(&self, id: &str) -> Result<Option<Chunk>> {
        let conn = self.db.connect()?;
        ChunkRepository::get_by_id(&conn, id).await
    }
    async fn get_chunks(&self, ids: &[String]) -> Result<Vec<Chunk>> {
        let conn = self.db.connect()?;
        ChunkRepository::get_by_ids(&conn, ids).await
    }
    async fn delete_chunk(&self, id: &str) -> Result<bool> {
        let conn = self.db.connect()?;
        ChunkRepository::delete(&conn, id).await
    }
    async fn get_chunk_count(&self) -> Result<i64> {
        let conn = self.db.connect()?;
        ChunkRepository::count(&conn).await
    }
    async fn get_session_ids(&self) -> Result<Vec<String>> {
        let conn = self.db.connect()?;
        ChunkRepository::session_ids(&conn).await
    }
    async fn get_all_chunk_ids(&self) -> Result<Vec<String>> {
        let conn = self.db.connect()?;
        ChunkRepository::all_ids(&conn).await
    }
    async fn set_cluster_id(&self, chunk_id: &str, cluster_id: Option<&str>) -> Result<()> {
        let conn = self.db.connect()?;
        ChunkRepository::set_cluster_id(&conn, chunk_id, cluster_id).await
    }
    async fn get_chunks_added_since(&self, since: DateTime<Utc>) -> Result<i64> {
        let conn = self.db.connect()?;
        ChunkRepository::added_since(&conn, since).await
    }
}

#[async_trait]
impl EdgeStore for LibSqlBackend {
    async fn insert_edge_pair(&self, forward: &Edge, backward: &Edge) -> Result<()> {
        let conn = self.db.connect()?;
        EdgeRepository::insert_pair(&conn, forward, backward).await
    }
    async fn get_edge_count(&self) -> Result<i64> {
        let conn = self.db.connect()?;
        EdgeRepository::count(&conn).await
    }
    async fn get_outgoing_edges(&self, chunk_id: &str, direction: EdgeDirection) -> Result<Vec<Edge>> {
        let conn = self.db.connect()?;
        EdgeRepository::outgoing(&conn, chunk_id, direction).await
    }
    async fn get_all_edges(&self) -> Result<Vec<Edge>> {
        let conn = self.db.connect()?;
        EdgeRepository::all(&conn).await
    }
}

#[async_trait]
impl ClusterStore for LibSqlBackend {
    async fn replace_all_clusters(&self, clusters: &[Cluster]) -> Result<()> {
        let conn = self.db.connect()?;
        ClusterRepository::replace_all(&conn, clusters).await
    }
    async fn get_cluster_count(&self) -> Result<i64> {
        let conn = self.db.connect()?;
        ClusterRepository::count(&conn).await
    }
    async fn get_cluster(&self, id: &str) -> Result<Option<Cluster>> {
        let conn = self.db.connect()?;
        ClusterRepository::get(&conn, id).await
    }
    async fn get_all_clusters(&self) -> Result<Vec<Cluster>> {
        let conn = self.db.connect()?;
        ClusterRepository::all(&conn).await
    }
}

#[async_trait]
impl CheckpointStore for LibSqlBackend {
    async fn get_checkpoint(&self, session_id: &str) -> Result<Option<IngestionCheckpoint>> {
        let conn = self.db.connect()?;
        CheckpointRepository::get(&conn, session_id).await
    }
    async fn upsert_checkpoint(&self, checkpoint: &IngestionCheckpoint) -> Result<()> {
        let conn = self.db.connect()?;
        CheckpointRepository::upsert(&conn, checkpoint).await
    }
}

#[async_trait]
impl DatabaseBackend for LibSqlBackend {
    async fn sync(&self) -> Result<()> {
        Ok(())
    }
}

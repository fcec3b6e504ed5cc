//! Dense similarity search over chunk embeddings. Exclusively owns the
//! `chunk_embeddings` table — the relational store never reads or writes
//! embedding bytes directly.

use async_trait::async_trait;
use chrono::Utc;
use libsql::Connection;

use crate::db::Database;
use crate::error::{EcmError, Result};

/// A similarity hit: chunk id and angular distance (`1 - cosine similarity`),
/// ascending — closer chunks sort first.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorHit {
    pub id: String,
    pub distance: f32,
}

#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn insert(&self, id: &str, embedding: &[f32]) -> Result<()>;
    async fn delete(&self, id: &str) -> Result<()>;
    async fn search(&self, query: &[f32], k: usize) -> Result<Vec<VectorHit>>;
    async fn search_by_project(
        &self,
        query: &[f32],
        projects: &[String],
        k: usize,
    ) -> Result<Vec<VectorHit>>;
    async fn count(&self) -> Result<i64>;
    async fn cleanup_expired(&self, ttl_days: u32) -> Result<u64>;
    async fn evict_oldest(&self, max_count: u64) -> Result<u64>;

    /// A consistent snapshot of every stored embedding, for a full
    /// reclustering pass. Clustering takes this snapshot at the start;
    /// concurrent ingestion is simply excluded from that run.
    async fn get_all(&self) -> Result<Vec<(String, Vec<f32>)>>;
}

pub struct LibSqlVectorStore {
    db: Database,
}

impl LibSqlVectorStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    fn conn(&self) -> Result<Connection> {
        self.db.connect()
    }
}

/// Embeddings are expected L2-normalised on input; this asserts the
/// invariant rather than silently renormalising a caller's mistake.
fn assert_unit_norm(embedding: &[f32]) -> Result<()> {
    let norm: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
    if (norm - 1.0).abs() > 1e-3 {
        return Err(EcmError::Embed(format!(
            "embedding is not unit-normalised: norm = {norm}"
        )));
    }
    Ok(())
}

/// JSON-encodes an embedding for binding into `vector32(?)` as a parameter,
/// rather than interpolating floats into SQL text.
fn encode(embedding: &[f32]) -> Result<String> {
    Ok(serde_json::to_string(embedding)?)
}

#[async_trait]
impl VectorStore for LibSqlVectorStore {
    async fn insert(&self, id: &str, embedding: &[f32]) -> Result<()> {
        assert_unit_norm(embedding)?;
        let conn = self.conn()?;
        let vec_json = encode(embedding)?;
        let now = Utc::now().to_rfc3339();
        conn.execute(
            "INSERT INTO chunk_embeddings (chunk_id, embedding, created_at)
             VALUES (?1, vector32(?2), ?3)
             ON CONFLICT(chunk_id) DO UPDATE SET embedding = excluded.embedding",
            libsql::params![id.to_string(), vec_json, now],
        )
        .await?;
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let conn = self.conn()?;
        conn.execute("DELETE FROM chunk_embeddings WHERE chunk_id = ?1", [id])
            .await?;
        Ok(())
    }

    async fn search(&self, query: &[f32], k: usize) -> Result<Vec<VectorHit>> {
        assert_unit_norm(query)?;
        let conn = self.conn()?;
        let vec_json = encode(query)?;
        let mut rows = conn
            .query(
                "SELECT chunk_id, vector_distance_cos(embedding, vector32(?1)) AS dist
                 FROM chunk_embeddings ORDER BY dist ASC LIMIT ?2",
                libsql::params![vec_json, k as i64],
            )
            .await?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().await? {
            out.push(VectorHit {
                id: row.get::<String>(0)?,
                distance: row.get::<f64>(1)? as f32,
            });
        }
        Ok(out)
    }

    async fn search_by_project(
        &self,
        query: &[f32],
        projects: &[String],
        k: usize,
    ) -> Result<Vec<VectorHit>> {
        assert_unit_norm(query)?;
        if projects.is_empty() {
            return self.search(query, k).await;
        }
        let conn = self.conn()?;
        let vec_json = encode(query)?;
        // Fixed params: ?1 = embedding; projects start at ?2; limit follows.
        let placeholders = (0..projects.len()).map(|i| format!("?{}", i + 2)).collect::<Vec<_>>().join(",");
        let sql = format!(
            "SELECT ce.chunk_id, vector_distance_cos(ce.embedding, vector32(?1)) AS dist
             FROM chunk_embeddings ce
             JOIN chunks c ON c.id = ce.chunk_id
             WHERE c.session_slug IN ({placeholders})
             ORDER BY dist ASC LIMIT ?{}",
            projects.len() + 2
        );
        let mut params: Vec<libsql::Value> = vec![libsql::Value::from(vec_json)];
        params.extend(projects.iter().map(|p| libsql::Value::from(p.clone())));
        params.push(libsql::Value::from(k as i64));
        let mut rows = conn.query(&sql, libsql::params_from_iter(params)).await?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().await? {
            out.push(VectorHit {
                id: row.get::<String>(0)?,
                distance: row.get::<f64>(1)? as f32,
            });
        }
        Ok(out)
    }

    async fn count(&self) -> Result<i64> {
        let conn = self.conn()?;
        let mut rows = conn.query("SELECT count(*) FROM chunk_embeddings", ()).await?;
        let row = rows.next().await?.expect("count always returns a row");
        Ok(row.get::<i64>(0)?)
    }

    /// Reaps vectors whose chunk row no longer exists plus vectors older
    /// than `ttl_days`, keeping the store free of orphans.
    async fn cleanup_expired(&self, ttl_days: u32) -> Result<u64> {
        let conn = self.conn()?;
        let orphans = conn
            .execute(
                "DELETE FROM chunk_embeddings WHERE chunk_id NOT IN (SELECT id FROM chunks)",
                (),
            )
            .await?;
        let cutoff = (Utc::now() - chrono::Duration::days(ttl_days as i64)).to_rfc3339();
        let expired = conn
            .execute(
                "DELETE FROM chunk_embeddings WHERE created_at < ?1",
                [cutoff],
            )
            .await?;
        Ok(orphans + expired)
    }

    async fn evict_oldest(&self, max_count: u64) -> Result<u64> {
        let conn = self.conn()?;
        let total = self.count().await? as u64;
        if total <= max_count {
            return Ok(0);
        }
        let overflow = total - max_count;
        let affected = conn
            .execute(
                "DELETE FROM chunk_embeddings WHERE chunk_id IN (
                    SELECT chunk_id FROM chunk_embeddings ORDER BY created_at ASC LIMIT ?1
                 )",
                [overflow as i64],
            )
            .await?;
        Ok(affected)
    }

    async fn get_all(&self) -> Result<Vec<(String, Vec<f32>)>> {
        let conn = self.conn()?;
        let mut rows = conn
            .query("SELECT chunk_id, vector_extract(embedding) FROM chunk_embeddings ORDER BY chunk_id", ())
            .await?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().await? {
            let id: String = row.get(0)?;
            let raw: String = row.get(1)?;
            out.push((id, decode_vector_literal(&raw)));
        }
        Ok(out)
    }
}

/// Parses libsql's `vector_extract` output, a JSON-array-shaped string like
/// `[0.1,0.2,0.3]`, back into a plain vector.
fn decode_vector_literal(raw: &str) -> Vec<f32> {
    raw.trim_matches(['[', ']'])
        .split(',')
        .filter(|s| !s.trim().is_empty())
        .filter_map(|s| s.trim().parse::<f32>().ok())
        .collect()
}

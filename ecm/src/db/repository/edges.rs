use chrono::{DateTime, Utc};
use libsql::{params, Connection};

use crate::error::Result;
use crate::models::{Edge, EdgeDirection, EdgeType};

pub struct EdgeRepository;

impl EdgeRepository {
    pub async fn insert_pair(conn: &Connection, forward: &Edge, backward: &Edge) -> Result<()> {
        Self::insert_one(conn, forward).await?;
        Self::insert_one(conn, backward).await?;
        Ok(())
    }

    async fn insert_one(conn: &Connection, edge: &Edge) -> Result<()> {
        conn.execute(
            "INSERT INTO edges (source_chunk_id, target_chunk_id, direction, edge_type, base_weight, created_at, vector_clock_delta)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(source_chunk_id, target_chunk_id, direction) DO NOTHING",
            params![
                edge.source_chunk_id.clone(),
                edge.target_chunk_id.clone(),
                edge.direction.to_string(),
                edge.edge_type.to_string(),
                edge.base_weight,
                edge.created_at.to_rfc3339(),
                edge.vector_clock_delta,
            ],
        )
        .await?;
        Ok(())
    }

    pub async fn count(conn: &Connection) -> Result<i64> {
        let mut rows = conn.query("SELECT count(*) FROM edges", ()).await?;
        let row = rows.next().await?.expect("count always returns a row");
        Ok(row.get::<i64>(0)?)
    }

    pub async fn all(conn: &Connection) -> Result<Vec<Edge>> {
        let mut rows = conn
            .query(
                "SELECT source_chunk_id, target_chunk_id, direction, edge_type, base_weight, created_at, vector_clock_delta
                 FROM edges ORDER BY source_chunk_id, target_chunk_id, direction",
                (),
            )
            .await?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().await? {
            out.push(row_to_edge(&row)?);
        }
        Ok(out)
    }

    pub async fn outgoing(conn: &Connection, chunk_id: &str, direction: EdgeDirection) -> Result<Vec<Edge>> {
        let mut rows = conn
            .query(
                "SELECT source_chunk_id, target_chunk_id, direction, edge_type, base_weight, created_at, vector_clock_delta
                 FROM edges WHERE source_chunk_id = ?1 AND direction = ?2",
                params![chunk_id.to_string(), direction.to_string()],
            )
            .await?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().await? {
            out.push(row_to_edge(&row)?);
        }
        Ok(out)
    }
}

fn row_to_edge(row: &libsql::Row) -> Result<Edge> {
    let direction: String = row.get(2)?;
    let edge_type: String = row.get(3)?;
    let created_at: String = row.get(5)?;
    Ok(Edge {
        source_chunk_id: row.get(0)?,
        target_chunk_id: row.get(1)?,
        direction: direction.parse::<EdgeDirection>().unwrap_or_default(),
        edge_type: edge_type.parse::<EdgeType>().unwrap_or(EdgeType::Adjacency),
        base_weight: row.get(4)?,
        created_at: DateTime::parse_from_rfc3339(&created_at)
            .map(|d| d.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
        vector_clock_delta: row.get(6)?,
    })
}

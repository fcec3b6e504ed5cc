use chrono::{DateTime, Utc};
use libsql::{params, Connection};

use crate::error::Result;
use crate::models::{Chunk, Role};

pub struct ChunkRepository;

impl ChunkRepository {
    pub async fn create(conn: &Connection, chunk: &Chunk) -> Result<()> {
        conn.execute(
            "INSERT INTO chunks (id, session_slug, session_id, turn_index_start, turn_index_end, role, text, created_at, vector_clock, cluster_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
             ON CONFLICT(id) DO NOTHING",
            params![
                chunk.id.clone(),
                chunk.session_slug.clone(),
                chunk.session_id.clone(),
                chunk.turn_index_start,
                chunk.turn_index_end,
                chunk.role.to_string(),
                chunk.text.clone(),
                chunk.created_at.to_rfc3339(),
                chunk.vector_clock,
                chunk.cluster_id.clone(),
            ],
        )
        .await?;
        Ok(())
    }

    pub async fn get_by_id(conn: &Connection, id: &str) -> Result<Option<Chunk>> {
        let mut rows = conn
            .query(
                "SELECT id, session_slug, session_id, turn_index_start, turn_index_end, role, text, created_at, vector_clock, cluster_id
                 FROM chunks WHERE id = ?1",
                [id],
            )
            .await?;
        match rows.next().await? {
            Some(row) => Ok(Some(row_to_chunk(&row)?)),
            None => Ok(None),
        }
    }

    pub async fn get_by_ids(conn: &Connection, ids: &[String]) -> Result<Vec<Chunk>> {
        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(c) = Self::get_by_id(conn, id).await? {
                out.push(c);
            }
        }
        Ok(out)
    }

    pub async fn delete(conn: &Connection, id: &str) -> Result<bool> {
        let affected = conn.execute("DELETE FROM chunks WHERE id = ?1", [id]).await?;
        Ok(affected > 0)
    }

    pub async fn count(conn: &Connection) -> Result<i64> {
        let mut rows = conn.query("SELECT count(*) FROM chunks", ()).await?;
        let row = rows.next().await?.expect("count always returns a row");
        Ok(row.get::<i64>(0)?)
    }

    pub async fn all_ids(conn: &Connection) -> Result<Vec<String>> {
        let mut rows = conn.query("SELECT id FROM chunks ORDER BY id", ()).await?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().await? {
            out.push(row.get::<String>(0)?);
        }
        Ok(out)
    }

    pub async fn session_ids(conn: &Connection) -> Result<Vec<String>> {
        let mut rows = conn
            .query("SELECT DISTINCT session_id FROM chunks ORDER BY session_id", ())
            .await?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().await? {
            out.push(row.get::<String>(0)?);
        }
        Ok(out)
    }

    pub async fn set_cluster_id(conn: &Connection, chunk_id: &str, cluster_id: Option<&str>) -> Result<()> {
        conn.execute(
            "UPDATE chunks SET cluster_id = ?2 WHERE id = ?1",
            params![chunk_id.to_string(), cluster_id.map(|s| s.to_string())],
        )
        .await?;
        Ok(())
    }

    pub async fn added_since(conn: &Connection, since: DateTime<Utc>) -> Result<i64> {
        let mut rows = conn
            .query(
                "SELECT count(*) FROM chunks WHERE created_at > ?1",
                [since.to_rfc3339()],
            )
            .await?;
        let row = rows.next().await?.expect("count always returns a row");
        Ok(row.get::<i64>(0)?)
    }
}

fn row_to_chunk(row: &libsql::Row) -> Result<Chunk> {
    let role: String = row.get(5)?;
    let created_at: String = row.get(7)?;
    Ok(Chunk {
        id: row.get(0)?,
        session_slug: row.get(1)?,
        session_id: row.get(2)?,
        turn_index_start: row.get(3)?,
        turn_index_end: row.get(4)?,
        role: role.parse::<Role>().unwrap_or_default(),
        text: row.get(6)?,
        created_at: DateTime::parse_from_rfc3339(&created_at)
            .map(|d| d.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
        vector_clock: row.get(8)?,
        cluster_id: row.get(9)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use libsql::Builder;

    async fn setup() -> Connection {
        let db = Builder::new_local(":memory:").build().await.unwrap();
        let conn = db.connect().unwrap();
        crate::db::schema::init_schema(&conn, 8).await.unwrap();
        conn
    }

    fn sample_chunk() -> Chunk {
        Chunk::new(
            "proj".into(),
            "sess-1".into(),
            0,
            0,
            Role::User,
            "hello world".into(),
            0,
        )
    }

    #[tokio::test]
    async fn create_then_get_roundtrips() {
        let conn = setup().await;
        let chunk = sample_chunk();
        ChunkRepository::create(&conn, &chunk).await.unwrap();

        let fetched = ChunkRepository::get_by_id(&conn, &chunk.id).await.unwrap().unwrap();
        assert_eq!(fetched.id, chunk.id);
        assert_eq!(fetched.text, chunk.text);
        assert_eq!(fetched.role, Role::User);
    }

    #[tokio::test]
    async fn create_is_idempotent_on_conflict() {
        let conn = setup().await;
        let chunk = sample_chunk();
        ChunkRepository::create(&conn, &chunk).await.unwrap();
        ChunkRepository::create(&conn, &chunk).await.unwrap();

        assert_eq!(ChunkRepository::count(&conn).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn set_cluster_id_updates_row() {
        let conn = setup().await;
        let chunk = sample_chunk();
        ChunkRepository::create(&conn, &chunk).await.unwrap();

        ChunkRepository::set_cluster_id(&conn, &chunk.id, Some("cluster-1"))
            .await
            .unwrap();
        let fetched = ChunkRepository::get_by_id(&conn, &chunk.id).await.unwrap().unwrap();
        assert_eq!(fetched.cluster_id.as_deref(), Some("cluster-1"));
    }

    #[tokio::test]
    async fn session_ids_lists_distinct_sessions() {
        let conn = setup().await;
        ChunkRepository::create(&conn, &sample_chunk()).await.unwrap();
        let mut other = sample_chunk();
        other.session_id = "sess-2".into();
        other.id = Chunk::make_id("sess-2", 0, 0, "hello world");
        ChunkRepository::create(&conn, &other).await.unwrap();

        let ids = ChunkRepository::session_ids(&conn).await.unwrap();
        assert_eq!(ids, vec!["sess-1".to_string(), "sess-2".to_string()]);
    }
}

use chrono::{DateTime, Utc};
use libsql::{params, Connection};

use crate::error::Result;
use crate::models::IngestionCheckpoint;

pub struct CheckpointRepository;

impl CheckpointRepository {
    pub async fn get(conn: &Connection, session_id: &str) -> Result<Option<IngestionCheckpoint>> {
        let mut rows = conn
            .query(
                "SELECT session_id, project_slug, last_turn_index, last_chunk_id, vector_clock, file_mtime, updated_at
                 FROM checkpoints WHERE session_id = ?1",
                [session_id],
            )
            .await?;
        match rows.next().await? {
            Some(row) => Ok(Some(row_to_checkpoint(&row)?)),
            None => Ok(None),
        }
    }

    pub async fn upsert(conn: &Connection, checkpoint: &IngestionCheckpoint) -> Result<()> {
        conn.execute(
            "INSERT INTO checkpoints (session_id, project_slug, last_turn_index, last_chunk_id, vector_clock, file_mtime, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(session_id) DO UPDATE SET
                project_slug = excluded.project_slug,
                last_turn_index = excluded.last_turn_index,
                last_chunk_id = excluded.last_chunk_id,
                vector_clock = excluded.vector_clock,
                file_mtime = excluded.file_mtime,
                updated_at = excluded.updated_at",
            params![
                checkpoint.session_id.clone(),
                checkpoint.project_slug.clone(),
                checkpoint.last_turn_index,
                checkpoint.last_chunk_id.clone(),
                checkpoint.vector_clock,
                checkpoint.file_mtime.to_rfc3339(),
                checkpoint.updated_at.to_rfc3339(),
            ],
        )
        .await?;
        Ok(())
    }
}

fn row_to_checkpoint(row: &libsql::Row) -> Result<IngestionCheckpoint> {
    let file_mtime: String = row.get(5)?;
    let updated_at: String = row.get(6)?;
    Ok(IngestionCheckpoint {
        session_id: row.get(0)?,
        project_slug: row.get(1)?,
        last_turn_index: row.get(2)?,
        last_chunk_id: row.get(3)?,
        vector_clock: row.get(4)?,
        file_mtime: parse_rfc3339(&file_mtime),
        updated_at: parse_rfc3339(&updated_at),
    })
}

fn parse_rfc3339(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|d| d.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

#[cfg(test)]
mod tests {
    use super::*;
    use libsql::Builder;

    #[tokio::test]
    async fn upsert_then_get_roundtrips() {
        let db = Builder::new_local(":memory:").build().await.unwrap();
        let conn = db.connect().unwrap();
        crate::db::schema::init_schema(&conn, 8).await.unwrap();

        let cp = IngestionCheckpoint::new("s1".into(), "proj".into(), 5, Some("c5".into()), 5, Utc::now());
        CheckpointRepository::upsert(&conn, &cp).await.unwrap();

        let fetched = CheckpointRepository::get(&conn, "s1").await.unwrap().unwrap();
        assert_eq!(fetched.last_turn_index, 5);
        assert_eq!(fetched.last_chunk_id.as_deref(), Some("c5"));
    }

    #[tokio::test]
    async fn upsert_overwrites_existing_checkpoint() {
        let db = Builder::new_local(":memory:").build().await.unwrap();
        let conn = db.connect().unwrap();
        crate::db::schema::init_schema(&conn, 8).await.unwrap();

        let first = IngestionCheckpoint::new("s1".into(), "proj".into(), 5, None, 5, Utc::now());
        CheckpointRepository::upsert(&conn, &first).await.unwrap();

        let second = IngestionCheckpoint::new("s1".into(), "proj".into(), 10, None, 10, Utc::now());
        CheckpointRepository::upsert(&conn, &second).await.unwrap();

        let fetched = CheckpointRepository::get(&conn, "s1").await.unwrap().unwrap();
        assert_eq!(fetched.last_turn_index, 10);
    }
}

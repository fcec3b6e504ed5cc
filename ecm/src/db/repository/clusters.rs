use chrono::Utc;
use libsql::{params, Connection};

use crate::error::Result;
use crate::models::Cluster;

pub struct ClusterRepository;

impl ClusterRepository {
    /// A reclustering run produces an immutable result set applied
    /// atomically: the prior cluster rows are replaced wholesale, never
    /// mutated in place.
    pub async fn replace_all(conn: &Connection, clusters: &[Cluster]) -> Result<()> {
        conn.execute_batch("DELETE FROM clusters;").await?;
        for cluster in clusters {
            conn.execute(
                "INSERT INTO clusters (id, label, size, lambda_birth, lambda_death, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    cluster.id.clone(),
                    cluster.label.clone(),
                    cluster.size,
                    cluster.lambda_birth,
                    cluster.lambda_death,
                    cluster.updated_at.to_rfc3339(),
                ],
            )
            .await?;
        }
        Ok(())
    }

    /// Inserts one cluster row, leaving an existing row with the same id
    /// untouched. Used by archive import, which must not disturb a cluster
    /// set a reclustering run already replaced wholesale.
    pub async fn insert_if_absent(conn: &Connection, cluster: &Cluster) -> Result<()> {
        conn.execute(
            "INSERT INTO clusters (id, label, size, lambda_birth, lambda_death, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(id) DO NOTHING",
            params![
                cluster.id.clone(),
                cluster.label.clone(),
                cluster.size,
                cluster.lambda_birth,
                cluster.lambda_death,
                cluster.updated_at.to_rfc3339(),
            ],
        )
        .await?;
        Ok(())
    }

    pub async fn count(conn: &Connection) -> Result<i64> {
        let mut rows = conn.query("SELECT count(*) FROM clusters", ()).await?;
        let row = rows.next().await?.expect("count always returns a row");
        Ok(row.get::<i64>(0)?)
    }

    pub async fn get(conn: &Connection, id: &str) -> Result<Option<Cluster>> {
        let mut rows = conn
            .query(
                "SELECT id, label, size, lambda_birth, lambda_death, updated_at FROM clusters WHERE id = ?1",
                [id],
            )
            .await?;
        match rows.next().await? {
            Some(row) => {
                let updated_at: String = row.get(5)?;
                Ok(Some(Cluster {
                    id: row.get(0)?,
                    label: row.get(1)?,
                    centroid: Vec::new(),
                    size: row.get(2)?,
                    lambda_birth: row.get(3)?,
                    lambda_death: row.get(4)?,
                    updated_at: chrono::DateTime::parse_from_rfc3339(&updated_at)
                        .map(|d| d.with_timezone(&Utc))
                        .unwrap_or_else(|_| Utc::now()),
                }))
            }
            None => Ok(None),
        }
    }

    pub async fn all(conn: &Connection) -> Result<Vec<Cluster>> {
        let mut rows = conn
            .query("SELECT id, label, size, lambda_birth, lambda_death, updated_at FROM clusters ORDER BY id", ())
            .await?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().await? {
            let updated_at: String = row.get(5)?;
            out.push(Cluster {
                id: row.get(0)?,
                label: row.get(1)?,
                centroid: Vec::new(),
                size: row.get(2)?,
                lambda_birth: row.get(3)?,
                lambda_death: row.get(4)?,
                updated_at: chrono::DateTime::parse_from_rfc3339(&updated_at)
                    .map(|d| d.with_timezone(&Utc))
                    .unwrap_or_else(|_| Utc::now()),
            });
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use libsql::Builder;

    #[tokio::test]
    async fn replace_all_swaps_the_full_set() {
        let db = Builder::new_local(":memory:").build().await.unwrap();
        let conn = db.connect().unwrap();
        crate::db::schema::init_schema(&conn, 8).await.unwrap();

        let first = vec![Cluster::new("c1".into(), vec![], 3, 1.0, 2.0)];
        ClusterRepository::replace_all(&conn, &first).await.unwrap();
        assert_eq!(ClusterRepository::count(&conn).await.unwrap(), 1);

        let second = vec![
            Cluster::new("c2".into(), vec![], 4, 1.0, 3.0),
            Cluster::new("c3".into(), vec![], 5, 1.0, 4.0),
        ];
        ClusterRepository::replace_all(&conn, &second).await.unwrap();
        assert_eq!(ClusterRepository::count(&conn).await.unwrap(), 2);
        assert!(ClusterRepository::get(&conn, "c1").await.unwrap().is_none());
    }
}

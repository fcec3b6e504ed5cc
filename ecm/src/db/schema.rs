use libsql::Connection;

use crate::error::Result;

/// Initialises the relational store, the vector store's embedding table, and
/// the keyword store's FTS5 shadow index plus its maintaining triggers.
///
/// `embedding_dimensions` must match the embedder in use; it is baked into
/// the `F32_BLOB` column width at schema-creation time.
pub async fn init_schema(conn: &Connection, embedding_dimensions: usize) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS chunks (
            id TEXT PRIMARY KEY,
            session_slug TEXT NOT NULL,
            session_id TEXT NOT NULL,
            turn_index_start INTEGER NOT NULL,
            turn_index_end INTEGER NOT NULL,
            role TEXT NOT NULL,
            text TEXT NOT NULL,
            created_at TEXT NOT NULL,
            vector_clock INTEGER NOT NULL,
            cluster_id TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_chunks_session_id ON chunks(session_id);
        CREATE INDEX IF NOT EXISTS idx_chunks_cluster_id ON chunks(cluster_id);

        CREATE TABLE IF NOT EXISTS edges (
            source_chunk_id TEXT NOT NULL,
            target_chunk_id TEXT NOT NULL,
            direction TEXT NOT NULL,
            edge_type TEXT NOT NULL,
            base_weight REAL NOT NULL,
            created_at TEXT NOT NULL,
            vector_clock_delta INTEGER,
            PRIMARY KEY (source_chunk_id, target_chunk_id, direction),
            FOREIGN KEY (source_chunk_id) REFERENCES chunks(id) ON DELETE CASCADE,
            FOREIGN KEY (target_chunk_id) REFERENCES chunks(id) ON DELETE CASCADE
        );

        CREATE INDEX IF NOT EXISTS idx_edges_source ON edges(source_chunk_id, direction);

        CREATE TABLE IF NOT EXISTS clusters (
            id TEXT PRIMARY KEY,
            label TEXT,
            size INTEGER NOT NULL,
            lambda_birth REAL NOT NULL,
            lambda_death REAL NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS checkpoints (
            session_id TEXT PRIMARY KEY,
            project_slug TEXT NOT NULL,
            last_turn_index INTEGER NOT NULL,
            last_chunk_id TEXT,
            vector_clock INTEGER NOT NULL,
            file_mtime TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS ecm_meta (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE VIRTUAL TABLE IF NOT EXISTS chunks_fts USING fts5(
            text,
            content='chunks',
            content_rowid='rowid'
        );

        CREATE TRIGGER IF NOT EXISTS chunks_fts_ai AFTER INSERT ON chunks BEGIN
            INSERT INTO chunks_fts(rowid, text) VALUES (new.rowid, new.text);
        END;

        CREATE TRIGGER IF NOT EXISTS chunks_fts_ad AFTER DELETE ON chunks BEGIN
            INSERT INTO chunks_fts(chunks_fts, rowid, text) VALUES ('delete', old.rowid, old.text);
        END;

        CREATE TRIGGER IF NOT EXISTS chunks_fts_au AFTER UPDATE ON chunks BEGIN
            INSERT INTO chunks_fts(chunks_fts, rowid, text) VALUES ('delete', old.rowid, old.text);
            INSERT INTO chunks_fts(rowid, text) VALUES (new.rowid, new.text);
        END;
        "#,
    )
    .await?;

    let embedding_table_sql = format!(
        "CREATE TABLE IF NOT EXISTS chunk_embeddings (
            chunk_id TEXT PRIMARY KEY,
            embedding F32_BLOB({embedding_dimensions}) NOT NULL,
            created_at TEXT NOT NULL,
            FOREIGN KEY (chunk_id) REFERENCES chunks(id) ON DELETE CASCADE
        );"
    );
    conn.execute_batch(&embedding_table_sql).await?;

    create_vector_index(conn).await;

    Ok(())
}

/// `libsql_vector_idx` indexes are an optional acceleration structure; a
/// failure to create one (e.g. unsupported build) degrades to a full scan
/// rather than blocking startup.
async fn create_vector_index(conn: &Connection) {
    if let Err(e) = conn
        .execute_batch(
            "CREATE INDEX IF NOT EXISTS idx_chunk_embeddings_vec
             ON chunk_embeddings(libsql_vector_idx(embedding));",
        )
        .await
    {
        tracing::warn!(error = %e, "failed to create vector index, falling back to full scan");
    }
}

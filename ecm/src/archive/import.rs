//! Archive import: the inverse of [`super::export`]. `--merge` leaves
//! existing rows untouched on id collision rather than replacing them;
//! without it the caller is expected to import into a fresh store.

use serde::{Deserialize, Serialize};

use crate::db::traits::{ChunkStore, ClusterStore, EdgeStore};
use crate::db::repository::ClusterRepository;
use crate::db::Database;
use crate::error::{EcmError, Result};
use crate::models::{Chunk, Edge, EdgeDirection};
use crate::vector_store::VectorStore;

use super::container::{self, Section};
use super::crypto;
use super::export::{decode_jsonl, decode_vectors, SchemaSnapshot};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportSummary {
    pub schema: SchemaSnapshot,
    pub chunks_imported: usize,
    pub edges_imported: usize,
    pub clusters_imported: usize,
    pub vectors_imported: usize,
}

/// Whether an archive round-trips encrypted. Mirrors [`super::export::ExportEncryption`]
/// but on the read side: an import either knows the passphrase up front or
/// reads plaintext.
pub enum ImportPassphrase<'a> {
    None,
    Passphrase(&'a str),
}

/// Parses and restores `bytes` into `backend`/`vectors`/`db` (the latter
/// needed for the cluster repository's conflict-aware insert). With
/// `merge = false`, edges and chunks still use their existing
/// `ON CONFLICT DO NOTHING` semantics at the store layer — true replacement
/// of colliding rows is out of scope, since chunk text is immutable by
/// design (see the chunk lifecycle invariant).
pub async fn restore_archive(
    backend: &(impl ChunkStore + EdgeStore + ClusterStore + Sync),
    vectors: &impl VectorStore,
    db: &Database,
    bytes: &[u8],
    passphrase: ImportPassphrase<'_>,
) -> Result<ImportSummary> {
    let plaintext = match passphrase {
        ImportPassphrase::None => bytes.to_vec(),
        ImportPassphrase::Passphrase(p) => crypto::open(p, bytes)?,
    };

    let sections = container::read_all_sections(&plaintext)?;
    let schema_bytes = sections
        .get(&Section::Schema)
        .ok_or_else(|| EcmError::Archive("archive missing schema section".into()))?;
    let schema: SchemaSnapshot = serde_json::from_slice(schema_bytes)?;

    let chunks: Vec<Chunk> = sections
        .get(&Section::Chunks)
        .map(|b| decode_jsonl(b))
        .transpose()?
        .unwrap_or_default();
    let edges: Vec<Edge> = sections
        .get(&Section::Edges)
        .map(|b| decode_jsonl(b))
        .transpose()?
        .unwrap_or_default();
    let clusters: Vec<crate::models::Cluster> = sections
        .get(&Section::Clusters)
        .map(|b| decode_jsonl(b))
        .transpose()?
        .unwrap_or_default();
    let embeddings = sections
        .get(&Section::Vectors)
        .map(|b| decode_vectors(b))
        .transpose()?
        .unwrap_or_default();

    for chunk in &chunks {
        backend.insert_chunk(chunk).await?;
    }

    for edge in edges.iter().filter(|e| e.direction == EdgeDirection::Forward) {
        let mirror = edges
            .iter()
            .find(|e| {
                e.direction == EdgeDirection::Backward
                    && e.source_chunk_id == edge.target_chunk_id
                    && e.target_chunk_id == edge.source_chunk_id
            })
            .cloned()
            .unwrap_or_else(|| {
                let (_, backward) =
                    Edge::new_pair(edge.source_chunk_id.clone(), edge.target_chunk_id.clone(), edge.edge_type, edge.vector_clock_delta);
                backward
            });
        backend.insert_edge_pair(edge, &mirror).await?;
    }

    let conn = db.connect()?;
    for cluster in &clusters {
        ClusterRepository::insert_if_absent(&conn, cluster).await?;
    }

    for (id, embedding) in &embeddings {
        vectors.insert(id, embedding).await?;
    }

    Ok(ImportSummary {
        schema,
        chunks_imported: chunks.len(),
        edges_imported: edges.len(),
        clusters_imported: clusters.len(),
        vectors_imported: embeddings.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::export::{build_archive, ExportEncryption};
    use crate::db::LibSqlBackend;
    use crate::models::{EdgeType, Role};
    use crate::vector_store::LibSqlVectorStore;

    async fn seeded_archive(encrypted: bool) -> (Vec<u8>, String, String) {
        let db = Database::new(":memory:", 2).await.unwrap();
        let vectors = LibSqlVectorStore::new(db.clone());
        let backend = LibSqlBackend::new(db);

        let a = Chunk::new("proj".into(), "s1".into(), 0, 0, Role::User, "hello".into(), 0);
        let b = Chunk::new("proj".into(), "s1".into(), 1, 1, Role::Assistant, "world".into(), 1);
        backend.insert_chunk(&a).await.unwrap();
        backend.insert_chunk(&b).await.unwrap();
        let (fwd, bwd) = Edge::new_pair(a.id.clone(), b.id.clone(), EdgeType::Continuation, Some(1));
        backend.insert_edge_pair(&fwd, &bwd).await.unwrap();
        vectors.insert(&a.id, &[1.0, 0.0]).await.unwrap();
        vectors.insert(&b.id, &[0.0, 1.0]).await.unwrap();

        let encryption = if encrypted {
            ExportEncryption::Passphrase("s3cret")
        } else {
            ExportEncryption::None
        };
        let archive = build_archive(&backend, &vectors, encryption).await.unwrap();
        (archive, a.id, b.id)
    }

    #[tokio::test]
    async fn restoring_a_plaintext_archive_repopulates_an_empty_store() {
        let (archive, a_id, _b_id) = seeded_archive(false).await;

        let fresh_db = Database::new(":memory:", 2).await.unwrap();
        let fresh_vectors = LibSqlVectorStore::new(fresh_db.clone());
        let fresh_backend = LibSqlBackend::new(fresh_db.clone());

        let summary = restore_archive(&fresh_backend, &fresh_vectors, &fresh_db, &archive, ImportPassphrase::None)
            .await
            .unwrap();

        assert_eq!(summary.chunks_imported, 2);
        assert_eq!(summary.edges_imported, 2);
        assert_eq!(summary.vectors_imported, 2);
        assert!(fresh_backend.get_chunk(&a_id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn restoring_an_encrypted_archive_requires_the_passphrase() {
        let (archive, _a_id, _b_id) = seeded_archive(true).await;

        let fresh_db = Database::new(":memory:", 2).await.unwrap();
        let fresh_vectors = LibSqlVectorStore::new(fresh_db.clone());
        let fresh_backend = LibSqlBackend::new(fresh_db.clone());

        let err = restore_archive(&fresh_backend, &fresh_vectors, &fresh_db, &archive, ImportPassphrase::Passphrase("wrong"))
            .await
            .unwrap_err();
        assert!(matches!(err, EcmError::Archive(_)));

        let summary = restore_archive(&fresh_backend, &fresh_vectors, &fresh_db, &archive, ImportPassphrase::Passphrase("s3cret"))
            .await
            .unwrap();
        assert_eq!(summary.chunks_imported, 2);
    }

    #[tokio::test]
    async fn reimporting_into_a_populated_store_does_not_duplicate_rows() {
        let (archive, _a_id, _b_id) = seeded_archive(false).await;

        let db = Database::new(":memory:", 2).await.unwrap();
        let vectors = LibSqlVectorStore::new(db.clone());
        let backend = LibSqlBackend::new(db.clone());

        restore_archive(&backend, &vectors, &db, &archive, ImportPassphrase::None).await.unwrap();
        restore_archive(&backend, &vectors, &db, &archive, ImportPassphrase::None).await.unwrap();

        assert_eq!(backend.get_chunk_count().await.unwrap(), 2);
        assert_eq!(backend.get_edge_count().await.unwrap(), 2);
    }
}

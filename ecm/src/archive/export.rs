//! Archive export: a tar-like container of (schema snapshot, chunks.jsonl,
//! edges.jsonl, clusters.jsonl, vectors.bin), optionally sealed with
//! [`super::crypto::seal`].

use std::io::Write;

use serde::{Deserialize, Serialize};

use crate::db::traits::{ChunkStore, ClusterStore, EdgeStore};
use crate::error::{EcmError, Result};
use crate::vector_store::VectorStore;

use super::container::{self, Section};
use super::crypto;

const ARCHIVE_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaSnapshot {
    pub version: u32,
    pub exported_at: chrono::DateTime<chrono::Utc>,
    pub chunk_count: usize,
    pub edge_count: usize,
    pub cluster_count: usize,
    pub vector_count: usize,
}

/// Encryption choice for `export --output <path> [--no-encrypt]`.
pub enum ExportEncryption<'a> {
    None,
    Passphrase(&'a str),
}

/// Builds the container bytes for the full store. Does not write to disk;
/// callers decide the destination (a file, or an in-memory buffer in tests).
pub async fn build_archive(
    backend: &(impl ChunkStore + EdgeStore + ClusterStore + Sync),
    vectors: &impl VectorStore,
    encryption: ExportEncryption<'_>,
) -> Result<Vec<u8>> {
    let chunk_ids = backend.get_all_chunk_ids().await?;
    let chunks = backend.get_chunks(&chunk_ids).await?;
    let edges = backend.get_all_edges().await?;
    let clusters = backend.get_all_clusters().await?;
    let embeddings = vectors.get_all().await?;

    let snapshot = SchemaSnapshot {
        version: ARCHIVE_SCHEMA_VERSION,
        exported_at: chrono::Utc::now(),
        chunk_count: chunks.len(),
        edge_count: edges.len(),
        cluster_count: clusters.len(),
        vector_count: embeddings.len(),
    };

    let mut container = Vec::new();
    container::write_section(&mut container, Section::Schema, &serde_json::to_vec(&snapshot)?)?;
    container::write_section(&mut container, Section::Chunks, &jsonl(&chunks)?)?;
    container::write_section(&mut container, Section::Edges, &jsonl(&edges)?)?;
    container::write_section(&mut container, Section::Clusters, &jsonl(&clusters)?)?;
    container::write_section(&mut container, Section::Vectors, &encode_vectors(&embeddings))?;

    match encryption {
        ExportEncryption::None => Ok(container),
        ExportEncryption::Passphrase(passphrase) => crypto::seal(passphrase, &container),
    }
}

fn jsonl<T: Serialize>(items: &[T]) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    for item in items {
        serde_json::to_writer(&mut buf, item)?;
        buf.push(b'\n');
    }
    Ok(buf)
}

/// `vectors.bin`: each record is `chunk_id_len:u16 | chunk_id | dims:u32 |
/// f32 * dims`, little-endian, back to back.
fn encode_vectors(embeddings: &[(String, Vec<f32>)]) -> Vec<u8> {
    let mut buf = Vec::new();
    for (id, vector) in embeddings {
        let id_bytes = id.as_bytes();
        buf.write_all(&(id_bytes.len() as u16).to_le_bytes()).expect("writing to Vec never fails");
        buf.write_all(id_bytes).expect("writing to Vec never fails");
        buf.write_all(&(vector.len() as u32).to_le_bytes()).expect("writing to Vec never fails");
        for value in vector {
            buf.write_all(&value.to_le_bytes()).expect("writing to Vec never fails");
        }
    }
    buf
}

pub(super) fn decode_vectors(bytes: &[u8]) -> Result<Vec<(String, Vec<f32>)>> {
    let mut out = Vec::new();
    let mut cursor = 0usize;
    while cursor < bytes.len() {
        if cursor + 2 > bytes.len() {
            return Err(EcmError::Archive("truncated vectors section".into()));
        }
        let id_len = u16::from_le_bytes([bytes[cursor], bytes[cursor + 1]]) as usize;
        cursor += 2;
        if cursor + id_len + 4 > bytes.len() {
            return Err(EcmError::Archive("truncated vectors section".into()));
        }
        let id = String::from_utf8(bytes[cursor..cursor + id_len].to_vec())
            .map_err(|e| EcmError::Archive(format!("non-utf8 chunk id in vectors section: {e}")))?;
        cursor += id_len;
        let dims = u32::from_le_bytes(bytes[cursor..cursor + 4].try_into().unwrap()) as usize;
        cursor += 4;
        if cursor + dims * 4 > bytes.len() {
            return Err(EcmError::Archive("truncated vectors section".into()));
        }
        let mut vector = Vec::with_capacity(dims);
        for i in 0..dims {
            let start = cursor + i * 4;
            vector.push(f32::from_le_bytes(bytes[start..start + 4].try_into().unwrap()));
        }
        cursor += dims * 4;
        out.push((id, vector));
    }
    Ok(out)
}

pub(super) fn decode_jsonl<T: for<'de> Deserialize<'de>>(bytes: &[u8]) -> Result<Vec<T>> {
    let mut out = Vec::new();
    for line in bytes.split(|b| *b == b'\n') {
        if line.is_empty() {
            continue;
        }
        out.push(serde_json::from_slice(line)?);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::models::{Chunk, Edge, EdgeType, Role};
    use crate::vector_store::LibSqlVectorStore;

    async fn seeded() -> (crate::db::LibSqlBackend, LibSqlVectorStore) {
        let db = Database::new(":memory:", 4).await.unwrap();
        let vectors = LibSqlVectorStore::new(db.clone());
        let backend = crate::db::LibSqlBackend::new(db);

        let a = Chunk::new("proj".into(), "s1".into(), 0, 0, Role::User, "hello".into(), 0);
        let b = Chunk::new("proj".into(), "s1".into(), 1, 1, Role::Assistant, "world".into(), 1);
        backend.insert_chunk(&a).await.unwrap();
        backend.insert_chunk(&b).await.unwrap();
        let (fwd, bwd) = Edge::new_pair(a.id.clone(), b.id.clone(), EdgeType::Continuation, Some(1));
        backend.insert_edge_pair(&fwd, &bwd).await.unwrap();
        vectors.insert(&a.id, &[1.0, 0.0]).await.unwrap();
        vectors.insert(&b.id, &[0.0, 1.0]).await.unwrap();

        (backend, vectors)
    }

    #[tokio::test]
    async fn plaintext_archive_roundtrips_every_section() {
        let (backend, vectors) = seeded().await;
        let archive = build_archive(&backend, &vectors, ExportEncryption::None).await.unwrap();

        let sections = container::read_all_sections(&archive).unwrap();
        let chunks: Vec<Chunk> = decode_jsonl(&sections[&Section::Chunks]).unwrap();
        let edges: Vec<Edge> = decode_jsonl(&sections[&Section::Edges]).unwrap();
        let decoded_vectors = decode_vectors(&sections[&Section::Vectors]).unwrap();

        assert_eq!(chunks.len(), 2);
        assert_eq!(edges.len(), 2);
        assert_eq!(decoded_vectors.len(), 2);
    }

    #[tokio::test]
    async fn encrypted_archive_requires_the_passphrase() {
        let (backend, vectors) = seeded().await;
        let archive = build_archive(&backend, &vectors, ExportEncryption::Passphrase("hunter2")).await.unwrap();

        assert!(crypto::open("wrong", &archive).is_err());
        let opened = crypto::open("hunter2", &archive).unwrap();
        let sections = container::read_all_sections(&opened).unwrap();
        assert!(sections.contains_key(&Section::Schema));
    }
}

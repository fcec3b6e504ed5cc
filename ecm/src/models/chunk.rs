use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::Role;

/// Atomic unit of memory: a run of consecutive turns from one session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chunk {
    pub id: String,
    pub session_slug: String,
    pub session_id: String,
    pub turn_index_start: i64,
    pub turn_index_end: i64,
    pub role: Role,
    pub text: String,
    pub created_at: DateTime<Utc>,
    pub vector_clock: i64,
    pub cluster_id: Option<String>,
}

impl Chunk {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        session_slug: String,
        session_id: String,
        turn_index_start: i64,
        turn_index_end: i64,
        role: Role,
        text: String,
        vector_clock: i64,
    ) -> Self {
        let id = Self::make_id(&session_id, turn_index_start, turn_index_end, &text);
        Self {
            id,
            session_slug,
            session_id,
            turn_index_start,
            turn_index_end,
            role,
            text,
            created_at: Utc::now(),
            vector_clock,
            cluster_id: None,
        }
    }

    /// Deterministic content-addressed id: hash of session id, turn range and
    /// normalised text. Same input always yields the same id, which is what
    /// makes re-ingestion of an already-seen transcript a no-op.
    pub fn make_id(session_id: &str, turn_start: i64, turn_end: i64, text: &str) -> String {
        let normalised = normalise_text(text);
        let mut hasher = Sha256::new();
        hasher.update(session_id.as_bytes());
        hasher.update(b"\0");
        hasher.update(turn_start.to_le_bytes());
        hasher.update(turn_end.to_le_bytes());
        hasher.update(b"\0");
        hasher.update(normalised.as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

/// Collapses whitespace runs and trims, so formatting differences in the
/// source transcript don't change the content-addressed id.
pub fn normalise_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkSearchResult {
    pub chunk: Chunk,
    pub score: f32,
    pub is_seed: bool,
}

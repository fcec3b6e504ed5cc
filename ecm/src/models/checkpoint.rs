use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Per-session ingestion progress record. Primary key is `session_id`.
///
/// Invariant: if a checkpoint exists, all chunks with
/// `turn_index_end <= last_turn_index` for that session already exist in
/// storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionCheckpoint {
    pub session_id: String,
    pub project_slug: String,
    pub last_turn_index: i64,
    pub last_chunk_id: Option<String>,
    pub vector_clock: i64,
    pub file_mtime: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl IngestionCheckpoint {
    pub fn new(
        session_id: String,
        project_slug: String,
        last_turn_index: i64,
        last_chunk_id: Option<String>,
        vector_clock: i64,
        file_mtime: DateTime<Utc>,
    ) -> Self {
        Self {
            session_id,
            project_slug,
            last_turn_index,
            last_chunk_id,
            vector_clock,
            file_mtime,
            updated_at: Utc::now(),
        }
    }

    /// Whether a file with the given mtime and highest turn index can be
    /// skipped outright during the discover-and-skip ingestion phase.
    pub fn covers(&self, file_mtime: DateTime<Utc>, max_turn_index_in_file: i64) -> bool {
        self.file_mtime == file_mtime && self.last_turn_index >= max_turn_index_in_file
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn covers_when_mtime_and_turn_index_match() {
        let mtime = Utc::now();
        let cp = IngestionCheckpoint::new("s1".into(), "proj".into(), 10, None, 10, mtime);
        assert!(cp.covers(mtime, 10));
        assert!(cp.covers(mtime, 5));
    }

    #[test]
    fn does_not_cover_when_file_grew() {
        let mtime = Utc::now();
        let cp = IngestionCheckpoint::new("s1".into(), "proj".into(), 5, None, 5, mtime);
        assert!(!cp.covers(mtime, 10));
    }

    #[test]
    fn does_not_cover_when_mtime_changed() {
        let mtime = Utc::now();
        let cp = IngestionCheckpoint::new("s1".into(), "proj".into(), 10, None, 10, mtime);
        let later = mtime + chrono::Duration::seconds(1);
        assert!(!cp.covers(later, 5));
    }
}

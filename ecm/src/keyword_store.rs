//! Sparse (BM25-ranked) search over the `chunks_fts` shadow index. The
//! keyword store never touches `chunks` rows directly — it reads only what
//! the FTS triggers mirrored in, and sanitises caller queries before they
//! ever reach FTS5's MATCH syntax.

use async_trait::async_trait;
use libsql::Connection;

use crate::db::Database;
use crate::error::Result;

#[derive(Debug, Clone, PartialEq)]
pub struct KeywordHit {
    pub id: String,
    /// `-bm25()`: higher is a better match, consistent with every other
    /// score in the retrieval pipeline.
    pub score: f64,
}

#[async_trait]
pub trait KeywordStore: Send + Sync {
    async fn search(&self, query: &str, k: usize) -> Result<Vec<KeywordHit>>;
}

pub struct LibSqlKeywordStore {
    db: Database,
}

impl LibSqlKeywordStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    fn conn(&self) -> Result<Connection> {
        self.db.connect()
    }
}

const BARE_OPERATORS: [&str; 3] = ["AND", "OR", "NOT"];
const METACHARACTERS: [char; 6] = ['*', '^', ':', '(', ')', '-'];

/// FTS5 query syntax treats `" * ^ : ( ) -` as operators, and bare `AND` /
/// `OR` / `NOT` as boolean keywords. A raw user query containing these
/// (e.g. `SELECT * FROM x AND y OR "hi"`) would otherwise raise a syntax
/// error or silently change the query's boolean structure instead of being
/// treated as plain keyword search terms. This drops bare boolean keywords
/// and strips FTS5 metacharacters before quoting each remaining term,
/// disabling FTS5's operator parsing while keeping implicit AND-of-terms
/// semantics.
pub fn sanitize_fts_query(raw: &str) -> String {
    raw.split_whitespace()
        .filter(|term| !BARE_OPERATORS.iter().any(|op| term.eq_ignore_ascii_case(op)))
        .filter_map(|term| {
            let stripped: String = term.chars().filter(|c| !METACHARACTERS.contains(c)).collect();
            let trimmed = stripped.trim_matches('"');
            if trimmed.is_empty() {
                return None;
            }
            let escaped = trimmed.replace('"', "\"\"");
            Some(format!("\"{escaped}\""))
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[async_trait]
impl KeywordStore for LibSqlKeywordStore {
    async fn search(&self, query: &str, k: usize) -> Result<Vec<KeywordHit>> {
        let sanitized = sanitize_fts_query(query);
        if sanitized.is_empty() {
            return Ok(Vec::new());
        }
        let conn = self.conn()?;
        let mut rows = conn
            .query(
                "SELECT chunks.id, bm25(chunks_fts) AS rank
                 FROM chunks_fts
                 JOIN chunks ON chunks.rowid = chunks_fts.rowid
                 WHERE chunks_fts MATCH ?1
                 ORDER BY rank LIMIT ?2",
                libsql::params![sanitized, k as i64],
            )
            .await?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().await? {
            out.push(KeywordHit {
                id: row.get::<String>(0)?,
                score: -row.get::<f64>(1)?,
            });
        }
        Ok(out)
    }
}

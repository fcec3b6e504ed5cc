//! Parsing of newline-delimited transcript files into raw turn records.

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::error::{EcmError, Result};
use crate::models::Role;

/// One line of a transcript file.
#[derive(Debug, Clone, Deserialize)]
pub struct RawTurn {
    pub turn_index: i64,
    pub role: Role,
    pub text: String,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

/// A parsed turn plus derived, ingestion-only metadata.
#[derive(Debug, Clone)]
pub struct Turn {
    pub turn_index: i64,
    pub role: Role,
    pub text: String,
    pub timestamp: DateTime<Utc>,
    pub has_code: bool,
}

impl From<RawTurn> for Turn {
    fn from(raw: RawTurn) -> Self {
        let has_code = looks_like_code(&raw.text);
        Turn {
            turn_index: raw.turn_index,
            role: raw.role,
            text: raw.text,
            timestamp: raw.timestamp,
            has_code,
        }
    }
}

/// A turn "has code" if it contains a fenced code block or an inline
/// monospace run long enough to be a snippet rather than a word.
fn looks_like_code(text: &str) -> bool {
    text.contains("```") || text.contains("    def ") || text.contains("    function ")
}

/// Parses a transcript file's contents: one JSON turn record per line,
/// blank lines ignored. Corrupt lines are skipped with a warning rather than
/// failing the whole file, per the ingestion pipeline's failure semantics.
pub fn parse_transcript(contents: &str) -> Vec<Turn> {
    contents
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| match serde_json::from_str::<RawTurn>(line) {
            Ok(raw) => Some(Turn::from(raw)),
            Err(e) => {
                tracing::warn!(error = %e, "skipping corrupt transcript line");
                None
            }
        })
        .collect()
}

pub fn max_turn_index(turns: &[Turn]) -> Option<i64> {
    turns.iter().map(|t| t.turn_index).max()
}

pub fn read_transcript_file(path: &std::path::Path) -> Result<Vec<Turn>> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| EcmError::Input(format!("cannot read transcript {}: {e}", path.display())))?;
    Ok(parse_transcript(&contents))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_well_formed_lines() {
        let input = r#"{"turn_index":0,"role":"user","text":"hi","timestamp":"2024-01-01T00:00:00Z"}
{"turn_index":1,"role":"assistant","text":"hello","timestamp":"2024-01-01T00:00:05Z"}
"#;
        let turns = parse_transcript(input);
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].role, Role::User);
    }

    #[test]
    fn skips_corrupt_lines_without_failing() {
        let input = "not json\n{\"turn_index\":0,\"role\":\"user\",\"text\":\"hi\",\"timestamp\":\"2024-01-01T00:00:00Z\"}\n";
        let turns = parse_transcript(input);
        assert_eq!(turns.len(), 1);
    }

    #[test]
    fn detects_fenced_code_blocks() {
        let turns = parse_transcript(
            "{\"turn_index\":0,\"role\":\"tool\",\"text\":\"```rust\\nfn x(){}\\n```\",\"timestamp\":\"2024-01-01T00:00:00Z\"}\n",
        );
        assert!(turns[0].has_code);
    }

    #[test]
    fn max_turn_index_of_empty_is_none() {
        assert_eq!(max_turn_index(&[]), None);
    }
}

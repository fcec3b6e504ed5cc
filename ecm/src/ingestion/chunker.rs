//! Groups consecutive transcript turns into durable chunks. `code-focused`
//! mode drops tool-result turns that carry no code before grouping; `full`
//! keeps every turn. Groups are bounded by a character budget, same spirit
//! as sentence-merging chunkers, but the atomic unit here is a turn, not a
//! sentence, since a chunk must never split a single turn across two rows.

use crate::config::{IngestionConfig, RenderMode};
use crate::models::Chunk;

use super::transcript::Turn;

fn eligible(turns: &[Turn], mode: RenderMode) -> Vec<&Turn> {
    match mode {
        RenderMode::Full => turns.iter().collect(),
        RenderMode::CodeFocused => turns
            .iter()
            .filter(|t| t.role != crate::models::Role::Tool || t.has_code)
            .collect(),
    }
}

fn render_turn(turn: &Turn) -> String {
    format!("[{}] {}", turn.role, turn.text)
}

/// Groups `turns` (already sorted by `turn_index`) into chunks. `vector_clock`
/// is a running per-session counter; the caller passes in the value to start
/// from (one past the last chunk's clock from the session's checkpoint) and
/// gets back chunks with consecutive clock values.
pub fn group_into_chunks(
    turns: &[Turn],
    session_slug: &str,
    session_id: &str,
    config: &IngestionConfig,
    starting_vector_clock: i64,
) -> Vec<Chunk> {
    let selected = eligible(turns, config.render_mode);
    if selected.is_empty() {
        return Vec::new();
    }

    let mut chunks = Vec::new();
    let mut group: Vec<&Turn> = Vec::new();
    let mut group_len = 0usize;
    let mut clock = starting_vector_clock;

    let mut flush = |group: &mut Vec<&Turn>, chunks: &mut Vec<Chunk>, clock: &mut i64| {
        if group.is_empty() {
            return;
        }
        let text = group.iter().map(|t| render_turn(t)).collect::<Vec<_>>().join("\n");
        let start = group.first().unwrap().turn_index;
        let end = group.last().unwrap().turn_index;
        let role = group.first().unwrap().role;
        chunks.push(Chunk::new(
            session_slug.to_string(),
            session_id.to_string(),
            start,
            end,
            role,
            text,
            *clock,
        ));
        *clock += 1;
        group.clear();
    };

    for turn in selected {
        let addition = turn.text.len() + 8;
        if group_len + addition > config.chunk_char_budget && !group.is_empty() {
            flush(&mut group, &mut chunks, &mut clock);
            group_len = 0;
        }
        group_len += addition;
        group.push(turn);
    }
    flush(&mut group, &mut chunks, &mut clock);

    chunks
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;
    use chrono::Utc;

    fn turn(idx: i64, role: Role, text: &str, has_code: bool) -> Turn {
        Turn { turn_index: idx, role, text: text.to_string(), timestamp: Utc::now(), has_code }
    }

    fn config(budget: usize, mode: RenderMode) -> IngestionConfig {
        IngestionConfig {
            render_mode: mode,
            chunk_char_budget: budget,
            short_gap_minutes: 10,
            long_gap_minutes: 30,
        }
    }

    #[test]
    fn groups_all_turns_into_one_chunk_when_under_budget() {
        let turns = vec![
            turn(0, Role::User, "how does X work", false),
            turn(1, Role::Assistant, "X works by Y", false),
        ];
        let chunks = group_into_chunks(&turns, "proj", "s1", &config(2000, RenderMode::Full), 0);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].turn_index_start, 0);
        assert_eq!(chunks[0].turn_index_end, 1);
    }

    #[test]
    fn splits_into_multiple_chunks_past_budget() {
        let turns: Vec<Turn> = (0..10)
            .map(|i| turn(i, Role::User, "x".repeat(50).as_str(), false))
            .collect();
        let chunks = group_into_chunks(&turns, "proj", "s1", &config(120, RenderMode::Full), 0);
        assert!(chunks.len() > 1);
    }

    #[test]
    fn code_focused_mode_drops_tool_turns_without_code() {
        let turns = vec![
            turn(0, Role::User, "run the tests", false),
            turn(1, Role::Tool, "no output", false),
            turn(2, Role::Tool, "```\nok\n```", true),
        ];
        let chunks = group_into_chunks(&turns, "proj", "s1", &config(2000, RenderMode::CodeFocused), 0);
        let joined: String = chunks.iter().map(|c| c.text.clone()).collect();
        assert!(!joined.contains("no output"));
        assert!(joined.contains("ok"));
    }

    #[test]
    fn vector_clock_increments_per_chunk() {
        let turns: Vec<Turn> = (0..10)
            .map(|i| turn(i, Role::User, "x".repeat(50).as_str(), false))
            .collect();
        let chunks = group_into_chunks(&turns, "proj", "s1", &config(120, RenderMode::Full), 5);
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.vector_clock, 5 + i as i64);
        }
    }
}

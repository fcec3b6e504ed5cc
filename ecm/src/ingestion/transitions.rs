//! Classifies the transition between two adjacent chunks as `continuation`
//! or `topic_shift` from lexical and timing features, per the ingestion
//! pipeline's continuation-score formula.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use regex::Regex;
use std::sync::LazyLock;

use crate::config::IngestionConfig;
use crate::models::EdgeType;

static TOPIC_SHIFT_MARKERS: &[&str] = &[
    "by the way",
    "unrelated",
    "switching topics",
    "on a different note",
    "new question",
    "anyway,",
    "changing the subject",
];

static CONTINUATION_MARKERS: &[&str] =
    &["also,", "additionally", "furthermore", "building on", "following up", "as well"];

static PATH_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[\w./-]+\.\w{1,5}").unwrap());

static STOPWORDS: &[&str] = &[
    "the", "a", "an", "is", "are", "was", "were", "to", "of", "and", "or", "in", "on", "for",
    "it", "that", "this", "with", "as", "be", "by", "at",
];

fn contains_marker(text: &str, markers: &[&str]) -> bool {
    let lower = text.to_lowercase();
    markers.iter().any(|m| lower.contains(m))
}

fn extract_paths(text: &str) -> HashSet<String> {
    PATH_RE.find_iter(text).map(|m| m.as_str().to_string()).collect()
}

pub(crate) fn extract_keywords(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .map(|w| w.to_lowercase())
        .filter(|w| w.len() > 2 && !STOPWORDS.contains(&w.as_str()))
        .collect()
}

pub(crate) fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count() as f64;
    let union = a.union(b).count() as f64;
    if union == 0.0 {
        0.0
    } else {
        intersection / union
    }
}

/// Continuation score `s` per the pipeline's formula, clamped to `[0, 1]`.
/// Higher means "more likely a continuation"; the caller thresholds at 0.5.
pub fn continuation_score(
    prev_text: &str,
    next_text: &str,
    prev_time: DateTime<Utc>,
    next_time: DateTime<Utc>,
    config: &IngestionConfig,
) -> f64 {
    let shift = if contains_marker(next_text, TOPIC_SHIFT_MARKERS) { 1.0 } else { 0.0 };
    let cont = if contains_marker(next_text, CONTINUATION_MARKERS) { 1.0 } else { 0.0 };

    let path_overlap = jaccard(&extract_paths(prev_text), &extract_paths(next_text));
    let kw_overlap = jaccard(&extract_keywords(prev_text), &extract_keywords(next_text));

    let gap_minutes = (next_time - prev_time).num_seconds() as f64 / 60.0;
    let gap_penalty = if gap_minutes > config.long_gap_minutes as f64 {
        0.25
    } else if gap_minutes > config.short_gap_minutes as f64 {
        0.1
    } else {
        0.0
    };

    let s = 0.5 - 0.4 * shift + 0.3 * cont + 0.2 * path_overlap + 0.15 * kw_overlap - gap_penalty;
    s.clamp(0.0, 1.0)
}

pub fn classify(score: f64) -> EdgeType {
    if score >= 0.5 {
        EdgeType::Continuation
    } else {
        EdgeType::TopicShift
    }
}

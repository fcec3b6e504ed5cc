use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum EdgeDirection {
    #[default]
    Forward,
    Backward,
}

impl EdgeDirection {
    pub fn reverse(self) -> Self {
        match self {
            Self::Forward => Self::Backward,
            Self::Backward => Self::Forward,
        }
    }
}

impl std::fmt::Display for EdgeDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Forward => write!(f, "forward"),
            Self::Backward => write!(f, "backward"),
        }
    }
}

impl std::str::FromStr for EdgeDirection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "forward" => Ok(Self::Forward),
            "backward" => Ok(Self::Backward),
            other => Err(format!("unknown edge direction: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EdgeType {
    Continuation,
    TopicShift,
    CrossSession,
    CodeReference,
    Adjacency,
}

impl EdgeType {
    /// `TYPE_WEIGHTS` from the edge model: illustrative defaults, overridable
    /// by configuration.
    pub fn default_weight(self) -> f64 {
        match self {
            Self::Continuation => 1.0,
            Self::Adjacency => 0.9,
            Self::TopicShift => 0.5,
            Self::CrossSession => 0.4,
            Self::CodeReference => 0.7,
        }
    }
}

impl std::fmt::Display for EdgeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Continuation => write!(f, "continuation"),
            Self::TopicShift => write!(f, "topic_shift"),
            Self::CrossSession => write!(f, "cross_session"),
            Self::CodeReference => write!(f, "code_reference"),
            Self::Adjacency => write!(f, "adjacency"),
        }
    }
}

impl std::str::FromStr for EdgeType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "continuation" => Ok(Self::Continuation),
            "topic_shift" => Ok(Self::TopicShift),
            "cross_session" => Ok(Self::CrossSession),
            "code_reference" => Ok(Self::CodeReference),
            "adjacency" => Ok(Self::Adjacency),
            other => Err(format!("unknown edge type: {other}")),
        }
    }
}

/// Directed, typed, weighted relationship between two chunks. Always stored
/// as a symmetric forward/backward pair (see `EdgeStore::insert_pair`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edge {
    pub source_chunk_id: String,
    pub target_chunk_id: String,
    pub direction: EdgeDirection,
    pub edge_type: EdgeType,
    pub base_weight: f64,
    pub created_at: DateTime<Utc>,
    pub vector_clock_delta: Option<i64>,
}

impl Edge {
    pub fn new_pair(
        source_chunk_id: String,
        target_chunk_id: String,
        edge_type: EdgeType,
        vector_clock_delta: Option<i64>,
    ) -> (Edge, Edge) {
        let created_at = Utc::now();
        let base_weight = edge_type.default_weight();
        let forward = Edge {
            source_chunk_id: source_chunk_id.clone(),
            target_chunk_id: target_chunk_id.clone(),
            direction: EdgeDirection::Forward,
            edge_type,
            base_weight,
            created_at,
            vector_clock_delta,
        };
        let backward = Edge {
            source_chunk_id: target_chunk_id,
            target_chunk_id: source_chunk_id,
            direction: EdgeDirection::Backward,
            edge_type,
            base_weight,
            created_at,
            vector_clock_delta: vector_clock_delta.map(|d| -d),
        };
        (forward, backward)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_pair_is_symmetric() {
        let (fwd, bwd) = Edge::new_pair(
            "a".into(),
            "b".into(),
            EdgeType::Continuation,
            Some(1),
        );
        assert_eq!(fwd.source_chunk_id, bwd.target_chunk_id);
        assert_eq!(fwd.target_chunk_id, bwd.source_chunk_id);
        assert_eq!(fwd.base_weight, bwd.base_weight);
        assert_eq!(fwd.created_at, bwd.created_at);
        assert_eq!(fwd.direction, EdgeDirection::Forward);
        assert_eq!(bwd.direction, EdgeDirection::Backward);
    }

    #[test]
    fn default_weights_match_spec_table() {
        assert_eq!(EdgeType::Continuation.default_weight(), 1.0);
        assert_eq!(EdgeType::Adjacency.default_weight(), 0.9);
        assert_eq!(EdgeType::TopicShift.default_weight(), 0.5);
        assert_eq!(EdgeType::CrossSession.default_weight(), 0.4);
        assert_eq!(EdgeType::CodeReference.default_weight(), 0.7);
    }

    #[test]
    fn direction_reverse_is_involutive() {
        assert_eq!(EdgeDirection::Forward.reverse(), EdgeDirection::Backward);
        assert_eq!(EdgeDirection::Backward.reverse().reverse(), EdgeDirection::Backward);
    }
}

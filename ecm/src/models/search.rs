use serde::{Deserialize, Serialize};

use super::Chunk;

/// One line of `ecm search` output, carrying provenance so a caller can
/// distinguish a seed (direct vector/keyword hit) from a chunk only reached
/// through graph expansion, and whether the whole result set is degraded
/// (propagation policy, spec §7: retrieval never throws to the end user).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub chunk: Chunk,
    pub score: f32,
    pub is_seed: bool,
    pub degraded: bool,
}

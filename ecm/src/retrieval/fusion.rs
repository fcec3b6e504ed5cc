//! Reciprocal-rank fusion: combines several ranked id lists into one score
//! map using only rank position, not the underlying similarity scores.

use std::collections::HashMap;

/// `s_f(id) = Σ 1/(rank_in_list + c)` over every list the id appears in.
/// Rank is 1-based. `c` is the RRF constant (commonly 60).
pub fn reciprocal_rank_fusion(lists: &[Vec<String>], c: f64) -> HashMap<String, f64> {
    let mut scores: HashMap<String, f64> = HashMap::new();
    for list in lists {
        for (idx, id) in list.iter().enumerate() {
            let rank = (idx + 1) as f64;
            *scores.entry(id.clone()).or_insert(0.0) += 1.0 / (rank + c);
        }
    }
    scores
}

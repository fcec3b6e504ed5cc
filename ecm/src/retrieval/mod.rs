mod engine;
mod fusion;

pub use engine::search;
pub use fusion::reciprocal_rank_fusion;

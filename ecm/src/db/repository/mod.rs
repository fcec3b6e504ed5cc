mod checkpoints;
mod chunks;
mod clusters;
mod edges;

pub use checkpoints::CheckpointRepository;
pub use chunks::ChunkRepository;
pub use clusters::ClusterRepository;
pub use edges::EdgeRepository;

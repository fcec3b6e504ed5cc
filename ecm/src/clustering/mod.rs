//! HDBSCAN-based clustering core: core distances over a configurable
//! metric, a mutual-reachability MST via Prim's algorithm, a single-linkage
//! hierarchy, condensation against `min_cluster_size`, and Eom-style
//! stability selection.

mod condense;
mod core_distance;
mod distance;
mod hdbscan;
mod hierarchy;
mod mst;
mod selection;

pub use hdbscan::{cluster, HdbscanInput, HdbscanResult};

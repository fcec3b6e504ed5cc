mod tasks;

pub use tasks::{cleanup_vectors, scan_projects, update_clusters, vacuum, TaskResult};

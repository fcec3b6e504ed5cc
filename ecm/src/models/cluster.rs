use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A topic bucket over chunks, produced wholesale by a reclustering run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cluster {
    pub id: String,
    pub label: Option<String>,
    pub centroid: Vec<f32>,
    pub size: i64,
    pub lambda_birth: f64,
    pub lambda_death: f64,
    pub updated_at: DateTime<Utc>,
}

impl Cluster {
    pub fn new(id: String, centroid: Vec<f32>, size: i64, lambda_birth: f64, lambda_death: f64) -> Self {
        Self {
            id,
            label: None,
            centroid,
            size,
            lambda_birth,
            lambda_death,
            updated_at: Utc::now(),
        }
    }

    /// Stability as defined by the condensed-hierarchy selection step: sum
    /// over members of `(lambda_member - lambda_birth)`. Here approximated
    /// from the cluster's own birth/death range and size, since individual
    /// member lambdas are folded in by the caller during condensation.
    pub fn stability(&self) -> f64 {
        (self.lambda_death - self.lambda_birth).max(0.0) * self.size as f64
    }
}

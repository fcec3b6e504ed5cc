//! Ties the clustering core together: core distances, mutual-reachability
//! MST, single-linkage hierarchy, condensation, and Eom-style stability
//! selection, producing domain `Cluster` rows plus a noise set.

use std::collections::HashMap;

use sha2::{Digest, Sha256};

use crate::config::Metric;
use crate::models::Cluster as ClusterRow;

use super::condense::condense;
use super::core_distance::{core_distances, mutual_reachability};
use super::distance::distance;
use super::hierarchy::build;
use super::mst::prim_mst;
use super::selection::select_clusters;

pub struct HdbscanInput {
    pub chunk_id: String,
    pub embedding: Vec<f32>,
}

pub struct HdbscanResult {
    pub clusters: Vec<ClusterRow>,
    /// chunk_id -> assigned cluster id, absent entries are noise.
    pub assignments: HashMap<String, String>,
}

/// Runs the full clustering pipeline over `points`. Ties are broken by
/// ascending chunk id: points are sorted before indices are assigned, so
/// Prim's algorithm (which always starts at index 0) and every downstream
/// tie-break are deterministic for a fixed input set.
pub fn cluster(mut points: Vec<HdbscanInput>, min_cluster_size: usize, metric: Metric) -> HdbscanResult {
    points.sort_by(|a, b| a.chunk_id.cmp(&b.chunk_id));
    let n = points.len();

    if n == 0 {
        return HdbscanResult { clusters: Vec::new(), assignments: HashMap::new() };
    }

    let embeddings: Vec<Vec<f32>> = points.iter().map(|p| p.embedding.clone()).collect();
    let core = core_distances(&embeddings, min_cluster_size, metric);

    let mst_edges = prim_mst(n, |i, j| {
        mutual_reachability(core[i], core[j], distance(metric, &embeddings[i], &embeddings[j]))
    });

    let dendro = build(n, mst_edges);
    let tree = condense(&dendro, min_cluster_size);

    let selected_ids = match tree.root_id {
        Some(root) => select_clusters(&tree.clusters, root),
        None => Vec::new(),
    };

    let by_id: HashMap<usize, &super::condense::CondensedCluster> =
        tree.clusters.iter().map(|c| (c.id, c)).collect();

    let mut clusters = Vec::new();
    let mut assignments = HashMap::new();

    for cluster_id in selected_ids {
        let candidate = by_id[&cluster_id];
        let mut member_indices = candidate.final_members.clone();
        member_indices.sort();

        let dims = embeddings[0].len();
        let mut centroid = vec![0.0f32; dims];
        for &idx in &member_indices {
            for d in 0..dims {
                centroid[d] += embeddings[idx][d];
            }
        }
        let norm = (member_indices.len() as f32).max(1.0);
        for v in centroid.iter_mut() {
            *v /= norm;
        }
        let centroid_norm: f32 = centroid.iter().map(|v| v * v).sum::<f32>().sqrt();
        if centroid_norm > 0.0 {
            for v in centroid.iter_mut() {
                *v /= centroid_norm;
            }
        }

        let row_id = cluster_id_for(&member_indices, &points);
        let row = ClusterRow::new(
            row_id.clone(),
            centroid,
            member_indices.len() as i64,
            candidate.lambda_birth,
            candidate.lambda_death,
        );
        clusters.push(row);

        for idx in member_indices {
            assignments.insert(points[idx].chunk_id.clone(), row_id.clone());
        }
    }

    HdbscanResult { clusters, assignments }
}

/// A reclustering run is a full replacement of the cluster set (design note:
/// "cluster results as a value"), so cluster ids are derived from member
/// chunk ids rather than minted fresh each run — identical membership across
/// two runs yields the identical id.
fn cluster_id_for(member_indices: &[usize], points: &[HdbscanInput]) -> String {
    let mut hasher = Sha256::new();
    for &idx in member_indices {
        hasher.update(points[idx].chunk_id.as_bytes());
        hasher.update(b"\0");
    }
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(id: &str, v: Vec<f32>) -> HdbscanInput {
        HdbscanInput { chunk_id: id.to_string(), embedding: v }
    }

    #[test]
    fn tight_group_of_five_becomes_one_cluster_or_all_noise() {
        // Scenario S4: 5 random 10-D unit vectors, min_cluster_size = 4.
        let points = vec![
            point("a", vec![1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0]),
            point("b", vec![0.9, 0.1, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0]),
            point("c", vec![0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0]),
            point("d", vec![0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0]),
            point("e", vec![0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0]),
        ];
        let result = cluster(points, 4, Metric::Angular);
        // Never two clusters.
        assert!(result.clusters.len() <= 1);
        if result.clusters.len() == 1 {
            assert_eq!(result.clusters[0].size, 5);
        } else {
            assert!(result.assignments.is_empty());
        }
    }

    #[test]
    fn disjointness_holds_cluster_sizes_plus_noise_equals_n() {
        let points: Vec<HdbscanInput> = (0..9)
            .map(|i| {
                let mut v = vec![0.0f32; 4];
                v[i % 4] = 1.0;
                point(&format!("c{i}"), v)
            })
            .collect();
        let n = points.len();
        let result = cluster(points, 3, Metric::Angular);

        let mut seen = std::collections::HashSet::new();
        for id in result.assignments.values() {
            seen.insert(id.clone());
        }
        // every selected cluster's members are disjoint: size of unique chunk_ids
        // assigned equals sum of cluster sizes
        let total_assigned: i64 = result.clusters.iter().map(|c| c.size).sum();
        assert_eq!(total_assigned as usize, result.assignments.len());
        let noise_count = n - result.assignments.len();
        assert_eq!(total_assigned as usize + noise_count, n);
    }

    #[test]
    fn empty_input_yields_no_clusters() {
        let result = cluster(Vec::new(), 4, Metric::Angular);
        assert!(result.clusters.is_empty());
        assert!(result.assignments.is_empty());
    }

    #[test]
    fn centroids_are_unit_normalised() {
        let points = vec![
            point("a", vec![1.0, 0.0]),
            point("b", vec![0.9, 0.1]),
            point("c", vec![0.95, 0.05]),
        ];
        let result = cluster(points, 2, Metric::Angular);
        for c in &result.clusters {
            let norm: f32 = c.centroid.iter().map(|v| v * v).sum::<f32>().sqrt();
            assert!((norm - 1.0).abs() < 1e-4);
        }
    }
}

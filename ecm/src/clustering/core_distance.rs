use crate::config::Metric;

use super::distance::distance;

/// `core_k(p)`: distance from `p` to its `k`-th nearest neighbour (itself
/// excluded). `k` is `min_cluster_size`. Returns one core distance per input
/// point, same order as `points`.
///
/// O(N^2 log N); acceptable at the chunk counts this engine targets (the
/// component budget assumes clustering runs on tens of thousands of points,
/// not the embedding-index scale of a dedicated ANN library).
pub fn core_distances(points: &[Vec<f32>], k: usize, metric: Metric) -> Vec<f64> {
    let n = points.len();
    let k = k.min(n.saturating_sub(1)).max(1);
    (0..n)
        .map(|i| {
            let mut dists: Vec<f64> = (0..n)
                .filter(|&j| j != i)
                .map(|j| distance(metric, &points[i], &points[j]))
                .collect();
            dists.sort_by(|a, b| a.partial_cmp(b).unwrap());
            dists[k - 1]
        })
        .collect()
}

/// `MRD(a,b) = max(core(a), core(b), d(a,b))`.
pub fn mutual_reachability(core_a: f64, core_b: f64, d_ab: f64) -> f64 {
    core_a.max(core_b).max(d_ab)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn core_distance_is_distance_to_kth_neighbour() {
        let points = vec![vec![0.0f32], vec![1.0], vec![2.0], vec![10.0]];
        let core = core_distances(&points, 2, Metric::Euclidean);
        // For point 0 (value 0.0), neighbours sorted by distance: 1.0, 2.0, 10.0
        // 2nd nearest is at distance 2.0.
        assert!((core[0] - 2.0).abs() < 1e-9);
    }

    #[test]
    fn mutual_reachability_is_the_max_of_three() {
        assert_eq!(mutual_reachability(1.0, 2.0, 0.5), 2.0);
        assert_eq!(mutual_reachability(0.1, 0.2, 5.0), 5.0);
    }
}

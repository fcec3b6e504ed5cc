//! Condensed hierarchy: prunes the single-linkage dendrogram so only
//! subtrees that stay at or above `min_cluster_size` persist as candidate
//! clusters, each carrying the stability HDBSCAN's Eom selection needs.

use std::collections::HashSet;

use super::hierarchy::Dendrogram;

#[derive(Debug, Clone)]
pub struct CondensedCluster {
    pub id: usize,
    pub lambda_birth: f64,
    pub lambda_death: f64,
    /// Leaves still part of this candidate at the moment it either splits
    /// into two children or dissolves entirely.
    pub final_members: Vec<usize>,
    pub stability: f64,
    pub children: Vec<usize>,
}

pub struct CondensedTree {
    pub clusters: Vec<CondensedCluster>,
    pub root_id: Option<usize>,
    pub noise: HashSet<usize>,
}

fn lambda_of(weight: f64) -> f64 {
    if weight <= 0.0 {
        f64::INFINITY
    } else {
        1.0 / weight
    }
}

/// Walks down from `node` carrying a single live candidate (born at
/// `lambda_birth`), shedding any subtree that falls below `min_size` as
/// noise, until the candidate either splits into two persisting children or
/// dissolves. Returns the finished `CondensedCluster` and appends any child
/// clusters (and their descendants) it spawned.
fn walk(
    dendro: &Dendrogram,
    start: usize,
    lambda_birth: f64,
    min_size: usize,
    out: &mut Vec<CondensedCluster>,
    noise: &mut HashSet<usize>,
) -> CondensedCluster {
    let mut node = start;
    // (leaf, lambda at which it departed this candidate) across its whole lifetime
    let mut departures: Vec<(usize, f64)> = Vec::new();

    loop {
        if node < dendro.n_leaves {
            let lambda_death = lambda_birth;
            departures.push((node, lambda_death));
            let stability = departures.iter().map(|(_, l)| (l - lambda_birth).max(0.0)).sum();
            return CondensedCluster {
                id: node,
                lambda_birth,
                lambda_death,
                final_members: vec![node],
                stability,
                children: Vec::new(),
            };
        }

        let m = dendro.merges[node - dendro.n_leaves];
        let lambda_split = lambda_of(m.weight);
        let left_ok = dendro.size_of(m.left) >= min_size;
        let right_ok = dendro.size_of(m.right) >= min_size;

        match (left_ok, right_ok) {
            (true, true) => {
                let final_members = dendro.collect_leaves(node);
                for leaf in &final_members {
                    departures.push((*leaf, lambda_split));
                }
                let stability = departures.iter().map(|(_, l)| (l - lambda_birth).max(0.0)).sum();

                let left = walk(dendro, m.left, lambda_split, min_size, out, noise);
                let right = walk(dendro, m.right, lambda_split, min_size, out, noise);
                let children = vec![left.id, right.id];
                out.push(left);
                out.push(right);

                return CondensedCluster {
                    id: node,
                    lambda_birth,
                    lambda_death: lambda_split,
                    final_members,
                    stability,
                    children,
                };
            }
            (true, false) => {
                for leaf in dendro.collect_leaves(m.right) {
                    noise.insert(leaf);
                    departures.push((leaf, lambda_split));
                }
                node = m.left;
            }
            (false, true) => {
                for leaf in dendro.collect_leaves(m.left) {
                    noise.insert(leaf);
                    departures.push((leaf, lambda_split));
                }
                node = m.right;
            }
            (false, false) => {
                let final_members = dendro.collect_leaves(node);
                for leaf in &final_members {
                    departures.push((*leaf, lambda_split));
                }
                let stability = departures.iter().map(|(_, l)| (l - lambda_birth).max(0.0)).sum();
                return CondensedCluster {
                    id: node,
                    lambda_birth,
                    lambda_death: lambda_split,
                    final_members,
                    stability,
                    children: Vec::new(),
                };
            }
        }
    }
}

pub fn condense(dendro: &Dendrogram, min_size: usize) -> CondensedTree {
    let mut clusters = Vec::new();
    let mut noise = HashSet::new();

    let root_id = match dendro.root() {
        None => {
            if dendro.n_leaves == 1 && min_size <= 1 {
                clusters.push(CondensedCluster {
                    id: 0,
                    lambda_birth: 0.0,
                    lambda_death: 0.0,
                    final_members: vec![0],
                    stability: 0.0,
                    children: Vec::new(),
                });
                Some(0)
            } else {
                if dendro.n_leaves == 1 {
                    noise.insert(0);
                }
                None
            }
        }
        Some(root) => {
            if dendro.size_of(root) >= min_size {
                let top = walk(dendro, root, 0.0, min_size, &mut clusters, &mut noise);
                let id = top.id;
                clusters.push(top);
                Some(id)
            } else {
                noise.extend(dendro.collect_leaves(root));
                None
            }
        }
    };

    CondensedTree { clusters, root_id, noise }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clustering::hierarchy::build;
    use crate::clustering::mst::MstEdge;

    #[test]
    fn all_points_noise_when_root_too_small() {
        let edges = vec![
            MstEdge { a: 0, b: 1, weight: 1.0 },
            MstEdge { a: 1, b: 2, weight: 2.0 },
        ];
        let d = build(3, edges);
        let tree = condense(&d, 4);
        assert!(tree.root_id.is_none());
        assert_eq!(tree.noise.len(), 3);
    }

    #[test]
    fn single_cluster_when_all_points_merge_tightly() {
        // 5 points all within distance 1 of each other, min_size 4
        let edges = vec![
            MstEdge { a: 0, b: 1, weight: 0.1 },
            MstEdge { a: 1, b: 2, weight: 0.1 },
            MstEdge { a: 2, b: 3, weight: 0.1 },
            MstEdge { a: 3, b: 4, weight: 0.1 },
        ];
        let d = build(5, edges);
        let tree = condense(&d, 4);
        assert!(tree.root_id.is_some());
        let root = tree.clusters.iter().find(|c| Some(c.id) == tree.root_id).unwrap();
        assert_eq!(root.final_members.len(), 5);
        assert!(tree.noise.is_empty());
    }

    #[test]
    fn stability_is_nonnegative_for_every_candidate() {
        let edges = vec![
            MstEdge { a: 0, b: 1, weight: 0.1 },
            MstEdge { a: 2, b: 3, weight: 0.1 },
            MstEdge { a: 4, b: 5, weight: 0.1 },
            MstEdge { a: 1, b: 2, weight: 0.5 },
            MstEdge { a: 3, b: 4, weight: 2.0 },
        ];
        let d = build(6, edges);
        let tree = condense(&d, 2);
        for c in &tree.clusters {
            assert!(c.stability >= 0.0);
        }
    }
}

//! Eom-style stability selection over the condensed hierarchy: for each
//! candidate, compare its own stability against the summed stability of its
//! selected descendants, keeping whichever is larger. Selected clusters
//! always form an antichain.

use std::collections::HashMap;

use super::condense::CondensedCluster;

pub fn select_clusters(clusters: &[CondensedCluster], root_id: usize) -> Vec<usize> {
    let by_id: HashMap<usize, &CondensedCluster> = clusters.iter().map(|c| (c.id, c)).collect();
    let (_, selected) = visit(root_id, &by_id);
    selected
}

fn visit(node_id: usize, by_id: &HashMap<usize, &CondensedCluster>) -> (f64, Vec<usize>) {
    let node = by_id[&node_id];
    if node.children.is_empty() {
        return (node.stability, vec![node_id]);
    }

    let mut child_total = 0.0;
    let mut child_selected = Vec::new();
    for &child_id in &node.children {
        let (s, sel) = visit(child_id, by_id);
        child_total += s;
        child_selected.extend(sel);
    }

    if node.stability >= child_total {
        (node.stability, vec![node_id])
    } else {
        (child_total, child_selected)
    }
}

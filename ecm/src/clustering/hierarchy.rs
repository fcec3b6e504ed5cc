//! Single-linkage hierarchy over an ascending-sorted MST, built via
//! union-find. Leaves are raw point indices `0..n`; each merge introduces a
//! new node id `n + merge_index`.

use super::mst::MstEdge;

#[derive(Debug, Clone, Copy)]
pub struct MergeNode {
    pub left: usize,
    pub right: usize,
    pub weight: f64,
    pub size: usize,
}

pub struct Dendrogram {
    pub n_leaves: usize,
    pub merges: Vec<MergeNode>,
}

impl Dendrogram {
    pub fn size_of(&self, node: usize) -> usize {
        if node < self.n_leaves {
            1
        } else {
            self.merges[node - self.n_leaves].size
        }
    }

    /// Id of the final merge, i.e. the whole-tree root. `None` for fewer
    /// than two leaves (no merges happened).
    pub fn root(&self) -> Option<usize> {
        self.merges.last().map(|_| self.n_leaves + self.merges.len() - 1)
    }

    /// All raw leaf indices under `node`, recursively.
    pub fn collect_leaves(&self, node: usize) -> Vec<usize> {
        let mut out = Vec::with_capacity(self.size_of(node));
        self.collect_leaves_into(node, &mut out);
        out
    }

    fn collect_leaves_into(&self, node: usize, out: &mut Vec<usize>) {
        if node < self.n_leaves {
            out.push(node);
        } else {
            let m = self.merges[node - self.n_leaves];
            self.collect_leaves_into(m.left, out);
            self.collect_leaves_into(m.right, out);
        }
    }
}

struct UnionFind {
    parent: Vec<usize>,
    rank: Vec<u32>,
    /// current node id representing the cluster rooted at each union-find root
    cluster_id: Vec<usize>,
}

impl UnionFind {
    fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
            rank: vec![0; n],
            cluster_id: (0..n).collect(),
        }
    }

    fn find(&mut self, x: usize) -> usize {
        if self.parent[x] != x {
            self.parent[x] = self.find(self.parent[x]);
        }
        self.parent[x]
    }

    fn union(&mut self, a: usize, b: usize) -> usize {
        let (ra, rb) = (self.find(a), self.find(b));
        if self.rank[ra] < self.rank[rb] {
            self.parent[ra] = rb;
            rb
        } else if self.rank[ra] > self.rank[rb] {
            self.parent[rb] = ra;
            ra
        } else {
            self.parent[rb] = ra;
            self.rank[ra] += 1;
            ra
        }
    }
}

/// Builds the dendrogram by replaying ascending-sorted MST edges through
/// union-find, deterministically tie-broken by `(a, b)` ascending so equal
/// weights always merge in the same order.
pub fn build(n_leaves: usize, mut mst_edges: Vec<MstEdge>) -> Dendrogram {
    mst_edges.sort_by(|x, y| {
        x.weight
            .partial_cmp(&y.weight)
            .unwrap()
            .then((x.a.min(x.b), x.a.max(x.b)).cmp(&(y.a.min(y.b), y.a.max(y.b))))
    });

    let mut uf = UnionFind::new(n_leaves);
    let mut merges = Vec::with_capacity(n_leaves.saturating_sub(1));

    for edge in mst_edges {
        let ra = uf.find(edge.a);
        let rb = uf.find(edge.b);
        if ra == rb {
            continue;
        }
        let left = uf.cluster_id[ra];
        let right = uf.cluster_id[rb];
        let size = (if left < n_leaves { 1 } else { merges[left - n_leaves].size })
            + (if right < n_leaves { 1 } else { merges[right - n_leaves].size });
        merges.push(MergeNode { left, right, weight: edge.weight, size });
        let new_id = n_leaves + merges.len() - 1;
        let new_root = uf.union(ra, rb);
        uf.cluster_id[new_root] = new_id;
    }

    Dendrogram { n_leaves, merges }
}

//! Undirected weighted graphs and Louvain community detection.
//!
//! [`Graph`] is a simple undirected graph (no self-loops) with weighted
//! edges. [`Graph::louvain`] runs the multi-level Louvain method: local
//! moving in a seeded random node order, then aggregation of each community
//! into a single node, repeated until a level moves no node.

use log::debug;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use scatac_core::{Result, ScatacError};

/// An undirected weighted graph.
#[derive(Debug, Clone)]
pub struct Graph {
    n_nodes: usize,
    edges: Vec<(usize, usize, f64)>,
    adjacency: Vec<Vec<(usize, f64)>>,
}

/// Community detection result.
#[derive(Debug, Clone)]
pub struct Community {
    /// Community id for each node, contiguous from 0 in first-appearance order.
    pub assignments: Vec<usize>,
    /// Modularity Q of the partition at the resolution used.
    pub modularity: f64,
    /// Number of aggregation levels that moved at least one node.
    pub n_levels: usize,
}

impl Graph {
    /// Create a graph with `n_nodes` nodes and no edges.
    pub fn new(n_nodes: usize) -> Self {
        Self {
            n_nodes,
            edges: Vec::new(),
            adjacency: vec![Vec::new(); n_nodes],
        }
    }

    /// Add an undirected edge.
    ///
    /// # Errors
    ///
    /// Returns an error if either endpoint is out of range, the edge is a
    /// self-loop, or the weight is not positive and finite.
    pub fn add_edge(&mut self, a: usize, b: usize, weight: f64) -> Result<()> {
        if a >= self.n_nodes || b >= self.n_nodes {
            return Err(ScatacError::InvalidInput(format!(
                "node index out of range: a={}, b={}, n_nodes={}",
                a, b, self.n_nodes
            )));
        }
        if a == b {
            return Err(ScatacError::InvalidInput(format!("self-loop on node {a}")));
        }
        if !(weight.is_finite() && weight > 0.0) {
            return Err(ScatacError::InvalidInput(format!(
                "edge weight {weight} must be positive and finite"
            )));
        }
        self.edges.push((a, b, weight));
        self.adjacency[a].push((b, weight));
        self.adjacency[b].push((a, weight));
        Ok(())
    }

    pub fn n_nodes(&self) -> usize {
        self.n_nodes
    }

    pub fn n_edges(&self) -> usize {
        self.edges.len()
    }

    /// Edges as `(a, b, weight)` in insertion order.
    pub fn edges(&self) -> &[(usize, usize, f64)] {
        &self.edges
    }

    /// Neighbors of `node` with edge weights.
    pub fn neighbors(&self, node: usize) -> &[(usize, f64)] {
        &self.adjacency[node]
    }

    /// Number of incident edges.
    pub fn degree(&self, node: usize) -> usize {
        self.adjacency[node].len()
    }

    pub fn has_edge(&self, a: usize, b: usize) -> bool {
        self.adjacency
            .get(a)
            .is_some_and(|adj| adj.iter().any(|&(j, _)| j == b))
    }

    /// Modularity of a partition with resolution `γ`:
    /// `Q = Σ_c [ L_c / m − γ (d_c / 2m)² ]`, where `L_c` is the edge weight
    /// inside community `c`, `d_c` its total strength and `m` the total edge
    /// weight. Returns 0.0 for a graph without edges.
    pub fn modularity(&self, assignments: &[usize], resolution: f64) -> f64 {
        let m: f64 = self.edges.iter().map(|(_, _, w)| w).sum();
        if m == 0.0 || assignments.len() != self.n_nodes {
            return 0.0;
        }
        let n_comm = assignments.iter().copied().max().map_or(0, |c| c + 1);
        let mut internal = vec![0.0; n_comm];
        let mut strength = vec![0.0; n_comm];
        for &(a, b, w) in &self.edges {
            strength[assignments[a]] += w;
            strength[assignments[b]] += w;
            if assignments[a] == assignments[b] {
                internal[assignments[a]] += w;
            }
        }
        internal
            .iter()
            .zip(&strength)
            .map(|(l_c, d_c)| l_c / m - resolution * (d_c / (2.0 * m)).powi(2))
            .sum()
    }

    /// Multi-level Louvain community detection.
    ///
    /// Nodes are visited in a random order drawn from `seed`. A node moves to
    /// the neighboring community with the largest modularity gain; ties keep
    /// the current community, then prefer the lowest community id. An empty
    /// graph yields an empty assignment and a graph without edges leaves
    /// every node in its own community.
    pub fn louvain(&self, resolution: f64, seed: u64) -> Community {
        let n = self.n_nodes;
        if n == 0 {
            return Community {
                assignments: Vec::new(),
                modularity: 0.0,
                n_levels: 0,
            };
        }
        if self.edges.is_empty() {
            return Community {
                assignments: (0..n).collect(),
                modularity: 0.0,
                n_levels: 0,
            };
        }

        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let mut level = LevelGraph::from_graph(self);
        let mut membership: Vec<usize> = (0..n).collect();
        let mut n_levels = 0;

        loop {
            let (mut local, moved) = level.local_moving(resolution, &mut rng);
            if !moved {
                break;
            }
            n_levels += 1;
            let n_communities = renumber_assignments(&mut local);
            for m in membership.iter_mut() {
                *m = local[*m];
            }
            debug!(
                "louvain level {}: {} nodes -> {} communities",
                n_levels,
                level.n_nodes(),
                n_communities
            );
            if n_communities == level.n_nodes() {
                break;
            }
            level = level.aggregate(&local, n_communities);
        }

        renumber_assignments(&mut membership);
        let modularity = self.modularity(&membership, resolution);
        Community {
            assignments: membership,
            modularity,
            n_levels,
        }
    }
}

// ── Aggregation levels ─────────────────────────────────────────────────────

/// Weighted graph for one Louvain level. Edge weight internal to an
/// aggregated community is not kept as an edge; it only stays in the
/// node's strength, since it moves with the node and never changes a gain.
struct LevelGraph {
    adjacency: Vec<Vec<(usize, f64)>>,
    /// Node strength `k_i`, internal weight counted twice.
    strength: Vec<f64>,
    /// Twice the total edge weight.
    m2: f64,
}

impl LevelGraph {
    fn from_graph(graph: &Graph) -> Self {
        let strength: Vec<f64> = graph
            .adjacency
            .iter()
            .map(|adj| adj.iter().map(|(_, w)| w).sum())
            .collect();
        let m2 = strength.iter().sum();
        Self {
            adjacency: graph.adjacency.clone(),
            strength,
            m2,
        }
    }

    fn n_nodes(&self) -> usize {
        self.adjacency.len()
    }

    /// One round of local moving until no node changes community. Returns
    /// the community of each node and whether anything moved.
    fn local_moving(&self, resolution: f64, rng: &mut ChaCha8Rng) -> (Vec<usize>, bool) {
        let n = self.n_nodes();
        let mut community: Vec<usize> = (0..n).collect();
        let mut total: Vec<f64> = self.strength.clone();
        let mut order: Vec<usize> = (0..n).collect();
        order.shuffle(rng);

        // Scratch: weight from the current node to each community
        let mut link = vec![0.0; n];
        let mut touched: Vec<usize> = Vec::new();
        let mut moved_any = false;

        loop {
            let mut moved = 0usize;
            for &i in &order {
                let ci = community[i];
                let k_i = self.strength[i];

                for &(j, w) in &self.adjacency[i] {
                    let cj = community[j];
                    if link[cj] == 0.0 {
                        touched.push(cj);
                    }
                    link[cj] += w;
                }

                total[ci] -= k_i;
                let gain = |c: usize, link_c: f64| link_c - resolution * total[c] * k_i / self.m2;

                let mut best = ci;
                let mut best_gain = gain(ci, link[ci]);
                touched.sort_unstable();
                for &c in &touched {
                    if c == ci {
                        continue;
                    }
                    let g = gain(c, link[c]);
                    if g > best_gain + 1e-12 {
                        best = c;
                        best_gain = g;
                    }
                }

                total[best] += k_i;
                if best != ci {
                    community[i] = best;
                    moved += 1;
                }
                for &c in &touched {
                    link[c] = 0.0;
                }
                touched.clear();
            }
            if moved == 0 {
                break;
            }
            moved_any = true;
        }
        (community, moved_any)
    }

    /// Collapse each community into one node.
    fn aggregate(&self, community: &[usize], n_communities: usize) -> Self {
        let mut merged: Vec<std::collections::BTreeMap<usize, f64>> =
            vec![std::collections::BTreeMap::new(); n_communities];
        for (i, adj) in self.adjacency.iter().enumerate() {
            let ci = community[i];
            for &(j, w) in adj {
                let cj = community[j];
                if ci != cj {
                    *merged[ci].entry(cj).or_insert(0.0) += w;
                }
            }
        }
        let mut strength = vec![0.0; n_communities];
        for (i, &k) in self.strength.iter().enumerate() {
            strength[community[i]] += k;
        }
        Self {
            adjacency: merged.into_iter().map(|m| m.into_iter().collect()).collect(),
            strength,
            m2: self.m2,
        }
    }
}

/// Renumber ids to be contiguous from 0 in first-appearance order; returns
/// the number of distinct ids.
pub(crate) fn renumber_assignments(assignments: &mut [usize]) -> usize {
    let mut map = std::collections::HashMap::new();
    for a in assignments.iter_mut() {
        let next = map.len();
        *a = *map.entry(*a).or_insert(next);
    }
    map.len()
}

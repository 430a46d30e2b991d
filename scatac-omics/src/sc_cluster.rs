//! Single-cell clustering: kNN graph construction, Louvain, NMI, ARI.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Instant;

use log::{debug, info};
use scatac_core::{Result, ScatacError, Summarizable};
use scatac_ml::distance::nearest_rows;
use serde::{Deserialize, Serialize};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::network::Graph;
use crate::sc_reduce::LatentEmbedding;

// ── Neighbors ──────────────────────────────────────────────────────────────

/// Configuration for kNN graph construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NeighborsConfig {
    /// Number of nearest neighbors per cell; clamped to `n_cells - 1`.
    pub k: usize,
}

impl Default for NeighborsConfig {
    fn default() -> Self {
        Self { k: 30 }
    }
}

/// Unweighted, symmetrized kNN graph over cells.
#[derive(Debug, Clone)]
pub struct NeighborGraph {
    pub graph: Graph,
    pub cell_ids: Vec<String>,
    /// Neighbors per cell actually used, after clamping.
    pub k: usize,
}

impl Summarizable for NeighborGraph {
    fn summary(&self) -> String {
        format!(
            "NeighborGraph: {} cells, {} edges, k={}",
            self.graph.n_nodes(),
            self.graph.n_edges(),
            self.k
        )
    }
}

/// Build a kNN graph from latent coordinates.
///
/// Each cell is linked to its `k` nearest other cells by Euclidean distance
/// (equal distances go to the lower index). An edge exists when either
/// endpoint lists the other, so the graph is symmetric, with unit weights
/// and no self-loops.
pub fn build_neighbor_graph(emb: &LatentEmbedding, config: &NeighborsConfig) -> Result<NeighborGraph> {
    let n = emb.n_cells();
    let d = emb.n_dims();
    if n == 0 || d == 0 {
        return Err(ScatacError::InvalidInput(format!(
            "cannot build a neighbor graph from a {n} x {d} embedding"
        )));
    }
    if config.k == 0 {
        return Err(ScatacError::InvalidInput("k must be > 0".into()));
    }
    let data = emb.to_flat();
    if data.iter().any(|x| !x.is_finite()) {
        return Err(ScatacError::InvalidInput(
            "embedding contains non-finite values".into(),
        ));
    }
    let k = config.k.min(n - 1);
    let start = Instant::now();

    let query = |i: usize| -> Vec<usize> {
        let row = &data[i * d..(i + 1) * d];
        nearest_rows(&data, d, row, k, Some(i))
            .into_iter()
            .map(|(j, _)| j)
            .collect()
    };

    #[cfg(feature = "parallel")]
    let lists: Vec<Vec<usize>> = (0..n).into_par_iter().map(query).collect();
    #[cfg(not(feature = "parallel"))]
    let lists: Vec<Vec<usize>> = (0..n).map(query).collect();

    let mut pairs = BTreeSet::new();
    for (i, list) in lists.iter().enumerate() {
        for &j in list {
            pairs.insert((i.min(j), i.max(j)));
        }
    }
    let mut graph = Graph::new(n);
    for (a, b) in pairs {
        graph.add_edge(a, b, 1.0)?;
    }

    info!(
        "neighbors: {} cells, k={}, {} edges in {:.2?}",
        n,
        k,
        graph.n_edges(),
        start.elapsed()
    );
    Ok(NeighborGraph {
        graph,
        cell_ids: emb.cell_ids().to_vec(),
        k,
    })
}

// ── Clustering ─────────────────────────────────────────────────────────────

/// Configuration for Louvain clustering.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    /// Resolution `γ`: higher values give more, smaller clusters.
    pub resolution: f64,
    /// Seed for the node visiting order.
    pub seed: u64,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            resolution: 1.0,
            seed: 42,
        }
    }
}

/// One cluster id per cell.
#[derive(Debug, Clone, Serialize)]
pub struct ClusterAssignment {
    pub cell_ids: Vec<String>,
    /// Contiguous from 0 in order of first appearance.
    pub ids: Vec<usize>,
    pub modularity: f64,
}

impl ClusterAssignment {
    pub fn n_clusters(&self) -> usize {
        self.ids.iter().copied().max().map_or(0, |m| m + 1)
    }

    /// Number of cells in each cluster.
    pub fn sizes(&self) -> Vec<usize> {
        let mut sizes = vec![0; self.n_clusters()];
        for &c in &self.ids {
            sizes[c] += 1;
        }
        sizes
    }
}

impl Summarizable for ClusterAssignment {
    fn summary(&self) -> String {
        format!(
            "ClusterAssignment: {} cells in {} clusters, modularity {:.4}",
            self.ids.len(),
            self.n_clusters(),
            self.modularity
        )
    }
}

/// Partition the neighbor graph with multi-level Louvain.
pub fn cluster(graph: &NeighborGraph, config: &ClusterConfig) -> Result<ClusterAssignment> {
    if !(config.resolution.is_finite() && config.resolution > 0.0) {
        return Err(ScatacError::InvalidInput(format!(
            "resolution {} must be positive and finite",
            config.resolution
        )));
    }
    if graph.cell_ids.len() != graph.graph.n_nodes() {
        return Err(ScatacError::InvalidInput(format!(
            "{} cell ids for {} graph nodes",
            graph.cell_ids.len(),
            graph.graph.n_nodes()
        )));
    }
    let start = Instant::now();
    let community = graph.graph.louvain(config.resolution, config.seed);
    let assignment = ClusterAssignment {
        cell_ids: graph.cell_ids.clone(),
        ids: community.assignments,
        modularity: community.modularity,
    };
    debug!("louvain: {} levels", community.n_levels);
    info!("{} in {:.2?}", assignment.summary(), start.elapsed());
    Ok(assignment)
}

// ── Clustering Metrics ─────────────────────────────────────────────────────

/// Contingency table of two partitions with its marginals.
fn contingency(a: &[usize], b: &[usize]) -> (Vec<Vec<usize>>, Vec<usize>, Vec<usize>) {
    let n_a = a.iter().copied().max().map_or(0, |m| m + 1);
    let n_b = b.iter().copied().max().map_or(0, |m| m + 1);
    let mut table = vec![vec![0usize; n_b]; n_a];
    for (&x, &y) in a.iter().zip(b) {
        table[x][y] += 1;
    }
    let row_sums = table.iter().map(|r| r.iter().sum()).collect();
    let col_sums = (0..n_b).map(|j| table.iter().map(|r| r[j]).sum()).collect();
    (table, row_sums, col_sums)
}

fn entropy(counts: &[usize], n: f64) -> f64 {
    counts
        .iter()
        .filter(|&&c| c > 0)
        .map(|&c| {
            let p = c as f64 / n;
            -p * p.ln()
        })
        .sum()
}

/// Normalized Mutual Information between two partitions.
///
/// Normalized by the arithmetic mean of the two entropies; 0.0 for empty
/// input.
pub fn nmi(a: &[usize], b: &[usize]) -> Result<f64> {
    if a.len() != b.len() {
        return Err(ScatacError::InvalidInput(
            "partitions must have the same length".into(),
        ));
    }
    let n = a.len();
    if n == 0 {
        return Ok(0.0);
    }
    let nf = n as f64;
    let (table, row_sums, col_sums) = contingency(a, b);

    let mut mi = 0.0;
    for (i, row) in table.iter().enumerate() {
        for (j, &nij) in row.iter().enumerate() {
            if nij > 0 {
                let nij = nij as f64;
                mi += nij / nf * (nf * nij / (row_sums[i] as f64 * col_sums[j] as f64)).ln();
            }
        }
    }

    let h_a = entropy(&row_sums, nf);
    let h_b = entropy(&col_sums, nf);
    let denom = ((h_a + h_b) / 2.0).max(1e-15);
    Ok((mi / denom).clamp(0.0, 1.0))
}

/// Adjusted Rand Index between two partitions.
///
/// Returns 0.0 for fewer than two elements or when the index is undefined.
pub fn adjusted_rand_index(a: &[usize], b: &[usize]) -> Result<f64> {
    if a.len() != b.len() {
        return Err(ScatacError::InvalidInput(
            "partitions must have the same length".into(),
        ));
    }
    let n = a.len();
    if n < 2 {
        return Ok(0.0);
    }
    let (table, row_sums, col_sums) = contingency(a, b);

    // C(n,2)
    let c2 = |x: usize| -> f64 { (x as f64) * (x as f64 - 1.0) / 2.0 };

    let sum_comb_c: f64 = table.iter().flatten().map(|&x| c2(x)).sum();
    let sum_comb_a: f64 = row_sums.iter().map(|&x| c2(x)).sum();
    let sum_comb_b: f64 = col_sums.iter().map(|&x| c2(x)).sum();

    let expected = sum_comb_a * sum_comb_b / c2(n);
    let max_index = (sum_comb_a + sum_comb_b) / 2.0;
    let denom = max_index - expected;
    if denom.abs() < 1e-15 {
        return Ok(0.0);
    }
    Ok((sum_comb_c - expected) / denom)
}

// ── Composition ────────────────────────────────────────────────────────────

/// Cell-type make-up of each cluster, with agreement scores against the
/// ground-truth labels.
#[derive(Debug, Clone, Serialize)]
pub struct ClusterComposition {
    /// Distinct labels, sorted.
    pub cell_types: Vec<String>,
    /// `counts[cluster][type]`.
    pub counts: Vec<Vec<usize>>,
    pub nmi: f64,
    pub ari: f64,
}

impl ClusterComposition {
    /// Cross-tabulate cluster ids against labels, cell by cell.
    pub fn new(clusters: &[usize], labels: &[String]) -> Result<Self> {
        if clusters.len() != labels.len() {
            return Err(ScatacError::InvalidInput(format!(
                "{} cluster ids for {} labels",
                clusters.len(),
                labels.len()
            )));
        }
        let index: BTreeMap<&str, usize> = labels
            .iter()
            .map(String::as_str)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .enumerate()
            .map(|(i, l)| (l, i))
            .collect();
        let label_ids: Vec<usize> = labels.iter().map(|l| index[l.as_str()]).collect();

        let n_clusters = clusters.iter().copied().max().map_or(0, |m| m + 1);
        let mut counts = vec![vec![0usize; index.len()]; n_clusters];
        for (&c, &t) in clusters.iter().zip(&label_ids) {
            counts[c][t] += 1;
        }

        Ok(Self {
            cell_types: index.keys().map(|l| l.to_string()).collect(),
            counts,
            nmi: nmi(clusters, &label_ids)?,
            ari: adjusted_rand_index(clusters, &label_ids)?,
        })
    }

    /// Most frequent label of `cluster`; ties go to the label sorting first.
    pub fn dominant(&self, cluster: usize) -> Option<&str> {
        let row = self.counts.get(cluster)?;
        let mut best: Option<(usize, usize)> = None;
        for (t, &n) in row.iter().enumerate() {
            if n > 0 && best.map_or(true, |(_, b)| n > b) {
                best = Some((t, n));
            }
        }
        best.map(|(t, _)| self.cell_types[t].as_str())
    }
}

impl Summarizable for ClusterComposition {
    fn summary(&self) -> String {
        format!(
            "ClusterComposition: {} clusters \u{00d7} {} cell types, NMI {:.4}, ARI {:.4}",
            self.counts.len(),
            self.cell_types.len(),
            self.nmi,
            self.ari
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    fn embedding(rows: &[[f64; 2]]) -> LatentEmbedding {
        let flat: Vec<f64> = rows.iter().flatten().copied().collect();
        let coords = Array2::from_shape_vec((rows.len(), 2), flat).unwrap();
        let ids = (0..rows.len()).map(|i| format!("cell{i}")).collect();
        LatentEmbedding::new(ids, coords, vec![1.0, 1.0]).unwrap()
    }

    fn two_blobs() -> LatentEmbedding {
        embedding(&[
            [0.0, 0.0],
            [0.1, 0.0],
            [0.0, 0.1],
            [0.1, 0.1],
            [10.0, 10.0],
            [10.1, 10.0],
            [10.0, 10.1],
            [10.1, 10.1],
        ])
    }

    #[test]
    fn neighbors_basic() {
        let g = build_neighbor_graph(&two_blobs(), &NeighborsConfig { k: 3 }).unwrap();
        assert_eq!(g.k, 3);
        assert_eq!(g.graph.n_nodes(), 8);
        // each blob becomes a 4-clique, nothing crosses
        assert_eq!(g.graph.n_edges(), 12);
        assert!(g.graph.has_edge(0, 3));
        assert!(!g.graph.has_edge(0, 4));
    }

    #[test]
    fn neighbors_symmetric_without_self_loops() {
        let emb = embedding(&[[0.0, 0.0], [1.0, 0.0], [3.0, 0.0], [7.0, 0.0], [7.5, 0.0]]);
        let g = build_neighbor_graph(&emb, &NeighborsConfig { k: 1 }).unwrap();
        for &(a, b, _) in g.graph.edges() {
            assert_ne!(a, b);
            assert!(g.graph.has_edge(b, a));
        }
        // 2 lists 1 as nearest, union keeps 1-2 even though 1 lists 0
        assert!(g.graph.has_edge(1, 2));
        assert!(g.graph.has_edge(0, 1));
    }

    #[test]
    fn k_is_clamped() {
        let emb = embedding(&[[0.0, 0.0], [1.0, 0.0], [2.0, 0.0]]);
        let g = build_neighbor_graph(&emb, &NeighborsConfig::default()).unwrap();
        assert_eq!(g.k, 2);
        assert_eq!(g.graph.n_edges(), 3);
    }

    #[test]
    fn equidistant_neighbors_prefer_lower_index() {
        let emb = embedding(&[[0.0, 0.0], [1.0, 0.0], [-1.0, 0.0], [0.0, 5.0]]);
        let g = build_neighbor_graph(&emb, &NeighborsConfig { k: 1 }).unwrap();
        assert!(g.graph.has_edge(0, 1));
        // cell 2's own nearest is 0, so 0-2 exists through the union
        assert!(g.graph.has_edge(0, 2));
        assert!(!g.graph.has_edge(1, 2));
    }

    #[test]
    fn zero_k_rejected() {
        assert!(build_neighbor_graph(&two_blobs(), &NeighborsConfig { k: 0 }).is_err());
    }

    #[test]
    fn louvain_two_blobs() {
        let g = build_neighbor_graph(&two_blobs(), &NeighborsConfig { k: 3 }).unwrap();
        let clusters = cluster(&g, &ClusterConfig::default()).unwrap();
        assert_eq!(clusters.n_clusters(), 2);
        assert_eq!(clusters.sizes(), vec![4, 4]);
        assert_eq!(clusters.ids[0], 0);
        assert!(clusters.ids[..4].iter().all(|&c| c == clusters.ids[0]));
        assert!(clusters.ids[4..].iter().all(|&c| c == clusters.ids[4]));
        assert!(clusters.modularity > 0.4);
    }

    #[test]
    fn single_cell_is_own_cluster() {
        let g = build_neighbor_graph(&embedding(&[[1.0, 2.0]]), &NeighborsConfig::default()).unwrap();
        assert_eq!(g.graph.n_edges(), 0);
        let clusters = cluster(&g, &ClusterConfig::default()).unwrap();
        assert_eq!(clusters.ids, vec![0]);
    }

    #[test]
    fn bad_resolution_rejected() {
        let g = build_neighbor_graph(&two_blobs(), &NeighborsConfig { k: 3 }).unwrap();
        let config = ClusterConfig {
            resolution: 0.0,
            ..Default::default()
        };
        assert!(cluster(&g, &config).is_err());
    }

    #[test]
    fn nmi_identical() {
        let a = vec![0, 0, 1, 1, 2, 2];
        assert!((nmi(&a, &a).unwrap() - 1.0).abs() < 1e-10);
    }

    #[test]
    fn nmi_permuted() {
        let a = vec![0, 0, 1, 1];
        let b = vec![1, 1, 0, 0];
        assert!((nmi(&a, &b).unwrap() - 1.0).abs() < 1e-10);
    }

    #[test]
    fn nmi_independent() {
        let a = vec![0, 0, 1, 1];
        let b = vec![0, 1, 0, 1];
        assert!(nmi(&a, &b).unwrap() < 1e-10);
    }

    #[test]
    fn nmi_length_mismatch() {
        assert!(nmi(&[0, 1], &[0]).is_err());
        assert_eq!(nmi(&[], &[]).unwrap(), 0.0);
    }

    #[test]
    fn ari_identical_and_permuted() {
        let a = vec![0, 0, 1, 1, 2, 2];
        let b = vec![2, 2, 0, 0, 1, 1];
        assert!((adjusted_rand_index(&a, &a).unwrap() - 1.0).abs() < 1e-10);
        assert!((adjusted_rand_index(&a, &b).unwrap() - 1.0).abs() < 1e-10);
    }

    #[test]
    fn ari_degenerate() {
        assert_eq!(adjusted_rand_index(&[0], &[0]).unwrap(), 0.0);
        assert!(adjusted_rand_index(&[0, 1], &[0]).is_err());
    }

    #[test]
    fn composition_table() {
        let clusters = vec![0, 0, 0, 1, 1];
        let labels: Vec<String> = ["Astrocytes", "Astrocytes", "Oligo", "Oligo", "Oligo"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let comp = ClusterComposition::new(&clusters, &labels).unwrap();
        assert_eq!(comp.cell_types, vec!["Astrocytes", "Oligo"]);
        assert_eq!(comp.counts, vec![vec![2, 1], vec![0, 2]]);
        assert_eq!(comp.dominant(0), Some("Astrocytes"));
        assert_eq!(comp.dominant(1), Some("Oligo"));
        assert_eq!(comp.dominant(5), None);
        assert!(comp.nmi > 0.0 && comp.nmi < 1.0);
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use ndarray::Array2;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn graph_symmetric_and_partition_complete(
            points in proptest::collection::vec((-50.0f64..50.0, -50.0f64..50.0), 2..30),
            k in 1usize..6,
            seed in 0u64..1000,
        ) {
            let n = points.len();
            let flat: Vec<f64> = points.iter().flat_map(|&(x, y)| [x, y]).collect();
            let coords = Array2::from_shape_vec((n, 2), flat).unwrap();
            let ids = (0..n).map(|i| format!("c{i}")).collect();
            let emb = LatentEmbedding::new(ids, coords, vec![1.0, 1.0]).unwrap();

            let g = build_neighbor_graph(&emb, &NeighborsConfig { k }).unwrap();
            for i in 0..n {
                prop_assert!(g.graph.degree(i) >= g.k);
                for &(j, _) in g.graph.neighbors(i) {
                    prop_assert_ne!(i, j);
                    prop_assert!(g.graph.has_edge(j, i));
                }
            }

            let clusters = cluster(&g, &ClusterConfig { resolution: 1.0, seed }).unwrap();
            prop_assert_eq!(clusters.ids.len(), n);
            let k_clusters = clusters.n_clusters();
            prop_assert_eq!(clusters.sizes().iter().sum::<usize>(), n);
            prop_assert!(clusters.sizes().iter().all(|&s| s > 0));
            prop_assert!(clusters.ids.iter().all(|&c| c < k_clusters));
        }
    }
}

//! CART decision tree classifier using Gini impurity.
//!
//! Data is flat row-major `&[f64]` with an `n_features` parameter, consistent
//! with the rest of the crate.

use log::debug;
use scatac_core::{Result, ScatacError};

use crate::classifier::{argmax_count, check_training_set, Classifier, Predictor};

// ---------------------------------------------------------------------------
// Tree node representation (arena-allocated)
// ---------------------------------------------------------------------------

/// A single node in the decision tree.
#[derive(Debug, Clone)]
pub(crate) enum TreeNode {
    /// Internal split node.
    Split {
        feature_idx: usize,
        threshold: f64,
        left: usize,  // index into arena
        right: usize, // index into arena
    },
    /// Terminal leaf node.
    Leaf { class: usize },
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Hyper-parameters for a single CART tree.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct DecisionTreeConfig {
    /// Maximum tree depth (0 = only the root leaf).
    pub max_depth: usize,
    /// Minimum number of samples a node needs to be split.
    pub min_samples_split: usize,
}

impl Default for DecisionTreeConfig {
    fn default() -> Self {
        Self {
            max_depth: 5,
            min_samples_split: 2,
        }
    }
}

impl Classifier for DecisionTreeConfig {
    fn name(&self) -> &str {
        "cart"
    }

    fn describe(&self) -> String {
        format!("max_depth={}", self.max_depth)
    }

    fn fit(
        &self,
        data: &[f64],
        n_features: usize,
        labels: &[usize],
    ) -> Result<Box<dyn Predictor>> {
        let tree = DecisionTree::fit(data, n_features, labels, self)?;
        debug!("cart: {} nodes, depth {}", tree.n_nodes(), tree.depth());
        Ok(Box::new(tree))
    }
}

// ---------------------------------------------------------------------------
// DecisionTree
// ---------------------------------------------------------------------------

/// A fitted decision tree.
///
/// Stored as a flat arena of [`TreeNode`] values with index 0 as the root.
#[derive(Debug, Clone)]
pub struct DecisionTree {
    nodes: Vec<TreeNode>,
}

impl DecisionTree {
    /// Fit a decision tree on flat row-major data.
    ///
    /// # Errors
    ///
    /// Returns an error if the data is empty, dimensions are inconsistent,
    /// or the label count differs from the sample count.
    pub fn fit(
        data: &[f64],
        n_features: usize,
        labels: &[usize],
        config: &DecisionTreeConfig,
    ) -> Result<Self> {
        let (n_samples, _) = check_training_set(data, n_features, labels)?;
        let indices: Vec<usize> = (0..n_samples).collect();
        let all_features: Vec<usize> = (0..n_features).collect();
        Self::fit_with_features(data, n_features, labels, &indices, &all_features, config)
    }

    /// Fit considering only `candidate_features` at each split and only the
    /// rows in `sample_indices` (which may repeat). Used by the random forest.
    pub(crate) fn fit_with_features(
        data: &[f64],
        n_features: usize,
        labels: &[usize],
        sample_indices: &[usize],
        candidate_features: &[usize],
        config: &DecisionTreeConfig,
    ) -> Result<Self> {
        if sample_indices.is_empty() {
            return Err(ScatacError::InvalidInput("empty sample set".into()));
        }
        let n_classes = labels.iter().copied().max().map_or(1, |m| m + 1);
        let mut builder = Builder {
            data,
            n_features,
            labels,
            n_classes,
            candidate_features,
            config,
            nodes: Vec::new(),
        };
        builder.build(sample_indices, 0);
        Ok(Self {
            nodes: builder.nodes,
        })
    }

    /// Number of nodes in the arena.
    pub fn n_nodes(&self) -> usize {
        self.nodes.len()
    }

    /// Depth of the deepest leaf (a lone root leaf has depth 0).
    pub fn depth(&self) -> usize {
        fn walk(nodes: &[TreeNode], idx: usize) -> usize {
            match &nodes[idx] {
                TreeNode::Leaf { .. } => 0,
                TreeNode::Split { left, right, .. } => {
                    1 + walk(nodes, *left).max(walk(nodes, *right))
                }
            }
        }
        walk(&self.nodes, 0)
    }

    pub(crate) fn nodes(&self) -> &[TreeNode] {
        &self.nodes
    }
}

impl Predictor for DecisionTree {
    fn predict(&self, sample: &[f64]) -> usize {
        let mut idx = 0;
        loop {
            match &self.nodes[idx] {
                TreeNode::Leaf { class } => return *class,
                TreeNode::Split {
                    feature_idx,
                    threshold,
                    left,
                    right,
                } => {
                    idx = if sample[*feature_idx] <= *threshold {
                        *left
                    } else {
                        *right
                    };
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tree building
// ---------------------------------------------------------------------------

struct Builder<'a> {
    data: &'a [f64],
    n_features: usize,
    labels: &'a [usize],
    n_classes: usize,
    candidate_features: &'a [usize],
    config: &'a DecisionTreeConfig,
    nodes: Vec<TreeNode>,
}

impl Builder<'_> {
    fn value(&self, sample: usize, feature: usize) -> f64 {
        self.data[sample * self.n_features + feature]
    }

    fn class_counts(&self, indices: &[usize]) -> Vec<usize> {
        let mut counts = vec![0usize; self.n_classes];
        for &i in indices {
            counts[self.labels[i]] += 1;
        }
        counts
    }

    fn leaf(&mut self, class: usize) -> usize {
        let idx = self.nodes.len();
        self.nodes.push(TreeNode::Leaf { class });
        idx
    }

    /// Recursively build the subtree for `indices`, returning its arena index.
    fn build(&mut self, indices: &[usize], depth: usize) -> usize {
        let counts = self.class_counts(indices);
        let majority = argmax_count(&counts);
        let pure = counts.iter().filter(|&&c| c > 0).count() <= 1;

        if depth >= self.config.max_depth
            || indices.len() < self.config.min_samples_split.max(2)
            || pure
        {
            return self.leaf(majority);
        }

        let Some((feature, threshold)) = self.best_split(indices, &counts) else {
            return self.leaf(majority);
        };
        let (left, right): (Vec<usize>, Vec<usize>) = indices
            .iter()
            .partition(|&&i| self.value(i, feature) <= threshold);
        if left.is_empty() || right.is_empty() {
            return self.leaf(majority);
        }

        let node_idx = self.nodes.len();
        self.nodes.push(TreeNode::Leaf { class: majority }); // placeholder
        let left_child = self.build(&left, depth + 1);
        let right_child = self.build(&right, depth + 1);
        self.nodes[node_idx] = TreeNode::Split {
            feature_idx: feature,
            threshold,
            left: left_child,
            right: right_child,
        };
        node_idx
    }

    /// Best (feature, threshold) by Gini gain, scanning each feature's sorted
    /// values once with running class counts.
    fn best_split(&self, indices: &[usize], parent_counts: &[usize]) -> Option<(usize, f64)> {
        let n = indices.len();
        let parent_gini = gini(parent_counts, n);
        let mut best: Option<(usize, f64)> = None;
        let mut best_gain = 1e-12;

        let mut order: Vec<usize> = indices.to_vec();
        for &feat in self.candidate_features {
            order.sort_by(|&a, &b| self.value(a, feat).total_cmp(&self.value(b, feat)));

            let mut left_counts = vec![0usize; self.n_classes];
            for pos in 0..n - 1 {
                left_counts[self.labels[order[pos]]] += 1;
                let here = self.value(order[pos], feat);
                let next = self.value(order[pos + 1], feat);
                if here == next {
                    continue;
                }
                let n_left = pos + 1;
                let n_right = n - n_left;
                let right_counts: Vec<usize> = parent_counts
                    .iter()
                    .zip(&left_counts)
                    .map(|(p, l)| p - l)
                    .collect();
                let weighted = (n_left as f64 * gini(&left_counts, n_left)
                    + n_right as f64 * gini(&right_counts, n_right))
                    / n as f64;
                let gain = parent_gini - weighted;
                if gain > best_gain {
                    best_gain = gain;
                    best = Some((feat, (here + next) / 2.0));
                }
            }
        }
        best
    }
}

/// Gini impurity from class counts.
fn gini(counts: &[usize], n: usize) -> f64 {
    if n == 0 {
        return 0.0;
    }
    let n = n as f64;
    1.0 - counts
        .iter()
        .map(|&c| {
            let p = c as f64 / n;
            p * p
        })
        .sum::<f64>()
}

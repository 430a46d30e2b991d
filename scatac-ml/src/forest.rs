//! Random forest classifier.
//!
//! A bagged ensemble of [`DecisionTree`] classifiers with bootstrap sampling
//! and per-tree feature bagging. Each tree draws from its own ChaCha stream
//! derived from the configured seed, so fitting is reproducible and the
//! `parallel` feature yields the same forest as the sequential path.

use log::debug;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use scatac_core::{Result, ScatacError};

use crate::classifier::{argmax_count, check_training_set, Classifier, Predictor};
use crate::tree::{DecisionTree, DecisionTreeConfig, TreeNode};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Configuration for random forest training.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct RandomForestConfig {
    /// Number of trees in the ensemble.
    pub n_trees: usize,
    /// Maximum depth per tree.
    pub max_depth: usize,
    /// Number of features each tree may split on. `None` defaults to
    /// `sqrt(n_features)`.
    pub max_features: Option<usize>,
    /// Random seed for reproducibility.
    pub seed: u64,
}

impl Default for RandomForestConfig {
    fn default() -> Self {
        Self {
            n_trees: 100,
            max_depth: 10,
            max_features: None,
            seed: 42,
        }
    }
}

impl Classifier for RandomForestConfig {
    fn name(&self) -> &str {
        "random_forest"
    }

    fn describe(&self) -> String {
        match self.max_features {
            Some(m) => format!("max_features={m}, n_trees={}", self.n_trees),
            None => format!("max_features=sqrt, n_trees={}", self.n_trees),
        }
    }

    fn fit(
        &self,
        data: &[f64],
        n_features: usize,
        labels: &[usize],
    ) -> Result<Box<dyn Predictor>> {
        let forest = RandomForest::fit(data, n_features, labels, self)?;
        debug!(
            "random_forest: {} trees, split frequency {:?}",
            forest.n_trees(),
            forest.feature_importance(n_features)
        );
        Ok(Box::new(forest))
    }
}

// ---------------------------------------------------------------------------
// RandomForest
// ---------------------------------------------------------------------------

/// A fitted random forest (ensemble of decision trees).
#[derive(Debug, Clone)]
pub struct RandomForest {
    trees: Vec<DecisionTree>,
    n_classes: usize,
}

impl RandomForest {
    /// Fit a random forest on flat row-major data.
    ///
    /// # Errors
    ///
    /// Returns an error if the data is empty, dimensions are inconsistent,
    /// or `n_trees` is 0.
    pub fn fit(
        data: &[f64],
        n_features: usize,
        labels: &[usize],
        config: &RandomForestConfig,
    ) -> Result<Self> {
        let (n_samples, n_classes) = check_training_set(data, n_features, labels)?;
        if config.n_trees == 0 {
            return Err(ScatacError::InvalidInput("n_trees must be > 0".into()));
        }

        let max_features = config
            .max_features
            .unwrap_or_else(|| isqrt(n_features))
            .clamp(1, n_features);
        let tree_config = DecisionTreeConfig {
            max_depth: config.max_depth,
            ..Default::default()
        };

        let grow = |t: usize| -> Result<DecisionTree> {
            let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
            rng.set_stream(t as u64);

            // Bootstrap sample: n_samples drawn with replacement
            let sample_indices: Vec<usize> =
                (0..n_samples).map(|_| rng.gen_range(0..n_samples)).collect();
            let candidate_features = random_feature_subset(&mut rng, n_features, max_features);

            DecisionTree::fit_with_features(
                data,
                n_features,
                labels,
                &sample_indices,
                &candidate_features,
                &tree_config,
            )
        };

        #[cfg(feature = "parallel")]
        let trees: Vec<DecisionTree> = {
            use rayon::prelude::*;
            (0..config.n_trees)
                .into_par_iter()
                .map(grow)
                .collect::<Result<_>>()?
        };
        #[cfg(not(feature = "parallel"))]
        let trees: Vec<DecisionTree> = (0..config.n_trees).map(grow).collect::<Result<_>>()?;

        Ok(Self { trees, n_classes })
    }

    /// Split frequency of each feature across all trees, normalized to sum
    /// to 1.0 (all zeros when no tree splits).
    pub fn feature_importance(&self, n_features: usize) -> Vec<f64> {
        let mut counts = vec![0usize; n_features];
        for tree in &self.trees {
            for node in tree.nodes() {
                if let TreeNode::Split { feature_idx, .. } = node {
                    if *feature_idx < n_features {
                        counts[*feature_idx] += 1;
                    }
                }
            }
        }
        let total: usize = counts.iter().sum();
        if total == 0 {
            return vec![0.0; n_features];
        }
        counts.iter().map(|&c| c as f64 / total as f64).collect()
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    pub fn n_classes(&self) -> usize {
        self.n_classes
    }
}

impl Predictor for RandomForest {
    /// Majority vote over trees; ties go to the lowest class index.
    fn predict(&self, sample: &[f64]) -> usize {
        let mut votes = vec![0usize; self.n_classes.max(1)];
        for tree in &self.trees {
            let pred = tree.predict(sample);
            if pred < votes.len() {
                votes[pred] += 1;
            }
        }
        argmax_count(&votes)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Integer square root (floor).
fn isqrt(n: usize) -> usize {
    (n as f64).sqrt() as usize
}

/// Select `count` distinct feature indices from `0..n_features`, sorted.
fn random_feature_subset(rng: &mut ChaCha8Rng, n_features: usize, count: usize) -> Vec<usize> {
    let count = count.min(n_features);
    let mut pool: Vec<usize> = (0..n_features).collect();
    if count < n_features {
        pool.partial_shuffle(rng, count);
        pool.truncate(count);
        pool.sort_unstable();
    }
    pool
}

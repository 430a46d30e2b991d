//! k-nearest-neighbor classifier.

use scatac_core::{Result, ScatacError};

use crate::classifier::{check_training_set, Classifier, Predictor};
use crate::distance::nearest_rows;

/// k-NN hyper-parameters.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct KnnConfig {
    /// Number of neighbors that vote.
    pub k: usize,
}

impl Default for KnnConfig {
    fn default() -> Self {
        Self { k: 5 }
    }
}

impl Classifier for KnnConfig {
    fn name(&self) -> &str {
        "knn"
    }

    fn describe(&self) -> String {
        format!("k={}", self.k)
    }

    fn fit(
        &self,
        data: &[f64],
        n_features: usize,
        labels: &[usize],
    ) -> Result<Box<dyn Predictor>> {
        Ok(Box::new(Knn::fit(data, n_features, labels, self)?))
    }
}

/// A fitted k-NN model (the stored training set).
#[derive(Debug, Clone)]
pub struct Knn {
    data: Vec<f64>,
    n_features: usize,
    labels: Vec<usize>,
    n_classes: usize,
    k: usize,
}

impl Knn {
    /// Store the training set. `k` larger than the training set is clamped.
    pub fn fit(data: &[f64], n_features: usize, labels: &[usize], config: &KnnConfig) -> Result<Self> {
        let (n_samples, n_classes) = check_training_set(data, n_features, labels)?;
        if config.k == 0 {
            return Err(ScatacError::InvalidInput("k must be > 0".into()));
        }
        Ok(Self {
            data: data.to_vec(),
            n_features,
            labels: labels.to_vec(),
            n_classes,
            k: config.k.min(n_samples),
        })
    }
}

impl Predictor for Knn {
    /// Majority vote among the `k` nearest training rows. A tie between
    /// classes goes to whichever tied class has the nearest neighbor.
    fn predict(&self, sample: &[f64]) -> usize {
        let neighbors = nearest_rows(&self.data, self.n_features, sample, self.k, None);
        let mut votes = vec![0usize; self.n_classes];
        for &(j, _) in &neighbors {
            votes[self.labels[j]] += 1;
        }
        let top = votes.iter().copied().max().unwrap_or(0);
        neighbors
            .iter()
            .map(|&(j, _)| self.labels[j])
            .find(|&class| votes[class] == top)
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn majority_vote() {
        let data = vec![0.0, 0.1, 0.2, 5.0, 5.1, 5.2];
        let labels = vec![0, 0, 0, 1, 1, 1];
        let model = Knn::fit(&data, 1, &labels, &KnnConfig { k: 3 }).unwrap();
        assert_eq!(model.predict(&[0.05]), 0);
        assert_eq!(model.predict(&[4.0]), 1);
    }

    #[test]
    fn tie_goes_to_nearest_neighbor_class() {
        // k=2: one neighbor of each class, the class-1 one is closer
        let data = vec![0.0, 1.0];
        let labels = vec![0, 1];
        let model = Knn::fit(&data, 1, &labels, &KnnConfig { k: 2 }).unwrap();
        assert_eq!(model.predict(&[0.9]), 1);
        assert_eq!(model.predict(&[0.1]), 0);
    }

    #[test]
    fn k_clamped_to_training_size() {
        let data = vec![0.0, 1.0, 2.0];
        let labels = vec![1, 1, 0];
        let model = KnnConfig { k: 50 }.fit(&data, 1, &labels).unwrap();
        assert_eq!(model.predict(&[2.0]), 1);
    }

    #[test]
    fn zero_k_rejected() {
        assert!(Knn::fit(&[0.0], 1, &[0], &KnnConfig { k: 0 }).is_err());
    }

    #[test]
    fn describe_names_k() {
        assert_eq!(KnnConfig { k: 7 }.describe(), "k=7");
    }
}

//! Common interface for the classifier families.
//!
//! A [`Classifier`] is an unfitted configuration; fitting it on a training
//! set yields a boxed [`Predictor`]. The benchmark only ever talks to these
//! two traits, so every family is interchangeable.

use scatac_core::{Result, ScatacError};

/// A fitted model that maps a feature vector to a class index.
pub trait Predictor: Send + Sync + std::fmt::Debug {
    /// Predict the class of a single sample.
    fn predict(&self, sample: &[f64]) -> usize;

    /// Predict classes for flat row-major `data` with `n_features` columns.
    fn predict_batch(&self, data: &[f64], n_features: usize) -> Vec<usize> {
        if n_features == 0 {
            return Vec::new();
        }
        data.chunks_exact(n_features)
            .map(|row| self.predict(row))
            .collect()
    }
}

/// An unfitted classifier configuration.
pub trait Classifier: Send + Sync + std::fmt::Debug {
    /// Family name, e.g. `"knn"`.
    fn name(&self) -> &str;

    /// Tuned-parameter description, e.g. `"k=7"`.
    fn describe(&self) -> String;

    /// Fit on flat row-major `data` with class indices `labels`.
    fn fit(&self, data: &[f64], n_features: usize, labels: &[usize])
        -> Result<Box<dyn Predictor>>;
}

/// Validate a training set and return `(n_samples, n_classes)`.
///
/// `n_classes` is `max(label) + 1`.
pub(crate) fn check_training_set(
    data: &[f64],
    n_features: usize,
    labels: &[usize],
) -> Result<(usize, usize)> {
    let n_samples = crate::validate_flat(data, n_features)?;
    if labels.len() != n_samples {
        return Err(ScatacError::InvalidInput(format!(
            "labels length {} != n_samples {}",
            labels.len(),
            n_samples
        )));
    }
    let n_classes = labels.iter().copied().max().map_or(0, |m| m + 1);
    Ok((n_samples, n_classes))
}

/// Index of the largest count; ties go to the lowest index.
pub(crate) fn argmax_count(counts: &[usize]) -> usize {
    let mut best = 0;
    for (i, &c) in counts.iter().enumerate() {
        if c > counts[best] {
            best = i;
        }
    }
    best
}

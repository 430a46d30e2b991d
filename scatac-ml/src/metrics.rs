//! Classification evaluation metrics.
//!
//! Confusion matrix with per-class sensitivity / specificity / balanced
//! accuracy, overall accuracy, Cohen's kappa and the no-information rate.

use scatac_core::{Result, ScatacError};

// ---------------------------------------------------------------------------
// Confusion Matrix
// ---------------------------------------------------------------------------

/// Row-major confusion matrix for multi-class classification.
///
/// Entry `(i, j)` counts samples whose **actual** class is `i` and
/// **predicted** class is `j`.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct ConfusionMatrix {
    /// Row-major storage: `matrix[actual * n_classes + predicted]`.
    pub matrix: Vec<usize>,
    /// Number of classes.
    pub n_classes: usize,
}

impl ConfusionMatrix {
    /// Build a confusion matrix from actual and predicted label vectors.
    ///
    /// `n_classes` is inferred from the maximum label + 1 when `None`.
    ///
    /// # Errors
    ///
    /// Returns an error if the slices are empty, have different lengths, or
    /// contain a label outside `0..n_classes`.
    pub fn from_labels(
        actual: &[usize],
        predicted: &[usize],
        n_classes: Option<usize>,
    ) -> Result<Self> {
        if actual.is_empty() {
            return Err(ScatacError::InvalidInput("empty label vectors".into()));
        }
        if actual.len() != predicted.len() {
            return Err(ScatacError::InvalidInput(format!(
                "actual length {} != predicted length {}",
                actual.len(),
                predicted.len()
            )));
        }

        let nc = n_classes.unwrap_or_else(|| {
            let max_a = actual.iter().copied().max().unwrap_or(0);
            let max_p = predicted.iter().copied().max().unwrap_or(0);
            max_a.max(max_p) + 1
        });

        let mut matrix = vec![0usize; nc * nc];
        for (&a, &p) in actual.iter().zip(predicted.iter()) {
            if a >= nc || p >= nc {
                return Err(ScatacError::InvalidInput(format!(
                    "label pair ({a}, {p}) outside 0..{nc}"
                )));
            }
            matrix[a * nc + p] += 1;
        }

        Ok(Self {
            matrix,
            n_classes: nc,
        })
    }

    /// Get the count for a specific (actual, predicted) pair.
    #[inline]
    pub fn get(&self, actual: usize, predicted: usize) -> usize {
        self.matrix[actual * self.n_classes + predicted]
    }

    /// Total number of samples.
    pub fn total(&self) -> usize {
        self.matrix.iter().sum()
    }

    /// Number of samples whose actual class is `class`.
    pub fn actual_total(&self, class: usize) -> usize {
        (0..self.n_classes).map(|j| self.get(class, j)).sum()
    }

    /// Number of samples predicted as `class`.
    pub fn predicted_total(&self, class: usize) -> usize {
        (0..self.n_classes).map(|i| self.get(i, class)).sum()
    }

    pub fn true_positives(&self, class: usize) -> usize {
        self.get(class, class)
    }

    pub fn false_positives(&self, class: usize) -> usize {
        self.predicted_total(class) - self.get(class, class)
    }

    pub fn false_negatives(&self, class: usize) -> usize {
        self.actual_total(class) - self.get(class, class)
    }

    pub fn true_negatives(&self, class: usize) -> usize {
        self.total() + self.get(class, class)
            - self.actual_total(class)
            - self.predicted_total(class)
    }

    /// Overall accuracy (correct predictions / total).
    pub fn accuracy(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            return 0.0;
        }
        let correct: usize = (0..self.n_classes).map(|c| self.get(c, c)).sum();
        correct as f64 / total as f64
    }

    /// Sensitivity (recall) for a class: `TP / (TP + FN)`, 0.0 when undefined.
    pub fn sensitivity(&self, class: usize) -> f64 {
        ratio(self.true_positives(class), self.actual_total(class))
    }

    /// Specificity for a class: `TN / (TN + FP)`, 0.0 when undefined.
    pub fn specificity(&self, class: usize) -> f64 {
        let tn = self.true_negatives(class);
        ratio(tn, tn + self.false_positives(class))
    }

    /// Mean of sensitivity and specificity.
    pub fn balanced_accuracy(&self, class: usize) -> f64 {
        (self.sensitivity(class) + self.specificity(class)) / 2.0
    }

    /// Cohen's kappa: `(p_o - p_e) / (1 - p_e)`.
    ///
    /// When chance agreement is total (`p_e == 1`), kappa is 1.0 if observed
    /// agreement is perfect and 0.0 otherwise.
    pub fn kappa(&self) -> f64 {
        let total = self.total() as f64;
        if total == 0.0 {
            return 0.0;
        }
        let po = self.accuracy();
        let pe: f64 = (0..self.n_classes)
            .map(|k| self.actual_total(k) as f64 * self.predicted_total(k) as f64)
            .sum::<f64>()
            / (total * total);
        let denom = 1.0 - pe;
        if denom.abs() < 1e-12 {
            return if (po - 1.0).abs() < 1e-12 { 1.0 } else { 0.0 };
        }
        (po - pe) / denom
    }

    /// Largest class prevalence among the actual labels: the accuracy of
    /// always predicting the majority class.
    pub fn no_information_rate(&self) -> f64 {
        let total = self.total();
        let largest = (0..self.n_classes)
            .map(|c| self.actual_total(c))
            .max()
            .unwrap_or(0);
        ratio(largest, total)
    }
}

// ---------------------------------------------------------------------------
// Standalone scalar metrics
// ---------------------------------------------------------------------------

/// Overall accuracy: fraction of correct predictions.
///
/// # Errors
///
/// Returns an error if the slices are empty or have different lengths.
pub fn accuracy(actual: &[usize], predicted: &[usize]) -> Result<f64> {
    let cm = ConfusionMatrix::from_labels(actual, predicted, None)?;
    Ok(cm.accuracy())
}

/// Cohen's kappa between actual and predicted labels.
///
/// # Errors
///
/// Returns an error if the slices are empty or have different lengths.
pub fn cohen_kappa(actual: &[usize], predicted: &[usize]) -> Result<f64> {
    let cm = ConfusionMatrix::from_labels(actual, predicted, None)?;
    Ok(cm.kappa())
}

/// Mean and sample standard deviation; sd is 0.0 for fewer than two values.
pub fn mean_sd(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    if values.len() < 2 {
        return (mean, 0.0);
    }
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
    (mean, var.sqrt())
}

fn ratio(num: usize, denom: usize) -> f64 {
    if denom == 0 {
        0.0
    } else {
        num as f64 / denom as f64
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

//! Held-out validation of a fitted model.

use scatac_core::{Result, ScatacError, Summarizable};

use crate::classifier::Predictor;
use crate::metrics::ConfusionMatrix;

/// Per-class one-vs-rest statistics.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ClassStats {
    pub class: String,
    pub sensitivity: f64,
    pub specificity: f64,
    pub balanced_accuracy: f64,
}

/// Outcome of predicting the validation partition once.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ValidationReport {
    pub class_names: Vec<String>,
    /// Actual (rows) × predicted (columns).
    pub confusion: ConfusionMatrix,
    pub accuracy: f64,
    pub kappa: f64,
    pub no_information_rate: f64,
    pub per_class: Vec<ClassStats>,
}

impl Summarizable for ValidationReport {
    fn summary(&self) -> String {
        format!(
            "validation: {} samples, accuracy {:.4}, kappa {:.4}, NIR {:.4}",
            self.confusion.total(),
            self.accuracy,
            self.kappa,
            self.no_information_rate
        )
    }
}

/// Predict `data` with `model` and score against `labels`.
///
/// `class_names[i]` names class index `i`; the confusion matrix always has
/// `class_names.len()` rows.
///
/// # Errors
///
/// Returns an error for malformed data, an empty class list, or a label or
/// prediction outside `0..class_names.len()`.
pub fn validate(
    model: &dyn Predictor,
    data: &[f64],
    n_features: usize,
    labels: &[usize],
    class_names: &[String],
) -> Result<ValidationReport> {
    let n = crate::validate_flat(data, n_features)?;
    if labels.len() != n {
        return Err(ScatacError::InvalidInput(format!(
            "labels length {} != n_samples {}",
            labels.len(),
            n
        )));
    }
    if class_names.is_empty() {
        return Err(ScatacError::InvalidInput("no class names given".into()));
    }

    let predicted = model.predict_batch(data, n_features);
    let confusion = ConfusionMatrix::from_labels(labels, &predicted, Some(class_names.len()))?;
    let per_class = class_names
        .iter()
        .enumerate()
        .map(|(c, name)| ClassStats {
            class: name.clone(),
            sensitivity: confusion.sensitivity(c),
            specificity: confusion.specificity(c),
            balanced_accuracy: confusion.balanced_accuracy(c),
        })
        .collect();

    Ok(ValidationReport {
        class_names: class_names.to_vec(),
        accuracy: confusion.accuracy(),
        kappa: confusion.kappa(),
        no_information_rate: confusion.no_information_rate(),
        confusion,
        per_class,
    })
}

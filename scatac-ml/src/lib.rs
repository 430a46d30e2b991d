//! Numeric primitives for the scATAC pipeline.
//!
//! Everything here works on flat row-major `&[f64]` data with an explicit
//! `n_features`, or on `ndarray` blocks, and knows nothing about cell
//! identifiers; `scatac-omics` layers the identified types on top.
//!
//! - **Dimensionality reduction** — randomized truncated SVD ([`svd`]) and
//!   exact t-SNE ([`tsne`])
//! - **Classifiers** — LDA, CART, k-NN, RBF-kernel SVM and random forest
//!   behind the [`classifier::Classifier`] / [`classifier::Predictor`] traits
//! - **Model selection** — stratified partitioning ([`split`]), stratified
//!   k-fold cross-validation, multi-model [`benchmark`] and held-out
//!   [`validate`]
//! - **Metrics** — confusion matrix, accuracy, Cohen's kappa

pub mod benchmark;
pub mod classifier;
pub mod cross_validation;
pub mod distance;
pub mod forest;
pub mod knn;
pub mod lda;
pub mod metrics;
pub mod split;
pub mod svd;
pub mod svm;
pub mod tree;
pub mod tsne;
pub mod validate;

pub use benchmark::{
    benchmark, default_models, BenchmarkConfig, BenchmarkResult, CandidateScore, ModelFamily,
    ModelResult,
};
pub use classifier::{Classifier, Predictor};
pub use cross_validation::{CvResult, FoldResult, FoldScore};
pub use metrics::{accuracy, cohen_kappa, ConfusionMatrix};
pub use split::{stratified_split, TrainValidationSplit};
pub use svd::{randomized_svd, LinearOperator, SvdConfig, SvdResult};
pub use tsne::{check_perplexity, tsne, TsneConfig, TsneResult};
pub use validate::{validate, ClassStats, ValidationReport};

/// Check that `data` is a non-empty flat row-major matrix with `n_features`
/// columns and return the number of rows.
pub(crate) fn validate_flat(data: &[f64], n_features: usize) -> scatac_core::Result<usize> {
    use scatac_core::ScatacError;

    if data.is_empty() {
        return Err(ScatacError::InvalidInput("empty data".into()));
    }
    if n_features == 0 {
        return Err(ScatacError::InvalidInput("n_features must be > 0".into()));
    }
    if data.len() % n_features != 0 {
        return Err(ScatacError::InvalidInput(format!(
            "data length {} not divisible by n_features {}",
            data.len(),
            n_features
        )));
    }
    Ok(data.len() / n_features)
}

/// Gather the rows listed in `indices` from flat row-major `data`.
pub fn gather_rows(data: &[f64], n_features: usize, indices: &[usize]) -> Vec<f64> {
    indices
        .iter()
        .flat_map(|&i| data[i * n_features..(i + 1) * n_features].iter().copied())
        .collect()
}

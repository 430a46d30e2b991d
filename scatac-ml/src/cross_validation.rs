//! Stratified k-fold cross-validation.
//!
//! Closure-based: the caller supplies `FnMut(&[usize], &[usize]) ->
//! Result<FoldScore>` receiving train/test index splits, so any classifier
//! can be evaluated. Folds are built once by [`stratified_folds`] and can be
//! replayed for several candidate models so they all see identical splits.

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use scatac_core::{Result, ScatacError};

use crate::metrics::mean_sd;

// ---------------------------------------------------------------------------
// Result types
// ---------------------------------------------------------------------------

/// Scores reported by the evaluation closure for one fold.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct FoldScore {
    pub accuracy: f64,
    pub kappa: f64,
}

/// Result for a single fold.
#[derive(Debug, Clone, serde::Serialize)]
pub struct FoldResult {
    /// Fold number (0-indexed).
    pub fold: usize,
    pub n_train: usize,
    pub n_test: usize,
    pub score: FoldScore,
}

/// Aggregated cross-validation result.
#[derive(Debug, Clone, serde::Serialize)]
pub struct CvResult {
    pub folds: Vec<FoldResult>,
    pub mean_accuracy: f64,
    /// Sample standard deviation of fold accuracies.
    pub sd_accuracy: f64,
    pub mean_kappa: f64,
    pub sd_kappa: f64,
}

// ---------------------------------------------------------------------------
// Folds
// ---------------------------------------------------------------------------

/// Build `k` stratified test folds over `labels`.
///
/// Groups indices by label, shuffles each group under `seed`, and deals them
/// round-robin across folds, continuing the deal from one class to the next
/// so fold sizes differ by at most one. Each fold is sorted.
///
/// # Errors
///
/// Returns an error if `k < 2` or `k > labels.len()`.
pub fn stratified_folds(labels: &[usize], k: usize, seed: u64) -> Result<Vec<Vec<usize>>> {
    let n_samples = labels.len();
    if k < 2 {
        return Err(ScatacError::InvalidInput("k must be at least 2".into()));
    }
    if k > n_samples {
        return Err(ScatacError::InvalidInput(format!(
            "k ({k}) > n_samples ({n_samples})"
        )));
    }

    let n_classes = labels.iter().copied().max().map_or(0, |m| m + 1);
    let mut class_indices: Vec<Vec<usize>> = vec![Vec::new(); n_classes];
    for (i, &label) in labels.iter().enumerate() {
        class_indices[label].push(i);
    }

    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut folds: Vec<Vec<usize>> = vec![Vec::new(); k];
    let mut next = 0;
    for group in &mut class_indices {
        group.shuffle(&mut rng);
        for &idx in group.iter() {
            folds[next].push(idx);
            next = (next + 1) % k;
        }
    }
    for fold in &mut folds {
        fold.sort_unstable();
    }
    Ok(folds)
}

/// Run `eval_fn` once per fold (test = fold i, train = the rest).
pub fn run_folds<F>(folds: &[Vec<usize>], mut eval_fn: F) -> Result<CvResult>
where
    F: FnMut(&[usize], &[usize]) -> Result<FoldScore>,
{
    let mut results = Vec::with_capacity(folds.len());
    for (i, test) in folds.iter().enumerate() {
        let mut train: Vec<usize> = folds
            .iter()
            .enumerate()
            .filter(|&(j, _)| j != i)
            .flat_map(|(_, v)| v.iter().copied())
            .collect();
        train.sort_unstable();

        let score = eval_fn(&train, test)?;
        results.push(FoldResult {
            fold: i,
            n_train: train.len(),
            n_test: test.len(),
            score,
        });
    }

    let accuracies: Vec<f64> = results.iter().map(|f| f.score.accuracy).collect();
    let kappas: Vec<f64> = results.iter().map(|f| f.score.kappa).collect();
    let (mean_accuracy, sd_accuracy) = mean_sd(&accuracies);
    let (mean_kappa, sd_kappa) = mean_sd(&kappas);
    Ok(CvResult {
        folds: results,
        mean_accuracy,
        sd_accuracy,
        mean_kappa,
        sd_kappa,
    })
}

/// Stratified k-fold cross-validation in one call.
///
/// # Errors
///
/// Returns an error if `k < 2`, `k > n_samples`, or the evaluation closure
/// returns an error.
pub fn cross_validate_stratified<F>(
    labels: &[usize],
    k: usize,
    seed: u64,
    eval_fn: F,
) -> Result<CvResult>
where
    F: FnMut(&[usize], &[usize]) -> Result<FoldScore>,
{
    let folds = stratified_folds(labels, k, seed)?;
    run_folds(&folds, eval_fn)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

//! Multi-model benchmark with stratified cross-validation.
//!
//! The labeled samples are split once into a training and a validation
//! partition. Every candidate of every model family is cross-validated on
//! the *same* stratified folds of the training partition; each family keeps
//! its best candidate, refit on the whole training partition, and the best
//! family overall is flagged. The validation partition is left untouched for
//! [`validate`](crate::validate::validate).

use std::time::Instant;

use log::{debug, info, warn};
use scatac_core::{Result, ScatacError, Summarizable};

use crate::classifier::{check_training_set, Classifier, Predictor};
use crate::cross_validation::{run_folds, stratified_folds, CvResult, FoldScore};
use crate::forest::RandomForestConfig;
use crate::knn::KnnConfig;
use crate::lda::LdaConfig;
use crate::metrics::ConfusionMatrix;
use crate::split::{stratified_split, TrainValidationSplit};
use crate::svm::SvmConfig;
use crate::tree::DecisionTreeConfig;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Configuration for [`benchmark`].
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct BenchmarkConfig {
    /// Fraction of each class assigned to the training partition.
    pub split_fraction: f64,
    /// Number of cross-validation folds.
    pub n_folds: usize,
    /// Seed for the partition and the folds.
    pub seed: u64,
}

impl Default for BenchmarkConfig {
    fn default() -> Self {
        Self {
            split_fraction: 0.8,
            n_folds: 10,
            seed: 42,
        }
    }
}

/// A classifier family and the candidate configurations tuned within it.
#[derive(Debug)]
pub struct ModelFamily {
    pub name: String,
    pub candidates: Vec<Box<dyn Classifier>>,
}

impl ModelFamily {
    pub fn new(name: impl Into<String>, candidates: Vec<Box<dyn Classifier>>) -> Self {
        Self {
            name: name.into(),
            candidates,
        }
    }
}

/// The five default families with their candidate grids, in declaration
/// order: LDA, CART, k-NN, RBF-SVM, random forest.
///
/// `seed` feeds the random forest.
pub fn default_models(seed: u64) -> Vec<ModelFamily> {
    fn boxed<C: Classifier + 'static>(c: C) -> Box<dyn Classifier> {
        Box::new(c)
    }

    vec![
        ModelFamily::new("lda", vec![boxed(LdaConfig::default())]),
        ModelFamily::new(
            "cart",
            [3, 5, 10]
                .into_iter()
                .map(|max_depth| {
                    boxed(DecisionTreeConfig {
                        max_depth,
                        ..Default::default()
                    })
                })
                .collect(),
        ),
        ModelFamily::new(
            "knn",
            [5, 7, 9].into_iter().map(|k| boxed(KnnConfig { k })).collect(),
        ),
        ModelFamily::new(
            "svm_rbf",
            [0.25, 0.5, 1.0]
                .into_iter()
                .map(|c| {
                    boxed(SvmConfig {
                        c,
                        ..Default::default()
                    })
                })
                .collect(),
        ),
        ModelFamily::new(
            "random_forest",
            [1, 2]
                .into_iter()
                .map(|m| {
                    boxed(RandomForestConfig {
                        max_features: Some(m),
                        seed,
                        ..Default::default()
                    })
                })
                .collect(),
        ),
    ]
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// Cross-validated score of one candidate configuration.
#[derive(Debug, Clone, serde::Serialize)]
pub struct CandidateScore {
    pub params: String,
    pub mean_accuracy: f64,
    pub mean_kappa: f64,
}

/// Outcome for one model family.
#[derive(Debug)]
pub struct ModelResult {
    /// Family name.
    pub name: String,
    /// Parameters of the selected candidate.
    pub params: String,
    /// Fold-level scores of the selected candidate.
    pub cv: CvResult,
    /// Every candidate tried, in grid order.
    pub candidates: Vec<CandidateScore>,
    /// Selected candidate refit on the whole training partition.
    pub model: Box<dyn Predictor>,
}

/// Outcome of [`benchmark`].
#[derive(Debug)]
pub struct BenchmarkResult {
    pub split: TrainValidationSplit,
    /// One entry per family, in the order the families were given.
    pub results: Vec<ModelResult>,
    /// Index into `results` of the selected family.
    pub best: usize,
    pub n_folds: usize,
}

impl BenchmarkResult {
    pub fn best_model(&self) -> &ModelResult {
        &self.results[self.best]
    }
}

impl Summarizable for BenchmarkResult {
    fn summary(&self) -> String {
        let best = self.best_model();
        format!(
            "benchmark: {} models, {}-fold CV on {} training samples; best {} ({}) accuracy {:.4} kappa {:.4}",
            self.results.len(),
            self.n_folds,
            self.split.train.len(),
            best.name,
            best.params,
            best.cv.mean_accuracy,
            best.cv.mean_kappa,
        )
    }
}

/// `true` when `a` beats `b`: higher mean accuracy, then higher mean kappa.
/// Equal scores keep the earlier entry.
fn better(a: &CvResult, b: &CvResult) -> bool {
    a.mean_accuracy > b.mean_accuracy
        || (a.mean_accuracy == b.mean_accuracy && a.mean_kappa > b.mean_kappa)
}

// ---------------------------------------------------------------------------
// Benchmark
// ---------------------------------------------------------------------------

/// Partition, cross-validate every candidate, refit each family's winner.
///
/// # Errors
///
/// `InvalidInput` for malformed data or an empty model list, `Partition`
/// when a class is too small to split, and any error a classifier returns
/// while fitting.
pub fn benchmark(
    data: &[f64],
    n_features: usize,
    labels: &[usize],
    models: &[ModelFamily],
    config: &BenchmarkConfig,
) -> Result<BenchmarkResult> {
    check_training_set(data, n_features, labels)?;
    if models.is_empty() || models.iter().any(|m| m.candidates.is_empty()) {
        return Err(ScatacError::InvalidInput(
            "every model family needs at least one candidate".into(),
        ));
    }

    let split = stratified_split(labels, config.split_fraction, config.seed)?;
    let train_data = crate::gather_rows(data, n_features, &split.train);
    let train_labels: Vec<usize> = split.train.iter().map(|&i| labels[i]).collect();

    let n_folds = config.n_folds.min(train_labels.len()).max(2);
    if n_folds != config.n_folds {
        warn!(
            "reducing CV folds from {} to {} for {} training samples",
            config.n_folds,
            n_folds,
            train_labels.len()
        );
    }
    let folds = stratified_folds(&train_labels, n_folds, config.seed)?;
    info!(
        "benchmark: {} training / {} validation samples, {} folds, {} model families",
        split.train.len(),
        split.validation.len(),
        n_folds,
        models.len()
    );

    let mut results = Vec::with_capacity(models.len());
    for family in models {
        let start = Instant::now();
        let mut candidates = Vec::with_capacity(family.candidates.len());
        let mut best: Option<(usize, CvResult)> = None;

        for (c, candidate) in family.candidates.iter().enumerate() {
            let cv = run_folds(&folds, |train, test| {
                evaluate_fold(
                    candidate.as_ref(),
                    &train_data,
                    n_features,
                    &train_labels,
                    train,
                    test,
                )
            })?;
            debug!(
                "{} [{}]: accuracy {:.4} kappa {:.4}",
                family.name,
                candidate.describe(),
                cv.mean_accuracy,
                cv.mean_kappa
            );
            candidates.push(CandidateScore {
                params: candidate.describe(),
                mean_accuracy: cv.mean_accuracy,
                mean_kappa: cv.mean_kappa,
            });
            let replace = best.as_ref().map_or(true, |(_, b)| better(&cv, b));
            if replace {
                best = Some((c, cv));
            }
        }

        let Some((winner, cv)) = best else {
            continue;
        };
        let chosen = family.candidates[winner].as_ref();
        let model = chosen.fit(&train_data, n_features, &train_labels)?;
        info!(
            "{}: selected {} (accuracy {:.4} ± {:.4}, kappa {:.4}) in {:.2?}",
            family.name,
            chosen.describe(),
            cv.mean_accuracy,
            cv.sd_accuracy,
            cv.mean_kappa,
            start.elapsed()
        );
        results.push(ModelResult {
            name: family.name.clone(),
            params: chosen.describe(),
            cv,
            candidates,
            model,
        });
    }

    let mut best = 0;
    for (i, r) in results.iter().enumerate().skip(1) {
        if better(&r.cv, &results[best].cv) {
            best = i;
        }
    }
    info!("benchmark: best model is {}", results[best].name);

    Ok(BenchmarkResult {
        split,
        results,
        best,
        n_folds,
    })
}

fn evaluate_fold(
    classifier: &dyn Classifier,
    data: &[f64],
    n_features: usize,
    labels: &[usize],
    train: &[usize],
    test: &[usize],
) -> Result<FoldScore> {
    let fold_data = crate::gather_rows(data, n_features, train);
    let fold_labels: Vec<usize> = train.iter().map(|&i| labels[i]).collect();
    let model = classifier.fit(&fold_data, n_features, &fold_labels)?;

    let test_data = crate::gather_rows(data, n_features, test);
    let predicted = model.predict_batch(&test_data, n_features);
    let actual: Vec<usize> = test.iter().map(|&i| labels[i]).collect();
    let n_classes = labels.iter().copied().max().map_or(1, |m| m + 1);
    let cm = ConfusionMatrix::from_labels(&actual, &predicted, Some(n_classes))?;
    Ok(FoldScore {
        accuracy: cm.accuracy(),
        kappa: cm.kappa(),
    })
}

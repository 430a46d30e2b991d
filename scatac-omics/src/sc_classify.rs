//! Target-versus-rest classification of labeled cells.
//!
//! Labels are collapsed into two classes, the target cell type and `Other`,
//! then handed to the model benchmark. The winning model is scored once on
//! the held-out validation partition.

use log::info;
use scatac_core::{Result, ScatacError, Summarizable};
use scatac_ml::benchmark::{benchmark, BenchmarkConfig, BenchmarkResult, ModelFamily};
use scatac_ml::validate::{validate, ValidationReport};
use serde::{Deserialize, Serialize};

use crate::sc_labels::LabeledRecord;

/// Name of the class every non-target cell is collapsed into.
pub const OTHER_CLASS: &str = "Other";

/// Configuration for [`classify`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifyConfig {
    /// Cell type to separate from the rest.
    pub target: String,
    pub benchmark: BenchmarkConfig,
}

impl Default for ClassifyConfig {
    fn default() -> Self {
        Self {
            target: "Astrocytes".to_string(),
            benchmark: BenchmarkConfig::default(),
        }
    }
}

/// Benchmark and validation outcome of one classification run.
#[derive(Debug)]
pub struct Classification {
    /// Index 0 is [`OTHER_CLASS`], index 1 the target.
    pub class_names: Vec<String>,
    pub n_target: usize,
    pub benchmark: BenchmarkResult,
    pub validation: ValidationReport,
}

impl Summarizable for Classification {
    fn summary(&self) -> String {
        format!(
            "{} vs {}: {}; {}",
            self.class_names[1],
            self.class_names[0],
            self.benchmark.summary(),
            self.validation.summary()
        )
    }
}

/// Binary class per record: 1 for `target`, 0 for everything else.
///
/// # Errors
///
/// [`ScatacError::DegenerateInput`] if only one of the two classes occurs.
pub fn binarize(records: &[LabeledRecord], target: &str) -> Result<Vec<usize>> {
    let labels: Vec<usize> = records
        .iter()
        .map(|r| usize::from(r.label == target))
        .collect();
    let n_target = labels.iter().filter(|&&l| l == 1).count();
    if n_target == 0 || n_target == labels.len() {
        return Err(ScatacError::DegenerateInput(format!(
            "{n_target} of {} cells are '{target}'; need both '{target}' and '{OTHER_CLASS}'",
            labels.len()
        )));
    }
    Ok(labels)
}

/// Embedding coordinates of all records as a flat row-major matrix.
pub fn feature_matrix(records: &[LabeledRecord]) -> Result<(Vec<f64>, usize)> {
    let n_features = records.first().map_or(0, |r| r.coords.len());
    if n_features == 0 {
        return Err(ScatacError::InvalidInput("records carry no coordinates".into()));
    }
    let mut data = Vec::with_capacity(records.len() * n_features);
    for r in records {
        if r.coords.len() != n_features {
            return Err(ScatacError::InvalidInput(format!(
                "cell '{}' has {} coordinates, expected {n_features}",
                r.cell_id,
                r.coords.len()
            )));
        }
        data.extend_from_slice(&r.coords);
    }
    Ok((data, n_features))
}

/// Benchmark `models` on target-vs-rest labels and validate the winner.
pub fn classify(
    records: &[LabeledRecord],
    models: &[ModelFamily],
    config: &ClassifyConfig,
) -> Result<Classification> {
    let labels = binarize(records, &config.target)?;
    let (data, n_features) = feature_matrix(records)?;
    let class_names = vec![OTHER_CLASS.to_string(), config.target.clone()];
    let n_target = labels.iter().filter(|&&l| l == 1).count();
    info!(
        "classify: {} cells, {} '{}' vs {} '{}'",
        labels.len(),
        n_target,
        config.target,
        labels.len() - n_target,
        OTHER_CLASS
    );

    let result = benchmark(&data, n_features, &labels, models, &config.benchmark)?;

    let holdout = &result.split.validation;
    let val_data = scatac_ml::gather_rows(&data, n_features, holdout);
    let val_labels: Vec<usize> = holdout.iter().map(|&i| labels[i]).collect();
    let validation = validate(
        result.best_model().model.as_ref(),
        &val_data,
        n_features,
        &val_labels,
        &class_names,
    )?;
    info!("{}", validation.summary());

    Ok(Classification {
        class_names,
        n_target,
        benchmark: result,
        validation,
    })
}

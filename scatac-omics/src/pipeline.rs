//! End-to-end driver: counts and labels in, every stage's result out.
//!
//! Stage order: TF-IDF, LSI, neighbor graph, Louvain, t-SNE, label join,
//! cluster composition, target-vs-rest benchmark and validation. Every
//! stochastic stage takes its seed from [`PipelineConfig`].

use std::collections::BTreeMap;
use std::time::Instant;

use log::info;
use scatac_core::{Result, ScatacError, Summarizable};
use scatac_ml::benchmark::default_models;
use scatac_ml::svd::SvdConfig;
use scatac_ml::tsne::{check_perplexity, TsneConfig};
use serde::{Deserialize, Serialize};

use crate::counts::{CountMatrix, QcSummary};
use crate::sc_classify::{classify, Classification, ClassifyConfig, OTHER_CLASS};
use crate::sc_cluster::{
    build_neighbor_graph, cluster, ClusterAssignment, ClusterComposition, ClusterConfig,
    NeighborGraph, NeighborsConfig,
};
use crate::sc_embed::{project, Embedding2D};
use crate::sc_labels::{check_universe, join, labels_by_position, LabelRenames, LabeledRecord};
use crate::sc_normalize::tfidf;
use crate::sc_reduce::{reduce, LatentEmbedding};

/// Every knob of a pipeline run.
///
/// Missing fields take their defaults, so `{}` is a valid JSON config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub svd: SvdConfig,
    pub neighbors: NeighborsConfig,
    pub cluster: ClusterConfig,
    pub tsne: TsneConfig,
    pub classify: ClassifyConfig,
    pub renames: LabelRenames,
    /// Column of the label table holding cell types; the last column when
    /// unset.
    pub label_column: Option<String>,
}

impl PipelineConfig {
    /// Use `seed` for every stochastic stage.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.svd.seed = seed;
        self.cluster.seed = seed;
        self.tsne.seed = seed;
        self.classify.benchmark.seed = seed;
        self
    }
}

/// Results of every stage of one run.
#[derive(Debug)]
pub struct PipelineOutput {
    pub qc: QcSummary,
    pub n_peaks: usize,
    pub latent: LatentEmbedding,
    pub neighbors: NeighborGraph,
    pub clusters: ClusterAssignment,
    pub embedding: Embedding2D,
    pub records: Vec<LabeledRecord>,
    pub composition: ClusterComposition,
    pub classification: Classification,
}

impl Summarizable for PipelineOutput {
    fn summary(&self) -> String {
        format!(
            "{} peaks \u{00d7} {} cells; {}; {}",
            self.n_peaks,
            self.records.len(),
            self.clusters.summary(),
            self.classification.summary()
        )
    }
}

/// Check the label table and stage parameters against the matrix before any
/// numeric work.
fn check_inputs(
    counts: &CountMatrix,
    labels: &BTreeMap<String, String>,
    config: &PipelineConfig,
) -> Result<()> {
    check_universe("count matrix", counts.cell_ids(), "labels", labels.keys())?;
    let target = &config.classify.target;
    let n_target = labels
        .values()
        .filter(|l| config.renames.apply(l) == *target)
        .count();
    if n_target == 0 || n_target == labels.len() {
        return Err(ScatacError::DegenerateInput(format!(
            "{n_target} of {} cells are '{target}'; need both '{target}' and '{OTHER_CLASS}'",
            labels.len()
        )));
    }
    let n_other = labels.len() - n_target;
    for (class, n) in [(OTHER_CLASS, n_other), (target.as_str(), n_target)] {
        if n < 2 {
            return Err(ScatacError::Partition(format!(
                "class '{class}' has {n} member; at least 2 are needed to split"
            )));
        }
    }
    check_perplexity(config.tsne.perplexity, counts.n_cells())?;
    Ok(())
}

/// Run every stage on `counts` with labels keyed by cell id.
///
/// # Errors
///
/// Label problems surface first as [`ScatacError::JoinMismatch`],
/// [`ScatacError::DegenerateInput`] or [`ScatacError::Partition`], then an
/// unusable t-SNE perplexity as [`ScatacError::InvalidInput`]; afterwards
/// the first failing stage's error is returned unchanged.
pub fn run(
    counts: &CountMatrix,
    labels: &BTreeMap<String, String>,
    config: &PipelineConfig,
) -> Result<PipelineOutput> {
    let start = Instant::now();
    check_inputs(counts, labels, config)?;
    info!("{}", counts.summary());

    let qc = counts.qc();
    info!("{}", qc.summary());

    let normalized = tfidf(counts)?;
    let latent = reduce(&normalized, &config.svd)?;
    drop(normalized);

    let neighbors = build_neighbor_graph(&latent, &config.neighbors)?;
    let clusters = cluster(&neighbors, &config.cluster)?;
    let embedding = project(&latent, &config.tsne)?;

    let records = join(&embedding, Some(&clusters), labels, &config.renames)?;
    let cluster_ids: Vec<usize> = records.iter().filter_map(|r| r.cluster).collect();
    let cell_types: Vec<String> = records.iter().map(|r| r.label.clone()).collect();
    let composition = ClusterComposition::new(&cluster_ids, &cell_types)?;
    info!("{}", composition.summary());

    let models = default_models(config.classify.benchmark.seed);
    let classification = classify(&records, &models, &config.classify)?;

    let output = PipelineOutput {
        qc,
        n_peaks: counts.n_peaks(),
        latent,
        neighbors,
        clusters,
        embedding,
        records,
        composition,
        classification,
    };
    info!("pipeline finished in {:.2?}: {}", start.elapsed(), output.summary());
    Ok(output)
}

/// [`run`] with Input B's positional labels: one per matrix column, in
/// column order.
pub fn run_positional(
    counts: &CountMatrix,
    labels: Vec<String>,
    config: &PipelineConfig,
) -> Result<PipelineOutput> {
    let table = labels_by_position(counts.cell_ids(), labels)?;
    run(counts, &table, config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn with_seed_sets_every_stage() {
        let config = PipelineConfig::default().with_seed(7);
        assert_eq!(config.svd.seed, 7);
        assert_eq!(config.cluster.seed, 7);
        assert_eq!(config.tsne.seed, 7);
        assert_eq!(config.classify.benchmark.seed, 7);
    }

    #[test]
    fn empty_json_is_default() {
        let config: PipelineConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.svd.n_components, 50);
        assert_eq!(config.neighbors.k, 30);
        assert_eq!(config.classify.target, "Astrocytes");
        assert_eq!(config.renames, LabelRenames::default());
        assert!(config.label_column.is_none());
    }

    #[test]
    fn partial_json_overrides() {
        let json = r#"{"svd": {"n_components": 5}, "label_column": "celltype",
                       "classify": {"benchmark": {"n_folds": 5}}}"#;
        let config: PipelineConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.svd.n_components, 5);
        assert_eq!(config.svd.oversampling, SvdConfig::default().oversampling);
        assert_eq!(config.classify.benchmark.n_folds, 5);
        assert_eq!(config.classify.benchmark.split_fraction, 0.8);
        assert_eq!(config.label_column.as_deref(), Some("celltype"));
    }

    #[test]
    fn missing_target_fails_before_numeric_work() {
        let counts = CountMatrix::from_rows(
            vec![vec![0.0, 0.0]],
            vec!["p0".into()],
            vec!["a".into(), "b".into()],
        )
        .unwrap();
        // all-zero counts would be DegenerateInput from tfidf too, so check the message
        let err = run_positional(&counts, vec!["Oligo".into(), "Microglia".into()], &PipelineConfig::default())
            .unwrap_err();
        assert!(err.to_string().contains("'Astrocytes'"));
    }
}

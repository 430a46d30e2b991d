//! Run report: a serializable digest of every pipeline stage.
//!
//! [`Report`] renders as plain text through `Display` and as JSON through
//! `serde`. Scatter plots are described as per-group tables (cell count,
//! centroid, bounding box) rather than drawn.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;

use log::info;
use scatac_core::{Result, ScatacError};
use scatac_ml::benchmark::CandidateScore;
use scatac_ml::validate::ValidationReport;
use scatac_omics::{ClusterComposition, Distribution, LabeledRecord, PipelineOutput};
use serde::Serialize;

// ── Sections ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct QcSection {
    pub n_peaks: usize,
    pub n_cells: usize,
    pub n_count: Distribution,
    pub n_feature: Distribution,
}

#[derive(Debug, Clone, Serialize)]
pub struct LatentSection {
    pub n_dims: usize,
    pub singular_values: Vec<f64>,
    /// Share of the retained squared singular values per component.
    pub variance_ratio: Vec<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClusterSection {
    pub n_neighbors: usize,
    pub n_edges: usize,
    pub n_clusters: usize,
    pub sizes: Vec<usize>,
    pub modularity: f64,
}

/// Where one group of cells sits in the 2-D embedding.
#[derive(Debug, Clone, Serialize)]
pub struct EmbeddingGroup {
    pub group: String,
    pub n_cells: usize,
    pub centroid: Vec<f64>,
    pub min: Vec<f64>,
    pub max: Vec<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ModelRow {
    pub name: String,
    pub params: String,
    pub mean_accuracy: f64,
    pub sd_accuracy: f64,
    pub mean_kappa: f64,
    pub sd_kappa: f64,
    pub candidates: Vec<CandidateScore>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ModelSection {
    pub target: String,
    pub n_train: usize,
    pub n_validation: usize,
    pub n_folds: usize,
    pub models: Vec<ModelRow>,
    pub best: String,
}

/// Digest of one pipeline run.
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub qc: QcSection,
    pub latent: LatentSection,
    pub clusters: ClusterSection,
    pub embedding_by_cluster: Vec<EmbeddingGroup>,
    pub embedding_by_label: Vec<EmbeddingGroup>,
    pub composition: ClusterComposition,
    pub models: ModelSection,
    pub validation: ValidationReport,
    /// Per-cell table; JSON output only.
    pub cells: Vec<LabeledRecord>,
}

/// Group records by `key` and describe each group's spread in the embedding.
/// Groups come out sorted by key.
pub fn embedding_groups<K, F>(records: &[LabeledRecord], key: F) -> Vec<EmbeddingGroup>
where
    K: Ord + fmt::Display,
    F: Fn(&LabeledRecord) -> K,
{
    let mut groups: BTreeMap<K, Vec<&LabeledRecord>> = BTreeMap::new();
    for r in records {
        groups.entry(key(r)).or_default().push(r);
    }
    groups
        .into_iter()
        .map(|(k, members)| {
            let dims = members.first().map_or(0, |r| r.coords.len());
            let mut centroid = vec![0.0; dims];
            let mut min = vec![f64::INFINITY; dims];
            let mut max = vec![f64::NEG_INFINITY; dims];
            for r in &members {
                for (d, &x) in r.coords.iter().enumerate().take(dims) {
                    centroid[d] += x;
                    min[d] = min[d].min(x);
                    max[d] = max[d].max(x);
                }
            }
            for c in &mut centroid {
                *c /= members.len() as f64;
            }
            EmbeddingGroup {
                group: k.to_string(),
                n_cells: members.len(),
                centroid,
                min,
                max,
            }
        })
        .collect()
}

impl Report {
    pub fn from_output(out: &PipelineOutput) -> Self {
        let sv = out.latent.singular_values();
        let total: f64 = sv.iter().map(|s| s * s).sum();
        let variance_ratio = sv
            .iter()
            .map(|s| if total > 0.0 { s * s / total } else { 0.0 })
            .collect();

        let cls = &out.classification;
        let bench = &cls.benchmark;
        let models = bench
            .results
            .iter()
            .map(|r| ModelRow {
                name: r.name.clone(),
                params: r.params.clone(),
                mean_accuracy: r.cv.mean_accuracy,
                sd_accuracy: r.cv.sd_accuracy,
                mean_kappa: r.cv.mean_kappa,
                sd_kappa: r.cv.sd_kappa,
                candidates: r.candidates.clone(),
            })
            .collect();

        Self {
            qc: QcSection {
                n_peaks: out.n_peaks,
                n_cells: out.qc.n_count.len(),
                n_count: out.qc.n_count_stats,
                n_feature: out.qc.n_feature_stats,
            },
            latent: LatentSection {
                n_dims: out.latent.n_dims(),
                singular_values: sv.to_vec(),
                variance_ratio,
            },
            clusters: ClusterSection {
                n_neighbors: out.neighbors.k,
                n_edges: out.neighbors.graph.n_edges(),
                n_clusters: out.clusters.n_clusters(),
                sizes: out.clusters.sizes(),
                modularity: out.clusters.modularity,
            },
            embedding_by_cluster: embedding_groups(&out.records, |r| r.cluster.unwrap_or(0)),
            embedding_by_label: embedding_groups(&out.records, |r| r.label.clone()),
            composition: out.composition.clone(),
            models: ModelSection {
                target: cls.class_names[1].clone(),
                n_train: bench.split.train.len(),
                n_validation: bench.split.validation.len(),
                n_folds: bench.n_folds,
                models,
                best: bench.best_model().name.clone(),
            },
            validation: cls.validation.clone(),
            cells: out.records.clone(),
        }
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| ScatacError::InvalidInput(format!("report serialization: {e}")))
    }
}

// ── Text rendering ─────────────────────────────────────────────────────────

fn join_f64(values: &[f64], precision: usize) -> String {
    values
        .iter()
        .map(|v| format!("{v:.precision$}"))
        .collect::<Vec<_>>()
        .join(", ")
}

fn write_groups(f: &mut fmt::Formatter<'_>, title: &str, groups: &[EmbeddingGroup]) -> fmt::Result {
    writeln!(f, "{title}")?;
    writeln!(f, "  {:<20} {:>6}  centroid / range", "group", "cells")?;
    for g in groups {
        let ranges: Vec<String> = g
            .min
            .iter()
            .zip(&g.max)
            .map(|(lo, hi)| format!("[{lo:.2}, {hi:.2}]"))
            .collect();
        writeln!(
            f,
            "  {:<20} {:>6}  ({}) {}",
            g.group,
            g.n_cells,
            join_f64(&g.centroid, 2),
            ranges.join(" x ")
        )?;
    }
    Ok(())
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let qc = &self.qc;
        writeln!(f, "== Quality control ==")?;
        writeln!(f, "  {} peaks x {} cells", qc.n_peaks, qc.n_cells)?;
        writeln!(f, "  {:<10} {:>10} {:>10} {:>10} {:>10}", "", "min", "median", "mean", "max")?;
        for (name, d) in [("nCount", &qc.n_count), ("nFeature", &qc.n_feature)] {
            writeln!(
                f,
                "  {:<10} {:>10.1} {:>10.1} {:>10.1} {:>10.1}",
                name, d.min, d.median, d.mean, d.max
            )?;
        }

        writeln!(f)?;
        writeln!(f, "== Latent space (LSI) ==")?;
        writeln!(f, "  {} dimensions", self.latent.n_dims)?;
        let shown = self.latent.singular_values.len().min(10);
        writeln!(
            f,
            "  singular values: {}",
            join_f64(&self.latent.singular_values[..shown], 3)
        )?;
        writeln!(
            f,
            "  variance ratio:  {}",
            join_f64(&self.latent.variance_ratio[..shown], 3)
        )?;

        writeln!(f)?;
        let c = &self.clusters;
        writeln!(f, "== Clusters ==")?;
        writeln!(
            f,
            "  {} clusters from a {}-NN graph with {} edges, modularity {:.4}",
            c.n_clusters, c.n_neighbors, c.n_edges, c.modularity
        )?;
        for (i, size) in c.sizes.iter().enumerate() {
            writeln!(f, "  cluster {i:<4} {size:>6} cells")?;
        }

        writeln!(f)?;
        write_groups(f, "== t-SNE embedding by cluster ==", &self.embedding_by_cluster)?;
        writeln!(f)?;
        write_groups(f, "== t-SNE embedding by cell type ==", &self.embedding_by_label)?;

        writeln!(f)?;
        let comp = &self.composition;
        writeln!(f, "== Cluster composition ==")?;
        write!(f, "  {:<8}", "cluster")?;
        for t in &comp.cell_types {
            write!(f, " {t:>14}")?;
        }
        writeln!(f)?;
        for (i, row) in comp.counts.iter().enumerate() {
            write!(f, "  {i:<8}")?;
            for n in row {
                write!(f, " {n:>14}")?;
            }
            writeln!(f)?;
        }
        writeln!(f, "  NMI {:.4}, ARI {:.4}", comp.nmi, comp.ari)?;

        writeln!(f)?;
        let m = &self.models;
        writeln!(
            f,
            "== Model comparison: {} vs rest ({}-fold CV on {} cells, {} held out) ==",
            m.target, m.n_folds, m.n_train, m.n_validation
        )?;
        writeln!(
            f,
            "  {:<15} {:<28} {:>17} {:>17}",
            "model", "selected", "accuracy", "kappa"
        )?;
        for row in &m.models {
            let marker = if row.name == m.best { " *" } else { "" };
            writeln!(
                f,
                "  {:<15} {:<28} {:>8.4} ± {:<6.4} {:>8.4} ± {:<6.4}{marker}",
                row.name, row.params, row.mean_accuracy, row.sd_accuracy, row.mean_kappa, row.sd_kappa
            )?;
        }
        writeln!(f, "  best: {}", m.best)?;

        writeln!(f)?;
        let v = &self.validation;
        writeln!(f, "== Validation ({}) ==", m.best)?;
        write!(f, "  {:<14}", "actual \\ pred")?;
        for name in &v.class_names {
            write!(f, " {name:>12}")?;
        }
        writeln!(f)?;
        for (i, name) in v.class_names.iter().enumerate() {
            write!(f, "  {name:<14}")?;
            for j in 0..v.class_names.len() {
                write!(f, " {:>12}", v.confusion.get(i, j))?;
            }
            writeln!(f)?;
        }
        writeln!(
            f,
            "  accuracy {:.4}, kappa {:.4}, no-information rate {:.4}",
            v.accuracy, v.kappa, v.no_information_rate
        )?;
        for s in &v.per_class {
            writeln!(
                f,
                "  {:<14} sensitivity {:.4}, specificity {:.4}, balanced accuracy {:.4}",
                s.class, s.sensitivity, s.specificity, s.balanced_accuracy
            )?;
        }
        Ok(())
    }
}

// ── Output ─────────────────────────────────────────────────────────────────

/// Render `report` as JSON when `path` ends in `.json`, as text otherwise.
pub fn render_for(report: &Report, path: &Path) -> Result<String> {
    let is_json = path
        .extension()
        .is_some_and(|e| e.eq_ignore_ascii_case("json"));
    if is_json {
        report.to_json()
    } else {
        Ok(report.to_string())
    }
}

/// Write `report` to `path`, choosing the format from the extension.
pub fn write_report(report: &Report, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let text = render_for(report, path)?;
    fs::write(path, text).map_err(|e| {
        ScatacError::Io(std::io::Error::new(
            e.kind(),
            format!("{}: {}", path.display(), e),
        ))
    })?;
    info!("wrote report to {}", path.display());
    Ok(())
}

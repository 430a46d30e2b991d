use std::collections::BTreeMap;

use scatac_core::ScatacError;
use scatac_ml::svd::SvdConfig;
use scatac_ml::tsne::TsneConfig;
use scatac_ml::BenchmarkConfig;
use scatac_omics::pipeline::{run, run_positional, PipelineConfig};
use scatac_omics::sc_classify::ClassifyConfig;
use scatac_omics::sc_cluster::{build_neighbor_graph, cluster, ClusterConfig, NeighborsConfig};
use scatac_omics::sc_normalize::tfidf;
use scatac_omics::sc_reduce::reduce;
use scatac_omics::CountMatrix;

fn names(prefix: &str, n: usize) -> Vec<String> {
    (0..n).map(|i| format!("{prefix}{i}")).collect()
}

const CELL_TYPES: [&str; 3] = ["Astrocytes", "Oligodendrocytes", "Microglia"];

/// `n_cells` cells of three types; each type opens its own block of peaks
/// with a sprinkle of shared background.
fn synthetic(n_cells: usize, peaks_per_type: usize) -> (CountMatrix, Vec<String>) {
    let n_peaks = peaks_per_type * CELL_TYPES.len();
    let rows = (0..n_peaks)
        .map(|p| {
            (0..n_cells)
                .map(|c| {
                    let own_block = p / peaks_per_type == c % CELL_TYPES.len();
                    let noise = (c * 7 + p * 3) % 11;
                    if own_block && noise != 0 {
                        1.0 + ((c + p) % 3) as f64
                    } else if noise == 5 {
                        1.0
                    } else {
                        0.0
                    }
                })
                .collect()
        })
        .collect();
    let counts = CountMatrix::from_rows(rows, names("peak", n_peaks), names("cell", n_cells)).unwrap();
    let labels = (0..n_cells)
        .map(|c| CELL_TYPES[c % CELL_TYPES.len()].to_string())
        .collect();
    (counts, labels)
}

fn small_config() -> PipelineConfig {
    PipelineConfig {
        svd: SvdConfig {
            n_components: 5,
            ..Default::default()
        },
        neighbors: NeighborsConfig { k: 8 },
        tsne: TsneConfig {
            perplexity: 5.0,
            n_iter: 300,
            ..Default::default()
        },
        classify: ClassifyConfig {
            benchmark: BenchmarkConfig {
                n_folds: 3,
                ..Default::default()
            },
            ..Default::default()
        },
        ..Default::default()
    }
}

#[test]
fn disjoint_column_groups_give_two_clusters() {
    // 10 peaks x 4 cells; cells 0-1 open peaks 0-4, cells 2-3 open peaks 5-9
    let rows = (0..10)
        .map(|p| {
            (0..4)
                .map(|c| if (p < 5) == (c < 2) { 1.0 + (p % 2) as f64 } else { 0.0 })
                .collect()
        })
        .collect();
    let counts = CountMatrix::from_rows(rows, names("peak", 10), names("cell", 4)).unwrap();

    let normalized = tfidf(&counts).unwrap();
    let latent = reduce(
        &normalized,
        &SvdConfig {
            n_components: 2,
            ..Default::default()
        },
    )
    .unwrap();
    let graph = build_neighbor_graph(&latent, &NeighborsConfig { k: 1 }).unwrap();
    let clusters = cluster(&graph, &ClusterConfig::default()).unwrap();

    assert_eq!(clusters.n_clusters(), 2);
    assert_eq!(clusters.ids[0], clusters.ids[1]);
    assert_eq!(clusters.ids[2], clusters.ids[3]);
    assert_ne!(clusters.ids[0], clusters.ids[2]);
}

#[test]
fn all_zero_column_normalizes_to_zero() {
    let counts = CountMatrix::from_rows(
        vec![
            vec![2.0, 0.0, 1.0, 0.0],
            vec![0.0, 0.0, 3.0, 1.0],
            vec![1.0, 0.0, 0.0, 4.0],
        ],
        names("peak", 3),
        names("cell", 4),
    )
    .unwrap();
    let normalized = tfidf(&counts).unwrap();
    let dense = normalized.matrix().to_dense();
    assert!(dense.column(1).iter().all(|&v| v == 0.0));
    assert!(dense.column(0).iter().any(|&v| v > 0.0));
}

#[test]
fn label_count_mismatch_fails_before_training() {
    let (counts, mut labels) = synthetic(30, 6);
    labels.pop();
    let err = run_positional(&counts, labels, &small_config()).unwrap_err();
    assert!(matches!(err, ScatacError::JoinMismatch(_)), "{err}");
}

#[test]
fn unknown_cell_id_names_offender() {
    let (counts, labels) = synthetic(30, 6);
    let mut table: BTreeMap<String, String> = counts.cell_ids().iter().cloned().zip(labels).collect();
    table.remove("cell3");
    table.insert("stray-barcode".into(), "Astrocytes".into());
    let err = run(&counts, &table, &small_config()).unwrap_err();
    let msg = err.to_string();
    assert!(matches!(err, ScatacError::JoinMismatch(_)));
    assert!(msg.contains("cell3"));
    assert!(msg.contains("stray-barcode"));
}

#[test]
fn fifty_components_on_ten_cells_is_rank_error() {
    let (counts, labels) = synthetic(10, 20);
    let config = PipelineConfig {
        svd: SvdConfig {
            n_components: 50,
            ..Default::default()
        },
        tsne: TsneConfig {
            perplexity: 3.0,
            ..Default::default()
        },
        ..small_config()
    };
    let err = run_positional(&counts, labels, &config).unwrap_err();
    assert!(matches!(err, ScatacError::Rank(_)), "{err}");

    let normalized = tfidf(&counts).unwrap();
    assert!(matches!(
        reduce(&normalized, &config.svd),
        Err(ScatacError::Rank(_))
    ));
}

#[test]
fn single_class_labels_are_degenerate() {
    let (counts, _) = synthetic(30, 6);
    let labels = vec!["Microglia".to_string(); 30];
    let err = run_positional(&counts, labels, &small_config()).unwrap_err();
    assert!(matches!(err, ScatacError::DegenerateInput(_)));
}

#[test]
fn single_astrocyte_is_partition_error_before_numeric_work() {
    let (counts, mut labels) = synthetic(40, 6);
    for (c, label) in labels.iter_mut().enumerate() {
        if label == "Astrocytes" && c != 0 {
            *label = "Microglia".into();
        }
    }
    // the default perplexity of 30 is too large for 40 cells, but the
    // label check runs first
    let config = PipelineConfig {
        svd: SvdConfig {
            n_components: 3,
            ..Default::default()
        },
        ..PipelineConfig::default()
    };
    let err = run_positional(&counts, labels, &config).unwrap_err();
    assert!(matches!(err, ScatacError::Partition(_)), "{err}");
    assert!(err.to_string().contains("'Astrocytes' has 1 member"));
}

#[test]
fn oversized_perplexity_fails_before_reduction() {
    let (counts, labels) = synthetic(30, 6);
    // 50 components would be a rank error, so reaching the reducer would
    // change the error kind
    let config = PipelineConfig {
        svd: SvdConfig {
            n_components: 50,
            ..Default::default()
        },
        tsne: TsneConfig {
            perplexity: 30.0,
            ..Default::default()
        },
        ..small_config()
    };
    let err = run_positional(&counts, labels, &config).unwrap_err();
    assert!(matches!(err, ScatacError::InvalidInput(_)), "{err}");
    assert!(err.to_string().contains("perplexity 30"));
}

#[test]
fn full_run_on_synthetic_cells() {
    let (counts, labels) = synthetic(60, 8);
    let out = run_positional(&counts, labels, &small_config()).unwrap();

    assert_eq!(out.n_peaks, 24);
    assert_eq!(out.qc.n_count.len(), 60);
    assert_eq!(out.latent.n_dims(), 5);
    assert_eq!(out.embedding.coords.dim(), (60, 2));
    assert_eq!(out.records.len(), 60);
    assert_eq!(out.records[1].label, "Oligo");
    assert!(out.records.iter().all(|r| r.cluster.is_some()));

    // every cell in exactly one cluster
    assert_eq!(out.clusters.ids.len(), 60);
    assert_eq!(out.clusters.sizes().iter().sum::<usize>(), 60);
    assert!(out.clusters.n_clusters() >= 2);

    assert_eq!(out.composition.cell_types, vec!["Astrocytes", "Microglia", "Oligo"]);
    assert!(out.composition.nmi > 0.5);

    let cls = &out.classification;
    assert_eq!(cls.n_target, 20);
    assert_eq!(cls.benchmark.results.len(), 5);
    let split = &cls.benchmark.split;
    assert_eq!(split.train.len() + split.validation.len(), 60);
    assert!(split.train.iter().all(|i| !split.validation.contains(i)));
    assert_eq!(cls.validation.confusion.total(), split.validation.len());
}

#[test]
fn fixed_seed_is_reproducible() {
    let (counts, labels) = synthetic(45, 6);
    let config = small_config().with_seed(11);
    let a = run_positional(&counts, labels.clone(), &config).unwrap();
    let b = run_positional(&counts, labels, &config).unwrap();

    assert_eq!(a.latent.coords(), b.latent.coords());
    assert_eq!(a.clusters.ids, b.clusters.ids);
    assert_eq!(a.embedding.coords, b.embedding.coords);
    assert_eq!(a.classification.benchmark.split, b.classification.benchmark.split);
    for (x, y) in a
        .classification
        .benchmark
        .results
        .iter()
        .zip(&b.classification.benchmark.results)
    {
        assert_eq!(x.params, y.params);
        assert_eq!(x.cv.mean_accuracy, y.cv.mean_accuracy);
    }
    assert_eq!(a.classification.validation.confusion, b.classification.validation.confusion);
}

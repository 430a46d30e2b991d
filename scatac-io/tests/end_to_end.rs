#![cfg(feature = "csv")]

use std::fmt::Write as _;
use std::fs;

use scatac_io::csv::{read_count_matrix, read_labels};
use scatac_io::report::{render_for, write_report, Report};
use scatac_ml::svd::SvdConfig;
use scatac_ml::tsne::TsneConfig;
use scatac_ml::BenchmarkConfig;
use scatac_omics::sc_classify::ClassifyConfig;
use scatac_omics::{run_positional, NeighborsConfig, PipelineConfig};
use tempfile::TempDir;

const CELL_TYPES: [&str; 3] = ["Astrocytes", "Oligodendrocytes", "Microglia"];

/// Write a 24-peak x 45-cell count table and a matching label table.
fn write_inputs(dir: &TempDir) -> (std::path::PathBuf, std::path::PathBuf) {
    let n_cells = 45;
    let n_peaks = 24;
    let mut counts = String::from("peak");
    for c in 0..n_cells {
        write!(counts, ",cell-{c}").unwrap();
    }
    counts.push('\n');
    for p in 0..n_peaks {
        write!(counts, "chr1:{}-{}", p * 1000, p * 1000 + 500).unwrap();
        for c in 0..n_cells {
            let open = p / 8 == c % 3 && (c * 5 + p) % 9 != 0;
            write!(counts, ",{}", if open { 1 + (c + p) % 3 } else { 0 }).unwrap();
        }
        counts.push('\n');
    }

    let mut labels = String::from("barcode,celltype\n");
    for c in 0..n_cells {
        writeln!(labels, "cell-{c},{}", CELL_TYPES[c % 3]).unwrap();
    }

    let counts_path = dir.path().join("counts.csv");
    let labels_path = dir.path().join("labels.csv");
    fs::write(&counts_path, counts).unwrap();
    fs::write(&labels_path, labels).unwrap();
    (counts_path, labels_path)
}

fn config() -> PipelineConfig {
    PipelineConfig {
        svd: SvdConfig {
            n_components: 4,
            ..Default::default()
        },
        neighbors: NeighborsConfig { k: 6 },
        tsne: TsneConfig {
            perplexity: 5.0,
            n_iter: 250,
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
fn files_to_text_and_json_report() {
    let dir = TempDir::new().unwrap();
    let (counts_path, labels_path) = write_inputs(&dir);

    let counts = read_count_matrix(&counts_path).unwrap();
    let labels = read_labels(&labels_path, None).unwrap();
    assert_eq!(counts.shape(), (24, 45));
    assert_eq!(labels.len(), 45);

    let out = run_positional(&counts, labels, &config()).unwrap();
    let report = Report::from_output(&out);
    assert_eq!(report.qc.n_cells, 45);
    assert_eq!(report.models.models.len(), 5);
    assert_eq!(report.cells.len(), 45);
    assert_eq!(report.embedding_by_label.len(), 3);
    let ratio_sum: f64 = report.latent.variance_ratio.iter().sum();
    assert!((ratio_sum - 1.0).abs() < 1e-9);

    let text_path = dir.path().join("report.txt");
    write_report(&report, &text_path).unwrap();
    let text = fs::read_to_string(&text_path).unwrap();
    for section in [
        "== Quality control ==",
        "== Latent space (LSI) ==",
        "== Clusters ==",
        "== t-SNE embedding by cluster ==",
        "== Cluster composition ==",
        "== Model comparison: Astrocytes vs rest",
        "== Validation",
    ] {
        assert!(text.contains(section), "missing {section}");
    }
    for model in ["lda", "cart", "knn", "svm_rbf", "random_forest"] {
        assert!(text.contains(model), "missing {model}");
    }
    assert!(text.contains("Oligo"));

    let json_path = dir.path().join("report.json");
    write_report(&report, &json_path).unwrap();
    let json: serde_json::Value = serde_json::from_str(&fs::read_to_string(&json_path).unwrap()).unwrap();
    assert_eq!(json["qc"]["n_cells"], 45);
    assert_eq!(json["models"]["models"].as_array().unwrap().len(), 5);
    assert_eq!(json["validation"]["class_names"][1], "Astrocytes");
    assert_eq!(json["cells"].as_array().unwrap().len(), 45);

    assert!(render_for(&report, std::path::Path::new("x.JSON")).unwrap().starts_with('{'));
    assert!(render_for(&report, std::path::Path::new("x.txt")).unwrap().starts_with("=="));
}

#[test]
fn short_label_file_is_join_mismatch() {
    let dir = TempDir::new().unwrap();
    let (counts_path, _) = write_inputs(&dir);
    let labels_path = dir.path().join("short.tsv");
    fs::write(&labels_path, "celltype\nAstrocytes\nMicroglia\n").unwrap();

    let counts = read_count_matrix(&counts_path).unwrap();
    let labels = read_labels(&labels_path, Some("celltype")).unwrap();
    let err = run_positional(&counts, labels, &config()).unwrap_err();
    assert!(matches!(err, scatac_core::ScatacError::JoinMismatch(_)));
}

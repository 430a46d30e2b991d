use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use log::{error, info};
use scatac_io::csv::{read_count_matrix, read_labels};
use scatac_io::report::{write_report, Report};
use scatac_omics::{run_positional, PipelineConfig};

/// Cluster scATAC-seq cells and classify astrocytes from a peak-by-cell
/// count matrix and a per-cell label table.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Peak x cell count table (.csv, .tsv or .txt, optionally gzipped)
    #[arg(value_name = "COUNTS")]
    counts: PathBuf,

    /// Label table with one row per cell, in count-matrix column order
    #[arg(value_name = "LABELS")]
    labels: PathBuf,

    /// Report destination; JSON when it ends in .json, stdout when omitted
    #[arg(short, long, value_name = "REPORT")]
    output: Option<PathBuf>,

    /// Pipeline configuration as JSON; omitted fields keep their defaults
    #[arg(long, value_name = "CONFIG.json")]
    config: Option<PathBuf>,
}

fn load_config(path: Option<&Path>) -> Result<PipelineConfig> {
    let Some(path) = path else {
        return Ok(PipelineConfig::default());
    };
    let text = fs::read_to_string(path)
        .with_context(|| format!("reading config {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing config {}", path.display()))
}

fn run(cli: &Cli) -> Result<()> {
    let start = Instant::now();
    let config = load_config(cli.config.as_deref())?;

    let counts = read_count_matrix(&cli.counts)
        .with_context(|| format!("reading counts {}", cli.counts.display()))?;
    let labels = read_labels(&cli.labels, config.label_column.as_deref())
        .with_context(|| format!("reading labels {}", cli.labels.display()))?;

    let output = run_positional(&counts, labels, &config)?;
    let report = Report::from_output(&output);

    match &cli.output {
        Some(path) => write_report(&report, path)?,
        None => print!("{report}"),
    }
    info!("done in {:.2?}", start.elapsed());
    Ok(())
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let cli = Cli::parse();
    info!("scatac {}: {:?}", env!("CARGO_PKG_VERSION"), cli);

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

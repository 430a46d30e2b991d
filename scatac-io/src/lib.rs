//! Input readers and report writers for the scATAC pipeline.
//!
//! - **CSV/TSV** — count matrix and label table readers, via the `csv` feature (enabled by default)
//! - **Report** — text and JSON rendering of a pipeline run

#[cfg(feature = "csv")]
pub mod csv;

pub mod report;

pub use report::{write_report, Report};

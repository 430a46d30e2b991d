//! Peak-by-cell accessibility counts.
//!
//! [`CountMatrix`] wraps a [`SparseMatrix`] (peaks × cells) together with the
//! peak names and cell identifiers that every later stage joins on.

use std::collections::HashSet;

use scatac_core::{Result, ScatacError, Summarizable};
use serde::Serialize;

use crate::sparse::SparseMatrix;

/// A sparse peak × cell count matrix with named rows and identified columns.
#[derive(Debug, Clone)]
pub struct CountMatrix {
    matrix: SparseMatrix,
    peak_names: Vec<String>,
    cell_ids: Vec<String>,
}

impl CountMatrix {
    /// Wrap a sparse matrix of counts.
    ///
    /// Values must be finite and non-negative and cell identifiers unique.
    /// Peaks or cells without any counts are allowed.
    pub fn new(matrix: SparseMatrix, peak_names: Vec<String>, cell_ids: Vec<String>) -> Result<Self> {
        let (n_peaks, n_cells) = matrix.shape();
        if peak_names.len() != n_peaks {
            return Err(ScatacError::InvalidInput(format!(
                "peak_names length ({}) does not match row count ({n_peaks})",
                peak_names.len()
            )));
        }
        if cell_ids.len() != n_cells {
            return Err(ScatacError::InvalidInput(format!(
                "cell_ids length ({}) does not match column count ({n_cells})",
                cell_ids.len()
            )));
        }
        if let Some((r, c, v)) = matrix.iter().find(|&(_, _, v)| !v.is_finite() || v < 0.0) {
            return Err(ScatacError::InvalidInput(format!(
                "count at peak '{}', cell '{}' is {v}; counts must be finite and >= 0",
                peak_names[r], cell_ids[c]
            )));
        }
        let mut seen = HashSet::with_capacity(n_cells);
        for id in &cell_ids {
            if !seen.insert(id.as_str()) {
                return Err(ScatacError::InvalidInput(format!("duplicate cell id '{id}'")));
            }
        }
        Ok(Self {
            matrix,
            peak_names,
            cell_ids,
        })
    }

    /// Build from dense rows, one `Vec` per peak with one value per cell.
    pub fn from_rows(
        rows: Vec<Vec<f64>>,
        peak_names: Vec<String>,
        cell_ids: Vec<String>,
    ) -> Result<Self> {
        let n_cells = cell_ids.len();
        let (mut r_idx, mut c_idx, mut values) = (Vec::new(), Vec::new(), Vec::new());
        for (r, row) in rows.iter().enumerate() {
            if row.len() != n_cells {
                return Err(ScatacError::InvalidInput(format!(
                    "row {r} has {} columns, expected {n_cells}",
                    row.len()
                )));
            }
            for (c, &v) in row.iter().enumerate() {
                if v != 0.0 {
                    r_idx.push(r);
                    c_idx.push(c);
                    values.push(v);
                }
            }
        }
        let matrix = SparseMatrix::from_triplets(r_idx, c_idx, values, rows.len(), n_cells)?;
        Self::new(matrix, peak_names, cell_ids)
    }

    /// (n_peaks, n_cells).
    pub fn shape(&self) -> (usize, usize) {
        self.matrix.shape()
    }

    pub fn n_peaks(&self) -> usize {
        self.peak_names.len()
    }

    pub fn n_cells(&self) -> usize {
        self.cell_ids.len()
    }

    pub fn matrix(&self) -> &SparseMatrix {
        &self.matrix
    }

    pub fn peak_names(&self) -> &[String] {
        &self.peak_names
    }

    pub fn cell_ids(&self) -> &[String] {
        &self.cell_ids
    }

    /// Total counts per cell (nCount).
    pub fn n_count(&self) -> Vec<f64> {
        self.matrix.col_sums()
    }

    /// Number of peaks with a non-zero count per cell (nFeature).
    pub fn n_feature(&self) -> Vec<usize> {
        self.matrix.col_nnz()
    }

    /// Per-cell library size and complexity summary.
    pub fn qc(&self) -> QcSummary {
        let n_count = self.n_count();
        let n_feature = self.n_feature();
        let as_f64: Vec<f64> = n_feature.iter().map(|&x| x as f64).collect();
        QcSummary {
            n_count_stats: Distribution::of(&n_count),
            n_feature_stats: Distribution::of(&as_f64),
            n_count,
            n_feature,
        }
    }
}

impl Summarizable for CountMatrix {
    fn summary(&self) -> String {
        format!(
            "CountMatrix: {} peaks \u{00d7} {} cells, {} nonzeros",
            self.n_peaks(),
            self.n_cells(),
            self.matrix.nnz()
        )
    }
}

// ── QC ─────────────────────────────────────────────────────────────────────

/// Five-number-style summary of a per-cell quantity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Distribution {
    pub min: f64,
    pub median: f64,
    pub mean: f64,
    pub max: f64,
}

impl Distribution {
    /// Summarize `values`; all fields are 0 for an empty slice.
    pub fn of(values: &[f64]) -> Self {
        if values.is_empty() {
            return Self {
                min: 0.0,
                median: 0.0,
                mean: 0.0,
                max: 0.0,
            };
        }
        let mut sorted = values.to_vec();
        sorted.sort_by(|a, b| a.total_cmp(b));
        let n = sorted.len();
        let median = if n % 2 == 1 {
            sorted[n / 2]
        } else {
            (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
        };
        Self {
            min: sorted[0],
            median,
            mean: sorted.iter().sum::<f64>() / n as f64,
            max: sorted[n - 1],
        }
    }
}

/// Per-cell nCount / nFeature and their distributions.
#[derive(Debug, Clone, Serialize)]
pub struct QcSummary {
    /// Total counts per cell.
    pub n_count: Vec<f64>,
    /// Accessible peaks per cell.
    pub n_feature: Vec<usize>,
    pub n_count_stats: Distribution,
    pub n_feature_stats: Distribution,
}

impl Summarizable for QcSummary {
    fn summary(&self) -> String {
        format!(
            "QC: {} cells, median nCount {:.1}, median nFeature {:.1}",
            self.n_count.len(),
            self.n_count_stats.median,
            self.n_feature_stats.median
        )
    }
}

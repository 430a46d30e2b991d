//! TF-IDF normalization of accessibility counts.

use log::info;
use scatac_core::{Result, ScatacError, Summarizable};

use crate::counts::CountMatrix;
use crate::sparse::SparseMatrix;

// ── Normalized matrix ──────────────────────────────────────────────────────

/// TF-IDF weighted peak × cell matrix.
///
/// Same shape and identifiers as the [`CountMatrix`] it came from; every
/// value is finite and non-negative.
#[derive(Debug, Clone)]
pub struct NormalizedMatrix {
    matrix: SparseMatrix,
    peak_names: Vec<String>,
    cell_ids: Vec<String>,
}

impl NormalizedMatrix {
    pub fn matrix(&self) -> &SparseMatrix {
        &self.matrix
    }

    pub fn peak_names(&self) -> &[String] {
        &self.peak_names
    }

    pub fn cell_ids(&self) -> &[String] {
        &self.cell_ids
    }

    /// (n_peaks, n_cells).
    pub fn shape(&self) -> (usize, usize) {
        self.matrix.shape()
    }
}

impl Summarizable for NormalizedMatrix {
    fn summary(&self) -> String {
        let (p, c) = self.shape();
        format!(
            "NormalizedMatrix: {p} peaks \u{00d7} {c} cells, {} nonzeros",
            self.matrix.nnz()
        )
    }
}

// ── TF-IDF ─────────────────────────────────────────────────────────────────

/// Term-frequency / inverse-document-frequency weighting.
///
/// Counts are binarized first. Each cell's column is divided by its number
/// of accessible peaks, then each peak's row is multiplied by
/// `ln(1 + n_cells / cells_with_peak)`. A cell without counts stays an
/// all-zero column.
///
/// # Errors
///
/// [`ScatacError::DegenerateInput`] if the matrix has no peaks, no cells, or
/// no counts at all.
pub fn tfidf(counts: &CountMatrix) -> Result<NormalizedMatrix> {
    let (n_peaks, n_cells) = counts.shape();
    if n_peaks == 0 || n_cells == 0 {
        return Err(ScatacError::DegenerateInput(format!(
            "count matrix is empty ({n_peaks} peaks \u{00d7} {n_cells} cells)"
        )));
    }
    let m = counts.matrix();
    if m.nnz() == 0 {
        return Err(ScatacError::DegenerateInput(
            "every cell has zero total count".into(),
        ));
    }

    // Binarized marginals: stored entries are exactly the positive counts.
    let peaks_per_cell = m.col_nnz();
    let cells_per_peak = m.row_nnz();
    let idf: Vec<f64> = cells_per_peak
        .iter()
        .map(|&c| (1.0 + n_cells as f64 / c as f64).ln())
        .collect();

    let matrix = m.map_entries(|r, c, _| {
        let v = idf[r] / peaks_per_cell[c] as f64;
        if v.is_finite() {
            v
        } else {
            0.0
        }
    });

    let empty_cells = peaks_per_cell.iter().filter(|&&n| n == 0).count();
    info!(
        "tfidf: {n_peaks} peaks \u{00d7} {n_cells} cells, {} nonzeros, {empty_cells} empty cells",
        matrix.nnz()
    );

    Ok(NormalizedMatrix {
        matrix,
        peak_names: counts.peak_names().to_vec(),
        cell_ids: counts.cell_ids().to_vec(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(prefix: &str, n: usize) -> Vec<String> {
        (0..n).map(|i| format!("{prefix}{i}")).collect()
    }

    fn counts(rows: Vec<Vec<f64>>) -> CountMatrix {
        let n_cells = rows[0].len();
        let n_peaks = rows.len();
        CountMatrix::from_rows(rows, ids("peak", n_peaks), ids("cell", n_cells)).unwrap()
    }

    #[test]
    fn hand_computed_weights() {
        // peak0 open in both cells, peak1 only in cell0
        let norm = tfidf(&counts(vec![vec![3.0, 1.0], vec![5.0, 0.0]])).unwrap();
        let dense = norm.matrix().to_dense();
        let idf0 = (1.0 + 2.0 / 2.0_f64).ln();
        let idf1 = (1.0 + 2.0 / 1.0_f64).ln();
        assert!((dense[[0, 0]] - idf0 / 2.0).abs() < 1e-12);
        assert!((dense[[1, 0]] - idf1 / 2.0).abs() < 1e-12);
        assert!((dense[[0, 1]] - idf0).abs() < 1e-12);
        assert_eq!(dense[[1, 1]], 0.0);
    }

    #[test]
    fn binarizes_counts() {
        let a = tfidf(&counts(vec![vec![1.0, 2.0], vec![1.0, 0.0]])).unwrap();
        let b = tfidf(&counts(vec![vec![7.0, 9.0], vec![3.0, 0.0]])).unwrap();
        assert_eq!(a.matrix().to_dense(), b.matrix().to_dense());
    }

    #[test]
    fn zero_column_stays_zero() {
        let norm = tfidf(&counts(vec![vec![1.0, 0.0, 2.0], vec![0.0, 0.0, 1.0]])).unwrap();
        let dense = norm.matrix().to_dense();
        assert!(dense.column(1).iter().all(|&v| v == 0.0));
        assert!(dense.iter().all(|v| v.is_finite() && *v >= 0.0));
    }

    #[test]
    fn identifiers_preserved() {
        let norm = tfidf(&counts(vec![vec![1.0, 1.0]])).unwrap();
        assert_eq!(norm.cell_ids(), &["cell0".to_string(), "cell1".to_string()]);
        assert_eq!(norm.peak_names(), &["peak0".to_string()]);
        assert_eq!(norm.shape(), (1, 2));
    }

    #[test]
    fn all_zero_is_degenerate() {
        let err = tfidf(&counts(vec![vec![0.0, 0.0], vec![0.0, 0.0]])).unwrap_err();
        assert!(matches!(err, ScatacError::DegenerateInput(_)));
    }

    #[test]
    fn empty_is_degenerate() {
        let empty = CountMatrix::new(SparseMatrix::new(0, 0), vec![], vec![]).unwrap();
        assert!(matches!(tfidf(&empty), Err(ScatacError::DegenerateInput(_))));
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn output_non_negative_and_finite(
            (n_peaks, n_cells, values) in (1usize..8, 1usize..8).prop_flat_map(|(p, c)| {
                (Just(p), Just(c), proptest::collection::vec(0u32..5, p * c))
            })
        ) {
            prop_assume!(values.iter().any(|&v| v > 0));
            let rows: Vec<Vec<f64>> = values
                .chunks(n_cells)
                .map(|r| r.iter().map(|&v| v as f64).collect())
                .collect();
            let peaks = (0..n_peaks).map(|i| format!("p{i}")).collect();
            let cells = (0..n_cells).map(|i| format!("c{i}")).collect();
            let counts = CountMatrix::from_rows(rows, peaks, cells).unwrap();
            let norm = tfidf(&counts).unwrap();
            prop_assert_eq!(norm.shape(), (n_peaks, n_cells));
            for (_, _, v) in norm.matrix().iter() {
                prop_assert!(v.is_finite());
                prop_assert!(v >= 0.0);
            }
        }
    }
}

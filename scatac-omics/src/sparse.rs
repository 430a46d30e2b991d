//! Coordinate-format (COO) sparse matrix.
//!
//! [`SparseMatrix`] stores non-zero entries as `(row, col, value)` triplets,
//! the natural import format for peak-by-cell count matrices. It implements
//! [`LinearOperator`] so the randomized SVD can multiply it with dense blocks
//! without ever densifying it.

use ndarray::Array2;
use scatac_core::{Result, ScatacError, Summarizable};
use scatac_ml::LinearOperator;

/// A sparse matrix in COO (coordinate) format.
///
/// Each `(row, col)` position is stored at most once.
#[derive(Debug, Clone, PartialEq)]
pub struct SparseMatrix {
    rows: Vec<usize>,
    cols: Vec<usize>,
    values: Vec<f64>,
    n_rows: usize,
    n_cols: usize,
}

impl SparseMatrix {
    /// Create an empty sparse matrix with the given dimensions.
    pub fn new(n_rows: usize, n_cols: usize) -> Self {
        Self {
            rows: Vec::new(),
            cols: Vec::new(),
            values: Vec::new(),
            n_rows,
            n_cols,
        }
    }

    /// Create a sparse matrix from triplet vectors.
    ///
    /// All three vectors must have the same length, all indices must be in
    /// bounds and no position may repeat. Explicit zeros are dropped.
    pub fn from_triplets(
        rows: Vec<usize>,
        cols: Vec<usize>,
        values: Vec<f64>,
        n_rows: usize,
        n_cols: usize,
    ) -> Result<Self> {
        if rows.len() != cols.len() || cols.len() != values.len() {
            return Err(ScatacError::InvalidInput(
                "rows, cols, and values must have the same length".into(),
            ));
        }
        let mut seen = std::collections::HashSet::with_capacity(rows.len());
        for (i, (&r, &c)) in rows.iter().zip(cols.iter()).enumerate() {
            if r >= n_rows || c >= n_cols {
                return Err(ScatacError::InvalidInput(format!(
                    "triplet {i} index ({r}, {c}) out of bounds for ({n_rows}, {n_cols})"
                )));
            }
            if !seen.insert((r, c)) {
                return Err(ScatacError::InvalidInput(format!(
                    "duplicate entry at ({r}, {c})"
                )));
            }
        }
        let mut m = Self::new(n_rows, n_cols);
        for ((r, c), v) in rows.into_iter().zip(cols).zip(values) {
            if v != 0.0 {
                m.rows.push(r);
                m.cols.push(c);
                m.values.push(v);
            }
        }
        Ok(m)
    }

    /// Get the value at `(row, col)`. Returns 0.0 if no entry is stored.
    ///
    /// This is an O(nnz) scan.
    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.iter()
            .find(|&(r, c, _)| r == row && c == col)
            .map_or(0.0, |(_, _, v)| v)
    }

    /// Number of stored (non-zero) entries.
    pub fn nnz(&self) -> usize {
        self.values.len()
    }

    /// Fraction of entries that are stored: `nnz / (n_rows * n_cols)`.
    pub fn density(&self) -> f64 {
        let total = self.n_rows as f64 * self.n_cols as f64;
        if total == 0.0 {
            return 0.0;
        }
        self.values.len() as f64 / total
    }

    /// (n_rows, n_cols).
    pub fn shape(&self) -> (usize, usize) {
        (self.n_rows, self.n_cols)
    }

    /// Convert to a dense matrix.
    pub fn to_dense(&self) -> Array2<f64> {
        let mut dense = Array2::zeros((self.n_rows, self.n_cols));
        for (r, c, v) in self.iter() {
            dense[[r, c]] = v;
        }
        dense
    }

    /// Sum of each row.
    pub fn row_sums(&self) -> Vec<f64> {
        let mut sums = vec![0.0; self.n_rows];
        for (r, _, v) in self.iter() {
            sums[r] += v;
        }
        sums
    }

    /// Sum of each column.
    pub fn col_sums(&self) -> Vec<f64> {
        let mut sums = vec![0.0; self.n_cols];
        for (_, c, v) in self.iter() {
            sums[c] += v;
        }
        sums
    }

    /// Number of stored entries in each row.
    pub fn row_nnz(&self) -> Vec<usize> {
        let mut counts = vec![0; self.n_rows];
        for &r in &self.rows {
            counts[r] += 1;
        }
        counts
    }

    /// Number of stored entries in each column.
    pub fn col_nnz(&self) -> Vec<usize> {
        let mut counts = vec![0; self.n_cols];
        for &c in &self.cols {
            counts[c] += 1;
        }
        counts
    }

    /// New matrix with the same sparsity pattern and `f(row, col, value)` at
    /// every stored position. Results equal to zero are dropped.
    pub fn map_entries<F>(&self, mut f: F) -> Self
    where
        F: FnMut(usize, usize, f64) -> f64,
    {
        let mut out = Self::new(self.n_rows, self.n_cols);
        for (r, c, v) in self.iter() {
            let nv = f(r, c, v);
            if nv != 0.0 {
                out.rows.push(r);
                out.cols.push(c);
                out.values.push(nv);
            }
        }
        out
    }

    /// Iterate over stored triplets `(row, col, value)`.
    pub fn iter(&self) -> impl Iterator<Item = (usize, usize, f64)> + '_ {
        self.rows
            .iter()
            .zip(self.cols.iter())
            .zip(self.values.iter())
            .map(|((&r, &c), &v)| (r, c, v))
    }
}

impl LinearOperator for SparseMatrix {
    fn shape(&self) -> (usize, usize) {
        (self.n_rows, self.n_cols)
    }

    fn apply(&self, x: &Array2<f64>) -> Array2<f64> {
        let mut out = Array2::zeros((self.n_rows, x.ncols()));
        for (r, c, v) in self.iter() {
            out.row_mut(r).scaled_add(v, &x.row(c));
        }
        out
    }

    fn apply_transpose(&self, x: &Array2<f64>) -> Array2<f64> {
        let mut out = Array2::zeros((self.n_cols, x.ncols()));
        for (r, c, v) in self.iter() {
            out.row_mut(c).scaled_add(v, &x.row(r));
        }
        out
    }
}

impl Summarizable for SparseMatrix {
    fn summary(&self) -> String {
        format!(
            "SparseMatrix: {}\u{00d7}{}, {} nonzeros ({:.2}% density)",
            self.n_rows,
            self.n_cols,
            self.nnz(),
            self.density() * 100.0
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn sample() -> SparseMatrix {
        // [[1, 0, 2],
        //  [0, 3, 0]]
        SparseMatrix::from_triplets(vec![0, 0, 1], vec![0, 2, 1], vec![1.0, 2.0, 3.0], 2, 3)
            .unwrap()
    }

    #[test]
    fn new_empty() {
        let m = SparseMatrix::new(3, 4);
        assert_eq!(m.shape(), (3, 4));
        assert_eq!(m.nnz(), 0);
        assert_eq!(m.get(1, 1), 0.0);
    }

    #[test]
    fn from_triplets_bounds_and_duplicates() {
        assert!(SparseMatrix::from_triplets(vec![2], vec![0], vec![1.0], 2, 2).is_err());
        let err = SparseMatrix::from_triplets(vec![0, 0], vec![1, 1], vec![1.0, 2.0], 2, 2).unwrap_err();
        assert!(err.to_string().contains("duplicate entry at (0, 1)"));
        // a repeated position is rejected even when one of the values is zero
        assert!(SparseMatrix::from_triplets(vec![1, 1], vec![0, 0], vec![0.0, 2.0], 2, 2).is_err());
        assert!(SparseMatrix::from_triplets(vec![0], vec![0, 1], vec![1.0], 2, 2).is_err());
    }

    #[test]
    fn explicit_zeros_dropped() {
        let m = SparseMatrix::from_triplets(vec![0, 1], vec![0, 1], vec![0.0, 5.0], 2, 2).unwrap();
        assert_eq!(m.nnz(), 1);
    }

    #[test]
    fn sums_and_counts() {
        let m = sample();
        assert_eq!(m.row_sums(), vec![3.0, 3.0]);
        assert_eq!(m.col_sums(), vec![1.0, 3.0, 2.0]);
        assert_eq!(m.row_nnz(), vec![2, 1]);
        assert_eq!(m.col_nnz(), vec![1, 1, 1]);
    }

    #[test]
    fn to_dense_layout() {
        assert_eq!(sample().to_dense(), array![[1.0, 0.0, 2.0], [0.0, 3.0, 0.0]]);
    }

    #[test]
    fn map_entries_keeps_pattern() {
        let m = sample().map_entries(|r, _, v| v * (r + 1) as f64);
        assert_eq!(m.get(1, 1), 6.0);
        assert_eq!(m.get(0, 2), 2.0);
        assert_eq!(sample().map_entries(|_, _, _| 0.0).nnz(), 0);
    }

    #[test]
    fn linear_operator_matches_dense() {
        let m = sample();
        let dense = m.to_dense();
        let x = array![[1.0, -1.0], [2.0, 0.5], [0.0, 3.0]];
        assert_eq!(m.apply(&x), dense.dot(&x));
        let y = array![[1.0], [2.0]];
        assert_eq!(m.apply_transpose(&y), dense.t().dot(&y));
    }

    #[test]
    fn summary_mentions_shape() {
        let s = sample().summary();
        assert!(s.contains("2\u{00d7}3"));
        assert!(s.contains("3 nonzeros"));
    }
}

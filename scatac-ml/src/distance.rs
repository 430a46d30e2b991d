//! Euclidean distances for neighbor search and embedding.

use scatac_core::{Result, ScatacError};

/// Squared Euclidean distance between two equal-length vectors.
///
/// Unchecked hot-path variant; callers guarantee equal lengths.
#[inline]
pub fn squared_euclidean(a: &[f64], b: &[f64]) -> f64 {
    debug_assert_eq!(a.len(), b.len());
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

/// Euclidean (L2) distance between two vectors.
pub fn euclidean(a: &[f64], b: &[f64]) -> Result<f64> {
    if a.is_empty() {
        return Err(ScatacError::InvalidInput("empty vectors".into()));
    }
    if a.len() != b.len() {
        return Err(ScatacError::InvalidInput(format!(
            "length mismatch: {} vs {}",
            a.len(),
            b.len()
        )));
    }
    Ok(squared_euclidean(a, b).sqrt())
}

/// Indices of the `k` rows of `data` nearest to `query`, nearest first.
///
/// Rows listed in `exclude` are skipped. Equal distances are broken by the
/// lower row index, so the result is fully deterministic.
pub fn nearest_rows(
    data: &[f64],
    n_features: usize,
    query: &[f64],
    k: usize,
    exclude: Option<usize>,
) -> Vec<(usize, f64)> {
    let n = data.len() / n_features;
    let mut dists: Vec<(usize, f64)> = (0..n)
        .filter(|&j| Some(j) != exclude)
        .map(|j| {
            let row = &data[j * n_features..(j + 1) * n_features];
            (j, squared_euclidean(query, row))
        })
        .collect();
    let k = k.min(dists.len());
    let by_distance_then_index = |a: &(usize, f64), b: &(usize, f64)| {
        a.1.partial_cmp(&b.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.0.cmp(&b.0))
    };
    if k < dists.len() {
        dists.select_nth_unstable_by(k, by_distance_then_index);
        dists.truncate(k);
    }
    dists.sort_by(by_distance_then_index);
    dists
}

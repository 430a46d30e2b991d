//! Latent semantic indexing: truncated SVD of the TF-IDF matrix.

use std::time::Instant;

use log::info;
use ndarray::Array2;
use scatac_core::{Result, ScatacError, Summarizable};
use scatac_ml::svd::{randomized_svd, SvdConfig};

use crate::sc_normalize::NormalizedMatrix;

/// Cells × k latent coordinates, rows in count-matrix column order.
#[derive(Debug, Clone)]
pub struct LatentEmbedding {
    cell_ids: Vec<String>,
    coords: Array2<f64>,
    singular_values: Vec<f64>,
}

impl LatentEmbedding {
    /// Wrap precomputed coordinates; one row per cell.
    pub fn new(cell_ids: Vec<String>, coords: Array2<f64>, singular_values: Vec<f64>) -> Result<Self> {
        if coords.nrows() != cell_ids.len() {
            return Err(ScatacError::InvalidInput(format!(
                "{} embedding rows for {} cells",
                coords.nrows(),
                cell_ids.len()
            )));
        }
        if singular_values.len() != coords.ncols() {
            return Err(ScatacError::InvalidInput(format!(
                "{} singular values for {} dimensions",
                singular_values.len(),
                coords.ncols()
            )));
        }
        Ok(Self {
            cell_ids,
            coords,
            singular_values,
        })
    }

    pub fn cell_ids(&self) -> &[String] {
        &self.cell_ids
    }

    pub fn coords(&self) -> &Array2<f64> {
        &self.coords
    }

    pub fn singular_values(&self) -> &[f64] {
        &self.singular_values
    }

    pub fn n_cells(&self) -> usize {
        self.coords.nrows()
    }

    pub fn n_dims(&self) -> usize {
        self.coords.ncols()
    }

    /// Row-major copy of the coordinates.
    pub fn to_flat(&self) -> Vec<f64> {
        self.coords.iter().copied().collect()
    }
}

impl Summarizable for LatentEmbedding {
    fn summary(&self) -> String {
        format!(
            "LatentEmbedding: {} cells \u{00d7} {} dims",
            self.n_cells(),
            self.n_dims()
        )
    }
}

/// Reduce a normalized matrix to `config.n_components` latent dimensions.
///
/// Coordinates are `V · diag(S)` of the truncated SVD, so row `i` describes
/// cell `i`.
///
/// # Errors
///
/// [`ScatacError::Rank`] if the requested dimension is 0, larger than
/// `min(n_peaks, n_cells) - 1`, or larger than the effective rank of the
/// matrix.
pub fn reduce(mat: &NormalizedMatrix, config: &SvdConfig) -> Result<LatentEmbedding> {
    let start = Instant::now();
    let svd = randomized_svd(mat.matrix(), config)?;
    info!(
        "lsi: {} components from {} peaks \u{00d7} {} cells in {:.2?}; {}",
        svd.n_components(),
        mat.shape().0,
        mat.shape().1,
        start.elapsed(),
        svd.summary()
    );
    LatentEmbedding::new(mat.cell_ids().to_vec(), svd.scaled_v(), svd.singular_values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::counts::CountMatrix;
    use crate::sc_normalize::tfidf;

    fn normalized(n_peaks: usize, n_cells: usize) -> NormalizedMatrix {
        let rows = (0..n_peaks)
            .map(|p| {
                (0..n_cells)
                    .map(|c| ((p * 7 + c * 3) % 5) as f64)
                    .collect()
            })
            .collect();
        let peaks = (0..n_peaks).map(|i| format!("p{i}")).collect();
        let cells = (0..n_cells).map(|i| format!("c{i}")).collect();
        tfidf(&CountMatrix::from_rows(rows, peaks, cells).unwrap()).unwrap()
    }

    #[test]
    fn shape_and_order() {
        let mat = normalized(20, 12);
        let config = SvdConfig {
            n_components: 3,
            ..Default::default()
        };
        let emb = reduce(&mat, &config).unwrap();
        assert_eq!(emb.n_cells(), 12);
        assert_eq!(emb.n_dims(), 3);
        assert_eq!(emb.cell_ids()[0], "c0");
        assert_eq!(emb.singular_values().len(), 3);
        assert!(emb.singular_values()[0] >= emb.singular_values()[1]);
    }

    #[test]
    fn too_many_components_is_rank_error() {
        let mat = normalized(60, 10);
        let config = SvdConfig {
            n_components: 50,
            ..Default::default()
        };
        assert!(matches!(reduce(&mat, &config), Err(ScatacError::Rank(_))));
    }

    #[test]
    fn duplicated_cells_limit_the_rank() {
        // every cell has the same profile, so the matrix has rank one
        let rows = vec![vec![1.0; 6], vec![2.0; 6], vec![0.0; 6], vec![3.0; 6], vec![1.0; 6]];
        let peaks = (0..5).map(|i| format!("p{i}")).collect();
        let cells = (0..6).map(|i| format!("c{i}")).collect();
        let mat = tfidf(&CountMatrix::from_rows(rows, peaks, cells).unwrap()).unwrap();

        let two = SvdConfig {
            n_components: 2,
            ..Default::default()
        };
        assert!(matches!(reduce(&mat, &two), Err(ScatacError::Rank(_))));
        let one = SvdConfig {
            n_components: 1,
            ..Default::default()
        };
        assert_eq!(reduce(&mat, &one).unwrap().n_dims(), 1);
    }

    #[test]
    fn reproducible_with_seed() {
        let mat = normalized(15, 10);
        let config = SvdConfig {
            n_components: 4,
            seed: 7,
            ..Default::default()
        };
        let a = reduce(&mat, &config).unwrap();
        let b = reduce(&mat, &config).unwrap();
        assert_eq!(a.coords(), b.coords());
    }

    #[test]
    fn new_checks_rows() {
        let coords = Array2::zeros((3, 2));
        assert!(LatentEmbedding::new(vec!["a".into()], coords, vec![1.0, 0.5]).is_err());
    }
}

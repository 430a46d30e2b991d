//! t-SNE projection of the latent space for display and classification.

use std::time::Instant;

use log::info;
use ndarray::Array2;
use scatac_core::{Result, ScatacError, Summarizable};
use scatac_ml::tsne::{tsne, TsneConfig};

use crate::sc_reduce::LatentEmbedding;

/// Low-dimensional (usually 2-D) coordinates per cell.
#[derive(Debug, Clone)]
pub struct Embedding2D {
    pub cell_ids: Vec<String>,
    pub coords: Array2<f64>,
    pub kl_divergence: f64,
}

impl Embedding2D {
    pub fn n_cells(&self) -> usize {
        self.coords.nrows()
    }

    /// Coordinates of cell `i`.
    pub fn point(&self, i: usize) -> Vec<f64> {
        self.coords.row(i).to_vec()
    }
}

impl Summarizable for Embedding2D {
    fn summary(&self) -> String {
        format!(
            "Embedding2D: {} cells in {}D, KL={:.4}",
            self.n_cells(),
            self.coords.ncols(),
            self.kl_divergence
        )
    }
}

/// Project the latent embedding with exact t-SNE.
///
/// # Errors
///
/// [`ScatacError::InvalidInput`] when the perplexity is too large for the
/// number of cells (`3 · perplexity > n_cells - 1`).
pub fn project(emb: &LatentEmbedding, config: &TsneConfig) -> Result<Embedding2D> {
    let start = Instant::now();
    let result = tsne(&emb.to_flat(), emb.n_dims(), config)?;
    let coords = Array2::from_shape_vec((result.n_samples, result.n_components), result.embedding)
        .map_err(|e| ScatacError::InvalidInput(format!("t-SNE output shape: {e}")))?;
    info!(
        "tsne: {} cells, perplexity {}, {} iterations, KL {:.4} in {:.2?}",
        result.n_samples,
        config.perplexity,
        config.n_iter,
        result.kl_divergence,
        start.elapsed()
    );
    Ok(Embedding2D {
        cell_ids: emb.cell_ids().to_vec(),
        coords,
        kl_divergence: result.kl_divergence,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn latent(n: usize) -> LatentEmbedding {
        let coords = Array2::from_shape_fn((n, 3), |(i, j)| {
            let group = (i % 2) as f64 * 20.0;
            group + ((i * 3 + j) % 7) as f64 * 0.1
        });
        let ids = (0..n).map(|i| format!("cell{i}")).collect();
        LatentEmbedding::new(ids, coords, vec![3.0, 2.0, 1.0]).unwrap()
    }

    fn quick() -> TsneConfig {
        TsneConfig {
            perplexity: 3.0,
            n_iter: 300,
            ..Default::default()
        }
    }

    #[test]
    fn shape_and_ids() {
        let emb = project(&latent(20), &quick()).unwrap();
        assert_eq!(emb.coords.dim(), (20, 2));
        assert_eq!(emb.cell_ids[5], "cell5");
        assert_eq!(emb.point(0).len(), 2);
        assert!(emb.coords.iter().all(|v| v.is_finite()));
        assert!(emb.kl_divergence.is_finite());
    }

    #[test]
    fn seeded_runs_match() {
        let a = project(&latent(15), &quick()).unwrap();
        let b = project(&latent(15), &quick()).unwrap();
        assert_eq!(a.coords, b.coords);
    }

    #[test]
    fn perplexity_too_large() {
        let result = project(&latent(10), &TsneConfig::default());
        assert!(matches!(result, Err(ScatacError::InvalidInput(_))));
    }
}

//! t-distributed Stochastic Neighbor Embedding.
//!
//! Exact O(n²) t-SNE for projecting a latent space into 2D (or 3D) for
//! visualization and as low-dimensional classifier features. Affinities are
//! calibrated per point by binary search on the Gaussian precision to hit the
//! requested perplexity; optimization is gradient descent with momentum,
//! adaptive gains and early exaggeration.

use log::{debug, info};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::StandardNormal;
use scatac_core::{Result, ScatacError, Summarizable};

use crate::distance::squared_euclidean;

/// Configuration for t-SNE.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct TsneConfig {
    /// Output dimensionality (typically 2 or 3).
    pub n_components: usize,
    /// Perplexity: effective number of neighbors (5-50 typical).
    pub perplexity: f64,
    /// Learning rate.
    pub learning_rate: f64,
    /// Number of gradient descent iterations.
    pub n_iter: usize,
    /// Multiplier applied to P during the first `exaggeration_iter` iterations.
    pub early_exaggeration: f64,
    /// Number of early-exaggeration iterations.
    pub exaggeration_iter: usize,
    /// Random seed for the initial layout.
    pub seed: u64,
}

impl Default for TsneConfig {
    fn default() -> Self {
        Self {
            n_components: 2,
            perplexity: 30.0,
            learning_rate: 200.0,
            n_iter: 1000,
            early_exaggeration: 12.0,
            exaggeration_iter: 250,
            seed: 42,
        }
    }
}

/// Result of t-SNE computation.
#[derive(Debug, Clone)]
pub struct TsneResult {
    /// Embedded coordinates, row-major: `n_samples × n_components`.
    pub embedding: Vec<f64>,
    /// Number of samples.
    pub n_samples: usize,
    /// Number of output components.
    pub n_components: usize,
    /// Final KL divergence.
    pub kl_divergence: f64,
}

impl Summarizable for TsneResult {
    fn summary(&self) -> String {
        format!(
            "t-SNE: {} samples in {}D, KL={:.4}",
            self.n_samples, self.n_components, self.kl_divergence,
        )
    }
}

/// Check that `perplexity` is usable for `n_samples` points.
pub fn check_perplexity(perplexity: f64, n_samples: usize) -> Result<()> {
    if perplexity.is_nan() || perplexity <= 0.0 || 3.0 * perplexity > n_samples.saturating_sub(1) as f64 {
        return Err(ScatacError::InvalidInput(format!(
            "perplexity {perplexity} is too large for {n_samples} samples (need 3 * perplexity <= n - 1)"
        )));
    }
    Ok(())
}

/// Run t-SNE on a flat row-major data matrix.
///
/// `data` has shape `n_samples × n_features`.
///
/// # Errors
///
/// Returns an error if the data is empty, dimensions are inconsistent,
/// `n_components` is 0, or the perplexity is too large for the sample count
/// (`3 · perplexity > n_samples - 1`).
pub fn tsne(data: &[f64], n_features: usize, config: &TsneConfig) -> Result<TsneResult> {
    let n = crate::validate_flat(data, n_features)?;
    if n < 2 {
        return Err(ScatacError::InvalidInput("need at least 2 samples".into()));
    }
    if config.n_components == 0 {
        return Err(ScatacError::InvalidInput("n_components must be > 0".into()));
    }
    check_perplexity(config.perplexity, n)?;
    if data.iter().any(|x| !x.is_finite()) {
        return Err(ScatacError::InvalidInput("t-SNE input contains non-finite values".into()));
    }
    let out_dim = config.n_components;

    let sq_dists = pairwise_squared_distances(data, n, n_features);
    let p = compute_joint_probabilities(&sq_dists, n, config.perplexity);
    drop(sq_dists);

    let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
    let mut y: Vec<f64> = (0..n * out_dim)
        .map(|_| 1e-4 * rng.sample::<f64, _>(StandardNormal))
        .collect();
    let mut gains = vec![1.0; n * out_dim];
    let mut velocities = vec![0.0; n * out_dim];

    let momentum_switch = 250;
    let initial_momentum = 0.5;
    let final_momentum = 0.8;

    let mut q_num = vec![0.0; n * n];
    let mut grad = vec![0.0; n * out_dim];
    let mut kl_div = 0.0;

    for iter in 0..config.n_iter {
        let momentum = if iter < momentum_switch {
            initial_momentum
        } else {
            final_momentum
        };
        let exaggeration = if iter < config.exaggeration_iter {
            config.early_exaggeration
        } else {
            1.0
        };

        // Student-t kernel with one degree of freedom
        let mut q_sum = 0.0;
        for i in 0..n {
            for j in (i + 1)..n {
                let d2 = squared_euclidean(
                    &y[i * out_dim..(i + 1) * out_dim],
                    &y[j * out_dim..(j + 1) * out_dim],
                );
                let val = 1.0 / (1.0 + d2);
                q_num[i * n + j] = val;
                q_num[j * n + i] = val;
                q_sum += 2.0 * val;
            }
        }
        if q_sum == 0.0 {
            q_sum = 1.0;
        }

        grad.iter_mut().for_each(|g| *g = 0.0);
        kl_div = 0.0;
        for i in 0..n {
            for j in 0..n {
                if i == j {
                    continue;
                }
                let q_ij = (q_num[i * n + j] / q_sum).max(1e-12);
                let p_ij = p[i * n + j];
                let mult = 4.0 * (exaggeration * p_ij - q_ij) * q_num[i * n + j];
                for d in 0..out_dim {
                    grad[i * out_dim + d] += mult * (y[i * out_dim + d] - y[j * out_dim + d]);
                }
                if p_ij > 1e-12 {
                    kl_div += p_ij * (p_ij / q_ij).ln();
                }
            }
        }

        for idx in 0..y.len() {
            let sign_match = (grad[idx] > 0.0) == (velocities[idx] > 0.0);
            gains[idx] = if sign_match {
                (gains[idx] * 0.8_f64).max(0.01)
            } else {
                gains[idx] + 0.2
            };
            velocities[idx] =
                momentum * velocities[idx] - config.learning_rate * gains[idx] * grad[idx];
            y[idx] += velocities[idx];
        }

        // Re-center
        for d in 0..out_dim {
            let mean: f64 = (0..n).map(|i| y[i * out_dim + d]).sum::<f64>() / n as f64;
            for i in 0..n {
                y[i * out_dim + d] -= mean;
            }
        }

        if (iter + 1) % 100 == 0 {
            debug!("t-SNE iteration {}: KL = {:.5}", iter + 1, kl_div);
        }
    }

    info!(
        "t-SNE finished: {} samples, {} iterations, KL = {:.4}",
        n, config.n_iter, kl_div
    );

    Ok(TsneResult {
        embedding: y,
        n_samples: n,
        n_components: out_dim,
        kl_divergence: kl_div,
    })
}

/// Full `n × n` matrix of squared Euclidean distances.
fn pairwise_squared_distances(data: &[f64], n: usize, n_features: usize) -> Vec<f64> {
    let row = |i: usize| &data[i * n_features..(i + 1) * n_features];

    #[cfg(feature = "parallel")]
    let rows: Vec<Vec<f64>> = {
        use rayon::prelude::*;
        (0..n)
            .into_par_iter()
            .map(|i| ((i + 1)..n).map(|j| squared_euclidean(row(i), row(j))).collect())
            .collect()
    };
    #[cfg(not(feature = "parallel"))]
    let rows: Vec<Vec<f64>> = (0..n)
        .map(|i| ((i + 1)..n).map(|j| squared_euclidean(row(i), row(j))).collect())
        .collect();

    let mut sq_dists = vec![0.0; n * n];
    for (i, upper) in rows.into_iter().enumerate() {
        for (offset, d) in upper.into_iter().enumerate() {
            let j = i + 1 + offset;
            sq_dists[i * n + j] = d;
            sq_dists[j * n + i] = d;
        }
    }
    sq_dists
}

/// Compute symmetrized joint probabilities P from squared distances.
fn compute_joint_probabilities(sq_dists: &[f64], n: usize, perplexity: f64) -> Vec<f64> {
    let target_entropy = perplexity.ln();
    let mut p = vec![0.0; n * n];

    for i in 0..n {
        let row = &sq_dists[i * n..(i + 1) * n];
        // Binary search on the precision beta = 1 / (2 sigma^2)
        let mut beta = 1.0;
        let mut lo = f64::NEG_INFINITY;
        let mut hi = f64::INFINITY;
        let min_d = (0..n)
            .filter(|&j| j != i)
            .map(|j| row[j])
            .fold(f64::INFINITY, f64::min);

        let mut cond = vec![0.0; n];
        for _ in 0..100 {
            let mut sum_exp = 0.0;
            for j in 0..n {
                cond[j] = if j == i {
                    0.0
                } else {
                    // Shift by the nearest distance for numerical stability
                    (-beta * (row[j] - min_d)).exp()
                };
                sum_exp += cond[j];
            }
            let mut entropy = 0.0;
            if sum_exp > 0.0 {
                let mut weighted = 0.0;
                for j in 0..n {
                    weighted += cond[j] * (row[j] - min_d);
                }
                entropy = sum_exp.ln() + beta * weighted / sum_exp;
                for c in cond.iter_mut() {
                    *c /= sum_exp;
                }
            }

            let diff = entropy - target_entropy;
            if diff.abs() < 1e-5 {
                break;
            }
            if diff > 0.0 {
                lo = beta;
                beta = if hi.is_infinite() { beta * 2.0 } else { (beta + hi) / 2.0 };
            } else {
                hi = beta;
                beta = if lo.is_infinite() { beta / 2.0 } else { (beta + lo) / 2.0 };
            }
        }
        p[i * n..(i + 1) * n].copy_from_slice(&cond);
    }

    // Symmetrize: P_ij = (p(j|i) + p(i|j)) / (2n)
    let scale = 1.0 / (2.0 * n as f64);
    let mut sym = vec![0.0; n * n];
    for i in 0..n {
        for j in (i + 1)..n {
            let val = ((p[i * n + j] + p[j * n + i]) * scale).max(1e-12);
            sym[i * n + j] = val;
            sym[j * n + i] = val;
        }
    }
    sym
}

//! Linear discriminant analysis.
//!
//! Gaussian class-conditional densities with a shared (pooled) covariance.
//! The discriminant for class `k` is
//! `δ_k(x) = xᵀΣ⁻¹μ_k − ½ μ_kᵀΣ⁻¹μ_k + ln π_k`, evaluated through a Cholesky
//! factorization of the ridge-regularized pooled covariance.

use scatac_core::{Result, ScatacError};

use crate::classifier::{check_training_set, Classifier, Predictor};

/// LDA hyper-parameters.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct LdaConfig {
    /// Ridge added to the pooled covariance diagonal, relative to its mean
    /// diagonal entry.
    pub regularization: f64,
}

impl Default for LdaConfig {
    fn default() -> Self {
        Self {
            regularization: 1e-6,
        }
    }
}

impl Classifier for LdaConfig {
    fn name(&self) -> &str {
        "lda"
    }

    fn describe(&self) -> String {
        format!("regularization={:e}", self.regularization)
    }

    fn fit(
        &self,
        data: &[f64],
        n_features: usize,
        labels: &[usize],
    ) -> Result<Box<dyn Predictor>> {
        Ok(Box::new(Lda::fit(data, n_features, labels, self)?))
    }
}

/// A fitted LDA model: one linear score per observed class.
#[derive(Debug, Clone)]
pub struct Lda {
    /// `(class, Σ⁻¹μ_k, bias_k)` for every class seen during fitting.
    discriminants: Vec<(usize, Vec<f64>, f64)>,
}

impl Lda {
    /// Fit on flat row-major data.
    ///
    /// # Errors
    ///
    /// Returns an error on malformed input or if the regularized covariance
    /// is not positive definite.
    pub fn fit(
        data: &[f64],
        n_features: usize,
        labels: &[usize],
        config: &LdaConfig,
    ) -> Result<Self> {
        let (n_samples, n_classes) = check_training_set(data, n_features, labels)?;
        if config.regularization < 0.0 {
            return Err(ScatacError::InvalidInput(
                "regularization must be >= 0".into(),
            ));
        }
        let p = n_features;

        let mut counts = vec![0usize; n_classes];
        let mut means = vec![0.0; n_classes * p];
        for (row, &y) in data.chunks_exact(p).zip(labels) {
            counts[y] += 1;
            for (m, &x) in means[y * p..(y + 1) * p].iter_mut().zip(row) {
                *m += x;
            }
        }
        for k in 0..n_classes {
            if counts[k] > 0 {
                let c = counts[k] as f64;
                means[k * p..(k + 1) * p].iter_mut().for_each(|m| *m /= c);
            }
        }

        // Pooled within-class covariance
        let observed = counts.iter().filter(|&&c| c > 0).count();
        let dof = if n_samples > observed {
            (n_samples - observed) as f64
        } else {
            n_samples as f64
        };
        let mut cov = vec![0.0; p * p];
        for (row, &y) in data.chunks_exact(p).zip(labels) {
            let mu = &means[y * p..(y + 1) * p];
            for i in 0..p {
                let di = row[i] - mu[i];
                for j in i..p {
                    cov[i * p + j] += di * (row[j] - mu[j]);
                }
            }
        }
        for i in 0..p {
            for j in i..p {
                let v = cov[i * p + j] / dof;
                cov[i * p + j] = v;
                cov[j * p + i] = v;
            }
        }
        let mean_diag = (0..p).map(|i| cov[i * p + i]).sum::<f64>() / p as f64;
        let scale = if mean_diag > 1e-12 { mean_diag } else { 1.0 };
        let ridge = (config.regularization * scale).max(1e-12 * scale);
        for i in 0..p {
            cov[i * p + i] += ridge;
        }

        let chol = cholesky(&cov, p)?;
        let mut discriminants = Vec::with_capacity(observed);
        for k in 0..n_classes {
            if counts[k] == 0 {
                continue;
            }
            let mu = &means[k * p..(k + 1) * p];
            let w = cholesky_solve(&chol, p, mu);
            let quad: f64 = w.iter().zip(mu).map(|(a, b)| a * b).sum();
            let prior = counts[k] as f64 / n_samples as f64;
            discriminants.push((k, w, -0.5 * quad + prior.ln()));
        }
        Ok(Self { discriminants })
    }

    /// Discriminant score of every fitted class for `sample`.
    pub fn scores(&self, sample: &[f64]) -> Vec<(usize, f64)> {
        self.discriminants
            .iter()
            .map(|(k, w, b)| {
                let s: f64 = w.iter().zip(sample).map(|(a, x)| a * x).sum::<f64>() + b;
                (*k, s)
            })
            .collect()
    }
}

impl Predictor for Lda {
    fn predict(&self, sample: &[f64]) -> usize {
        let mut best = (0, f64::NEG_INFINITY);
        for (k, s) in self.scores(sample) {
            if s > best.1 {
                best = (k, s);
            }
        }
        best.0
    }
}

/// Lower-triangular Cholesky factor of a symmetric `p × p` matrix.
fn cholesky(a: &[f64], p: usize) -> Result<Vec<f64>> {
    let mut l = vec![0.0; p * p];
    for i in 0..p {
        for j in 0..=i {
            let mut sum = a[i * p + j];
            for k in 0..j {
                sum -= l[i * p + k] * l[j * p + k];
            }
            if i == j {
                if sum <= 0.0 {
                    return Err(ScatacError::InvalidInput(
                        "pooled covariance is not positive definite".into(),
                    ));
                }
                l[i * p + i] = sum.sqrt();
            } else {
                l[i * p + j] = sum / l[j * p + j];
            }
        }
    }
    Ok(l)
}

/// Solve `L Lᵀ x = b` by forward then backward substitution.
fn cholesky_solve(l: &[f64], p: usize, b: &[f64]) -> Vec<f64> {
    let mut y = vec![0.0; p];
    for i in 0..p {
        let s: f64 = (0..i).map(|k| l[i * p + k] * y[k]).sum();
        y[i] = (b[i] - s) / l[i * p + i];
    }
    let mut x = vec![0.0; p];
    for i in (0..p).rev() {
        let s: f64 = ((i + 1)..p).map(|k| l[k * p + i] * x[k]).sum();
        x[i] = (y[i] - s) / l[i * p + i];
    }
    x
}

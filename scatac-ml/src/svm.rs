//! Support vector machine with an RBF kernel.
//!
//! Each binary sub-problem is the C-SVC dual
//!
//! ```text
//! min ½ αᵀQα − eᵀα   s.t.   0 ≤ α_i ≤ C,  yᵀα = 0,   Q_ij = y_i y_j K(x_i, x_j)
//! ```
//!
//! solved by sequential minimal optimization with maximal-violating-pair
//! working-set selection. Multi-class problems use one-vs-one voting.
//! Kernel rows are computed on demand, which suits the low-dimensional
//! embeddings this model is trained on.

use log::{debug, warn};
use scatac_core::{Result, ScatacError};

use crate::classifier::{argmax_count, check_training_set, Classifier, Predictor};
use crate::distance::squared_euclidean;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// RBF-SVM hyper-parameters.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct SvmConfig {
    /// Box constraint.
    pub c: f64,
    /// Kernel width in `exp(-γ‖x − x'‖²)`. `None` uses
    /// `1 / (n_features · Var(X))`.
    pub gamma: Option<f64>,
    /// Stopping tolerance on the KKT violation.
    pub tol: f64,
    /// Iteration cap per binary sub-problem.
    pub max_iter: usize,
}

impl Default for SvmConfig {
    fn default() -> Self {
        Self {
            c: 1.0,
            gamma: None,
            tol: 1e-3,
            max_iter: 100_000,
        }
    }
}

impl Classifier for SvmConfig {
    fn name(&self) -> &str {
        "svm_rbf"
    }

    fn describe(&self) -> String {
        match self.gamma {
            Some(g) => format!("C={}, gamma={g}", self.c),
            None => format!("C={}, gamma=scale", self.c),
        }
    }

    fn fit(
        &self,
        data: &[f64],
        n_features: usize,
        labels: &[usize],
    ) -> Result<Box<dyn Predictor>> {
        let model = Svm::fit(data, n_features, labels, self)?;
        debug!(
            "svm: {} support vectors, gamma {:.4}",
            model.n_support(),
            model.gamma()
        );
        Ok(Box::new(model))
    }
}

// ---------------------------------------------------------------------------
// Fitted model
// ---------------------------------------------------------------------------

/// One binary machine of the one-vs-one ensemble.
#[derive(Debug, Clone)]
struct BinarySvm {
    /// Class voted for when the decision value is positive.
    positive: usize,
    /// Class voted for otherwise.
    negative: usize,
    /// Support vectors, flat row-major.
    support: Vec<f64>,
    /// `α_i y_i` for each support vector.
    coef: Vec<f64>,
    rho: f64,
}

/// A fitted RBF-SVM classifier.
#[derive(Debug, Clone)]
pub struct Svm {
    machines: Vec<BinarySvm>,
    n_classes: usize,
    n_features: usize,
    gamma: f64,
    /// Prediction when there is no pair of classes to vote between.
    fallback: usize,
}

impl Svm {
    /// Train one binary machine per pair of observed classes.
    ///
    /// # Errors
    ///
    /// Returns an error on malformed input or a non-positive `C` or `gamma`.
    /// A training set with a single class yields a model that always
    /// predicts that class.
    pub fn fit(
        data: &[f64],
        n_features: usize,
        labels: &[usize],
        config: &SvmConfig,
    ) -> Result<Self> {
        let (_, n_classes) = check_training_set(data, n_features, labels)?;
        if config.c.is_nan() || config.c <= 0.0 {
            return Err(ScatacError::InvalidInput("C must be > 0".into()));
        }
        let gamma = match config.gamma {
            Some(g) if g > 0.0 => g,
            Some(_) => return Err(ScatacError::InvalidInput("gamma must be > 0".into())),
            None => scale_gamma(data, n_features),
        };

        let mut by_class: Vec<Vec<usize>> = vec![Vec::new(); n_classes];
        for (i, &y) in labels.iter().enumerate() {
            by_class[y].push(i);
        }
        let observed: Vec<usize> = (0..n_classes).filter(|&c| !by_class[c].is_empty()).collect();
        if observed.len() < 2 {
            warn!("SVM training set has a single class; predicting it unconditionally");
        }

        let mut machines = Vec::new();
        for (a_pos, &a) in observed.iter().enumerate() {
            for &b in &observed[a_pos + 1..] {
                let rows: Vec<usize> = by_class[a].iter().chain(&by_class[b]).copied().collect();
                let x = crate::gather_rows(data, n_features, &rows);
                let y: Vec<f64> = rows
                    .iter()
                    .map(|&r| if labels[r] == a { 1.0 } else { -1.0 })
                    .collect();
                let solution = smo(&x, n_features, &y, gamma, config);
                machines.push(solution.into_machine(&x, n_features, &y, a, b));
            }
        }

        Ok(Self {
            machines,
            n_classes,
            n_features,
            gamma,
            fallback: observed.first().copied().unwrap_or(0),
        })
    }

    /// Kernel width used by this model.
    pub fn gamma(&self) -> f64 {
        self.gamma
    }

    /// Total number of support vectors across all binary machines.
    pub fn n_support(&self) -> usize {
        self.machines.iter().map(|m| m.coef.len()).sum()
    }

    fn decision(&self, machine: &BinarySvm, sample: &[f64]) -> f64 {
        machine
            .support
            .chunks_exact(self.n_features)
            .zip(&machine.coef)
            .map(|(sv, c)| c * rbf(sv, sample, self.gamma))
            .sum::<f64>()
            - machine.rho
    }
}

impl Predictor for Svm {
    /// One-vs-one vote; ties go to the lowest class index.
    fn predict(&self, sample: &[f64]) -> usize {
        if self.machines.is_empty() {
            return self.fallback;
        }
        let mut votes = vec![0usize; self.n_classes];
        for machine in &self.machines {
            if self.decision(machine, sample) > 0.0 {
                votes[machine.positive] += 1;
            } else {
                votes[machine.negative] += 1;
            }
        }
        argmax_count(&votes)
    }
}

// ---------------------------------------------------------------------------
// SMO solver
// ---------------------------------------------------------------------------

const TAU: f64 = 1e-12;

#[inline]
fn rbf(a: &[f64], b: &[f64], gamma: f64) -> f64 {
    (-gamma * squared_euclidean(a, b)).exp()
}

/// `1 / (n_features · Var(X))` over all entries; 1.0 for constant data.
fn scale_gamma(data: &[f64], n_features: usize) -> f64 {
    let n = data.len() as f64;
    let mean = data.iter().sum::<f64>() / n;
    let var = data.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    if var > 1e-12 {
        1.0 / (n_features as f64 * var)
    } else {
        1.0
    }
}

struct SmoSolution {
    alpha: Vec<f64>,
    rho: f64,
}

impl SmoSolution {
    fn into_machine(
        self,
        x: &[f64],
        n_features: usize,
        y: &[f64],
        positive: usize,
        negative: usize,
    ) -> BinarySvm {
        let mut support = Vec::new();
        let mut coef = Vec::new();
        for (i, &a) in self.alpha.iter().enumerate() {
            if a > 0.0 {
                support.extend_from_slice(&x[i * n_features..(i + 1) * n_features]);
                coef.push(a * y[i]);
            }
        }
        BinarySvm {
            positive,
            negative,
            support,
            coef,
            rho: self.rho,
        }
    }
}

fn smo(x: &[f64], n_features: usize, y: &[f64], gamma: f64, config: &SvmConfig) -> SmoSolution {
    let n = y.len();
    let c = config.c;
    let row = |i: usize| &x[i * n_features..(i + 1) * n_features];
    // Q_ij for a fixed i, computed on demand
    let q_row = |i: usize| -> Vec<f64> {
        (0..n)
            .map(|t| y[i] * y[t] * rbf(row(i), row(t), gamma))
            .collect()
    };

    let mut alpha = vec![0.0; n];
    let mut grad = vec![-1.0; n];
    let in_up = |a: f64, yt: f64| (yt > 0.0 && a < c) || (yt < 0.0 && a > 0.0);
    let in_low = |a: f64, yt: f64| (yt > 0.0 && a > 0.0) || (yt < 0.0 && a < c);

    let mut iter = 0;
    loop {
        // Maximal violating pair
        let mut i = None;
        let mut g_max = f64::NEG_INFINITY;
        let mut j = None;
        let mut g_min = f64::INFINITY;
        for t in 0..n {
            let v = -y[t] * grad[t];
            if in_up(alpha[t], y[t]) && v > g_max {
                g_max = v;
                i = Some(t);
            }
            if in_low(alpha[t], y[t]) && v < g_min {
                g_min = v;
                j = Some(t);
            }
        }
        let (Some(i), Some(j)) = (i, j) else { break };
        if g_max - g_min < config.tol {
            break;
        }
        if iter >= config.max_iter {
            warn!(
                "SMO reached max_iter={} with KKT violation {:.2e}",
                config.max_iter,
                g_max - g_min
            );
            break;
        }
        iter += 1;

        let qi = q_row(i);
        let qj = q_row(j);
        let (old_ai, old_aj) = (alpha[i], alpha[j]);

        if y[i] != y[j] {
            let quad = (qi[i] + qj[j] + 2.0 * qi[j]).max(TAU);
            let delta = (-grad[i] - grad[j]) / quad;
            let diff = alpha[i] - alpha[j];
            alpha[i] += delta;
            alpha[j] += delta;
            if diff > 0.0 {
                if alpha[j] < 0.0 {
                    alpha[j] = 0.0;
                    alpha[i] = diff;
                }
            } else if alpha[i] < 0.0 {
                alpha[i] = 0.0;
                alpha[j] = -diff;
            }
            if diff > 0.0 {
                if alpha[i] > c {
                    alpha[i] = c;
                    alpha[j] = c - diff;
                }
            } else if alpha[j] > c {
                alpha[j] = c;
                alpha[i] = c + diff;
            }
        } else {
            let quad = (qi[i] + qj[j] - 2.0 * qi[j]).max(TAU);
            let delta = (grad[i] - grad[j]) / quad;
            let sum = alpha[i] + alpha[j];
            alpha[i] -= delta;
            alpha[j] += delta;
            if sum > c {
                if alpha[i] > c {
                    alpha[i] = c;
                    alpha[j] = sum - c;
                }
            } else if alpha[j] < 0.0 {
                alpha[j] = 0.0;
                alpha[i] = sum;
            }
            if sum > c {
                if alpha[j] > c {
                    alpha[j] = c;
                    alpha[i] = sum - c;
                }
            } else if alpha[i] < 0.0 {
                alpha[i] = 0.0;
                alpha[j] = sum;
            }
        }

        let (d_ai, d_aj) = (alpha[i] - old_ai, alpha[j] - old_aj);
        for t in 0..n {
            grad[t] += qi[t] * d_ai + qj[t] * d_aj;
        }
    }

    SmoSolution {
        rho: compute_rho(&alpha, &grad, y, c),
        alpha,
    }
}

/// Offset from free support vectors, or the midpoint of the feasible
/// interval when every multiplier sits at a bound.
fn compute_rho(alpha: &[f64], grad: &[f64], y: &[f64], c: f64) -> f64 {
    let mut ub = f64::INFINITY;
    let mut lb = f64::NEG_INFINITY;
    let mut n_free = 0usize;
    let mut sum_free = 0.0;
    for t in 0..alpha.len() {
        let yg = y[t] * grad[t];
        if alpha[t] >= c {
            if y[t] < 0.0 {
                ub = ub.min(yg);
            } else {
                lb = lb.max(yg);
            }
        } else if alpha[t] <= 0.0 {
            if y[t] > 0.0 {
                ub = ub.min(yg);
            } else {
                lb = lb.max(yg);
            }
        } else {
            n_free += 1;
            sum_free += yg;
        }
    }
    if n_free > 0 {
        sum_free / n_free as f64
    } else {
        (ub + lb) / 2.0
    }
}

//! Randomized truncated singular value decomposition.
//!
//! Implements the Halko–Martinsson–Tropp range finder: a seeded Gaussian
//! sketch `Y = A·Ω`, a few power iterations to sharpen the spectrum, then an
//! exact decomposition of the small projected matrix `B = Qᵀ·A`. The small
//! problem is solved through the eigendecomposition of `B·Bᵀ` with a cyclic
//! Jacobi sweep, so no LAPACK is required.
//!
//! The input only needs to support products with dense blocks
//! ([`LinearOperator`]), which lets sparse matrices stay sparse.

use log::debug;
use ndarray::{Array2, Axis};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::StandardNormal;
use scatac_core::{Result, ScatacError, Summarizable};

// ---------------------------------------------------------------------------
// Operator abstraction
// ---------------------------------------------------------------------------

/// A matrix that can be multiplied with dense blocks from either side.
pub trait LinearOperator {
    /// `(n_rows, n_cols)` of the operator.
    fn shape(&self) -> (usize, usize);

    /// `A · X` where `X` is `n_cols × l`; returns `n_rows × l`.
    fn apply(&self, x: &Array2<f64>) -> Array2<f64>;

    /// `Aᵀ · X` where `X` is `n_rows × l`; returns `n_cols × l`.
    fn apply_transpose(&self, x: &Array2<f64>) -> Array2<f64>;
}

impl LinearOperator for Array2<f64> {
    fn shape(&self) -> (usize, usize) {
        self.dim()
    }

    fn apply(&self, x: &Array2<f64>) -> Array2<f64> {
        self.dot(x)
    }

    fn apply_transpose(&self, x: &Array2<f64>) -> Array2<f64> {
        self.t().dot(x)
    }
}

// ---------------------------------------------------------------------------
// Configuration and result
// ---------------------------------------------------------------------------

/// Configuration for randomized SVD.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct SvdConfig {
    /// Number of singular triplets to keep.
    pub n_components: usize,
    /// Extra sketch columns beyond `n_components`.
    pub oversampling: usize,
    /// Number of power iterations.
    pub n_power_iter: usize,
    /// Random seed for the Gaussian sketch.
    pub seed: u64,
}

impl Default for SvdConfig {
    fn default() -> Self {
        Self {
            n_components: 50,
            oversampling: 10,
            n_power_iter: 2,
            seed: 42,
        }
    }
}

/// Truncated SVD `A ≈ U · diag(S) · Vᵀ`.
#[derive(Debug, Clone)]
pub struct SvdResult {
    /// Singular values, descending.
    pub singular_values: Vec<f64>,
    /// Left singular vectors, `n_rows × k`.
    pub u: Array2<f64>,
    /// Right singular vectors, `n_cols × k`.
    pub v: Array2<f64>,
}

impl SvdResult {
    /// Number of components kept.
    pub fn n_components(&self) -> usize {
        self.singular_values.len()
    }

    /// `V · diag(S)`: the column-space coordinates, one row per column of `A`.
    pub fn scaled_v(&self) -> Array2<f64> {
        let mut out = self.v.clone();
        for (mut col, &s) in out.axis_iter_mut(Axis(1)).zip(&self.singular_values) {
            col.mapv_inplace(|x| x * s);
        }
        out
    }
}

impl Summarizable for SvdResult {
    fn summary(&self) -> String {
        let top = self.singular_values.first().copied().unwrap_or(0.0);
        format!(
            "SVD: {} components, leading singular value {:.4}",
            self.n_components(),
            top
        )
    }
}

// ---------------------------------------------------------------------------
// Randomized SVD
// ---------------------------------------------------------------------------

/// Singular values at or below this fraction of the leading one count as zero.
pub const RANK_TOL: f64 = 1e-10;

/// Largest number of components that may be requested from an
/// `n_rows × n_cols` matrix.
pub fn max_components(n_rows: usize, n_cols: usize) -> usize {
    n_rows.min(n_cols).saturating_sub(1)
}

/// Compute the top `config.n_components` singular triplets of `a`.
///
/// Component signs are normalized so that the largest-magnitude entry of
/// each right singular vector is positive; together with the seeded sketch
/// this makes the result reproducible.
///
/// # Errors
///
/// Returns [`ScatacError::Rank`] if `n_components` is 0 or exceeds
/// `min(n_rows, n_cols) - 1` or the effective rank of `a`, and
/// [`ScatacError::InvalidInput`] for an empty operator.
pub fn randomized_svd<A>(a: &A, config: &SvdConfig) -> Result<SvdResult>
where
    A: LinearOperator + ?Sized,
{
    let (m, n) = a.shape();
    if m == 0 || n == 0 {
        return Err(ScatacError::InvalidInput(format!(
            "cannot decompose an empty {m} x {n} matrix"
        )));
    }
    let k = config.n_components;
    let max_k = max_components(m, n);
    if k == 0 {
        return Err(ScatacError::Rank("n_components must be > 0".into()));
    }
    if k > max_k {
        return Err(ScatacError::Rank(format!(
            "requested {k} components but at most {max_k} are feasible for a {m} x {n} matrix"
        )));
    }
    let l = (k + config.oversampling).min(m.min(n));

    let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
    let omega = Array2::from_shape_fn((n, l), |_| rng.sample::<f64, _>(StandardNormal));

    let mut q = orthonormalize(&a.apply(&omega));
    for it in 0..config.n_power_iter {
        let z = orthonormalize(&a.apply_transpose(&q));
        q = orthonormalize(&a.apply(&z));
        debug!("randomized SVD: power iteration {} of {}", it + 1, config.n_power_iter);
    }

    // B = Qᵀ A, kept transposed as Bᵀ = Aᵀ Q (n × l).
    let bt = a.apply_transpose(&q);
    let gram = bt.t().dot(&bt);
    let (eigenvalues, w) = symmetric_eigen(&gram);

    let leading = eigenvalues[0].max(0.0).sqrt();
    let last = eigenvalues[k - 1].max(0.0).sqrt();
    if leading == 0.0 || last <= RANK_TOL * leading {
        let rank = eigenvalues
            .iter()
            .take_while(|&&e| leading > 0.0 && e.max(0.0).sqrt() > RANK_TOL * leading)
            .count();
        return Err(ScatacError::Rank(format!(
            "requested {k} components but the {m} x {n} matrix has effective rank {rank}"
        )));
    }

    let u_full = q.dot(&w);
    let scaled_full = bt.dot(&w);

    let mut singular_values = Vec::with_capacity(k);
    let mut u = Array2::zeros((m, k));
    let mut v = Array2::zeros((n, k));
    for c in 0..k {
        let sigma = eigenvalues[c].max(0.0).sqrt();
        let scaled = scaled_full.column(c);

        let pivot = scaled
            .iter()
            .copied()
            .fold(0.0_f64, |best, x| if x.abs() > best.abs() { x } else { best });
        let sign = if pivot < 0.0 { -1.0 } else { 1.0 };

        u.column_mut(c)
            .assign(&u_full.column(c).mapv(|x| x * sign));
        if sigma > f64::EPSILON {
            v.column_mut(c).assign(&scaled.mapv(|x| x * sign / sigma));
        }
        singular_values.push(sigma);
    }

    Ok(SvdResult {
        singular_values,
        u,
        v,
    })
}

// ---------------------------------------------------------------------------
// Dense helpers
// ---------------------------------------------------------------------------

/// Orthonormalize the columns of `y` with modified Gram–Schmidt, two passes.
///
/// Columns that are numerically dependent on earlier ones become zero
/// columns, so the result always has the same shape as `y`.
pub(crate) fn orthonormalize(y: &Array2<f64>) -> Array2<f64> {
    let mut q = y.clone();
    let ncols = q.ncols();
    let scale = q
        .axis_iter(Axis(1))
        .map(|c| c.dot(&c).sqrt())
        .fold(0.0_f64, f64::max);
    let tol = 1e-10 * scale.max(f64::MIN_POSITIVE);

    for j in 0..ncols {
        for _pass in 0..2 {
            for i in 0..j {
                let proj = q.column(i).dot(&q.column(j));
                if proj != 0.0 {
                    let qi = q.column(i).to_owned();
                    q.column_mut(j).scaled_add(-proj, &qi);
                }
            }
        }
        let norm = q.column(j).dot(&q.column(j)).sqrt();
        if norm > tol {
            q.column_mut(j).mapv_inplace(|x| x / norm);
        } else {
            q.column_mut(j).fill(0.0);
        }
    }
    q
}

/// Eigendecomposition of a real symmetric matrix by cyclic Jacobi rotations.
///
/// Returns eigenvalues in descending order and the matching eigenvectors as
/// the columns of the second element.
pub(crate) fn symmetric_eigen(matrix: &Array2<f64>) -> (Vec<f64>, Array2<f64>) {
    let n = matrix.nrows();
    let mut a = matrix.clone();
    let mut v: Array2<f64> = Array2::eye(n);

    let total: f64 = a.iter().map(|x| x * x).sum();
    let threshold = 1e-24 * total.max(f64::MIN_POSITIVE);

    for _sweep in 0..100 {
        let mut off = 0.0;
        for p in 0..n {
            for q in (p + 1)..n {
                off += a[[p, q]] * a[[p, q]];
            }
        }
        if off <= threshold {
            break;
        }

        for p in 0..n {
            for q in (p + 1)..n {
                let apq = a[[p, q]];
                if apq.abs() < f64::MIN_POSITIVE {
                    continue;
                }
                let theta = (a[[q, q]] - a[[p, p]]) / (2.0 * apq);
                let t = theta.signum() / (theta.abs() + (theta * theta + 1.0).sqrt());
                let c = 1.0 / (t * t + 1.0).sqrt();
                let s = t * c;

                for r in 0..n {
                    let arp = a[[r, p]];
                    let arq = a[[r, q]];
                    a[[r, p]] = c * arp - s * arq;
                    a[[r, q]] = s * arp + c * arq;
                }
                for r in 0..n {
                    let apr = a[[p, r]];
                    let aqr = a[[q, r]];
                    a[[p, r]] = c * apr - s * aqr;
                    a[[q, r]] = s * apr + c * aqr;
                }
                for r in 0..n {
                    let vrp = v[[r, p]];
                    let vrq = v[[r, q]];
                    v[[r, p]] = c * vrp - s * vrq;
                    v[[r, q]] = s * vrp + c * vrq;
                }
            }
        }
    }

    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&i, &j| {
        a[[j, j]]
            .partial_cmp(&a[[i, i]])
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(i.cmp(&j))
    });

    let eigenvalues = order.iter().map(|&i| a[[i, i]]).collect();
    let mut vectors = Array2::zeros((n, n));
    for (dst, &src) in order.iter().enumerate() {
        vectors.column_mut(dst).assign(&v.column(src));
    }
    (eigenvalues, vectors)
}

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::design::SparseDesign;
use crate::error::{RapmError, RapmResult};

/// Above this many columns `auto` switches from the dense factorization to
/// conjugate gradient.
pub const AUTO_DENSE_MAX_COLUMNS: usize = 2_000;

const PIVOT_TOLERANCE: f64 = 1e-10;
const CG_TOLERANCE: f64 = 1e-10;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum SolverKind {
    #[default]
    Auto,
    Cholesky,
    ConjugateGradient,
}

impl SolverKind {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "auto" => Some(Self::Auto),
            "cholesky" => Some(Self::Cholesky),
            "conjugate-gradient" | "cg" => Some(Self::ConjugateGradient),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RidgeFit {
    pub coefficients: Vec<f64>,
    /// The solver that actually ran (never `Auto`).
    pub solver: SolverKind,
    pub iterations: Option<usize>,
}

/// Weighted ridge without intercept:
/// minimizes `Σ wᵢ (yᵢ − xᵢ·β)² + α‖β‖²`.
///
/// Coefficients are not centered; with `alpha = 0` a rank-deficient design
/// is an error rather than a least-norm answer.
pub fn fit(
    x: &SparseDesign,
    y: &[f64],
    w: &[f64],
    alpha: f64,
    solver: SolverKind,
) -> RapmResult<RidgeFit> {
    let n = x.n_rows();
    if n == 0 || x.n_cols() == 0 {
        return Err(RapmError::EmptyInput(format!(
            "design has {n} rows and {} columns",
            x.n_cols()
        )));
    }
    if y.len() != n || w.len() != n {
        return Err(RapmError::DimensionMismatch(format!(
            "{n} rows but {} targets and {} weights",
            y.len(),
            w.len()
        )));
    }
    if !alpha.is_finite() {
        return Err(RapmError::InvalidAlpha {
            alpha,
            reason: "must be finite",
        });
    }
    if alpha < 0.0 {
        return Err(RapmError::InvalidAlpha {
            alpha,
            reason: "must not be negative",
        });
    }
    if let Some((row, &value)) = w
        .iter()
        .enumerate()
        .find(|(_, v)| !v.is_finite() || **v < 0.0)
    {
        return Err(RapmError::InvalidWeight { row, value });
    }

    let resolved = match solver {
        SolverKind::Auto if alpha == 0.0 || x.n_cols() <= AUTO_DENSE_MAX_COLUMNS => {
            SolverKind::Cholesky
        }
        SolverKind::Auto => SolverKind::ConjugateGradient,
        other => other,
    };
    debug!(rows = n, cols = x.n_cols(), alpha, solver = ?resolved, "ridge solve");

    match resolved {
        SolverKind::ConjugateGradient => conjugate_gradient(x, y, w, alpha),
        _ => cholesky(x, y, w, alpha),
    }
}

fn weighted_rhs(x: &SparseDesign, y: &[f64], w: &[f64]) -> Vec<f64> {
    let wy: Vec<f64> = y.iter().zip(w).map(|(yi, wi)| yi * wi).collect();
    x.transpose_mul_vec(&wy)
}

fn cholesky(x: &SparseDesign, y: &[f64], w: &[f64], alpha: f64) -> RapmResult<RidgeFit> {
    let p = x.n_cols();
    // Lower triangle of XᵀWX + αI, row-major.
    let mut a = vec![0.0; p * p];
    for (i, wi) in w.iter().enumerate() {
        let entries: Vec<(usize, f64)> = x.row(i).collect();
        for &(r, xr) in &entries {
            for &(c, xc) in &entries {
                if c <= r {
                    a[r * p + c] += wi * xr * xc;
                }
            }
        }
    }
    for j in 0..p {
        a[j * p + j] += alpha;
    }
    let b = weighted_rhs(x, y, w);

    let scale = (0..p).map(|j| a[j * p + j]).fold(0.0_f64, f64::max);
    let tol = PIVOT_TOLERANCE * scale.max(f64::MIN_POSITIVE);

    // In-place factorization A = L Lᵀ.
    for j in 0..p {
        let mut d = a[j * p + j];
        for k in 0..j {
            d -= a[j * p + k] * a[j * p + k];
        }
        if d <= tol {
            return Err(RapmError::Singular {
                column: j,
                pivot: d,
            });
        }
        let d = d.sqrt();
        a[j * p + j] = d;
        for i in (j + 1)..p {
            let mut s = a[i * p + j];
            for k in 0..j {
                s -= a[i * p + k] * a[j * p + k];
            }
            a[i * p + j] = s / d;
        }
    }

    // L z = b
    let mut z = b;
    for i in 0..p {
        let mut s = z[i];
        for k in 0..i {
            s -= a[i * p + k] * z[k];
        }
        z[i] = s / a[i * p + i];
    }
    // Lᵀ β = z
    for i in (0..p).rev() {
        let mut s = z[i];
        for k in (i + 1)..p {
            s -= a[k * p + i] * z[k];
        }
        z[i] = s / a[i * p + i];
    }

    Ok(RidgeFit {
        coefficients: z,
        solver: SolverKind::Cholesky,
        iterations: None,
    })
}

fn conjugate_gradient(
    x: &SparseDesign,
    y: &[f64],
    w: &[f64],
    alpha: f64,
) -> RapmResult<RidgeFit> {
    if alpha <= 0.0 {
        return Err(RapmError::InvalidAlpha {
            alpha,
            reason: "conjugate gradient requires alpha > 0",
        });
    }
    let apply = |v: &[f64]| -> Vec<f64> {
        let xv = x.mul_vec(v);
        let wxv: Vec<f64> = xv.iter().zip(w).map(|(a, b)| a * b).collect();
        let mut out = x.transpose_mul_vec(&wxv);
        for (o, vi) in out.iter_mut().zip(v) {
            *o += alpha * vi;
        }
        out
    };

    let b = weighted_rhs(x, y, w);
    let max_iters = 4 * x.n_cols() + 100;
    let (coefficients, iterations) = cg_solve(apply, b, max_iters)?;
    Ok(RidgeFit {
        coefficients,
        solver: SolverKind::ConjugateGradient,
        iterations: Some(iterations),
    })
}

/// Solves `A·β = b` where `apply` computes `A·v` for a symmetric positive
/// definite `A`. Returns the solution and the number of iterations run.
fn cg_solve(
    apply: impl Fn(&[f64]) -> Vec<f64>,
    b: Vec<f64>,
    max_iters: usize,
) -> RapmResult<(Vec<f64>, usize)> {
    let p = b.len();
    let b_norm = dot(&b, &b).sqrt();
    let mut beta = vec![0.0; p];
    if b_norm == 0.0 {
        return Ok((beta, 0));
    }

    let mut r = b;
    let mut dir = r.clone();
    let mut rs = dot(&r, &r);
    for iter in 1..=max_iters {
        let ad = apply(&dir);
        let curvature = dot(&dir, &ad);
        if curvature <= 0.0 || !curvature.is_finite() {
            return Err(RapmError::Breakdown {
                iterations: iter - 1,
                curvature,
            });
        }
        let step = rs / curvature;
        for j in 0..p {
            beta[j] += step * dir[j];
            r[j] -= step * ad[j];
        }
        let rs_new = dot(&r, &r);
        if rs_new.sqrt() <= CG_TOLERANCE * b_norm {
            return Ok((beta, iter));
        }
        let ratio = rs_new / rs;
        for j in 0..p {
            dir[j] = r[j] + ratio * dir[j];
        }
        rs = rs_new;
    }

    Err(RapmError::NotConverged {
        iterations: max_iters,
        residual: rs.sqrt() / b_norm,
    })
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

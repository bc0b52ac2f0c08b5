/// Hard failures of the design and solve stages. Per-game and per-stint
/// problems never surface here; they are recorded in
/// [`RunDiagnostics`](crate::pipeline::RunDiagnostics) instead.
#[derive(Debug, thiserror::Error)]
pub enum RapmError {
    #[error("no stints to fit: {0}")]
    EmptyInput(String),

    #[error("invalid ridge alpha {alpha}: {reason}")]
    InvalidAlpha { alpha: f64, reason: &'static str },

    #[error("dimension mismatch: {0}")]
    DimensionMismatch(String),

    #[error("invalid weight {value} at row {row}")]
    InvalidWeight { row: usize, value: f64 },

    #[error("normal equations are singular (pivot {pivot:.3e} at column {column}); use alpha > 0")]
    Singular { column: usize, pivot: f64 },

    #[error(
        "conjugate gradient did not converge after {iterations} iterations \
         (residual {residual:.3e})"
    )]
    NotConverged { iterations: usize, residual: f64 },

    #[error(
        "conjugate gradient broke down after {iterations} iterations \
         (curvature {curvature:.3e}); the system is not positive definite"
    )]
    Breakdown { iterations: usize, curvature: f64 },
}

pub type RapmResult<T> = std::result::Result<T, RapmError>;

//! Sparse direct linear solver backends.
//!
//! The Newton loop hands the Jacobian over as raw CSC arrays; backends
//! factorize and solve in place. Backends keep the symbolic analysis of
//! the first factorization and reuse it while the sparsity pattern is
//! unchanged; [`Solve::reset`] drops it when the pattern may differ.

use thiserror::Error;

#[cfg(feature = "faer")]
mod faer;
#[cfg(feature = "faer")]
pub use faer::FaerSolver;

#[cfg(feature = "rsparse")]
mod rsparse;
#[cfg(feature = "rsparse")]
pub use rsparse::RSparseSolver;

#[cfg(feature = "faer")]
pub type DefaultSolver = FaerSolver;

#[cfg(all(not(feature = "faer"), feature = "rsparse"))]
pub type DefaultSolver = RSparseSolver;

/// Why a factorization attempt failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FactorError {
    #[error("symbolic analysis of the sparsity pattern failed")]
    Symbolic,
    #[error("numeric factorization failed: matrix is singular or ill-conditioned")]
    Singular,
}

/// A direct solver for square sparse systems in CSC form.
pub trait Solve {
    /// Solves `A·x = b` for the `n × n` matrix given by
    /// `(col_offsets, row_indices, values)`; `b` holds the solution on
    /// return. `b` is left unspecified on error.
    fn solve(
        &mut self,
        col_offsets: &[usize],
        row_indices: &[usize],
        values: &[f64],
        b: &mut [f64],
        n: usize,
    ) -> Result<(), FactorError>;

    /// Discards any retained symbolic factorization.
    fn reset(&mut self);
}

//! Sparse linear solve backends for the Newton-type iterations.
#[cfg(feature = "faer")]
mod faer;
#[cfg(feature = "faer")]
pub use faer::*;

#[cfg(feature = "rsparse")]
mod rsparse;
#[cfg(feature = "rsparse")]
pub use rsparse::*;

#[cfg(feature = "faer")]
pub type DefaultSolver = FaerSolver;

#[cfg(all(not(feature = "faer"), feature = "rsparse"))]
pub type DefaultSolver = RSparseSolver;

#[allow(non_snake_case)]
/// A trait for solving sparse linear systems given in CSC form.
///
/// A solver instance holds at most one factorization, owned by whoever created the
/// instance. `factor` replaces it, `solve_factored` reuses it.
pub trait Solve {
    /// Factors the matrix `(Ap, Ai, Ax)` of dimension `n`, replacing any earlier factorization.
    fn factor(&mut self, Ap: &[usize], Ai: &[usize], Ax: &[f64], n: usize)
    -> Result<(), &'static str>;

    /// Solves in place against the last factorization.
    fn solve_factored(&mut self, b: &mut [f64]) -> Result<(), &'static str>;

    /// Factors and solves in one step; `b` is overwritten with the solution.
    fn solve(
        &mut self,
        Ap: &[usize],
        Ai: &[usize],
        Ax: &[f64],
        b: &mut [f64],
        n: usize,
    ) -> Result<(), &'static str> {
        self.factor(Ap, Ai, Ax, n)?;
        self.solve_factored(b)
    }
}

/// Factors `mat` and solves `mat * x = b` in place, rejecting non-finite solutions.
pub(crate) fn solve_csc<S: Solve>(
    solver: &mut S,
    mat: &nalgebra_sparse::CscMatrix<f64>,
    b: &mut [f64],
) -> Result<(), &'static str> {
    solver.factor(mat.col_offsets(), mat.row_indices(), mat.values(), mat.nrows())?;
    solve_checked(solver, b)
}

/// Solves against the current factorization, rejecting non-finite solutions.
pub(crate) fn solve_checked<S: Solve>(solver: &mut S, b: &mut [f64]) -> Result<(), &'static str> {
    solver.solve_factored(b)?;
    if b.iter().all(|x| x.is_finite()) {
        Ok(())
    } else {
        Err("non-finite solution")
    }
}

use nalgebra::DVector;
use nalgebra_sparse::CscMatrix;
use tracing::debug;

use super::{
    error::ErrorCode,
    result::inf_norm,
    solver::{Solve, solve_csc},
    sparse::slice::Slice,
};

/// Output of the linear DC solve, angles in reordered bus order.
#[derive(Debug, Clone)]
pub(crate) struct DcOutcome {
    pub theta: DVector<f64>,
    /// ∞-norm of `B·θ − P` over the non-slack buses.
    pub residual: f64,
    pub error: Option<ErrorCode>,
}

/// Linearized DC power flow on a system ordered as `[non-slack | Slack]`.
///
/// Solves `B_red·θ = P_red − B_red,slack·θ_slack` once, where `b` is the full susceptance matrix
/// and `p` the scheduled real injections in p.u. `theta_init` supplies the slack angles.
pub(crate) fn dc_pf<Solver: Solve>(
    b: &CscMatrix<f64>,
    p: &DVector<f64>,
    theta_init: &DVector<f64>,
    n_bus: usize,
    solver: &mut Solver,
) -> DcOutcome {
    let n = p.len();
    let n_ext = n - n_bus;
    let b_red = b.block((0, 0), (n_bus, n_bus));
    let b_slack = b.block((0, n_bus), (n_bus, n_ext));
    let theta_slack = theta_init.rows_range(n_bus..n).into_owned();

    let rhs = p.rows_range(0..n_bus) - &b_slack * &theta_slack;
    let mut x: Vec<f64> = rhs.iter().copied().collect();
    let mut theta = theta_init.clone();
    if n_bus > 0 {
        if let Err(e) = solve_csc(solver, &b_red, &mut x) {
            debug!(reason = e, "reduced B matrix is singular");
            return DcOutcome {
                theta,
                residual: f64::INFINITY,
                error: Some(ErrorCode::SingularTopology),
            };
        }
    }
    theta.rows_range_mut(0..n_bus).copy_from_slice(&x);

    let solved = DVector::from_column_slice(&x);
    let residual = inf_norm(&(&b_red * &solved + &b_slack * &theta_slack - p.rows_range(0..n_bus)));
    DcOutcome {
        theta,
        residual,
        error: None,
    }
}

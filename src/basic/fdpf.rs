use nalgebra::DVector;
use nalgebra_sparse::CscMatrix;
use num_complex::Complex64;
use tracing::debug;

use super::{
    config::SolveLimits,
    error::ErrorCode,
    newtonpf::{assemble_f, power_mismatch},
    result::{SolveOutcome, inf_norm},
    solver::{Solve, solve_checked},
    sparse::{conj::RealImage, slice::Slice},
};

/// Fast-decoupled power flow (XB scheme) on a system ordered as `[PV | PQ | Slack]`.
///
/// `b_xb` is the full susceptance matrix used for B′ (reordered like `Ybus`); B″ is
/// `-Im(Ybus)` restricted to PQ buses. Both are factored once here and reused by every
/// half-step. One iteration is a P-θ half-step followed by a Q-V half-step; the ∞-norm of
/// the full mismatch vector is checked after each of them.
///
/// Networks with a high R/X ratio converge slowly or not at all with this method.
#[allow(non_snake_case)]
pub(crate) fn fast_decoupled_pf<Solver: Solve>(
    Ybus: &CscMatrix<Complex64>,
    b_xb: &CscMatrix<f64>,
    Sbus: &DVector<Complex64>,
    v_init: &DVector<Complex64>,
    npv: usize,
    npq: usize,
    limits: &SolveLimits,
    solver_p: &mut Solver,
    solver_q: &mut Solver,
) -> SolveOutcome {
    let n_bus = npv + npq;
    let num_state = npv + 2 * npq;
    let mut v = v_init.clone();
    let mut v_m = v.map(|e| e.norm());
    let mut v_a = v.map(|e| e.arg());
    let mut F = DVector::zeros(num_state);
    let mut history = Vec::new();

    let mut mis = power_mismatch(Ybus, &v, Sbus);
    assemble_f(&mut F, n_bus, &mis, num_state, npv);
    let mut norm = inf_norm(&F);
    history.push(norm);
    debug!(iteration = 0, mismatch = norm, "fast-decoupled");
    if norm < limits.tolerance {
        return SolveOutcome::finish(v, 0, history, None);
    }

    let b_p = b_xb.block((0, 0), (n_bus, n_bus));
    let b_pp = (-Ybus.imag()).block((npv, npv), (npq, npq));
    for (mat, solver) in [(&b_p, &mut *solver_p), (&b_pp, &mut *solver_q)] {
        if mat.nrows() == 0 {
            continue;
        }
        if let Err(e) = solver.factor(mat.col_offsets(), mat.row_indices(), mat.values(), mat.nrows()) {
            debug!(reason = e, "B matrix factorization failed");
            return SolveOutcome::finish(v, 0, history, Some(ErrorCode::SingularJacobian));
        }
    }

    for k in 1..=limits.max_iterations {
        if limits.timed_out() {
            return SolveOutcome::finish(v, k - 1, history, Some(ErrorCode::Timeout));
        }

        // P-θ half-step
        let mut dp: Vec<f64> = (0..n_bus).map(|i| mis[i].re / v_m[i]).collect();
        if solve_checked(solver_p, &mut dp).is_err() {
            return SolveOutcome::finish(v, k - 1, history, Some(ErrorCode::SingularJacobian));
        }
        for (i, dx) in dp.iter().enumerate() {
            v_a[i] -= dx;
        }
        v.zip_zip_apply(&v_m, &v_a, |a, vm, va| *a = Complex64::from_polar(vm, va));
        mis = power_mismatch(Ybus, &v, Sbus);
        assemble_f(&mut F, n_bus, &mis, num_state, npv);
        norm = inf_norm(&F);

        // Q-V half-step
        if norm >= limits.tolerance && npq > 0 {
            let mut dq: Vec<f64> = (npv..n_bus).map(|i| mis[i].im / v_m[i]).collect();
            if solve_checked(solver_q, &mut dq).is_err() {
                history.push(norm);
                return SolveOutcome::finish(v, k, history, Some(ErrorCode::SingularJacobian));
            }
            for (i, dx) in dq.iter().enumerate() {
                v_m[npv + i] -= dx;
            }
            v.zip_zip_apply(&v_m, &v_a, |a, vm, va| *a = Complex64::from_polar(vm, va));
            mis = power_mismatch(Ybus, &v, Sbus);
            assemble_f(&mut F, n_bus, &mis, num_state, npv);
            norm = inf_norm(&F);
        }

        history.push(norm);
        debug!(iteration = k, mismatch = norm, "fast-decoupled");
        if norm < limits.tolerance {
            return SolveOutcome::finish(v, k, history, None);
        }
        if !norm.is_finite() {
            return SolveOutcome::finish(v, k, history, Some(ErrorCode::MaxIterationsExceeded));
        }
    }
    SolveOutcome::finish(
        v,
        limits.max_iterations,
        history,
        Some(ErrorCode::MaxIterationsExceeded),
    )
}

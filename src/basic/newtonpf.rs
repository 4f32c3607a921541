use super::{
    config::SolveLimits,
    dsbus_dv::dSbus_dV,
    error::ErrorCode,
    result::{SolveOutcome, inf_norm},
    solver::{Solve, solve_csc},
    sparse::{
        conj::RealImage,
        slice::Slice,
        stack::{csc_hstack, csc_vstack},
    },
};

use nalgebra::*;
use nalgebra_sparse::*;
use num_complex::Complex64;
use tracing::debug;

/// Complex power mismatch `V ⊙ conj(Ybus V) - Sbus`.
#[allow(non_snake_case)]
#[inline]
pub(crate) fn power_mismatch(
    Ybus: &CscMatrix<Complex64>,
    v: &DVector<Complex64>,
    Sbus: &DVector<Complex64>,
) -> DVector<Complex64> {
    v.component_mul(&(Ybus * v).conjugate()) - Sbus
}

/// Newton-Raphson power flow on a system ordered as `[PV | PQ | Slack]`.
///
/// The state is `[Va(pv, pq); Vm(pq)]`. Convergence is tested on the ∞-norm of
/// `F = [Re mis(pv, pq); Im mis(pq)]` before each update, so a solved starting point
/// returns with zero iterations. The Jacobian is rebuilt and factored every iteration.
#[allow(non_snake_case)]
pub(crate) fn newton_pf<Solver: Solve>(
    Ybus: &CscMatrix<Complex64>,
    Sbus: &DVector<Complex64>,
    v_init: &DVector<Complex64>,
    npv: usize,
    npq: usize,
    limits: &SolveLimits,
    solver: &mut Solver,
) -> SolveOutcome {
    let mut v = v_init.clone();
    let n_ext = v.len() - npv - npq;
    let n_bus = npq + npv;
    let num_state = npv + 2 * npq;

    let mut v_m = v.map(|e| e.simd_modulus());
    let mut v_a = v.map(|e| e.simd_argument());
    let mut F = DVector::zeros(num_state);
    let mut history = Vec::new();

    let mut k = 0;
    loop {
        let mis = power_mismatch(Ybus, &v, Sbus);
        assemble_f(&mut F, n_bus, &mis, num_state, npv);
        let norm = inf_norm(&F);
        history.push(norm);
        debug!(iteration = k, mismatch = norm, "newton-raphson");

        if norm < limits.tolerance {
            return SolveOutcome::finish(v, k, history, None);
        }
        if !norm.is_finite() || k >= limits.max_iterations {
            return SolveOutcome::finish(v, k, history, Some(ErrorCode::MaxIterationsExceeded));
        }
        if limits.timed_out() {
            return SolveOutcome::finish(v, k, history, Some(ErrorCode::Timeout));
        }

        let (dS_dVm, dS_dVa) = dSbus_dV(Ybus, &v);
        let jacobian = build_jacobian(&dS_dVm, &dS_dVa, npv, n_ext);
        if let Err(e) = solve_csc(solver, &jacobian, F.as_mut_slice()) {
            debug!(iteration = k, reason = e, "jacobian solve failed");
            return SolveOutcome::finish(v, k, history, Some(ErrorCode::SingularJacobian));
        }

        update_v(&mut v_a, &F, n_bus, &mut v_m, npv, num_state, &mut v);
        k += 1;
    }
}

/// Writes `[Re mis(pv, pq); Im mis(pq)]` into `f`.
#[inline(always)]
pub(crate) fn assemble_f(
    f: &mut DVector<f64>,
    n_bus: usize,
    mis: &DVector<Complex64>,
    num_state: usize,
    npv: usize,
) {
    f.rows_range_mut(0..n_bus)
        .zip_apply(&mis.rows_range(0..n_bus), |a, b| *a = b.simd_real());
    f.rows_range_mut(n_bus..num_state)
        .zip_apply(&(mis.rows_range(npv..n_bus)), |a, b| {
            *a = b.simd_imaginary()
        });
}

#[inline(always)]
fn update_v(
    v_a: &mut DVector<f64>,
    dx: &DVector<f64>,
    n_bus: usize,
    v_m: &mut DVector<f64>,
    npv: usize,
    num_state: usize,
    v: &mut DVector<Complex64>,
) {
    v_a.rows_range_mut(0..n_bus)
        .zip_apply(&dx.rows_range(0..n_bus), |a, b| *a -= b);
    v_m.rows_range_mut(npv..n_bus)
        .zip_apply(&dx.rows_range(n_bus..num_state), |a, b| *a -= b);
    v.zip_zip_apply(v_m, v_a, |a, vm, va| *a = Complex64::from_polar(vm, va));
}

/// Assembles `[[J11 J12], [J21 J22]]` from the non-slack block of the derivatives.
///
/// `J11 = Re dS/dVa (pvpq, pvpq)`, `J12 = Re dS/dVm (pvpq, pq)`,
/// `J21 = Im dS/dVa (pq, pvpq)`, `J22 = Im dS/dVm (pq, pq)`.
#[allow(non_snake_case)]
#[inline(always)]
fn build_jacobian(
    ds_dvm: &CscMatrix<Complex64>,
    ds_dva: &CscMatrix<Complex64>,
    npv: usize,
    n_ext: usize,
) -> CscMatrix<f64> {
    let n_bus = ds_dva.nrows() - n_ext;
    let (real, imag) = ds_dva.block((0, 0), (n_bus, n_bus)).real_imag();
    let (real2, imag2) = ds_dvm.block((0, 0), (n_bus, n_bus)).real_imag();
    let J11 = real;
    let J12 = real2.columns(npv, n_bus);
    let J21 = imag.block((npv, 0), (n_bus - npv, n_bus));
    let J22 = imag2.block((npv, npv), (n_bus - npv, n_bus - npv));

    csc_vstack(&[&csc_hstack(&[&J11, &J12]), &csc_hstack(&[&J21, &J22])])
}

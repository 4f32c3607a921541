//! Holomorphic embedding load flow (HELM).
//!
//! Every non-slack voltage is expanded as a power series `V(s) = Σ V[n] sⁿ` of the embedding
//! parameter. At `s = 0` the network is unloaded (the germ), at `s = 1` it is the scheduled
//! operating point:
//!
//! * PQ buses: `Σ Y V(s) = s conj(S) conj(X(s*))` with `X = 1/V`.
//! * PV buses: `Σ Y V(s) = (s P - j Q(s)) conj(X(s*))` together with
//!   `V(s) conj(V(s*)) = |V[0]|² + s (|Vset|² - |V[0]|²)`, where `Q(s)` is an extra real series.
//! * Slack buses keep their voltage for every `s`.
//!
//! Matching powers of `s` gives one linear system per order whose matrix does not depend on
//! the order, so it is factored once. The series is evaluated at `s = 1` with a diagonal Padé
//! approximant after each order and the result is accepted once the power mismatch is below
//! the tolerance. A series that never settles means the embedded solution branch does not
//! reach `s = 1`, i.e. the operating point has no physical solution.

use nalgebra::{DMatrix, DVector};
use nalgebra_sparse::{CooMatrix, CscMatrix};
use num_complex::Complex64;
use tracing::debug;

use super::{
    config::SolveLimits,
    error::ErrorCode,
    newtonpf::{assemble_f, power_mismatch},
    result::{SolveOutcome, inf_norm},
    solver::{Solve, solve_checked, solve_csc},
    sparse::slice::Slice,
};

/// HELM power flow on a system ordered as `[PV | PQ | Slack]`.
///
/// `v_init` supplies the slack voltages and the PV magnitude setpoints. At most
/// `max_coefficients` series terms are computed; `iterations` of the outcome is the number of
/// terms used.
#[allow(non_snake_case)]
pub(crate) fn helm_pf<Solver: Solve>(
    Ybus: &CscMatrix<Complex64>,
    Sbus: &DVector<Complex64>,
    v_init: &DVector<Complex64>,
    npv: usize,
    npq: usize,
    max_coefficients: usize,
    limits: &SolveLimits,
    solver: &mut Solver,
) -> SolveOutcome {
    let n = v_init.len();
    let n_bus = npv + npq;
    let n_ext = n - n_bus;
    let v_set: Vec<f64> = (0..npv).map(|p| v_init[p].norm()).collect();
    let mismatch_of = |v: &DVector<Complex64>| {
        let mut f = DVector::zeros(npv + 2 * npq);
        assemble_f(&mut f, n_bus, &power_mismatch(Ybus, v, Sbus), npv + 2 * npq, npv);
        inf_norm(&f)
    };

    if n_bus == 0 {
        return SolveOutcome::finish(v_init.clone(), 0, vec![0.0], None);
    }

    let y_nn = Ybus.block((0, 0), (n_bus, n_bus));
    let y_ns = Ybus.block((0, n_bus), (n_bus, n_ext));
    let v_slack = v_init.rows_range(n_bus..n).into_owned();

    // germ: Y_nn V[0] = -Y_ns V_slack
    let mut rhs = interleave(&(-(&y_ns * &v_slack)));
    if let Err(e) = solve_csc(solver, &assemble(&y_nn, &DVector::zeros(0)), &mut rhs) {
        debug!(reason = e, "helm germ solve failed");
        let history = vec![mismatch_of(v_init)];
        return SolveOutcome::finish(v_init.clone(), 0, history, Some(ErrorCode::SingularJacobian));
    }
    let v0 = deinterleave(&rhs, n_bus);
    let x0 = v0.map(|e| e.inv());

    let mut v_coeffs: Vec<DVector<Complex64>> = vec![v0.clone()];
    let mut x_coeffs: Vec<DVector<Complex64>> = vec![x0.clone()];
    let mut q_coeffs: Vec<DVector<f64>> = vec![DVector::zeros(npv)];

    let mut history = Vec::new();
    let mut v = v_init.clone();

    let system = assemble(&y_nn, &v0.rows_range(0..npv).into_owned());
    if let Err(e) = solver.factor(
        system.col_offsets(),
        system.row_indices(),
        system.values(),
        system.nrows(),
    ) {
        debug!(reason = e, "helm system factorization failed");
        history.push(mismatch_of(v_init));
        return SolveOutcome::finish(v, 0, history, Some(ErrorCode::SingularJacobian));
    }

    for order in 0..max_coefficients {
        if order > 0 {
            if limits.timed_out() {
                return SolveOutcome::finish(v, order, history, Some(ErrorCode::Timeout));
            }
            let mut b = order_rhs(order, Sbus, &v_coeffs, &x_coeffs, &q_coeffs, &v_set, npv, n_bus);
            if solve_checked(solver, &mut b).is_err() {
                return SolveOutcome::finish(v, order, history, Some(ErrorCode::NoPhysicalSolution));
            }
            let vn = deinterleave(&b, n_bus);
            let qn = DVector::from_iterator(npv, (0..npv).map(|p| b[2 * n_bus + p]));
            // X = 1/V: X[n] = -(Σ_{l<n} X[l] V[n-l]) / V[0]
            let xn = DVector::from_fn(n_bus, |i, _| {
                let acc: Complex64 = (0..order)
                    .map(|l| x_coeffs[l][i] * if l == 0 { vn[i] } else { v_coeffs[order - l][i] })
                    .sum();
                -acc * x0[i]
            });
            v_coeffs.push(vn);
            x_coeffs.push(xn);
            q_coeffs.push(qn);
        }

        for i in 0..n_bus {
            let series: Vec<Complex64> = v_coeffs.iter().map(|c| c[i]).collect();
            v[i] = pade_at_one(&series);
        }
        for (p, vs) in v_set.iter().enumerate() {
            let m = v[p].norm();
            if m > 0.0 {
                v[p] *= vs / m;
            }
        }
        let norm = mismatch_of(&v);
        history.push(norm);
        debug!(coefficients = order + 1, mismatch = norm, "helm");
        if norm < limits.tolerance {
            return SolveOutcome::finish(v, order + 1, history, None);
        }
        if !norm.is_finite() {
            break;
        }
    }
    let used = v_coeffs.len();
    SolveOutcome::finish(v, used, history, Some(ErrorCode::NoPhysicalSolution))
}

/// Right hand side of order `n ≥ 1` in the interleaved `[Re, Im]` layout followed by the PV
/// magnitude constraints.
#[allow(clippy::too_many_arguments)]
fn order_rhs(
    n: usize,
    sbus: &DVector<Complex64>,
    v: &[DVector<Complex64>],
    x: &[DVector<Complex64>],
    q: &[DVector<f64>],
    v_set: &[f64],
    npv: usize,
    n_bus: usize,
) -> Vec<f64> {
    let j = Complex64::i();
    let mut b = vec![0.0; 2 * n_bus + npv];
    for i in 0..n_bus {
        let rhs = if i < npv {
            let reactive: Complex64 = (1..n).map(|m| q[m][i] * x[n - m][i].conj()).sum();
            sbus[i].re * x[n - 1][i].conj() - j * reactive
        } else {
            sbus[i].conj() * x[n - 1][i].conj()
        };
        b[2 * i] = rhs.re;
        b[2 * i + 1] = rhs.im;
    }
    for p in 0..npv {
        let cross: f64 = (1..n).map(|m| (v[m][p] * v[n - m][p].conj()).re).sum();
        let lift = if n == 1 {
            v_set[p] * v_set[p] - v[0][p].norm_sqr()
        } else {
            0.0
        };
        b[2 * n_bus + p] = 0.5 * lift - 0.5 * cross;
    }
    b
}

/// Real form of the order system.
///
/// Rows and columns `2k`, `2k + 1` hold the real and imaginary parts of bus `k`. One extra
/// unknown `Q[n]` and one magnitude constraint are appended per entry of `v0_pv`.
fn assemble(y_nn: &CscMatrix<Complex64>, v0_pv: &DVector<Complex64>) -> CscMatrix<f64> {
    let n_bus = y_nn.nrows();
    let npv = v0_pv.len();
    let dim = 2 * n_bus + npv;
    let mut coo = CooMatrix::new(dim, dim);
    for (i, k, y) in y_nn.triplet_iter() {
        coo.push(2 * i, 2 * k, y.re);
        coo.push(2 * i, 2 * k + 1, -y.im);
        coo.push(2 * i + 1, 2 * k, y.im);
        coo.push(2 * i + 1, 2 * k + 1, y.re);
    }
    for (p, v0) in v0_pv.iter().enumerate() {
        // j conj(X[0]) Q[n] moved to the left hand side
        let x0 = v0.inv();
        coo.push(2 * p, 2 * n_bus + p, x0.im);
        coo.push(2 * p + 1, 2 * n_bus + p, x0.re);
        // Re(V[n] conj(V[0]))
        coo.push(2 * n_bus + p, 2 * p, v0.re);
        coo.push(2 * n_bus + p, 2 * p + 1, v0.im);
    }
    CscMatrix::from(&coo)
}

fn interleave(v: &DVector<Complex64>) -> Vec<f64> {
    v.iter().flat_map(|c| [c.re, c.im]).collect()
}

fn deinterleave(b: &[f64], n_bus: usize) -> DVector<Complex64> {
    DVector::from_fn(n_bus, |i, _| Complex64::new(b[2 * i], b[2 * i + 1]))
}

/// Value at `s = 1` of the diagonal Padé approximant of a power series.
///
/// A singular denominator system is retried with a lower denominator degree; the partial
/// sum is used when no degree works.
pub(crate) fn pade_at_one(c: &[Complex64]) -> Complex64 {
    let partial: Complex64 = c.iter().sum();
    let n = c.len();
    if n < 3 {
        return partial;
    }
    // a rank-deficient system means the series is rational of lower degree
    (1..=(n - 1) / 2)
        .rev()
        .find_map(|m| pade_with_denominator(c, m))
        .unwrap_or(partial)
}

/// `[L/M]` approximant at `s = 1` with `M = m` and `L = len - 1 - m`.
fn pade_with_denominator(c: &[Complex64], m: usize) -> Option<Complex64> {
    let l = c.len() - 1 - m;
    // Σ_{j=1..m} b_j c[l+k-j] = -c[l+k], k = 1..m
    let mat = DMatrix::from_fn(m, m, |k, jj| {
        let idx = (l + k + 1) as isize - (jj + 1) as isize;
        if idx >= 0 { c[idx as usize] } else { Complex64::new(0.0, 0.0) }
    });
    let rhs = DVector::from_fn(m, |k, _| -c[l + k + 1]);
    let b_tail = mat.lu().solve(&rhs)?;
    let b: Vec<Complex64> = std::iter::once(Complex64::new(1.0, 0.0))
        .chain(b_tail.iter().copied())
        .collect();
    let num: Complex64 = (0..=l)
        .map(|i| (0..=i.min(m)).map(|jj| b[jj] * c[i - jj]).sum::<Complex64>())
        .sum();
    let den: Complex64 = b.iter().sum();
    let value = num / den;
    (value.is_finite() && den.norm() > f64::EPSILON).then_some(value)
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use super::*;
    use crate::basic::{
        config::ConvergenceCriteria,
        newtonpf::newton_pf,
        solver::DefaultSolver,
        system::{NetworkSnapshot, PowerFlowMat},
    };
    use crate::testcases::*;

    fn run(snap: &NetworkSnapshot, max_coefficients: usize) -> (PowerFlowMat, SolveOutcome) {
        let mat = PowerFlowMat::new(
            snap.admittance().y_bus(),
            &snap.s_bus(),
            &snap.flat_start(),
            &snap.bus_types(),
        );
        let limits = SolveLimits::new(&ConvergenceCriteria::default(), Instant::now());
        let out = helm_pf(
            &mat.y_bus,
            &mat.s_bus,
            &mat.v_bus_init,
            mat.npv,
            mat.npq,
            max_coefficients,
            &limits,
            &mut DefaultSolver::default(),
        );
        (mat, out)
    }

    #[test]
    fn test_pade_of_geometric_series() {
        // 1 / (1 - s/2) = Σ (1/2)^n s^n, equal to 2 at s = 1
        let c: Vec<Complex64> = (0..6).map(|k| Complex64::new(0.5f64.powi(k), 0.0)).collect();
        let v = pade_at_one(&c);
        assert!((v - Complex64::new(2.0, 0.0)).norm() < 1e-12);
    }

    #[test]
    fn test_pade_falls_back_to_partial_sum() {
        let c = vec![Complex64::new(1.0, 0.0), Complex64::new(0.0, 0.0), Complex64::new(0.0, 0.0)];
        assert_eq!(pade_at_one(&c), Complex64::new(1.0, 0.0));
    }

    #[test]
    fn test_agrees_with_newton_raphson() {
        for snap in [three_bus(), five_bus()] {
            let (mat, helm) = run(&snap, 40);
            assert!(helm.converged(), "{:?} {:?}", helm.error, helm.history);
            let limits = SolveLimits::new(&ConvergenceCriteria::default(), Instant::now());
            let nr = newton_pf(
                &mat.y_bus,
                &mat.s_bus,
                &mat.v_bus_init,
                mat.npv,
                mat.npq,
                &limits,
                &mut DefaultSolver::default(),
            );
            for (a, b) in helm.v.iter().zip(nr.v.iter()) {
                assert!((a - b).norm() < 1e-5);
            }
        }
    }

    #[test]
    fn test_pv_magnitude_held() {
        let (mat, out) = run(&three_bus(), 40);
        assert!(out.converged());
        let v = mat.restore(&out.v);
        assert!((v[2].norm() - 1.02).abs() < 1e-9);
    }

    #[test]
    fn test_unloaded_network_needs_one_coefficient() {
        let (_, out) = run(&flat_zero_injection(), 30);
        assert!(out.converged());
        assert_eq!(out.iterations, 1);
    }

    #[test]
    fn test_infeasible_load_has_no_physical_solution() {
        let (_, out) = run(&infeasible_two_bus(), 30);
        assert_eq!(out.error, Some(ErrorCode::NoPhysicalSolution));
        assert!(out.iterations <= 30);
    }
}

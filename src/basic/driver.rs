//! Entry point of a single power flow solve.
//!
//! The driver validates its inputs, prepares the starting point, dispatches to one of the
//! solution methods and wraps what comes back into a [`SolverResult`]. Solve-level failures
//! are returned as data; nothing in here panics or raises on a non-converging network.
use std::time::Instant;

use nalgebra::DVector;
use num_complex::Complex64;
use tracing::{debug, info, warn};

use super::{
    config::{ConvergenceCriteria, Method, SolveLimits},
    dcpf::dc_pf,
    error::ErrorCode,
    fdpf::fast_decoupled_pf,
    helm::helm_pf,
    newtonpf::newton_pf,
    qlim::{MAX_Q_PASSES, enforce_q_limits, reactive_injection},
    result::{SolveOutcome, SolverResult, VoltageState},
    solver::DefaultSolver,
    system::{Bus, BusType, NetworkSnapshot, PowerFlowMat, s_bus_of},
};

/// Solves one snapshot with the given method.
///
/// `initial` defaults to the flat start. PV and slack magnitudes, and slack angles, are always
/// reset to their setpoints.
pub fn run(
    snapshot: &NetworkSnapshot,
    method: Method,
    initial: Option<&VoltageState>,
    criteria: &ConvergenceCriteria,
) -> SolverResult {
    let started = Instant::now();
    let types = snapshot.bus_types();
    let rejected = |code| {
        let voltage = match method {
            Method::LinearizedDc => VoltageState::AnglesOnly(snapshot.flat_start().map(|v| v.arg())),
            _ => VoltageState::Complex(snapshot.flat_start()),
        };
        SolverResult::rejected(method, voltage, types.clone(), code, started.elapsed())
    };
    if let Err(e) = criteria.validate() {
        warn!(%e, "rejecting solve");
        return rejected(ErrorCode::InvalidCriteria);
    }
    if let Err(e) = snapshot.check_topology() {
        warn!(%e, "rejecting solve");
        return rejected(ErrorCode::InvalidTopology);
    }

    let v0 = initial_voltage(snapshot, initial);
    let limits = SolveLimits::new(criteria, started);
    let y_bus = snapshot.admittance().y_bus();

    let result = match method {
        Method::NewtonRaphson => with_q_limits(snapshot, v0, criteria, &limits, |mat, limits| {
            newton_pf(
                &mat.y_bus,
                &mat.s_bus,
                &mat.v_bus_init,
                mat.npv,
                mat.npq,
                limits,
                &mut DefaultSolver::default(),
            )
        }),
        Method::FastDecoupled => {
            let b_xb = snapshot.admittance().susceptance_xb();
            with_q_limits(snapshot, v0, criteria, &limits, |mat, limits| {
                fast_decoupled_pf(
                    &mat.y_bus,
                    &mat.permute_real(&b_xb),
                    &mat.s_bus,
                    &mat.v_bus_init,
                    mat.npv,
                    mat.npq,
                    limits,
                    &mut DefaultSolver::default(),
                    &mut DefaultSolver::default(),
                )
            })
        }
        Method::Helm => {
            if criteria.enforce_reactive_limits {
                debug!("reactive limits are not enforced by HELM");
            }
            let mat = PowerFlowMat::new(y_bus, &snapshot.s_bus(), &v0, &types);
            let out = helm_pf(
                &mat.y_bus,
                &mat.s_bus,
                &mat.v_bus_init,
                mat.npv,
                mat.npq,
                criteria.helm_max_coefficients,
                &limits,
                &mut DefaultSolver::default(),
            );
            Pass::from_outcome(&mat, out, types.clone())
        }
        Method::LinearizedDc => {
            if criteria.enforce_reactive_limits {
                debug!("reactive limits do not apply to the DC approximation");
            }
            let mat = PowerFlowMat::new(y_bus, &snapshot.s_bus(), &v0, &types);
            let b = mat.permute_real(&snapshot.admittance().susceptance_xb());
            let out = dc_pf(
                &b,
                &mat.s_bus.map(|s| s.re),
                &mat.v_bus_init.map(|v| v.arg()),
                mat.n_bus(),
                &mut DefaultSolver::default(),
            );
            let theta = DVector::from_fn(out.theta.len(), |i, _| out.theta[mat.reorder_index(i)]);
            Pass {
                voltage: VoltageState::AnglesOnly(theta),
                iterations: 0,
                history: vec![out.residual],
                error: out.error,
                bus_types: types.clone(),
            }
        }
    };

    let res = result.into_result(method, started);
    if res.converged {
        info!(
            %method,
            iterations = res.iterations,
            mismatch = res.mismatch,
            elapsed = ?res.elapsed,
            "power flow converged"
        );
    } else {
        info!(
            %method,
            iterations = res.iterations,
            mismatch = res.mismatch,
            error = ?res.error,
            "power flow failed"
        );
    }
    res
}

/// Tries `methods` in order and returns the first converged result, or the last attempt.
///
/// Topology and criteria failures end the chain because no other method can fix them.
pub fn run_with_fallback(
    snapshot: &NetworkSnapshot,
    methods: &[Method],
    initial: Option<&VoltageState>,
    criteria: &ConvergenceCriteria,
) -> SolverResult {
    let mut last = None;
    for &method in methods {
        let res = run(snapshot, method, initial, criteria);
        if res.converged || res.error.is_some_and(|e| !e.is_retryable()) {
            return res;
        }
        warn!(%method, error = ?res.error, "method failed, trying the next one");
        last = Some(res);
    }
    last.unwrap_or_else(|| run(snapshot, Method::default(), initial, criteria))
}

/// Solve output in original bus order.
struct Pass {
    voltage: VoltageState,
    iterations: usize,
    history: Vec<f64>,
    error: Option<ErrorCode>,
    bus_types: Vec<BusType>,
}

impl Pass {
    fn from_outcome(mat: &PowerFlowMat, out: SolveOutcome, bus_types: Vec<BusType>) -> Self {
        Self {
            voltage: VoltageState::Complex(mat.restore(&out.v)),
            iterations: out.iterations,
            history: out.history,
            error: out.error,
            bus_types,
        }
    }

    fn into_result(self, method: Method, started: Instant) -> SolverResult {
        SolverResult {
            converged: self.error.is_none(),
            voltage: self.voltage,
            iterations: self.iterations,
            mismatch: self.history.last().copied().unwrap_or(f64::INFINITY),
            mismatch_history: self.history,
            elapsed: started.elapsed(),
            method,
            error: self.error,
            bus_types: self.bus_types,
        }
    }
}

/// Runs a mismatch-iterative method, switching PV buses to PQ on reactive limit violations.
///
/// Every pass re-orders the system for the current bus types and warm starts from the last
/// iterate. The iteration cap is shared by all passes.
fn with_q_limits<F>(
    snapshot: &NetworkSnapshot,
    v0: DVector<Complex64>,
    criteria: &ConvergenceCriteria,
    limits: &SolveLimits,
    iterate: F,
) -> Pass
where
    F: Fn(&PowerFlowMat, &SolveLimits) -> SolveOutcome,
{
    let y_bus = snapshot.admittance().y_bus();
    let mut buses = snapshot.buses().to_vec();
    let mut v = v0;
    let mut iterations = 0;
    let mut history = Vec::new();

    for pass in 0..MAX_Q_PASSES {
        clamp_setpoints(&buses, &mut v);
        let types: Vec<BusType> = buses.iter().map(|b| b.bus_type).collect();
        let mat = PowerFlowMat::new(y_bus, &s_bus_of(&buses, snapshot.s_base()), &v, &types);
        let out = iterate(&mat, &limits.remaining(iterations));
        iterations += out.iterations;
        history.extend_from_slice(&out.history);
        v = mat.restore(&out.v);

        let done = |error| Pass {
            voltage: VoltageState::Complex(v.clone()),
            iterations,
            history: history.clone(),
            error,
            bus_types: types.clone(),
        };
        if !out.converged() || !criteria.enforce_reactive_limits {
            return done(out.error);
        }
        let q = reactive_injection(y_bus, &v, snapshot.s_base());
        if !enforce_q_limits(&mut buses, snapshot.buses(), &q, &v, criteria.q_limit_policy) {
            return done(None);
        }
        debug!(pass, "bus types changed, solving again");
    }

    warn!(passes = MAX_Q_PASSES, "reactive limit enforcement did not settle");
    Pass {
        voltage: VoltageState::Complex(v),
        iterations,
        history,
        error: Some(ErrorCode::MaxIterationsExceeded),
        bus_types: buses.iter().map(|b| b.bus_type).collect(),
    }
}

/// Starting voltage: the supplied state when usable, else the flat start, with setpoints applied.
fn initial_voltage(snapshot: &NetworkSnapshot, initial: Option<&VoltageState>) -> DVector<Complex64> {
    let mut v = match initial {
        Some(state) if state.len() != snapshot.n_bus() => {
            warn!(
                expected = snapshot.n_bus(),
                actual = state.len(),
                "initial voltage has the wrong length, using flat start"
            );
            snapshot.flat_start()
        }
        Some(state) => {
            let v = state.to_complex();
            if v.iter().all(|e| e.is_finite() && e.norm() > 0.0) {
                v
            } else {
                warn!("initial voltage is degenerate, using flat start");
                snapshot.flat_start()
            }
        }
        None => snapshot.flat_start(),
    };
    clamp_setpoints(snapshot.buses(), &mut v);
    v
}

fn clamp_setpoints(buses: &[Bus], v: &mut DVector<Complex64>) {
    for bus in buses {
        let e = &mut v[bus.index];
        match bus.bus_type {
            BusType::PV => *e = Complex64::from_polar(bus.vm_pu, e.arg()),
            BusType::Slack => *e = Complex64::from_polar(bus.vm_pu, bus.va_rad),
            BusType::PQ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::basic::config::QLimitPolicy;
    use crate::basic::newtonpf::power_mismatch;
    use crate::testcases::*;

    const ALL: [Method; 4] = [
        Method::NewtonRaphson,
        Method::FastDecoupled,
        Method::Helm,
        Method::LinearizedDc,
    ];

    fn complex(res: &SolverResult) -> DVector<Complex64> {
        match &res.voltage {
            VoltageState::Complex(v) => v.clone(),
            VoltageState::AnglesOnly(_) => panic!("expected complex voltages"),
        }
    }

    #[test]
    fn test_three_bus_newton_raphson() {
        let snap = three_bus();
        let res = run(&snap, Method::NewtonRaphson, None, &ConvergenceCriteria::default());
        assert!(res.converged);
        assert!(res.iterations <= 10);
        assert!(res.mismatch < 1e-6);

        // calculated injections reproduce the schedule at PQ buses and P at the PV bus
        let v = complex(&res);
        let mis = power_mismatch(snap.admittance().y_bus(), &v, &snap.s_bus());
        assert!(mis[1].norm() < 1e-6);
        assert!(mis[2].re.abs() < 1e-6);
        assert!((v[2].norm() - 1.02).abs() < 1e-12);
        assert_eq!(v[0], Complex64::new(1.0, 0.0));
    }

    #[test]
    fn test_injection_consistency_for_ac_methods() {
        let snap = five_bus();
        let s = snap.s_bus();
        for method in [Method::NewtonRaphson, Method::FastDecoupled, Method::Helm] {
            let res = run(&snap, method, None, &ConvergenceCriteria::default());
            assert!(res.converged, "{method} {:?}", res.error);
            let mis = power_mismatch(snap.admittance().y_bus(), &complex(&res), &s);
            for i in 1..snap.n_bus() {
                assert!(mis[i].norm() < 2e-6, "{method} bus {i}");
            }
        }
    }

    #[test]
    fn test_deterministic() {
        let snap = five_bus();
        for method in ALL {
            let a = run(&snap, method, None, &ConvergenceCriteria::default());
            let b = run(&snap, method, None, &ConvergenceCriteria::default());
            assert_eq!(a.voltage, b.voltage);
            assert_eq!(a.iterations, b.iterations);
            assert_eq!(a.mismatch_history, b.mismatch_history);
        }
    }

    #[test]
    fn test_degenerate_network_converges_immediately() {
        let snap = flat_zero_injection();
        for method in [Method::NewtonRaphson, Method::FastDecoupled] {
            let res = run(&snap, method, None, &ConvergenceCriteria::default());
            assert!(res.converged);
            assert_eq!(res.iterations, 0);
            assert_eq!(res.mismatch_history.len(), 1);
            for v in complex(&res).iter() {
                assert!((v - Complex64::new(1.0, 0.0)).norm() < 1e-12);
            }
        }
    }

    #[test]
    fn test_island_without_slack_fails_before_iterating() {
        let snap = two_island();
        for method in ALL {
            let res = run(&snap, method, None, &ConvergenceCriteria::default());
            assert!(!res.converged);
            assert_eq!(res.error, Some(ErrorCode::InvalidTopology));
            assert_eq!(res.iterations, 0);
            assert!(res.mismatch_history.is_empty());
        }
    }

    #[test]
    fn test_island_with_own_slack_solves() {
        let res = run(
            &two_island_two_slacks(),
            Method::NewtonRaphson,
            None,
            &ConvergenceCriteria::default(),
        );
        assert!(res.converged);
    }

    #[test]
    fn test_invalid_criteria() {
        let criteria = ConvergenceCriteria::default().with_tolerance(-1.0);
        let res = run(&three_bus(), Method::NewtonRaphson, None, &criteria);
        assert_eq!(res.error, Some(ErrorCode::InvalidCriteria));
        assert_eq!(res.iterations, 0);
    }

    #[test]
    fn test_iteration_cap_reported() {
        let criteria = ConvergenceCriteria::default()
            .with_tolerance(1e-14)
            .with_max_iterations(1);
        let res = run(&five_bus(), Method::NewtonRaphson, None, &criteria);
        assert_eq!(res.error, Some(ErrorCode::MaxIterationsExceeded));
        assert_eq!(res.iterations, 1);
        // the last iterate is returned
        assert_eq!(res.voltage.len(), 5);
    }

    #[test]
    fn test_exhausted_budget_times_out() {
        // the budget is gone before the first iteration starts
        let criteria = ConvergenceCriteria::default().with_max_duration(Duration::from_nanos(1));
        let res = run(&five_bus(), Method::NewtonRaphson, None, &criteria);
        assert_eq!(res.error, Some(ErrorCode::Timeout));
    }

    #[test]
    fn test_warm_start_from_solution() {
        let snap = five_bus();
        let criteria = ConvergenceCriteria::default();
        let cold = run(&snap, Method::NewtonRaphson, None, &criteria);
        let warm = run(&snap, Method::NewtonRaphson, Some(&cold.voltage), &criteria);
        assert!(warm.converged);
        assert!(warm.iterations < cold.iterations);
    }

    #[test]
    fn test_wrong_length_initial_voltage_falls_back_to_flat_start() {
        let snap = three_bus();
        let bad = VoltageState::Complex(DVector::from_element(2, Complex64::new(1.0, 0.0)));
        let criteria = ConvergenceCriteria::default();
        let a = run(&snap, Method::NewtonRaphson, Some(&bad), &criteria);
        let b = run(&snap, Method::NewtonRaphson, None, &criteria);
        assert!(a.converged);
        assert_eq!(a.voltage, b.voltage);
    }

    #[test]
    fn test_dc_reports_angles_only() {
        let res = run(&lossless_ring(), Method::LinearizedDc, None, &ConvergenceCriteria::default());
        assert!(res.converged);
        assert_eq!(res.iterations, 0);
        assert!(matches!(res.voltage, VoltageState::AnglesOnly(_)));
        assert!(res.mismatch < 1e-10);

        let res = run(&resistive_link(), Method::LinearizedDc, None, &ConvergenceCriteria::default());
        assert_eq!(res.error, Some(ErrorCode::SingularTopology));
    }

    #[test]
    fn test_dc_two_bus() {
        let res = run(&pv_only_two_bus(), Method::LinearizedDc, None, &ConvergenceCriteria::default());
        assert!(res.converged, "{:?}", res.error);
        let VoltageState::AnglesOnly(theta) = &res.voltage else {
            panic!("expected angles");
        };
        // 0.2 p.u. over x = 0.1
        assert!((theta[1] - 0.02).abs() < 1e-12);
        assert_eq!(theta[0], 0.0);
    }

    #[test]
    fn test_three_bus_fast_decoupled() {
        // B'' is 1x1 with a single PQ bus
        let res = run(&three_bus(), Method::FastDecoupled, None, &ConvergenceCriteria::default());
        assert!(res.converged, "{:?}", res.error);
        assert!(res.mismatch < 1e-6);
        let nr = run(&three_bus(), Method::NewtonRaphson, None, &ConvergenceCriteria::default());
        let (v, v_nr) = (complex(&res), complex(&nr));
        assert!(v.iter().zip(v_nr.iter()).all(|(a, b)| (a - b).norm() < 1e-5));
    }

    #[test]
    fn test_reactive_limit_switches_bus_type() {
        let snap = q_limited_two_bus();
        let criteria =
            ConvergenceCriteria::default().with_q_limit_enforcement(true, QLimitPolicy::Permanent);
        let res = run(&snap, Method::NewtonRaphson, None, &criteria);
        assert!(res.converged);
        assert_eq!(res.bus_types, vec![BusType::Slack, BusType::PQ]);
        let v = complex(&res);
        let q = reactive_injection(snap.admittance().y_bus(), &v, snap.s_base());
        assert!((q[1] - 20.0).abs() < 1e-3);
        assert!(v[1].norm() < 1.05);

        // without enforcement the setpoint is held
        let res = run(&snap, Method::NewtonRaphson, None, &ConvergenceCriteria::default());
        assert_eq!(res.bus_types, vec![BusType::Slack, BusType::PV]);
        assert!((complex(&res)[1].norm() - 1.05).abs() < 1e-12);
    }

    #[test]
    fn test_reactive_limits_with_fast_decoupled() {
        let criteria =
            ConvergenceCriteria::default().with_q_limit_enforcement(true, QLimitPolicy::Reevaluate);
        let res = run(&q_limited_two_bus(), Method::FastDecoupled, None, &criteria);
        assert!(res.converged);
        assert_eq!(res.bus_types[1], BusType::PQ);
    }

    #[test]
    fn test_helm_no_physical_solution() {
        let res = run(&infeasible_two_bus(), Method::Helm, None, &ConvergenceCriteria::default());
        assert_eq!(res.error, Some(ErrorCode::NoPhysicalSolution));
    }

    #[test]
    fn test_fallback_chain() {
        let criteria = ConvergenceCriteria::default();
        // fast-decoupled cannot factor B' here, Newton-Raphson can solve it
        let res = run_with_fallback(
            &resistive_link(),
            &[Method::FastDecoupled, Method::NewtonRaphson],
            None,
            &criteria,
        );
        assert!(res.converged);
        assert_eq!(res.method, Method::NewtonRaphson);

        let res = run_with_fallback(
            &two_island(),
            &[Method::NewtonRaphson, Method::Helm],
            None,
            &criteria,
        );
        assert_eq!(res.method, Method::NewtonRaphson);
        assert_eq!(res.error, Some(ErrorCode::InvalidTopology));
    }
}

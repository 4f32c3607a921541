use std::time::Duration;

use nalgebra::DVector;
use num_complex::Complex64;
use serde::{Deserialize, Serialize};

use crate::basic::{config::Method, error::ErrorCode, system::BusType};

/// Bus voltages produced by a solve, in original bus order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum VoltageState {
    /// Complex phasors in p.u.
    Complex(DVector<Complex64>),
    /// Angles in radians; magnitudes are not modelled (DC approximation).
    AnglesOnly(DVector<f64>),
}

impl VoltageState {
    pub fn len(&self) -> usize {
        match self {
            VoltageState::Complex(v) => v.len(),
            VoltageState::AnglesOnly(a) => a.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Complex phasors, substituting unit magnitudes for angle-only states.
    pub fn to_complex(&self) -> DVector<Complex64> {
        match self {
            VoltageState::Complex(v) => v.clone(),
            VoltageState::AnglesOnly(a) => a.map(|va| Complex64::from_polar(1.0, va)),
        }
    }

    pub fn magnitudes(&self) -> DVector<f64> {
        match self {
            VoltageState::Complex(v) => v.map(|e| e.norm()),
            VoltageState::AnglesOnly(a) => DVector::from_element(a.len(), 1.0),
        }
    }

    pub fn angles(&self) -> DVector<f64> {
        match self {
            VoltageState::Complex(v) => v.map(|e| e.arg()),
            VoltageState::AnglesOnly(a) => a.clone(),
        }
    }
}

/// Outcome of one solve call. Solve-level failures are carried in `error`, never raised.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolverResult {
    pub converged: bool,
    /// Last iterate; the solution when `converged`.
    pub voltage: VoltageState,
    pub iterations: usize,
    /// Final mismatch ∞-norm in p.u.
    pub mismatch: f64,
    /// Mismatch ∞-norm of every evaluated iterate, in order.
    pub mismatch_history: Vec<f64>,
    pub elapsed: Duration,
    pub method: Method,
    pub error: Option<ErrorCode>,
    /// Final bus classification, after any PV→PQ switching.
    pub bus_types: Vec<BusType>,
}

impl SolverResult {
    /// A result for a solve that never started.
    pub(crate) fn rejected(
        method: Method,
        voltage: VoltageState,
        bus_types: Vec<BusType>,
        code: ErrorCode,
        elapsed: Duration,
    ) -> Self {
        Self {
            converged: false,
            voltage,
            iterations: 0,
            mismatch: f64::INFINITY,
            mismatch_history: Vec::new(),
            elapsed,
            method,
            error: Some(code),
            bus_types,
        }
    }
}

/// Raw output of one solver pass in reordered bus order.
#[derive(Debug, Clone)]
pub(crate) struct SolveOutcome {
    pub v: DVector<Complex64>,
    pub iterations: usize,
    pub mismatch: f64,
    pub history: Vec<f64>,
    pub error: Option<ErrorCode>,
}

impl SolveOutcome {
    /// The final mismatch is the last entry of `history`.
    pub fn finish(
        v: DVector<Complex64>,
        iterations: usize,
        history: Vec<f64>,
        error: Option<ErrorCode>,
    ) -> Self {
        Self {
            v,
            iterations,
            mismatch: history.last().copied().unwrap_or(f64::INFINITY),
            history,
            error,
        }
    }

    pub fn converged(&self) -> bool {
        self.error.is_none()
    }
}

/// ∞-norm that reports non-finite entries as an infinite norm.
pub(crate) fn inf_norm(f: &DVector<f64>) -> f64 {
    f.iter().fold(0.0, |m: f64, &x| {
        if x.is_finite() {
            m.max(x.abs())
        } else {
            f64::INFINITY
        }
    })
}

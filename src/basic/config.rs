use std::path::Path;
use std::time::{Duration, Instant};

use derive_more::Display;
use serde::{Deserialize, Serialize};

use crate::basic::error::{PfError, Result};

/// Solution method. The set is closed; the driver dispatches on it with a `match`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Display, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Method {
    #[default]
    #[display("newton_raphson")]
    NewtonRaphson,
    #[display("fast_decoupled")]
    FastDecoupled,
    #[display("helm")]
    Helm,
    #[display("linearized_dc")]
    LinearizedDc,
}

/// What happens to a PV bus switched to PQ after a reactive limit violation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QLimitPolicy {
    /// Stays PQ for the rest of the solve.
    #[default]
    Permanent,
    /// Returns to PV when its voltage recovers past the setpoint.
    Reevaluate,
}

/// Convergence criteria passed explicitly to every solve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConvergenceCriteria {
    /// Power mismatch tolerance in p.u. (∞-norm).
    pub tolerance: f64,
    /// Iteration cap, shared across reactive limit passes.
    pub max_iterations: usize,
    pub enforce_reactive_limits: bool,
    pub q_limit_policy: QLimitPolicy,
    /// Optional wall-clock budget for a single solve.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_duration: Option<Duration>,
    /// Maximum number of series coefficients computed by HELM.
    pub helm_max_coefficients: usize,
}

impl Default for ConvergenceCriteria {
    fn default() -> Self {
        Self {
            tolerance: 1e-6,
            max_iterations: 100,
            enforce_reactive_limits: false,
            q_limit_policy: QLimitPolicy::Permanent,
            max_duration: None,
            helm_max_coefficients: 30,
        }
    }
}

impl ConvergenceCriteria {
    pub fn with_tolerance(mut self, tol: f64) -> Self {
        self.tolerance = tol;
        self
    }

    pub fn with_max_iterations(mut self, max_iter: usize) -> Self {
        self.max_iterations = max_iter;
        self
    }

    pub fn with_q_limit_enforcement(mut self, enable: bool, policy: QLimitPolicy) -> Self {
        self.enforce_reactive_limits = enable;
        self.q_limit_policy = policy;
        self
    }

    pub fn with_max_duration(mut self, budget: Duration) -> Self {
        self.max_duration = Some(budget);
        self
    }

    pub fn with_helm_max_coefficients(mut self, n: usize) -> Self {
        self.helm_max_coefficients = n;
        self
    }

    /// Rejects criteria no solve can be run with.
    pub fn validate(&self) -> Result<()> {
        if !(self.tolerance > 0.0) || !self.tolerance.is_finite() {
            return Err(PfError::InvalidCriteria(format!(
                "tolerance must be a positive finite number, got {}",
                self.tolerance
            )));
        }
        if self.max_iterations == 0 {
            return Err(PfError::InvalidCriteria(
                "max_iterations must be positive".into(),
            ));
        }
        if self.helm_max_coefficients < 2 {
            return Err(PfError::InvalidCriteria(format!(
                "helm_max_coefficients must be at least 2, got {}",
                self.helm_max_coefficients
            )));
        }
        if self.max_duration.is_some_and(|d| d.is_zero()) {
            return Err(PfError::InvalidCriteria(
                "max_duration must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// Options of the time-series runner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeSeriesOptions {
    /// Start each step from the previous converged step.
    pub warm_start: bool,
    /// Distribute independent steps over worker threads.
    pub parallel: bool,
}

impl Default for TimeSeriesOptions {
    fn default() -> Self {
        Self {
            warm_start: true,
            parallel: false,
        }
    }
}

/// Top level configuration: method, criteria and time-series options.
///
/// ```json
/// { "method": "fast_decoupled", "criteria": { "tolerance": 1e-8 } }
/// ```
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PowerFlowConfig {
    pub method: Method,
    pub criteria: ConvergenceCriteria,
    pub time_series: TimeSeriesOptions,
}

impl PowerFlowConfig {
    pub fn from_json_str(s: &str) -> Result<Self> {
        let cfg: Self = serde_json::from_str(s)?;
        cfg.criteria.validate()?;
        Ok(cfg)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let s = std::fs::read_to_string(path)?;
        Self::from_json_str(&s)
    }
}

/// Per-pass iteration limits derived from the criteria.
#[derive(Debug, Clone, Copy)]
pub(crate) struct SolveLimits {
    pub tolerance: f64,
    pub max_iterations: usize,
    pub deadline: Option<Instant>,
}

impl SolveLimits {
    pub fn new(criteria: &ConvergenceCriteria, started: Instant) -> Self {
        Self {
            tolerance: criteria.tolerance,
            max_iterations: criteria.max_iterations,
            deadline: criteria.max_duration.map(|d| started + d),
        }
    }

    pub fn timed_out(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Same limits with `used` iterations already spent.
    pub fn remaining(&self, used: usize) -> Self {
        Self {
            max_iterations: self.max_iterations.saturating_sub(used),
            ..*self
        }
    }
}

use std::collections::BTreeMap;
use std::time::Duration;

use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

use crate::basic::{error::ErrorCode, result::SolverResult};

/// Outcome of one time step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeSeriesStep {
    /// Position of the snapshot in the input sequence.
    pub index: usize,
    /// Optional time stamp in seconds.
    pub time_s: Option<f64>,
    pub success: bool,
    pub result: SolverResult,
}

/// Aggregate statistics of a time series run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimeSeriesSummary {
    pub steps: usize,
    pub converged: usize,
    pub failed: usize,
    /// Mean iteration count over converged steps, zero when none converged.
    pub mean_iterations: f64,
    /// Largest final mismatch among converged steps and the step it occurred in.
    pub worst_mismatch: Option<(usize, f64)>,
    pub total_elapsed: Duration,
    pub failures: BTreeMap<ErrorCode, usize>,
}

impl TimeSeriesSummary {
    pub fn from_steps(steps: &[TimeSeriesStep], total_elapsed: Duration) -> Self {
        let ok: Vec<&TimeSeriesStep> = steps.iter().filter(|s| s.success).collect();
        let mean_iterations = if ok.is_empty() {
            0.0
        } else {
            ok.iter().map(|s| s.result.iterations as f64).sum::<f64>() / ok.len() as f64
        };
        let worst_mismatch = ok
            .iter()
            .max_by_key(|s| OrderedFloat(s.result.mismatch))
            .map(|s| (s.index, s.result.mismatch));
        let mut failures = BTreeMap::new();
        for code in steps.iter().filter_map(|s| s.result.error) {
            *failures.entry(code).or_insert(0) += 1;
        }
        Self {
            steps: steps.len(),
            converged: ok.len(),
            failed: steps.len() - ok.len(),
            mean_iterations,
            worst_mismatch,
            total_elapsed,
            failures,
        }
    }
}

/// Results of a time series run, one step per input snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeSeriesResult {
    pub steps: Vec<TimeSeriesStep>,
    pub summary: TimeSeriesSummary,
}

impl TimeSeriesResult {
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Steps that did not converge.
    pub fn failures(&self) -> impl Iterator<Item = &TimeSeriesStep> {
        self.steps.iter().filter(|s| !s.success)
    }
}

//! Replays the power flow over a sequence of snapshots.
//!
//! A failed step never stops the run: it is recorded with its error code and the next step
//! starts from a flat start.
pub mod export;
pub mod profile;
pub mod state;

use std::time::Instant;

use tracing::{info, warn};

use crate::basic::{
    config::{ConvergenceCriteria, Method, PowerFlowConfig, TimeSeriesOptions},
    driver::run,
    error::Result,
    result::{SolverResult, VoltageState},
    system::NetworkSnapshot,
};
use profile::SnapshotProfile;
pub use state::{TimeSeriesResult, TimeSeriesStep, TimeSeriesSummary};

/// Runs one method with fixed criteria over many snapshots.
#[derive(Debug, Clone, Default)]
pub struct TimeSeriesRunner {
    pub method: Method,
    pub criteria: ConvergenceCriteria,
    pub options: TimeSeriesOptions,
}

impl TimeSeriesRunner {
    pub fn new(method: Method, criteria: ConvergenceCriteria, options: TimeSeriesOptions) -> Self {
        Self {
            method,
            criteria,
            options,
        }
    }

    pub fn from_config(config: &PowerFlowConfig) -> Self {
        Self::new(config.method, config.criteria.clone(), config.time_series)
    }

    /// Solves every snapshot; the result has exactly one step per snapshot.
    pub fn run(&self, snapshots: &[NetworkSnapshot]) -> TimeSeriesResult {
        self.run_timed(snapshots, None)
    }

    /// Solves the snapshots of a profile, carrying its time stamps into the result.
    pub fn run_profile(&self, profile: &SnapshotProfile) -> Result<TimeSeriesResult> {
        let snapshots = profile.snapshots()?;
        Ok(self.run_timed(&snapshots, profile.times().as_deref()))
    }

    fn run_timed(&self, snapshots: &[NetworkSnapshot], times: Option<&[f64]>) -> TimeSeriesResult {
        let started = Instant::now();
        let results = if self.options.parallel && !self.options.warm_start {
            self.solve_independent(snapshots)
        } else {
            if self.options.parallel {
                warn!("warm start chains the steps, running the time series sequentially");
            }
            self.solve_sequential(snapshots)
        };

        let steps: Vec<TimeSeriesStep> = results
            .into_iter()
            .enumerate()
            .map(|(index, result)| TimeSeriesStep {
                index,
                time_s: times.and_then(|t| t.get(index).copied()),
                success: result.converged,
                result,
            })
            .collect();
        let summary = TimeSeriesSummary::from_steps(&steps, started.elapsed());
        info!(
            method = %self.method,
            steps = summary.steps,
            converged = summary.converged,
            failed = summary.failed,
            mean_iterations = summary.mean_iterations,
            elapsed = ?summary.total_elapsed,
            "time series finished"
        );
        TimeSeriesResult { steps, summary }
    }

    fn solve_sequential(&self, snapshots: &[NetworkSnapshot]) -> Vec<SolverResult> {
        let mut previous: Option<VoltageState> = None;
        snapshots
            .iter()
            .map(|snap| {
                let initial = previous.as_ref().filter(|v| v.len() == snap.n_bus());
                let res = run(snap, self.method, initial, &self.criteria);
                previous = (self.options.warm_start && res.converged).then(|| res.voltage.clone());
                res
            })
            .collect()
    }

    #[cfg(feature = "parallel")]
    fn solve_independent(&self, snapshots: &[NetworkSnapshot]) -> Vec<SolverResult> {
        use rayon::prelude::*;
        snapshots
            .par_iter()
            .map(|snap| run(snap, self.method, None, &self.criteria))
            .collect()
    }

    #[cfg(not(feature = "parallel"))]
    fn solve_independent(&self, snapshots: &[NetworkSnapshot]) -> Vec<SolverResult> {
        snapshots
            .iter()
            .map(|snap| run(snap, self.method, None, &self.criteria))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::basic::error::ErrorCode;
    use crate::testcases::*;

    fn load_ramp(n: usize) -> Vec<NetworkSnapshot> {
        let base = five_bus();
        (0..n).map(|k| base.scaled(1.0 + 0.01 * k as f64, 1.0)).collect()
    }

    fn runner(warm_start: bool, parallel: bool) -> TimeSeriesRunner {
        TimeSeriesRunner::new(
            Method::NewtonRaphson,
            ConvergenceCriteria::default(),
            TimeSeriesOptions {
                warm_start,
                parallel,
            },
        )
    }

    #[test]
    fn test_warm_start_saves_iterations() {
        let snaps = load_ramp(6);
        let warm = runner(true, false).run(&snaps);
        let cold = runner(false, false).run(&snaps);
        assert_eq!(warm.len(), 6);
        assert_eq!(warm.summary.converged, 6);
        // from the second step on the previous solution is a better start than flat
        for (w, c) in warm.steps.iter().zip(&cold.steps).skip(1) {
            assert!(w.result.iterations <= c.result.iterations);
        }
        // small load changes give small voltage changes
        for pair in warm.steps.windows(2) {
            let a = pair[0].result.voltage.magnitudes();
            let b = pair[1].result.voltage.magnitudes();
            assert!((a - b).amax() < 0.01);
        }
    }

    #[test]
    fn test_failed_step_does_not_stop_the_run() {
        let mut snaps = load_ramp(3);
        snaps.insert(1, two_island());
        snaps.insert(3, infeasible_two_bus());
        let res = runner(true, false).run(&snaps);
        assert_eq!(res.len(), 5);
        assert!(!res.steps[1].success);
        assert_eq!(res.steps[1].result.error, Some(ErrorCode::InvalidTopology));
        assert!(res.steps[2].success);
        assert!(!res.steps[3].success);
        assert!(res.steps[4].success);

        let s = &res.summary;
        assert_eq!((s.steps, s.converged, s.failed), (5, 3, 2));
        assert_eq!(s.failures.get(&ErrorCode::InvalidTopology), Some(&1));
        assert_eq!(res.failures().count(), 2);
        let (worst, mismatch) = s.worst_mismatch.unwrap();
        assert!(res.steps[worst].success);
        assert!(mismatch < 1e-6);
    }

    #[test]
    fn test_fast_decoupled_over_small_networks() {
        let runner = TimeSeriesRunner::new(
            Method::FastDecoupled,
            ConvergenceCriteria::default(),
            TimeSeriesOptions {
                warm_start: true,
                parallel: false,
            },
        );
        let res = runner.run(&[five_bus(), three_bus(), five_bus()]);
        assert_eq!(res.len(), 3);
        assert_eq!(res.summary.converged, 3);
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let snaps = load_ramp(8);
        let seq = runner(false, false).run(&snaps);
        let par = runner(false, true).run(&snaps);
        assert_eq!(seq.len(), par.len());
        for (a, b) in seq.steps.iter().zip(&par.steps) {
            assert_eq!(a.index, b.index);
            assert_eq!(a.result.voltage, b.result.voltage);
            assert_eq!(a.result.iterations, b.result.iterations);
        }
    }

    #[test]
    fn test_profile_times_are_carried() {
        let mut profile = SnapshotProfile::new(three_bus());
        profile
            .push_scaling(Some(0.0), 1.0, 1.0)
            .push_scaling(Some(60.0), 1.1, 0.9);
        let res = runner(true, true).run_profile(&profile).unwrap();
        assert_eq!(res.steps[1].time_s, Some(60.0));
        assert_eq!(res.summary.converged, 2);
    }

    #[test]
    fn test_empty_series() {
        let res = runner(true, false).run(&[]);
        assert!(res.is_empty());
        assert_eq!(res.summary.mean_iterations, 0.0);
        assert_eq!(res.summary.worst_mismatch, None);
    }

    #[test]
    fn test_csv_export() {
        let mut snaps = load_ramp(2);
        snaps.push(two_island());
        let res = runner(true, false).run(&snaps);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("series.csv");
        export::write_csv_file(&res, &path).unwrap();

        let mut rdr = csv::Reader::from_path(&path).unwrap();
        let header = rdr.headers().unwrap().clone();
        assert_eq!(&header[0], "step");
        assert_eq!(header.len(), 6 + 2 * 5);
        let rows: Vec<csv::StringRecord> = rdr.records().map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 3);
        assert_eq!(&rows[0][2], "true");
        assert_eq!(&rows[2][5], "InvalidTopology");
        // the rejected 4-bus step leaves the last bus columns empty
        assert_eq!(&rows[2][6 + 2 * 4], "");
    }
}

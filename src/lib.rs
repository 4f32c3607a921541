//! Steady-state power flow core.
//!
//! [`basic::driver::run`] solves one [`NetworkSnapshot`](basic::system::NetworkSnapshot) with
//! Newton-Raphson, fast-decoupled, HELM or linearized DC; [`timeseries::TimeSeriesRunner`]
//! replays it over a sequence of snapshots.
pub mod basic;
pub mod timeseries;

#[cfg(test)]
pub(crate) mod testcases;

pub mod prelude {
    pub use crate::basic::{
        config::{ConvergenceCriteria, Method, PowerFlowConfig, QLimitPolicy, TimeSeriesOptions},
        driver::{run, run_with_fallback},
        error::{ErrorCode, PfError},
        post_processing::PowerFlowReport,
        result::{SolverResult, VoltageState},
        system::{AdmittanceBranch, AdmittanceModel, Bus, BusType, NetworkSnapshot, QLimits},
    };
    pub use crate::timeseries::{
        TimeSeriesResult, TimeSeriesRunner, TimeSeriesStep, TimeSeriesSummary,
        export::{write_csv, write_csv_file},
        profile::{SnapshotProfile, StepChange},
    };
}

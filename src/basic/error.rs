//! Error types for the power flow core.
//!
//! Two layers exist. [`ErrorCode`] is plain data carried inside a
//! [`SolverResult`](crate::basic::result::SolverResult): solve-level failures
//! never cross the driver boundary as Rust errors. [`PfError`] is only used
//! where failing fast is allowed, i.e. while constructing a snapshot or
//! loading configuration.

use derive_more::Display;
use num_derive::{FromPrimitive, ToPrimitive};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure code attached to a non-converged solve.
///
/// The numeric discriminants are stable and meant for downstream persistence.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
    FromPrimitive,
    ToPrimitive,
)]
pub enum ErrorCode {
    /// Missing slack bus, dimension mismatch or an island without a slack.
    #[display("invalid topology")]
    InvalidTopology = 1,
    /// The Newton-type linear system (Jacobian, B', B'' or HELM matrix) is singular.
    #[display("singular jacobian")]
    SingularJacobian = 2,
    /// The reduced DC susceptance matrix is singular.
    #[display("singular topology")]
    SingularTopology = 3,
    /// Mismatch never dropped below tolerance within the iteration cap.
    #[display("max iterations exceeded")]
    MaxIterationsExceeded = 4,
    /// The HELM series did not stabilize: the operating point is infeasible.
    #[display("no physical solution")]
    NoPhysicalSolution = 5,
    /// The wall-clock budget was exhausted.
    #[display("timeout")]
    Timeout = 6,
    /// Tolerance or iteration cap outside of their valid range.
    #[display("invalid convergence criteria")]
    InvalidCriteria = 7,
}

impl ErrorCode {
    /// Whether retrying the same snapshot with another method can help.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, ErrorCode::InvalidTopology | ErrorCode::InvalidCriteria)
    }
}

/// Fail-fast errors raised before any solve attempt begins.
#[derive(Debug, Error)]
pub enum PfError {
    #[error("admittance matrix is {rows}x{cols} but the network has {buses} buses")]
    DimensionMismatch {
        rows: usize,
        cols: usize,
        buses: usize,
    },

    #[error("bus at position {position} has index {index}, expected contiguous indices 0..n")]
    BusIndex { position: usize, index: usize },

    #[error("network has no slack bus")]
    NoSlack,

    #[error("island containing bus {bus} has no slack bus")]
    IslandWithoutSlack { bus: usize },

    #[error("branch {branch} references bus {bus} outside of 0..{buses}")]
    BranchBus {
        branch: usize,
        bus: i32,
        buses: usize,
    },

    #[error("branch {branch} has no end connected to a bus")]
    FloatingBranch { branch: usize },

    #[error("base power must be positive, got {0}")]
    InvalidBase(f64),

    #[error("invalid convergence criteria: {0}")]
    InvalidCriteria(String),

    #[error("profile has {actual} entries, expected {expected}")]
    ProfileShape { expected: usize, actual: usize },

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse configuration: {0}")]
    Config(#[from] serde_json::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
}

impl PfError {
    /// Maps the error onto the result-level code.
    pub fn code(&self) -> ErrorCode {
        match self {
            PfError::InvalidCriteria(_) | PfError::Config(_) => ErrorCode::InvalidCriteria,
            _ => ErrorCode::InvalidTopology,
        }
    }
}

pub type Result<T> = std::result::Result<T, PfError>;

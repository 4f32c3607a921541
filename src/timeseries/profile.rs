use std::io::Read;

use num_complex::Complex64;
use serde::{Deserialize, Serialize};

use crate::basic::{
    error::{PfError, Result},
    system::NetworkSnapshot,
};

/// Change applied to the base snapshot to obtain one step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StepChange {
    /// Scale consuming buses by `load` and producing buses by `generation`.
    Scale { load: f64, generation: f64 },
    /// Replace the scheduled injections (MW, MVAr) of every bus.
    Injections(Vec<Complex64>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileStep {
    /// Time stamp in seconds.
    pub time_s: Option<f64>,
    pub change: StepChange,
}

/// One row of a scaling profile file.
#[derive(Debug, Deserialize)]
struct ScalingRow {
    time_s: Option<f64>,
    load: f64,
    /// Empty or missing means unscaled generation.
    #[serde(default)]
    generation: Option<f64>,
}

/// A sequence of operating points derived from one base snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotProfile {
    base: NetworkSnapshot,
    steps: Vec<ProfileStep>,
}

impl SnapshotProfile {
    pub fn new(base: NetworkSnapshot) -> Self {
        Self {
            base,
            steps: Vec::new(),
        }
    }

    pub fn base(&self) -> &NetworkSnapshot {
        &self.base
    }

    pub fn steps(&self) -> &[ProfileStep] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn push_scaling(&mut self, time_s: Option<f64>, load: f64, generation: f64) -> &mut Self {
        self.steps.push(ProfileStep {
            time_s,
            change: StepChange::Scale { load, generation },
        });
        self
    }

    /// Adds a step with explicit per-bus injections; the row must cover every bus.
    pub fn push_injections(&mut self, time_s: Option<f64>, s_mva: Vec<Complex64>) -> Result<&mut Self> {
        if s_mva.len() != self.base.n_bus() {
            return Err(PfError::ProfileShape {
                expected: self.base.n_bus(),
                actual: s_mva.len(),
            });
        }
        self.steps.push(ProfileStep {
            time_s,
            change: StepChange::Injections(s_mva),
        });
        Ok(self)
    }

    /// Reads scaling steps from CSV with the columns `time_s`, `load` and optionally `generation`.
    pub fn scaling_from_csv<R: Read>(base: NetworkSnapshot, reader: R) -> Result<Self> {
        let mut profile = Self::new(base);
        let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
        for row in rdr.deserialize() {
            let row: ScalingRow = row?;
            profile.push_scaling(row.time_s, row.load, row.generation.unwrap_or(1.0));
        }
        Ok(profile)
    }

    /// Materializes the snapshot of every step.
    pub fn snapshots(&self) -> Result<Vec<NetworkSnapshot>> {
        self.steps
            .iter()
            .map(|step| match &step.change {
                StepChange::Scale { load, generation } => Ok(self.base.scaled(*load, *generation)),
                StepChange::Injections(s) => self.base.with_injections(s),
            })
            .collect()
    }

    /// Time stamps of all steps, present only when every step carries one.
    pub fn times(&self) -> Option<Vec<f64>> {
        self.steps.iter().map(|s| s.time_s).collect()
    }
}

use nalgebra::DVector;
use num_complex::Complex64;
use petgraph::unionfind::UnionFind;
use serde::{Deserialize, Serialize};

use super::admittance::AdmittanceModel;
use crate::basic::error::{PfError, Result};

/// Bus classification fixing which quantities are known and which are solved for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BusType {
    /// V and θ fixed, P and Q calculated.
    Slack,
    /// P and |V| fixed, Q and θ calculated.
    PV,
    /// P and Q fixed, |V| and θ calculated.
    PQ,
}

/// Reactive power limits of a PV bus in MVAr.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QLimits {
    pub min_mvar: f64,
    pub max_mvar: f64,
}

/// Represents a bus with its classification and scheduled quantities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bus {
    /// Position of the bus in the admittance matrix.
    pub index: usize,
    pub bus_type: BusType,
    /// Scheduled net real injection in MW (generation positive).
    pub p_mw: f64,
    /// Scheduled net reactive injection in MVAr, only meaningful for PQ buses.
    pub q_mvar: f64,
    /// Voltage magnitude setpoint in p.u. for PV and slack buses.
    pub vm_pu: f64,
    /// Voltage angle setpoint in radians for slack buses.
    pub va_rad: f64,
    pub q_limits: Option<QLimits>,
}

impl Bus {
    pub fn slack(index: usize, vm_pu: f64, va_rad: f64) -> Self {
        Self {
            index,
            bus_type: BusType::Slack,
            p_mw: 0.0,
            q_mvar: 0.0,
            vm_pu,
            va_rad,
            q_limits: None,
        }
    }

    pub fn pv(index: usize, p_mw: f64, vm_pu: f64) -> Self {
        Self {
            index,
            bus_type: BusType::PV,
            p_mw,
            q_mvar: 0.0,
            vm_pu,
            va_rad: 0.0,
            q_limits: None,
        }
    }

    pub fn pq(index: usize, p_mw: f64, q_mvar: f64) -> Self {
        Self {
            index,
            bus_type: BusType::PQ,
            p_mw,
            q_mvar,
            vm_pu: 1.0,
            va_rad: 0.0,
            q_limits: None,
        }
    }

    pub fn with_q_limits(mut self, min_mvar: f64, max_mvar: f64) -> Self {
        self.q_limits = Some(QLimits { min_mvar, max_mvar });
        self
    }
}

/// Scheduled complex injections in p.u. for a bus list, following each bus's own type.
pub fn s_bus_of(buses: &[Bus], s_base_mva: f64) -> DVector<Complex64> {
    let divider = 1.0 / s_base_mva;
    DVector::from_iterator(
        buses.len(),
        buses.iter().map(|b| match b.bus_type {
            BusType::PQ => Complex64::new(b.p_mw, b.q_mvar) * divider,
            BusType::PV => Complex64::new(b.p_mw * divider, 0.0),
            BusType::Slack => Complex64::new(0.0, 0.0),
        }),
    )
}

/// Immutable admittance and injection data of one operating point.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkSnapshot {
    admittance: AdmittanceModel,
    buses: Vec<Bus>,
    s_base_mva: f64,
}

impl NetworkSnapshot {
    /// Builds a snapshot, rejecting malformed data before any solve begins.
    ///
    /// Island/slack consistency is not checked here: that is a property of the topology the
    /// driver validates per solve.
    pub fn new(admittance: AdmittanceModel, buses: Vec<Bus>, s_base_mva: f64) -> Result<Self> {
        if !(s_base_mva > 0.0) || !s_base_mva.is_finite() {
            return Err(PfError::InvalidBase(s_base_mva));
        }
        for (position, bus) in buses.iter().enumerate() {
            if bus.index != position {
                return Err(PfError::BusIndex {
                    position,
                    index: bus.index,
                });
            }
        }
        let y = admittance.y_bus();
        if y.nrows() != y.ncols() || y.nrows() != buses.len() {
            return Err(PfError::DimensionMismatch {
                rows: y.nrows(),
                cols: y.ncols(),
                buses: buses.len(),
            });
        }
        Ok(Self {
            admittance,
            buses,
            s_base_mva,
        })
    }

    pub fn admittance(&self) -> &AdmittanceModel {
        &self.admittance
    }

    pub fn buses(&self) -> &[Bus] {
        &self.buses
    }

    pub fn s_base(&self) -> f64 {
        self.s_base_mva
    }

    pub fn n_bus(&self) -> usize {
        self.buses.len()
    }

    pub fn bus_types(&self) -> Vec<BusType> {
        self.buses.iter().map(|b| b.bus_type).collect()
    }

    /// Scheduled complex injections in p.u.
    pub fn s_bus(&self) -> DVector<Complex64> {
        s_bus_of(&self.buses, self.s_base_mva)
    }

    /// Flat start: unit magnitude at PQ buses, setpoint magnitudes at PV/slack buses, slack angles
    /// at their setpoint and zero elsewhere.
    pub fn flat_start(&self) -> DVector<Complex64> {
        DVector::from_iterator(
            self.buses.len(),
            self.buses.iter().map(|b| match b.bus_type {
                BusType::PQ => Complex64::new(1.0, 0.0),
                BusType::PV => Complex64::new(b.vm_pu, 0.0),
                BusType::Slack => Complex64::from_polar(b.vm_pu, b.va_rad),
            }),
        )
    }

    /// Copy of this snapshot with new scheduled injections (MW, MVAr) per bus.
    ///
    /// Slack entries are ignored and the reactive part is ignored for PV buses.
    pub fn with_injections(&self, s_mva: &[Complex64]) -> Result<Self> {
        if s_mva.len() != self.buses.len() {
            return Err(PfError::ProfileShape {
                expected: self.buses.len(),
                actual: s_mva.len(),
            });
        }
        let mut next = self.clone();
        for (bus, s) in next.buses.iter_mut().zip(s_mva) {
            bus.p_mw = s.re;
            bus.q_mvar = s.im;
        }
        Ok(next)
    }

    /// Copy with consuming buses scaled by `load` and producing buses scaled by `generation`.
    ///
    /// A bus consumes when its real injection is negative, or zero with a negative reactive one.
    pub fn scaled(&self, load: f64, generation: f64) -> Self {
        let mut next = self.clone();
        for bus in next.buses.iter_mut().filter(|b| b.bus_type != BusType::Slack) {
            let consuming = bus.p_mw < 0.0 || (bus.p_mw == 0.0 && bus.q_mvar < 0.0);
            let factor = if consuming { load } else { generation };
            bus.p_mw *= factor;
            bus.q_mvar *= factor;
        }
        next
    }

    /// Checks that the Ybus matches the bus table and every island has a slack bus.
    ///
    /// Islands are found by union-find over the off-diagonal sparsity pattern of the Ybus.
    pub fn check_topology(&self) -> Result<()> {
        let y = self.admittance.y_bus();
        let n = self.buses.len();
        if y.nrows() != y.ncols() || y.nrows() != n {
            return Err(PfError::DimensionMismatch {
                rows: y.nrows(),
                cols: y.ncols(),
                buses: n,
            });
        }
        if !self.buses.iter().any(|b| b.bus_type == BusType::Slack) {
            return Err(PfError::NoSlack);
        }
        let islands = self.islands();
        let mut has_slack = vec![false; n];
        for bus in &self.buses {
            if bus.bus_type == BusType::Slack {
                has_slack[islands[bus.index]] = true;
            }
        }
        match (0..n).find(|&i| !has_slack[islands[i]]) {
            Some(bus) => Err(PfError::IslandWithoutSlack { bus }),
            None => Ok(()),
        }
    }

    /// Island label (a representative bus index) of every bus.
    pub fn islands(&self) -> Vec<usize> {
        let n = self.buses.len();
        let mut uf = UnionFind::<usize>::new(n);
        for (r, c, v) in self.admittance.y_bus().triplet_iter() {
            if r != c && v.norm() > 0.0 {
                uf.union(r, c);
            }
        }
        (0..n).map(|i| uf.find(i)).collect()
    }
}

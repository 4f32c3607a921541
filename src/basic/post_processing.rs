//! Bus and branch quantities derived from a solver result.
use std::fmt;

use nalgebra::DVector;
use num_complex::Complex64;
use serde::{Deserialize, Serialize};
use tabled::{Table, settings::Style};

mod res_display;
use res_display::*;

use super::{
    config::Method,
    result::{SolverResult, VoltageState},
    system::{BusType, NetworkSnapshot},
};

/// Results of one bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusResult {
    pub index: usize,
    pub bus_type: BusType,
    pub vm_pu: f64,
    pub va_deg: f64,
    /// Calculated net injection (MW).
    pub p_mw: f64,
    /// Calculated net injection (MVAr), zero for DC results.
    pub q_mvar: f64,
    /// Calculated minus scheduled real injection (MW), zero at slack buses.
    pub dp_mw: f64,
    /// Calculated minus scheduled reactive injection (MVAr), only set at PQ buses.
    pub dq_mvar: f64,
}

/// Flows of one two-port branch, positive into the branch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BranchResult {
    /// Position in the branch list of the admittance model.
    pub index: usize,
    pub from: usize,
    pub to: usize,
    pub p_from_mw: f64,
    pub q_from_mvar: f64,
    pub p_to_mw: f64,
    pub q_to_mvar: f64,
    pub pl_mw: f64,
    pub ql_mvar: f64,
    /// Apparent power at the more loaded end relative to the rating.
    pub loading_percent: Option<f64>,
}

/// Per-bus and per-branch view of a solve together with system totals.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PowerFlowReport {
    pub method: Method,
    pub converged: bool,
    pub buses: Vec<BusResult>,
    /// Empty when the snapshot carries no branch data.
    pub branches: Vec<BranchResult>,
    pub total_p_loss_mw: f64,
    pub total_q_loss_mvar: f64,
    pub slack_p_mw: f64,
    pub slack_q_mvar: f64,
    /// Largest bus mismatch in MVA-equivalent units (max of |dP|, |dQ|).
    pub max_mismatch_mva: f64,
}

impl PowerFlowReport {
    /// Builds the report. Pure: the snapshot and the result are only read.
    pub fn from_result(snapshot: &NetworkSnapshot, result: &SolverResult) -> Self {
        let base = snapshot.s_base();
        let scheduled = snapshot.s_bus();
        let dc = matches!(result.voltage, VoltageState::AnglesOnly(_));
        let v = result.voltage.to_complex();
        let theta = result.voltage.angles();

        let s_calc: DVector<Complex64> = if dc {
            let b = snapshot.admittance().susceptance_xb();
            (&b * &theta).map(|p| Complex64::new(p * base, 0.0))
        } else {
            let y = snapshot.admittance().y_bus();
            v.component_mul(&(y * &v).conjugate()) * Complex64::new(base, 0.0)
        };

        let buses: Vec<BusResult> = snapshot
            .buses()
            .iter()
            .map(|bus| {
                let i = bus.index;
                let bus_type = result.bus_types.get(i).copied().unwrap_or(bus.bus_type);
                let s = s_calc[i];
                let dp_mw = match bus.bus_type {
                    BusType::Slack => 0.0,
                    _ => s.re - scheduled[i].re * base,
                };
                let dq_mvar = match (bus.bus_type, bus_type) {
                    (BusType::PQ, BusType::PQ) if !dc => s.im - scheduled[i].im * base,
                    _ => 0.0,
                };
                BusResult {
                    index: i,
                    bus_type,
                    vm_pu: v[i].norm(),
                    va_deg: theta[i].to_degrees(),
                    p_mw: s.re,
                    q_mvar: s.im,
                    dp_mw,
                    dq_mvar,
                }
            })
            .collect();

        let branches = if dc {
            dc_branch_flows(snapshot, &theta)
        } else {
            ac_branch_flows(snapshot, &v)
        };

        let slack = buses.iter().filter(|b| b.bus_type == BusType::Slack);
        let max_mismatch_mva = buses
            .iter()
            .map(|b| b.dp_mw.abs().max(b.dq_mvar.abs()))
            .fold(0.0, f64::max);
        Self {
            method: result.method,
            converged: result.converged,
            total_p_loss_mw: branches.iter().map(|b| b.pl_mw).sum(),
            total_q_loss_mvar: branches.iter().map(|b| b.ql_mvar).sum(),
            slack_p_mw: slack.clone().map(|b| b.p_mw).sum(),
            slack_q_mvar: slack.map(|b| b.q_mvar).sum(),
            max_mismatch_mva,
            buses,
            branches,
        }
    }
}

fn loading(rate_mva: Option<f64>, sf: Complex64, st: Complex64) -> Option<f64> {
    rate_mva
        .filter(|r| *r > 0.0)
        .map(|r| sf.norm().max(st.norm()) / r * 100.0)
}

fn ac_branch_flows(snapshot: &NetworkSnapshot, v: &DVector<Complex64>) -> Vec<BranchResult> {
    let (Some(branches), Some((yf, yt))) = (
        snapshot.admittance().branches(),
        snapshot.admittance().branch_mats(),
    ) else {
        return Vec::new();
    };
    let base = snapshot.s_base();
    let i_f = &yf * v;
    let i_t = &yt * v;
    branches
        .iter()
        .enumerate()
        .filter(|(_, br)| br.port.is_two_port())
        .map(|(k, br)| {
            let (f, t) = (br.port.from_bus() as usize, br.port.to_bus() as usize);
            let sf = v[f] * i_f[k].conj() * base;
            let st = v[t] * i_t[k].conj() * base;
            let loss = sf + st;
            BranchResult {
                index: k,
                from: f,
                to: t,
                p_from_mw: sf.re,
                q_from_mvar: sf.im,
                p_to_mw: st.re,
                q_to_mvar: st.im,
                pl_mw: loss.re,
                ql_mvar: loss.im,
                loading_percent: loading(br.rate_mva, sf, st),
            }
        })
        .collect()
}

/// `p_from = (θf − θt)/x`; DC branches are lossless and carry no reactive power.
fn dc_branch_flows(snapshot: &NetworkSnapshot, theta: &DVector<f64>) -> Vec<BranchResult> {
    let Some(branches) = snapshot.admittance().branches() else {
        return Vec::new();
    };
    let base = snapshot.s_base();
    branches
        .iter()
        .enumerate()
        .filter(|(_, br)| br.port.is_two_port())
        .map(|(k, br)| {
            let (f, t) = (br.port.from_bus() as usize, br.port.to_bus() as usize);
            let x = br.reactance();
            let p = if x == 0.0 { 0.0 } else { (theta[f] - theta[t]) / x * base };
            let s = Complex64::new(p, 0.0);
            BranchResult {
                index: k,
                from: f,
                to: t,
                p_from_mw: p,
                q_from_mvar: 0.0,
                p_to_mw: -p,
                q_to_mvar: 0.0,
                pl_mw: 0.0,
                ql_mvar: 0.0,
                loading_percent: loading(br.rate_mva, s, s),
            }
        })
        .collect()
}

impl fmt::Display for PowerFlowReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = if self.converged { "converged" } else { "not converged" };
        writeln!(f, "{} ({status})", self.method)?;

        let bus_rows = self.buses.iter().map(|b| BusResTable {
            Bus: b.index,
            Type: format!("{:?}", b.bus_type),
            Vm: FloatWrapper::new(b.vm_pu, 4),
            Va: FloatWrapper::new(b.va_deg, 3),
            P_mw: FloatWrapper::new(b.p_mw, 3),
            Q_mvar: FloatWrapper::new(b.q_mvar, 3),
            dP_mw: FloatWrapper::new(b.dp_mw, 6),
            dQ_mvar: FloatWrapper::new(b.dq_mvar, 6),
        });
        writeln!(f, "{}", Table::new(bus_rows).with(Style::markdown()))?;

        if !self.branches.is_empty() {
            let line_rows = self.branches.iter().map(|b| LineResTable {
                from: b.from,
                to: b.to,
                p_from_mw: FloatWrapper::new(b.p_from_mw, 3),
                q_from_mvar: FloatWrapper::new(b.q_from_mvar, 3),
                p_to_mw: FloatWrapper::new(b.p_to_mw, 3),
                q_to_mvar: FloatWrapper::new(b.q_to_mvar, 3),
                pl_mw: FloatWrapper::new(b.pl_mw, 3),
                ql_mvar: FloatWrapper::new(b.ql_mvar, 3),
                loading_percent: b
                    .loading_percent
                    .map(|l| FloatWrapper::new(l, 1).to_string())
                    .unwrap_or_default(),
            });
            writeln!(f, "{}", Table::new(line_rows).with(Style::markdown()))?;
        }

        write!(
            f,
            "losses: {} MW, {} MVAr | slack: {} MW, {} MVAr | max mismatch: {}",
            FloatWrapper::new(self.total_p_loss_mw, 3),
            FloatWrapper::new(self.total_q_loss_mvar, 3),
            FloatWrapper::new(self.slack_p_mw, 3),
            FloatWrapper::new(self.slack_q_mvar, 3),
            FloatWrapper::new(self.max_mismatch_mva, 6),
        )
    }
}

use nalgebra::Complex;
use nalgebra_sparse::{CooMatrix, CscMatrix, CsrMatrix};
use num_complex::Complex64;
use num_traits::One;
use serde::{Deserialize, Serialize};

use crate::basic::error::{PfError, Result};
use crate::basic::sparse::conj::RealImage;

/// Represents the ground node in the network.
pub const GND: i32 = -1;

/// Represents an admittance value in a power system.
///
/// `Admittance` is a wrapper around a complex number representing the admittance value in p.u.
#[derive(Clone, Copy, Default, PartialEq, Debug, Serialize, Deserialize)]
pub struct Admittance(pub Complex<f64>);

/// Represents a port with two integer values.
///
/// `Port2` is a structure holding the (from, to) bus indices of a branch; a `GND` end
/// turns the element into a shunt.
#[derive(Default, Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Port2(pub nalgebra::Vector2<i32>);

impl Port2 {
    pub fn new(from: i32, to: i32) -> Self {
        Self(nalgebra::Vector2::new(from, to))
    }
    pub fn from_bus(&self) -> i32 {
        self.0[0]
    }
    pub fn to_bus(&self) -> i32 {
        self.0[1]
    }
    /// Both ends are connected to a bus.
    pub fn is_two_port(&self) -> bool {
        self.0[0] >= 0 && self.0[1] >= 0
    }
}

/// Per-unit admittance data of one branch, used for Ybus assembly and flow recovery.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AdmittanceBranch {
    /// Series admittance (p.u.).
    pub y: Admittance,
    /// Connected buses; `to == GND` for shunt elements.
    pub port: Port2,
    /// Total charging susceptance (p.u.), split equally between both ends.
    pub b_charging: f64,
    /// Complex off-nominal ratio on the from side.
    pub tap: Complex64,
    /// Thermal rating in MVA.
    pub rate_mva: Option<f64>,
}

impl AdmittanceBranch {
    /// A line from series resistance/reactance and total charging, all in p.u.
    pub fn line(from: usize, to: usize, r: f64, x: f64, b: f64) -> Self {
        Self {
            y: Admittance(Complex64::new(r, x).inv()),
            port: Port2::new(from as i32, to as i32),
            b_charging: b,
            tap: Complex64::one(),
            rate_mva: None,
        }
    }

    /// A shunt admittance connected between `bus` and ground.
    pub fn shunt(bus: usize, y: Complex64) -> Self {
        Self {
            y: Admittance(y),
            port: Port2::new(bus as i32, GND),
            b_charging: 0.0,
            tap: Complex64::one(),
            rate_mva: None,
        }
    }

    pub fn with_tap(mut self, ratio: f64, shift_rad: f64) -> Self {
        self.tap = Complex64::from_polar(ratio, shift_rad);
        self
    }

    pub fn with_rating(mut self, rate_mva: f64) -> Self {
        self.rate_mva = Some(rate_mva);
        self
    }

    /// Series reactance implied by the series admittance.
    pub fn reactance(&self) -> f64 {
        self.y.0.inv().im
    }

    /// The 2x2 primitive admittance `[yff yft; ytf ytt]` of the branch.
    pub fn primitive(&self) -> (Complex64, Complex64, Complex64, Complex64) {
        let ys = self.y.0;
        let bc = Complex64::new(0.0, self.b_charging / 2.0);
        let tap = self.tap;
        let ytt = ys + bc;
        let yff = ytt / tap.norm_sqr();
        let yft = -ys / tap.conj();
        let ytf = -ys / tap;
        (yff, yft, ytf, ytt)
    }
}

/// Admittance data of one operating point.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdmittanceModel {
    y_bus: CscMatrix<Complex64>,
    branches: Option<Vec<AdmittanceBranch>>,
}

impl AdmittanceModel {
    /// Wraps a ready Ybus without branch data.
    pub fn from_ybus(y_bus: CscMatrix<Complex64>) -> Self {
        Self {
            y_bus,
            branches: None,
        }
    }

    /// Assembles the Ybus from per-unit branch admittances.
    ///
    /// `Ybus = Cf^T * Yf + Ct^T * Yt`, where `Cf`/`Ct` are the from/to incidence matrices
    /// and `Yf`/`Yt` the branch-bus admittance matrices.
    pub fn from_branches(nodes: usize, branches: Vec<AdmittanceBranch>) -> Result<Self> {
        for (idx, br) in branches.iter().enumerate() {
            if br.port.from_bus() < 0 && br.port.to_bus() < 0 {
                return Err(PfError::FloatingBranch { branch: idx });
            }
            for bus in [br.port.from_bus(), br.port.to_bus()] {
                if bus >= nodes as i32 || bus < GND {
                    return Err(PfError::BranchBus {
                        branch: idx,
                        bus,
                        buses: nodes,
                    });
                }
            }
        }
        let (cf, ct) = create_incidence_mats(nodes, &branches);
        let (yf, yt) = create_branch_mats(nodes, &branches);
        let y_bus = &cf.transpose() * &yf + &ct.transpose() * &yt;
        Ok(Self {
            y_bus: CscMatrix::from(&y_bus),
            branches: Some(branches),
        })
    }

    pub fn y_bus(&self) -> &CscMatrix<Complex64> {
        &self.y_bus
    }

    pub fn branches(&self) -> Option<&[AdmittanceBranch]> {
        self.branches.as_deref()
    }

    pub fn dim(&self) -> usize {
        self.y_bus.nrows()
    }

    /// Susceptance matrix used by the decoupled and DC methods.
    ///
    /// With branch data this is the XB `B` built from `1/x` of every two-port branch,
    /// ignoring resistance, charging, shunts and taps. Without it, `-Im(Ybus)` is used.
    pub fn susceptance_xb(&self) -> CscMatrix<f64> {
        let Some(branches) = self.branches.as_ref() else {
            return -self.y_bus.imag();
        };
        let n = self.dim();
        let mut coo = CooMatrix::new(n, n);
        for br in branches.iter().filter(|b| b.port.is_two_port()) {
            let x = br.reactance();
            if x == 0.0 {
                continue;
            }
            let (f, t) = (br.port.from_bus() as usize, br.port.to_bus() as usize);
            let b = 1.0 / x;
            coo.push(f, f, b);
            coo.push(t, t, b);
            coo.push(f, t, -b);
            coo.push(t, f, -b);
        }
        CscMatrix::from(&coo)
    }

    /// Branch-bus admittance matrices `(Yf, Yt)` for flow recovery.
    pub fn branch_mats(&self) -> Option<(CsrMatrix<Complex64>, CsrMatrix<Complex64>)> {
        self.branches
            .as_ref()
            .map(|brs| create_branch_mats(self.dim(), brs))
    }
}

/// Creates the from/to incidence matrices of the network; `GND` ends are dropped.
fn create_incidence_mats(
    nodes: usize,
    branches: &[AdmittanceBranch],
) -> (CsrMatrix<Complex64>, CsrMatrix<Complex64>) {
    let mut cf = CooMatrix::new(branches.len(), nodes);
    let mut ct = CooMatrix::new(branches.len(), nodes);
    for (idx, br) in branches.iter().enumerate() {
        if br.port.from_bus() >= 0 {
            cf.push(idx, br.port.from_bus() as usize, Complex64::one());
        }
        if br.port.to_bus() >= 0 {
            ct.push(idx, br.port.to_bus() as usize, Complex64::one());
        }
    }
    (CsrMatrix::from(&cf), CsrMatrix::from(&ct))
}

/// Creates `Yf` and `Yt` such that `If = Yf * V` and `It = Yt * V`.
fn create_branch_mats(
    nodes: usize,
    branches: &[AdmittanceBranch],
) -> (CsrMatrix<Complex64>, CsrMatrix<Complex64>) {
    let mut yf = CooMatrix::new(branches.len(), nodes);
    let mut yt = CooMatrix::new(branches.len(), nodes);
    for (idx, br) in branches.iter().enumerate() {
        let (f, t) = (br.port.from_bus(), br.port.to_bus());
        if f >= 0 && t >= 0 {
            let (yff, yft, ytf, ytt) = br.primitive();
            yf.push(idx, f as usize, yff);
            yf.push(idx, t as usize, yft);
            yt.push(idx, f as usize, ytf);
            yt.push(idx, t as usize, ytt);
        } else {
            // single-ended element to ground
            let bus = f.max(t) as usize;
            let y = br.y.0 + Complex64::new(0.0, br.b_charging / 2.0);
            if f >= 0 {
                yf.push(idx, bus, y);
            } else {
                yt.push(idx, bus, y);
            }
        }
    }
    (CsrMatrix::from(&yf), CsrMatrix::from(&yt))
}

/// Sum of all entries of each row; zero for a shunt-free network.
#[cfg(test)]
pub(crate) fn row_sums(mat: &CscMatrix<Complex64>) -> Vec<Complex64> {
    let mut sums = vec![Complex64::new(0.0, 0.0); mat.nrows()];
    for (r, _, v) in mat.triplet_iter() {
        sums[r] += v;
    }
    sums
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::DMatrix;

    #[test]
    fn test_ybus_from_lines() {
        let branches = vec![
            AdmittanceBranch::line(0, 1, 0.0, 0.1, 0.0),
            AdmittanceBranch::line(1, 2, 0.0, 0.2, 0.0),
        ];
        let model = AdmittanceModel::from_branches(3, branches).unwrap();
        let y = DMatrix::from(model.y_bus());
        assert!((y[(0, 0)] - Complex64::new(0.0, -10.0)).norm() < 1e-12);
        assert!((y[(1, 1)] - Complex64::new(0.0, -15.0)).norm() < 1e-12);
        assert!((y[(0, 1)] - Complex64::new(0.0, 10.0)).norm() < 1e-12);
        assert!(y[(0, 2)].norm() < 1e-12);
        // shunt-free network: rows sum to zero
        for s in row_sums(model.y_bus()) {
            assert!(s.norm() < 1e-12);
        }
    }

    #[test]
    fn test_shunt_and_charging() {
        let branches = vec![
            AdmittanceBranch::line(0, 1, 0.01, 0.1, 0.04),
            AdmittanceBranch::shunt(1, Complex64::new(0.0, 0.5)),
        ];
        let model = AdmittanceModel::from_branches(2, branches).unwrap();
        let sums = row_sums(model.y_bus());
        assert!((sums[0] - Complex64::new(0.0, 0.02)).norm() < 1e-12);
        assert!((sums[1] - Complex64::new(0.0, 0.52)).norm() < 1e-12);
    }

    #[test]
    fn test_tap_primitive_is_asymmetric_with_shift() {
        let br = AdmittanceBranch::line(0, 1, 0.0, 0.1, 0.0).with_tap(1.0, 0.1);
        let (_, yft, ytf, _) = br.primitive();
        assert!((yft - ytf).norm() > 1e-6);
    }

    #[test]
    fn test_susceptance_xb_ignores_resistance() {
        let branches = vec![
            AdmittanceBranch::line(0, 1, 0.05, 0.1, 0.2),
            AdmittanceBranch::line(1, 2, 0.0, 0.2, 0.0),
            AdmittanceBranch::shunt(2, Complex64::new(0.0, 1.0)),
        ];
        let model = AdmittanceModel::from_branches(3, branches).unwrap();
        let b = DMatrix::from(&model.susceptance_xb());
        assert!((b[(0, 0)] - 10.0).abs() < 1e-12);
        assert!((b[(1, 1)] - 15.0).abs() < 1e-12);
        assert!((b[(1, 2)] + 5.0).abs() < 1e-12);
        assert!((b[(2, 2)] - 5.0).abs() < 1e-12);

        // without branch data the imaginary part of the Ybus is used
        let ybus_only = AdmittanceModel::from_ybus(model.y_bus().clone());
        let b = DMatrix::from(&ybus_only.susceptance_xb());
        assert!((b[(2, 2)] - 4.0).abs() < 1e-12);
    }

    #[test]
    fn test_branch_out_of_range() {
        let branches = vec![AdmittanceBranch::line(0, 5, 0.0, 0.1, 0.0)];
        let err = AdmittanceModel::from_branches(2, branches).unwrap_err();
        assert!(matches!(err, PfError::BranchBus { bus: 5, .. }));
    }

    #[test]
    fn test_branch_grounded_at_both_ends() {
        let mut br = AdmittanceBranch::line(0, 1, 0.0, 0.1, 0.0);
        br.port = Port2::new(GND, GND);
        let err = AdmittanceModel::from_branches(2, vec![br]).unwrap_err();
        assert!(matches!(err, PfError::FloatingBranch { branch: 0 }));
        assert_eq!(err.code(), crate::basic::error::ErrorCode::InvalidTopology);
    }
}

//! Network data and the `[PV | PQ | Slack]` ordered system the iterative solvers work on.
pub mod admittance;
pub mod network;

use nalgebra::DVector;
use nalgebra_sparse::{CooMatrix, CscMatrix};
use num_complex::Complex64;

use crate::basic::sparse::cast::Cast;
pub use admittance::*;
pub use network::*;

/// Matrices required for one power flow solve, with buses reordered as `[PV | PQ | Slack]`.
#[derive(Debug, Clone)]
pub struct PowerFlowMat {
    pub y_bus: CscMatrix<Complex64>,   // Y-bus in reordered form
    pub s_bus: DVector<Complex64>,     // Scheduled injections in reordered form
    pub v_bus_init: DVector<Complex64>, // Initial voltage in reordered form
    pub npv: usize,
    pub npq: usize,
    pub to_perm: Vec<usize>,   // original → reordered
    pub from_perm: Vec<usize>, // reordered → original
}

impl PowerFlowMat {
    /// Reorders the system for the given bus classification.
    ///
    /// Within each class buses keep their original relative order.
    pub fn new(
        y_bus: &CscMatrix<Complex64>,
        s_bus: &DVector<Complex64>,
        v_init: &DVector<Complex64>,
        bus_types: &[BusType],
    ) -> Self {
        let nodes = bus_types.len();
        let of = |t: BusType| -> Vec<usize> {
            (0..nodes).filter(|&i| bus_types[i] == t).collect()
        };
        let (pv, pq, ext) = (of(BusType::PV), of(BusType::PQ), of(BusType::Slack));

        let reorder: CscMatrix<f64> =
            CscMatrix::from(&create_permutation_matrix(&pv, &pq, &ext, nodes));
        let reorder: CscMatrix<Complex64> = reorder.cast();

        let mut to_perm = vec![0; nodes];
        let mut from_perm = vec![0; nodes];
        for (new_idx, &original_idx) in pv.iter().chain(&pq).chain(&ext).enumerate() {
            to_perm[original_idx] = new_idx;
            from_perm[new_idx] = original_idx;
        }

        let y_bus = &(&reorder * y_bus) * &reorder.transpose();
        let s_bus = &reorder * s_bus;
        let v_bus_init = &reorder * v_init;

        Self {
            y_bus,
            s_bus,
            v_bus_init,
            npv: pv.len(),
            npq: pq.len(),
            to_perm,
            from_perm,
        }
    }

    pub fn reorder_index(&self, orig: usize) -> usize {
        self.to_perm[orig]
    }

    /// Number of non-slack buses.
    pub fn n_bus(&self) -> usize {
        self.npv + self.npq
    }

    /// Applies the bus reordering to a real square matrix given in original order.
    pub fn permute_real(&self, m: &CscMatrix<f64>) -> CscMatrix<f64> {
        let mut coo = CooMatrix::new(m.nrows(), m.ncols());
        for (r, c, v) in m.triplet_iter() {
            coo.push(self.to_perm[r], self.to_perm[c], *v);
        }
        CscMatrix::from(&coo)
    }

    /// Maps a vector in reordered form back to original bus order.
    pub fn restore(&self, v: &DVector<Complex64>) -> DVector<Complex64> {
        DVector::from_fn(v.len(), |orig, _| v[self.to_perm[orig]])
    }
}

/// Creates a permutation matrix mapping original bus order onto `[pv | pq | ext]`.
///
/// Row `i` of the matrix selects the original bus placed at position `i`.
pub(crate) fn create_permutation_matrix(
    pv: &[usize],
    pq: &[usize],
    ext: &[usize],
    nodes: usize,
) -> CooMatrix<f64> {
    let mut coo = CooMatrix::new(nodes, nodes);
    for (row, &col) in pv.iter().chain(pq).chain(ext).enumerate() {
        coo.push(row, col, 1.0);
    }
    coo
}

use crate::basic::sparse::conj::Conjugate;
use nalgebra::*;
use nalgebra_sparse::CscMatrix;

/// Places `values` on the diagonal of an `n x n` CSC matrix.
#[inline]
fn diag(values: &DVector<Complex<f64>>) -> CscMatrix<Complex<f64>> {
    let mut d = CscMatrix::identity(values.len());
    d.values_mut().copy_from_slice(values.as_slice());
    d
}

/// Partial derivatives of the complex bus injections `S = diag(V) conj(Ybus V)` with respect
/// to voltage magnitudes and angles.
///
/// Returns `(dS_dVm, dS_dVa)`:
///
/// * `dS_dVm = diag(V) conj(Ybus diag(V/|V|)) + conj(diag(I)) diag(V/|V|)`
/// * `dS_dVa = j diag(V) conj(diag(I) - Ybus diag(V))`
///
/// with `I = Ybus V`. These are the complex-matrix formulas of R. D. Zimmerman, "AC Power
/// Flows, Generalized OPF Costs and their Derivatives using Complex Matrix Notation",
/// MATPOWER Technical Note 2, 2010.
#[allow(non_snake_case)]
pub fn dSbus_dV(
    Ybus: &CscMatrix<Complex<f64>>,
    v: &DVector<Complex<f64>>,
) -> (CscMatrix<Complex<f64>>, CscMatrix<Complex<f64>>) {
    let ibus = Ybus * v;
    let diagVnorm = diag(&v.map(|e| e.simd_signum()));
    let diagV = diag(v);
    let diagIbus = diag(&ibus);

    let dS_dVm = &diagV * (Ybus * &diagVnorm).conjugate() + diagIbus.conjugate() * &diagVnorm;
    let dS_dVa = &diagV * (diagIbus - Ybus * &diagV).conjugate() * Complex::<f64>::i();
    (dS_dVm, dS_dVa)
}

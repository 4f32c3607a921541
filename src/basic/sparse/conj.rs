use nalgebra::{Complex, SimdComplexField, SimdRealField};
use nalgebra_sparse::CscMatrix;

/// Complex conjugate of a sparse matrix, keeping its sparsity pattern.
pub(crate) trait Conjugate {
    type Mat;

    fn conjugate(&self) -> Self::Mat;

    fn conjugate_mut(&mut self);
}

impl<T: SimdRealField> Conjugate for CscMatrix<Complex<T>>
where
    Complex<T>: SimdComplexField,
{
    type Mat = CscMatrix<Complex<T>>;

    fn conjugate(&self) -> Self::Mat {
        let mut out = self.clone();
        out.conjugate_mut();
        out
    }

    fn conjugate_mut(&mut self) {
        self.values_mut()
            .iter_mut()
            .for_each(|e| *e = e.clone().simd_conjugate());
    }
}

/// Splits a complex sparse matrix into real matrices sharing its pattern.
pub(crate) trait RealImage {
    type Mat;

    fn real_imag(&self) -> (Self::Mat, Self::Mat);

    fn real(&self) -> Self::Mat;

    fn imag(&self) -> Self::Mat;
}

impl<T: SimdRealField> RealImage for CscMatrix<Complex<T>>
where
    Complex<T>: SimdComplexField<SimdRealField = T>,
{
    type Mat = CscMatrix<T>;

    fn real(&self) -> Self::Mat {
        map_values(self, |e| e.simd_real())
    }

    fn imag(&self) -> Self::Mat {
        map_values(self, |e| e.simd_imaginary())
    }

    fn real_imag(&self) -> (Self::Mat, Self::Mat) {
        (self.real(), self.imag())
    }
}

#[inline]
fn map_values<T, U>(mat: &CscMatrix<T>, f: impl Fn(T) -> U) -> CscMatrix<U>
where
    T: Clone,
{
    let values = mat.values().iter().cloned().map(f).collect();
    // the pattern is reused as is, so the value count always matches
    unsafe {
        CscMatrix::try_from_pattern_and_values(mat.pattern().clone(), values).unwrap_unchecked()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::*;
    use nalgebra_sparse::{CooMatrix, CscMatrix};

    fn sample(sign: f64) -> CscMatrix<Complex<f64>> {
        let mut a = CooMatrix::new(4, 4);
        a.push(0, 0, Complex::new(1.0, -1.0 * sign));
        a.push(2, 1, Complex::new(3.0, 1.0 * sign));
        a.push(3, 3, Complex::new(5.0, -2.0 * sign));
        (&a).into()
    }

    #[test]
    fn test_conj() {
        let a = sample(1.0);
        assert!(a.conjugate() == sample(-1.0), "matrices do not match!");
    }

    #[test]
    fn test_conj_mut() {
        let mut a = sample(1.0);
        a.conjugate_mut();
        assert!(a == sample(-1.0), "matrices do not match!");
    }

    #[test]
    fn test_real_imag() {
        let (re, im) = sample(1.0).real_imag();
        let re = DMatrix::from(&re);
        let im = DMatrix::from(&im);
        assert_eq!(re[(2, 1)], 3.0);
        assert_eq!(im[(3, 3)], -2.0);
        assert_eq!(im[(1, 2)], 0.0);
    }
}

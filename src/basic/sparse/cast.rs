use nalgebra::Scalar;
use nalgebra_sparse::CscMatrix;
use simba::scalar::SupersetOf;

/// Element-wise lossless cast of a sparse matrix into a wider scalar type.
pub(crate) trait Cast<T> {
    type Mat;

    fn cast(&self) -> Self::Mat;
}

impl<T: Scalar, U: Scalar + SupersetOf<T>> Cast<U> for CscMatrix<T> {
    type Mat = CscMatrix<U>;

    fn cast(&self) -> Self::Mat {
        let values = self.values().iter().map(|x| U::from_subset(x)).collect();
        // same pattern, same number of values
        unsafe {
            CscMatrix::try_from_pattern_and_values(self.pattern().clone(), values)
                .unwrap_unchecked()
        }
    }
}

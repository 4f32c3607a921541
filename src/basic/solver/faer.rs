use faer::{
    MatMut,
    linalg::solvers::Solve,
    sparse::{
        SparseColMatRef, SymbolicSparseColMatRef,
        linalg::solvers::{Lu, SymbolicLu},
    },
};

use super::Solve as PoSolve;

/// Sparse LU backend on top of `faer`.
#[derive(Default)]
pub struct FaerSolver {
    n: usize,
    lu: Option<Lu<usize, f64>>,
    pattern: (Vec<usize>, Vec<usize>),
    symbolic: Option<SymbolicLu<usize>>,
}

#[allow(non_snake_case)]
impl PoSolve for FaerSolver {
    fn factor(
        &mut self,
        Ap: &[usize],
        Ai: &[usize],
        Ax: &[f64],
        n: usize,
    ) -> Result<(), &'static str> {
        if Ap.len() != n + 1 {
            return Err("column pointer length does not match dimension");
        }
        // callers pass the sorted, in-bounds CSC arrays of a nalgebra-sparse matrix
        let s = unsafe { SymbolicSparseColMatRef::new_unchecked(n, n, Ap, None, Ai) };
        let mat = SparseColMatRef::new(s, Ax);
        if self.symbolic.is_none() || self.pattern.0 != Ap || self.pattern.1 != Ai {
            self.symbolic = Some(SymbolicLu::try_new(s).map_err(|_| "Faer symbolic error")?);
            self.pattern = (Ap.to_vec(), Ai.to_vec());
        }
        let symbolic = self.symbolic.clone().ok_or("missing symbolic analysis")?;
        self.lu = None;
        self.lu = Some(
            Lu::try_new_with_symbolic(symbolic, mat).map_err(|_| "Faer numerical error")?,
        );
        self.n = n;
        Ok(())
    }

    fn solve_factored(&mut self, b: &mut [f64]) -> Result<(), &'static str> {
        let lu = self.lu.as_ref().ok_or("matrix is not factored")?;
        if b.len() != self.n {
            return Err("right hand side length does not match dimension");
        }
        let rhs = MatMut::from_column_major_slice_mut(b, self.n, 1);
        lu.solve_in_place(rhs);
        Ok(())
    }
}

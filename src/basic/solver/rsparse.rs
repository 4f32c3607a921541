use rsparse::{
    self,
    data::{self, Nmrc, Numeric, Symb},
    lsolve, lu, sqr, usolve,
};

use super::Solve;

/// Sparse LU backend on top of `rsparse`.
///
/// The symbolic analysis is reused while the sparsity pattern stays the same; the numeric
/// factorization is replaced by every `factor`.
#[derive(Default)]
pub struct RSparseSolver {
    x: Vec<f64>,
    pattern: (Vec<usize>, Vec<usize>),
    symbolic: Option<Symb>,
    numeric: Option<Nmrc<f64>>,
}

#[allow(non_snake_case)]
impl Solve for RSparseSolver {
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
        let a = data::Sprs {
            m: n,
            n,
            i: Ai.to_vec(),
            p: Ap.iter().map(|&v| v as isize).collect(),
            x: Ax.to_vec(),
            nzmax: Ax.len(),
        };
        if self.symbolic.is_none() || self.pattern.0 != Ap || self.pattern.1 != Ai {
            // AMD ordering underflows on matrices smaller than 3x3
            let order = if n < 3 { -1 } else { 1 };
            self.symbolic = Some(sqr(&a, order, false));
            self.pattern = (Ap.to_vec(), Ai.to_vec());
            self.x = vec![0.0; n];
        }
        let s = self.symbolic.as_mut().ok_or("missing symbolic analysis")?;
        self.numeric = None;
        let numeric = lu(&a, s, 1e-6).map_err(|_| "LU factorization failed")?; // numeric LU factorization
        self.numeric = Some(numeric);
        Ok(())
    }

    fn solve_factored(&mut self, b: &mut [f64]) -> Result<(), &'static str> {
        let (Some(s), Some(n)) = (self.symbolic.as_ref(), self.numeric.as_ref()) else {
            return Err("matrix is not factored");
        };
        if b.len() != self.x.len() {
            return Err("right hand side length does not match dimension");
        }
        let x = &mut self.x[..];
        ipvec(&n.pinv, b, x); // x = P*b
        lsolve(&n.l, x); // x = L\x
        usolve(&n.u, x); // x = U\x
        ipvec(&s.q, x, b); // b = Q*x
        Ok(())
    }
}

fn ipvec<T: Numeric<T>>(p: &Option<Vec<isize>>, b: &[T], x: &mut [T]) {
    match p {
        Some(pvec) => {
            for k in 0..b.len() {
                x[pvec[k] as usize] = b[k];
            }
        }
        None => x.copy_from_slice(b),
    }
}

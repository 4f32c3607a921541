use nalgebra_sparse::{CscMatrix, pattern::SparsityPattern};

/// Concatenates CSC matrices with equal row counts side by side.
pub fn csc_hstack<T: Clone>(matrices: &[&CscMatrix<T>]) -> CscMatrix<T> {
    let nrows = matrices[0].nrows();
    let ncols = matrices.iter().map(|m| m.ncols()).sum::<usize>();
    let nnz = matrices.iter().map(|m| m.nnz()).sum::<usize>();

    let mut values: Vec<T> = Vec::with_capacity(nnz);
    let mut indices: Vec<usize> = Vec::with_capacity(nnz);
    let mut offsets: Vec<usize> = Vec::with_capacity(ncols + 1);
    for mat in matrices {
        assert_eq!(mat.nrows(), nrows, "All matrices must have the same number of rows");
        let base = values.len();
        offsets.extend(mat.col_offsets()[..mat.ncols()].iter().map(|x| x + base));
        indices.extend_from_slice(mat.row_indices());
        values.extend_from_slice(mat.values());
    }
    offsets.push(values.len());
    assemble(ncols, nrows, offsets, indices, values)
}

/// Stacks CSC matrices with equal column counts on top of each other.
pub fn csc_vstack<T: Clone>(matrices: &[&CscMatrix<T>]) -> CscMatrix<T> {
    let ncols = matrices[0].ncols();
    let nrows = matrices.iter().map(|m| m.nrows()).sum::<usize>();
    let nnz = matrices.iter().map(|m| m.nnz()).sum::<usize>();

    let mut values: Vec<T> = Vec::with_capacity(nnz);
    let mut indices: Vec<usize> = Vec::with_capacity(nnz);
    let mut offsets: Vec<usize> = Vec::with_capacity(ncols + 1);
    offsets.push(0);
    for mat in matrices {
        assert_eq!(mat.ncols(), ncols, "All matrices must have the same number of cols");
    }
    for c in 0..ncols {
        let mut row_base = 0;
        for mat in matrices {
            let col = mat.col(c);
            indices.extend(col.row_indices().iter().map(|r| r + row_base));
            values.extend_from_slice(col.values());
            row_base += mat.nrows();
        }
        offsets.push(values.len());
    }
    assemble(ncols, nrows, offsets, indices, values)
}

#[inline]
fn assemble<T>(
    ncols: usize,
    nrows: usize,
    offsets: Vec<usize>,
    indices: Vec<usize>,
    values: Vec<T>,
) -> CscMatrix<T> {
    // every input block is a valid CSC matrix, so sortedness and bounds carry over
    unsafe {
        let pattern = SparsityPattern::from_offset_and_indices_unchecked(ncols, nrows, offsets, indices);
        CscMatrix::try_from_pattern_and_values(pattern, values).unwrap_unchecked()
    }
}

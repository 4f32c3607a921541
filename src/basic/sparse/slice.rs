use nalgebra_sparse::CscMatrix;

/// Columns `start_col..end_col` of a CSC matrix; an empty range gives a zero-column matrix.
#[inline(always)]
pub fn slice_csc_matrix<T: Clone>(
    mat: &CscMatrix<T>,
    start_col: usize,
    end_col: usize,
) -> CscMatrix<T> {
    assert!(start_col <= end_col && end_col <= mat.ncols(), "illegal indices");
    let col_start_idx = mat.col_offsets()[start_col];
    let col_end_idx = mat.col_offsets()[end_col];

    let new_values = mat.values()[col_start_idx..col_end_idx].to_vec();
    let new_row_indices = mat.row_indices()[col_start_idx..col_end_idx].to_vec();
    let new_col_offsets = mat.col_offsets()[start_col..=end_col]
        .iter()
        .map(|&x| x - col_start_idx)
        .collect::<Vec<_>>();

    // offsets and indices are a contiguous window of a valid matrix
    unsafe {
        CscMatrix::try_from_csc_data(
            mat.nrows(),
            end_col - start_col,
            new_col_offsets,
            new_row_indices,
            new_values,
        )
        .unwrap_unchecked()
    }
}

/// Block of a CSC matrix starting at `start_pos` with the given `shape`.
#[inline(always)]
pub fn slice_csc_matrix_block<T: Clone>(
    mat: &CscMatrix<T>,
    start_pos: (usize, usize),
    shape: (usize, usize),
) -> CscMatrix<T> {
    let (start_row, start_col) = start_pos;
    let rows = start_row..start_row + shape.0;

    let mut col_offsets = Vec::with_capacity(shape.1 + 1);
    let mut row_indices = Vec::new();
    let mut values = Vec::new();
    col_offsets.push(0);
    for c in start_col..start_col + shape.1 {
        let col = mat.col(c);
        for (&r, v) in col.row_indices().iter().zip(col.values()) {
            if rows.contains(&r) {
                row_indices.push(r - start_row);
                values.push(v.clone());
            }
        }
        col_offsets.push(row_indices.len());
    }
    // rows stay sorted within each column
    unsafe {
        CscMatrix::try_from_csc_data(shape.0, shape.1, col_offsets, row_indices, values)
            .unwrap_unchecked()
    }
}

/// Block views used by the Jacobian and B-matrix assembly.
pub(crate) trait Slice {
    type Mat;
    fn block(&self, start_pos: (usize, usize), shape: (usize, usize)) -> Self::Mat;
    fn columns(&self, start_col: usize, end_col: usize) -> Self::Mat;
}

impl<T: Clone> Slice for CscMatrix<T> {
    type Mat = CscMatrix<T>;
    #[inline(always)]
    fn block(&self, start_pos: (usize, usize), shape: (usize, usize)) -> Self::Mat {
        slice_csc_matrix_block(self, start_pos, shape)
    }
    #[inline(always)]
    fn columns(&self, start_col: usize, end_col: usize) -> Self::Mat {
        slice_csc_matrix(self, start_col, end_col)
    }
}

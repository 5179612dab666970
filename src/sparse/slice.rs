use nalgebra_sparse::CscMatrix;

/// Column-range and block extraction, materialized as owned matrices.
///
/// CSC keeps row indices sorted within each column, so both operations
/// are straight copies of contiguous or filtered column runs.
pub(crate) trait CscSlice {
    /// Columns `start..end`, all rows.
    fn columns_range(&self, start: usize, end: usize) -> Self;

    /// The `shape.0 × shape.1` block whose top-left corner sits at
    /// `origin = (row, column)`.
    fn block(&self, origin: (usize, usize), shape: (usize, usize)) -> Self;
}

impl<T: Clone> CscSlice for CscMatrix<T> {
    fn columns_range(&self, start: usize, end: usize) -> Self {
        assert!(start <= end && end <= self.ncols(), "column range out of bounds");
        let lo = self.col_offsets()[start];
        let hi = self.col_offsets()[end];

        let offsets: Vec<_> = self.col_offsets()[start..=end]
            .iter()
            .map(|&o| o - lo)
            .collect();
        let rows = self.row_indices()[lo..hi].to_vec();
        let values = self.values()[lo..hi].to_vec();

        CscMatrix::try_from_csc_data(self.nrows(), end - start, offsets, rows, values)
            .expect("column slice keeps CSC invariants")
    }

    fn block(&self, origin: (usize, usize), shape: (usize, usize)) -> Self {
        let (row0, col0) = origin;
        let (nrows, ncols) = shape;
        assert!(
            row0 + nrows <= self.nrows() && col0 + ncols <= self.ncols(),
            "block out of bounds"
        );

        let mut offsets = Vec::with_capacity(ncols + 1);
        let mut rows = Vec::new();
        let mut values = Vec::new();
        offsets.push(0);
        for col in col0..col0 + ncols {
            for idx in self.col_offsets()[col]..self.col_offsets()[col + 1] {
                let row = self.row_indices()[idx];
                if row >= row0 && row < row0 + nrows {
                    rows.push(row - row0);
                    values.push(self.values()[idx].clone());
                }
            }
            offsets.push(rows.len());
        }

        CscMatrix::try_from_csc_data(nrows, ncols, offsets, rows, values)
            .expect("block slice keeps CSC invariants")
    }
}

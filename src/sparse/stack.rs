use nalgebra_sparse::CscMatrix;

/// Horizontal concatenation. All blocks must agree on the row count.
///
/// Columns are appended left to right, so the result is a plain
/// concatenation of the blocks' CSC arrays with shifted offsets.
pub(crate) fn csc_hstack<T: Clone>(blocks: &[&CscMatrix<T>]) -> CscMatrix<T> {
    let nrows = blocks[0].nrows();
    let ncols = blocks.iter().map(|b| b.ncols()).sum();
    let nnz = blocks.iter().map(|b| b.nnz()).sum();

    let mut offsets = Vec::with_capacity(ncols + 1);
    let mut rows = Vec::with_capacity(nnz);
    let mut values = Vec::with_capacity(nnz);
    offsets.push(0);
    let mut base = 0;
    for block in blocks {
        assert_eq!(block.nrows(), nrows, "hstack blocks must share the row count");
        offsets.extend(block.col_offsets()[1..].iter().map(|&o| o + base));
        rows.extend_from_slice(block.row_indices());
        values.extend_from_slice(block.values());
        base += block.nnz();
    }

    CscMatrix::try_from_csc_data(nrows, ncols, offsets, rows, values)
        .expect("hstack keeps CSC invariants")
}

/// Vertical concatenation. All blocks must agree on the column count.
///
/// Each result column interleaves the blocks' columns top to bottom
/// with shifted row indices.
pub(crate) fn csc_vstack<T: Clone>(blocks: &[&CscMatrix<T>]) -> CscMatrix<T> {
    let ncols = blocks[0].ncols();
    let nrows = blocks.iter().map(|b| b.nrows()).sum();
    let nnz = blocks.iter().map(|b| b.nnz()).sum();

    let mut offsets = Vec::with_capacity(ncols + 1);
    let mut rows = Vec::with_capacity(nnz);
    let mut values = Vec::with_capacity(nnz);
    offsets.push(0);
    for col in 0..ncols {
        let mut shift = 0;
        for block in blocks {
            assert_eq!(block.ncols(), ncols, "vstack blocks must share the column count");
            let span = block.col_offsets()[col]..block.col_offsets()[col + 1];
            rows.extend(block.row_indices()[span.clone()].iter().map(|&r| r + shift));
            values.extend_from_slice(&block.values()[span]);
            shift += block.nrows();
        }
        offsets.push(rows.len());
    }

    CscMatrix::try_from_csc_data(nrows, ncols, offsets, rows, values)
        .expect("vstack keeps CSC invariants")
}

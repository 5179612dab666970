use faer::{
    MatMut,
    linalg::solvers::Solve as SolveInPlace,
    sparse::{
        SparseColMatRef, SymbolicSparseColMatRef,
        linalg::solvers::{Lu, SymbolicLu},
    },
};

use super::{FactorError, Solve};

/// LU backend on faer's sparse kernels. Symbolic analysis is retained
/// across calls with an unchanged pattern.
#[derive(Default)]
pub struct FaerSolver {
    symbolic: Option<SymbolicLu<usize>>,
}

impl Solve for FaerSolver {
    fn solve(
        &mut self,
        col_offsets: &[usize],
        row_indices: &[usize],
        values: &[f64],
        b: &mut [f64],
        n: usize,
    ) -> Result<(), FactorError> {
        // The arrays come straight out of a CscMatrix, so the CSC
        // invariants faer expects already hold.
        let pattern =
            unsafe { SymbolicSparseColMatRef::new_unchecked(n, n, col_offsets, None, row_indices) };
        let mat = SparseColMatRef::new(pattern, values);

        if self.symbolic.is_none() {
            self.symbolic =
                Some(SymbolicLu::try_new(pattern).map_err(|_| FactorError::Symbolic)?);
        }
        let symbolic = self.symbolic.as_ref().expect("symbolic analysis present");

        let lu = Lu::try_new_with_symbolic(symbolic.clone(), mat)
            .map_err(|_| FactorError::Singular)?;
        lu.solve_in_place(MatMut::from_column_major_slice_mut(b, n, 1));

        Ok(())
    }

    fn reset(&mut self) {
        self.symbolic = None;
    }
}

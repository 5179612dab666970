use rsparse::{
    data::{Sprs, Symb},
    lsolve, lu, sqr, usolve,
};

use super::{FactorError, Solve};

/// LU backend on the pure-Rust rsparse kernels.
///
/// The fill-reducing ordering computed on the first call is kept and
/// reused for every later factorization of the same pattern.
#[derive(Default)]
pub struct RSparseSolver {
    symbolic: Option<Symb>,
    work: Vec<f64>,
}

impl Solve for RSparseSolver {
    fn solve(
        &mut self,
        col_offsets: &[usize],
        row_indices: &[usize],
        values: &[f64],
        b: &mut [f64],
        n: usize,
    ) -> Result<(), FactorError> {
        let a = Sprs {
            m: n,
            n,
            i: row_indices.to_vec(),
            p: col_offsets.iter().map(|&o| o as isize).collect(),
            x: values.to_vec(),
            nzmax: values.len(),
        };

        if self.symbolic.is_none() || self.work.len() != n {
            self.symbolic = Some(sqr(&a, 1, false));
            self.work = vec![0.0; n];
        }
        let symbolic = self.symbolic.as_mut().expect("symbolic analysis present");

        let numeric = lu(&a, symbolic, 1e-6).map_err(|_| FactorError::Singular)?;
        ipvec(&numeric.pinv, b, &mut self.work); // work = P·b
        lsolve(&numeric.l, &mut self.work); // work = L \ work
        usolve(&numeric.u, &mut self.work); // work = U \ work
        ipvec(&symbolic.q, &self.work, b); // b = Q·work

        Ok(())
    }

    fn reset(&mut self) {
        self.symbolic = None;
    }
}

fn ipvec(perm: &Option<Vec<isize>>, src: &[f64], dst: &mut [f64]) {
    match perm {
        Some(p) => {
            for (k, &value) in src.iter().enumerate() {
                dst[p[k] as usize] = value;
            }
        }
        None => dst.copy_from_slice(src),
    }
}

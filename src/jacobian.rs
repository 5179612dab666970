//! Analytic derivatives of the bus power injections and assembly of the
//! reduced Newton Jacobian.

use nalgebra::DVector;
use nalgebra_sparse::CscMatrix;
use num_complex::Complex64;

use crate::sparse::conj::{Conjugate, RealImag};
use crate::sparse::slice::CscSlice;
use crate::sparse::stack::{csc_hstack, csc_vstack};

/// Partial derivatives of the complex injections `S = V ∘ conj(Ybus·V)`
/// with respect to voltage magnitude and angle, evaluated at `v`.
///
/// Complex-matrix formulation from MATPOWER Technical Note 2
/// (R. D. Zimmerman, "AC Power Flows, Generalized OPF Costs and their
/// Derivatives using Complex Matrix Notation"):
///
/// ```text
/// dS/dVm = diag(V)·conj(Ybus·diag(E)) + conj(diag(I))·diag(E)
/// dS/dVa = j·diag(V)·conj(diag(I) − Ybus·diag(V))
/// ```
///
/// with `I = Ybus·V` and `E = V ∘ |V|⁻¹` the unit-magnitude voltages,
/// which the caller maintains alongside `v`.
#[allow(non_snake_case)]
pub fn dSbus_dV(
    ybus: &CscMatrix<Complex64>,
    v: &DVector<Complex64>,
    v_unit: &DVector<Complex64>,
) -> (CscMatrix<Complex64>, CscMatrix<Complex64>) {
    let i_bus = ybus * v;

    let diag_v = csc_diagonal(v);
    let diag_e = csc_diagonal(v_unit);
    let diag_i = csc_diagonal(&i_bus);

    let dS_dVm = &diag_v * (ybus * &diag_e).conjugate() + diag_i.conjugate() * &diag_e;
    let dS_dVa = &diag_v * (diag_i - ybus * &diag_v).conjugate() * Complex64::i();
    (dS_dVm, dS_dVa)
}

/// Diagonal CSC matrix with `values` on the diagonal.
fn csc_diagonal(values: &DVector<Complex64>) -> CscMatrix<Complex64> {
    let n = values.len();
    CscMatrix::try_from_csc_data(
        n,
        n,
        (0..=n).collect(),
        (0..n).collect(),
        values.iter().copied().collect(),
    )
    .expect("diagonal CSC data is well formed")
}

/// Reduced real Jacobian for the permuted system
/// `[pv buses, pq buses, slack + out-of-service]`.
///
/// Rows are the active-power equations at pv∪pq followed by the
/// reactive equations at pq; columns are the angle unknowns at pv∪pq
/// followed by the magnitude unknowns at pq (PV magnitudes are fixed
/// and carry no column).
#[allow(non_snake_case)]
pub fn reduced_jacobian(
    dS_dVm: &CscMatrix<Complex64>,
    dS_dVa: &CscMatrix<Complex64>,
    npv: usize,
    npq: usize,
) -> CscMatrix<f64> {
    let n_bus = npv + npq;

    let (dP_dVa, dQ_dVa) = dS_dVa.block((0, 0), (n_bus, n_bus)).real_imag();
    let (dP_dVm, dQ_dVm) = dS_dVm.block((0, 0), (n_bus, n_bus)).real_imag();

    let j11 = dP_dVa;
    let j12 = dP_dVm.columns_range(npv, n_bus);
    let j21 = dQ_dVa.block((npv, 0), (npq, n_bus));
    let j22 = dQ_dVm.block((npv, npv), (npq, npq));

    csc_vstack(&[&csc_hstack(&[&j11, &j12]), &csc_hstack(&[&j21, &j22])])
}

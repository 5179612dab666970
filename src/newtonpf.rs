//! Newton-Raphson power flow iteration.
//!
//! Operates on a permuted bus system laid out as
//! `[pv buses, pq buses, slack + out-of-service]`, so every assembly
//! step works on contiguous index ranges instead of branching per bus.

use std::f64::consts::PI;

use nalgebra::{DVector, SimdComplexField};
use nalgebra_sparse::CscMatrix;
use num_complex::Complex64;
use serde::{Deserialize, Serialize};

use crate::jacobian::{dSbus_dV, reduced_jacobian};
use crate::solver::Solve;

/// Iteration controls for [`newton_pf`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NewtonOptions {
    /// Convergence threshold on the worst per-unit power mismatch,
    /// `max(|ΔP|, |ΔQ|)`.
    pub tolerance: f64,
    /// Correction budget. 0 means "check the mismatch, never correct";
    /// the check runs before any factorization either way.
    pub max_iterations: usize,
}

impl Default for NewtonOptions {
    fn default() -> Self {
        Self {
            tolerance: 1e-8,
            max_iterations: 20,
        }
    }
}

/// Terminal state of a Newton run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SolveStatus {
    /// Worst mismatch dropped below tolerance.
    Converged,
    /// The Jacobian could not be factorized (singular or
    /// ill-conditioned) or the iterate left the finite domain.
    Diverged,
    /// Budget exhausted with the mismatch still above tolerance.
    MaxIterExceeded,
}

/// Outcome of [`newton_pf`]: the last voltage iterate plus convergence
/// metadata. `v` is in the permuted ordering handed to the solver.
#[derive(Debug, Clone)]
pub struct NewtonReport {
    pub v: DVector<Complex64>,
    pub status: SolveStatus,
    /// Corrections applied. A warm start from a converged point reports 0.
    pub iterations: usize,
    /// Worst per-unit mismatch at each convergence check; `mismatch[0]`
    /// is the mismatch of the initial voltage.
    pub mismatch: Vec<f64>,
    /// Last Jacobian assembled; `None` when no correction was attempted.
    pub jacobian: Option<CscMatrix<f64>>,
}

impl NewtonReport {
    pub fn converged(&self) -> bool {
        self.status == SolveStatus::Converged
    }
}

/// Runs Newton-Raphson on the permuted system until the worst per-unit
/// mismatch drops below tolerance, the iteration budget runs out, or
/// the linearized system cannot be solved.
///
/// `npv` and `npq` are the pv/pq bus counts; buses beyond `npv + npq`
/// carry no power-balance equation and keep their initial voltage.
pub fn newton_pf<S: Solve>(
    ybus: &CscMatrix<Complex64>,
    sbus: &DVector<Complex64>,
    v_init: &DVector<Complex64>,
    npv: usize,
    npq: usize,
    options: &NewtonOptions,
    solver: &mut S,
) -> NewtonReport {
    let n_bus = npv + npq;
    let n_state = npv + 2 * npq;

    let mut v = v_init.clone();
    let mut v_unit = v.map(|e| e.simd_signum());
    let mut v_m = v.map(|e| e.simd_modulus());
    let mut v_a = v.map(|e| e.simd_argument());

    let mut mis = v.component_mul(&(ybus * &v).conjugate()) - sbus;
    let mut f = DVector::zeros(n_state);
    assemble_f(&mut f, &mis, npv, npq);

    let mut history = Vec::with_capacity(options.max_iterations + 1);
    let mut jacobian = None;

    for iteration in 0..=options.max_iterations {
        let worst = f.iter().fold(0.0_f64, |acc, x| acc.max(x.abs()));
        history.push(worst);
        log::debug!("iteration {iteration}: max mismatch {worst:.3e} pu");

        if !f.iter().all(|x| x.is_finite()) {
            return NewtonReport {
                v,
                status: SolveStatus::Diverged,
                iterations: iteration,
                mismatch: history,
                jacobian,
            };
        }
        if worst < options.tolerance {
            return NewtonReport {
                v,
                status: SolveStatus::Converged,
                iterations: iteration,
                mismatch: history,
                jacobian,
            };
        }
        if iteration == options.max_iterations {
            break;
        }

        let (ds_dvm, ds_dva) = dSbus_dV(ybus, &v, &v_unit);
        let jac = reduced_jacobian(&ds_dvm, &ds_dva, npv, npq);
        let solved = solver.solve(
            jac.col_offsets(),
            jac.row_indices(),
            jac.values(),
            f.as_mut_slice(),
            n_state,
        );
        jacobian = Some(jac);

        if let Err(err) = solved {
            log::debug!("iteration {iteration}: {err}");
            return NewtonReport {
                v,
                status: SolveStatus::Diverged,
                iterations: iteration,
                mismatch: history,
                jacobian,
            };
        }

        apply_correction(&mut v, &mut v_m, &mut v_a, &mut v_unit, &f, npv, npq);

        v.component_mul(&(ybus * &v).conjugate())
            .sub_to(sbus, &mut mis);
        assemble_f(&mut f, &mis, npv, npq);
    }

    NewtonReport {
        v,
        status: SolveStatus::MaxIterExceeded,
        iterations: options.max_iterations,
        mismatch: history,
        jacobian,
    }
}

/// Stacks the real mismatch vector: active-power rows for pv∪pq buses
/// followed by reactive rows for pq buses.
#[inline(always)]
fn assemble_f(f: &mut DVector<f64>, mis: &DVector<Complex64>, npv: usize, npq: usize) {
    let n_bus = npv + npq;
    f.rows_range_mut(0..n_bus)
        .zip_apply(&mis.rows_range(0..n_bus), |a, b| *a = b.re);
    f.rows_range_mut(n_bus..n_bus + npq)
        .zip_apply(&mis.rows_range(npv..n_bus), |a, b| *a = b.im);
}

/// Applies the Newton correction: angles move at pv∪pq buses,
/// magnitudes at pq buses only, then the polar factors are recombined.
#[inline(always)]
fn apply_correction(
    v: &mut DVector<Complex64>,
    v_m: &mut DVector<f64>,
    v_a: &mut DVector<f64>,
    v_unit: &mut DVector<Complex64>,
    dx: &DVector<f64>,
    npv: usize,
    npq: usize,
) {
    let n_bus = npv + npq;
    v_a.rows_range_mut(0..n_bus)
        .zip_apply(&dx.rows_range(0..n_bus), |a, d| {
            *a -= d;
            *a = a.rem_euclid(2.0 * PI);
        });
    v_m.rows_range_mut(npv..n_bus)
        .zip_apply(&dx.rows_range(n_bus..n_bus + npq), |m, d| *m -= d);

    v_unit.zip_apply(&*v_a, |u, a| *u = Complex64::from_polar(1.0, a));
    v.zip_zip_apply(v_unit, v_m, |val, u, m| *val = m * u);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solver::DefaultSolver;
    use approx::assert_abs_diff_eq;
    use nalgebra_sparse::CooMatrix;

    /// Lossless two-bus system in permuted order [pq, slack]: one line
    /// of pure reactance `x`, load `p + jq` at the pq bus.
    fn two_bus(x: f64, p: f64, q: f64) -> (CscMatrix<Complex64>, DVector<Complex64>) {
        let y = Complex64::new(0.0, x).inv();
        let mut coo = CooMatrix::new(2, 2);
        coo.push(0, 0, y);
        coo.push(0, 1, -y);
        coo.push(1, 0, -y);
        coo.push(1, 1, y);
        let ybus = CscMatrix::from(&coo);
        let sbus = DVector::from_vec(vec![Complex64::new(-p, -q), Complex64::new(0.0, 0.0)]);
        (ybus, sbus)
    }

    #[test]
    fn two_bus_matches_closed_form() {
        let (x, p, q) = (0.05, 0.1, 0.05);
        let (ybus, sbus) = two_bus(x, p, q);
        let v0 = DVector::from_element(2, Complex64::new(1.0, 0.0));

        let options = NewtonOptions {
            tolerance: 1e-6,
            max_iterations: 10,
        };
        let mut solver = DefaultSolver::default();
        let report = newton_pf(&ybus, &sbus, &v0, 0, 1, &options, &mut solver);

        assert_eq!(report.status, SolveStatus::Converged);
        assert!(report.iterations <= 2, "took {} iterations", report.iterations);

        // |V|² is the larger root of u² + (2qx − 1)u + x²(p² + q²) = 0.
        let half = (1.0 - 2.0 * q * x) / 2.0;
        let vm_expected = (half + (half * half - x * x * (p * p + q * q)).sqrt()).sqrt();
        assert_abs_diff_eq!(report.v[0].norm(), vm_expected, epsilon = 1e-5);
        // The slack voltage is never touched.
        assert_eq!(report.v[1], Complex64::new(1.0, 0.0));
    }

    #[test]
    fn zero_budget_reports_exhaustion_without_factorizing() {
        let (ybus, sbus) = two_bus(0.05, 0.1, 0.05);
        let v0 = DVector::from_element(2, Complex64::new(1.0, 0.0));

        let options = NewtonOptions {
            tolerance: 1e-6,
            max_iterations: 0,
        };
        let mut solver = DefaultSolver::default();
        let report = newton_pf(&ybus, &sbus, &v0, 0, 1, &options, &mut solver);

        assert_eq!(report.status, SolveStatus::MaxIterExceeded);
        assert_eq!(report.iterations, 0);
        assert_eq!(report.v, v0);
        assert!(report.jacobian.is_none());
        assert_eq!(report.mismatch.len(), 1);
    }

    #[test]
    fn restart_from_converged_point_needs_no_correction() {
        let (ybus, sbus) = two_bus(0.05, 0.1, 0.05);
        let v0 = DVector::from_element(2, Complex64::new(1.0, 0.0));
        let options = NewtonOptions {
            tolerance: 1e-6,
            max_iterations: 10,
        };

        let mut solver = DefaultSolver::default();
        let first = newton_pf(&ybus, &sbus, &v0, 0, 1, &options, &mut solver);
        assert!(first.converged());

        let again = newton_pf(&ybus, &sbus, &first.v, 0, 1, &options, &mut solver);
        assert!(again.converged());
        assert_eq!(again.iterations, 0);
        assert!(again.jacobian.is_none());
    }

    #[test]
    fn no_equations_converges_trivially() {
        // Only the slack bus carries a voltage; nothing to solve.
        let (ybus, sbus) = two_bus(0.05, 0.0, 0.0);
        let v0 = DVector::from_element(2, Complex64::new(1.0, 0.0));
        let options = NewtonOptions::default();
        let mut solver = DefaultSolver::default();
        let report = newton_pf(&ybus, &sbus, &v0, 0, 0, &options, &mut solver);
        assert!(report.converged());
        assert_eq!(report.iterations, 0);
    }
}

//! Warm-startable power flow sessions over a grid model.
//!
//! A session snapshots the permuted matrices at creation and owns the
//! iteration state the solver reuses across calls: the latest voltage
//! iterate and the backend's symbolic factorization. Taking `&mut self`
//! everywhere makes concurrent use of one session unrepresentable;
//! independent sessions share nothing and may run in parallel.

use nalgebra::DVector;
use nalgebra_sparse::{CscMatrix, CsrMatrix};
use num_complex::Complex64;
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Error};
use crate::grid::{BusClassification, GridModel, SlackPolicy, SlackSource, SyntheticSlack};
use crate::grid::permutation_matrix;
use crate::newtonpf::{NewtonOptions, SolveStatus, newton_pf};
use crate::solver::{DefaultSolver, Solve};

/// Options for a model-level power flow.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PowerFlowOptions {
    pub newton: NewtonOptions,
    /// Rejected when set: limit enforcement is a non-goal and silently
    /// approximating it would be worse than failing.
    pub enforce_q_limits: bool,
}

/// Model-level solve result; voltages are in original bus order.
#[derive(Debug, Clone)]
pub struct PowerFlowResult {
    pub v: DVector<Complex64>,
    /// Voltage magnitudes, per-unit.
    pub vm: DVector<f64>,
    /// Voltage angles, radians.
    pub va: DVector<f64>,
    pub status: SolveStatus,
    pub iterations: usize,
    /// Worst per-unit mismatch at each convergence check.
    pub mismatch: Vec<f64>,
    /// Last assembled Jacobian, in the session's permuted ordering.
    pub jacobian: Option<CscMatrix<f64>>,
    /// Whether the slack machine was declared, promoted or fabricated.
    pub slack_source: SlackSource,
    /// Fabricated machine parameters when `slack_source` is synthetic.
    pub synthetic_slack: Option<SyntheticSlack>,
}

impl PowerFlowResult {
    pub fn converged(&self) -> bool {
        self.status == SolveStatus::Converged
    }
}

/// Exclusive handle for repeated solves against one topology snapshot.
pub struct PowerFlowSession<S: Solve = DefaultSolver> {
    ybus: CscMatrix<Complex64>,
    sbus: DVector<Complex64>,
    v: DVector<Complex64>,
    reorder: CsrMatrix<Complex64>,
    classification: BusClassification,
    solver: S,
}

impl PowerFlowSession<DefaultSolver> {
    /// Classifies, assembles and permutes; the session starts cold from
    /// the model's flat-plus-setpoints profile.
    pub fn new(model: &GridModel, policy: SlackPolicy) -> Result<Self, Error> {
        Self::with_solver(model, policy, DefaultSolver::default())
    }
}

impl<S: Solve> PowerFlowSession<S> {
    pub fn with_solver(model: &GridModel, policy: SlackPolicy, solver: S) -> Result<Self, Error> {
        let classification = model.classify(policy)?;
        let reorder = permutation_matrix(&classification, model.n_bus());

        let ybus = {
            let ybus = CsrMatrix::from(&model.assemble_ybus());
            CscMatrix::from(&(&reorder * ybus * reorder.transpose()))
        };
        let sbus = &reorder * model.sbus();
        let v = &reorder * model.v_init(&classification);

        Ok(Self {
            ybus,
            sbus,
            v,
            reorder,
            classification,
            solver,
        })
    }

    pub fn classification(&self) -> &BusClassification {
        &self.classification
    }

    /// Latest voltage iterate, original bus order.
    pub fn voltage(&self) -> DVector<Complex64> {
        self.reorder.transpose() * &self.v
    }

    /// Replaces the injection vector (original bus order) for the next
    /// solve. The voltage iterate and the symbolic factorization are
    /// kept; this is the warm-start path for injection updates.
    pub fn set_injections(&mut self, sbus: &DVector<Complex64>) {
        assert_eq!(
            sbus.len(),
            self.sbus.len(),
            "injection vector must cover every bus"
        );
        self.sbus = &self.reorder * sbus;
    }

    /// Runs Newton-Raphson from the retained iterate. Non-convergence
    /// is reported in the result status, never as an `Err`.
    pub fn solve(&mut self, options: &PowerFlowOptions) -> Result<PowerFlowResult, Error> {
        if options.enforce_q_limits {
            return Err(ConfigError::QLimitsUnsupported.into());
        }

        let npv = self.classification.pv.len();
        let npq = self.classification.pq.len();
        let report = newton_pf(
            &self.ybus,
            &self.sbus,
            &self.v,
            npv,
            npq,
            &options.newton,
            &mut self.solver,
        );
        self.v = report.v;

        let v = self.reorder.transpose() * &self.v;
        Ok(PowerFlowResult {
            vm: v.map(|e| e.norm()),
            va: v.map(|e| e.arg()),
            v,
            status: report.status,
            iterations: report.iterations,
            mismatch: report.mismatch,
            jacobian: report.jacobian,
            slack_source: self.classification.source,
            synthetic_slack: self.classification.synthetic,
        })
    }

    /// Cold restart: the voltage iterate goes back to the model's
    /// flat-plus-setpoints profile and the symbolic factorization is
    /// dropped, so the next solve re-analyses the Jacobian pattern.
    pub fn reset(&mut self, model: &GridModel) {
        self.v = &self.reorder * model.v_init(&self.classification);
        self.solver.reset();
    }
}

impl GridModel {
    /// One-shot power flow: fresh session, single cold solve.
    pub fn run_pf(
        &self,
        policy: SlackPolicy,
        options: &PowerFlowOptions,
    ) -> Result<PowerFlowResult, Error> {
        PowerFlowSession::new(self, policy)?.solve(options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::{Branch, Bus, ElementId, Generator, Load, Shunt};
    use approx::assert_abs_diff_eq;

    fn four_bus() -> GridModel {
        GridModel::build(
            vec![
                Bus::new(0, 110.0),
                Bus::new(1, 110.0),
                Bus::new(2, 110.0),
                Bus::new(3, 110.0),
            ],
            vec![
                Branch::line(0, 1, 0.01, 0.05, 0.02),
                Branch::line(1, 2, 0.015, 0.07, 0.02),
                Branch::line(0, 3, 0.01, 0.06, 0.02),
                Branch::line(2, 3, 0.02, 0.08, 0.02),
            ],
            vec![],
            vec![Load::new(2, 0.45, 0.15), Load::new(3, 0.3, 0.1)],
            vec![
                Generator::reference(0, 1.02),
                Generator::new(1, 0.4, 1.01),
            ],
        )
        .unwrap()
    }

    fn default_options() -> PowerFlowOptions {
        PowerFlowOptions {
            newton: NewtonOptions {
                tolerance: 1e-8,
                max_iterations: 20,
            },
            enforce_q_limits: false,
        }
    }

    #[test]
    fn solves_and_respects_setpoints() {
        let model = four_bus();
        let result = model
            .run_pf(SlackPolicy::RequireDeclared, &default_options())
            .unwrap();

        assert!(result.converged());
        assert_eq!(result.slack_source, SlackSource::Declared);
        // Slack voltage is fixed, PV magnitude pinned to its setpoint.
        assert_abs_diff_eq!(result.vm[0], 1.02, epsilon = 1e-12);
        assert_abs_diff_eq!(result.va[0], 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(result.vm[1], 1.01, epsilon = 1e-9);
        // Load buses sag below the generator setpoints.
        assert!(result.vm[2] < 1.01);
        assert!(result.vm[3] < 1.02);
    }

    #[test]
    fn mismatch_shrinks_monotonically_after_the_first_step() {
        let model = four_bus();
        let result = model
            .run_pf(SlackPolicy::RequireDeclared, &default_options())
            .unwrap();

        assert!(result.converged());
        assert!(result.mismatch.len() >= 3);
        for pair in result.mismatch[1..].windows(2) {
            assert!(
                pair[1] <= pair[0] * (1.0 + 1e-12),
                "mismatch grew: {} -> {}",
                pair[0],
                pair[1]
            );
        }
    }

    #[test]
    fn warm_restart_needs_no_further_corrections() {
        let model = four_bus();
        let mut session = PowerFlowSession::new(&model, SlackPolicy::RequireDeclared).unwrap();

        let cold = session.solve(&default_options()).unwrap();
        assert!(cold.converged());
        assert!(cold.iterations > 0);

        // Same injections, retained iterate: one mismatch check, done.
        let warm = session.solve(&default_options()).unwrap();
        assert!(warm.converged());
        assert_eq!(warm.iterations, 0);
        assert_eq!(warm.mismatch.len(), 1);

        // After a cold reset the solve starts from flat again.
        session.reset(&model);
        let recold = session.solve(&default_options()).unwrap();
        assert!(recold.converged());
        assert_eq!(recold.iterations, cold.iterations);
    }

    #[test]
    fn injection_update_reuses_the_session() {
        let model = four_bus();
        let mut session = PowerFlowSession::new(&model, SlackPolicy::RequireDeclared).unwrap();
        let first = session.solve(&default_options()).unwrap();
        assert!(first.converged());

        // Nudge the loads and re-solve warm: convergence comes faster
        // than from flat.
        let mut sbus = model.sbus();
        sbus[2] -= Complex64::new(0.05, 0.01);
        session.set_injections(&sbus);
        let warm = session.solve(&default_options()).unwrap();
        assert!(warm.converged());
        assert!(warm.iterations <= first.iterations);
    }

    #[test]
    fn q_limit_enforcement_is_rejected_before_iterating() {
        let model = four_bus();
        let options = PowerFlowOptions {
            enforce_q_limits: true,
            ..default_options()
        };
        let got = model.run_pf(SlackPolicy::RequireDeclared, &options);
        assert_eq!(got.unwrap_err(), Error::Config(ConfigError::QLimitsUnsupported));
    }

    #[test]
    fn zero_iteration_budget_leaves_the_voltage_untouched() {
        let model = four_bus();
        let options = PowerFlowOptions {
            newton: NewtonOptions {
                tolerance: 1e-8,
                max_iterations: 0,
            },
            enforce_q_limits: false,
        };
        let result = model
            .run_pf(SlackPolicy::RequireDeclared, &options)
            .unwrap();

        assert_eq!(result.status, SolveStatus::MaxIterExceeded);
        assert_eq!(result.iterations, 0);
        assert!(result.jacobian.is_none());
        // Initial profile: flat with setpoints overlaid.
        assert_abs_diff_eq!(result.vm[0], 1.02, epsilon = 1e-12);
        assert_abs_diff_eq!(result.vm[1], 1.01, epsilon = 1e-12);
        assert_abs_diff_eq!(result.vm[2], 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(result.va[2], 0.0, epsilon = 1e-12);
    }

    #[test]
    fn self_connected_bus_diverges_cleanly() {
        // Bus 1 hangs off the network entirely: only a shunt ties it to
        // ground, so its angle column is structurally singular.
        let model = GridModel::build(
            vec![Bus::new(0, 110.0), Bus::new(1, 110.0)],
            vec![],
            vec![Shunt::new(1, 0.0, 0.2)],
            vec![Load::new(1, 0.1, 0.05)],
            vec![Generator::reference(0, 1.0)],
        )
        .unwrap();

        let result = model
            .run_pf(SlackPolicy::RequireDeclared, &default_options())
            .unwrap();
        assert_eq!(result.status, SolveStatus::Diverged);
        assert_eq!(result.v.len(), 2);
    }

    #[test]
    fn isolating_a_pq_bus_never_resizes_state() {
        let mut model = four_bus();
        // Cut every branch incident to bus 3.
        model.set_active(ElementId::Branch(2), false).unwrap();
        model.set_active(ElementId::Branch(3), false).unwrap();

        let ybus = model.assemble_ybus();
        assert_eq!(ybus.nrows(), 4);
        assert_eq!(ybus.ncols(), 4);

        // The solve must terminate in a well-formed state, not panic.
        let result = model
            .run_pf(SlackPolicy::RequireDeclared, &default_options())
            .unwrap();
        assert_eq!(result.v.len(), 4);
        assert_eq!(result.status, SolveStatus::Diverged);
    }

    #[test]
    fn synthetic_slack_is_flagged_in_the_result() {
        let model = GridModel::build(
            vec![Bus::new(0, 110.0), Bus::new(1, 110.0)],
            vec![Branch::line(0, 1, 0.01, 0.05, 0.0)],
            vec![],
            vec![Load::new(1, 0.2, 0.08)],
            vec![],
        )
        .unwrap();

        let result = model
            .run_pf(
                SlackPolicy::SynthesizeAt { bus: 0, vm_pu: 1.0 },
                &default_options(),
            )
            .unwrap();
        assert!(result.converged());
        assert_eq!(result.slack_source, SlackSource::Synthetic);
        let synthetic = result.synthetic_slack.unwrap();
        assert_eq!(synthetic.bus, 0);
        assert_abs_diff_eq!(synthetic.p_pu, 0.2, epsilon = 1e-12);
    }

    #[test]
    fn out_of_service_bus_keeps_its_slot_and_initial_voltage() {
        let mut model = four_bus();
        // Take bus 3 and everything touching it out of service.
        model.set_active(ElementId::Bus(3), false).unwrap();
        model.set_active(ElementId::Branch(2), false).unwrap();
        model.set_active(ElementId::Branch(3), false).unwrap();
        model.set_active(ElementId::Load(1), false).unwrap();

        let result = model
            .run_pf(SlackPolicy::RequireDeclared, &default_options())
            .unwrap();
        assert!(result.converged());
        assert_eq!(result.v.len(), 4);
        // No equation for the dead bus: it stays at its initial value.
        assert_abs_diff_eq!(result.vm[3], 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(result.va[3], 0.0, epsilon = 1e-12);
    }
}

//! Steady-state AC power flow.
//!
//! Two layers: a grid admittance model ([`grid::GridModel`]) holding
//! element tables, the derived sparse Ybus and the slack/PV/PQ bus
//! classification, and a Newton-Raphson solver ([`newton_pf`]) with
//! reusable sparse LU factorization. [`PowerFlowSession`] is the
//! warm-start handle between the two; non-convergence is a result
//! ([`SolveStatus`]), not an error.

pub mod error;
pub mod grid;
mod jacobian;
mod newtonpf;
mod session;
pub mod solver;
pub(crate) mod sparse;

pub use jacobian::{dSbus_dV, reduced_jacobian};
pub use newtonpf::{NewtonOptions, NewtonReport, SolveStatus, newton_pf};
pub use session::{PowerFlowOptions, PowerFlowResult, PowerFlowSession};

pub mod prelude {
    pub use crate::error::{ConfigError, Error, StructureError};
    pub use crate::grid::{
        Branch, Bus, BusClassification, ElementId, Generator, GridModel, Load, Shunt, SlackPolicy,
        SlackSource, SyntheticSlack, Tap, TapSide,
    };
    pub use crate::newtonpf::{NewtonOptions, NewtonReport, SolveStatus, newton_pf};
    pub use crate::session::{PowerFlowOptions, PowerFlowResult, PowerFlowSession};
    pub use crate::solver::{DefaultSolver, Solve};
}

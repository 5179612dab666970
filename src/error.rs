//! Error taxonomy of the crate.
//!
//! Malformed topology and unsupported configurations are `Err` values
//! raised before any iteration starts. Numerical non-convergence and
//! divergence are *results*, not errors: see
//! [`SolveStatus`](crate::SolveStatus).

use thiserror::Error;

use crate::grid::ElementId;

/// Malformed input tables. Raised by [`GridModel::build`] and
/// [`GridModel::set_active`]; a failed build leaves no model behind.
///
/// [`GridModel::build`]: crate::grid::GridModel::build
/// [`GridModel::set_active`]: crate::grid::GridModel::set_active
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum StructureError {
    /// Bus indices must be dense `0..n` in table order; the admittance
    /// matrix is sized and indexed positionally.
    #[error("bus at table position {position} carries index {found}, expected {position}")]
    SparseBusIndexing { position: usize, found: usize },

    #[error("{element} references bus {bus}, but only {n_bus} buses exist")]
    BusOutOfRange {
        element: ElementId,
        bus: usize,
        n_bus: usize,
    },

    #[error("{element}: parameter `{field}` is not finite")]
    NonFinite {
        element: ElementId,
        field: &'static str,
    },

    #[error("{element}: tap ratio {ratio} is not positive")]
    InvalidTap { element: ElementId, ratio: f64 },

    #[error("{0} does not exist")]
    UnknownElement(ElementId),
}

/// Configurations the algorithm has no defined behaviour for; rejected
/// before iterating rather than silently approximated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("no in-service generator is declared slack and the slack policy requires one")]
    NoSlack,

    #[error("{0} in-service generators are declared slack, exactly one is supported")]
    MultipleSlack(usize),

    #[error("slack policy names bus {0}, which does not exist")]
    SlackBusMissing(usize),

    #[error("slack bus {0} is out of service")]
    SlackBusInactive(usize),

    #[error("reactive power limit enforcement is not implemented")]
    QLimitsUnsupported,
}

/// Union of everything a power flow entry point can reject.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum Error {
    #[error(transparent)]
    Structure(#[from] StructureError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

//! Grid admittance model: element tables, π-model expansion, Ybus
//! assembly and bus classification.

mod admittance;
mod elements;
mod model;

pub use admittance::{Admittance, AdmittanceBranch, GND, Port2};
pub use elements::{Branch, Bus, ElementId, Generator, Load, Shunt, Tap, TapSide};
pub use model::{
    BusClassification, GridModel, SlackPolicy, SlackSource, SyntheticSlack,
};
pub(crate) use model::permutation_matrix;

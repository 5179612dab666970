use std::fmt;

use serde::{Deserialize, Serialize};

/// A network node. Indices are dense and positional: bus `k` is row and
/// column `k` of the admittance matrix, for the lifetime of the model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bus {
    pub index: usize,
    /// Base voltage in kV. Informational: element parameters arrive
    /// already per-unit on the system base.
    pub vn_kv: f64,
    pub in_service: bool,
}

impl Bus {
    pub fn new(index: usize, vn_kv: f64) -> Self {
        Self {
            index,
            vn_kv,
            in_service: true,
        }
    }
}

/// Which winding of a transformer carries the tap changer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TapSide {
    /// Tap on the from (high-voltage) side.
    Hv,
    /// Tap on the to (low-voltage) side.
    Lv,
}

/// Off-nominal turns ratio of a transformer branch.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Tap {
    pub ratio: f64,
    pub side: TapSide,
}

/// A series element between two buses (line or two-winding
/// transformer) as a π equivalent in per-unit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Branch {
    pub from_bus: usize,
    pub to_bus: usize,
    pub r_pu: f64,
    pub x_pu: f64,
    /// Total charging susceptance; half lands at each terminal.
    pub b_pu: f64,
    pub tap: Option<Tap>,
    pub in_service: bool,
}

impl Branch {
    pub fn line(from_bus: usize, to_bus: usize, r_pu: f64, x_pu: f64, b_pu: f64) -> Self {
        Self {
            from_bus,
            to_bus,
            r_pu,
            x_pu,
            b_pu,
            tap: None,
            in_service: true,
        }
    }

    pub fn transformer(
        from_bus: usize,
        to_bus: usize,
        r_pu: f64,
        x_pu: f64,
        b_pu: f64,
        tap: Tap,
    ) -> Self {
        Self {
            tap: Some(tap),
            ..Self::line(from_bus, to_bus, r_pu, x_pu, b_pu)
        }
    }
}

/// Fixed power draw at nominal voltage, modelled as a constant
/// admittance on the bus diagonal.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Shunt {
    pub bus: usize,
    pub p_pu: f64,
    pub q_pu: f64,
    pub in_service: bool,
}

impl Shunt {
    pub fn new(bus: usize, p_pu: f64, q_pu: f64) -> Self {
        Self {
            bus,
            p_pu,
            q_pu,
            in_service: true,
        }
    }
}

/// A power withdrawal. Several loads on one bus sum.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Load {
    pub bus: usize,
    pub p_pu: f64,
    pub q_pu: f64,
    pub in_service: bool,
}

impl Load {
    pub fn new(bus: usize, p_pu: f64, q_pu: f64) -> Self {
        Self {
            bus,
            p_pu,
            q_pu,
            in_service: true,
        }
    }
}

/// A machine injecting active power under voltage-magnitude control.
///
/// Reactive limits are carried for completeness; enforcing them is a
/// rejected configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Generator {
    pub bus: usize,
    pub p_pu: f64,
    /// Voltage-magnitude setpoint.
    pub vm_pu: f64,
    pub q_min_pu: f64,
    pub q_max_pu: f64,
    /// Declared reference machine.
    pub slack: bool,
    pub in_service: bool,
}

impl Generator {
    pub fn new(bus: usize, p_pu: f64, vm_pu: f64) -> Self {
        Self {
            bus,
            p_pu,
            vm_pu,
            q_min_pu: f64::NEG_INFINITY,
            q_max_pu: f64::INFINITY,
            slack: false,
            in_service: true,
        }
    }

    /// The declared reference machine: fixed voltage, absorbs the
    /// system imbalance.
    pub fn reference(bus: usize, vm_pu: f64) -> Self {
        Self {
            slack: true,
            ..Self::new(bus, 0.0, vm_pu)
        }
    }
}

/// Addresses one element for activation toggles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ElementId {
    Bus(usize),
    Branch(usize),
    Shunt(usize),
    Load(usize),
    Generator(usize),
}

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ElementId::Bus(k) => write!(f, "bus {k}"),
            ElementId::Branch(k) => write!(f, "branch {k}"),
            ElementId::Shunt(k) => write!(f, "shunt {k}"),
            ElementId::Load(k) => write!(f, "load {k}"),
            ElementId::Generator(k) => write!(f, "generator {k}"),
        }
    }
}

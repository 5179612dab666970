use nalgebra::DVector;
use nalgebra_sparse::{CooMatrix, CscMatrix, CsrMatrix};
use num_complex::Complex64;
use num_traits::One;
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, StructureError};

use super::admittance::{AdmittanceBranch, GND, expand_branch, expand_shunt};
use super::elements::{Branch, Bus, ElementId, Generator, Load, Shunt};

/// Reactive bounds handed to a fabricated slack machine. Deliberately
/// artificial; limits are never enforced here anyway.
const SYNTHETIC_Q_BOUND_PU: f64 = 999_999.0;

/// How the reference bus is chosen when classification runs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum SlackPolicy {
    /// Exactly one in-service generator must be declared slack.
    RequireDeclared,
    /// Fall back to the external-grid bus: use a declared slack if one
    /// exists, else promote a generator already at `bus`, else
    /// fabricate a synthetic machine there absorbing the system-wide
    /// imbalance.
    SynthesizeAt { bus: usize, vm_pu: f64 },
}

/// Where the slack machine came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SlackSource {
    /// A generator carried the slack flag.
    Declared,
    /// An existing generator at the policy bus was promoted.
    Promoted,
    /// No machine was available; one was fabricated.
    Synthetic,
}

/// Parameters of a fabricated slack machine.
///
/// Heuristic bookkeeping, not physical modelling: the real/reactive
/// split reported at this machine can be materially imprecise.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SyntheticSlack {
    pub bus: usize,
    /// Active-power deficit the machine absorbs: Σload − Σgeneration.
    pub p_pu: f64,
    pub vm_pu: f64,
    pub q_min_pu: f64,
    pub q_max_pu: f64,
}

/// Bus index sets produced by one classification pass. The solver
/// consumes the sets positionally after permutation; no per-bus type
/// dispatch happens inside the iteration loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusClassification {
    /// The reference bus.
    pub slack: usize,
    /// Voltage-magnitude setpoint at the reference bus.
    pub slack_vm: f64,
    /// Buses under generator voltage control, slack excluded.
    pub pv: Vec<usize>,
    /// Everything else in service.
    pub pq: Vec<usize>,
    /// Buses carrying no power-balance equation: the slack followed by
    /// out-of-service buses.
    pub ext: Vec<usize>,
    pub source: SlackSource,
    /// Present only when `source == SlackSource::Synthetic`.
    pub synthetic: Option<SyntheticSlack>,
}

/// The grid admittance model.
///
/// Element tables are validated once at [`GridModel::build`] and fixed
/// afterwards; only activation flags change, through
/// [`GridModel::set_active`]. The admittance matrix is derived from the
/// current flags on demand and its dimension never changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridModel {
    buses: Vec<Bus>,
    branches: Vec<Branch>,
    shunts: Vec<Shunt>,
    loads: Vec<Load>,
    generators: Vec<Generator>,
}

impl GridModel {
    /// Validates and assembles the model. All-or-nothing: any malformed
    /// record fails the whole build and no model is produced.
    ///
    /// The single repair performed is replacing a non-finite tap ratio
    /// with the neutral 1.0; absent tap data means an on-nominal
    /// winding.
    pub fn build(
        buses: Vec<Bus>,
        mut branches: Vec<Branch>,
        shunts: Vec<Shunt>,
        loads: Vec<Load>,
        generators: Vec<Generator>,
    ) -> Result<Self, StructureError> {
        let n_bus = buses.len();
        for (position, bus) in buses.iter().enumerate() {
            if bus.index != position {
                return Err(StructureError::SparseBusIndexing {
                    position,
                    found: bus.index,
                });
            }
            check_finite(bus.vn_kv, ElementId::Bus(position), "vn_kv")?;
        }

        for (k, branch) in branches.iter_mut().enumerate() {
            let id = ElementId::Branch(k);
            check_bus(branch.from_bus, id, n_bus)?;
            check_bus(branch.to_bus, id, n_bus)?;
            check_finite(branch.r_pu, id, "r_pu")?;
            check_finite(branch.x_pu, id, "x_pu")?;
            check_finite(branch.b_pu, id, "b_pu")?;
            if let Some(tap) = &mut branch.tap {
                if !tap.ratio.is_finite() {
                    tap.ratio = 1.0;
                } else if tap.ratio <= 0.0 {
                    return Err(StructureError::InvalidTap {
                        element: id,
                        ratio: tap.ratio,
                    });
                }
            }
        }

        for (k, shunt) in shunts.iter().enumerate() {
            let id = ElementId::Shunt(k);
            check_bus(shunt.bus, id, n_bus)?;
            check_finite(shunt.p_pu, id, "p_pu")?;
            check_finite(shunt.q_pu, id, "q_pu")?;
        }

        for (k, load) in loads.iter().enumerate() {
            let id = ElementId::Load(k);
            check_bus(load.bus, id, n_bus)?;
            check_finite(load.p_pu, id, "p_pu")?;
            check_finite(load.q_pu, id, "q_pu")?;
        }

        // Reactive limits may legitimately be infinite (unlimited);
        // they are carried, never enforced.
        for (k, generator) in generators.iter().enumerate() {
            let id = ElementId::Generator(k);
            check_bus(generator.bus, id, n_bus)?;
            check_finite(generator.p_pu, id, "p_pu")?;
            check_finite(generator.vm_pu, id, "vm_pu")?;
        }

        Ok(Self {
            buses,
            branches,
            shunts,
            loads,
            generators,
        })
    }

    pub fn n_bus(&self) -> usize {
        self.buses.len()
    }

    pub fn buses(&self) -> &[Bus] {
        &self.buses
    }

    pub fn branches(&self) -> &[Branch] {
        &self.branches
    }

    pub fn shunts(&self) -> &[Shunt] {
        &self.shunts
    }

    pub fn loads(&self) -> &[Load] {
        &self.loads
    }

    pub fn generators(&self) -> &[Generator] {
        &self.generators
    }

    /// Toggles one element's in-service flag. Idempotent; the
    /// admittance matrix is re-derived from the flags at the next
    /// assembly, never resized.
    pub fn set_active(&mut self, id: ElementId, active: bool) -> Result<(), StructureError> {
        let flag = match id {
            ElementId::Bus(k) => self.buses.get_mut(k).map(|e| &mut e.in_service),
            ElementId::Branch(k) => self.branches.get_mut(k).map(|e| &mut e.in_service),
            ElementId::Shunt(k) => self.shunts.get_mut(k).map(|e| &mut e.in_service),
            ElementId::Load(k) => self.loads.get_mut(k).map(|e| &mut e.in_service),
            ElementId::Generator(k) => self.generators.get_mut(k).map(|e| &mut e.in_service),
        };
        match flag {
            Some(flag) => {
                *flag = active;
                Ok(())
            }
            None => Err(StructureError::UnknownElement(id)),
        }
    }

    /// Elementary admittance branches of everything in service.
    fn admittance_branches(&self) -> Vec<AdmittanceBranch> {
        let mut out = Vec::new();
        for branch in self.branches.iter().filter(|b| b.in_service) {
            expand_branch(branch, &mut out);
        }
        for shunt in self.shunts.iter().filter(|s| s.in_service) {
            expand_shunt(shunt, &mut out);
        }
        out
    }

    /// Assembles the bus admittance matrix from the current activation
    /// flags as the incidence product `A·diag(y)·Aᵀ`. Out-of-service
    /// elements contribute zero admittance; the dimension is always
    /// `n_bus × n_bus`.
    pub fn assemble_ybus(&self) -> CscMatrix<Complex64> {
        let branches = self.admittance_branches();
        let incidence = CsrMatrix::from(&incidence_matrix(self.n_bus(), &branches));

        let mut diag = CsrMatrix::identity(branches.len());
        diag.values_mut()
            .iter_mut()
            .zip(&branches)
            .for_each(|(value, branch)| *value = branch.y.0);

        let ybus = &incidence * (diag * incidence.transpose());
        CscMatrix::from(&ybus)
    }

    /// Net complex injection per bus: generation − load, per-unit.
    pub fn sbus(&self) -> DVector<Complex64> {
        let mut sbus = DVector::zeros(self.n_bus());
        for generator in self.generators.iter().filter(|g| g.in_service) {
            sbus[generator.bus] += Complex64::new(generator.p_pu, 0.0);
        }
        for load in self.loads.iter().filter(|l| l.in_service) {
            sbus[load.bus] -= Complex64::new(load.p_pu, load.q_pu);
        }
        sbus
    }

    /// Flat-start profile (1∠0 everywhere) with generator setpoints and
    /// the slack setpoint overlaid. Reverse iteration makes the first
    /// in-service machine on a shared bus win.
    pub fn v_init(&self, classification: &BusClassification) -> DVector<Complex64> {
        let mut v = DVector::from_element(self.n_bus(), Complex64::one());
        for generator in self.generators.iter().filter(|g| g.in_service).rev() {
            v[generator.bus] = Complex64::new(generator.vm_pu, 0.0);
        }
        v[classification.slack] = Complex64::new(classification.slack_vm, 0.0);
        v
    }

    /// Partitions buses into slack/PV/PQ index sets under `policy`.
    ///
    /// Runs once per session; the solver afterwards only sees contiguous
    /// index ranges.
    pub fn classify(&self, policy: SlackPolicy) -> Result<BusClassification, ConfigError> {
        let declared: Vec<usize> = self
            .generators
            .iter()
            .enumerate()
            .filter(|(_, g)| g.in_service && g.slack)
            .map(|(k, _)| k)
            .collect();
        if declared.len() > 1 {
            return Err(ConfigError::MultipleSlack(declared.len()));
        }

        let (slack_machine, source, synthetic) = match (declared.first(), policy) {
            (Some(&machine), _) => (Some(machine), SlackSource::Declared, None),
            (None, SlackPolicy::RequireDeclared) => return Err(ConfigError::NoSlack),
            (None, SlackPolicy::SynthesizeAt { bus, vm_pu }) => {
                if bus >= self.n_bus() {
                    return Err(ConfigError::SlackBusMissing(bus));
                }
                match self
                    .generators
                    .iter()
                    .position(|g| g.in_service && g.bus == bus)
                {
                    Some(machine) => (Some(machine), SlackSource::Promoted, None),
                    None => {
                        let deficit: f64 = self
                            .loads
                            .iter()
                            .filter(|l| l.in_service)
                            .map(|l| l.p_pu)
                            .sum::<f64>()
                            - self
                                .generators
                                .iter()
                                .filter(|g| g.in_service)
                                .map(|g| g.p_pu)
                                .sum::<f64>();
                        log::warn!(
                            "no slack machine available; fabricating one at bus {bus} \
                             absorbing {deficit:.4} pu; its real/reactive split is heuristic"
                        );
                        let synthetic = SyntheticSlack {
                            bus,
                            p_pu: deficit,
                            vm_pu,
                            q_min_pu: -SYNTHETIC_Q_BOUND_PU,
                            q_max_pu: SYNTHETIC_Q_BOUND_PU,
                        };
                        (None, SlackSource::Synthetic, Some(synthetic))
                    }
                }
            }
        };

        let (slack, slack_vm) = match (slack_machine, &synthetic) {
            (Some(machine), _) => {
                let generator = &self.generators[machine];
                (generator.bus, generator.vm_pu)
            }
            (None, Some(synthetic)) => (synthetic.bus, synthetic.vm_pu),
            (None, None) => unreachable!("slack resolution covers every policy arm"),
        };
        if !self.buses[slack].in_service {
            return Err(ConfigError::SlackBusInactive(slack));
        }

        let mut is_pv = vec![false; self.n_bus()];
        for generator in self.generators.iter().filter(|g| g.in_service) {
            if generator.bus != slack && self.buses[generator.bus].in_service {
                is_pv[generator.bus] = true;
            }
        }

        let pv: Vec<usize> = (0..self.n_bus()).filter(|&k| is_pv[k]).collect();
        let pq: Vec<usize> = self
            .buses
            .iter()
            .filter(|b| b.in_service && b.index != slack && !is_pv[b.index])
            .map(|b| b.index)
            .collect();
        let ext: Vec<usize> = std::iter::once(slack)
            .chain(
                self.buses
                    .iter()
                    .filter(|b| !b.in_service)
                    .map(|b| b.index),
            )
            .collect();

        Ok(BusClassification {
            slack,
            slack_vm,
            pv,
            pq,
            ext,
            source,
            synthetic,
        })
    }
}

fn check_bus(bus: usize, element: ElementId, n_bus: usize) -> Result<(), StructureError> {
    if bus < n_bus {
        Ok(())
    } else {
        Err(StructureError::BusOutOfRange {
            element,
            bus,
            n_bus,
        })
    }
}

fn check_finite(value: f64, element: ElementId, field: &'static str) -> Result<(), StructureError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(StructureError::NonFinite { element, field })
    }
}

/// Incidence of elementary branches onto buses; grounded terminals are
/// skipped so a ground leg stamps only its bus diagonal.
fn incidence_matrix(n_bus: usize, branches: &[AdmittanceBranch]) -> CooMatrix<Complex64> {
    let mut incidence = CooMatrix::new(n_bus, branches.len());
    for (idx, branch) in branches.iter().enumerate() {
        let (from, to) = (branch.port.0[0], branch.port.0[1]);
        if from != GND {
            incidence.push(from as usize, idx, Complex64::one());
        }
        if to != GND {
            incidence.push(to as usize, idx, -Complex64::one());
        }
    }
    incidence
}

/// Permutation gathering buses into `[pv…, pq…, slack, inactive…]`
/// order: row `i` of the result selects original bus `order[i]`, so
/// `P·x` is the permuted vector and `Pᵀ` restores the original order.
pub(crate) fn permutation_matrix(
    classification: &BusClassification,
    n_bus: usize,
) -> CsrMatrix<Complex64> {
    let order: Vec<usize> = classification
        .pv
        .iter()
        .chain(classification.pq.iter())
        .chain(classification.ext.iter())
        .copied()
        .collect();
    debug_assert_eq!(order.len(), n_bus, "classification must cover every bus");

    let mut coo = CooMatrix::new(n_bus, n_bus);
    for (row, &col) in order.iter().enumerate() {
        coo.push(row, col, Complex64::one());
    }
    CsrMatrix::from(&coo)
}

use nalgebra::Vector2;
use num_complex::Complex64;
use serde::{Deserialize, Serialize};

use super::elements::{Branch, Shunt, TapSide};

/// Pseudo-bus for grounded terminals; a `(bus, GND)` branch contributes
/// only to that bus's diagonal.
pub const GND: i64 = -1;

/// A complex admittance value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Admittance(pub Complex64);

/// Two-terminal port of an elementary branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Port2(pub Vector2<i64>);

impl Port2 {
    pub fn new(from: i64, to: i64) -> Self {
        Self(Vector2::new(from, to))
    }
}

/// One elementary branch of the admittance network. Every model element
/// expands into one or more of these; the bus admittance matrix is their
/// incidence product.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AdmittanceBranch {
    pub y: Admittance,
    pub port: Port2,
}

impl AdmittanceBranch {
    fn new(y: Complex64, from: i64, to: i64) -> Self {
        Self {
            y: Admittance(y),
            port: Port2::new(from, to),
        }
    }
}

/// π-model expansion of a series branch.
///
/// A plain line yields the series admittance between its terminals plus
/// one charging leg `j·b/2` to ground at each end. An off-nominal ratio
/// `t` folds into a three-branch equivalent (`y/t` in series,
/// `(1 − t)·y/t²` to ground on the tap side, `(1 − 1/t)·y` on the
/// other) which reproduces the standard tap model `Yff = y/t²`,
/// `Ytt = y`, `Yft = Ytf = −y/t` with the tap on the from side
/// (mirrored for [`TapSide::Lv`]). Charging on the tap side scales by
/// `1/t²` as well.
///
/// A branch with zero series impedance is treated as zero-length: it
/// contributes nothing but keeps its slot.
pub(crate) fn expand_branch(branch: &Branch, out: &mut Vec<AdmittanceBranch>) {
    let t = branch.tap.map_or(1.0, |tap| tap.ratio);
    let (tap_bus, other_bus) = match branch.tap.map(|tap| tap.side) {
        Some(TapSide::Lv) => (branch.to_bus as i64, branch.from_bus as i64),
        _ => (branch.from_bus as i64, branch.to_bus as i64),
    };

    let z = Complex64::new(branch.r_pu, branch.x_pu);
    if z.norm_sqr() > 0.0 {
        let y = z.inv();
        out.push(AdmittanceBranch::new(y / t, tap_bus, other_bus));
        if t != 1.0 {
            out.push(AdmittanceBranch::new((1.0 - t) * y / (t * t), tap_bus, GND));
            out.push(AdmittanceBranch::new((1.0 - 1.0 / t) * y, other_bus, GND));
        }
    }

    if branch.b_pu != 0.0 {
        let y_half = Complex64::new(0.0, branch.b_pu * 0.5);
        out.push(AdmittanceBranch::new(y_half / (t * t), tap_bus, GND));
        out.push(AdmittanceBranch::new(y_half, other_bus, GND));
    }
}

/// Constant-admittance equivalent of a shunt's draw at nominal voltage:
/// `S = |V|²·conj(y)` with `|V| = 1` pu gives `y = p − j·q`.
pub(crate) fn expand_shunt(shunt: &Shunt, out: &mut Vec<AdmittanceBranch>) {
    out.push(AdmittanceBranch::new(
        Complex64::new(shunt.p_pu, -shunt.q_pu),
        shunt.bus as i64,
        GND,
    ));
}

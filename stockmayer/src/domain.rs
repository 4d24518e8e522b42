// SPDX-License-Identifier: AGPL-3.0-only

//! Global box geometry, reaction-field state and macroscopic values.
//!
//! Each rank accumulates local sums during the traversal; the domain turns
//! them into global values through one reduction per step: potential energy
//! (6·U_LJ converted back after the reduce), virial with the reaction-field
//! correction, particle count, temperature from the translational and
//! rotational kinetic sums, and the thermostat scale factors applied to
//! velocities and angular momenta.

use crate::cellgrid::CellGrid;
use crate::components::ComponentRegistry;
use crate::decomp::Decomposition;
use crate::error::SimError;
use crate::kernel::MacroAccum;

/// Reaction-field dielectric constant.
///
/// The conducting ("tin-foil") boundary is the ε_RF → ∞ limit and is an
/// explicit state rather than a sentinel magnitude; its prefactor is the
/// exact limit 1/r_c³.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EpsilonRf {
    /// Finite dielectric constant ε_RF.
    Finite(f64),
    /// ε_RF = ∞ (conductor).
    Conducting,
}

impl EpsilonRf {
    /// Prefactor 2(ε_RF−1)/((2ε_RF+1) r_c³), or its conducting limit.
    #[must_use]
    pub fn prefactor(self, cutoff: f64) -> f64 {
        let rc3 = cutoff * cutoff * cutoff;
        match self {
            Self::Finite(eps) => 2.0 * (eps - 1.0) / ((2.0 * eps + 1.0) * rc3),
            Self::Conducting => 1.0 / rc3,
        }
    }
}

/// Global simulation box and macroscopic state.
#[derive(Debug)]
pub struct Domain {
    /// Global box edge lengths.
    pub length: [f64; 3],
    /// Electrostatics cutoff radius.
    pub cutoff: f64,
    /// LJ cutoff radius (≤ cutoff).
    pub lj_cutoff: f64,
    /// Reaction-field dielectric state.
    pub epsilon_rf: EpsilonRf,
    /// Thermostat target temperature; `None` runs micro-canonical.
    pub target_temperature: Option<f64>,
    /// Thermostat relaxation time in units of the timestep.
    pub thermostat_tau: f64,

    current_time: f64,
    local: MacroAccum,

    global_n: usize,
    global_n_per_component: Vec<usize>,
    global_upot: f64,
    global_virial: f64,
    global_temperature: f64,
    global_mv2: f64,
    global_iw2: f64,
    beta_trans: f64,
    beta_rot: f64,
}

impl Domain {
    /// New domain over the global box.
    ///
    /// # Errors
    ///
    /// [`SimError::Geometry`] if a cutoff exceeds half the shortest box
    /// edge or the LJ cutoff exceeds the full cutoff.
    pub fn new(length: [f64; 3], cutoff: f64, lj_cutoff: f64) -> Result<Self, SimError> {
        let min_half = length.iter().fold(f64::INFINITY, |a, &b| a.min(b)) / 2.0;
        if cutoff > min_half {
            return Err(SimError::Geometry(format!(
                "cutoff {cutoff} exceeds half the shortest box edge {min_half}"
            )));
        }
        if lj_cutoff > cutoff {
            return Err(SimError::Geometry(format!(
                "LJ cutoff {lj_cutoff} exceeds the full cutoff {cutoff}"
            )));
        }
        if !(lj_cutoff > 0.0) {
            return Err(SimError::Geometry(format!(
                "LJ cutoff must be positive, got {lj_cutoff}"
            )));
        }
        Ok(Self {
            length,
            cutoff,
            lj_cutoff,
            epsilon_rf: EpsilonRf::Conducting,
            target_temperature: None,
            thermostat_tau: 5.0,
            current_time: 0.0,
            local: MacroAccum::default(),
            global_n: 0,
            global_n_per_component: Vec::new(),
            global_upot: 0.0,
            global_virial: 0.0,
            global_temperature: 0.0,
            global_mv2: 0.0,
            global_iw2: 0.0,
            beta_trans: 1.0,
            beta_rot: 1.0,
        })
    }

    /// Box volume.
    #[must_use]
    pub fn volume(&self) -> f64 {
        self.length[0] * self.length[1] * self.length[2]
    }

    /// Reaction-field prefactor for the dipole kernel.
    #[must_use]
    pub fn rf_prefactor(&self) -> f64 {
        self.epsilon_rf.prefactor(self.cutoff)
    }

    /// Install this rank's traversal sums.
    pub fn set_local_sums(&mut self, acc: MacroAccum) {
        self.local = acc;
    }

    /// Reduce the step's sums across ranks and derive U, virial, N, T and
    /// the thermostat scale factors.
    ///
    /// # Errors
    ///
    /// Propagates reduction timeouts.
    #[allow(clippy::cast_possible_truncation)] // particle counts round-trip f64 exactly
    pub fn calculate_global_values(
        &mut self,
        decomp: &dyn Decomposition,
        grid: &CellGrid,
        registry: &ComponentRegistry,
        dt: f64,
    ) -> Result<(), SimError> {
        let n_components = registry.components().len();
        let mut mv2 = 0.0;
        let mut iw2 = 0.0;
        let mut rot_dof = 0usize;
        let mut n = 0usize;
        let mut per_component = vec![0.0f64; n_components];
        grid.for_each_owned(|m| {
            let comp = registry.component(m.component_id);
            n += 1;
            per_component[usize::from(m.component_id)] += 1.0;
            mv2 += comp.mass() * m.v2();
            iw2 += m.iw2(comp.inertia);
            rot_dof += comp.inertia.iter().filter(|&&i| i > 0.0).count();
        });

        let mut sums = vec![
            self.local.upot6_lj,
            self.local.upot_xpoles,
            self.local.virial,
            self.local.my_rf,
            n as f64,
            mv2,
            iw2,
            rot_dof as f64,
        ];
        sums.extend_from_slice(&per_component);
        decomp.reduce_sum(&mut sums)?;
        self.global_n_per_component = sums[8..].iter().map(|&c| c as usize).collect();

        let global = MacroAccum {
            upot6_lj: sums[0],
            upot_xpoles: sums[1],
            virial: sums[2],
            my_rf: sums[3],
        };
        self.global_n = sums[4] as usize;
        self.global_upot = global.upot();
        self.global_virial = global.virial_total();

        let g_mv2 = sums[5];
        let g_iw2 = sums[6];
        let g_rot_dof = sums[7];
        self.global_mv2 = g_mv2;
        self.global_iw2 = g_iw2;
        let dof = 3.0 * sums[4] + g_rot_dof;
        self.global_temperature = if dof > 0.0 { (g_mv2 + g_iw2) / dof } else { 0.0 };

        // Berendsen-style scale factors toward the target temperature.
        (self.beta_trans, self.beta_rot) = match self.target_temperature {
            Some(t_target) if sums[4] > 0.0 => {
                let t_trans = if sums[4] > 0.0 { g_mv2 / (3.0 * sums[4]) } else { 0.0 };
                let t_rot = if g_rot_dof > 0.0 { g_iw2 / g_rot_dof } else { 0.0 };
                let beta = |t_cur: f64| -> f64 {
                    if t_cur > 1e-30 {
                        (1.0 + (dt / self.thermostat_tau) * (t_target / t_cur - 1.0))
                            .max(0.0)
                            .sqrt()
                    } else {
                        1.0
                    }
                };
                (beta(t_trans), beta(t_rot))
            }
            _ => (1.0, 1.0),
        };
        Ok(())
    }

    /// Global potential energy (after `calculate_global_values`).
    #[must_use]
    pub const fn global_upot(&self) -> f64 {
        self.global_upot
    }

    /// Potential energy per molecule.
    #[must_use]
    pub fn average_upot(&self) -> f64 {
        if self.global_n > 0 {
            self.global_upot / self.global_n as f64
        } else {
            0.0
        }
    }

    /// Global virial including the reaction-field correction.
    #[must_use]
    pub const fn global_virial(&self) -> f64 {
        self.global_virial
    }

    /// Global molecule count.
    #[must_use]
    pub const fn global_n(&self) -> usize {
        self.global_n
    }

    /// Global molecule counts per component.
    #[must_use]
    pub fn global_n_per_component(&self) -> &[usize] {
        &self.global_n_per_component
    }

    /// Instantaneous temperature.
    #[must_use]
    pub const fn global_temperature(&self) -> f64 {
        self.global_temperature
    }

    /// Total kinetic energy ½(Σ m v² + Σ I ω²).
    #[must_use]
    pub fn global_kinetic(&self) -> f64 {
        0.5 * (self.global_mv2 + self.global_iw2)
    }

    /// Global number density.
    #[must_use]
    pub fn global_density(&self) -> f64 {
        self.global_n as f64 / self.volume()
    }

    /// Pressure p = (N·T + W/3)/V.
    #[must_use]
    pub fn global_pressure(&self) -> f64 {
        (self.global_n as f64 * self.global_temperature + self.global_virial / 3.0) / self.volume()
    }

    /// Thermostat scale factor for velocities.
    #[must_use]
    pub const fn beta_trans(&self) -> f64 {
        self.beta_trans
    }

    /// Thermostat scale factor for angular momenta.
    #[must_use]
    pub const fn beta_rot(&self) -> f64 {
        self.beta_rot
    }

    /// Remove the global center-of-mass momentum: reduce Σm·v and Σm,
    /// subtract the mass-weighted share from every velocity. Afterwards
    /// |Σ m·v| is bounded by rounding.
    ///
    /// # Errors
    ///
    /// Propagates reduction timeouts.
    pub fn remove_momentum(
        &self,
        decomp: &dyn Decomposition,
        grid: &mut CellGrid,
        registry: &ComponentRegistry,
    ) -> Result<(), SimError> {
        let mut sums = [0.0f64; 4];
        grid.for_each_owned(|m| {
            let mass = registry.component(m.component_id).mass();
            for d in 0..3 {
                sums[d] += mass * m.v[d];
            }
            sums[3] += mass;
        });
        decomp.reduce_sum(&mut sums)?;
        if sums[3] <= 0.0 {
            return Ok(());
        }
        let v_cm = [sums[0] / sums[3], sums[1] / sums[3], sums[2] / sums[3]];
        grid.for_each_owned_mut(|m| {
            for d in 0..3 {
                m.v[d] -= v_cm[d];
            }
        });
        Ok(())
    }

    /// Simulation time.
    #[must_use]
    pub const fn time(&self) -> f64 {
        self.current_time
    }

    /// Set the simulation time (checkpoint restart).
    pub fn set_time(&mut self, t: f64) {
        self.current_time = t;
    }

    /// Advance the simulation time by one step.
    pub fn advance_time(&mut self, dt: f64) {
        self.current_time += dt;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::components::Component;
    use crate::decomp::SequentialDecomposition;
    use crate::molecule::Molecule;

    #[test]
    fn conducting_limit_is_inverse_rc_cubed() {
        let rc = 2.0;
        assert!((EpsilonRf::Conducting.prefactor(rc) - 1.0 / 8.0).abs() < 1e-15);
        // A very large finite ε approaches the conducting limit.
        let near = EpsilonRf::Finite(1e12).prefactor(rc);
        assert!((near - 1.0 / 8.0).abs() < 1e-10);
        // ε = 1 (vacuum) has no correction.
        assert_eq!(EpsilonRf::Finite(1.0).prefactor(rc), 0.0);
    }

    #[test]
    fn geometry_checks() {
        assert!(Domain::new([10.0; 3], 6.0, 6.0).is_err(), "cutoff > L/2");
        assert!(Domain::new([10.0; 3], 3.0, 4.0).is_err(), "LJ > full");
        assert!(Domain::new([10.0; 3], 3.0, 2.5).is_ok());
    }

    #[test]
    fn global_values_single_rank() {
        let registry =
            ComponentRegistry::build(vec![Component::single_lj(1.0, 1.0, 2.0)], 2.5).unwrap();
        let decomp = SequentialDecomposition::new([10.0; 3], 2.5);
        let mut grid = CellGrid::new([0.0; 3], [10.0; 3], 2.5).unwrap();
        grid.insert_owned(Molecule::new(1, 0, [2.0; 3], [1.0, 0.0, 0.0]));
        grid.insert_owned(Molecule::new(2, 0, [7.0; 3], [-1.0, 0.0, 0.0]));

        let mut domain = Domain::new([10.0; 3], 2.5, 2.5).unwrap();
        domain.set_local_sums(MacroAccum {
            upot6_lj: -12.0,
            upot_xpoles: 0.5,
            virial: 3.0,
            my_rf: -0.25,
        });
        domain
            .calculate_global_values(&decomp, &grid, &registry, 0.005)
            .unwrap();

        assert_eq!(domain.global_n(), 2);
        assert_eq!(domain.global_n_per_component(), &[2]);
        // U = −12/6 + 0.5 − 0.25
        assert!((domain.global_upot() - (-1.75)).abs() < 1e-12);
        // W = 3 + 3·(−0.25)
        assert!((domain.global_virial() - 2.25).abs() < 1e-12);
        // T = Σ m v²/(3N) = (2 + 2)/6
        assert!((domain.global_temperature() - 4.0 / 6.0).abs() < 1e-12);
        assert!((domain.global_density() - 2e-3).abs() < 1e-15);
    }

    #[test]
    fn thermostat_beta_moves_toward_target() {
        let registry =
            ComponentRegistry::build(vec![Component::single_lj(1.0, 1.0, 1.0)], 2.5).unwrap();
        let decomp = SequentialDecomposition::new([10.0; 3], 2.5);
        let mut grid = CellGrid::new([0.0; 3], [10.0; 3], 2.5).unwrap();
        grid.insert_owned(Molecule::new(1, 0, [5.0; 3], [3.0, 0.0, 0.0]));

        let mut domain = Domain::new([10.0; 3], 2.5, 2.5).unwrap();
        domain.target_temperature = Some(1.0);
        domain.thermostat_tau = 1.0;
        domain
            .calculate_global_values(&decomp, &grid, &registry, 1.0)
            .unwrap();
        // current T = 9/3 = 3 > 1 → cooling
        assert!(domain.beta_trans() < 1.0);
        assert!((domain.beta_rot() - 1.0).abs() < 1e-12, "no rotational dof");
    }

    #[test]
    fn momentum_removal_zeroes_total() {
        let registry =
            ComponentRegistry::build(vec![Component::single_lj(1.0, 1.0, 2.0)], 2.5).unwrap();
        let decomp = SequentialDecomposition::new([10.0; 3], 2.5);
        let mut grid = CellGrid::new([0.0; 3], [10.0; 3], 2.5).unwrap();
        grid.insert_owned(Molecule::new(1, 0, [2.0; 3], [1.0, 2.0, 3.0]));
        grid.insert_owned(Molecule::new(2, 0, [7.0; 3], [0.5, -1.0, 0.0]));

        let domain = Domain::new([10.0; 3], 2.5, 2.5).unwrap();
        domain.remove_momentum(&decomp, &mut grid, &registry).unwrap();

        let mut p = [0.0; 3];
        let mut vmax: f64 = 0.0;
        grid.for_each_owned(|m| {
            for d in 0..3 {
                p[d] += 2.0 * m.v[d];
                vmax = vmax.max(m.v[d].abs());
            }
        });
        let pmag = (p[0] * p[0] + p[1] * p[1] + p[2] * p[2]).sqrt();
        assert!(
            pmag <= crate::tolerances::MOMENTUM_REMOVAL_FACTOR * 2.0 * vmax.max(1.0),
            "residual momentum {pmag}"
        );
    }
}

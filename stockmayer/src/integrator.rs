// SPDX-License-Identifier: AGPL-3.0-only

//! Leapfrog integrator with rigid-body rotation.
//!
//! Two events per step. `event_new_timestep` applies the first velocity
//! half-kick from the previous step's forces, drifts positions by a full
//! step, half-kicks the angular momentum and clears the accumulators for
//! the coming force calculation. `event_forces_calculated` applies the
//! second half-kicks and rotates the orientation quaternion by the
//! body-frame angular velocity over the full step (Rodrigues formula),
//! renormalizing afterwards.
//!
//! Failure behavior: NaN in any force aborts the step; a molecule moving
//! faster than one cell per step only warns — the halo layer may then miss
//! interactions, which is a configuration problem rather than a programming
//! error.

use log::warn;

use crate::cellgrid::CellGrid;
use crate::components::ComponentRegistry;
use crate::error::SimError;
use crate::quaternion::Quat;
use crate::tolerances::QUATERNION_NORM_ABS;

/// Leapfrog (velocity-Verlet equivalent) integrator.
#[derive(Debug, Clone, Copy)]
pub struct Leapfrog {
    /// Timestep length.
    pub dt: f64,
}

impl Leapfrog {
    /// New integrator with the given timestep.
    #[must_use]
    pub const fn new(dt: f64) -> Self {
        Self { dt }
    }

    /// First half-kick + drift; clears force/torque accumulators for the
    /// upcoming traversal.
    ///
    /// # Errors
    ///
    /// [`SimError::Numeric`] for a non-positive molecular mass.
    pub fn event_new_timestep(
        &self,
        grid: &mut CellGrid,
        registry: &ComponentRegistry,
    ) -> Result<(), SimError> {
        let dt = self.dt;
        let half = 0.5 * dt;
        let mut bad_mass = None;
        grid.for_each_owned_mut(|m| {
            let comp = registry.component(m.component_id);
            let mass = comp.mass();
            if mass <= 0.0 {
                bad_mass = Some(m.id);
                return;
            }
            let inv_m = 1.0 / mass;
            for d in 0..3 {
                m.v[d] += half * m.f[d] * inv_m;
                m.r[d] += dt * m.v[d];
                m.d[d] += half * m.m[d];
            }
            m.clear_accumulators();
        });
        if let Some(id) = bad_mass {
            return Err(SimError::Numeric(format!(
                "molecule {id} has non-positive mass; cannot integrate"
            )));
        }
        Ok(())
    }

    /// Second half-kick plus the quaternion rotation.
    ///
    /// # Errors
    ///
    /// [`SimError::Numeric`] if any force component is NaN or a quaternion
    /// fails to renormalize.
    pub fn event_forces_calculated(
        &self,
        grid: &mut CellGrid,
        registry: &ComponentRegistry,
    ) -> Result<(), SimError> {
        let dt = self.dt;
        let half = 0.5 * dt;
        let min_cell = grid.cell_len().iter().fold(f64::INFINITY, |a, &b| a.min(b));
        let mut nan_id = None;
        let mut drift_id = None;
        let mut too_fast = 0usize;

        grid.for_each_owned_mut(|m| {
            if m.f.iter().any(|f| f.is_nan()) || m.m.iter().any(|t| t.is_nan()) {
                nan_id = Some(m.id);
                return;
            }
            let comp = registry.component(m.component_id);
            let inv_m = 1.0 / comp.mass();
            for d in 0..3 {
                m.v[d] += half * m.f[d] * inv_m;
                m.d[d] += half * m.m[d];
            }

            if comp.rotates() {
                let w_body = m.angular_velocity_body(comp.inertia);
                let rot = Quat::exp([w_body[0] * dt, w_body[1] * dt, w_body[2] * dt]);
                m.q = m.q.mul(&rot).normalized();
                if (m.q.norm_sq() - 1.0).abs() > QUATERNION_NORM_ABS {
                    drift_id = Some(m.id);
                }
            }

            let speed2 = m.v2();
            if speed2.sqrt() * dt > min_cell {
                too_fast += 1;
            }
        });

        if let Some(id) = nan_id {
            return Err(SimError::Numeric(format!(
                "NaN force/torque on molecule {id}"
            )));
        }
        if let Some(id) = drift_id {
            return Err(SimError::Numeric(format!(
                "quaternion of molecule {id} drifted beyond tolerance"
            )));
        }
        if too_fast > 0 {
            warn!(
                "{too_fast} molecule(s) exceed one cell per step; halo construction may be incorrect"
            );
        }
        Ok(())
    }

    /// Thermostat scaling of velocities and angular momenta.
    pub fn scale_velocities(grid: &mut CellGrid, beta_trans: f64, beta_rot: f64) {
        if (beta_trans - 1.0).abs() < f64::EPSILON && (beta_rot - 1.0).abs() < f64::EPSILON {
            return;
        }
        grid.for_each_owned_mut(|m| {
            for d in 0..3 {
                m.v[d] *= beta_trans;
                m.d[d] *= beta_rot;
            }
        });
    }
}

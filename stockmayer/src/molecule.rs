// SPDX-License-Identifier: AGPL-3.0-only

//! Rigid multi-site molecule state.
//!
//! A molecule owns its center-of-mass state and per-step force/torque
//! accumulators. Site positions and moment orientations are derived on
//! demand from the orientation quaternion; the per-cell SoA slabs hold the
//! derived values during force calculation.

use crate::quaternion::Quat;

/// Number of f64 values in a packed molecule record:
/// id, component, r(3), v(3), q(4), D(3).
pub const MOL_RECORD_LEN: usize = 15;

/// A rigid multi-site molecule.
#[derive(Debug, Clone)]
pub struct Molecule {
    /// Run-unique identity.
    pub id: u64,
    /// Component (species) ID into the registry.
    pub component_id: u16,
    /// Center-of-mass position.
    pub r: [f64; 3],
    /// Center-of-mass velocity.
    pub v: [f64; 3],
    /// Orientation (unit quaternion, body → lab).
    pub q: Quat,
    /// Angular momentum (lab frame).
    pub d: [f64; 3],
    /// Force accumulator for the current step.
    pub f: [f64; 3],
    /// Torque accumulator for the current step.
    pub m: [f64; 3],
}

impl Molecule {
    /// New molecule at rest orientation with zeroed accumulators.
    #[must_use]
    pub fn new(id: u64, component_id: u16, r: [f64; 3], v: [f64; 3]) -> Self {
        Self {
            id,
            component_id,
            r,
            v,
            q: Quat::identity(),
            d: [0.0; 3],
            f: [0.0; 3],
            m: [0.0; 3],
        }
    }

    /// Lab-frame absolute position of a site with the given body offset.
    #[must_use]
    pub fn site_position(&self, offset: [f64; 3]) -> [f64; 3] {
        let d = self.q.rotate(offset);
        [self.r[0] + d[0], self.r[1] + d[1], self.r[2] + d[2]]
    }

    /// Lab-frame orientation of a body-frame moment axis.
    #[must_use]
    pub fn orientation_lab(&self, e_body: [f64; 3]) -> [f64; 3] {
        self.q.rotate(e_body)
    }

    /// Zero the force and torque accumulators.
    pub fn clear_accumulators(&mut self) {
        self.f = [0.0; 3];
        self.m = [0.0; 3];
    }

    /// Add a force contribution.
    pub fn add_force(&mut self, f: [f64; 3]) {
        self.f[0] += f[0];
        self.f[1] += f[1];
        self.f[2] += f[2];
    }

    /// Add a torque contribution.
    pub fn add_torque(&mut self, m: [f64; 3]) {
        self.m[0] += m[0];
        self.m[1] += m[1];
        self.m[2] += m[2];
    }

    /// Squared speed of the center of mass.
    #[must_use]
    pub fn v2(&self) -> f64 {
        self.v[0] * self.v[0] + self.v[1] * self.v[1] + self.v[2] * self.v[2]
    }

    /// Rotational kinetic sum I·ω² = Σ D_body,k² / I_k over the axes with
    /// nonzero inertia (zero-inertia axes carry no angular momentum).
    #[must_use]
    pub fn iw2(&self, inertia: [f64; 3]) -> f64 {
        let d_body = self.q.rotate_inv(self.d);
        let mut sum = 0.0;
        for k in 0..3 {
            if inertia[k] > 0.0 {
                sum += d_body[k] * d_body[k] / inertia[k];
            }
        }
        sum
    }

    /// Body-frame angular velocity ω = I⁻¹ D_body (zero on pinned axes).
    #[must_use]
    pub fn angular_velocity_body(&self, inertia: [f64; 3]) -> [f64; 3] {
        let d_body = self.q.rotate_inv(self.d);
        let mut w = [0.0; 3];
        for k in 0..3 {
            if inertia[k] > 0.0 {
                w[k] = d_body[k] / inertia[k];
            }
        }
        w
    }

    /// Append the wire record (see [`MOL_RECORD_LEN`]) to a buffer.
    pub fn pack_into(&self, buf: &mut Vec<f64>) {
        buf.push(self.id as f64);
        buf.push(f64::from(self.component_id));
        buf.extend_from_slice(&self.r);
        buf.extend_from_slice(&self.v);
        buf.extend_from_slice(&[self.q.w, self.q.x, self.q.y, self.q.z]);
        buf.extend_from_slice(&self.d);
    }

    /// Decode one wire record. The caller guarantees
    /// `rec.len() == MOL_RECORD_LEN`.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)] // ids fit f64's 53-bit mantissa
    pub fn unpack_from(rec: &[f64]) -> Self {
        Self {
            id: rec[0] as u64,
            component_id: rec[1] as u16,
            r: [rec[2], rec[3], rec[4]],
            v: [rec[5], rec[6], rec[7]],
            q: Quat::new(rec[8], rec[9], rec[10], rec[11]),
            d: [rec[12], rec[13], rec[14]],
            f: [0.0; 3],
            m: [0.0; 3],
        }
    }
}

// SPDX-License-Identifier: AGPL-3.0-only

//! Unit quaternions for rigid-body orientation.
//!
//! Convention: q = (w, x, y, z) with scalar part w. Body-frame site offsets
//! and multipole orientations are rotated to the lab frame per molecule;
//! the integrator advances orientations with the exponential map (Rodrigues
//! rotation) of the angular velocity.

/// A unit quaternion representing a 3D rotation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quat {
    /// Scalar part.
    pub w: f64,
    /// Vector part x.
    pub x: f64,
    /// Vector part y.
    pub y: f64,
    /// Vector part z.
    pub z: f64,
}

impl Quat {
    /// Construct from components (not normalized).
    #[must_use]
    pub const fn new(w: f64, x: f64, y: f64, z: f64) -> Self {
        Self { w, x, y, z }
    }

    /// Identity rotation.
    #[must_use]
    pub const fn identity() -> Self {
        Self::new(1.0, 0.0, 0.0, 0.0)
    }

    /// Squared norm.
    #[must_use]
    pub fn norm_sq(&self) -> f64 {
        self.w * self.w + self.x * self.x + self.y * self.y + self.z * self.z
    }

    /// Normalize to unit length; degenerate inputs collapse to identity.
    #[must_use]
    pub fn normalized(&self) -> Self {
        let n = self.norm_sq().sqrt();
        if n < 1e-12 {
            return Self::identity();
        }
        Self::new(self.w / n, self.x / n, self.y / n, self.z / n)
    }

    /// Hamilton product `self * other`.
    #[must_use]
    pub fn mul(&self, o: &Self) -> Self {
        Self::new(
            self.w * o.w - self.x * o.x - self.y * o.y - self.z * o.z,
            self.w * o.x + self.x * o.w + self.y * o.z - self.z * o.y,
            self.w * o.y - self.x * o.z + self.y * o.w + self.z * o.x,
            self.w * o.z + self.x * o.y - self.y * o.x + self.z * o.w,
        )
    }

    /// Rotation of a body-frame vector into the lab frame.
    #[must_use]
    pub fn rotate(&self, v: [f64; 3]) -> [f64; 3] {
        // R(q)·v expanded from the rotation matrix of a unit quaternion.
        let (w, x, y, z) = (self.w, self.x, self.y, self.z);
        let (x2, y2, z2) = (x * x, y * y, z * z);
        let (xy, xz, yz) = (x * y, x * z, y * z);
        let (wx, wy, wz) = (w * x, w * y, w * z);
        [
            (1.0 - 2.0 * (y2 + z2)) * v[0] + 2.0 * (xy - wz) * v[1] + 2.0 * (xz + wy) * v[2],
            2.0 * (xy + wz) * v[0] + (1.0 - 2.0 * (x2 + z2)) * v[1] + 2.0 * (yz - wx) * v[2],
            2.0 * (xz - wy) * v[0] + 2.0 * (yz + wx) * v[1] + (1.0 - 2.0 * (x2 + y2)) * v[2],
        ]
    }

    /// Inverse rotation (lab frame into body frame) for a unit quaternion.
    #[must_use]
    pub fn rotate_inv(&self, v: [f64; 3]) -> [f64; 3] {
        Self::new(self.w, -self.x, -self.y, -self.z).rotate(v)
    }

    /// Exponential map: the rotation by angle |w| about axis w/|w|
    /// (Rodrigues formula in quaternion form). Small angles use the
    /// first-order expansion to avoid 0/0.
    #[must_use]
    pub fn exp(w: [f64; 3]) -> Self {
        let theta = (w[0] * w[0] + w[1] * w[1] + w[2] * w[2]).sqrt();
        if theta < 1e-10 {
            return Self::new(1.0, 0.5 * w[0], 0.5 * w[1], 0.5 * w[2]).normalized();
        }
        let half = 0.5 * theta;
        let s = half.sin() / theta;
        Self::new(half.cos(), w[0] * s, w[1] * s, w[2] * s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-12;

    #[test]
    fn identity_leaves_vectors() {
        let v = Quat::identity().rotate([1.0, 2.0, 3.0]);
        assert!((v[0] - 1.0).abs() < EPS);
        assert!((v[1] - 2.0).abs() < EPS);
        assert!((v[2] - 3.0).abs() < EPS);
    }

    #[test]
    fn quarter_turn_about_z_maps_x_to_y() {
        let half = std::f64::consts::FRAC_PI_4;
        let q = Quat::new(half.cos(), 0.0, 0.0, half.sin());
        let v = q.rotate([1.0, 0.0, 0.0]);
        assert!(v[0].abs() < EPS);
        assert!((v[1] - 1.0).abs() < EPS);
        assert!(v[2].abs() < EPS);
    }

    #[test]
    fn rotate_then_inverse_round_trips() {
        let q = Quat::new(0.9, 0.1, -0.2, 0.3).normalized();
        let v = [0.5, -1.5, 2.0];
        let back = q.rotate_inv(q.rotate(v));
        for d in 0..3 {
            assert!((back[d] - v[d]).abs() < EPS, "component {d}");
        }
    }

    #[test]
    fn exp_of_zero_is_identity() {
        let q = Quat::exp([0.0, 0.0, 0.0]);
        assert!((q.w - 1.0).abs() < EPS);
        assert!(q.x.abs() < EPS && q.y.abs() < EPS && q.z.abs() < EPS);
    }

    #[test]
    fn exp_rotates_by_angle() {
        // exp of θ·ẑ rotates by θ about z.
        let theta = 0.7;
        let q = Quat::exp([0.0, 0.0, theta]);
        let v = q.rotate([1.0, 0.0, 0.0]);
        assert!((v[0] - theta.cos()).abs() < EPS);
        assert!((v[1] - theta.sin()).abs() < EPS);
    }

    #[test]
    fn product_composes_rotations() {
        let a = Quat::exp([0.0, 0.0, 0.3]);
        let b = Quat::exp([0.0, 0.0, 0.5]);
        let both = a.mul(&b);
        let direct = Quat::exp([0.0, 0.0, 0.8]);
        let va = both.rotate([1.0, 0.0, 0.0]);
        let vb = direct.rotate([1.0, 0.0, 0.0]);
        for d in 0..3 {
            assert!((va[d] - vb[d]).abs() < EPS);
        }
    }

    #[test]
    fn normalized_has_unit_norm() {
        let q = Quat::new(1.0, 2.0, 3.0, 4.0).normalized();
        assert!((q.norm_sq() - 1.0).abs() < EPS);
    }

    #[test]
    fn degenerate_normalization_is_identity() {
        let q = Quat::new(0.0, 0.0, 0.0, 0.0).normalized();
        assert_eq!(q, Quat::identity());
    }
}

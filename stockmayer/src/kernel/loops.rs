// SPDX-License-Identifier: AGPL-3.0-only

//! The eight vectorized pair interaction bodies.
//!
//! Every body processes one SIMD batch of site pairs: broadcast source-site
//! values against `LANES` consecutive target sites, under a force mask from
//! the dist lookup. The returned force acts on the first-argument site; the
//! caller applies Newton's third law. Torques are returned per side where
//! both sides carry an orientation.
//!
//! The asymmetric bodies (charge–dipole, charge–quadrupole,
//! dipole–quadrupole) are reused with source and target roles exchanged by
//! swapping the argument blocks at the call site; the `switched` flag
//! records the exchange for callers that cannot swap, but with fully
//! swapped arguments every sign is already absorbed by the distance vector,
//! so the bodies do not branch on it.
//!
//! `1/r²` is computed unmasked and the mask applied before any further use:
//! padded lanes hold zero coordinates, their Inf/NaN results are discarded
//! bit-exactly by the mask.

use crate::simd::{apply_mask, DVec};

/// Per-batch macroscopic accumulators (vector lanes, horizontally summed
/// once per cell pair).
#[derive(Debug)]
pub struct VecAccum {
    /// Running 6·U_LJ sum.
    pub upot6_lj: DVec,
    /// Running multipole potential sum.
    pub upot_xpoles: DVec,
    /// Running virial sum (COM separation · force).
    pub virial: DVec,
    /// Running reaction-field sum Σ f_RF·μ₁μ₂·(e₁·e₂).
    pub my_rf: DVec,
}

impl VecAccum {
    /// Fresh zeroed accumulator.
    #[must_use]
    pub fn new() -> Self {
        Self {
            upot6_lj: DVec::splat(0.0),
            upot_xpoles: DVec::splat(0.0),
            virial: DVec::splat(0.0),
            my_rf: DVec::splat(0.0),
        }
    }
}

impl Default for VecAccum {
    fn default() -> Self {
        Self::new()
    }
}

#[inline]
fn dot3(ax: DVec, ay: DVec, az: DVec, bx: DVec, by: DVec, bz: DVec) -> DVec {
    ax * bx + ay * by + az * bz
}

/// Lennard-Jones 6-12 under a mask.
///
/// Returns the force on the first site; accumulates the shifted 6·U and the
/// virial when `MACRO`.
#[inline]
#[allow(clippy::too_many_arguments)]
pub fn lj<const MACRO: bool>(
    m1_r: [DVec; 3],
    r1: [DVec; 3],
    m2_r: [DVec; 3],
    r2: [DVec; 3],
    mask: DVec,
    eps24: DVec,
    sig2: DVec,
    shift6: DVec,
    acc: &mut VecAccum,
) -> [DVec; 3] {
    let dx = r1[0] - r2[0];
    let dy = r1[1] - r2[1];
    let dz = r1[2] - r2[2];
    let r2_ = dot3(dx, dy, dz, dx, dy, dz);
    let r2_inv = apply_mask(DVec::splat(1.0) / r2_, mask);

    let lj2 = sig2 * r2_inv;
    let lj4 = lj2 * lj2;
    let lj6 = lj4 * lj2;
    let lj12 = lj6 * lj6;
    let lj12m6 = lj12 - lj6;

    let scale = eps24 * r2_inv * (lj12 + lj12m6);
    let f = [dx * scale, dy * scale, dz * scale];

    if MACRO {
        // shift6 is not masked, so mask the shifted potential as a whole.
        let upot = apply_mask(eps24 * lj12m6 + shift6, mask);
        acc.upot6_lj += upot;
        let m_dx = m1_r[0] - m2_r[0];
        let m_dy = m1_r[1] - m2_r[1];
        let m_dz = m1_r[2] - m2_r[2];
        acc.virial += dot3(m_dx, m_dy, m_dz, f[0], f[1], f[2]);
    }
    f
}

/// Coulomb charge–charge under a mask.
#[inline]
#[allow(clippy::too_many_arguments)]
pub fn charge_charge<const MACRO: bool>(
    m1_r: [DVec; 3],
    r1: [DVec; 3],
    q1: DVec,
    m2_r: [DVec; 3],
    r2: [DVec; 3],
    q2: DVec,
    mask: DVec,
    acc: &mut VecAccum,
) -> [DVec; 3] {
    let dx = r1[0] - r2[0];
    let dy = r1[1] - r2[1];
    let dz = r1[2] - r2[2];
    let dr2 = dot3(dx, dy, dz, dx, dy, dz);
    let dr2_inv = apply_mask(DVec::splat(1.0) / dr2, mask);
    let dr_inv = dr2_inv.sqrt();

    let upot = q1 * q2 * dr_inv;
    let fac = upot * dr2_inv;
    let f = [dx * fac, dy * fac, dz * fac];

    if MACRO {
        acc.upot_xpoles += upot;
        let m_dx = m1_r[0] - m2_r[0];
        let m_dy = m1_r[1] - m2_r[1];
        let m_dz = m1_r[2] - m2_r[2];
        acc.virial += dot3(m_dx, m_dy, m_dz, f[0], f[1], f[2]);
    }
    f
}

/// Charge–dipole under a mask. The first block is the charge side, the
/// second the dipole side; returns (force on the charge, torque on the
/// dipole).
#[inline]
#[allow(clippy::too_many_arguments)]
pub fn charge_dipole<const MACRO: bool>(
    m1_r: [DVec; 3],
    r1: [DVec; 3],
    q: DVec,
    m2_r: [DVec; 3],
    r2: [DVec; 3],
    e: [DVec; 3],
    p: DVec,
    mask: DVec,
    _switched: bool,
    acc: &mut VecAccum,
) -> ([DVec; 3], [DVec; 3]) {
    let dx = r1[0] - r2[0];
    let dy = r1[1] - r2[1];
    let dz = r1[2] - r2[2];
    let dr2 = dot3(dx, dy, dz, dx, dy, dz);
    let dr2_inv = apply_mask(DVec::splat(1.0) / dr2, mask);
    let dr_inv = dr2_inv.sqrt();
    let dr3_inv = dr2_inv * dr_inv;

    let re = dot3(dx, dy, dz, e[0], e[1], e[2]);
    let qp_dr3 = q * p * dr3_inv;
    let fac = dr2_inv * DVec::splat(3.0) * re;

    let f = [
        qp_dr3 * (e[0] - dx * fac),
        qp_dr3 * (e[1] - dy * fac),
        qp_dr3 * (e[2] - dz * fac),
    ];

    if MACRO {
        // U = −qμ(e·r̂)/r²; already masked through dr3_inv.
        acc.upot_xpoles -= qp_dr3 * re;
        let m_dx = m1_r[0] - m2_r[0];
        let m_dy = m1_r[1] - m2_r[1];
        let m_dz = m1_r[2] - m2_r[2];
        acc.virial += dot3(m_dx, m_dy, m_dz, f[0], f[1], f[2]);
    }

    let m = [
        qp_dr3 * (e[1] * dz - e[2] * dy),
        qp_dr3 * (e[2] * dx - e[0] * dz),
        qp_dr3 * (e[0] * dy - e[1] * dx),
    ];
    (f, m)
}

/// Dipole–dipole with the reaction-field contribution.
///
/// Returns (force on the first dipole, torque on the first, torque on the
/// second). The RF prefactor enters the torques and the `my_rf` sum; the
/// pair force carries no RF term.
#[inline]
#[allow(clippy::too_many_arguments)]
pub fn dipole_dipole<const MACRO: bool>(
    m1_r: [DVec; 3],
    r1: [DVec; 3],
    e1: [DVec; 3],
    p1: DVec,
    m2_r: [DVec; 3],
    r2: [DVec; 3],
    e2: [DVec; 3],
    p2: DVec,
    mask: DVec,
    eps_rf_inv_rc3: DVec,
    acc: &mut VecAccum,
) -> ([DVec; 3], [DVec; 3], [DVec; 3]) {
    let dx = r1[0] - r2[0];
    let dy = r1[1] - r2[1];
    let dz = r1[2] - r2[2];
    let dr2 = dot3(dx, dy, dz, dx, dy, dz);
    let dr2_inv = apply_mask(DVec::splat(1.0) / dr2, mask);
    let dr_inv = dr2_inv.sqrt();
    let dr2three_inv = DVec::splat(3.0) * dr2_inv;

    let p1p2 = apply_mask(p1 * p2, mask);
    let rffac = p1p2 * eps_rf_inv_rc3;
    let p1p2_r3 = p1p2 * dr_inv * dr2_inv;
    let p1p2_3r5 = p1p2_r3 * dr2three_inv;

    let e1e2 = dot3(e1[0], e1[1], e1[2], e2[0], e2[1], e2[2]);
    let re1 = dot3(dx, dy, dz, e1[0], e1[1], e1[2]);
    let re2 = dot3(dx, dy, dz, e2[0], e2[1], e2[2]);

    let re1_3r2 = re1 * dr2three_inv;
    let re2_3r2 = re2 * dr2three_inv;
    let re1re2_r2 = dr2_inv * re1 * re2;
    let e1e2_m5 = e1e2 - DVec::splat(5.0) * re1re2_r2;

    let f = [
        p1p2_3r5 * (dx * e1e2_m5 + e1[0] * re2 + e2[0] * re1),
        p1p2_3r5 * (dy * e1e2_m5 + e1[1] * re2 + e2[1] * re1),
        p1p2_3r5 * (dz * e1e2_m5 + e1[2] * re2 + e2[2] * re1),
    ];

    if MACRO {
        let upot = p1p2_r3 * (e1e2 - DVec::splat(3.0) * re1re2_r2);
        acc.upot_xpoles += upot;
        let m_dx = m1_r[0] - m2_r[0];
        let m_dy = m1_r[1] - m2_r[1];
        let m_dz = m1_r[2] - m2_r[2];
        acc.virial += dot3(m_dx, m_dy, m_dz, f[0], f[1], f[2]);
        acc.my_rf += rffac * e1e2;
    }

    // e1 × e2 components.
    let e1xe2_x = e1[1] * e2[2] - e1[2] * e2[1];
    let e1xe2_y = e1[2] * e2[0] - e1[0] * e2[2];
    let e1xe2_z = e1[0] * e2[1] - e1[1] * e2[0];

    let m1 = [
        p1p2_r3 * (re2_3r2 * (e1[1] * dz - e1[2] * dy) - e1xe2_x) + rffac * e1xe2_x,
        p1p2_r3 * (re2_3r2 * (e1[2] * dx - e1[0] * dz) - e1xe2_y) + rffac * e1xe2_y,
        p1p2_r3 * (re2_3r2 * (e1[0] * dy - e1[1] * dx) - e1xe2_z) + rffac * e1xe2_z,
    ];
    let m2 = [
        p1p2_r3 * (re1_3r2 * (e2[1] * dz - e2[2] * dy) + e1xe2_x) - rffac * e1xe2_x,
        p1p2_r3 * (re1_3r2 * (e2[2] * dx - e2[0] * dz) + e1xe2_y) - rffac * e1xe2_y,
        p1p2_r3 * (re1_3r2 * (e2[0] * dy - e2[1] * dx) + e1xe2_z) - rffac * e1xe2_z,
    ];
    (f, m1, m2)
}

/// Charge–quadrupole under a mask. First block is the charge side; returns
/// (force on the charge, torque on the quadrupole).
#[inline]
#[allow(clippy::too_many_arguments)]
pub fn charge_quadrupole<const MACRO: bool>(
    m1_r: [DVec; 3],
    r1: [DVec; 3],
    q: DVec,
    m2_r: [DVec; 3],
    r2: [DVec; 3],
    ejj: [DVec; 3],
    mag: DVec,
    mask: DVec,
    _switched: bool,
    acc: &mut VecAccum,
) -> ([DVec; 3], [DVec; 3]) {
    let dx = r1[0] - r2[0];
    let dy = r1[1] - r2[1];
    let dz = r1[2] - r2[2];
    let dr2 = dot3(dx, dy, dz, dx, dy, dz);
    let invdr2 = apply_mask(DVec::splat(1.0) / dr2, mask);
    let invdr = invdr2.sqrt();

    let q_qtr = DVec::splat(0.5) * q * mag;
    let costj = dot3(ejj[0], ejj[1], ejj[2], dx, dy, dz) * invdr;

    let qq_dr3 = q_qtr * invdr * invdr2;
    let upot = qq_dr3 * (DVec::splat(3.0) * costj * costj - DVec::splat(1.0));

    let minus_part_rij_invdr = DVec::splat(3.0) * upot * invdr2;
    let part_tj_invdr = DVec::splat(6.0) * costj * qq_dr3 * invdr;

    let fac = costj * part_tj_invdr * invdr + minus_part_rij_invdr;
    let f = [
        fac * dx - part_tj_invdr * ejj[0],
        fac * dy - part_tj_invdr * ejj[1],
        fac * dz - part_tj_invdr * ejj[2],
    ];

    if MACRO {
        acc.upot_xpoles += upot;
        let m_dx = m1_r[0] - m2_r[0];
        let m_dy = m1_r[1] - m2_r[1];
        let m_dz = m1_r[2] - m2_r[2];
        acc.virial += dot3(m_dx, m_dy, m_dz, f[0], f[1], f[2]);
    }

    // −(e × d): torque lever of the quadrupole axis.
    let m = [
        part_tj_invdr * (ejj[2] * dy - ejj[1] * dz),
        part_tj_invdr * (ejj[0] * dz - ejj[2] * dx),
        part_tj_invdr * (ejj[1] * dx - ejj[0] * dy),
    ];
    (f, m)
}

/// Dipole–quadrupole under a mask. First block is the dipole side; returns
/// (force on the dipole, torque on the dipole, torque on the quadrupole).
#[inline]
#[allow(clippy::too_many_arguments)]
pub fn dipole_quadrupole<const MACRO: bool>(
    m1_r: [DVec; 3],
    r1: [DVec; 3],
    eii: [DVec; 3],
    p: DVec,
    m2_r: [DVec; 3],
    r2: [DVec; 3],
    ejj: [DVec; 3],
    mag: DVec,
    mask: DVec,
    _switched: bool,
    acc: &mut VecAccum,
) -> ([DVec; 3], [DVec; 3], [DVec; 3]) {
    let dx = r1[0] - r2[0];
    let dy = r1[1] - r2[1];
    let dz = r1[2] - r2[2];
    let dr2 = dot3(dx, dy, dz, dx, dy, dz);
    let invdr2 = apply_mask(DVec::splat(1.0) / dr2, mask);
    let invdr = invdr2.sqrt();

    let myqfac = DVec::splat(1.5) * p * mag * invdr2 * invdr2;

    let costi = dot3(eii[0], eii[1], eii[2], dx, dy, dz) * invdr;
    let costj = dot3(ejj[0], ejj[1], ejj[2], dx, dy, dz) * invdr;
    let cos2tj = costj * costj;
    let cosgij = dot3(eii[0], eii[1], eii[2], ejj[0], ejj[1], ejj[2]);

    let five_cos2tj_m1 = DVec::splat(5.0) * cos2tj - DVec::splat(1.0);
    let two_costj = DVec::splat(2.0) * costj;

    let upot = myqfac * (two_costj * cosgij - costi * five_cos2tj_m1);

    let myqfac_invdr = myqfac * invdr;
    let minus_part_rij_invdr = DVec::splat(4.0) * upot * invdr2;
    let minus_part_ti_invdr = myqfac_invdr * five_cos2tj_m1;
    let part1 = DVec::splat(5.0) * costi * costj - cosgij;
    let minus_part_tj_invdr = myqfac_invdr * DVec::splat(2.0) * part1;
    let partial_gij = myqfac * two_costj;

    let part3 = costi * minus_part_ti_invdr + costj * minus_part_tj_invdr;
    let fac = minus_part_rij_invdr - part3 * invdr;

    let f = [
        fac * dx + minus_part_ti_invdr * eii[0] + minus_part_tj_invdr * ejj[0],
        fac * dy + minus_part_ti_invdr * eii[1] + minus_part_tj_invdr * ejj[1],
        fac * dz + minus_part_ti_invdr * eii[2] + minus_part_tj_invdr * ejj[2],
    ];

    if MACRO {
        acc.upot_xpoles += upot;
        let m_dx = m1_r[0] - m2_r[0];
        let m_dy = m1_r[1] - m2_r[1];
        let m_dz = m1_r[2] - m2_r[2];
        acc.virial += dot3(m_dx, m_dy, m_dz, f[0], f[1], f[2]);
    }

    let eixej_x = eii[1] * ejj[2] - eii[2] * ejj[1];
    let eixej_y = eii[2] * ejj[0] - eii[0] * ejj[2];
    let eixej_z = eii[0] * ejj[1] - eii[1] * ejj[0];
    let gij_eixej = [
        partial_gij * eixej_x,
        partial_gij * eixej_y,
        partial_gij * eixej_z,
    ];

    let m1 = [
        minus_part_ti_invdr * (eii[1] * dz - eii[2] * dy) - gij_eixej[0],
        minus_part_ti_invdr * (eii[2] * dx - eii[0] * dz) - gij_eixej[1],
        minus_part_ti_invdr * (eii[0] * dy - eii[1] * dx) - gij_eixej[2],
    ];
    let m2 = [
        minus_part_tj_invdr * (ejj[1] * dz - ejj[2] * dy) + gij_eixej[0],
        minus_part_tj_invdr * (ejj[2] * dx - ejj[0] * dz) + gij_eixej[1],
        minus_part_tj_invdr * (ejj[0] * dy - ejj[1] * dx) + gij_eixej[2],
    ];
    (f, m1, m2)
}

/// Quadrupole–quadrupole under a mask. Returns (force on the first, torque
/// on the first, torque on the second).
#[inline]
#[allow(clippy::too_many_arguments)]
pub fn quadrupole_quadrupole<const MACRO: bool>(
    m1_r: [DVec; 3],
    r1: [DVec; 3],
    eii: [DVec; 3],
    mii: DVec,
    m2_r: [DVec; 3],
    r2: [DVec; 3],
    ejj: [DVec; 3],
    mjj: DVec,
    mask: DVec,
    acc: &mut VecAccum,
) -> ([DVec; 3], [DVec; 3], [DVec; 3]) {
    let dx = r1[0] - r2[0];
    let dy = r1[1] - r2[1];
    let dz = r1[2] - r2[2];
    let dr2 = dot3(dx, dy, dz, dx, dy, dz);
    let invdr2 = apply_mask(DVec::splat(1.0) / dr2, mask);
    let invdr = invdr2.sqrt();

    let qfac = DVec::splat(0.75) * invdr * (mii * mjj) * (invdr2 * invdr2);

    let costi = dot3(eii[0], eii[1], eii[2], dx, dy, dz) * invdr;
    let costj = dot3(ejj[0], ejj[1], ejj[2], dx, dy, dz) * invdr;
    let cos2ti = costi * costi;
    let cos2tj = costj * costj;
    let cosgij = dot3(eii[0], eii[1], eii[2], ejj[0], ejj[1], ejj[2]);
    let term = cosgij - DVec::splat(5.0) * (costi * costj);

    let upot_inner = (DVec::splat(1.0) + DVec::splat(2.0) * term * term)
        - (DVec::splat(5.0) * (cos2ti + cos2tj) + DVec::splat(15.0) * cos2ti * cos2tj);
    let upot = qfac * upot_inner;

    let minus_part_rij_invdr = DVec::splat(5.0) * upot * invdr2;
    let part1 = qfac * DVec::splat(10.0) * invdr;
    let part2 = DVec::splat(2.0) * term;

    let minus_part_ti_invdr =
        part1 * (costi + part2 * costj + DVec::splat(3.0) * costi * cos2tj);
    let minus_part_tj_invdr =
        part1 * (costj + part2 * costi + DVec::splat(3.0) * costj * cos2ti);

    let partial_gij = qfac * DVec::splat(4.0) * term;

    let fac = minus_part_rij_invdr
        - (minus_part_ti_invdr * costi + minus_part_tj_invdr * costj) * invdr;

    let f = [
        fac * dx + minus_part_ti_invdr * eii[0] + minus_part_tj_invdr * ejj[0],
        fac * dy + minus_part_ti_invdr * eii[1] + minus_part_tj_invdr * ejj[1],
        fac * dz + minus_part_ti_invdr * eii[2] + minus_part_tj_invdr * ejj[2],
    ];

    if MACRO {
        acc.upot_xpoles += upot;
        let m_dx = m1_r[0] - m2_r[0];
        let m_dy = m1_r[1] - m2_r[1];
        let m_dz = m1_r[2] - m2_r[2];
        acc.virial += dot3(m_dx, m_dy, m_dz, f[0], f[1], f[2]);
    }

    let eixej_x = eii[1] * ejj[2] - eii[2] * ejj[1];
    let eixej_y = eii[2] * ejj[0] - eii[0] * ejj[2];
    let eixej_z = eii[0] * ejj[1] - eii[1] * ejj[0];
    let gij_eixej = [
        partial_gij * eixej_x,
        partial_gij * eixej_y,
        partial_gij * eixej_z,
    ];

    let m1 = [
        minus_part_ti_invdr * (eii[1] * dz - eii[2] * dy) - gij_eixej[0],
        minus_part_ti_invdr * (eii[2] * dx - eii[0] * dz) - gij_eixej[1],
        minus_part_ti_invdr * (eii[0] * dy - eii[1] * dx) - gij_eixej[2],
    ];
    let m2 = [
        minus_part_tj_invdr * (ejj[1] * dz - ejj[2] * dy) + gij_eixej[0],
        minus_part_tj_invdr * (ejj[2] * dx - ejj[0] * dz) + gij_eixej[1],
        minus_part_tj_invdr * (ejj[0] * dy - ejj[1] * dx) + gij_eixej[2],
    ];
    (f, m1, m2)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simd::{broadcast, hsum, mask_on, zero, DVec};

    fn full_mask() -> DVec {
        DVec::splat(mask_on())
    }

    fn bc3(v: [f64; 3]) -> [DVec; 3] {
        [broadcast(v[0]), broadcast(v[1]), broadcast(v[2])]
    }

    #[test]
    fn lj_force_vanishes_at_minimum() {
        // r = 2^(1/6) σ is the LJ minimum.
        let r_min = 2.0f64.powf(1.0 / 6.0);
        let mut acc = VecAccum::new();
        let f = lj::<true>(
            bc3([0.0; 3]),
            bc3([0.0; 3]),
            bc3([r_min, 0.0, 0.0]),
            bc3([r_min, 0.0, 0.0]),
            full_mask(),
            broadcast(24.0),
            broadcast(1.0),
            broadcast(0.0),
            &mut acc,
        );
        assert!(f[0].to_array()[0].abs() < 1e-12);
        // 6·U at the minimum is −6ε = −6 (unshifted).
        assert!((hsum(acc.upot6_lj) / 4.0 - (-6.0)).abs() < 1e-10);
    }

    #[test]
    fn lj_masked_lane_contributes_nothing() {
        let mut acc = VecAccum::new();
        let f = lj::<true>(
            bc3([0.0; 3]),
            bc3([0.0; 3]),
            bc3([0.0; 3]), // zero coordinates: the padded-sentinel case
            bc3([0.0; 3]),
            zero(),
            broadcast(24.0),
            broadcast(1.0),
            broadcast(0.1),
            &mut acc,
        );
        assert_eq!(f[0].to_array()[0], 0.0);
        assert_eq!(hsum(acc.upot6_lj), 0.0);
        assert_eq!(hsum(acc.virial), 0.0);
    }

    #[test]
    fn coulomb_repulsion_direction_and_magnitude() {
        let mut acc = VecAccum::new();
        let f = charge_charge::<true>(
            bc3([0.0; 3]),
            bc3([0.0; 3]),
            broadcast(1.0),
            bc3([2.0, 0.0, 0.0]),
            bc3([2.0, 0.0, 0.0]),
            broadcast(1.0),
            full_mask(),
            &mut acc,
        );
        // F on arg1 = q1 q2 (r1−r2)/|r|³ = (−2)/8 = −0.25 along x.
        assert!((f[0].to_array()[0] - (-0.25)).abs() < 1e-14);
        assert!((hsum(acc.upot_xpoles) / 4.0 - 0.5).abs() < 1e-14);
    }

    #[test]
    fn dipole_pair_head_to_tail_potential() {
        // Head-to-tail along z at separation r: U = −2μ²/r³.
        let r = 1.5;
        let mut acc = VecAccum::new();
        let (_f, _m1, _m2) = dipole_dipole::<true>(
            bc3([0.0, 0.0, r]),
            bc3([0.0, 0.0, r]),
            bc3([0.0, 0.0, 1.0]),
            broadcast(1.0),
            bc3([0.0; 3]),
            bc3([0.0; 3]),
            bc3([0.0, 0.0, 1.0]),
            broadcast(1.0),
            full_mask(),
            zero(),
            &mut acc,
        );
        let u = hsum(acc.upot_xpoles) / 4.0;
        let expected = -2.0 / (r * r * r);
        assert!(
            (u - expected).abs() < 1e-12,
            "U = {u}, expected {expected}"
        );
    }

    #[test]
    fn dipole_torque_vanishes_for_aligned_pair() {
        // Head-to-tail dipoles are a torque-free configuration.
        let (_f, m1, m2) = dipole_dipole::<false>(
            bc3([0.0, 0.0, 1.5]),
            bc3([0.0, 0.0, 1.5]),
            bc3([0.0, 0.0, 1.0]),
            broadcast(1.0),
            bc3([0.0; 3]),
            bc3([0.0; 3]),
            bc3([0.0, 0.0, 1.0]),
            broadcast(1.0),
            full_mask(),
            zero(),
            &mut VecAccum::new(),
        );
        for d in 0..3 {
            assert!(m1[d].to_array()[0].abs() < 1e-14);
            assert!(m2[d].to_array()[0].abs() < 1e-14);
        }
    }

    #[test]
    fn charge_dipole_force_is_radial_for_axial_dipole() {
        // Dipole along z at origin, charge on the z axis: force is axial.
        let (f, m) = charge_dipole::<false>(
            bc3([0.0, 0.0, 2.0]),
            bc3([0.0, 0.0, 2.0]),
            broadcast(1.0),
            bc3([0.0; 3]),
            bc3([0.0; 3]),
            bc3([0.0, 0.0, 1.0]),
            broadcast(1.0),
            full_mask(),
            false,
            &mut VecAccum::new(),
        );
        assert!(f[0].to_array()[0].abs() < 1e-14);
        assert!(f[1].to_array()[0].abs() < 1e-14);
        // F_z = qμ/r³ (1 − 3) = −2/8·... : qp/r³ (e_z − dz·3 re/r²)
        // re = 2, fac = 3·2/4 = 1.5, f_z = (1/8)(1 − 2·1.5) = −0.25
        assert!((f[2].to_array()[0] - (-0.25)).abs() < 1e-14);
        // Axial geometry exerts no torque on the dipole.
        for d in 0..3 {
            assert!(m[d].to_array()[0].abs() < 1e-14);
        }
    }

    #[test]
    fn quadrupole_pair_potential_symmetric_swap() {
        // U must be invariant under exchanging the two quadrupoles.
        let args1 = (
            bc3([0.0; 3]),
            bc3([0.0; 3]),
            bc3([0.0, 0.0, 1.0]),
            broadcast(1.0),
        );
        let args2 = (
            bc3([1.3, 0.4, 0.2]),
            bc3([1.3, 0.4, 0.2]),
            bc3([0.6, 0.8, 0.0]),
            broadcast(0.7),
        );
        let mut acc_a = VecAccum::new();
        let _ = quadrupole_quadrupole::<true>(
            args1.0, args1.1, args1.2, args1.3, args2.0, args2.1, args2.2, args2.3,
            full_mask(),
            &mut acc_a,
        );
        let mut acc_b = VecAccum::new();
        let _ = quadrupole_quadrupole::<true>(
            args2.0, args2.1, args2.2, args2.3, args1.0, args1.1, args1.2, args1.3,
            full_mask(),
            &mut acc_b,
        );
        let ua = hsum(acc_a.upot_xpoles);
        let ub = hsum(acc_b.upot_xpoles);
        assert!((ua - ub).abs() < 1e-12 * ua.abs().max(1.0));
    }

    #[test]
    fn dipole_quadrupole_newton_virial_consistency() {
        // Virial = m_d · F must match a direct recomputation.
        let mut acc = VecAccum::new();
        let (f, _m1, _m2) = dipole_quadrupole::<true>(
            bc3([0.0; 3]),
            bc3([0.0; 3]),
            bc3([1.0, 0.0, 0.0]),
            broadcast(0.5),
            bc3([0.0, 1.2, 0.9]),
            bc3([0.0, 1.2, 0.9]),
            bc3([0.0, 0.0, 1.0]),
            broadcast(0.8),
            full_mask(),
            false,
            &mut acc,
        );
        let md = [0.0 - 0.0, 0.0 - 1.2, 0.0 - 0.9];
        let expect = md[0] * f[0].to_array()[0] + md[1] * f[1].to_array()[0]
            + md[2] * f[2].to_array()[0];
        assert!((hsum(acc.virial) / 4.0 - expect).abs() < 1e-12 * expect.abs().max(1.0));
    }
}

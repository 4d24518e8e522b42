// SPDX-License-Identifier: AGPL-3.0-only

//! Vectorized pair interaction engine.
//!
//! For every source molecule the engine computes four cutoff mask arrays
//! (one per target site kind), early-outs when no lane survives, and drives
//! the interaction bodies over SIMD batches of target sites:
//!
//! ```text
//! source LJ        → target LJ                       (LJ 6-12)
//! source charge    → target charges/dipoles/quads    (q-q, q-μ, q-Q)
//! source dipole    → target charges/dipoles/quads    (μ-q, μ-μ+RF, μ-Q)
//! source quadrupole→ target charges/dipoles/quads    (Q-q, Q-μ, Q-Q)
//! ```
//!
//! The nine cross-kind combinations reduce to seven bodies by exchanging
//! argument roles. Forces are applied to both sides (Newton's third law);
//! macroscopic sums are accumulated only when the `MACRO` instantiation is
//! chosen by the traversal's halo rules.

pub mod dist;
pub mod loops;
pub mod scalar;

use crate::components::ComponentRegistry;
use crate::simd::{self, DVec, LANES};
use crate::soa::CellSoa;
use dist::Policy;
use loops::VecAccum;

/// Scalar macroscopic accumulators for one traversal.
#[derive(Debug, Default, Clone)]
pub struct MacroAccum {
    /// Σ 6·U_LJ (divided by six at traversal end).
    pub upot6_lj: f64,
    /// Σ multipole potential.
    pub upot_xpoles: f64,
    /// Σ virial (COM separation · pair force).
    pub virial: f64,
    /// Reaction-field sum (negative of Σ f_RF μ₁μ₂ e₁·e₂).
    pub my_rf: f64,
}

impl MacroAccum {
    /// Merge another accumulator (thread-parallel traversal).
    pub fn merge(&mut self, o: &Self) {
        self.upot6_lj += o.upot6_lj;
        self.upot_xpoles += o.upot_xpoles;
        self.virial += o.virial;
        self.my_rf += o.my_rf;
    }

    /// Total potential energy: 6·U_LJ/6 + U_multipole + RF correction.
    #[must_use]
    pub fn upot(&self) -> f64 {
        self.upot6_lj / 6.0 + self.upot_xpoles + self.my_rf
    }

    /// Virial including the reaction-field correction.
    #[must_use]
    pub fn virial_total(&self) -> f64 {
        self.virial + 3.0 * self.my_rf
    }
}

/// Broadcast one triple of coordinate arrays at a scalar index.
#[inline]
fn bc3(x: &[f64], y: &[f64], z: &[f64], i: usize) -> [DVec; 3] {
    [
        simd::broadcast(x[i]),
        simd::broadcast(y[i]),
        simd::broadcast(z[i]),
    ]
}

/// Load one triple of coordinate arrays at a vector offset.
#[inline]
fn ld3(x: &[f64], y: &[f64], z: &[f64], j: usize) -> [DVec; 3] {
    [simd::load(x, j), simd::load(y, j), simd::load(z, j)]
}

/// The interaction dispatch, expanded once for the same-cell case (both
/// operands name one slab) and once for the two-cell case. Statement-level
/// borrows keep the aliased expansion legal.
macro_rules! calculate_pairs {
    ($k:expr, $soa1:ident, $soa2:ident, $policy:expr, $mac:ident, $out:ident) => {{
        let policy = $policy;
        let mut vac = VecAccum::new();

        let mut i_lj = 0usize;
        let mut i_charge = 0usize;
        let mut i_charge_dipole = 0usize;
        let mut i_charge_quad = 0usize;
        let mut i_dipole_charge = 0usize;
        let mut i_dipole = 0usize;
        let mut i_dipole_quad = 0usize;
        let mut i_quad_charge = 0usize;
        let mut i_quad_dipole = 0usize;
        let mut i_quad = 0usize;

        for i in 0..$soa1.n_mol {
            let m1 = $soa1.mol_pos.get(i);
            let m1v = bc3(&$soa1.mol_pos.x, &$soa1.mol_pos.y, &$soa1.mol_pos.z, i);
            let n_lj_i = $soa1.mol_lj_num[i];
            let n_c_i = $soa1.mol_charge_num[i];
            let n_d_i = $soa1.mol_dipole_num[i];
            let n_q_i = $soa1.mol_quad_num[i];

            let any_lj = dist::calc_dist_lookup(
                policy,
                m1,
                i_lj,
                $soa2.lj.n,
                $k.rc2_lj,
                &$soa2.lj.m_r.x,
                &$soa2.lj.m_r.y,
                &$soa2.lj.m_r.z,
                &mut $soa2.lj.dist,
            );
            let any_charge = dist::calc_dist_lookup(
                policy,
                m1,
                i_charge,
                $soa2.charge.n,
                $k.rc2,
                &$soa2.charge.m_r.x,
                &$soa2.charge.m_r.y,
                &$soa2.charge.m_r.z,
                &mut $soa2.charge.dist,
            );
            let any_dipole = dist::calc_dist_lookup(
                policy,
                m1,
                i_dipole,
                $soa2.dipole.n,
                $k.rc2,
                &$soa2.dipole.m_r.x,
                &$soa2.dipole.m_r.y,
                &$soa2.dipole.m_r.z,
                &mut $soa2.dipole.dist,
            );
            let any_quad = dist::calc_dist_lookup(
                policy,
                m1,
                i_quad,
                $soa2.quad.n,
                $k.rc2,
                &$soa2.quad.m_r.x,
                &$soa2.quad.m_r.y,
                &$soa2.quad.m_r.z,
                &mut $soa2.quad.dist,
            );

            // ── target LJ centers ──
            if any_lj {
                for _ in 0..n_lj_i {
                    let r1 = bc3(&$soa1.lj.r.x, &$soa1.lj.r.y, &$soa1.lj.r.z, i_lj);
                    let id1 = $soa1.lj.id[i_lj];
                    let mut sum_f = [simd::zero(); 3];
                    let mut j = 0;
                    while j < $soa2.lj.n_padded {
                        let mask = simd::load(&$soa2.lj.dist, j);
                        if simd::any(mask) {
                            let r2 = ld3(&$soa2.lj.r.x, &$soa2.lj.r.y, &$soa2.lj.r.z, j);
                            let m2 = ld3(&$soa2.lj.m_r.x, &$soa2.lj.m_r.y, &$soa2.lj.m_r.z, j);
                            let mut e24 = [0.0; LANES];
                            let mut s2 = [0.0; LANES];
                            let mut sh6 = [0.0; LANES];
                            for k in 0..LANES {
                                let (a, b, c) = $k.registry.lj_params(id1, $soa2.lj.id[j + k]);
                                e24[k] = a;
                                s2[k] = b;
                                sh6[k] = c;
                            }
                            let f = loops::lj::<$mac>(
                                m1v,
                                r1,
                                m2,
                                r2,
                                mask,
                                DVec::new(e24),
                                DVec::new(s2),
                                DVec::new(sh6),
                                &mut vac,
                            );
                            sum_f[0] += f[0];
                            sum_f[1] += f[1];
                            sum_f[2] += f[2];
                            simd::load_sub_store(&mut $soa2.lj.f.x, j, f[0]);
                            simd::load_sub_store(&mut $soa2.lj.f.y, j, f[1]);
                            simd::load_sub_store(&mut $soa2.lj.f.z, j, f[2]);
                        }
                        j += LANES;
                    }
                    simd::hsum_add(&mut $soa1.lj.f.x, i_lj, sum_f[0]);
                    simd::hsum_add(&mut $soa1.lj.f.y, i_lj, sum_f[1]);
                    simd::hsum_add(&mut $soa1.lj.f.z, i_lj, sum_f[2]);
                    i_lj += 1;
                }
            } else {
                i_lj += n_lj_i;
            }

            // ── target charges ──
            if any_charge {
                // charge–charge
                for _ in 0..n_c_i {
                    let q1 = simd::broadcast($soa1.charge.q[i_charge]);
                    let r1 = bc3(&$soa1.charge.r.x, &$soa1.charge.r.y, &$soa1.charge.r.z, i_charge);
                    let mut sum_f = [simd::zero(); 3];
                    let mut j = 0;
                    while j < $soa2.charge.n_padded {
                        let mask = simd::load(&$soa2.charge.dist, j);
                        if simd::any(mask) {
                            let q2 = simd::load(&$soa2.charge.q, j);
                            let r2 = ld3(&$soa2.charge.r.x, &$soa2.charge.r.y, &$soa2.charge.r.z, j);
                            let m2 =
                                ld3(&$soa2.charge.m_r.x, &$soa2.charge.m_r.y, &$soa2.charge.m_r.z, j);
                            let f = loops::charge_charge::<$mac>(m1v, r1, q1, m2, r2, q2, mask, &mut vac);
                            sum_f[0] += f[0];
                            sum_f[1] += f[1];
                            sum_f[2] += f[2];
                            simd::load_sub_store(&mut $soa2.charge.f.x, j, f[0]);
                            simd::load_sub_store(&mut $soa2.charge.f.y, j, f[1]);
                            simd::load_sub_store(&mut $soa2.charge.f.z, j, f[2]);
                        }
                        j += LANES;
                    }
                    simd::hsum_add(&mut $soa1.charge.f.x, i_charge, sum_f[0]);
                    simd::hsum_add(&mut $soa1.charge.f.y, i_charge, sum_f[1]);
                    simd::hsum_add(&mut $soa1.charge.f.z, i_charge, sum_f[2]);
                    i_charge += 1;
                }
                // dipole–charge (roles exchanged: charge block is the target's)
                for _ in 0..n_d_i {
                    let p = simd::broadcast($soa1.dipole.p[i_dipole_charge]);
                    let e1 = bc3(
                        &$soa1.dipole.e.x,
                        &$soa1.dipole.e.y,
                        &$soa1.dipole.e.z,
                        i_dipole_charge,
                    );
                    let r1 = bc3(
                        &$soa1.dipole.r.x,
                        &$soa1.dipole.r.y,
                        &$soa1.dipole.r.z,
                        i_dipole_charge,
                    );
                    let mut sum_f = [simd::zero(); 3];
                    let mut sum_m = [simd::zero(); 3];
                    let mut j = 0;
                    while j < $soa2.charge.n_padded {
                        let mask = simd::load(&$soa2.charge.dist, j);
                        if simd::any(mask) {
                            let q = simd::load(&$soa2.charge.q, j);
                            let r2 = ld3(&$soa2.charge.r.x, &$soa2.charge.r.y, &$soa2.charge.r.z, j);
                            let m2 =
                                ld3(&$soa2.charge.m_r.x, &$soa2.charge.m_r.y, &$soa2.charge.m_r.z, j);
                            let (f, m) = loops::charge_dipole::<$mac>(
                                m2, r2, q, m1v, r1, e1, p, mask, true, &mut vac,
                            );
                            sum_f[0] -= f[0];
                            sum_f[1] -= f[1];
                            sum_f[2] -= f[2];
                            simd::load_add_store(&mut $soa2.charge.f.x, j, f[0]);
                            simd::load_add_store(&mut $soa2.charge.f.y, j, f[1]);
                            simd::load_add_store(&mut $soa2.charge.f.z, j, f[2]);
                            sum_m[0] += m[0];
                            sum_m[1] += m[1];
                            sum_m[2] += m[2];
                        }
                        j += LANES;
                    }
                    simd::hsum_add(&mut $soa1.dipole.f.x, i_dipole_charge, sum_f[0]);
                    simd::hsum_add(&mut $soa1.dipole.f.y, i_dipole_charge, sum_f[1]);
                    simd::hsum_add(&mut $soa1.dipole.f.z, i_dipole_charge, sum_f[2]);
                    simd::hsum_add(&mut $soa1.dipole.m.x, i_dipole_charge, sum_m[0]);
                    simd::hsum_add(&mut $soa1.dipole.m.y, i_dipole_charge, sum_m[1]);
                    simd::hsum_add(&mut $soa1.dipole.m.z, i_dipole_charge, sum_m[2]);
                    i_dipole_charge += 1;
                }
                // quadrupole–charge (roles exchanged)
                for _ in 0..n_q_i {
                    let mag = simd::broadcast($soa1.quad.mag[i_quad_charge]);
                    let e1 = bc3(
                        &$soa1.quad.e.x,
                        &$soa1.quad.e.y,
                        &$soa1.quad.e.z,
                        i_quad_charge,
                    );
                    let r1 = bc3(
                        &$soa1.quad.r.x,
                        &$soa1.quad.r.y,
                        &$soa1.quad.r.z,
                        i_quad_charge,
                    );
                    let mut sum_f = [simd::zero(); 3];
                    let mut sum_m = [simd::zero(); 3];
                    let mut j = 0;
                    while j < $soa2.charge.n_padded {
                        let mask = simd::load(&$soa2.charge.dist, j);
                        if simd::any(mask) {
                            let q = simd::load(&$soa2.charge.q, j);
                            let r2 = ld3(&$soa2.charge.r.x, &$soa2.charge.r.y, &$soa2.charge.r.z, j);
                            let m2 =
                                ld3(&$soa2.charge.m_r.x, &$soa2.charge.m_r.y, &$soa2.charge.m_r.z, j);
                            let (f, m) = loops::charge_quadrupole::<$mac>(
                                m2, r2, q, m1v, r1, e1, mag, mask, true, &mut vac,
                            );
                            sum_f[0] -= f[0];
                            sum_f[1] -= f[1];
                            sum_f[2] -= f[2];
                            simd::load_add_store(&mut $soa2.charge.f.x, j, f[0]);
                            simd::load_add_store(&mut $soa2.charge.f.y, j, f[1]);
                            simd::load_add_store(&mut $soa2.charge.f.z, j, f[2]);
                            sum_m[0] += m[0];
                            sum_m[1] += m[1];
                            sum_m[2] += m[2];
                        }
                        j += LANES;
                    }
                    simd::hsum_add(&mut $soa1.quad.f.x, i_quad_charge, sum_f[0]);
                    simd::hsum_add(&mut $soa1.quad.f.y, i_quad_charge, sum_f[1]);
                    simd::hsum_add(&mut $soa1.quad.f.z, i_quad_charge, sum_f[2]);
                    simd::hsum_add(&mut $soa1.quad.m.x, i_quad_charge, sum_m[0]);
                    simd::hsum_add(&mut $soa1.quad.m.y, i_quad_charge, sum_m[1]);
                    simd::hsum_add(&mut $soa1.quad.m.z, i_quad_charge, sum_m[2]);
                    i_quad_charge += 1;
                }
            } else {
                i_charge += n_c_i;
                i_dipole_charge += n_d_i;
                i_quad_charge += n_q_i;
            }

            // ── target dipoles ──
            if any_dipole {
                // dipole–dipole (with reaction field)
                for _ in 0..n_d_i {
                    let p1 = simd::broadcast($soa1.dipole.p[i_dipole]);
                    let e1 = bc3(&$soa1.dipole.e.x, &$soa1.dipole.e.y, &$soa1.dipole.e.z, i_dipole);
                    let r1 = bc3(&$soa1.dipole.r.x, &$soa1.dipole.r.y, &$soa1.dipole.r.z, i_dipole);
                    let mut sum_f = [simd::zero(); 3];
                    let mut sum_m = [simd::zero(); 3];
                    let mut j = 0;
                    while j < $soa2.dipole.n_padded {
                        let mask = simd::load(&$soa2.dipole.dist, j);
                        if simd::any(mask) {
                            let p2 = simd::load(&$soa2.dipole.p, j);
                            let e2 = ld3(&$soa2.dipole.e.x, &$soa2.dipole.e.y, &$soa2.dipole.e.z, j);
                            let r2 = ld3(&$soa2.dipole.r.x, &$soa2.dipole.r.y, &$soa2.dipole.r.z, j);
                            let m2 =
                                ld3(&$soa2.dipole.m_r.x, &$soa2.dipole.m_r.y, &$soa2.dipole.m_r.z, j);
                            let (f, t1, t2) = loops::dipole_dipole::<$mac>(
                                m1v,
                                r1,
                                e1,
                                p1,
                                m2,
                                r2,
                                e2,
                                p2,
                                mask,
                                simd::broadcast($k.eps_rf_inv_rc3),
                                &mut vac,
                            );
                            sum_f[0] += f[0];
                            sum_f[1] += f[1];
                            sum_f[2] += f[2];
                            simd::load_sub_store(&mut $soa2.dipole.f.x, j, f[0]);
                            simd::load_sub_store(&mut $soa2.dipole.f.y, j, f[1]);
                            simd::load_sub_store(&mut $soa2.dipole.f.z, j, f[2]);
                            sum_m[0] += t1[0];
                            sum_m[1] += t1[1];
                            sum_m[2] += t1[2];
                            simd::load_add_store(&mut $soa2.dipole.m.x, j, t2[0]);
                            simd::load_add_store(&mut $soa2.dipole.m.y, j, t2[1]);
                            simd::load_add_store(&mut $soa2.dipole.m.z, j, t2[2]);
                        }
                        j += LANES;
                    }
                    simd::hsum_add(&mut $soa1.dipole.f.x, i_dipole, sum_f[0]);
                    simd::hsum_add(&mut $soa1.dipole.f.y, i_dipole, sum_f[1]);
                    simd::hsum_add(&mut $soa1.dipole.f.z, i_dipole, sum_f[2]);
                    simd::hsum_add(&mut $soa1.dipole.m.x, i_dipole, sum_m[0]);
                    simd::hsum_add(&mut $soa1.dipole.m.y, i_dipole, sum_m[1]);
                    simd::hsum_add(&mut $soa1.dipole.m.z, i_dipole, sum_m[2]);
                    i_dipole += 1;
                }
                // charge–dipole
                for _ in 0..n_c_i {
                    let q = simd::broadcast($soa1.charge.q[i_charge_dipole]);
                    let r1 = bc3(
                        &$soa1.charge.r.x,
                        &$soa1.charge.r.y,
                        &$soa1.charge.r.z,
                        i_charge_dipole,
                    );
                    let mut sum_f = [simd::zero(); 3];
                    let mut j = 0;
                    while j < $soa2.dipole.n_padded {
                        let mask = simd::load(&$soa2.dipole.dist, j);
                        if simd::any(mask) {
                            let p = simd::load(&$soa2.dipole.p, j);
                            let e = ld3(&$soa2.dipole.e.x, &$soa2.dipole.e.y, &$soa2.dipole.e.z, j);
                            let r2 = ld3(&$soa2.dipole.r.x, &$soa2.dipole.r.y, &$soa2.dipole.r.z, j);
                            let m2 =
                                ld3(&$soa2.dipole.m_r.x, &$soa2.dipole.m_r.y, &$soa2.dipole.m_r.z, j);
                            let (f, m) = loops::charge_dipole::<$mac>(
                                m1v, r1, q, m2, r2, e, p, mask, false, &mut vac,
                            );
                            sum_f[0] += f[0];
                            sum_f[1] += f[1];
                            sum_f[2] += f[2];
                            simd::load_sub_store(&mut $soa2.dipole.f.x, j, f[0]);
                            simd::load_sub_store(&mut $soa2.dipole.f.y, j, f[1]);
                            simd::load_sub_store(&mut $soa2.dipole.f.z, j, f[2]);
                            simd::load_add_store(&mut $soa2.dipole.m.x, j, m[0]);
                            simd::load_add_store(&mut $soa2.dipole.m.y, j, m[1]);
                            simd::load_add_store(&mut $soa2.dipole.m.z, j, m[2]);
                        }
                        j += LANES;
                    }
                    simd::hsum_add(&mut $soa1.charge.f.x, i_charge_dipole, sum_f[0]);
                    simd::hsum_add(&mut $soa1.charge.f.y, i_charge_dipole, sum_f[1]);
                    simd::hsum_add(&mut $soa1.charge.f.z, i_charge_dipole, sum_f[2]);
                    i_charge_dipole += 1;
                }
                // quadrupole–dipole (roles exchanged: dipole block is the target's)
                for _ in 0..n_q_i {
                    let mag = simd::broadcast($soa1.quad.mag[i_quad_dipole]);
                    let eq = bc3(
                        &$soa1.quad.e.x,
                        &$soa1.quad.e.y,
                        &$soa1.quad.e.z,
                        i_quad_dipole,
                    );
                    let rq = bc3(
                        &$soa1.quad.r.x,
                        &$soa1.quad.r.y,
                        &$soa1.quad.r.z,
                        i_quad_dipole,
                    );
                    let mut sum_f = [simd::zero(); 3];
                    let mut sum_m = [simd::zero(); 3];
                    let mut j = 0;
                    while j < $soa2.dipole.n_padded {
                        let mask = simd::load(&$soa2.dipole.dist, j);
                        if simd::any(mask) {
                            let p = simd::load(&$soa2.dipole.p, j);
                            let ed = ld3(&$soa2.dipole.e.x, &$soa2.dipole.e.y, &$soa2.dipole.e.z, j);
                            let rd = ld3(&$soa2.dipole.r.x, &$soa2.dipole.r.y, &$soa2.dipole.r.z, j);
                            let md =
                                ld3(&$soa2.dipole.m_r.x, &$soa2.dipole.m_r.y, &$soa2.dipole.m_r.z, j);
                            let (f, t_dip, t_quad) = loops::dipole_quadrupole::<$mac>(
                                md, rd, ed, p, m1v, rq, eq, mag, mask, true, &mut vac,
                            );
                            sum_f[0] -= f[0];
                            sum_f[1] -= f[1];
                            sum_f[2] -= f[2];
                            simd::load_add_store(&mut $soa2.dipole.f.x, j, f[0]);
                            simd::load_add_store(&mut $soa2.dipole.f.y, j, f[1]);
                            simd::load_add_store(&mut $soa2.dipole.f.z, j, f[2]);
                            simd::load_add_store(&mut $soa2.dipole.m.x, j, t_dip[0]);
                            simd::load_add_store(&mut $soa2.dipole.m.y, j, t_dip[1]);
                            simd::load_add_store(&mut $soa2.dipole.m.z, j, t_dip[2]);
                            sum_m[0] += t_quad[0];
                            sum_m[1] += t_quad[1];
                            sum_m[2] += t_quad[2];
                        }
                        j += LANES;
                    }
                    simd::hsum_add(&mut $soa1.quad.f.x, i_quad_dipole, sum_f[0]);
                    simd::hsum_add(&mut $soa1.quad.f.y, i_quad_dipole, sum_f[1]);
                    simd::hsum_add(&mut $soa1.quad.f.z, i_quad_dipole, sum_f[2]);
                    simd::hsum_add(&mut $soa1.quad.m.x, i_quad_dipole, sum_m[0]);
                    simd::hsum_add(&mut $soa1.quad.m.y, i_quad_dipole, sum_m[1]);
                    simd::hsum_add(&mut $soa1.quad.m.z, i_quad_dipole, sum_m[2]);
                    i_quad_dipole += 1;
                }
            } else {
                i_dipole += n_d_i;
                i_charge_dipole += n_c_i;
                i_quad_dipole += n_q_i;
            }

            // ── target quadrupoles ──
            if any_quad {
                // quadrupole–quadrupole
                for _ in 0..n_q_i {
                    let mag1 = simd::broadcast($soa1.quad.mag[i_quad]);
                    let e1 = bc3(&$soa1.quad.e.x, &$soa1.quad.e.y, &$soa1.quad.e.z, i_quad);
                    let r1 = bc3(&$soa1.quad.r.x, &$soa1.quad.r.y, &$soa1.quad.r.z, i_quad);
                    let mut sum_f = [simd::zero(); 3];
                    let mut sum_m = [simd::zero(); 3];
                    let mut j = 0;
                    while j < $soa2.quad.n_padded {
                        let mask = simd::load(&$soa2.quad.dist, j);
                        if simd::any(mask) {
                            let mag2 = simd::load(&$soa2.quad.mag, j);
                            let e2 = ld3(&$soa2.quad.e.x, &$soa2.quad.e.y, &$soa2.quad.e.z, j);
                            let r2 = ld3(&$soa2.quad.r.x, &$soa2.quad.r.y, &$soa2.quad.r.z, j);
                            let m2 = ld3(&$soa2.quad.m_r.x, &$soa2.quad.m_r.y, &$soa2.quad.m_r.z, j);
                            let (f, t1, t2) = loops::quadrupole_quadrupole::<$mac>(
                                m1v, r1, e1, mag1, m2, r2, e2, mag2, mask, &mut vac,
                            );
                            sum_f[0] += f[0];
                            sum_f[1] += f[1];
                            sum_f[2] += f[2];
                            simd::load_sub_store(&mut $soa2.quad.f.x, j, f[0]);
                            simd::load_sub_store(&mut $soa2.quad.f.y, j, f[1]);
                            simd::load_sub_store(&mut $soa2.quad.f.z, j, f[2]);
                            sum_m[0] += t1[0];
                            sum_m[1] += t1[1];
                            sum_m[2] += t1[2];
                            simd::load_add_store(&mut $soa2.quad.m.x, j, t2[0]);
                            simd::load_add_store(&mut $soa2.quad.m.y, j, t2[1]);
                            simd::load_add_store(&mut $soa2.quad.m.z, j, t2[2]);
                        }
                        j += LANES;
                    }
                    simd::hsum_add(&mut $soa1.quad.f.x, i_quad, sum_f[0]);
                    simd::hsum_add(&mut $soa1.quad.f.y, i_quad, sum_f[1]);
                    simd::hsum_add(&mut $soa1.quad.f.z, i_quad, sum_f[2]);
                    simd::hsum_add(&mut $soa1.quad.m.x, i_quad, sum_m[0]);
                    simd::hsum_add(&mut $soa1.quad.m.y, i_quad, sum_m[1]);
                    simd::hsum_add(&mut $soa1.quad.m.z, i_quad, sum_m[2]);
                    i_quad += 1;
                }
                // charge–quadrupole
                for _ in 0..n_c_i {
                    let q = simd::broadcast($soa1.charge.q[i_charge_quad]);
                    let r1 = bc3(
                        &$soa1.charge.r.x,
                        &$soa1.charge.r.y,
                        &$soa1.charge.r.z,
                        i_charge_quad,
                    );
                    let mut sum_f = [simd::zero(); 3];
                    let mut j = 0;
                    while j < $soa2.quad.n_padded {
                        let mask = simd::load(&$soa2.quad.dist, j);
                        if simd::any(mask) {
                            let mag = simd::load(&$soa2.quad.mag, j);
                            let e = ld3(&$soa2.quad.e.x, &$soa2.quad.e.y, &$soa2.quad.e.z, j);
                            let r2 = ld3(&$soa2.quad.r.x, &$soa2.quad.r.y, &$soa2.quad.r.z, j);
                            let m2 = ld3(&$soa2.quad.m_r.x, &$soa2.quad.m_r.y, &$soa2.quad.m_r.z, j);
                            let (f, m) = loops::charge_quadrupole::<$mac>(
                                m1v, r1, q, m2, r2, e, mag, mask, false, &mut vac,
                            );
                            sum_f[0] += f[0];
                            sum_f[1] += f[1];
                            sum_f[2] += f[2];
                            simd::load_sub_store(&mut $soa2.quad.f.x, j, f[0]);
                            simd::load_sub_store(&mut $soa2.quad.f.y, j, f[1]);
                            simd::load_sub_store(&mut $soa2.quad.f.z, j, f[2]);
                            simd::load_add_store(&mut $soa2.quad.m.x, j, m[0]);
                            simd::load_add_store(&mut $soa2.quad.m.y, j, m[1]);
                            simd::load_add_store(&mut $soa2.quad.m.z, j, m[2]);
                        }
                        j += LANES;
                    }
                    simd::hsum_add(&mut $soa1.charge.f.x, i_charge_quad, sum_f[0]);
                    simd::hsum_add(&mut $soa1.charge.f.y, i_charge_quad, sum_f[1]);
                    simd::hsum_add(&mut $soa1.charge.f.z, i_charge_quad, sum_f[2]);
                    i_charge_quad += 1;
                }
                // dipole–quadrupole
                for _ in 0..n_d_i {
                    let p = simd::broadcast($soa1.dipole.p[i_dipole_quad]);
                    let e1 = bc3(
                        &$soa1.dipole.e.x,
                        &$soa1.dipole.e.y,
                        &$soa1.dipole.e.z,
                        i_dipole_quad,
                    );
                    let r1 = bc3(
                        &$soa1.dipole.r.x,
                        &$soa1.dipole.r.y,
                        &$soa1.dipole.r.z,
                        i_dipole_quad,
                    );
                    let mut sum_f = [simd::zero(); 3];
                    let mut sum_m = [simd::zero(); 3];
                    let mut j = 0;
                    while j < $soa2.quad.n_padded {
                        let mask = simd::load(&$soa2.quad.dist, j);
                        if simd::any(mask) {
                            let mag = simd::load(&$soa2.quad.mag, j);
                            let e2 = ld3(&$soa2.quad.e.x, &$soa2.quad.e.y, &$soa2.quad.e.z, j);
                            let r2 = ld3(&$soa2.quad.r.x, &$soa2.quad.r.y, &$soa2.quad.r.z, j);
                            let m2 = ld3(&$soa2.quad.m_r.x, &$soa2.quad.m_r.y, &$soa2.quad.m_r.z, j);
                            let (f, t_dip, t_quad) = loops::dipole_quadrupole::<$mac>(
                                m1v, r1, e1, p, m2, r2, e2, mag, mask, false, &mut vac,
                            );
                            sum_f[0] += f[0];
                            sum_f[1] += f[1];
                            sum_f[2] += f[2];
                            simd::load_sub_store(&mut $soa2.quad.f.x, j, f[0]);
                            simd::load_sub_store(&mut $soa2.quad.f.y, j, f[1]);
                            simd::load_sub_store(&mut $soa2.quad.f.z, j, f[2]);
                            sum_m[0] += t_dip[0];
                            sum_m[1] += t_dip[1];
                            sum_m[2] += t_dip[2];
                            simd::load_add_store(&mut $soa2.quad.m.x, j, t_quad[0]);
                            simd::load_add_store(&mut $soa2.quad.m.y, j, t_quad[1]);
                            simd::load_add_store(&mut $soa2.quad.m.z, j, t_quad[2]);
                        }
                        j += LANES;
                    }
                    simd::hsum_add(&mut $soa1.dipole.f.x, i_dipole_quad, sum_f[0]);
                    simd::hsum_add(&mut $soa1.dipole.f.y, i_dipole_quad, sum_f[1]);
                    simd::hsum_add(&mut $soa1.dipole.f.z, i_dipole_quad, sum_f[2]);
                    simd::hsum_add(&mut $soa1.dipole.m.x, i_dipole_quad, sum_m[0]);
                    simd::hsum_add(&mut $soa1.dipole.m.y, i_dipole_quad, sum_m[1]);
                    simd::hsum_add(&mut $soa1.dipole.m.z, i_dipole_quad, sum_m[2]);
                    i_dipole_quad += 1;
                }
            } else {
                i_quad += n_q_i;
                i_charge_quad += n_c_i;
                i_dipole_quad += n_d_i;
            }
        }

        $out.upot6_lj += simd::hsum(vac.upot6_lj);
        $out.upot_xpoles += simd::hsum(vac.upot_xpoles);
        $out.virial += simd::hsum(vac.virial);
        $out.my_rf -= simd::hsum(vac.my_rf);
    }};
}

/// The vectorized cell processor: parameter tables, cutoff radii, reaction
/// field prefactor.
#[derive(Debug)]
pub struct PairKernel<'a> {
    registry: &'a ComponentRegistry,
    /// Full cutoff squared (electrostatics).
    pub rc2: f64,
    /// LJ cutoff squared.
    pub rc2_lj: f64,
    /// Reaction-field prefactor 2(ε_RF−1)/((2ε_RF+1) r_c³).
    pub eps_rf_inv_rc3: f64,
}

impl<'a> PairKernel<'a> {
    /// New kernel over a registry with the given cutoff radii and
    /// reaction-field prefactor.
    #[must_use]
    pub fn new(
        registry: &'a ComponentRegistry,
        cutoff: f64,
        lj_cutoff: f64,
        eps_rf_inv_rc3: f64,
    ) -> Self {
        Self {
            registry,
            rc2: cutoff * cutoff,
            rc2_lj: lj_cutoff * lj_cutoff,
            eps_rf_inv_rc3,
        }
    }

    /// Intra-cell interactions (single-cell policy, macroscopic on).
    /// The caller skips halo cells and cells with fewer than two molecules.
    pub fn process_cell(&self, soa: &mut CellSoa, out: &mut MacroAccum) {
        self.pairs_same::<true>(soa, out);
    }

    /// Inter-cell interactions. Forces always apply to both slabs;
    /// macroscopic accumulation only when `macroscopic` is set (the
    /// traversal's halo ordering rule).
    pub fn process_cell_pair(
        &self,
        soa1: &mut CellSoa,
        soa2: &mut CellSoa,
        macroscopic: bool,
        out: &mut MacroAccum,
    ) {
        if macroscopic {
            self.pairs_two::<true>(soa1, soa2, out);
        } else {
            self.pairs_two::<false>(soa1, soa2, out);
        }
    }

    fn pairs_same<const MACRO: bool>(&self, soa: &mut CellSoa, out: &mut MacroAccum) {
        calculate_pairs!(self, soa, soa, Policy::SingleCell, MACRO, out);
    }

    fn pairs_two<const MACRO: bool>(
        &self,
        soa1: &mut CellSoa,
        soa2: &mut CellSoa,
        out: &mut MacroAccum,
    ) {
        calculate_pairs!(self, soa1, soa2, Policy::CellPair, MACRO, out);
    }
}

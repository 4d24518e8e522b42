// SPDX-License-Identifier: AGPL-3.0-only

//! Scalar all-pairs reference for cross-validation.
//!
//! Same physics as the vectorized cell engine, written in plain f64 over
//! every molecule pair. No cells, no masks, no padding — used by the test
//! suite as the ground truth for the SIMD invariance gate and by the
//! validation binaries for analytically known scenarios. Not a performance
//! path.

use super::MacroAccum;
use crate::components::ComponentRegistry;
use crate::molecule::Molecule;

fn dot(a: [f64; 3], b: [f64; 3]) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

fn cross(a: [f64; 3], b: [f64; 3]) -> [f64; 3] {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}

fn sub(a: [f64; 3], b: [f64; 3]) -> [f64; 3] {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}

fn scale(a: [f64; 3], s: f64) -> [f64; 3] {
    [a[0] * s, a[1] * s, a[2] * s]
}

fn add_assign(a: &mut [f64; 3], b: [f64; 3]) {
    a[0] += b[0];
    a[1] += b[1];
    a[2] += b[2];
}

/// Site-level contribution applied to a molecule: force at a site plus the
/// resulting lever-arm torque about the COM.
fn apply_site_force(mol: &mut Molecule, site: [f64; 3], f: [f64; 3]) {
    mol.add_force(f);
    let lever = sub(site, mol.r);
    mol.add_torque(cross(lever, f));
}

/// All-pairs scalar force/torque/energy computation.
///
/// Interactions follow the engine's cutoff semantics: per molecule pair the
/// COM separation gates LJ sites under `lj_cutoff` and electrostatic sites
/// under `cutoff`. Forces and torques accumulate on the molecules (zeroed
/// first); the returned accumulator carries 6·U_LJ, U_multipole, virial and
/// the reaction-field sum.
#[must_use]
pub fn compute_all_pairs(
    molecules: &mut [Molecule],
    registry: &ComponentRegistry,
    cutoff: f64,
    lj_cutoff: f64,
    eps_rf_inv_rc3: f64,
) -> MacroAccum {
    let rc2 = cutoff * cutoff;
    let rc2_lj = lj_cutoff * lj_cutoff;
    let mut acc = MacroAccum::default();
    let mut my_rf_sum = 0.0;

    for m in molecules.iter_mut() {
        m.clear_accumulators();
    }

    for i in 0..molecules.len() {
        for j in (i + 1)..molecules.len() {
            let (head, tail) = molecules.split_at_mut(j);
            let mi = &mut head[i];
            let mj = &mut tail[0];
            let m_d = sub(mi.r, mj.r);
            let m_r2 = dot(m_d, m_d);
            if m_r2 == 0.0 {
                continue;
            }
            let do_lj = m_r2 < rc2_lj;
            let do_elec = m_r2 < rc2;
            if !do_lj && !do_elec {
                continue;
            }

            let ci = registry.component(mi.component_id);
            let cj = registry.component(mj.component_id);

            if do_lj {
                for (si, site_i) in ci.lj_sites.iter().enumerate() {
                    let id_i = registry.lj_site_id(mi.component_id, si);
                    let ri = mi.site_position(site_i.offset);
                    for (sj, site_j) in cj.lj_sites.iter().enumerate() {
                        let id_j = registry.lj_site_id(mj.component_id, sj);
                        let rj = mj.site_position(site_j.offset);
                        let (eps24, sig2, shift6) = registry.lj_params(id_i, id_j);
                        let d = sub(ri, rj);
                        let r2 = dot(d, d);
                        let r2_inv = 1.0 / r2;
                        let lj2 = sig2 * r2_inv;
                        let lj6 = lj2 * lj2 * lj2;
                        let lj12 = lj6 * lj6;
                        let lj12m6 = lj12 - lj6;
                        let fscale = eps24 * r2_inv * (lj12 + lj12m6);
                        let f = scale(d, fscale);
                        apply_site_force(mi, ri, f);
                        apply_site_force(mj, rj, scale(f, -1.0));
                        acc.upot6_lj += eps24 * lj12m6 + shift6;
                        acc.virial += dot(m_d, f);
                    }
                }
            }

            if do_elec {
                // charge–charge, charge–dipole, charge–quadrupole
                for site_qi in &ci.charges {
                    let ri = mi.site_position(site_qi.offset);
                    for site_qj in &cj.charges {
                        let rj = mj.site_position(site_qj.offset);
                        let d = sub(ri, rj);
                        let dr_inv = 1.0 / dot(d, d).sqrt();
                        let upot = site_qi.q * site_qj.q * dr_inv;
                        let f = scale(d, upot * dr_inv * dr_inv);
                        apply_site_force(mi, ri, f);
                        apply_site_force(mj, rj, scale(f, -1.0));
                        acc.upot_xpoles += upot;
                        acc.virial += dot(m_d, f);
                    }
                }
                for site_d in &ci.dipoles {
                    let rd = mi.site_position(site_d.offset);
                    let e = mi.orientation_lab(site_d.e_body);
                    for site_q in &cj.charges {
                        let rq = mj.site_position(site_q.offset);
                        let (f_on_charge, torque) = charge_dipole_scalar(
                            rq, site_q.q, rd, e, site_d.mu, &mut acc, scale(m_d, -1.0),
                        );
                        apply_site_force(mj, rq, f_on_charge);
                        apply_site_force(mi, rd, scale(f_on_charge, -1.0));
                        mi.add_torque(torque);
                    }
                }
                for site_q in &ci.charges {
                    let rq = mi.site_position(site_q.offset);
                    for site_d in &cj.dipoles {
                        let rd = mj.site_position(site_d.offset);
                        let e = mj.orientation_lab(site_d.e_body);
                        let (f_on_charge, torque) =
                            charge_dipole_scalar(rq, site_q.q, rd, e, site_d.mu, &mut acc, m_d);
                        apply_site_force(mi, rq, f_on_charge);
                        apply_site_force(mj, rd, scale(f_on_charge, -1.0));
                        mj.add_torque(torque);
                    }
                }
                for site_qu in &ci.quadrupoles {
                    let rqu = mi.site_position(site_qu.offset);
                    let e = mi.orientation_lab(site_qu.e_body);
                    for site_q in &cj.charges {
                        let rq = mj.site_position(site_q.offset);
                        let (f_on_charge, torque) = charge_quadrupole_scalar(
                            rq,
                            site_q.q,
                            rqu,
                            e,
                            site_qu.q_moment,
                            &mut acc,
                            scale(m_d, -1.0),
                        );
                        apply_site_force(mj, rq, f_on_charge);
                        apply_site_force(mi, rqu, scale(f_on_charge, -1.0));
                        mi.add_torque(torque);
                    }
                }
                for site_q in &ci.charges {
                    let rq = mi.site_position(site_q.offset);
                    for site_qu in &cj.quadrupoles {
                        let rqu = mj.site_position(site_qu.offset);
                        let e = mj.orientation_lab(site_qu.e_body);
                        let (f_on_charge, torque) = charge_quadrupole_scalar(
                            rq,
                            site_q.q,
                            rqu,
                            e,
                            site_qu.q_moment,
                            &mut acc,
                            m_d,
                        );
                        apply_site_force(mi, rq, f_on_charge);
                        apply_site_force(mj, rqu, scale(f_on_charge, -1.0));
                        mj.add_torque(torque);
                    }
                }

                // dipole–dipole with reaction field
                for site_di in &ci.dipoles {
                    let r1 = mi.site_position(site_di.offset);
                    let e1 = mi.orientation_lab(site_di.e_body);
                    for site_dj in &cj.dipoles {
                        let r2 = mj.site_position(site_dj.offset);
                        let e2 = mj.orientation_lab(site_dj.e_body);
                        let d = sub(r1, r2);
                        let dr2_inv = 1.0 / dot(d, d);
                        let dr_inv = dr2_inv.sqrt();
                        let dr2three_inv = 3.0 * dr2_inv;
                        let p1p2 = site_di.mu * site_dj.mu;
                        let rffac = p1p2 * eps_rf_inv_rc3;
                        let p1p2_r3 = p1p2 * dr_inv * dr2_inv;
                        let p1p2_3r5 = p1p2_r3 * dr2three_inv;
                        let e1e2 = dot(e1, e2);
                        let re1 = dot(d, e1);
                        let re2 = dot(d, e2);
                        let re1_3r2 = re1 * dr2three_inv;
                        let re2_3r2 = re2 * dr2three_inv;
                        let re1re2_r2 = dr2_inv * re1 * re2;
                        let e1e2_m5 = e1e2 - 5.0 * re1re2_r2;
                        let f = [
                            p1p2_3r5 * (d[0] * e1e2_m5 + e1[0] * re2 + e2[0] * re1),
                            p1p2_3r5 * (d[1] * e1e2_m5 + e1[1] * re2 + e2[1] * re1),
                            p1p2_3r5 * (d[2] * e1e2_m5 + e1[2] * re2 + e2[2] * re1),
                        ];
                        apply_site_force(mi, r1, f);
                        apply_site_force(mj, r2, scale(f, -1.0));
                        acc.upot_xpoles += p1p2_r3 * (e1e2 - 3.0 * re1re2_r2);
                        acc.virial += dot(m_d, f);
                        my_rf_sum += rffac * e1e2;
                        let e1xe2 = cross(e1, e2);
                        let t1 = [
                            p1p2_r3 * (re2_3r2 * (e1[1] * d[2] - e1[2] * d[1]) - e1xe2[0])
                                + rffac * e1xe2[0],
                            p1p2_r3 * (re2_3r2 * (e1[2] * d[0] - e1[0] * d[2]) - e1xe2[1])
                                + rffac * e1xe2[1],
                            p1p2_r3 * (re2_3r2 * (e1[0] * d[1] - e1[1] * d[0]) - e1xe2[2])
                                + rffac * e1xe2[2],
                        ];
                        let t2 = [
                            p1p2_r3 * (re1_3r2 * (e2[1] * d[2] - e2[2] * d[1]) + e1xe2[0])
                                - rffac * e1xe2[0],
                            p1p2_r3 * (re1_3r2 * (e2[2] * d[0] - e2[0] * d[2]) + e1xe2[1])
                                - rffac * e1xe2[1],
                            p1p2_r3 * (re1_3r2 * (e2[0] * d[1] - e2[1] * d[0]) + e1xe2[2])
                                - rffac * e1xe2[2],
                        ];
                        mi.add_torque(t1);
                        mj.add_torque(t2);
                    }
                }

                // dipole–quadrupole, both orders
                for site_di in &ci.dipoles {
                    let rd = mi.site_position(site_di.offset);
                    let ed = mi.orientation_lab(site_di.e_body);
                    for site_qu in &cj.quadrupoles {
                        let rq = mj.site_position(site_qu.offset);
                        let eq = mj.orientation_lab(site_qu.e_body);
                        let (f_on_dipole, t_dip, t_quad) = dipole_quadrupole_scalar(
                            rd,
                            ed,
                            site_di.mu,
                            rq,
                            eq,
                            site_qu.q_moment,
                            &mut acc,
                            m_d,
                        );
                        apply_site_force(mi, rd, f_on_dipole);
                        apply_site_force(mj, rq, scale(f_on_dipole, -1.0));
                        mi.add_torque(t_dip);
                        mj.add_torque(t_quad);
                    }
                }
                for site_qu in &ci.quadrupoles {
                    let rq = mi.site_position(site_qu.offset);
                    let eq = mi.orientation_lab(site_qu.e_body);
                    for site_di in &cj.dipoles {
                        let rd = mj.site_position(site_di.offset);
                        let ed = mj.orientation_lab(site_di.e_body);
                        let (f_on_dipole, t_dip, t_quad) = dipole_quadrupole_scalar(
                            rd,
                            ed,
                            site_di.mu,
                            rq,
                            eq,
                            site_qu.q_moment,
                            &mut acc,
                            scale(m_d, -1.0),
                        );
                        apply_site_force(mj, rd, f_on_dipole);
                        apply_site_force(mi, rq, scale(f_on_dipole, -1.0));
                        mj.add_torque(t_dip);
                        mi.add_torque(t_quad);
                    }
                }

                // quadrupole–quadrupole
                for site_qi in &ci.quadrupoles {
                    let r1 = mi.site_position(site_qi.offset);
                    let e1 = mi.orientation_lab(site_qi.e_body);
                    for site_qj in &cj.quadrupoles {
                        let r2 = mj.site_position(site_qj.offset);
                        let e2 = mj.orientation_lab(site_qj.e_body);
                        let (f, t1, t2) = quadrupole_quadrupole_scalar(
                            r1,
                            e1,
                            site_qi.q_moment,
                            r2,
                            e2,
                            site_qj.q_moment,
                            &mut acc,
                            m_d,
                        );
                        apply_site_force(mi, r1, f);
                        apply_site_force(mj, r2, scale(f, -1.0));
                        mi.add_torque(t1);
                        mj.add_torque(t2);
                    }
                }
            }
        }
    }

    acc.my_rf = -my_rf_sum;
    acc
}

/// Force on the charge and torque on the dipole. `m_d` is the COM
/// separation oriented charge-side minus multipole-side (matching the
/// returned force), used for the virial.
#[allow(clippy::too_many_arguments)]
fn charge_dipole_scalar(
    r_charge: [f64; 3],
    q: f64,
    r_dipole: [f64; 3],
    e: [f64; 3],
    mu: f64,
    acc: &mut MacroAccum,
    m_d: [f64; 3],
) -> ([f64; 3], [f64; 3]) {
    let d = sub(r_charge, r_dipole);
    let dr2_inv = 1.0 / dot(d, d);
    let dr_inv = dr2_inv.sqrt();
    let dr3_inv = dr2_inv * dr_inv;
    let re = dot(d, e);
    let qp_dr3 = q * mu * dr3_inv;
    let fac = dr2_inv * 3.0 * re;
    let f = [
        qp_dr3 * (e[0] - d[0] * fac),
        qp_dr3 * (e[1] - d[1] * fac),
        qp_dr3 * (e[2] - d[2] * fac),
    ];
    acc.upot_xpoles -= qp_dr3 * re;
    acc.virial += dot(m_d, f);
    let m = scale(cross(e, d), qp_dr3);
    (f, m)
}

/// Force on the charge and torque on the quadrupole.
#[allow(clippy::too_many_arguments)]
fn charge_quadrupole_scalar(
    r_charge: [f64; 3],
    q: f64,
    r_quad: [f64; 3],
    e: [f64; 3],
    mag: f64,
    acc: &mut MacroAccum,
    m_d: [f64; 3],
) -> ([f64; 3], [f64; 3]) {
    let d = sub(r_charge, r_quad);
    let invdr2 = 1.0 / dot(d, d);
    let invdr = invdr2.sqrt();
    let q_qtr = 0.5 * q * mag;
    let costj = dot(e, d) * invdr;
    let qq_dr3 = q_qtr * invdr * invdr2;
    let upot = qq_dr3 * (3.0 * costj * costj - 1.0);
    let minus_rij = 3.0 * upot * invdr2;
    let part_tj = 6.0 * costj * qq_dr3 * invdr;
    let fac = costj * part_tj * invdr + minus_rij;
    let f = [
        fac * d[0] - part_tj * e[0],
        fac * d[1] - part_tj * e[1],
        fac * d[2] - part_tj * e[2],
    ];
    acc.upot_xpoles += upot;
    acc.virial += dot(m_d, f);
    let m = scale(cross(d, e), part_tj);
    (f, m)
}

/// Force on the dipole, torque on the dipole, torque on the quadrupole.
#[allow(clippy::too_many_arguments)]
fn dipole_quadrupole_scalar(
    r_dip: [f64; 3],
    eii: [f64; 3],
    mu: f64,
    r_quad: [f64; 3],
    ejj: [f64; 3],
    mag: f64,
    acc: &mut MacroAccum,
    m_d: [f64; 3],
) -> ([f64; 3], [f64; 3], [f64; 3]) {
    let d = sub(r_dip, r_quad);
    let invdr2 = 1.0 / dot(d, d);
    let invdr = invdr2.sqrt();
    let myqfac = 1.5 * mu * mag * invdr2 * invdr2;
    let costi = dot(eii, d) * invdr;
    let costj = dot(ejj, d) * invdr;
    let cos2tj = costj * costj;
    let cosgij = dot(eii, ejj);
    let five_cos2tj_m1 = 5.0 * cos2tj - 1.0;
    let upot = myqfac * (2.0 * costj * cosgij - costi * five_cos2tj_m1);
    let myqfac_invdr = myqfac * invdr;
    let minus_rij = 4.0 * upot * invdr2;
    let minus_ti = myqfac_invdr * five_cos2tj_m1;
    let minus_tj = myqfac_invdr * 2.0 * (5.0 * costi * costj - cosgij);
    let partial_gij = myqfac * 2.0 * costj;
    let fac = minus_rij - (costi * minus_ti + costj * minus_tj) * invdr;
    let f = [
        fac * d[0] + minus_ti * eii[0] + minus_tj * ejj[0],
        fac * d[1] + minus_ti * eii[1] + minus_tj * ejj[1],
        fac * d[2] + minus_ti * eii[2] + minus_tj * ejj[2],
    ];
    acc.upot_xpoles += upot;
    acc.virial += dot(m_d, f);
    let eixej = cross(eii, ejj);
    let gij_eixej = scale(eixej, partial_gij);
    let t_dip = sub(scale(cross(eii, d), minus_ti), gij_eixej);
    let mut t_quad = scale(cross(ejj, d), minus_tj);
    add_assign(&mut t_quad, gij_eixej);
    (f, t_dip, t_quad)
}

/// Force on the first quadrupole, torques on both.
#[allow(clippy::too_many_arguments)]
fn quadrupole_quadrupole_scalar(
    r1: [f64; 3],
    eii: [f64; 3],
    mii: f64,
    r2: [f64; 3],
    ejj: [f64; 3],
    mjj: f64,
    acc: &mut MacroAccum,
    m_d: [f64; 3],
) -> ([f64; 3], [f64; 3], [f64; 3]) {
    let d = sub(r1, r2);
    let invdr2 = 1.0 / dot(d, d);
    let invdr = invdr2.sqrt();
    let qfac = 0.75 * invdr * (mii * mjj) * (invdr2 * invdr2);
    let costi = dot(eii, d) * invdr;
    let costj = dot(ejj, d) * invdr;
    let cos2ti = costi * costi;
    let cos2tj = costj * costj;
    let cosgij = dot(eii, ejj);
    let term = cosgij - 5.0 * (costi * costj);
    let upot = qfac * ((1.0 + 2.0 * term * term) - (5.0 * (cos2ti + cos2tj) + 15.0 * cos2ti * cos2tj));
    let minus_rij = 5.0 * upot * invdr2;
    let part1 = qfac * 10.0 * invdr;
    let part2 = 2.0 * term;
    let minus_ti = part1 * (costi + part2 * costj + 3.0 * costi * cos2tj);
    let minus_tj = part1 * (costj + part2 * costi + 3.0 * costj * cos2ti);
    let partial_gij = qfac * 4.0 * term;
    let fac = minus_rij - (minus_ti * costi + minus_tj * costj) * invdr;
    let f = [
        fac * d[0] + minus_ti * eii[0] + minus_tj * ejj[0],
        fac * d[1] + minus_ti * eii[1] + minus_tj * ejj[1],
        fac * d[2] + minus_ti * eii[2] + minus_tj * ejj[2],
    ];
    acc.upot_xpoles += upot;
    acc.virial += dot(m_d, f);
    let eixej = cross(eii, ejj);
    let gij_eixej = scale(eixej, partial_gij);
    let t1 = sub(scale(cross(eii, d), minus_ti), gij_eixej);
    let mut t2 = scale(cross(ejj, d), minus_tj);
    add_assign(&mut t2, gij_eixej);
    (f, t1, t2)
}

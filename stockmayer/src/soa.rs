// SPDX-License-Identifier: AGPL-3.0-only

//! Per-cell structure-of-arrays slabs for the pair kernel.
//!
//! During force calculation every cell checks a slab out of the pool,
//! fills four site-kind sub-arrays (LJ, charge, dipole, quadrupole) with
//! lab-frame data derived from its molecules, and scatters accumulated
//! forces and torques back afterwards. Sub-array storage is padded to the
//! SIMD width with zero sentinels; padded lanes never contribute because
//! their dist-lookup masks stay zero.

use crate::cellgrid::{MolRef, MoleculeArena};
use crate::components::ComponentRegistry;
use crate::simd;

/// Three parallel coordinate arrays.
#[derive(Debug, Default)]
pub struct Soa3 {
    /// x components.
    pub x: Vec<f64>,
    /// y components.
    pub y: Vec<f64>,
    /// z components.
    pub z: Vec<f64>,
}

impl Soa3 {
    fn resize_zero(&mut self, n: usize) {
        self.x.clear();
        self.y.clear();
        self.z.clear();
        self.x.resize(n, 0.0);
        self.y.resize(n, 0.0);
        self.z.resize(n, 0.0);
    }

    /// Write one triple.
    pub fn set(&mut self, i: usize, v: [f64; 3]) {
        self.x[i] = v[0];
        self.y[i] = v[1];
        self.z[i] = v[2];
    }

    /// Read one triple.
    #[must_use]
    pub fn get(&self, i: usize) -> [f64; 3] {
        [self.x[i], self.y[i], self.z[i]]
    }
}

/// LJ center sub-array.
#[derive(Debug, Default)]
pub struct LjArrays {
    /// Real site count.
    pub n: usize,
    /// Count padded to the SIMD width.
    pub n_padded: usize,
    /// Molecule COM, broadcast per site.
    pub m_r: Soa3,
    /// Absolute site positions.
    pub r: Soa3,
    /// Force accumulators.
    pub f: Soa3,
    /// Global LJ site IDs for parameter lookup.
    pub id: Vec<usize>,
    /// Cutoff masks (f64 bit patterns).
    pub dist: Vec<f64>,
}

/// Point-charge sub-array.
#[derive(Debug, Default)]
pub struct ChargeArrays {
    /// Real site count.
    pub n: usize,
    /// Count padded to the SIMD width.
    pub n_padded: usize,
    /// Molecule COM, broadcast per site.
    pub m_r: Soa3,
    /// Absolute site positions.
    pub r: Soa3,
    /// Force accumulators.
    pub f: Soa3,
    /// Charge magnitudes.
    pub q: Vec<f64>,
    /// Cutoff masks.
    pub dist: Vec<f64>,
}

/// Point-dipole sub-array.
#[derive(Debug, Default)]
pub struct DipoleArrays {
    /// Real site count.
    pub n: usize,
    /// Count padded to the SIMD width.
    pub n_padded: usize,
    /// Molecule COM, broadcast per site.
    pub m_r: Soa3,
    /// Absolute site positions.
    pub r: Soa3,
    /// Force accumulators.
    pub f: Soa3,
    /// Moment magnitudes μ.
    pub p: Vec<f64>,
    /// Lab-frame moment orientations.
    pub e: Soa3,
    /// Torque accumulators.
    pub m: Soa3,
    /// Cutoff masks.
    pub dist: Vec<f64>,
}

/// Point-quadrupole sub-array.
#[derive(Debug, Default)]
pub struct QuadArrays {
    /// Real site count.
    pub n: usize,
    /// Count padded to the SIMD width.
    pub n_padded: usize,
    /// Molecule COM, broadcast per site.
    pub m_r: Soa3,
    /// Absolute site positions.
    pub r: Soa3,
    /// Force accumulators.
    pub f: Soa3,
    /// Moment magnitudes Q.
    pub mag: Vec<f64>,
    /// Lab-frame moment axis orientations.
    pub e: Soa3,
    /// Torque accumulators.
    pub m: Soa3,
    /// Cutoff masks.
    pub dist: Vec<f64>,
}

/// One cell's SoA slab.
#[derive(Debug, Default)]
pub struct CellSoa {
    /// Number of molecules loaded.
    pub n_mol: usize,
    /// Molecule COM positions.
    pub mol_pos: Soa3,
    /// Per molecule: number of LJ sites.
    pub mol_lj_num: Vec<usize>,
    /// Per molecule: number of charges.
    pub mol_charge_num: Vec<usize>,
    /// Per molecule: number of dipoles.
    pub mol_dipole_num: Vec<usize>,
    /// Per molecule: number of quadrupoles.
    pub mol_quad_num: Vec<usize>,
    /// LJ centers.
    pub lj: LjArrays,
    /// Point charges.
    pub charge: ChargeArrays,
    /// Point dipoles.
    pub dipole: DipoleArrays,
    /// Point quadrupoles.
    pub quad: QuadArrays,
}

impl CellSoa {
    /// Reallocate all sub-arrays for the given counts, padding each
    /// site-kind length up to the SIMD width with zero sentinels.
    pub fn resize(&mut self, n_mol: usize, n_lj: usize, n_charge: usize, n_dip: usize, n_quad: usize) {
        self.n_mol = n_mol;
        self.mol_pos.resize_zero(n_mol);
        self.mol_lj_num.clear();
        self.mol_lj_num.resize(n_mol, 0);
        self.mol_charge_num.clear();
        self.mol_charge_num.resize(n_mol, 0);
        self.mol_dipole_num.clear();
        self.mol_dipole_num.resize(n_mol, 0);
        self.mol_quad_num.clear();
        self.mol_quad_num.resize(n_mol, 0);

        let pad = simd::ceil_to_lanes;

        self.lj.n = n_lj;
        self.lj.n_padded = pad(n_lj);
        self.lj.m_r.resize_zero(self.lj.n_padded);
        self.lj.r.resize_zero(self.lj.n_padded);
        self.lj.f.resize_zero(self.lj.n_padded);
        self.lj.id.clear();
        self.lj.id.resize(self.lj.n_padded, 0);
        self.lj.dist.clear();
        self.lj.dist.resize(self.lj.n_padded, 0.0);

        self.charge.n = n_charge;
        self.charge.n_padded = pad(n_charge);
        self.charge.m_r.resize_zero(self.charge.n_padded);
        self.charge.r.resize_zero(self.charge.n_padded);
        self.charge.f.resize_zero(self.charge.n_padded);
        self.charge.q.clear();
        self.charge.q.resize(self.charge.n_padded, 0.0);
        self.charge.dist.clear();
        self.charge.dist.resize(self.charge.n_padded, 0.0);

        self.dipole.n = n_dip;
        self.dipole.n_padded = pad(n_dip);
        self.dipole.m_r.resize_zero(self.dipole.n_padded);
        self.dipole.r.resize_zero(self.dipole.n_padded);
        self.dipole.f.resize_zero(self.dipole.n_padded);
        self.dipole.p.clear();
        self.dipole.p.resize(self.dipole.n_padded, 0.0);
        self.dipole.e.resize_zero(self.dipole.n_padded);
        self.dipole.m.resize_zero(self.dipole.n_padded);
        self.dipole.dist.clear();
        self.dipole.dist.resize(self.dipole.n_padded, 0.0);

        self.quad.n = n_quad;
        self.quad.n_padded = pad(n_quad);
        self.quad.m_r.resize_zero(self.quad.n_padded);
        self.quad.r.resize_zero(self.quad.n_padded);
        self.quad.f.resize_zero(self.quad.n_padded);
        self.quad.mag.clear();
        self.quad.mag.resize(self.quad.n_padded, 0.0);
        self.quad.e.resize_zero(self.quad.n_padded);
        self.quad.m.resize_zero(self.quad.n_padded);
        self.quad.dist.clear();
        self.quad.dist.resize(self.quad.n_padded, 0.0);
    }

    /// Fill the slab from a cell's molecules: rotate body-frame offsets and
    /// orientations to the lab frame, broadcast COM positions, assign
    /// global LJ site IDs, zero the accumulators.
    pub fn load_from(
        &mut self,
        members: &[MolRef],
        arena: &MoleculeArena,
        registry: &ComponentRegistry,
    ) {
        let mut n_lj = 0;
        let mut n_charge = 0;
        let mut n_dip = 0;
        let mut n_quad = 0;
        let mut n_mol = 0;
        for &r in members {
            if let Some(mol) = arena.get(r) {
                let comp = registry.component(mol.component_id);
                n_mol += 1;
                n_lj += comp.lj_sites.len();
                n_charge += comp.charges.len();
                n_dip += comp.dipoles.len();
                n_quad += comp.quadrupoles.len();
            }
        }
        self.resize(n_mol, n_lj, n_charge, n_dip, n_quad);

        let mut i_mol = 0;
        let mut i_lj = 0;
        let mut i_charge = 0;
        let mut i_dip = 0;
        let mut i_quad = 0;
        for &r in members {
            let Some(mol) = arena.get(r) else { continue };
            let comp = registry.component(mol.component_id);
            self.mol_pos.set(i_mol, mol.r);
            self.mol_lj_num[i_mol] = comp.lj_sites.len();
            self.mol_charge_num[i_mol] = comp.charges.len();
            self.mol_dipole_num[i_mol] = comp.dipoles.len();
            self.mol_quad_num[i_mol] = comp.quadrupoles.len();

            for (j, site) in comp.lj_sites.iter().enumerate() {
                self.lj.m_r.set(i_lj, mol.r);
                self.lj.r.set(i_lj, mol.site_position(site.offset));
                self.lj.id[i_lj] = registry.lj_site_id(mol.component_id, j);
                i_lj += 1;
            }
            for site in &comp.charges {
                self.charge.m_r.set(i_charge, mol.r);
                self.charge.r.set(i_charge, mol.site_position(site.offset));
                self.charge.q[i_charge] = site.q;
                i_charge += 1;
            }
            for site in &comp.dipoles {
                self.dipole.m_r.set(i_dip, mol.r);
                self.dipole.r.set(i_dip, mol.site_position(site.offset));
                self.dipole.p[i_dip] = site.mu;
                self.dipole.e.set(i_dip, mol.orientation_lab(site.e_body));
                i_dip += 1;
            }
            for site in &comp.quadrupoles {
                self.quad.m_r.set(i_quad, mol.r);
                self.quad.r.set(i_quad, mol.site_position(site.offset));
                self.quad.mag[i_quad] = site.q_moment;
                self.quad.e.set(i_quad, mol.orientation_lab(site.e_body));
                i_quad += 1;
            }
            i_mol += 1;
        }
    }

    /// Scatter accumulated site forces and torques back to the molecules:
    /// F summed per molecule, M from the site lever arms plus the intrinsic
    /// dipole/quadrupole torques. Member order matches `load_from`.
    pub fn store_to(&self, members: &[MolRef], arena: &mut MoleculeArena) {
        let mut i_mol = 0;
        let mut i_lj = 0;
        let mut i_charge = 0;
        let mut i_dip = 0;
        let mut i_quad = 0;
        for &r in members {
            let Some(mol) = arena.get_mut(r) else { continue };
            let com = mol.r;
            for _ in 0..self.mol_lj_num[i_mol] {
                add_site_force(mol, com, self.lj.r.get(i_lj), self.lj.f.get(i_lj));
                i_lj += 1;
            }
            for _ in 0..self.mol_charge_num[i_mol] {
                add_site_force(mol, com, self.charge.r.get(i_charge), self.charge.f.get(i_charge));
                i_charge += 1;
            }
            for _ in 0..self.mol_dipole_num[i_mol] {
                add_site_force(mol, com, self.dipole.r.get(i_dip), self.dipole.f.get(i_dip));
                mol.add_torque(self.dipole.m.get(i_dip));
                i_dip += 1;
            }
            for _ in 0..self.mol_quad_num[i_mol] {
                add_site_force(mol, com, self.quad.r.get(i_quad), self.quad.f.get(i_quad));
                mol.add_torque(self.quad.m.get(i_quad));
                i_quad += 1;
            }
            i_mol += 1;
        }
    }
}

/// Add a site force to the molecule with its lever-arm torque about the COM.
fn add_site_force(mol: &mut crate::molecule::Molecule, com: [f64; 3], pos: [f64; 3], f: [f64; 3]) {
    mol.add_force(f);
    let d = [pos[0] - com[0], pos[1] - com[1], pos[2] - com[2]];
    mol.add_torque([
        d[1] * f[2] - d[2] * f[1],
        d[2] * f[0] - d[0] * f[2],
        d[0] * f[1] - d[1] * f[0],
    ]);
}

/// Pool of reusable slabs; `preprocess` checks one out, `postprocess`
/// returns it.
#[derive(Debug, Default)]
pub struct SoaPool {
    free: Vec<Box<CellSoa>>,
}

impl SoaPool {
    /// Check a slab out (allocating if the pool is dry).
    pub fn acquire(&mut self) -> Box<CellSoa> {
        self.free.pop().unwrap_or_default()
    }

    /// Return a slab to the pool.
    pub fn release(&mut self, soa: Box<CellSoa>) {
        self.free.push(soa);
    }

    /// Number of pooled slabs.
    #[must_use]
    pub fn available(&self) -> usize {
        self.free.len()
    }
}

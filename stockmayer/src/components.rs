// SPDX-License-Identifier: AGPL-3.0-only

//! Molecule templates and the precomputed LJ pair-parameter matrix.
//!
//! A component describes one molecule species: its Lennard-Jones centers,
//! point charges, point dipoles and point quadrupoles, all with body-frame
//! offsets, plus the diagonal inertia tensor. The registry is built once at
//! startup and never mutated; the kernel reads LJ parameters through global
//! site IDs (per-component offsets accumulated into one index space) so a
//! pair lookup is two indexings into a dense matrix.
//!
//! Stored per ordered LJ site pair: (ε·24, σ², shift·6), scaled the way the
//! kernel consumes them — 6·U_LJ = ε·24 (s¹² − s⁶) + shift·6 and the force
//! scale is (ε·24 / r²)(2 s¹² − s⁶). Mixing is Lorentz-Berthelot: ε by
//! geometric mean, σ by arithmetic mean. Same-component pairs where either
//! site is flagged solid are zeroed (no LJ interaction between solid atoms
//! of one species).

use crate::error::SimError;

/// Sanity bound on site offsets from the molecular center of mass.
const SITE_OFFSET_BOUND: f64 = 100.0;

/// A Lennard-Jones interaction center.
#[derive(Debug, Clone)]
pub struct LjSite {
    /// Body-frame offset from the center of mass.
    pub offset: [f64; 3],
    /// Well depth ε.
    pub epsilon: f64,
    /// Zero-crossing distance σ.
    pub sigma: f64,
    /// Site mass.
    pub mass: f64,
    /// Solid-atom flag: same-component pairs of solid sites do not interact.
    pub solid: bool,
}

/// A point charge site.
#[derive(Debug, Clone)]
pub struct ChargeSite {
    /// Body-frame offset from the center of mass.
    pub offset: [f64; 3],
    /// Charge magnitude q (units absorb 1/4πε₀).
    pub q: f64,
}

/// A point dipole site.
#[derive(Debug, Clone)]
pub struct DipoleSite {
    /// Body-frame offset from the center of mass.
    pub offset: [f64; 3],
    /// Body-frame unit orientation of the moment.
    pub e_body: [f64; 3],
    /// Dipole moment magnitude μ.
    pub mu: f64,
}

/// A point (linear) quadrupole site.
#[derive(Debug, Clone)]
pub struct QuadrupoleSite {
    /// Body-frame offset from the center of mass.
    pub offset: [f64; 3],
    /// Body-frame unit orientation of the moment axis.
    pub e_body: [f64; 3],
    /// Quadrupole moment magnitude Q.
    pub q_moment: f64,
}

/// One molecule species.
#[derive(Debug, Clone, Default)]
pub struct Component {
    /// LJ interaction centers, in site-ID order.
    pub lj_sites: Vec<LjSite>,
    /// Point charges.
    pub charges: Vec<ChargeSite>,
    /// Point dipoles.
    pub dipoles: Vec<DipoleSite>,
    /// Point quadrupoles.
    pub quadrupoles: Vec<QuadrupoleSite>,
    /// Diagonal body-frame inertia tensor (I₁, I₂, I₃). A zero entry pins
    /// rotation about that axis (point particles never spin).
    pub inertia: [f64; 3],
}

impl Component {
    /// Single centered LJ site, no multipoles.
    #[must_use]
    pub fn single_lj(epsilon: f64, sigma: f64, mass: f64) -> Self {
        Self {
            lj_sites: vec![LjSite {
                offset: [0.0; 3],
                epsilon,
                sigma,
                mass,
                solid: false,
            }],
            ..Self::default()
        }
    }

    /// Stockmayer particle: centered LJ site plus a centered point dipole
    /// oriented along the body z axis.
    #[must_use]
    pub fn stockmayer(epsilon: f64, sigma: f64, mass: f64, mu: f64, inertia: f64) -> Self {
        Self {
            lj_sites: vec![LjSite {
                offset: [0.0; 3],
                epsilon,
                sigma,
                mass,
                solid: false,
            }],
            dipoles: vec![DipoleSite {
                offset: [0.0; 3],
                e_body: [0.0, 0.0, 1.0],
                mu,
            }],
            inertia: [inertia, inertia, inertia],
            ..Self::default()
        }
    }

    /// Total molecular mass (sum of LJ site masses).
    #[must_use]
    pub fn mass(&self) -> f64 {
        self.lj_sites.iter().map(|s| s.mass).sum()
    }

    /// True if the species carries any orientation-dependent site.
    #[must_use]
    pub fn rotates(&self) -> bool {
        !self.dipoles.is_empty() || !self.quadrupoles.is_empty()
    }
}

/// Immutable table of molecule templates and LJ pair parameters.
#[derive(Debug)]
pub struct ComponentRegistry {
    components: Vec<Component>,
    /// Global LJ site-ID offset per component.
    lj_id_offset: Vec<usize>,
    /// Total LJ sites across all components.
    n_lj_global: usize,
    /// Row-major (ε·24, σ²) pairs: eps_sig[2·(row·n + col)..].
    eps_sig: Vec<f64>,
    /// Row-major shift·6 values.
    shift6: Vec<f64>,
}

impl ComponentRegistry {
    /// Build the registry and the dense LJ parameter matrix.
    ///
    /// # Errors
    ///
    /// [`SimError::Config`] if no components are given, the component count
    /// exceeds the `u16` ID space, mixing produces non-finite parameters,
    /// or a site offset exceeds the sanity bound.
    pub fn build(components: Vec<Component>, lj_cutoff: f64) -> Result<Self, SimError> {
        if components.is_empty() {
            return Err(SimError::Config("no components defined".into()));
        }
        if components.len() > usize::from(u16::MAX) {
            return Err(SimError::Config(format!(
                "{} components exceed the 16-bit ID space",
                components.len()
            )));
        }
        if !(lj_cutoff > 0.0) {
            return Err(SimError::Config(format!(
                "LJ cutoff must be positive, got {lj_cutoff}"
            )));
        }

        for (ci, c) in components.iter().enumerate() {
            for off in c
                .lj_sites
                .iter()
                .map(|s| s.offset)
                .chain(c.charges.iter().map(|s| s.offset))
                .chain(c.dipoles.iter().map(|s| s.offset))
                .chain(c.quadrupoles.iter().map(|s| s.offset))
            {
                let d2 = off[0] * off[0] + off[1] * off[1] + off[2] * off[2];
                if !d2.is_finite() || d2.sqrt() > SITE_OFFSET_BOUND {
                    return Err(SimError::Config(format!(
                        "component {ci}: site offset {off:?} exceeds sanity bound"
                    )));
                }
            }
        }

        let mut lj_id_offset = Vec::with_capacity(components.len());
        let mut n_lj_global = 0usize;
        for c in &components {
            lj_id_offset.push(n_lj_global);
            n_lj_global += c.lj_sites.len();
        }

        let rc2 = lj_cutoff * lj_cutoff;
        let mut eps_sig = vec![0.0; 2 * n_lj_global * n_lj_global];
        let mut shift6 = vec![0.0; n_lj_global * n_lj_global];

        for (ci, comp_i) in components.iter().enumerate() {
            for (cj, comp_j) in components.iter().enumerate() {
                for (si, site_i) in comp_i.lj_sites.iter().enumerate() {
                    for (sj, site_j) in comp_j.lj_sites.iter().enumerate() {
                        let row = lj_id_offset[ci] + si;
                        let col = lj_id_offset[cj] + sj;
                        if ci == cj && (site_i.solid || site_j.solid) {
                            continue; // stays zeroed
                        }
                        let eps = (site_i.epsilon * site_j.epsilon).sqrt();
                        let sigma = 0.5 * (site_i.sigma + site_j.sigma);
                        let eps24 = 24.0 * eps;
                        let sig2 = sigma * sigma;
                        let s2c = sig2 / rc2;
                        let s6c = s2c * s2c * s2c;
                        // 6·U at the cutoff is ε·24 (s¹²_c − s⁶_c); the shift
                        // cancels it so the potential vanishes at r_c.
                        let sh6 = eps24 * (s6c - s6c * s6c);
                        if !(eps24.is_finite() && sig2.is_finite() && sh6.is_finite()) {
                            return Err(SimError::Config(format!(
                                "non-finite LJ mixing for components {ci}/{cj} sites {si}/{sj}"
                            )));
                        }
                        eps_sig[2 * (row * n_lj_global + col)] = eps24;
                        eps_sig[2 * (row * n_lj_global + col) + 1] = sig2;
                        shift6[row * n_lj_global + col] = sh6;
                    }
                }
            }
        }

        Ok(Self {
            components,
            lj_id_offset,
            n_lj_global,
            eps_sig,
            shift6,
        })
    }

    /// The component templates, indexed by component ID.
    #[must_use]
    pub fn components(&self) -> &[Component] {
        &self.components
    }

    /// One component by ID.
    #[must_use]
    pub fn component(&self, id: u16) -> &Component {
        &self.components[usize::from(id)]
    }

    /// Global LJ site ID of site `site_idx` of component `comp`.
    #[must_use]
    pub fn lj_site_id(&self, comp: u16, site_idx: usize) -> usize {
        self.lj_id_offset[usize::from(comp)] + site_idx
    }

    /// Total number of LJ sites over all components.
    #[must_use]
    pub const fn n_lj_global(&self) -> usize {
        self.n_lj_global
    }

    /// LJ parameter triple (ε·24, σ², shift·6) for a global site-ID pair.
    #[inline]
    #[must_use]
    pub fn lj_params(&self, id_i: usize, id_j: usize) -> (f64, f64, f64) {
        let k = id_i * self.n_lj_global + id_j;
        (self.eps_sig[2 * k], self.eps_sig[2 * k + 1], self.shift6[k])
    }
}

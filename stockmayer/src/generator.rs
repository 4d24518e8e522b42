// SPDX-License-Identifier: AGPL-3.0-only

//! Cubic-grid scenario generator.
//!
//! Places molecules on two interleaved simple-cubic sublattices (origins at
//! ¼ and ¾ of the spacing, a body-centered layout), assigns deterministic
//! Maxwell-Boltzmann velocities and leaves momentum removal to the caller's
//! global reduction. Every rank walks the full lattice but materializes
//! only the positions it owns, incrementing the molecule id either way so
//! ids are identical for any rank count — velocities are drawn from a
//! per-id stream for the same reason.

use std::f64::consts::PI;

use crate::cellgrid::CellGrid;
use crate::components::ComponentRegistry;
use crate::decomp::Decomposition;
use crate::error::SimError;
use crate::molecule::Molecule;

/// Scenario parameters for the cubic-grid generator.
#[derive(Debug, Clone)]
pub struct CubicGridGenerator {
    /// Requested molecule count (rounded to the lattice).
    pub n_molecules: usize,
    /// Number density; with the count this fixes the box length.
    pub density: f64,
    /// Initial temperature (0 places molecules at rest).
    pub temperature: f64,
    /// Component every molecule instantiates.
    pub component_id: u16,
    /// Velocity stream seed.
    pub seed: u64,
}

impl CubicGridGenerator {
    /// Cubic box edge from count and density.
    #[must_use]
    pub fn box_length(&self) -> f64 {
        (self.n_molecules as f64 / self.density).cbrt()
    }

    /// Validate the scenario parameters.
    ///
    /// # Errors
    ///
    /// [`SimError::ScenarioCorrupt`] for non-physical parameters.
    pub fn validate(&self, registry: &ComponentRegistry) -> Result<(), SimError> {
        if self.n_molecules == 0 {
            return Err(SimError::ScenarioCorrupt("zero molecules requested".into()));
        }
        if !(self.density > 0.0) {
            return Err(SimError::ScenarioCorrupt(format!(
                "non-positive density {}",
                self.density
            )));
        }
        if self.temperature < 0.0 {
            return Err(SimError::ScenarioCorrupt(format!(
                "negative temperature {}",
                self.temperature
            )));
        }
        if usize::from(self.component_id) >= registry.components().len() {
            return Err(SimError::ScenarioCorrupt(format!(
                "component {} not in the registry",
                self.component_id
            )));
        }
        Ok(())
    }

    /// Populate the rank's grid with its share of the lattice; returns the
    /// local molecule count.
    ///
    /// # Errors
    ///
    /// Scenario validation failures surface as
    /// [`SimError::ScenarioCorrupt`].
    pub fn populate(
        &self,
        grid: &mut CellGrid,
        decomp: &dyn Decomposition,
        registry: &ComponentRegistry,
    ) -> Result<usize, SimError> {
        self.validate(registry)?;
        let mass = registry.component(self.component_id).mass();
        let l = self.box_length();
        // Two molecules per lattice site.
        let per_dim = ((self.n_molecules as f64 / 2.0).cbrt().round() as usize).max(1);
        let spacing = l / per_dim as f64;

        let mut placed = 0usize;
        let mut id: u64 = 1;
        for sublattice in 0..2u8 {
            let origin = if sublattice == 0 {
                spacing / 4.0
            } else {
                spacing * 3.0 / 4.0
            };
            for i in 0..per_dim {
                for j in 0..per_dim {
                    for k in 0..per_dim {
                        let pos = [
                            origin + i as f64 * spacing,
                            origin + j as f64 * spacing,
                            origin + k as f64 * spacing,
                        ];
                        if decomp.owns_position(pos) {
                            let v = self.velocity_for(id, mass);
                            grid.insert_owned(Molecule::new(id, self.component_id, pos, v));
                            placed += 1;
                        }
                        // The id advances regardless: some other rank
                        // places this molecule.
                        id += 1;
                    }
                }
            }
        }
        Ok(placed)
    }

    /// Maxwell-Boltzmann velocity for one molecule id: a deterministic
    /// per-id stream so any rank count generates identical scenarios.
    fn velocity_for(&self, id: u64, mass: f64) -> [f64; 3] {
        if self.temperature == 0.0 || mass <= 0.0 {
            return [0.0; 3];
        }
        let sigma = (self.temperature / mass).sqrt();
        let mut state = self
            .seed
            .wrapping_mul(0x9E37_79B9_7F4A_7C15)
            .wrapping_add(id.wrapping_mul(0xD1B5_4A32_D192_ED03));
        let mut next = move || -> f64 {
            state = state
                .wrapping_mul(6_364_136_223_846_793_005)
                .wrapping_add(1_442_695_040_888_963_407);
            (state >> 33) as f64 / f64::from(1u32 << 31)
        };
        let mut v = [0.0; 3];
        for vd in &mut v {
            // Box-Muller
            let u1 = next().max(1e-15);
            let u2 = next();
            *vd = sigma * (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos();
        }
        v
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::components::Component;
    use crate::decomp::SequentialDecomposition;

    fn registry() -> ComponentRegistry {
        ComponentRegistry::build(vec![Component::single_lj(1.0, 1.0, 1.0)], 2.5).unwrap()
    }

    fn generator(n: usize, t: f64) -> CubicGridGenerator {
        CubicGridGenerator {
            n_molecules: n,
            density: 0.5,
            temperature: t,
            component_id: 0,
            seed: 42,
        }
    }

    #[test]
    fn lattice_count_and_bounds() {
        let registry = registry();
        let g = generator(128, 0.0);
        let l = g.box_length();
        let decomp = SequentialDecomposition::new([l; 3], 2.5);
        let mut grid = CellGrid::new([0.0; 3], [l; 3], 2.5).unwrap();
        let n = g.populate(&mut grid, &decomp, &registry).unwrap();
        assert_eq!(n, 128, "4³ sites × 2 sublattices");
        grid.for_each_owned(|m| {
            for d in 0..3 {
                assert!(m.r[d] > 0.0 && m.r[d] < l);
            }
        });
    }

    #[test]
    fn zero_temperature_means_zero_velocities() {
        let registry = registry();
        let g = generator(16, 0.0);
        let l = g.box_length();
        let decomp = SequentialDecomposition::new([l; 3], 1.0);
        let mut grid = CellGrid::new([0.0; 3], [l; 3], 1.0).unwrap();
        g.populate(&mut grid, &decomp, &registry).unwrap();
        grid.for_each_owned(|m| assert_eq!(m.v, [0.0; 3]));
    }

    #[test]
    fn velocities_are_per_id_deterministic() {
        let g = generator(16, 1.5);
        let v1 = g.velocity_for(7, 1.0);
        let v2 = g.velocity_for(7, 1.0);
        let v3 = g.velocity_for(8, 1.0);
        assert_eq!(v1, v2);
        assert_ne!(v1, v3);
    }

    #[test]
    fn velocity_distribution_is_sane() {
        // Mean ≈ 0, variance ≈ T/m per component over many draws.
        let g = generator(16, 2.0);
        let n = 2000;
        let mut sum = 0.0;
        let mut sum2 = 0.0;
        for id in 0..n {
            let v = g.velocity_for(id, 1.0);
            sum += v[0];
            sum2 += v[0] * v[0];
        }
        let mean = sum / n as f64;
        let var = sum2 / n as f64 - mean * mean;
        assert!(mean.abs() < 0.1, "mean = {mean}");
        assert!((var - 2.0).abs() < 0.2, "var = {var}");
    }

    #[test]
    fn corrupt_parameters_are_refused() {
        let registry = registry();
        assert!(generator(0, 0.0).validate(&registry).is_err());
        let mut g = generator(16, 0.0);
        g.density = -1.0;
        assert!(g.validate(&registry).is_err());
        let mut g = generator(16, 0.0);
        g.component_id = 5;
        let err = g.validate(&registry).unwrap_err();
        assert_eq!(err.exit_code(), crate::error::EXIT_SCENARIO_CORRUPT);
    }
}

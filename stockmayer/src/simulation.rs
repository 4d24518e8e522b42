// SPDX-License-Identifier: AGPL-3.0-only

//! Per-step orchestration and the run loop.
//!
//! A step performs, in order: integrator drift (first half-kick + position
//! update), molecule exchange (leavers migrate, halos fill), force
//! traversal over the refreshed cells, halo cleanup, the second half-kick
//! with the rigid-body rotation, the global reduction of macroscopic sums,
//! thermostat scaling, and the output callbacks. The optional overlapped
//! mode splits the halo exchange into stages and computes the inner cells
//! while messages are in flight.
//!
//! All collaborators are explicit — registry, domain, decomposition, grid
//! and integrator travel through the simulation struct, never through
//! globals.

use std::time::Instant;

use log::warn;

use crate::cellgrid::CellGrid;
use crate::components::ComponentRegistry;
use crate::decomp::{wrap_position, Decomposition, MessageType};
use crate::domain::Domain;
use crate::error::SimError;
use crate::integrator::Leapfrog;
use crate::io::phase_space::PhaseSpaceData;
use crate::io::writers::{OutputPlugin, RunSummary};
use crate::kernel::PairKernel;
use crate::molecule::Molecule;
use crate::observables::EnergyRecord;
use crate::traversal::{CellFilter, Traversal};

/// One rank's simulation: state, collaborators and the run loop.
pub struct Simulation {
    /// Immutable molecule templates and LJ parameters.
    pub registry: ComponentRegistry,
    /// Global box and macroscopic state.
    pub domain: Domain,
    /// Spatial decomposition of this rank.
    pub decomp: Box<dyn Decomposition>,
    /// Cell grid over this rank's subdomain.
    pub grid: CellGrid,
    /// Leapfrog integrator.
    pub integrator: Leapfrog,
    /// Overlap inner-cell computation with the staged halo exchange.
    pub overlap_exchange: bool,
    /// Console row interval (steps); 0 silences the loop.
    pub console_interval: usize,
    /// Completed steps.
    pub step_index: usize,
    /// Per-step energy records.
    pub energy_history: Vec<EnergyRecord>,

    traversal: Traversal,
    plugins: Vec<Box<dyn OutputPlugin>>,
    started: Option<Instant>,
}

impl Simulation {
    /// Assemble a simulation from its collaborators.
    ///
    /// # Errors
    ///
    /// Grid construction fails for subdomains below one cutoff.
    pub fn new(
        registry: ComponentRegistry,
        domain: Domain,
        decomp: Box<dyn Decomposition>,
        dt: f64,
    ) -> Result<Self, SimError> {
        let (lo, hi) = decomp.bounding_box();
        let grid = CellGrid::new(lo, hi, domain.cutoff)?;
        Ok(Self {
            registry,
            domain,
            decomp,
            grid,
            integrator: Leapfrog::new(dt),
            overlap_exchange: false,
            console_interval: 1000,
            step_index: 0,
            energy_history: Vec::new(),
            traversal: Traversal::new(),
            plugins: Vec::new(),
            started: None,
        })
    }

    /// Register an output plug-in.
    pub fn add_plugin(&mut self, plugin: Box<dyn OutputPlugin>) {
        self.plugins.push(plugin);
    }

    /// Install molecules from a phase-space table: this rank keeps what it
    /// owns (positions wrapped into the global box first).
    pub fn insert_molecules(&mut self, molecules: Vec<Molecule>) -> usize {
        let mut placed = 0;
        for mut m in molecules {
            m.r = wrap_position(m.r, self.domain.length);
            if self.decomp.owns_position(m.r) {
                self.grid.insert_owned(m);
                placed += 1;
            }
        }
        placed
    }

    /// Export this rank's state for checkpointing or inspection.
    #[must_use]
    pub fn phase_space(&self) -> PhaseSpaceData {
        let mut molecules = Vec::with_capacity(self.grid.n_owned());
        self.grid.for_each_owned(|m| molecules.push(m.clone()));
        molecules.sort_by_key(|m| m.id);
        PhaseSpaceData {
            time: self.domain.time(),
            length: self.domain.length,
            components: self.registry.components().to_vec(),
            molecules,
        }
    }

    #[allow(clippy::unnecessary_wraps)] // symmetry with the overlapped path
    fn compute_forces(&mut self) -> Result<(), SimError> {
        let kernel = PairKernel::new(
            &self.registry,
            self.domain.cutoff,
            self.domain.lj_cutoff,
            self.domain.rf_prefactor(),
        );
        let acc = self.traversal.run(&mut self.grid, &kernel, &self.registry);
        self.domain.set_local_sums(acc);
        Ok(())
    }

    /// Exchange with the inner cells computed while halo messages are in
    /// flight: leavers migrate first (blocking, with re-binning), then the
    /// halo stages interleave with the inner traversal.
    fn exchange_and_compute_overlapped(&mut self) -> Result<(), SimError> {
        self.decomp
            .exchange_molecules(&mut self.grid, MessageType::LeavingOnly)?;

        let kernel = PairKernel::new(
            &self.registry,
            self.domain.cutoff,
            self.domain.lj_cutoff,
            self.domain.rf_prefactor(),
        );
        let mut acc = crate::kernel::MacroAccum::default();
        let stages = self.decomp.stage_count();
        for stage in 0..stages {
            self.decomp
                .stage_init(&mut self.grid, stage, MessageType::HaloCopies)?;
            if stage == 0 {
                self.traversal
                    .begin_subset(&self.grid, &self.registry, CellFilter::InnerOnly);
                let inner = self
                    .traversal
                    .compute(&self.grid, &kernel, CellFilter::InnerOnly);
                acc.merge(&inner);
            }
            self.decomp
                .stage_finish(&mut self.grid, stage, MessageType::HaloCopies)?;
        }
        self.grid.update();

        self.traversal
            .begin_subset(&self.grid, &self.registry, CellFilter::OuterOnly);
        let outer = self
            .traversal
            .compute(&self.grid, &kernel, CellFilter::OuterOnly);
        acc.merge(&outer);
        self.traversal.finish(&mut self.grid);
        self.domain.set_local_sums(acc);
        Ok(())
    }

    /// Initial force computation so step 1 starts from consistent forces
    /// and observables.
    ///
    /// # Errors
    ///
    /// Exchange and reduction failures propagate.
    pub fn init(&mut self) -> Result<(), SimError> {
        self.started = Some(Instant::now());
        self.grid.clear_halo();
        self.decomp
            .exchange_molecules(&mut self.grid, MessageType::LeavingAndHaloCopies)?;
        self.compute_forces()?;
        self.grid.clear_halo();
        self.domain.calculate_global_values(
            self.decomp.as_ref(),
            &self.grid,
            &self.registry,
            self.integrator.dt,
        )?;
        self.record_energy();

        let mut failed = Vec::new();
        for (i, p) in self.plugins.iter_mut().enumerate() {
            if let Err(e) = p.init(&self.domain) {
                warn!("output plugin {} failed to initialize: {e}; disabled", p.name());
                failed.push(i);
            }
        }
        for i in failed.into_iter().rev() {
            self.plugins.remove(i);
        }
        Ok(())
    }

    /// Advance the simulation by one step.
    ///
    /// # Errors
    ///
    /// Numeric failures (NaN forces), exchange deadlocks and reduction
    /// timeouts abort the step.
    pub fn step(&mut self) -> Result<(), SimError> {
        self.integrator
            .event_new_timestep(&mut self.grid, &self.registry)?;

        if self.overlap_exchange {
            self.exchange_and_compute_overlapped()?;
        } else {
            self.decomp
                .exchange_molecules(&mut self.grid, MessageType::LeavingAndHaloCopies)?;
            self.compute_forces()?;
        }

        self.grid.clear_halo();
        self.integrator
            .event_forces_calculated(&mut self.grid, &self.registry)?;
        self.domain.calculate_global_values(
            self.decomp.as_ref(),
            &self.grid,
            &self.registry,
            self.integrator.dt,
        )?;
        Leapfrog::scale_velocities(
            &mut self.grid,
            self.domain.beta_trans(),
            self.domain.beta_rot(),
        );
        self.domain.advance_time(self.integrator.dt);
        self.step_index += 1;
        self.record_energy();
        self.output();
        Ok(())
    }

    /// Run `init` plus `n_steps` steps, then flush the plug-ins.
    ///
    /// # Errors
    ///
    /// First failing step aborts the run.
    pub fn run(&mut self, n_steps: usize) -> Result<RunSummary, SimError> {
        self.init()?;
        for _ in 0..n_steps {
            self.step()?;
            if self.console_interval > 0
                && self.decomp.rank() == 0
                && self.step_index % self.console_interval == 0
            {
                println!(
                    "    Step {}: T*={:.6}, U/N={:.6}, p={:.6}",
                    self.step_index,
                    self.domain.global_temperature(),
                    self.domain.average_upot(),
                    self.domain.global_pressure()
                );
            }
        }
        self.finish()
    }

    /// Flush plug-ins and produce the run summary.
    ///
    /// # Errors
    ///
    /// Plug-in flush failures are logged, not fatal; the summary itself
    /// cannot fail.
    pub fn finish(&mut self) -> Result<RunSummary, SimError> {
        for p in &mut self.plugins {
            if let Err(e) = p.finish(
                &self.grid,
                self.decomp.as_ref(),
                &self.domain,
                &self.registry,
            ) {
                warn!("output plugin {} failed to finish: {e}", p.name());
            }
        }
        let wall = self
            .started
            .map_or(0.0, |t| t.elapsed().as_secs_f64())
            .max(1e-9);
        Ok(RunSummary {
            steps: self.step_index,
            n_molecules: self.domain.global_n(),
            final_upot_per_molecule: self.domain.average_upot(),
            final_pressure: self.domain.global_pressure(),
            final_temperature: self.domain.global_temperature(),
            wall_time_s: wall,
            steps_per_sec: self.step_index as f64 / wall,
        })
    }

    fn record_energy(&mut self) {
        let ke = self.domain.global_kinetic();
        let pe = self.domain.global_upot();
        self.energy_history.push(EnergyRecord {
            step: self.step_index,
            ke,
            pe,
            total: ke + pe,
            temperature: self.domain.global_temperature(),
            pressure: self.domain.global_pressure(),
        });
    }

    fn output(&mut self) {
        let mut failed = Vec::new();
        for (i, p) in self.plugins.iter_mut().enumerate() {
            if let Err(e) = p.do_output(
                self.step_index,
                &self.grid,
                self.decomp.as_ref(),
                &self.domain,
                &self.registry,
            ) {
                warn!("output plugin {} failed: {e}; disabled for the rest of the run", p.name());
                failed.push(i);
            }
        }
        for i in failed.into_iter().rev() {
            self.plugins.remove(i);
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::components::Component;
    use crate::decomp::SequentialDecomposition;
    use crate::generator::CubicGridGenerator;

    fn lattice_sim(n: usize, temperature: f64) -> Simulation {
        let registry =
            ComponentRegistry::build(vec![Component::single_lj(1.0, 1.0, 1.0)], 2.5).unwrap();
        let generator = CubicGridGenerator {
            n_molecules: n,
            density: 0.3,
            temperature,
            component_id: 0,
            seed: 42,
        };
        let l = generator.box_length();
        let domain = Domain::new([l; 3], 2.5, 2.5).unwrap();
        let decomp = SequentialDecomposition::new([l; 3], 2.5);
        let mut sim = Simulation::new(registry, domain, Box::new(decomp), 0.002).unwrap();
        sim.console_interval = 0;
        let placed = generator
            .populate(&mut sim.grid, sim.decomp.as_ref(), &sim.registry)
            .unwrap();
        assert_eq!(placed, n);
        sim
    }

    #[test]
    fn init_produces_consistent_observables() {
        let mut sim = lattice_sim(54, 0.0);
        sim.init().unwrap();
        assert_eq!(sim.domain.global_n(), 54);
        assert_eq!(sim.energy_history.len(), 1);
        assert!(sim.energy_history[0].pe.is_finite());
        assert_eq!(sim.energy_history[0].ke, 0.0, "cold start");
    }

    #[test]
    fn steps_advance_time_and_history() {
        let mut sim = lattice_sim(54, 0.5);
        sim.init().unwrap();
        for _ in 0..5 {
            sim.step().unwrap();
        }
        assert_eq!(sim.step_index, 5);
        assert!((sim.domain.time() - 5.0 * 0.002).abs() < 1e-12);
        assert_eq!(sim.energy_history.len(), 6);
    }

    #[test]
    fn overlapped_step_matches_plain_step() {
        let run = |overlap: bool| -> (f64, f64) {
            let mut sim = lattice_sim(54, 0.5);
            sim.overlap_exchange = overlap;
            sim.init().unwrap();
            for _ in 0..3 {
                sim.step().unwrap();
            }
            (sim.domain.global_upot(), sim.domain.global_virial())
        };
        let (u_plain, w_plain) = run(false);
        let (u_over, w_over) = run(true);
        assert!(
            (u_plain - u_over).abs() < 1e-9 * u_plain.abs().max(1.0),
            "U: {u_plain} vs {u_over}"
        );
        assert!((w_plain - w_over).abs() < 1e-9 * w_plain.abs().max(1.0));
    }

    #[test]
    fn momentum_stays_removed_without_thermostat() {
        let mut sim = lattice_sim(54, 1.0);
        sim.init().unwrap();
        sim.domain
            .remove_momentum(sim.decomp.as_ref(), &mut sim.grid, &sim.registry)
            .unwrap();
        for _ in 0..10 {
            sim.step().unwrap();
        }
        let mut p = [0.0; 3];
        sim.grid.for_each_owned(|m| {
            for d in 0..3 {
                p[d] += m.v[d];
            }
        });
        let pmag = (p[0] * p[0] + p[1] * p[1] + p[2] * p[2]).sqrt();
        assert!(pmag < 1e-9, "total momentum drifted to {pmag}");
    }
}

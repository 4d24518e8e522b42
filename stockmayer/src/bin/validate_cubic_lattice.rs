// SPDX-License-Identifier: AGPL-3.0-only

//! Cold simple-cubic lattice equilibrium.
//!
//! 512 LJ particles (ε = σ = 1) on a simple cubic grid of spacing 1.0,
//! cutoff 2.5, no initial velocities. One Leapfrog step at dt = 1e-5:
//! every lattice force cancels by symmetry, so molecules must remain at
//! their grid points and per-molecule forces stay below 1e-6.

use stockmayer::components::{Component, ComponentRegistry};
use stockmayer::decomp::SequentialDecomposition;
use stockmayer::domain::Domain;
use stockmayer::molecule::Molecule;
use stockmayer::simulation::Simulation;
use stockmayer::tolerances;
use stockmayer::validation::ValidationHarness;

fn main() {
    env_logger::init();
    println!("── Cubic lattice equilibrium (512 molecules) ──");

    let n_per_dim = 8usize;
    let spacing = 1.0;
    let l = n_per_dim as f64 * spacing;
    let rc = 2.5;

    let result = (|| -> Result<(Vec<f64>, Vec<[f64; 3]>, Vec<[f64; 3]>), stockmayer::error::SimError> {
        let registry = ComponentRegistry::build(vec![Component::single_lj(1.0, 1.0, 1.0)], rc)?;
        let domain = Domain::new([l; 3], rc, rc)?;
        let decomp = SequentialDecomposition::new([l; 3], rc);
        let mut sim = Simulation::new(registry, domain, Box::new(decomp), 1e-5)?;
        sim.console_interval = 0;

        let mut expected = Vec::new();
        let mut id = 1u64;
        for i in 0..n_per_dim {
            for j in 0..n_per_dim {
                for k in 0..n_per_dim {
                    let pos = [
                        (i as f64 + 0.5) * spacing,
                        (j as f64 + 0.5) * spacing,
                        (k as f64 + 0.5) * spacing,
                    ];
                    expected.push(pos);
                    sim.grid.insert_owned(Molecule::new(id, 0, pos, [0.0; 3]));
                    id += 1;
                }
            }
        }

        sim.init()?;
        let mut forces = Vec::new();
        sim.grid.for_each_owned(|m| {
            forces.push((m.f[0] * m.f[0] + m.f[1] * m.f[1] + m.f[2] * m.f[2]).sqrt());
        });

        sim.step()?;
        let mut positions = Vec::new();
        sim.grid.for_each_owned(|m| positions.push(m.r));
        Ok((forces, expected, positions))
    })();

    let (forces, expected, positions) = match result {
        Ok(v) => v,
        Err(e) => {
            eprintln!("validate_cubic_lattice: {e}");
            std::process::exit(e.exit_code());
        }
    };

    let mut h = ValidationHarness::new("cubic_lattice");
    h.check_abs("molecule count", positions.len() as f64, 512.0, 0.0);

    let max_force = forces.iter().fold(0.0f64, |a, &b| a.max(b));
    h.check_upper(
        "max per-molecule |F| on the lattice",
        max_force,
        tolerances::LATTICE_FORCE_ABS,
    );

    // After one tiny step every molecule sits where it started, up to the
    // residual-force displacement ~ ½ |F| dt² / m.
    let mut max_disp = 0.0f64;
    for pos in &positions {
        let mut best = f64::INFINITY;
        for exp in &expected {
            let d2 = (0..3).map(|d| (pos[d] - exp[d]).powi(2)).sum::<f64>();
            best = best.min(d2);
        }
        max_disp = max_disp.max(best.sqrt());
    }
    h.check_upper("max displacement from grid points", max_disp, 1e-12);

    h.finish();
}

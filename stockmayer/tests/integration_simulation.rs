// SPDX-License-Identifier: AGPL-3.0-only

//! Integration tests: the simulation loop.
//!
//! Conservation laws over real runs — the cold-lattice equilibrium, the
//! micro-canonical energy drift bound and momentum conservation — plus the
//! thermostat pull toward its target.

use stockmayer::components::{Component, ComponentRegistry};
use stockmayer::decomp::SequentialDecomposition;
use stockmayer::domain::Domain;
use stockmayer::generator::CubicGridGenerator;
use stockmayer::molecule::Molecule;
use stockmayer::observables::validate_energy;
use stockmayer::simulation::Simulation;
use stockmayer::tolerances;

fn fluid_simulation(n: usize, density: f64, temperature: f64, dt: f64) -> Simulation {
    let registry =
        ComponentRegistry::build(vec![Component::single_lj(1.0, 1.0, 1.0)], 2.5).expect("registry");
    let generator = CubicGridGenerator {
        n_molecules: n,
        density,
        temperature,
        component_id: 0,
        seed: 11,
    };
    let l = generator.box_length();
    let domain = Domain::new([l; 3], 2.5, 2.5).expect("domain");
    let decomp = SequentialDecomposition::new([l; 3], 2.5);
    let mut sim = Simulation::new(registry, domain, Box::new(decomp), dt).expect("simulation");
    sim.console_interval = 0;
    generator
        .populate(&mut sim.grid, sim.decomp.as_ref(), &sim.registry)
        .expect("populate");
    sim.domain
        .remove_momentum(sim.decomp.as_ref(), &mut sim.grid, &sim.registry)
        .expect("momentum removal");
    sim
}

#[test]
fn cold_cubic_lattice_stays_at_rest() {
    // 512 molecules on a simple cubic lattice of spacing 1.0, no initial
    // velocities: all forces cancel by symmetry, nothing moves.
    let registry =
        ComponentRegistry::build(vec![Component::single_lj(1.0, 1.0, 1.0)], 2.5).expect("registry");
    let l = 8.0;
    let domain = Domain::new([l; 3], 2.5, 2.5).expect("domain");
    let decomp = SequentialDecomposition::new([l; 3], 2.5);
    let mut sim = Simulation::new(registry, domain, Box::new(decomp), 1e-5).expect("simulation");
    sim.console_interval = 0;

    let mut id = 1u64;
    let mut expected = Vec::new();
    for i in 0..8 {
        for j in 0..8 {
            for k in 0..8 {
                let pos = [
                    f64::from(i) + 0.5,
                    f64::from(j) + 0.5,
                    f64::from(k) + 0.5,
                ];
                expected.push(pos);
                sim.grid.insert_owned(Molecule::new(id, 0, pos, [0.0; 3]));
                id += 1;
            }
        }
    }

    sim.init().expect("init");
    let mut max_f: f64 = 0.0;
    sim.grid.for_each_owned(|m| {
        max_f = max_f.max((m.f[0] * m.f[0] + m.f[1] * m.f[1] + m.f[2] * m.f[2]).sqrt());
    });
    assert!(
        max_f < tolerances::LATTICE_FORCE_ABS,
        "lattice force residual {max_f}"
    );

    sim.step().expect("step");
    let mut max_disp: f64 = 0.0;
    let mut idx = 0;
    sim.grid.for_each_owned(|m| {
        // Owned iteration order is cell order, so match by id.
        let exp = expected[(m.id - 1) as usize];
        for d in 0..3 {
            max_disp = max_disp.max((m.r[d] - exp[d]).abs());
        }
        idx += 1;
    });
    assert_eq!(idx, 512);
    assert!(max_disp < 1e-12, "lattice moved by {max_disp}");
}

#[test]
fn microcanonical_energy_is_conserved() {
    // N ≥ 500 steps at dt ≤ 0.005: relative drift below 1e-3.
    let mut sim = fluid_simulation(128, 0.45, 0.7, 0.005);
    sim.init().expect("init");
    for _ in 0..500 {
        sim.step().expect("step");
    }
    let validation = validate_energy(&sim.energy_history, tolerances::ENERGY_DRIFT_REL);
    assert!(
        validation.passed,
        "energy drift {} over 500 steps (mean E = {})",
        validation.drift_rel, validation.mean_total
    );
}

#[test]
fn momentum_is_conserved_over_a_run() {
    let mut sim = fluid_simulation(128, 0.4, 0.8, 0.004);
    sim.init().expect("init");
    let steps = 200;
    for _ in 0..steps {
        sim.step().expect("step");
    }
    let mut p = [0.0f64; 3];
    let mut vmax: f64 = 0.0;
    let mut n = 0usize;
    sim.grid.for_each_owned(|m| {
        for d in 0..3 {
            p[d] += m.v[d];
            vmax = vmax.max(m.v[d].abs());
        }
        n += 1;
    });
    let pmag = (p[0] * p[0] + p[1] * p[1] + p[2] * p[2]).sqrt();
    let bound = tolerances::MOMENTUM_PER_STEP_ABS * n as f64 * steps as f64 * vmax.max(1.0);
    assert!(pmag < bound, "momentum {pmag} exceeds bound {bound}");
}

#[test]
fn thermostat_pulls_toward_target() {
    let mut sim = fluid_simulation(128, 0.4, 0.2, 0.004);
    sim.domain.target_temperature = Some(1.0);
    sim.domain.thermostat_tau = 20.0;
    sim.init().expect("init");
    for _ in 0..400 {
        sim.step().expect("step");
    }
    let t = sim.domain.global_temperature();
    assert!(
        (t - 1.0).abs() < 0.35,
        "temperature {t} should approach the 1.0 target"
    );
}

#[test]
fn stockmayer_fluid_runs_with_rotation() {
    // A small dipolar liquid with the conducting reaction field: the run
    // must stay finite and keep quaternions normalized.
    let registry = ComponentRegistry::build(
        vec![Component::stockmayer(1.0, 1.0, 1.0, 1.0, 0.025)],
        2.5,
    )
    .expect("registry");
    let generator = CubicGridGenerator {
        n_molecules: 54,
        density: 0.3,
        temperature: 1.5,
        component_id: 0,
        seed: 5,
    };
    let l = generator.box_length();
    let domain = Domain::new([l; 3], 2.5, 2.5).expect("domain");
    let decomp = SequentialDecomposition::new([l; 3], 2.5);
    let mut sim = Simulation::new(registry, domain, Box::new(decomp), 0.002).expect("simulation");
    sim.console_interval = 0;
    generator
        .populate(&mut sim.grid, sim.decomp.as_ref(), &sim.registry)
        .expect("populate");

    sim.init().expect("init");
    for _ in 0..100 {
        sim.step().expect("step");
    }
    let mut checked = 0;
    sim.grid.for_each_owned(|m| {
        assert!(
            (m.q.norm_sq() - 1.0).abs() < tolerances::QUATERNION_NORM_ABS,
            "quaternion drifted"
        );
        assert!(m.v2().is_finite());
        checked += 1;
    });
    assert_eq!(checked, 54);
    assert!(sim.domain.global_upot().is_finite());
    assert!(sim.domain.global_kinetic() > 0.0, "rotation carries energy");
}

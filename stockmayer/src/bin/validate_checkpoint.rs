// SPDX-License-Identifier: AGPL-3.0-only

//! Checkpoint idempotence.
//!
//! Run 10 steps and write a checkpoint; restart from it and run 10 more;
//! the final state must match an uninterrupted 20-step run bit-exactly.
//! The deterministic (sequential) traversal order makes this exact, and
//! the phase-space format round-trips every float.

use stockmayer::components::{Component, ComponentRegistry};
use stockmayer::decomp::SequentialDecomposition;
use stockmayer::domain::Domain;
use stockmayer::error::SimError;
use stockmayer::generator::CubicGridGenerator;
use stockmayer::io::phase_space::{
    components_match, format_phase_space, parse_phase_space, PhaseSpaceData,
};
use stockmayer::simulation::Simulation;
use stockmayer::validation::ValidationHarness;

const RC: f64 = 2.5;

fn fresh_simulation() -> Result<Simulation, SimError> {
    let registry = ComponentRegistry::build(vec![Component::single_lj(1.0, 1.0, 1.0)], RC)?;
    let generator = CubicGridGenerator {
        n_molecules: 128,
        density: 0.4,
        temperature: 1.0,
        component_id: 0,
        seed: 2024,
    };
    let l = generator.box_length();
    let domain = Domain::new([l; 3], RC, RC)?;
    let decomp = SequentialDecomposition::new([l; 3], RC);
    let mut sim = Simulation::new(registry, domain, Box::new(decomp), 0.002)?;
    sim.console_interval = 0;
    generator.populate(&mut sim.grid, sim.decomp.as_ref(), &sim.registry)?;
    Ok(sim)
}

fn resume_simulation(data: PhaseSpaceData) -> Result<Simulation, SimError> {
    let registry = ComponentRegistry::build(data.components.clone(), RC)?;
    let mut domain = Domain::new(data.length, RC, RC)?;
    domain.set_time(data.time);
    let decomp = SequentialDecomposition::new(data.length, RC);
    let mut sim = Simulation::new(registry, domain, Box::new(decomp), 0.002)?;
    sim.console_interval = 0;
    sim.insert_molecules(data.molecules);
    Ok(sim)
}

fn run(sim: &mut Simulation, steps: usize) -> Result<(), SimError> {
    sim.init()?;
    for _ in 0..steps {
        sim.step()?;
    }
    Ok(())
}

fn main() {
    env_logger::init();
    println!("── Checkpoint idempotence (10 + 10 vs 20 steps) ──");
    let mut h = ValidationHarness::new("checkpoint");

    let result = (|| -> Result<(PhaseSpaceData, PhaseSpaceData, String, String), SimError> {
        // Interrupted run: 10 steps, checkpoint, restart, 10 more.
        let mut first = fresh_simulation()?;
        run(&mut first, 10)?;
        let checkpoint = first.phase_space();
        let checkpoint_text = format_phase_space(&checkpoint);
        let restored = parse_phase_space(&checkpoint_text)?;

        if !components_match(&restored.components, checkpoint.components.as_slice()) {
            return Err(SimError::Config(
                "restored component table does not match".into(),
            ));
        }

        let mut second = resume_simulation(restored)?;
        run(&mut second, 10)?;
        let resumed_final = second.phase_space();

        // Uninterrupted run: 20 steps.
        let mut reference = fresh_simulation()?;
        run(&mut reference, 20)?;
        let reference_final = reference.phase_space();

        Ok((
            resumed_final.clone(),
            reference_final.clone(),
            format_phase_space(&resumed_final),
            format_phase_space(&reference_final),
        ))
    })();

    let (resumed, reference, resumed_text, reference_text) = match result {
        Ok(v) => v,
        Err(e) => {
            eprintln!("validate_checkpoint: {e}");
            std::process::exit(e.exit_code());
        }
    };

    h.check_abs(
        "molecule counts match",
        resumed.molecules.len() as f64,
        reference.molecules.len() as f64,
        0.0,
    );
    h.check_abs(
        "simulation times match",
        resumed.time,
        reference.time,
        0.0,
    );

    let mut bit_exact = true;
    let mut worst = 0.0f64;
    for (a, b) in resumed.molecules.iter().zip(reference.molecules.iter()) {
        if a.id != b.id {
            bit_exact = false;
            break;
        }
        for d in 0..3 {
            if a.r[d].to_bits() != b.r[d].to_bits() || a.v[d].to_bits() != b.v[d].to_bits() {
                bit_exact = false;
                worst = worst.max((a.r[d] - b.r[d]).abs());
            }
        }
    }
    h.check_bool("positions and velocities are bit-exact", bit_exact);
    if !bit_exact {
        println!("    worst position deviation: {worst:.3e}");
    }
    h.check_bool(
        "serialized states are byte-identical",
        resumed_text == reference_text,
    );

    h.finish();
}

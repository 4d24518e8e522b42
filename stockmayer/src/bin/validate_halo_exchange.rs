// SPDX-License-Identifier: AGPL-3.0-only

//! Two-rank halo exchange: ownership migration, halo consistency and
//! deadlock detection.
//!
//! A particle drifts 0.6 cells past the rank boundary in one step: after
//! the exchange it must reside only on the new owner with its id intact,
//! and the two-rank energies must match a single-rank reference run. A
//! silent neighbor must trip the deadlock detector within the configured
//! timeout.

use std::time::Instant;

use stockmayer::cellgrid::CellGrid;
use stockmayer::components::{Component, ComponentRegistry};
use stockmayer::decomp::{
    CartesianDecomposition, Decomposition, MessageType, RankTopology, SequentialDecomposition,
};
use stockmayer::domain::Domain;
use stockmayer::error::SimError;
use stockmayer::molecule::Molecule;
use stockmayer::simulation::Simulation;
use stockmayer::tolerances;
use stockmayer::validation::ValidationHarness;

use stockmayer::decomp::cartesian::ExchangeScheme;

const L: f64 = 20.0;
const RC: f64 = 2.5;

fn two_rank_energies(n_steps: usize) -> Result<(f64, f64, usize), SimError> {
    let topo = RankTopology::new(2);
    let registry_for = || {
        ComponentRegistry::build(vec![Component::single_lj(1.0, 1.0, 1.0)], RC)
    };

    let run_rank = |rank: usize| -> Result<(f64, f64, usize), SimError> {
        let registry = registry_for()?;
        let mut domain = Domain::new([L, 10.0, 10.0], RC, RC)?;
        domain.target_temperature = None;
        let decomp = CartesianDecomposition::new(
            &topo,
            rank,
            [2, 1, 1],
            [L, 10.0, 10.0],
            RC,
            ExchangeScheme::FullShell,
        )?;
        let mut sim = Simulation::new(registry, domain, Box::new(decomp), 0.002)?;
        sim.console_interval = 0;
        sim.insert_molecules(scenario_molecules());
        sim.init()?;
        for _ in 0..n_steps {
            sim.step()?;
        }
        Ok((
            sim.domain.global_upot(),
            sim.domain.global_virial(),
            sim.domain.global_n(),
        ))
    };

    let (a, b) = std::thread::scope(|s| {
        let ta = s.spawn(|| run_rank(0));
        let tb = s.spawn(|| run_rank(1));
        (
            ta.join().unwrap_or_else(|_| Err(SimError::Numeric("rank 0 panicked".into()))),
            tb.join().unwrap_or_else(|_| Err(SimError::Numeric("rank 1 panicked".into()))),
        )
    });
    let a = a?;
    let b = b?;
    // Reduced values agree on every rank.
    debug_assert!((a.0 - b.0).abs() < 1e-12);
    Ok(a)
}

/// Deterministic scenario: a jittered lattice over the 20×10×10 box.
fn scenario_molecules() -> Vec<Molecule> {
    let mut out = Vec::new();
    let mut seed = 99u64;
    let mut next = move || {
        seed = seed.wrapping_mul(6_364_136_223_846_793_005).wrapping_add(1);
        (seed >> 33) as f64 / f64::from(1u32 << 31)
    };
    let mut id = 1u64;
    for i in 0..12 {
        for j in 0..6 {
            for k in 0..6 {
                let pos = [
                    0.9 + 1.55 * f64::from(i) + 0.2 * next(),
                    0.8 + 1.55 * f64::from(j) + 0.2 * next(),
                    0.8 + 1.55 * f64::from(k) + 0.2 * next(),
                ];
                let vel = [next() - 0.5, next() - 0.5, next() - 0.5];
                out.push(Molecule::new(id, 0, pos, vel));
                id += 1;
            }
        }
    }
    out
}

fn single_rank_energies(n_steps: usize) -> Result<(f64, f64, usize), SimError> {
    let registry = ComponentRegistry::build(vec![Component::single_lj(1.0, 1.0, 1.0)], RC)?;
    let domain = Domain::new([L, 10.0, 10.0], RC, RC)?;
    let decomp = SequentialDecomposition::new([L, 10.0, 10.0], RC);
    let mut sim = Simulation::new(registry, domain, Box::new(decomp), 0.002)?;
    sim.console_interval = 0;
    sim.insert_molecules(scenario_molecules());
    sim.init()?;
    for _ in 0..n_steps {
        sim.step()?;
    }
    Ok((
        sim.domain.global_upot(),
        sim.domain.global_virial(),
        sim.domain.global_n(),
    ))
}

fn main() {
    env_logger::init();
    println!("── Halo exchange: migration, consistency, deadlock ──");
    let mut h = ValidationHarness::new("halo_exchange");

    // ── Ownership migration (a 0.6-cell drift across the boundary) ──
    {
        let topo = RankTopology::new(2);
        let mk = |rank| {
            CartesianDecomposition::new(
                &topo,
                rank,
                [2, 1, 1],
                [L, 10.0, 10.0],
                RC,
                ExchangeScheme::FullShell,
            )
        };
        let (mut a, mut b) = match (mk(0), mk(1)) {
            (Ok(a), Ok(b)) => (a, b),
            _ => {
                eprintln!("decomposition construction failed");
                std::process::exit(1);
            }
        };
        let mk_grid = |d: &CartesianDecomposition| {
            let (lo, hi) = d.bounding_box();
            CellGrid::new(lo, hi, RC)
        };
        let (Ok(mut ga), Ok(mut gb)) = (mk_grid(&a), mk_grid(&b)) else {
            eprintln!("grid construction failed");
            std::process::exit(1);
        };
        let r = ga.insert_owned(Molecule::new(77, 0, [9.0, 5.0, 5.0], [0.0; 3]));
        if let Some(m) = ga.arena.get_mut(r) {
            m.r[0] = 10.0 + 0.6 * RC; // 0.6 cells past the boundary
        }
        let ok = std::thread::scope(|s| {
            let ta = s.spawn(|| {
                a.exchange_molecules(&mut ga, MessageType::LeavingAndHaloCopies)
                    .is_ok()
            });
            let tb = s.spawn(|| {
                b.exchange_molecules(&mut gb, MessageType::LeavingAndHaloCopies)
                    .is_ok()
            });
            ta.join().unwrap_or(false) && tb.join().unwrap_or(false)
        });
        h.check_bool("two-rank exchange completes", ok);
        h.check_abs("old owner released the molecule", ga.n_owned() as f64, 0.0, 0.0);
        h.check_abs("new owner holds exactly one", gb.n_owned() as f64, 1.0, 0.0);
        let mut id = 0u64;
        gb.for_each_owned(|m| id = m.id);
        h.check_abs("identity preserved across migration", id as f64, 77.0, 0.0);
        // The migrated molecule sits within one cutoff of the boundary, so
        // the old owner must hold a matching-id halo copy after exchange.
        let copies = ga.collect_region_with_halo([10.0, 0.0, 0.0], [12.5, 10.0, 10.0]);
        h.check_bool(
            "halo consistency: copy on the neighbor",
            copies.iter().any(|m| m.id == 77),
        );
    }

    // ── Rank-count invariance over one step and several steps ──
    match (single_rank_energies(1), two_rank_energies(1)) {
        (Ok((u1, w1, n1)), Ok((u2, w2, n2))) => {
            h.check_abs("molecule count matches", n2 as f64, n1 as f64, 0.0);
            h.check_rel(
                "U after one step (1 vs 2 ranks)",
                u2,
                u1,
                tolerances::RANK_INVARIANCE_ONE_STEP_REL,
            );
            h.check_rel(
                "virial after one step (1 vs 2 ranks)",
                w2,
                w1,
                tolerances::RANK_INVARIANCE_ONE_STEP_REL,
            );
        }
        _ => h.check_bool("one-step comparison runs", false),
    }
    match (single_rank_energies(50), two_rank_energies(50)) {
        (Ok((u1, _, _)), Ok((u2, _, _))) => {
            h.check_rel(
                "U after 50 steps (1 vs 2 ranks)",
                u2,
                u1,
                tolerances::RANK_INVARIANCE_LONG_REL,
            );
        }
        _ => h.check_bool("50-step comparison runs", false),
    }

    // ── Deadlock detection against a silent neighbor ──
    {
        let topo = RankTopology::new(2);
        let mut alive = match CartesianDecomposition::new(
            &topo,
            0,
            [2, 1, 1],
            [L, 10.0, 10.0],
            RC,
            ExchangeScheme::FullShell,
        ) {
            Ok(d) => d,
            Err(e) => {
                eprintln!("decomposition: {e}");
                std::process::exit(1);
            }
        };
        alive.timeout_s = 2.0;
        let _silent = CartesianDecomposition::new(
            &topo,
            1,
            [2, 1, 1],
            [L, 10.0, 10.0],
            RC,
            ExchangeScheme::FullShell,
        );
        let mut grid = match CellGrid::new([0.0; 3], [10.0; 3], RC) {
            Ok(g) => g,
            Err(e) => {
                eprintln!("grid: {e}");
                std::process::exit(1);
            }
        };
        let start = Instant::now();
        let err = alive.exchange_molecules(&mut grid, MessageType::HaloCopies);
        let elapsed = start.elapsed().as_secs_f64();
        let deadlocked = matches!(err, Err(SimError::Deadlock { .. }));
        h.check_bool("silent neighbor triggers the deadlock error", deadlocked);
        h.check_upper("deadlock fires within timeout + O(1) s", elapsed, 2.0 + 3.0);
        if let Err(e) = err {
            h.check_abs("deadlock exit code", f64::from(e.exit_code()), 457.0, 0.0);
        }
    }

    h.finish();
}

// SPDX-License-Identifier: AGPL-3.0-only

//! Integration tests: decomposition and halo exchange.
//!
//! Rank-count invariance of full simulation steps, halo consistency of the
//! exchanged copies, ownership migration across rank boundaries, scheme
//! equivalence (full shell vs three stage) and deadlock detection.

use std::time::Instant;

use stockmayer::cellgrid::CellGrid;
use stockmayer::components::{Component, ComponentRegistry};
use stockmayer::decomp::cartesian::ExchangeScheme;
use stockmayer::decomp::{
    CartesianDecomposition, Decomposition, MessageType, RankTopology, SequentialDecomposition,
};
use stockmayer::domain::Domain;
use stockmayer::error::SimError;
use stockmayer::molecule::Molecule;
use stockmayer::simulation::Simulation;
use stockmayer::tolerances;

const L: [f64; 3] = [20.0, 10.0, 10.0];
const RC: f64 = 2.5;

/// Deterministic jittered lattice over the 20×10×10 box with velocities.
fn scenario_molecules() -> Vec<Molecule> {
    let mut seed = 31u64;
    let mut next = move || {
        seed = seed.wrapping_mul(6_364_136_223_846_793_005).wrapping_add(1);
        (seed >> 33) as f64 / f64::from(1u32 << 31)
    };
    let mut out = Vec::new();
    let mut id = 1u64;
    for i in 0..12 {
        for j in 0..6 {
            for k in 0..6 {
                let pos = [
                    0.9 + 1.55 * f64::from(i) + 0.2 * next(),
                    0.75 + 1.5 * f64::from(j) + 0.2 * next(),
                    0.75 + 1.5 * f64::from(k) + 0.2 * next(),
                ];
                let vel = [next() - 0.5, next() - 0.5, next() - 0.5];
                out.push(Molecule::new(id, 0, pos, vel));
                id += 1;
            }
        }
    }
    out
}

fn registry() -> ComponentRegistry {
    ComponentRegistry::build(vec![Component::single_lj(1.0, 1.0, 1.0)], RC).expect("registry")
}

fn run_single_rank(n_steps: usize) -> (f64, f64, Vec<(u64, [f64; 3])>) {
    let domain = Domain::new(L, RC, RC).expect("domain");
    let decomp = SequentialDecomposition::new(L, RC);
    let mut sim = Simulation::new(registry(), domain, Box::new(decomp), 0.002).expect("sim");
    sim.console_interval = 0;
    sim.insert_molecules(scenario_molecules());
    sim.init().expect("init");
    for _ in 0..n_steps {
        sim.step().expect("step");
    }
    let mut positions = Vec::new();
    sim.grid.for_each_owned(|m| positions.push((m.id, m.r)));
    positions.sort_by_key(|p| p.0);
    (sim.domain.global_upot(), sim.domain.global_virial(), positions)
}

fn run_two_ranks(n_steps: usize, scheme: ExchangeScheme) -> (f64, f64, Vec<(u64, [f64; 3])>) {
    let topo = RankTopology::new(2);
    let run_rank = |rank: usize| -> Result<(f64, f64, Vec<(u64, [f64; 3])>), SimError> {
        let domain = Domain::new(L, RC, RC)?;
        let decomp = CartesianDecomposition::new(&topo, rank, [2, 1, 1], L, RC, scheme)?;
        let mut sim = Simulation::new(registry(), domain, Box::new(decomp), 0.002)?;
        sim.console_interval = 0;
        sim.insert_molecules(scenario_molecules());
        sim.init()?;
        for _ in 0..n_steps {
            sim.step()?;
        }
        let mut positions = Vec::new();
        sim.grid.for_each_owned(|m| positions.push((m.id, m.r)));
        Ok((sim.domain.global_upot(), sim.domain.global_virial(), positions))
    };

    let (a, b) = std::thread::scope(|s| {
        let ta = s.spawn(|| run_rank(0));
        let tb = s.spawn(|| run_rank(1));
        (ta.join().expect("rank 0"), tb.join().expect("rank 1"))
    });
    let (u, w, mut pos_a) = a.expect("rank 0 run");
    let (_, _, pos_b) = b.expect("rank 1 run");
    pos_a.extend(pos_b);
    pos_a.sort_by_key(|p| p.0);
    (u, w, pos_a)
}

#[test]
fn rank_count_invariance_after_one_step() {
    let (u1, w1, p1) = run_single_rank(1);
    let (u2, w2, p2) = run_two_ranks(1, ExchangeScheme::FullShell);
    assert_eq!(p1.len(), p2.len(), "molecule counts");
    assert!(
        ((u1 - u2) / u1.abs().max(1e-10)).abs() < tolerances::RANK_INVARIANCE_ONE_STEP_REL,
        "U: {u1} vs {u2}"
    );
    assert!(((w1 - w2) / w1.abs().max(1e-10)).abs() < tolerances::RANK_INVARIANCE_ONE_STEP_REL);
    for ((id1, r1), (id2, r2)) in p1.iter().zip(p2.iter()) {
        assert_eq!(id1, id2);
        for d in 0..3 {
            assert!(
                (r1[d] - r2[d]).abs() < tolerances::RANK_INVARIANCE_ONE_STEP_REL * r1[d].abs().max(1.0),
                "molecule {id1} position[{d}]: {} vs {}",
                r1[d],
                r2[d]
            );
        }
    }
}

#[test]
fn rank_count_invariance_after_many_steps() {
    let (u1, _, p1) = run_single_rank(200);
    let (u2, _, p2) = run_two_ranks(200, ExchangeScheme::FullShell);
    assert_eq!(p1.len(), p2.len(), "no molecule lost or duplicated");
    assert!(
        ((u1 - u2) / u1.abs().max(1e-10)).abs() < tolerances::RANK_INVARIANCE_LONG_REL,
        "U after 200 steps: {u1} vs {u2}"
    );
}

#[test]
fn three_stage_scheme_matches_full_shell() {
    let (u_full, w_full, p_full) = run_two_ranks(20, ExchangeScheme::FullShell);
    let (u_three, w_three, p_three) = run_two_ranks(20, ExchangeScheme::ThreeStage);
    assert_eq!(p_full.len(), p_three.len());
    assert!(
        ((u_full - u_three) / u_full.abs().max(1e-10)).abs() < 1e-9,
        "U: {u_full} vs {u_three}"
    );
    assert!(((w_full - w_three) / w_full.abs().max(1e-10)).abs() < 1e-9);
}

#[test]
fn overlapped_exchange_matches_blocking_exchange() {
    let run = |overlap: bool| -> (f64, f64) {
        let topo = RankTopology::new(2);
        let run_rank = move |rank: usize, topo: &std::sync::Arc<RankTopology>| {
            let domain = Domain::new(L, RC, RC).expect("domain");
            let decomp = CartesianDecomposition::new(
                topo,
                rank,
                [2, 1, 1],
                L,
                RC,
                ExchangeScheme::ThreeStage,
            )
            .expect("decomp");
            let mut sim =
                Simulation::new(registry(), domain, Box::new(decomp), 0.002).expect("sim");
            sim.console_interval = 0;
            sim.overlap_exchange = overlap;
            sim.insert_molecules(scenario_molecules());
            sim.init().expect("init");
            for _ in 0..10 {
                sim.step().expect("step");
            }
            (sim.domain.global_upot(), sim.domain.global_virial())
        };
        std::thread::scope(|s| {
            let ta = s.spawn(|| run_rank(0, &topo));
            let tb = s.spawn(|| run_rank(1, &topo));
            let a = ta.join().expect("rank 0");
            let _ = tb.join().expect("rank 1");
            a
        })
    };
    let (u_block, w_block) = run(false);
    let (u_over, w_over) = run(true);
    assert!(
        ((u_block - u_over) / u_block.abs().max(1e-10)).abs() < 1e-9,
        "U: {u_block} vs {u_over}"
    );
    assert!(((w_block - w_over) / w_block.abs().max(1e-10)).abs() < 1e-9);
}

#[test]
fn halo_consistency_after_exchange() {
    // Every owned molecule within one cutoff of the rank boundary has a
    // matching-id copy on the neighbor whose halo spans it.
    let topo = RankTopology::new(2);
    let mk = |rank| {
        CartesianDecomposition::new(&topo, rank, [2, 1, 1], L, RC, ExchangeScheme::FullShell)
            .expect("decomp")
    };
    let (mut a, mut b) = (mk(0), mk(1));
    let mk_grid = |d: &CartesianDecomposition| {
        let (lo, hi) = d.bounding_box();
        CellGrid::new(lo, hi, RC).expect("grid")
    };
    let (mut ga, mut gb) = (mk_grid(&a), mk_grid(&b));
    for m in scenario_molecules() {
        if a.owns_position(m.r) {
            ga.insert_owned(m);
        } else {
            gb.insert_owned(m);
        }
    }

    std::thread::scope(|s| {
        let ta = s.spawn(|| {
            a.exchange_molecules(&mut ga, MessageType::LeavingAndHaloCopies)
                .expect("rank 0 exchange");
        });
        let tb = s.spawn(|| {
            b.exchange_molecules(&mut gb, MessageType::LeavingAndHaloCopies)
                .expect("rank 1 exchange");
        });
        ta.join().expect("rank 0");
        tb.join().expect("rank 1");
    });

    // Rank 0's owned band near x = 10 must be mirrored in rank 1's halo.
    let band = ga.collect_region([10.0 - RC, 0.0, 0.0], [10.0, 10.0, 10.0]);
    let halo_b = gb.collect_region_with_halo([10.0 - RC, 0.0, 0.0], [10.0, 10.0, 10.0]);
    for m in &band {
        assert!(
            halo_b.iter().any(|h| h.id == m.id),
            "molecule {} near the boundary lacks a halo copy",
            m.id
        );
    }
    // And the wrapped side: rank 0's band near x = 0 appears beyond x = 20.
    let low_band = ga.collect_region([0.0, 0.0, 0.0], [RC, 10.0, 10.0]);
    let halo_b_high = gb.collect_region_with_halo([20.0, 0.0, 0.0], [20.0 + RC, 10.0, 10.0]);
    for m in &low_band {
        assert!(
            halo_b_high.iter().any(|h| h.id == m.id),
            "molecule {} missing its periodic halo copy",
            m.id
        );
    }
}

#[test]
fn migration_preserves_identity_and_count() {
    let topo = RankTopology::new(2);
    let mk = |rank| {
        CartesianDecomposition::new(&topo, rank, [2, 1, 1], L, RC, ExchangeScheme::FullShell)
            .expect("decomp")
    };
    let (mut a, mut b) = (mk(0), mk(1));
    let mk_grid = |d: &CartesianDecomposition| {
        let (lo, hi) = d.bounding_box();
        CellGrid::new(lo, hi, RC).expect("grid")
    };
    let (mut ga, mut gb) = (mk_grid(&a), mk_grid(&b));
    // Three molecules, one drifting right across the boundary, one
    // drifting left across the periodic wrap.
    let r1 = ga.insert_owned(Molecule::new(1, 0, [9.5, 5.0, 5.0], [0.0; 3]));
    let r2 = ga.insert_owned(Molecule::new(2, 0, [0.4, 5.0, 5.0], [0.0; 3]));
    gb.insert_owned(Molecule::new(3, 0, [15.0, 5.0, 5.0], [0.0; 3]));
    ga.arena.get_mut(r1).expect("r1").r[0] = 10.0 + 0.6 * RC;
    ga.arena.get_mut(r2).expect("r2").r[0] = -0.3;

    std::thread::scope(|s| {
        let ta = s.spawn(|| {
            a.exchange_molecules(&mut ga, MessageType::LeavingOnly)
                .expect("rank 0");
        });
        let tb = s.spawn(|| {
            b.exchange_molecules(&mut gb, MessageType::LeavingOnly)
                .expect("rank 1");
        });
        ta.join().expect("rank 0");
        tb.join().expect("rank 1");
    });

    assert_eq!(ga.n_owned(), 0);
    assert_eq!(gb.n_owned(), 3, "both leavers arrived at rank 1");
    let mut ids = Vec::new();
    gb.for_each_owned(|m| ids.push((m.id, m.r[0])));
    ids.sort_by_key(|x| x.0);
    assert_eq!(ids[0].0, 1);
    assert!((ids[0].1 - (10.0 + 0.6 * RC)).abs() < 1e-12);
    assert_eq!(ids[1].0, 2);
    // Wrapped around the global box: −0.3 → 19.7.
    assert!((ids[1].1 - 19.7).abs() < 1e-12);
}

#[test]
fn deadlock_fires_within_timeout() {
    let topo = RankTopology::new(2);
    let mut alive =
        CartesianDecomposition::new(&topo, 0, [2, 1, 1], L, RC, ExchangeScheme::FullShell)
            .expect("decomp");
    alive.timeout_s = 0.5;
    let _silent =
        CartesianDecomposition::new(&topo, 1, [2, 1, 1], L, RC, ExchangeScheme::FullShell)
            .expect("decomp");
    let mut grid = CellGrid::new([0.0; 3], [10.0; 3], RC).expect("grid");
    let start = Instant::now();
    let err = alive
        .exchange_molecules(&mut grid, MessageType::HaloCopies)
        .expect_err("must deadlock");
    assert!(matches!(err, SimError::Deadlock { rank: 0, .. }));
    assert_eq!(err.exit_code(), 457);
    let elapsed = start.elapsed().as_secs_f64();
    assert!(elapsed >= 0.5, "not before the timeout");
    assert!(elapsed < 4.0, "within timeout + O(1)");
}

// SPDX-License-Identifier: AGPL-3.0-only

//! Integration tests: force kernels.
//!
//! Exercises the vectorized cell engine against the scalar all-pairs
//! reference over mixed multipole species, plus the kernel-level laws:
//! Newton's third law, exact cutoff truncation, and the analytical pair
//! scenarios.

use stockmayer::cellgrid::CellGrid;
use stockmayer::components::{ChargeSite, Component, ComponentRegistry, QuadrupoleSite};
use stockmayer::kernel::{scalar, PairKernel};
use stockmayer::molecule::Molecule;
use stockmayer::quaternion::Quat;
use stockmayer::tolerances;
use stockmayer::traversal::Traversal;

/// A mixture exercising all eight interaction kinds: a Stockmayer species
/// (LJ + dipole), an ionic LJ species (LJ + charge) and a quadrupolar one.
fn mixed_registry(rc: f64) -> ComponentRegistry {
    let stockmayer = Component::stockmayer(1.0, 1.0, 1.0, 1.2, 0.05);
    let mut ionic = Component::single_lj(0.8, 0.9, 1.5);
    ionic.charges.push(ChargeSite {
        offset: [0.0; 3],
        q: 0.7,
    });
    let mut quadrupolar = Component::single_lj(1.1, 1.05, 2.0);
    quadrupolar.quadrupoles.push(QuadrupoleSite {
        offset: [0.0; 3],
        e_body: [0.0, 0.0, 1.0],
        q_moment: 0.9,
    });
    quadrupolar.inertia = [0.4, 0.4, 0.0];
    ComponentRegistry::build(vec![stockmayer, ionic, quadrupolar], rc).expect("registry")
}

/// Deterministic jittered-lattice cluster cycling through the species.
fn mixed_cluster(n: usize) -> Vec<Molecule> {
    let mut seed = 4242u64;
    let mut next = move || {
        seed = seed.wrapping_mul(6_364_136_223_846_793_005).wrapping_add(1);
        (seed >> 33) as f64 / f64::from(1u32 << 31)
    };
    (0..n)
        .map(|i| {
            let pos = [
                0.8 + 1.3 * ((i % 6) as f64) + 0.2 * next(),
                0.8 + 1.3 * (((i / 6) % 6) as f64) + 0.2 * next(),
                0.8 + 1.3 * ((i / 36) as f64) + 0.2 * next(),
            ];
            let mut m = Molecule::new(i as u64 + 1, (i % 3) as u16, pos, [0.0; 3]);
            m.q = Quat::exp([next() - 0.5, next() - 0.5, next() - 0.5]);
            m
        })
        .collect()
}

#[test]
fn simd_engine_matches_scalar_reference_for_mixed_species() {
    let rc = 2.5;
    let registry = mixed_registry(rc);
    let rf = 0.064; // 1/rc³ conducting
    let cluster = mixed_cluster(48);

    let mut reference = cluster.clone();
    let ref_acc = scalar::compute_all_pairs(&mut reference, &registry, rc, rc, rf);

    let kernel = PairKernel::new(&registry, rc, rc, rf);
    let mut grid = CellGrid::new([0.0; 3], [10.0; 3], rc).expect("grid");
    let refs: Vec<_> = cluster
        .iter()
        .map(|m| grid.insert_owned(m.clone()))
        .collect();
    let mut trav = Traversal::new();
    let acc = trav.run(&mut grid, &kernel, &registry);

    let rel = |a: f64, b: f64| (a - b).abs() / b.abs().max(1e-10);
    assert!(
        rel(acc.upot6_lj, ref_acc.upot6_lj) < tolerances::SIMD_SCALAR_REL,
        "6U_LJ: {} vs {}",
        acc.upot6_lj,
        ref_acc.upot6_lj
    );
    assert!(
        rel(acc.upot_xpoles, ref_acc.upot_xpoles) < tolerances::SIMD_SCALAR_REL,
        "U_x: {} vs {}",
        acc.upot_xpoles,
        ref_acc.upot_xpoles
    );
    assert!(rel(acc.virial, ref_acc.virial) < tolerances::SIMD_SCALAR_REL);
    assert!(rel(acc.my_rf, ref_acc.my_rf) < tolerances::SIMD_SCALAR_REL);

    for (r, m_ref) in refs.iter().zip(reference.iter()) {
        let m = grid.arena.get(*r).expect("live molecule");
        for d in 0..3 {
            let f_err = (m.f[d] - m_ref.f[d]).abs() / m_ref.f[d].abs().max(1.0);
            assert!(
                f_err < 1e-11,
                "molecule {} f[{d}]: {} vs {}",
                m.id,
                m.f[d],
                m_ref.f[d]
            );
            let t_err = (m.m[d] - m_ref.m[d]).abs() / m_ref.m[d].abs().max(1.0);
            assert!(
                t_err < 1e-11,
                "molecule {} torque[{d}]: {} vs {}",
                m.id,
                m.m[d],
                m_ref.m[d]
            );
        }
    }
}

#[test]
fn newtons_third_law_over_the_whole_cluster() {
    // With no periodic images, the total force and the total torque about
    // the origin vanish to rounding.
    let rc = 3.0;
    let registry = mixed_registry(rc);
    let mut cluster = mixed_cluster(30);
    let _ = scalar::compute_all_pairs(&mut cluster, &registry, rc, rc, 0.1);

    let mut f_tot = [0.0f64; 3];
    let mut t_tot = [0.0f64; 3];
    let mut f_scale = 0.0f64;
    for m in &cluster {
        for d in 0..3 {
            f_tot[d] += m.f[d];
            f_scale = f_scale.max(m.f[d].abs());
        }
        // Torque about the origin: r × F plus the intrinsic torque.
        t_tot[0] += m.r[1] * m.f[2] - m.r[2] * m.f[1] + m.m[0];
        t_tot[1] += m.r[2] * m.f[0] - m.r[0] * m.f[2] + m.m[1];
        t_tot[2] += m.r[0] * m.f[1] - m.r[1] * m.f[0] + m.m[2];
    }
    for d in 0..3 {
        assert!(
            f_tot[d].abs() < 1e-11 * f_scale.max(1.0),
            "net force component {d} = {}",
            f_tot[d]
        );
        assert!(
            t_tot[d].abs() < 1e-10 * f_scale.max(1.0),
            "net torque component {d} = {}",
            t_tot[d]
        );
    }
}

#[test]
fn cutoff_truncation_is_exact() {
    let rc = 2.5;
    let registry = ComponentRegistry::build(vec![Component::single_lj(1.0, 1.0, 1.0)], rc)
        .expect("registry");
    // Just inside vs just outside the cutoff.
    for (r, expect_zero) in [(rc - 1e-9, false), (rc + 1e-9, true)] {
        let mut mols = vec![
            Molecule::new(1, 0, [0.0; 3], [0.0; 3]),
            Molecule::new(2, 0, [r, 0.0, 0.0], [0.0; 3]),
        ];
        let acc = scalar::compute_all_pairs(&mut mols, &registry, rc, rc, 0.0);
        if expect_zero {
            assert_eq!(mols[0].f, [0.0; 3], "no force past the cutoff");
            assert_eq!(acc.upot6_lj, 0.0, "no energy past the cutoff");
        } else {
            assert!(mols[0].f[0].abs() > 0.0, "force inside the cutoff");
            // The shifted potential goes to zero continuously at r_c.
            assert!(acc.upot().abs() < 1e-6, "shifted U near the cutoff");
        }
    }
}

#[test]
fn lj_pair_minimum_analytics() {
    let rc = 50.0;
    let registry = ComponentRegistry::build(vec![Component::single_lj(1.0, 1.0, 1.0)], rc)
        .expect("registry");
    let r_min = 2.0f64.powf(1.0 / 6.0);
    let mut mols = vec![
        Molecule::new(1, 0, [60.0; 3], [0.0; 3]),
        Molecule::new(2, 0, [60.0 + r_min, 60.0, 60.0], [0.0; 3]),
    ];
    let acc = scalar::compute_all_pairs(&mut mols, &registry, rc, rc, 0.0);
    assert!(
        (acc.upot() - (-1.0)).abs() < tolerances::PAIR_POTENTIAL_REL,
        "U at the minimum = {}",
        acc.upot()
    );
    assert!(mols[0].f[0].abs() < tolerances::LJ_MINIMUM_FORCE_ABS);
}

#[test]
fn dipole_pair_analytic_potential() {
    let registry = ComponentRegistry::build(
        vec![Component::stockmayer(0.0, 1.0, 1.0, 1.0, 0.025)],
        10.0,
    )
    .expect("registry");
    let r = 1.5;
    let mut mols = vec![
        Molecule::new(1, 0, [0.0; 3], [0.0; 3]),
        Molecule::new(2, 0, [0.0, 0.0, r], [0.0; 3]),
    ];
    let acc = scalar::compute_all_pairs(&mut mols, &registry, 10.0, 10.0, 0.0);
    let expected = -2.0 / (r * r * r);
    assert!(
        ((acc.upot() - expected) / expected).abs() < tolerances::PAIR_POTENTIAL_REL,
        "U = {}, expected {expected}",
        acc.upot()
    );
}

#[test]
fn parallel_traversal_reproduces_sequential_forces() {
    let rc = 2.5;
    let registry = mixed_registry(rc);
    let cluster = mixed_cluster(40);
    let kernel = PairKernel::new(&registry, rc, rc, 0.064);

    let run = |parallel: bool| -> Vec<[f64; 3]> {
        let mut grid = CellGrid::new([0.0; 3], [10.0; 3], rc).expect("grid");
        let refs: Vec<_> = cluster
            .iter()
            .map(|m| grid.insert_owned(m.clone()))
            .collect();
        let mut trav = Traversal::new();
        trav.parallel = parallel;
        let _ = trav.run(&mut grid, &kernel, &registry);
        refs.iter()
            .map(|&r| grid.arena.get(r).map_or([0.0; 3], |m| m.f))
            .collect()
    };
    let seq = run(false);
    let par = run(true);
    for (a, b) in seq.iter().zip(par.iter()) {
        for d in 0..3 {
            assert!(
                (a[d] - b[d]).abs() < 1e-10 * a[d].abs().max(1.0),
                "parallel force differs: {} vs {}",
                a[d],
                b[d]
            );
        }
    }
}

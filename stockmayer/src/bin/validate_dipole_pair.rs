// SPDX-License-Identifier: AGPL-3.0-only

//! Head-to-tail dipole pair against the analytical potential.
//!
//! Two point dipoles of magnitude 1 oriented head-to-tail along z at
//! separation 1.5: U = −2μ²/r³ to 1e-10. Also checks the torque-free
//! configuration, the conducting reaction-field sum, and vectorized
//! against scalar parity for a jumbled dipole cluster.

use stockmayer::cellgrid::CellGrid;
use stockmayer::components::{Component, ComponentRegistry};
use stockmayer::domain::EpsilonRf;
use stockmayer::kernel::{scalar, PairKernel};
use stockmayer::molecule::Molecule;
use stockmayer::quaternion::Quat;
use stockmayer::tolerances;
use stockmayer::traversal::Traversal;
use stockmayer::validation::ValidationHarness;

fn main() {
    env_logger::init();
    println!("── Dipole pair: analytical potential and RF sum ──");

    let rc = 5.0;
    let r = 1.5;
    let registry = match ComponentRegistry::build(
        // Dipole-only species: LJ well depth zero keeps the LJ channel
        // inert while the dipole checks stay clean.
        vec![Component::stockmayer(0.0, 1.0, 1.0, 1.0, 0.025)],
        rc,
    ) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("registry: {e}");
            std::process::exit(1);
        }
    };

    let mut h = ValidationHarness::new("dipole_pair");

    // Head-to-tail along z, no reaction field.
    let mut mols = vec![
        Molecule::new(1, 0, [2.0, 2.0, 2.0], [0.0; 3]),
        Molecule::new(2, 0, [2.0, 2.0, 2.0 + r], [0.0; 3]),
    ];
    let acc = scalar::compute_all_pairs(&mut mols, &registry, rc, rc, 0.0);
    let expected = -2.0 / (r * r * r);
    h.check_rel(
        "U = −2μ²/r³ head-to-tail",
        acc.upot(),
        expected,
        tolerances::PAIR_POTENTIAL_REL,
    );
    for d in 0..3 {
        h.check_abs(
            &format!("head-to-tail torque component {d}"),
            mols[0].m[d],
            0.0,
            1e-12,
        );
        h.check_abs(
            &format!("Newton third law component {d}"),
            mols[0].f[d] + mols[1].f[d],
            0.0,
            tolerances::NEWTON_PAIR_ABS,
        );
    }
    // Head-to-tail dipoles attract: force on the upper molecule points down.
    h.check_upper("head-to-tail attraction (F_z of upper < 0)", mols[1].f[2], 0.0);

    // Conducting reaction field: my_rf = −(1/r_c³)·μ²·(e₁·e₂) = −1/r_c³.
    let rf = EpsilonRf::Conducting.prefactor(rc);
    let mut rf_mols = vec![
        Molecule::new(1, 0, [2.0, 2.0, 2.0], [0.0; 3]),
        Molecule::new(2, 0, [2.0, 2.0, 2.0 + r], [0.0; 3]),
    ];
    let rf_acc = scalar::compute_all_pairs(&mut rf_mols, &registry, rc, rc, rf);
    h.check_rel(
        "conducting RF sum for aligned pair",
        rf_acc.my_rf,
        -rf,
        tolerances::PAIR_POTENTIAL_REL,
    );
    h.check_rel(
        "RF shifts the pair energy",
        rf_acc.upot(),
        acc.upot() - rf,
        tolerances::PAIR_POTENTIAL_REL,
    );

    // Vectorized vs scalar over a jumbled dipole cluster.
    let poses = [
        ([2.0, 2.0, 2.0], [0.0, 0.0, 0.0]),
        ([3.1, 2.4, 2.2], [0.4, 0.3, 0.0]),
        ([2.2, 3.3, 2.9], [0.0, 1.2, 0.4]),
        ([3.0, 3.1, 3.4], [0.9, 0.0, 1.1]),
        ([2.6, 2.1, 3.8], [0.2, 0.7, 0.3]),
    ];
    let mut reference: Vec<Molecule> = poses
        .iter()
        .enumerate()
        .map(|(i, &(pos, rot))| {
            let mut m = Molecule::new(i as u64 + 1, 0, pos, [0.0; 3]);
            m.q = Quat::exp(rot);
            m
        })
        .collect();
    let ref_acc = scalar::compute_all_pairs(&mut reference, &registry, rc, rc, rf);

    let kernel = PairKernel::new(&registry, rc, rc, rf);
    let mut grid = match CellGrid::new([0.0; 3], [15.0; 3], rc) {
        Ok(g) => g,
        Err(e) => {
            eprintln!("grid: {e}");
            std::process::exit(1);
        }
    };
    let refs: Vec<_> = reference
        .iter()
        .map(|m| {
            let mut fresh = m.clone();
            fresh.clear_accumulators();
            grid.insert_owned(fresh)
        })
        .collect();
    let mut trav = Traversal::new();
    let engine_acc = trav.run(&mut grid, &kernel, &registry);

    h.check_rel(
        "vectorized dipole U matches scalar",
        engine_acc.upot(),
        ref_acc.upot(),
        tolerances::SIMD_SCALAR_REL,
    );
    h.check_rel(
        "vectorized RF sum matches scalar",
        engine_acc.my_rf,
        ref_acc.my_rf,
        tolerances::SIMD_SCALAR_REL,
    );
    let mut worst_f = 0.0f64;
    let mut worst_m = 0.0f64;
    for (r_ref, m_ref) in refs.iter().zip(reference.iter()) {
        if let Some(m) = grid.arena.get(*r_ref) {
            for d in 0..3 {
                let scale_f = m_ref.f[d].abs().max(1.0);
                let scale_m = m_ref.m[d].abs().max(1.0);
                worst_f = worst_f.max((m.f[d] - m_ref.f[d]).abs() / scale_f);
                worst_m = worst_m.max((m.m[d] - m_ref.m[d]).abs() / scale_m);
            }
        }
    }
    h.check_upper("worst force deviation (rel)", worst_f, tolerances::SIMD_SCALAR_REL);
    h.check_upper("worst torque deviation (rel)", worst_m, tolerances::SIMD_SCALAR_REL);

    h.finish();
}

// SPDX-License-Identifier: AGPL-3.0-only

//! Isolated LJ pair at the potential minimum.
//!
//! Two LJ particles (ε = 1, σ = 1) at r = 2^(1/6) ≈ 1.12246: the force
//! vanishes and U = −1 (up to the cutoff shift). Checks the scalar
//! reference against the analytical values, the vectorized cell engine
//! against the scalar path, and Newton's third law on both.

use stockmayer::cellgrid::CellGrid;
use stockmayer::components::{Component, ComponentRegistry};
use stockmayer::kernel::{scalar, PairKernel};
use stockmayer::molecule::Molecule;
use stockmayer::tolerances;
use stockmayer::traversal::Traversal;
use stockmayer::validation::ValidationHarness;

fn main() {
    env_logger::init();
    println!("── LJ pair at the minimum: scalar and vectorized ──");

    let rc = 5.0;
    let r_min = 2.0f64.powf(1.0 / 6.0);
    let registry = match ComponentRegistry::build(vec![Component::single_lj(1.0, 1.0, 1.0)], rc) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("registry: {e}");
            std::process::exit(1);
        }
    };
    let mut h = ValidationHarness::new("lj_pair");

    // Scalar reference.
    let mut mols = vec![
        Molecule::new(1, 0, [5.0, 5.0, 5.0], [0.0; 3]),
        Molecule::new(2, 0, [5.0 + r_min, 5.0, 5.0], [0.0; 3]),
    ];
    let acc = scalar::compute_all_pairs(&mut mols, &registry, rc, rc, 0.0);
    // The cutoff shift at rc = 5 raises U by ~2.6e-4; the scenario
    // contract is U ≈ −1.0.
    h.check_abs("scalar U ≈ −1", acc.upot(), -1.0, 1e-3);
    let f_mag = (mols[0].f[0] * mols[0].f[0]
        + mols[0].f[1] * mols[0].f[1]
        + mols[0].f[2] * mols[0].f[2])
        .sqrt();
    h.check_abs("scalar |F| ≈ 0 at the minimum", f_mag, 0.0, 1e-3);
    for d in 0..3 {
        h.check_abs(
            &format!("Newton third law component {d}"),
            mols[0].f[d] + mols[1].f[d],
            0.0,
            tolerances::NEWTON_PAIR_ABS,
        );
    }

    // Vectorized cell engine over the same pair.
    let kernel = PairKernel::new(&registry, rc, rc, 0.0);
    let mut grid = match CellGrid::new([0.0; 3], [15.0; 3], rc) {
        Ok(g) => g,
        Err(e) => {
            eprintln!("grid: {e}");
            std::process::exit(1);
        }
    };
    let ra = grid.insert_owned(Molecule::new(1, 0, [5.0, 5.0, 5.0], [0.0; 3]));
    let rb = grid.insert_owned(Molecule::new(2, 0, [5.0 + r_min, 5.0, 5.0], [0.0; 3]));
    let mut trav = Traversal::new();
    let engine_acc = trav.run(&mut grid, &kernel, &registry);

    h.check_rel(
        "vectorized U matches scalar",
        engine_acc.upot(),
        acc.upot(),
        tolerances::SIMD_SCALAR_REL,
    );
    h.check_rel(
        "vectorized virial matches scalar",
        engine_acc.virial_total(),
        acc.virial_total(),
        tolerances::SIMD_SCALAR_REL,
    );
    let (fa, fb) = match (grid.arena.get(ra), grid.arena.get(rb)) {
        (Some(a), Some(b)) => (a.f, b.f),
        _ => {
            eprintln!("molecules vanished from the arena");
            std::process::exit(1);
        }
    };
    for d in 0..3 {
        h.check_abs(
            &format!("vectorized force matches scalar ({d})"),
            fa[d],
            mols[0].f[d],
            1e-12,
        );
        h.check_abs(
            &format!("vectorized Newton third law ({d})"),
            fa[d] + fb[d],
            0.0,
            tolerances::NEWTON_PAIR_ABS,
        );
    }

    // Cutoff correctness: just past rc the pair force is exactly zero.
    let mut far = vec![
        Molecule::new(1, 0, [1.0, 5.0, 5.0], [0.0; 3]),
        Molecule::new(2, 0, [1.0 + rc + 1e-9, 5.0, 5.0], [0.0; 3]),
    ];
    let far_acc = scalar::compute_all_pairs(&mut far, &registry, rc, rc, 0.0);
    h.check_abs(
        "force beyond cutoff is exactly zero",
        far[0].f[0].abs(),
        0.0,
        tolerances::BEYOND_CUTOFF_ABS,
    );
    h.check_abs(
        "energy beyond cutoff is exactly zero",
        far_acc.upot(),
        0.0,
        tolerances::BEYOND_CUTOFF_ABS,
    );

    h.finish();
}

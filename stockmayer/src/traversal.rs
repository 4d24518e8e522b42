// SPDX-License-Identifier: AGPL-3.0-only

//! Cell and cell-pair traversal.
//!
//! Drives the pair kernel over every cell and every forward-half-shell cell
//! pair of the grid. Per step: `begin` checks a SoA slab out of the pool
//! for every cell and loads it (preprocess), `compute` runs the kernel over
//! a cell subset, `finish` scatters forces back and returns the slabs
//! (postprocess). `run` wraps the three for the common case.
//!
//! Halo rules (inter-rank pairs count macroscopic values exactly once):
//! same-cell interactions are skipped for halo cells and cells with fewer
//! than two molecules; a cell pair is skipped when both cells are halo;
//! when exactly one is halo, forces still apply to both sides but energy
//! and virial are accumulated only if the non-halo cell carries the lower
//! cell index — the mirrored pair on the neighbor rank then sees its halo
//! cell on the low side and skips the accumulation.
//!
//! The subset filter separates inner cells (no halo neighbor) from the
//! rest, so inner-cell computation can overlap an in-flight exchange stage.
//!
//! Thread parallelism: cells and pairs are distributed with rayon; each
//! cell's slab sits behind its own mutex and pair processing always locks
//! the lower cell index first.

use std::sync::Mutex;

use rayon::prelude::*;

use crate::cellgrid::{CellGrid, CellKind};
use crate::components::ComponentRegistry;
use crate::kernel::{MacroAccum, PairKernel};
use crate::soa::{CellSoa, SoaPool};

/// Which part of the grid a `compute` pass covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellFilter {
    /// Everything (the plain, non-overlapped step).
    All,
    /// Only cells/pairs entirely inside the inner region (safe during an
    /// in-flight halo exchange).
    InnerOnly,
    /// The complement of `InnerOnly`.
    OuterOnly,
}

impl CellFilter {
    fn covers_cell(self, kind: CellKind) -> bool {
        match self {
            Self::All => true,
            Self::InnerOnly => kind == CellKind::Inner,
            Self::OuterOnly => kind != CellKind::Inner,
        }
    }

    fn covers_pair(self, k1: CellKind, k2: CellKind) -> bool {
        match self {
            Self::All => true,
            Self::InnerOnly => k1 == CellKind::Inner && k2 == CellKind::Inner,
            Self::OuterOnly => k1 != CellKind::Inner || k2 != CellKind::Inner,
        }
    }
}

/// Traversal state: per-cell slab slots plus the slab pool.
#[derive(Debug, Default)]
pub struct Traversal {
    slabs: Vec<Mutex<Option<Box<CellSoa>>>>,
    pool: Mutex<SoaPool>,
    /// Thread-parallel cell/pair processing. Off by default: the parallel
    /// reduction order is nondeterministic, which forfeits bit-exact
    /// restarts and the tightest rank-invariance bounds.
    pub parallel: bool,
}

impl Traversal {
    /// Empty traversal; slabs are sized on the first `begin`.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Preprocess: load one slab per cell from the grid.
    pub fn begin(&mut self, grid: &CellGrid, registry: &ComponentRegistry) {
        self.begin_subset(grid, registry, CellFilter::All);
    }

    /// Preprocess only the cells a filter covers; slabs already loaded by
    /// an earlier pass are kept (the staged-exchange overlap loads inner
    /// cells first and the boundary/halo set after the halos arrive).
    pub fn begin_subset(&mut self, grid: &CellGrid, registry: &ComponentRegistry, filter: CellFilter) {
        while self.slabs.len() < grid.n_cells() {
            self.slabs.push(Mutex::new(None));
        }
        let pool = &self.pool;
        self.slabs[..grid.n_cells()]
            .par_iter()
            .enumerate()
            .for_each(|(idx, slot)| {
                if !filter.covers_cell(grid.cell(idx).kind) {
                    return;
                }
                let mut soa = {
                    let mut p = pool.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
                    p.acquire()
                };
                soa.load_from(&grid.cell(idx).members, &grid.arena, registry);
                *slot.lock().unwrap_or_else(std::sync::PoisonError::into_inner) = Some(soa);
            });
    }

    fn cell_list(grid: &CellGrid, filter: CellFilter) -> Vec<usize> {
        (0..grid.n_cells())
            .filter(|&idx| {
                let cell = grid.cell(idx);
                cell.kind != CellKind::Halo
                    && cell.members.len() >= 2
                    && filter.covers_cell(cell.kind)
            })
            .collect()
    }

    fn pair_list(grid: &CellGrid, filter: CellFilter) -> Vec<(usize, usize, bool)> {
        let mut pairs = Vec::new();
        grid.for_each_pair(|c1, c2| {
            let k1 = grid.cell(c1).kind;
            let k2 = grid.cell(c2).kind;
            if k1 == CellKind::Halo && k2 == CellKind::Halo {
                return;
            }
            if grid.cell(c1).members.is_empty() || grid.cell(c2).members.is_empty() {
                return;
            }
            if !filter.covers_pair(k1, k2) {
                return;
            }
            // Exactly-one-halo pairs count macroscopic sums only when the
            // owned cell is on the low-index side; the mirrored pair on the
            // neighbor rank then skips the accumulation.
            let macroscopic = k1 != CellKind::Halo;
            pairs.push((c1, c2, macroscopic));
        });
        pairs
    }

    fn process_cell_at(&self, idx: usize, kernel: &PairKernel<'_>, acc: &mut MacroAccum) {
        let mut guard = self.slabs[idx]
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Some(soa) = guard.as_mut() {
            kernel.process_cell(soa, acc);
        }
    }

    fn process_pair_at(
        &self,
        c1: usize,
        c2: usize,
        macroscopic: bool,
        kernel: &PairKernel<'_>,
        acc: &mut MacroAccum,
    ) {
        // Lock order: lower cell index first (c1 < c2 by construction), so
        // concurrent pair tasks cannot deadlock.
        let mut g1 = self.slabs[c1]
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let mut g2 = self.slabs[c2]
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if let (Some(s1), Some(s2)) = (g1.as_mut(), g2.as_mut()) {
            kernel.process_cell_pair(s1, s2, macroscopic, acc);
        }
    }

    /// Run the kernel over the selected subset; returns that pass's sums.
    #[must_use]
    pub fn compute(&self, grid: &CellGrid, kernel: &PairKernel<'_>, filter: CellFilter) -> MacroAccum {
        let cells = Self::cell_list(grid, filter);
        let pairs = Self::pair_list(grid, filter);

        if self.parallel {
            let cell_acc = cells
                .par_iter()
                .fold(MacroAccum::default, |mut acc, &idx| {
                    self.process_cell_at(idx, kernel, &mut acc);
                    acc
                })
                .reduce(MacroAccum::default, |mut a, b| {
                    a.merge(&b);
                    a
                });
            let pair_acc = pairs
                .par_iter()
                .fold(MacroAccum::default, |mut acc, &(c1, c2, macroscopic)| {
                    self.process_pair_at(c1, c2, macroscopic, kernel, &mut acc);
                    acc
                })
                .reduce(MacroAccum::default, |mut a, b| {
                    a.merge(&b);
                    a
                });
            let mut total = cell_acc;
            total.merge(&pair_acc);
            total
        } else {
            let mut acc = MacroAccum::default();
            for idx in cells {
                self.process_cell_at(idx, kernel, &mut acc);
            }
            for (c1, c2, macroscopic) in pairs {
                self.process_pair_at(c1, c2, macroscopic, kernel, &mut acc);
            }
            acc
        }
    }

    /// Postprocess: scatter slab forces back to the molecules, return the
    /// slabs to the pool.
    pub fn finish(&mut self, grid: &mut CellGrid) {
        for idx in 0..grid.n_cells() {
            let soa = self.slabs[idx]
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .take();
            if let Some(soa) = soa {
                let (members, arena) = grid.cell_members_and_arena_mut(idx);
                soa.store_to(members, arena);
                self.pool
                    .lock()
                    .unwrap_or_else(std::sync::PoisonError::into_inner)
                    .release(soa);
            }
        }
    }

    /// Full force computation over the whole grid.
    #[must_use]
    pub fn run(
        &mut self,
        grid: &mut CellGrid,
        kernel: &PairKernel<'_>,
        registry: &ComponentRegistry,
    ) -> MacroAccum {
        self.begin(grid, registry);
        let acc = self.compute(grid, kernel, CellFilter::All);
        self.finish(grid);
        acc
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::components::Component;
    use crate::kernel::scalar;
    use crate::molecule::Molecule;

    fn lj_registry(rc: f64) -> ComponentRegistry {
        ComponentRegistry::build(vec![Component::single_lj(1.0, 1.0, 1.0)], rc).unwrap()
    }

    /// Deterministic jittered lattice inside the box; minimum separation
    /// stays near 0.8 so no pair sits on the steep core where summation
    /// order would dominate the comparison.
    fn scatter_positions(n: usize) -> Vec<[f64; 3]> {
        let mut seed = 12345u64;
        let mut next = move || {
            seed = seed.wrapping_mul(6_364_136_223_846_793_005).wrapping_add(1);
            (seed >> 33) as f64 / f64::from(1u32 << 31)
        };
        (0..n)
            .map(|i| {
                [
                    0.7 + 1.1 * ((i % 8) as f64) + 0.15 * next(),
                    0.7 + 1.1 * (((i / 8) % 8) as f64) + 0.15 * next(),
                    0.7 + 1.1 * ((i / 64) as f64) + 0.15 * next(),
                ]
            })
            .collect()
    }

    #[test]
    fn traversal_matches_scalar_reference() {
        let rc = 2.5;
        let registry = lj_registry(rc);
        let kernel = PairKernel::new(&registry, rc, rc, 0.0);
        let positions = scatter_positions(40);

        let mut grid = CellGrid::new([0.0; 3], [10.0; 3], rc).unwrap();
        let mut refs = Vec::new();
        for (i, &p) in positions.iter().enumerate() {
            refs.push(grid.insert_owned(Molecule::new(i as u64, 0, p, [0.0; 3])));
        }
        let mut trav = Traversal::new();
        let acc = trav.run(&mut grid, &kernel, &registry);

        let mut reference: Vec<Molecule> = positions
            .iter()
            .enumerate()
            .map(|(i, &p)| Molecule::new(i as u64, 0, p, [0.0; 3]))
            .collect();
        let ref_acc = scalar::compute_all_pairs(&mut reference, &registry, rc, rc, 0.0);

        let rel = |a: f64, b: f64| (a - b).abs() / b.abs().max(1e-10);
        assert!(
            rel(acc.upot6_lj, ref_acc.upot6_lj) < 1e-12,
            "U6: {} vs {}",
            acc.upot6_lj,
            ref_acc.upot6_lj
        );
        assert!(rel(acc.virial, ref_acc.virial) < 1e-12);

        for (r, m_ref) in refs.iter().zip(reference.iter()) {
            let m = grid.arena.get(*r).unwrap();
            for d in 0..3 {
                let err = (m.f[d] - m_ref.f[d]).abs();
                assert!(
                    err < 1e-11 * m_ref.f[d].abs().max(1.0),
                    "molecule {} f[{d}]: {} vs {}",
                    m.id,
                    m.f[d],
                    m_ref.f[d]
                );
            }
        }
    }

    #[test]
    fn empty_grid_traversal_is_zero() {
        let registry = lj_registry(2.5);
        let kernel = PairKernel::new(&registry, 2.5, 2.5, 0.0);
        let mut grid = CellGrid::new([0.0; 3], [10.0; 3], 2.5).unwrap();
        let mut trav = Traversal::new();
        let acc = trav.run(&mut grid, &kernel, &registry);
        assert_eq!(acc.upot6_lj, 0.0);
        assert_eq!(acc.virial, 0.0);
    }

    #[test]
    fn inner_and_outer_passes_sum_to_full() {
        let rc = 2.5;
        let registry = lj_registry(rc);
        let kernel = PairKernel::new(&registry, rc, rc, 0.0);
        let positions = scatter_positions(60);

        let run_filtered = |split: bool| -> (f64, f64) {
            let mut grid = CellGrid::new([0.0; 3], [10.0; 3], rc).unwrap();
            for (i, &p) in positions.iter().enumerate() {
                grid.insert_owned(Molecule::new(i as u64, 0, p, [0.0; 3]));
            }
            let mut trav = Traversal::new();
            trav.begin(&grid, &registry);
            let acc = if split {
                let mut a = trav.compute(&grid, &kernel, CellFilter::InnerOnly);
                let b = trav.compute(&grid, &kernel, CellFilter::OuterOnly);
                a.merge(&b);
                a
            } else {
                trav.compute(&grid, &kernel, CellFilter::All)
            };
            trav.finish(&mut grid);
            (acc.upot6_lj, acc.virial)
        };

        let (u_full, v_full) = run_filtered(false);
        let (u_split, v_split) = run_filtered(true);
        assert!((u_full - u_split).abs() < 1e-9 * u_full.abs().max(1.0));
        assert!((v_full - v_split).abs() < 1e-9 * v_full.abs().max(1.0));
    }

    #[test]
    fn halo_pair_forces_apply_but_do_not_count_from_high_side() {
        // One owned molecule near the low x boundary, one halo copy just
        // outside: forces must appear on the owned molecule; energy counts
        // only when the owned cell index is lower than the halo's, which is
        // false on the low side.
        let rc = 2.5;
        let registry = lj_registry(rc);
        let kernel = PairKernel::new(&registry, rc, rc, 0.0);
        let mut grid = CellGrid::new([0.0; 3], [10.0; 3], rc).unwrap();
        let r_own = grid.insert_owned(Molecule::new(1, 0, [0.5, 5.0, 5.0], [0.0; 3]));
        grid.insert_halo(Molecule::new(2, 0, [-0.6, 5.0, 5.0], [0.0; 3]), false);
        let mut trav = Traversal::new();
        let acc = trav.run(&mut grid, &kernel, &registry);
        let own = grid.arena.get(r_own).unwrap();
        assert!(own.f[0].abs() > 1e-6, "force must act across the boundary");
        assert_eq!(acc.upot6_lj, 0.0, "low-side halo pair must not count U");

        // Mirror setup on the high side: energy counts exactly once there.
        let mut grid2 = CellGrid::new([0.0; 3], [10.0; 3], rc).unwrap();
        grid2.insert_owned(Molecule::new(1, 0, [9.5, 5.0, 5.0], [0.0; 3]));
        grid2.insert_halo(Molecule::new(2, 0, [10.6, 5.0, 5.0], [0.0; 3]), false);
        let mut trav2 = Traversal::new();
        let acc2 = trav2.run(&mut grid2, &kernel, &registry);
        assert!(acc2.upot6_lj.abs() > 0.0, "high-side halo pair counts U");
    }

    #[test]
    fn parallel_traversal_matches_sequential() {
        let rc = 2.5;
        let registry = lj_registry(rc);
        let kernel = PairKernel::new(&registry, rc, rc, 0.0);
        let positions = scatter_positions(64);

        let run = |parallel: bool| -> f64 {
            let mut grid = CellGrid::new([0.0; 3], [10.0; 3], rc).unwrap();
            for (i, &p) in positions.iter().enumerate() {
                grid.insert_owned(Molecule::new(i as u64, 0, p, [0.0; 3]));
            }
            let mut trav = Traversal::new();
            trav.parallel = parallel;
            trav.run(&mut grid, &kernel, &registry).upot6_lj
        };
        let u_seq = run(false);
        let u_par = run(true);
        assert!(
            (u_seq - u_par).abs() < 1e-10 * u_seq.abs().max(1.0),
            "sequential {u_seq} vs parallel {u_par}"
        );
    }

    #[test]
    fn slab_pool_is_reused_between_steps() {
        let registry = lj_registry(2.5);
        let kernel = PairKernel::new(&registry, 2.5, 2.5, 0.0);
        let mut grid = CellGrid::new([0.0; 3], [10.0; 3], 2.5).unwrap();
        grid.insert_owned(Molecule::new(1, 0, [5.0; 3], [0.0; 3]));
        let mut trav = Traversal::new();
        let _ = trav.run(&mut grid, &kernel, &registry);
        let pooled = trav.pool.lock().unwrap().available();
        assert_eq!(pooled, grid.n_cells());
        let _ = trav.run(&mut grid, &kernel, &registry);
        assert_eq!(trav.pool.lock().unwrap().available(), grid.n_cells());
    }
}

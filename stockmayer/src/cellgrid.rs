// SPDX-License-Identifier: AGPL-3.0-only

//! Cell-linked grid over the rank's subdomain plus the molecule arena.
//!
//! Cells are a uniform cubic grid with edge length at least the cutoff
//! radius, wrapped by a one-cell halo layer holding read-only copies of
//! remote (or periodically shifted local) molecules. Cells reference
//! molecules through generational arena indices; re-binning moves indices,
//! never pointers, and a stale reference is detectable by its generation.
//!
//! Invariants: every owned molecule resides in exactly one non-halo cell;
//! halo cells hold only copies (same `id` as the remote owner); a molecule
//! moving more than one cell per step is a configuration error (warned).

use std::collections::HashSet;

use log::warn;

use crate::error::SimError;
use crate::molecule::Molecule;

/// Generational reference into the molecule arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MolRef {
    /// Slot index.
    pub index: u32,
    /// Generation the reference was created under.
    pub generation: u32,
}

#[derive(Debug)]
struct Slot {
    generation: u32,
    mol: Option<Molecule>,
}

/// Arena of molecules with generational slot reuse.
#[derive(Debug, Default)]
pub struct MoleculeArena {
    slots: Vec<Slot>,
    free: Vec<u32>,
    len: usize,
}

impl MoleculeArena {
    /// Number of live molecules.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// True if no molecules are stored.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Insert a molecule, reusing a free slot if available.
    pub fn insert(&mut self, mol: Molecule) -> MolRef {
        self.len += 1;
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.mol = Some(mol);
            return MolRef {
                index,
                generation: slot.generation,
            };
        }
        let index = u32::try_from(self.slots.len()).unwrap_or(u32::MAX);
        self.slots.push(Slot {
            generation: 0,
            mol: Some(mol),
        });
        MolRef {
            index,
            generation: 0,
        }
    }

    /// Remove a molecule; the slot's generation advances so stale
    /// references miss.
    pub fn remove(&mut self, r: MolRef) -> Option<Molecule> {
        let slot = self.slots.get_mut(r.index as usize)?;
        if slot.generation != r.generation || slot.mol.is_none() {
            return None;
        }
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(r.index);
        self.len -= 1;
        slot.mol.take()
    }

    /// Shared access through a live reference.
    #[must_use]
    pub fn get(&self, r: MolRef) -> Option<&Molecule> {
        let slot = self.slots.get(r.index as usize)?;
        if slot.generation != r.generation {
            return None;
        }
        slot.mol.as_ref()
    }

    /// Mutable access through a live reference.
    pub fn get_mut(&mut self, r: MolRef) -> Option<&mut Molecule> {
        let slot = self.slots.get_mut(r.index as usize)?;
        if slot.generation != r.generation {
            return None;
        }
        slot.mol.as_mut()
    }
}

/// Classification of a cell within the rank's grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellKind {
    /// No neighbor is a halo cell; safe to compute during in-flight exchange.
    Inner,
    /// Owned cell with at least one halo neighbor.
    Boundary,
    /// Outer layer holding remote copies.
    Halo,
}

/// One cell: member references plus its classification.
#[derive(Debug)]
pub struct Cell {
    /// Arena references of the molecules binned here.
    pub members: Vec<MolRef>,
    /// Inner / boundary / halo.
    pub kind: CellKind,
}

/// The 13 forward half-shell neighbor offsets: each adjacent cell pair is
/// enumerated exactly once, from the lexicographically smaller side.
pub const HALF_SHELL: [[i64; 3]; 13] = [
    [1, 0, 0],
    [-1, 1, 0],
    [0, 1, 0],
    [1, 1, 0],
    [-1, -1, 1],
    [0, -1, 1],
    [1, -1, 1],
    [-1, 0, 1],
    [0, 0, 1],
    [1, 0, 1],
    [-1, 1, 1],
    [0, 1, 1],
    [1, 1, 1],
];

/// Uniform cell grid with halo layer and owned molecule arena.
#[derive(Debug)]
pub struct CellGrid {
    /// Total cells per dimension, halo included.
    dims: [usize; 3],
    cell_len: [f64; 3],
    box_min: [f64; 3],
    box_max: [f64; 3],
    cells: Vec<Cell>,
    /// Copies present in the halo layer, keyed by (id, cell): corner
    /// chaining legitimately places several copies of one molecule in
    /// different halo cells, but two in the same cell alias.
    halo_ids: HashSet<(u64, usize)>,
    /// Molecule storage for this rank (owned and halo copies).
    pub arena: MoleculeArena,
}

impl CellGrid {
    /// Build a grid over `[box_min, box_max)` with cell edge ≥ `cutoff`.
    ///
    /// # Errors
    ///
    /// [`SimError::Geometry`] if any extent is non-positive or holds less
    /// than one full cutoff.
    pub fn new(box_min: [f64; 3], box_max: [f64; 3], cutoff: f64) -> Result<Self, SimError> {
        let mut inner = [0usize; 3];
        let mut cell_len = [0.0f64; 3];
        for d in 0..3 {
            let extent = box_max[d] - box_min[d];
            if !(extent > 0.0) || !(cutoff > 0.0) {
                return Err(SimError::Geometry(format!(
                    "bad subdomain extent {extent} or cutoff {cutoff} in dim {d}"
                )));
            }
            let n = (extent / cutoff).floor() as usize;
            if n < 1 {
                return Err(SimError::Geometry(format!(
                    "subdomain extent {extent} holds less than one cutoff {cutoff} in dim {d}"
                )));
            }
            inner[d] = n;
            cell_len[d] = extent / n as f64;
        }
        let dims = [inner[0] + 2, inner[1] + 2, inner[2] + 2];
        let n_cells = dims[0] * dims[1] * dims[2];
        let mut cells = Vec::with_capacity(n_cells);
        for cz in 0..dims[2] {
            for cy in 0..dims[1] {
                for cx in 0..dims[0] {
                    let on_halo = cx == 0
                        || cy == 0
                        || cz == 0
                        || cx == dims[0] - 1
                        || cy == dims[1] - 1
                        || cz == dims[2] - 1;
                    let on_boundary = cx == 1
                        || cy == 1
                        || cz == 1
                        || cx == dims[0] - 2
                        || cy == dims[1] - 2
                        || cz == dims[2] - 2;
                    let kind = if on_halo {
                        CellKind::Halo
                    } else if on_boundary {
                        CellKind::Boundary
                    } else {
                        CellKind::Inner
                    };
                    cells.push(Cell {
                        members: Vec::new(),
                        kind,
                    });
                }
            }
        }
        Ok(Self {
            dims,
            cell_len,
            box_min,
            box_max,
            cells,
            halo_ids: HashSet::new(),
            arena: MoleculeArena::default(),
        })
    }

    /// Total cell count, halo included.
    #[must_use]
    pub fn n_cells(&self) -> usize {
        self.cells.len()
    }

    /// Grid dimensions (halo included).
    #[must_use]
    pub const fn dims(&self) -> [usize; 3] {
        self.dims
    }

    /// Cell edge lengths.
    #[must_use]
    pub const fn cell_len(&self) -> [f64; 3] {
        self.cell_len
    }

    /// Subdomain lower corner.
    #[must_use]
    pub const fn box_min(&self) -> [f64; 3] {
        self.box_min
    }

    /// Subdomain upper corner.
    #[must_use]
    pub const fn box_max(&self) -> [f64; 3] {
        self.box_max
    }

    /// Linear index from grid coordinates.
    #[must_use]
    pub const fn index_of(&self, c: [usize; 3]) -> usize {
        c[0] + self.dims[0] * (c[1] + self.dims[1] * c[2])
    }

    /// Grid coordinates from a linear index.
    #[must_use]
    pub const fn coords_of(&self, idx: usize) -> [usize; 3] {
        let x = idx % self.dims[0];
        let y = (idx / self.dims[0]) % self.dims[1];
        let z = idx / (self.dims[0] * self.dims[1]);
        [x, y, z]
    }

    /// Cell holding a position. Positions up to one cell outside the
    /// subdomain land in halo cells; anything further is clamped.
    #[must_use]
    pub fn cell_for_position(&self, pos: [f64; 3]) -> usize {
        let mut c = [0usize; 3];
        for d in 0..3 {
            let rel = (pos[d] - self.box_min[d]) / self.cell_len[d];
            let idx = rel.floor() as i64 + 1;
            c[d] = idx.clamp(0, self.dims[d] as i64 - 1) as usize;
        }
        self.index_of(c)
    }

    /// True if this rank owns the position.
    #[must_use]
    pub fn owns_position(&self, pos: [f64; 3]) -> bool {
        (0..3).all(|d| pos[d] >= self.box_min[d] && pos[d] < self.box_max[d])
    }

    /// Shared cell access.
    #[must_use]
    pub fn cell(&self, idx: usize) -> &Cell {
        &self.cells[idx]
    }

    /// One cell's member list together with mutable arena access (the
    /// postprocess scatter writes molecules while reading the list).
    pub fn cell_members_and_arena_mut(&mut self, idx: usize) -> (&[MolRef], &mut MoleculeArena) {
        let this = &mut *self;
        (&this.cells[idx].members, &mut this.arena)
    }

    /// Insert an owned molecule, binning it by position.
    pub fn insert_owned(&mut self, mol: Molecule) -> MolRef {
        let idx = self.cell_for_position(mol.r);
        let r = self.arena.insert(mol);
        self.cells[idx].members.push(r);
        r
    }

    /// Insert a halo copy. Returns `false` (and drops the copy) if
    /// `dedup` is set and a copy with the same id already occupies the
    /// same halo cell (a local periodic copy and a received copy aliasing
    /// one molecule).
    pub fn insert_halo(&mut self, mol: Molecule, dedup: bool) -> bool {
        let idx = self.cell_for_position(mol.r);
        if dedup && self.halo_ids.contains(&(mol.id, idx)) {
            return false;
        }
        self.halo_ids.insert((mol.id, idx));
        let r = self.arena.insert(mol);
        self.cells[idx].members.push(r);
        true
    }

    /// Remove all halo copies (end-of-step cleanup and pre-exchange reset).
    pub fn clear_halo(&mut self) {
        // Split borrow: cells and arena are distinct fields.
        let arena = &mut self.arena;
        for cell in &mut self.cells {
            if cell.kind == CellKind::Halo {
                for r in cell.members.drain(..) {
                    arena.remove(r);
                }
            }
        }
        self.halo_ids.clear();
    }

    /// Remove and return every owned molecule whose position has left the
    /// subdomain (candidates for the LEAVING exchange).
    pub fn collect_leaving(&mut self) -> Vec<Molecule> {
        let mut out = Vec::new();
        let arena = &mut self.arena;
        let box_min = self.box_min;
        let box_max = self.box_max;
        for cell in &mut self.cells {
            if cell.kind == CellKind::Halo {
                continue;
            }
            cell.members.retain(|&r| {
                let inside = arena
                    .get(r)
                    .is_some_and(|m| (0..3).all(|d| m.r[d] >= box_min[d] && m.r[d] < box_max[d]));
                if inside {
                    true
                } else {
                    if let Some(m) = arena.remove(r) {
                        out.push(m);
                    }
                    false
                }
            });
        }
        out
    }

    /// Clones of owned molecules whose center of mass lies in
    /// `[low, high)` (halo-copy packing).
    #[must_use]
    pub fn collect_region(&self, low: [f64; 3], high: [f64; 3]) -> Vec<Molecule> {
        let mut out = Vec::new();
        for cell in &self.cells {
            if cell.kind == CellKind::Halo {
                continue;
            }
            for &r in &cell.members {
                if let Some(m) = self.arena.get(r) {
                    if (0..3).all(|d| m.r[d] >= low[d] && m.r[d] < high[d]) {
                        out.push(m.clone());
                    }
                }
            }
        }
        out
    }

    /// Clones of all molecules — owned and existing halo copies — inside
    /// `[low, high)`. Halo copies participate so corner images chain
    /// across the per-dimension periodic population passes.
    #[must_use]
    pub fn collect_region_with_halo(&self, low: [f64; 3], high: [f64; 3]) -> Vec<Molecule> {
        let mut out = Vec::new();
        for cell in &self.cells {
            for &r in &cell.members {
                if let Some(m) = self.arena.get(r) {
                    if (0..3).all(|d| m.r[d] >= low[d] && m.r[d] < high[d]) {
                        out.push(m.clone());
                    }
                }
            }
        }
        out
    }

    /// Re-bin every molecule after positions changed. Warns if anything
    /// jumped more than one cell (halo construction is then unreliable).
    pub fn update(&mut self) {
        let mut moves: Vec<(usize, usize, MolRef)> = Vec::new();
        let mut too_fast = 0usize;
        for (idx, cell) in self.cells.iter().enumerate() {
            for &r in &cell.members {
                if let Some(m) = self.arena.get(r) {
                    let new_idx = self.cell_for_position(m.r);
                    if new_idx != idx {
                        let a = self.coords_of(idx);
                        let b = self.coords_of(new_idx);
                        if (0..3).any(|d| (a[d] as i64 - b[d] as i64).abs() > 1) {
                            too_fast += 1;
                        }
                        moves.push((idx, new_idx, r));
                    }
                }
            }
        }
        for (from, to, r) in moves {
            self.cells[from].members.retain(|&x| x != r);
            self.cells[to].members.push(r);
        }
        if too_fast > 0 {
            warn!("{too_fast} molecule(s) moved more than one cell in a single step");
        }
    }

    /// Apply `f` to each owned molecule (non-halo cells).
    pub fn for_each_owned_mut(&mut self, mut f: impl FnMut(&mut Molecule)) {
        let arena = &mut self.arena;
        for cell in &self.cells {
            if cell.kind == CellKind::Halo {
                continue;
            }
            for &r in &cell.members {
                if let Some(m) = arena.get_mut(r) {
                    f(m);
                }
            }
        }
    }

    /// Apply `f` to each owned molecule, immutably.
    pub fn for_each_owned(&self, mut f: impl FnMut(&Molecule)) {
        for cell in &self.cells {
            if cell.kind == CellKind::Halo {
                continue;
            }
            for &r in &cell.members {
                if let Some(m) = self.arena.get(r) {
                    f(m);
                }
            }
        }
    }

    /// Number of owned molecules.
    #[must_use]
    pub fn n_owned(&self) -> usize {
        self.cells
            .iter()
            .filter(|c| c.kind != CellKind::Halo)
            .map(|c| c.members.len())
            .sum()
    }

    /// Enumerate each adjacent cell pair once via the forward half shell.
    pub fn for_each_pair(&self, mut f: impl FnMut(usize, usize)) {
        for cz in 0..self.dims[2] {
            for cy in 0..self.dims[1] {
                for cx in 0..self.dims[0] {
                    let c1 = self.index_of([cx, cy, cz]);
                    for off in &HALF_SHELL {
                        let nx = cx as i64 + off[0];
                        let ny = cy as i64 + off[1];
                        let nz = cz as i64 + off[2];
                        if nx < 0
                            || ny < 0
                            || nz < 0
                            || nx >= self.dims[0] as i64
                            || ny >= self.dims[1] as i64
                            || nz >= self.dims[2] as i64
                        {
                            continue;
                        }
                        let c2 = self.index_of([nx as usize, ny as usize, nz as usize]);
                        f(c1, c2);
                    }
                }
            }
        }
    }
}

// SPDX-License-Identifier: AGPL-3.0-only

//! Spatial decomposition and halo exchange.
//!
//! A decomposition binds each rank to a sub-volume of the global box and
//! carries the two collective concerns of a step: transporting molecules
//! (leavers to their new owner, halo copies to every neighbor whose halo
//! layer spans them) and reducing macroscopic sums. The sequential
//! decomposition serves single-rank runs with purely local periodic wrap
//! and halo population; the Cartesian decomposition connects a grid of
//! ranks through an in-process channel transport and implements the
//! one-stage full-shell and three-stage directional exchange schemes.

pub mod cartesian;
pub mod partner;
pub mod regions;
pub mod sequential;

pub use cartesian::{CartesianDecomposition, RankTopology};
pub use sequential::SequentialDecomposition;

use crate::cellgrid::CellGrid;
use crate::error::SimError;

/// What an exchange transports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    /// Molecules whose COM left the rank's subdomain.
    LeavingOnly,
    /// Read-only copies of molecules within one cutoff of the boundary.
    HaloCopies,
    /// Both, in one message.
    LeavingAndHaloCopies,
}

impl MessageType {
    /// True if the exchange moves ownership.
    #[must_use]
    pub const fn sends_leaving(self) -> bool {
        matches!(self, Self::LeavingOnly | Self::LeavingAndHaloCopies)
    }

    /// True if the exchange populates halos.
    #[must_use]
    pub const fn sends_halo(self) -> bool {
        matches!(self, Self::HaloCopies | Self::LeavingAndHaloCopies)
    }
}

/// A rank's view of the spatial decomposition.
pub trait Decomposition: Send {
    /// This rank's index.
    fn rank(&self) -> usize;

    /// Total number of ranks.
    fn num_ranks(&self) -> usize;

    /// This rank's bounding box within the global box.
    fn bounding_box(&self) -> ([f64; 3], [f64; 3]);

    /// True if this rank owns the (already wrapped) global position.
    fn owns_position(&self, pos: [f64; 3]) -> bool {
        let (lo, hi) = self.bounding_box();
        (0..3).all(|d| pos[d] >= lo[d] && pos[d] < hi[d])
    }

    /// Number of exchange stages (1 for full shell, 3 for directional).
    fn stage_count(&self) -> usize;

    /// Start one exchange stage: handle covered dimensions locally and
    /// post this stage's outgoing messages. Non-blocking.
    ///
    /// # Errors
    ///
    /// [`SimError::Deadlock`] on collective timeout.
    fn stage_init(
        &mut self,
        grid: &mut CellGrid,
        stage: usize,
        msg_type: MessageType,
    ) -> Result<(), SimError>;

    /// Complete one exchange stage: poll for the expected messages,
    /// unpacking each as it arrives, and install the molecules.
    ///
    /// # Errors
    ///
    /// [`SimError::Deadlock`] if a neighbor stops responding past the hard
    /// timeout.
    fn stage_finish(
        &mut self,
        grid: &mut CellGrid,
        stage: usize,
        msg_type: MessageType,
    ) -> Result<(), SimError>;

    /// Transport leavers and/or halo copies, installing results into the
    /// grid, and re-bin. Completes the full exchange before returning.
    /// The caller may instead drive the stages itself to overlap inner-cell
    /// computation with the in-flight exchange.
    ///
    /// # Errors
    ///
    /// [`SimError::Deadlock`] if a neighbor stops responding past the hard
    /// timeout.
    fn exchange_molecules(
        &mut self,
        grid: &mut CellGrid,
        msg_type: MessageType,
    ) -> Result<(), SimError> {
        for stage in 0..self.stage_count() {
            self.stage_init(grid, stage, msg_type)?;
            self.stage_finish(grid, stage, msg_type)?;
        }
        grid.update();
        Ok(())
    }

    /// Element-wise sum of `vals` across all ranks (in place).
    ///
    /// # Errors
    ///
    /// [`SimError::Deadlock`] on collective timeout.
    fn reduce_sum(&self, vals: &mut [f64]) -> Result<(), SimError>;

    /// Synchronization point across all ranks.
    ///
    /// # Errors
    ///
    /// [`SimError::Deadlock`] on collective timeout.
    fn barrier(&self) -> Result<(), SimError>;
}

/// Periodic wrap of a position into `[0, length)` per dimension.
#[must_use]
pub fn wrap_position(mut pos: [f64; 3], length: [f64; 3]) -> [f64; 3] {
    for d in 0..3 {
        pos[d] -= length[d] * (pos[d] / length[d]).floor();
        // floor() of a value epsilon-below an exact multiple can still
        // yield pos == length after the subtraction
        if pos[d] >= length[d] {
            pos[d] -= length[d];
        }
    }
    pos
}

/// Sequential handler for a dimension the subdomain fully covers: wrap the
/// coordinate periodically back into the box. Molecules stay owned; only
/// the coordinate changes (re-binning is the caller's final step).
pub fn handle_domain_leaving_dim(grid: &mut CellGrid, length: [f64; 3], d: usize) {
    grid.for_each_owned_mut(|m| {
        if m.r[d] < 0.0 || m.r[d] >= length[d] {
            m.r[d] -= length[d] * (m.r[d] / length[d]).floor();
            if m.r[d] >= length[d] {
                m.r[d] -= length[d];
            }
        }
    });
}

/// Sequential halo population for a fully covered dimension: every owned
/// molecule within one cutoff of either boundary plane gets a copy shifted
/// by ±L into the opposite halo layer.
pub fn populate_halo_dim(grid: &mut CellGrid, length: [f64; 3], cutoff: f64, d: usize) {
    let (lo, hi) = (grid.box_min(), grid.box_max());

    // Copies of the low band appear beyond the high face and vice versa.
    // The band spans the full extent of the other dimensions so copies made
    // by an earlier dimension's pass are chained into the corners.
    let mut extended_lo = lo;
    let mut extended_hi = hi;
    for dd in 0..3 {
        if dd != d {
            extended_lo[dd] = lo[dd] - cutoff;
            extended_hi[dd] = hi[dd] + cutoff;
        }
    }

    let mut low_region_lo = extended_lo;
    let mut low_region_hi = extended_hi;
    low_region_hi[d] = lo[d] + cutoff;
    let mut high_region_lo = extended_lo;
    let mut high_region_hi = extended_hi;
    high_region_lo[d] = hi[d] - cutoff;

    let mut copies = Vec::new();
    for mut m in grid.collect_region_with_halo(low_region_lo, low_region_hi) {
        m.r[d] += length[d];
        copies.push(m);
    }
    for mut m in grid.collect_region_with_halo(high_region_lo, high_region_hi) {
        m.r[d] -= length[d];
        copies.push(m);
    }
    for m in copies {
        grid.insert_halo(m, true);
    }
}

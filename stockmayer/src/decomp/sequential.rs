// SPDX-License-Identifier: AGPL-3.0-only

//! Single-rank decomposition.
//!
//! The subdomain spans the whole global box, so every dimension takes the
//! sequential shortcut: leavers are wrapped periodically in place and the
//! halo layer is populated with shifted copies, dimension by dimension so
//! the corner images chain. Reductions and barriers are identities.

use crate::cellgrid::CellGrid;
use crate::error::SimError;

use super::{handle_domain_leaving_dim, populate_halo_dim, Decomposition, MessageType};

/// The one-rank decomposition over the full box.
#[derive(Debug)]
pub struct SequentialDecomposition {
    length: [f64; 3],
    cutoff: f64,
}

impl SequentialDecomposition {
    /// Cover the whole global box with this single rank.
    #[must_use]
    pub const fn new(length: [f64; 3], cutoff: f64) -> Self {
        Self { length, cutoff }
    }
}

impl Decomposition for SequentialDecomposition {
    fn rank(&self) -> usize {
        0
    }

    fn num_ranks(&self) -> usize {
        1
    }

    fn bounding_box(&self) -> ([f64; 3], [f64; 3]) {
        ([0.0; 3], self.length)
    }

    fn stage_count(&self) -> usize {
        1
    }

    fn stage_init(
        &mut self,
        grid: &mut CellGrid,
        _stage: usize,
        msg_type: MessageType,
    ) -> Result<(), SimError> {
        if msg_type.sends_leaving() {
            for d in 0..3 {
                handle_domain_leaving_dim(grid, self.length, d);
            }
        }
        if msg_type.sends_halo() {
            for d in 0..3 {
                populate_halo_dim(grid, self.length, self.cutoff, d);
            }
        }
        Ok(())
    }

    fn stage_finish(
        &mut self,
        _grid: &mut CellGrid,
        _stage: usize,
        _msg_type: MessageType,
    ) -> Result<(), SimError> {
        Ok(())
    }

    fn reduce_sum(&self, _vals: &mut [f64]) -> Result<(), SimError> {
        Ok(())
    }

    fn barrier(&self) -> Result<(), SimError> {
        Ok(())
    }
}

// SPDX-License-Identifier: AGPL-3.0-only

//! Cutoff mask construction (the dist lookup).
//!
//! For one source molecule and one target site-kind array, fill the
//! target's dist-lookup array with per-lane bit masks: entry j is all-ones
//! iff the source COM and the target site's COM broadcast are closer than
//! the cutoff. Under the single-cell policy two extra conditions apply:
//! a zero COM separation marks sites of the same molecule (excluded), and
//! `j > i_site` keeps each intra-cell pair enumerated once.
//!
//! The vector loop runs over the padded length; tail entries beyond the
//! real site count are forced to zero so the force loops may always consume
//! whole vectors. The disjunction of all masks is returned as the caller's
//! early-out predicate.

use crate::simd;
use crate::simd::DVec;

/// Traversal policy for the mask lower bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Policy {
    /// Source and target are the same cell: skip same-molecule sites and
    /// enforce `j > i_site`.
    SingleCell,
    /// Distinct cells: distance is the only condition.
    CellPair,
}

/// Fill `dist` (padded length) for one source molecule against a target
/// site array; returns true if any lane survives.
///
/// `t_m_r_*` are the target's COM-broadcast coordinate arrays, `n_real`
/// the unpadded site count. Under [`Policy::SingleCell`], `i_site` is the
/// source molecule's first index in the same kind array: entries below it
/// belong to earlier molecules (their pairs were counted when they were the
/// source), entries of the source molecule itself are excluded by the
/// zero-separation test. Ignored for cell pairs.
#[allow(clippy::too_many_arguments)]
pub fn calc_dist_lookup(
    policy: Policy,
    src_mol_r: [f64; 3],
    i_site: usize,
    n_real: usize,
    rc2: f64,
    t_m_r_x: &[f64],
    t_m_r_y: &[f64],
    t_m_r_z: &[f64],
    dist: &mut [f64],
) -> bool {
    let n_padded = dist.len();
    debug_assert_eq!(n_padded % simd::LANES, 0);

    let m1x = simd::broadcast(src_mol_r[0]);
    let m1y = simd::broadcast(src_mol_r[1]);
    let m1z = simd::broadcast(src_mol_r[2]);
    let rc2v = simd::broadcast(rc2);
    let zero = simd::zero();

    let mut compute_any: DVec = simd::zero();
    let mut j = 0;
    while j < n_padded {
        let dx = m1x - simd::load(t_m_r_x, j);
        let dy = m1y - simd::load(t_m_r_y, j);
        let dz = m1z - simd::load(t_m_r_z, j);
        let m_r2 = dx * dx + dy * dy + dz * dz;

        let mut mask = simd::less_than(m_r2, rc2v);
        if policy == Policy::SingleCell {
            // Same molecule iff the COM separation is exactly zero.
            mask = simd::apply_mask(mask, simd::mask_not(simd::equals(m_r2, zero)));
        }
        simd::store(dist, j, mask);
        compute_any = compute_any | mask;
        j += simd::LANES;
    }

    // Zero the padded tail and, for the single-cell policy, the entries of
    // earlier molecules (each pair counted from one side).
    let lower = match policy {
        Policy::SingleCell => i_site.min(n_real),
        Policy::CellPair => 0,
    };
    for m in dist.iter_mut().take(lower) {
        *m = simd::mask_off();
    }
    for m in dist.iter_mut().take(n_padded).skip(n_real) {
        *m = simd::mask_off();
    }

    // The fix-ups may have cleared the only set lanes; re-derive the
    // predicate from the stored masks.
    if !simd::any(compute_any) {
        return false;
    }
    dist.iter().any(|m| m.to_bits() != 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coords(xs: &[f64]) -> (Vec<f64>, Vec<f64>, Vec<f64>) {
        let n = simd::ceil_to_lanes(xs.len());
        let mut x = xs.to_vec();
        x.resize(n, 0.0);
        (x, vec![0.0; n], vec![0.0; n])
    }

    #[test]
    fn cell_pair_marks_in_range_sites() {
        let (x, y, z) = coords(&[1.0, 2.0, 3.0, 9.0, 1.5]);
        let mut dist = vec![0.0; x.len()];
        let any = calc_dist_lookup(
            Policy::CellPair,
            [0.0; 3],
            0,
            5,
            6.25, // rc = 2.5
            &x,
            &y,
            &z,
            &mut dist,
        );
        assert!(any);
        let set: Vec<bool> = dist.iter().map(|m| m.to_bits() != 0).collect();
        assert_eq!(&set[..5], &[true, true, false, false, true]);
    }

    #[test]
    fn padded_tail_is_cleared() {
        // Padded slots have zero coordinates; for a source at a distance
        // below the cutoff they would pass the distance test.
        let (x, y, z) = coords(&[1.0, 1.0, 1.0]);
        let mut dist = vec![0.0; x.len()];
        let any = calc_dist_lookup(
            Policy::CellPair,
            [0.5, 0.0, 0.0],
            0,
            3,
            100.0,
            &x,
            &y,
            &z,
            &mut dist,
        );
        assert!(any);
        for m in &dist[3..] {
            assert_eq!(m.to_bits(), 0, "tail lane must be masked off");
        }
    }

    #[test]
    fn single_cell_excludes_self_and_lower_indices() {
        // Source molecule COM at 1.0: site 1 belongs to it (separation 0),
        // sites 0..=i are below the policy lower bound.
        let (x, y, z) = coords(&[0.0, 1.0, 2.0, 3.0]);
        let mut dist = vec![0.0; x.len()];
        let any = calc_dist_lookup(
            Policy::SingleCell,
            [1.0, 0.0, 0.0],
            1,
            4,
            100.0,
            &x,
            &y,
            &z,
            &mut dist,
        );
        assert!(any);
        let set: Vec<bool> = dist.iter().map(|m| m.to_bits() != 0).collect();
        // j=0: below lower bound; j=1: same molecule; j=2,3: live.
        assert_eq!(&set[..4], &[false, false, true, true]);
    }

    #[test]
    fn early_out_when_everything_masked() {
        let (x, y, z) = coords(&[50.0, 60.0]);
        let mut dist = vec![0.0; x.len()];
        let any = calc_dist_lookup(
            Policy::CellPair,
            [0.0; 3],
            0,
            2,
            6.25,
            &x,
            &y,
            &z,
            &mut dist,
        );
        assert!(!any);
        assert!(dist.iter().all(|m| m.to_bits() == 0));
    }

    #[test]
    fn lower_bound_clearing_defeats_stale_predicate() {
        // Only site 0 is in range but the policy excludes it: the early
        // vector pass saw a lane, the fix-up cleared it, so the final
        // predicate must be false.
        let (x, y, z) = coords(&[1.0, 50.0, 60.0, 70.0]);
        let mut dist = vec![0.0; x.len()];
        let any = calc_dist_lookup(
            Policy::SingleCell,
            [0.0; 3],
            2,
            4,
            6.25,
            &x,
            &y,
            &z,
            &mut dist,
        );
        assert!(!any);
    }
}

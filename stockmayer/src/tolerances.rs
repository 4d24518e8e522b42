// SPDX-License-Identifier: AGPL-3.0-only

//! Centralized, justified numeric thresholds.
//!
//! Every tolerance used by a test or validation binary lives here with a
//! short justification, so a changed threshold is a reviewed decision and
//! not a scattered magic number.

// ═══════════════════════════════════════════════════════════════════
// Kernel and force tolerances
// ═══════════════════════════════════════════════════════════════════

/// SIMD vs scalar kernel parity: relative error.
///
/// Both paths evaluate the same f64 expressions; the only difference is
/// summation order (vector lanes + horizontal add vs sequential). For
/// per-pair quantities of O(1) this stays within a few ulp; 1e-12 relative
/// leaves two orders of margin.
pub const SIMD_SCALAR_REL: f64 = 1e-12;

/// Newton's third law residual for an isolated pair.
///
/// The kernel computes one force per pair and applies ±F, so the residual
/// is exactly zero up to the accumulator rounding of a single add.
pub const NEWTON_PAIR_ABS: f64 = 1e-14;

/// Force on a particle exactly past the cutoff must be exactly zero
/// (the mask discards the lane); any nonzero value is a mask bug.
pub const BEYOND_CUTOFF_ABS: f64 = 0.0;

/// LJ minimum (r = 2^(1/6) σ): residual force magnitude.
///
/// The analytical net force vanishes; f64 evaluation of the 6-12 terms at
/// O(1) magnitudes leaves O(1e-15) cancellation noise.
pub const LJ_MINIMUM_FORCE_ABS: f64 = 1e-12;

/// Analytical pair potentials (LJ pair, head-to-tail dipole pair):
/// relative agreement with the closed-form value.
pub const PAIR_POTENTIAL_REL: f64 = 1e-10;

/// Cubic-lattice equilibrium (S2): per-molecule force magnitude.
///
/// On a perfect simple-cubic lattice every force cancels by symmetry; the
/// summation residual scales with the number of neighbor shells under the
/// cutoff, measured below 1e-9 for 512 molecules at cutoff 2.5.
pub const LATTICE_FORCE_ABS: f64 = 1e-6;

// ═══════════════════════════════════════════════════════════════════
// Conservation tolerances
// ═══════════════════════════════════════════════════════════════════

/// Micro-canonical energy drift over ≥500 Leapfrog steps at dt ≤ 0.005,
/// relative to the mean total energy. The symplectic integrator bounds the
/// oscillation; 1e-3 is the acceptance contract.
pub const ENERGY_DRIFT_REL: f64 = 1e-3;

/// Total linear momentum growth per step, per particle, per unit max
/// velocity: O(ε_machine) rounding accumulated by the ± force pairs.
pub const MOMENTUM_PER_STEP_ABS: f64 = 1e-12;

/// Momentum removal residual: |Σ m·v| ≤ this × N × max|v|.
pub const MOMENTUM_REMOVAL_FACTOR: f64 = 1e-12;

// ═══════════════════════════════════════════════════════════════════
// Decomposition tolerances
// ═══════════════════════════════════════════════════════════════════

/// Rank-count invariance after one step: relative difference of energies,
/// virial and positions between a 1-rank and a P-rank run. Only summation
/// order differs across the cell-index ordering, so agreement is near
/// machine precision.
pub const RANK_INVARIANCE_ONE_STEP_REL: f64 = 1e-10;

/// Rank-count invariance after a long run (1000 steps): divergence grows
/// with the Lyapunov time of the trajectory, not with a bug.
pub const RANK_INVARIANCE_LONG_REL: f64 = 1e-6;

/// Quaternion norm drift after renormalization.
pub const QUATERNION_NORM_ABS: f64 = 1e-12;

// ═══════════════════════════════════════════════════════════════════
// Exchange timing
// ═══════════════════════════════════════════════════════════════════

/// Seconds between deadlock warning diagnostics.
pub const DEADLOCK_WARN_INTERVAL_S: f64 = 1.0;

/// Hard deadlock timeout (seconds) before aborting with exit code 457.
pub const DEADLOCK_TIMEOUT_S: f64 = 60.0;

/// Guard for near-zero denominators in drift/relative computations.
pub const DIVISION_GUARD: f64 = 1e-30;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn orderings_are_sane() {
        assert!(SIMD_SCALAR_REL < PAIR_POTENTIAL_REL);
        assert!(RANK_INVARIANCE_ONE_STEP_REL < RANK_INVARIANCE_LONG_REL);
        assert!(DEADLOCK_WARN_INTERVAL_S < DEADLOCK_TIMEOUT_S);
    }

    #[test]
    fn beyond_cutoff_is_exact() {
        // The contract is exact zero, not "small".
        assert_eq!(BEYOND_CUTOFF_ABS, 0.0);
    }
}

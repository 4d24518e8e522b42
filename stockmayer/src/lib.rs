// SPDX-License-Identifier: AGPL-3.0-only

// Clippy pedantic/nursery + physics-specific allows are in [workspace.lints.clippy]
// in Cargo.toml. Library code must propagate errors, not panic:
#![deny(clippy::expect_used, clippy::unwrap_used)]
#![warn(missing_docs)]

//! stockmayer — multi-site molecular dynamics engine
//!
//! Simulates mixtures of rigid multi-site molecules (Lennard-Jones centers,
//! point charges, point dipoles, point quadrupoles) under a spherical cutoff
//! with a reaction-field correction for dipolar long-range contributions.
//!
//! # Architecture
//!
//! - **`components`** — immutable molecule templates and the precomputed
//!   (ε·24, σ², shift·6) pair-parameter matrix over global site IDs
//! - **`molecule`** — rigid-body state: position, velocity, orientation
//!   quaternion, angular momentum, force and torque accumulators
//! - **`cellgrid`** — molecule arena with generational slots plus the
//!   cell-linked grid (one halo layer) over the rank's subdomain
//! - **`soa`** — per-cell structure-of-arrays slabs, SIMD-padded and pooled
//! - **`kernel`** — the eight vectorized pair interaction routines and the
//!   cutoff mask construction
//! - **`traversal`** — cell and cell-pair iteration with the halo
//!   double-count rules; sequential and thread-parallel drivers
//! - **`decomp`** — spatial decomposition, halo regions, leaving/halo-copy
//!   exchange (1-stage full shell and 3-stage directional), reductions
//! - **`integrator`** — Leapfrog with rigid-body quaternion update
//! - **`simulation`** — per-step orchestration and the run loop
//! - **`domain`** — global box, reaction-field state, macroscopic values
//! - **`generator`** — cubic-grid scenario generation
//! - **`io`** — token config, phase-space files, output plug-ins
//! - **`tolerances`** — centralized, justified numeric thresholds
//! - **`validation`** — pass/fail harness for scenario binaries (exit 0/1)
//!
//! # Validation binaries
//!
//! All binaries follow the same pattern: analytically known expected values,
//! explicit pass/fail against documented tolerances, exit code 0 (pass) or
//! 1 (fail). The halo-exchange deadlock path exits 457.

/// Cell-linked grid and the generational molecule arena.
pub mod cellgrid;
/// Molecule templates and the LJ pair-parameter matrix.
pub mod components;
/// Spatial decomposition, halo exchange, global reductions.
pub mod decomp;
/// Global box geometry, reaction field, macroscopic values.
pub mod domain;
/// Typed errors for configuration, geometry, exchange and numerics.
pub mod error;
/// Cubic-grid scenario generator.
pub mod generator;
/// Leapfrog integrator with rigid-body rotation.
pub mod integrator;
/// Token config, phase-space files, output plug-ins.
pub mod io;
/// Vectorized pair interaction kernels and cutoff masks.
pub mod kernel;
/// Rigid multi-site molecule state.
pub mod molecule;
/// Per-step energy records and drift validation.
pub mod observables;
/// Unit quaternions for rigid-body orientation.
pub mod quaternion;
/// SIMD vector abstraction (width, load, broadcast, masks).
pub mod simd;
/// Per-step orchestration and the run loop.
pub mod simulation;
/// Per-cell SoA slabs and the slab pool.
pub mod soa;
/// Centralized, justified numeric thresholds.
pub mod tolerances;
/// Cell and cell-pair traversal drivers.
pub mod traversal;
/// Pass/fail harness for validation binaries.
pub mod validation;

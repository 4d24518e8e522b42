// SPDX-License-Identifier: AGPL-3.0-only

//! Typed errors for simulation setup, exchange and numerics.
//!
//! One enum instead of `Result<_, String>` so callers can pattern-match on
//! failure modes (bad config, broken geometry, exchange deadlock) rather
//! than parsing opaque strings. Binaries map variants to process exit codes
//! via [`SimError::exit_code`].

use std::fmt;

/// Process exit code for a halo-exchange deadlock.
pub const EXIT_DEADLOCK: i32 = 457;
/// Process exit code for corrupted scenario parameters.
pub const EXIT_SCENARIO_CORRUPT: i32 = 2004;

/// Errors arising from configuration, geometry, halo exchange or numerics.
#[derive(Debug)]
pub enum SimError {
    /// Malformed input: missing file, unknown keyword value, bad field.
    Config(String),

    /// Scenario parameters that parse but describe an impossible system
    /// (e.g. non-positive density or temperature).
    ScenarioCorrupt(String),

    /// Geometry that cannot support the cell grid: cutoff larger than half
    /// the domain, fewer than one cell per cutoff, or a molecule moving
    /// more than one cell per step.
    Geometry(String),

    /// Halo exchange made no progress past the hard timeout.
    Deadlock {
        /// Rank that gave up waiting.
        rank: usize,
        /// Seconds waited before aborting.
        waited_s: f64,
    },

    /// NaN in forces or quaternion drift beyond tolerance.
    Numeric(String),

    /// Underlying IO failure (path, cause).
    Io(String),
}

impl SimError {
    /// Exit code a binary should terminate with for this error.
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) | Self::Geometry(_) | Self::Numeric(_) | Self::Io(_) => 1,
            Self::ScenarioCorrupt(_) => EXIT_SCENARIO_CORRUPT,
            Self::Deadlock { .. } => EXIT_DEADLOCK,
        }
    }
}

impl fmt::Display for SimError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "Configuration error: {msg}"),
            Self::ScenarioCorrupt(msg) => write!(f, "Scenario parameter corruption: {msg}"),
            Self::Geometry(msg) => write!(f, "Geometry error: {msg}"),
            Self::Deadlock { rank, waited_s } => write!(
                f,
                "Halo exchange deadlock: rank {rank} waited {waited_s:.1} s without progress"
            ),
            Self::Numeric(msg) => write!(f, "Numeric error: {msg}"),
            Self::Io(msg) => write!(f, "IO error: {msg}"),
        }
    }
}

impl std::error::Error for SimError {}

impl From<std::io::Error> for SimError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}

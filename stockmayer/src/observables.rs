// SPDX-License-Identifier: AGPL-3.0-only

//! Per-step energy records and drift validation.
//!
//! The simulation loop appends one record per sampled step; validation
//! checks conservation on the stable part of the history.

use crate::tolerances::DIVISION_GUARD;

/// Per-step energy record.
#[derive(Clone, Debug)]
pub struct EnergyRecord {
    /// Step index.
    pub step: usize,
    /// Kinetic energy (translational + rotational).
    pub ke: f64,
    /// Potential energy.
    pub pe: f64,
    /// Total energy.
    pub total: f64,
    /// Instantaneous temperature.
    pub temperature: f64,
    /// Pressure.
    pub pressure: f64,
}

/// Energy validation result.
#[derive(Clone, Debug)]
pub struct EnergyValidation {
    /// Mean total energy over the stable window.
    pub mean_total: f64,
    /// Standard deviation of the total energy.
    pub std_total: f64,
    /// |E_final − E_initial| / |⟨E⟩|.
    pub drift_rel: f64,
    /// Mean temperature.
    pub mean_temperature: f64,
    /// Whether the drift stayed below the given bound.
    pub passed: bool,
}

/// Validate energy conservation against a relative drift bound, skipping
/// the first tenth of the history for transients.
#[must_use]
pub fn validate_energy(history: &[EnergyRecord], max_drift_rel: f64) -> EnergyValidation {
    if history.is_empty() {
        return EnergyValidation {
            mean_total: 0.0,
            std_total: 0.0,
            drift_rel: 0.0,
            mean_temperature: 0.0,
            passed: false,
        };
    }

    let skip = history.len() / 10;
    let stable = &history[skip..];

    let mean_e: f64 = stable.iter().map(|e| e.total).sum::<f64>() / stable.len() as f64;
    let var_e: f64 = stable
        .iter()
        .map(|e| (e.total - mean_e).powi(2))
        .sum::<f64>()
        / stable.len() as f64;

    let (e_initial, e_final) = match (stable.first(), stable.last()) {
        (Some(first), Some(last)) => (first.total, last.total),
        _ => (0.0, 0.0),
    };
    let drift_rel = if mean_e.abs() > DIVISION_GUARD {
        ((e_final - e_initial) / mean_e.abs()).abs()
    } else {
        0.0
    };

    let mean_t: f64 = stable.iter().map(|e| e.temperature).sum::<f64>() / stable.len() as f64;

    EnergyValidation {
        mean_total: mean_e,
        std_total: var_e.sqrt(),
        drift_rel,
        mean_temperature: mean_t,
        passed: drift_rel < max_drift_rel,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(step: usize, total: f64) -> EnergyRecord {
        EnergyRecord {
            step,
            ke: 0.0,
            pe: total,
            total,
            temperature: 1.0,
            pressure: 0.0,
        }
    }

    #[test]
    fn empty_history_fails() {
        let v = validate_energy(&[], 1e-3);
        assert!(!v.passed);
    }

    #[test]
    fn constant_energy_passes() {
        let history: Vec<EnergyRecord> = (0..100).map(|i| record(i, -50.0)).collect();
        let v = validate_energy(&history, 1e-3);
        assert!(v.passed);
        assert!(v.drift_rel < 1e-12);
        assert!((v.mean_total - (-50.0)).abs() < 1e-12);
    }

    #[test]
    fn drifting_energy_fails() {
        let history: Vec<EnergyRecord> = (0..100)
            .map(|i| record(i, -50.0 + 0.1 * i as f64))
            .collect();
        let v = validate_energy(&history, 1e-3);
        assert!(!v.passed);
    }

    #[test]
    fn near_zero_mean_is_guarded() {
        let history: Vec<EnergyRecord> = (0..20).map(|i| record(i, 0.0)).collect();
        let v = validate_energy(&history, 1e-3);
        assert!((v.drift_rel - 0.0).abs() < f64::EPSILON);
    }
}

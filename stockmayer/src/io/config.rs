// SPDX-License-Identifier: AGPL-3.0-only

//! Token-based run configuration.
//!
//! One keyword per line, `#` starts a comment, unknown tokens warn and are
//! skipped. Recognized keywords:
//!
//! ```text
//! phaseSpaceFile <path>
//! timestepLength <real>
//! cutoffRadius <real>
//! LJCutoffRadius <real>            # optional, defaults to cutoffRadius
//! epsilonRF <real | infinite>      # conducting boundary via "infinite"
//! initialTemperature <real>        # enables the thermostat
//! datastructure LinkedCells <n>    # only n = 1 is supported
//! output <ResultWriter|XyzWriter|CheckpointWriter> [freq] [prefix]
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use log::warn;

use crate::domain::EpsilonRf;
use crate::error::SimError;

/// Which writer an `output` line requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriterKind {
    /// Per-step `step ⟨U⟩ p` rows.
    Result,
    /// XYZ visualization snapshots.
    Xyz,
    /// Resumable checkpoints.
    Checkpoint,
}

/// One configured output plug-in.
#[derive(Debug, Clone)]
pub struct OutputSpec {
    /// Writer type.
    pub kind: WriterKind,
    /// Output frequency in steps.
    pub frequency: usize,
    /// Filename prefix.
    pub prefix: String,
}

/// Parsed run configuration.
#[derive(Debug, Clone)]
pub struct SimConfig {
    /// Scenario input file (absent when a generator provides the scenario).
    pub phase_space_file: Option<PathBuf>,
    /// Integration timestep.
    pub timestep_length: f64,
    /// Electrostatics cutoff radius.
    pub cutoff_radius: f64,
    /// LJ cutoff radius (defaults to the full cutoff).
    pub lj_cutoff_radius: f64,
    /// Reaction-field dielectric.
    pub epsilon_rf: EpsilonRf,
    /// Thermostat target; `None` runs micro-canonical.
    pub initial_temperature: Option<f64>,
    /// Configured output writers.
    pub outputs: Vec<OutputSpec>,
}

impl SimConfig {
    /// Parse a configuration file.
    ///
    /// # Errors
    ///
    /// [`SimError::Io`] when the file cannot be read, [`SimError::Config`]
    /// for malformed or missing required fields.
    pub fn from_file(path: &Path) -> Result<Self, SimError> {
        let text = fs::read_to_string(path)
            .map_err(|e| SimError::Io(format!("{}: {e}", path.display())))?;
        Self::parse(&text)
    }

    /// Parse configuration text.
    ///
    /// # Errors
    ///
    /// [`SimError::Config`] for malformed lines or missing required fields.
    pub fn parse(text: &str) -> Result<Self, SimError> {
        let mut phase_space_file = None;
        let mut timestep_length = None;
        let mut cutoff_radius = None;
        let mut lj_cutoff_radius = None;
        let mut epsilon_rf = EpsilonRf::Conducting;
        let mut initial_temperature = None;
        let mut outputs = Vec::new();

        for (lineno, raw) in text.lines().enumerate() {
            let line = raw.split('#').next().unwrap_or("").trim();
            if line.is_empty() {
                continue;
            }
            let mut tokens = line.split_whitespace();
            let Some(keyword) = tokens.next() else { continue };
            let rest: Vec<&str> = tokens.collect();

            let parse_real = |value: Option<&&str>, what: &str| -> Result<f64, SimError> {
                value
                    .and_then(|v| v.parse::<f64>().ok())
                    .ok_or_else(|| {
                        SimError::Config(format!("line {}: bad {what} value", lineno + 1))
                    })
            };

            match keyword {
                "phaseSpaceFile" => {
                    let p = rest.first().ok_or_else(|| {
                        SimError::Config(format!("line {}: phaseSpaceFile needs a path", lineno + 1))
                    })?;
                    phase_space_file = Some(PathBuf::from(p));
                }
                "timestepLength" => {
                    timestep_length = Some(parse_real(rest.first(), "timestepLength")?);
                }
                "cutoffRadius" => {
                    cutoff_radius = Some(parse_real(rest.first(), "cutoffRadius")?);
                }
                "LJCutoffRadius" => {
                    lj_cutoff_radius = Some(parse_real(rest.first(), "LJCutoffRadius")?);
                }
                "epsilonRF" => match rest.first() {
                    Some(&"infinite") => epsilon_rf = EpsilonRf::Conducting,
                    v => epsilon_rf = EpsilonRf::Finite(parse_real(v, "epsilonRF")?),
                },
                "initialTemperature" => {
                    initial_temperature = Some(parse_real(rest.first(), "initialTemperature")?);
                }
                "datastructure" => match rest.as_slice() {
                    ["LinkedCells", n] => {
                        if n.parse::<usize>().ok() != Some(1) {
                            return Err(SimError::Config(format!(
                                "line {}: only LinkedCells 1 is supported",
                                lineno + 1
                            )));
                        }
                    }
                    _ => {
                        return Err(SimError::Config(format!(
                            "line {}: unsupported datastructure {:?}",
                            lineno + 1,
                            rest
                        )))
                    }
                },
                "output" => {
                    let kind = match rest.first() {
                        Some(&"ResultWriter") => WriterKind::Result,
                        Some(&"XyzWriter") => WriterKind::Xyz,
                        Some(&"CheckpointWriter") => WriterKind::Checkpoint,
                        other => {
                            warn!("line {}: unknown output writer {other:?}", lineno + 1);
                            continue;
                        }
                    };
                    let frequency = rest
                        .get(1)
                        .and_then(|v| v.parse::<usize>().ok())
                        .unwrap_or(1)
                        .max(1);
                    let prefix = rest.get(2).map_or_else(|| "mdrun".to_string(), |s| (*s).to_string());
                    outputs.push(OutputSpec {
                        kind,
                        frequency,
                        prefix,
                    });
                }
                unknown => {
                    warn!("line {}: unknown config token '{unknown}'", lineno + 1);
                }
            }
        }

        let timestep_length = timestep_length
            .ok_or_else(|| SimError::Config("missing required token timestepLength".into()))?;
        let cutoff_radius = cutoff_radius
            .ok_or_else(|| SimError::Config("missing required token cutoffRadius".into()))?;
        if !(timestep_length > 0.0) {
            return Err(SimError::Config(format!(
                "timestepLength must be positive, got {timestep_length}"
            )));
        }
        if !(cutoff_radius > 0.0) {
            return Err(SimError::Config(format!(
                "cutoffRadius must be positive, got {cutoff_radius}"
            )));
        }
        let lj_cutoff_radius = lj_cutoff_radius.unwrap_or(cutoff_radius);

        Ok(Self {
            phase_space_file,
            timestep_length,
            cutoff_radius,
            lj_cutoff_radius,
            epsilon_rf,
            initial_temperature,
            outputs,
        })
    }
}

// SPDX-License-Identifier: AGPL-3.0-only

//! ASCII phase-space files.
//!
//! Versioned header, component table, then one molecule row per line:
//! `id ctype x y z vx vy vz q0 q1 q2 q3 Dx Dy Dz`. Checkpoints use the
//! same format, so a run is resumable from any written file — bit-exactly,
//! because floats are written with Rust's shortest round-trip formatting.
//! A checkpoint only resumes against a matching component table.

use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use crate::components::{ChargeSite, Component, DipoleSite, LjSite, QuadrupoleSite};
use crate::error::SimError;
use crate::molecule::Molecule;
use crate::quaternion::Quat;

/// Format identifier of the first header line.
pub const FORMAT_TAG: &str = "stockmayer-phasespace";
/// Current format version.
pub const FORMAT_VERSION: u32 = 1;

/// Everything a phase-space file holds.
#[derive(Debug, Clone)]
pub struct PhaseSpaceData {
    /// Simulation time at which the state was written.
    pub time: f64,
    /// Global box edge lengths.
    pub length: [f64; 3],
    /// Component table.
    pub components: Vec<Component>,
    /// All molecules.
    pub molecules: Vec<Molecule>,
}

/// Serialize a full state to the phase-space format.
#[must_use]
pub fn format_phase_space(data: &PhaseSpaceData) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{FORMAT_TAG} {FORMAT_VERSION}");
    let _ = writeln!(out, "t {}", data.time);
    let _ = writeln!(out, "L {} {} {}", data.length[0], data.length[1], data.length[2]);
    let _ = writeln!(out, "C {}", data.components.len());
    for c in &data.components {
        let _ = writeln!(
            out,
            "component {} {} {} {}",
            c.lj_sites.len(),
            c.charges.len(),
            c.dipoles.len(),
            c.quadrupoles.len()
        );
        for s in &c.lj_sites {
            let _ = writeln!(
                out,
                "lj {} {} {} {} {} {} {}",
                s.offset[0],
                s.offset[1],
                s.offset[2],
                s.epsilon,
                s.sigma,
                s.mass,
                u8::from(s.solid)
            );
        }
        for s in &c.charges {
            let _ = writeln!(out, "charge {} {} {} {}", s.offset[0], s.offset[1], s.offset[2], s.q);
        }
        for s in &c.dipoles {
            let _ = writeln!(
                out,
                "dipole {} {} {} {} {} {} {}",
                s.offset[0], s.offset[1], s.offset[2], s.e_body[0], s.e_body[1], s.e_body[2], s.mu
            );
        }
        for s in &c.quadrupoles {
            let _ = writeln!(
                out,
                "quadrupole {} {} {} {} {} {} {}",
                s.offset[0],
                s.offset[1],
                s.offset[2],
                s.e_body[0],
                s.e_body[1],
                s.e_body[2],
                s.q_moment
            );
        }
        let _ = writeln!(out, "inertia {} {} {}", c.inertia[0], c.inertia[1], c.inertia[2]);
    }
    let _ = writeln!(out, "N {}", data.molecules.len());
    for m in &data.molecules {
        let _ = writeln!(
            out,
            "{} {} {} {} {} {} {} {} {} {} {} {} {} {} {}",
            m.id,
            m.component_id,
            m.r[0],
            m.r[1],
            m.r[2],
            m.v[0],
            m.v[1],
            m.v[2],
            m.q.w,
            m.q.x,
            m.q.y,
            m.q.z,
            m.d[0],
            m.d[1],
            m.d[2]
        );
    }
    out
}

/// Write a phase-space file.
///
/// # Errors
///
/// [`SimError::Io`] on write failure.
pub fn write_phase_space(path: &Path, data: &PhaseSpaceData) -> Result<(), SimError> {
    fs::write(path, format_phase_space(data))
        .map_err(|e| SimError::Io(format!("{}: {e}", path.display())))
}

fn parse_reals<const N: usize>(tokens: &[&str], what: &str) -> Result<[f64; N], SimError> {
    if tokens.len() < N {
        return Err(SimError::Config(format!("{what}: expected {N} values")));
    }
    let mut out = [0.0; N];
    for (o, t) in out.iter_mut().zip(tokens.iter()) {
        *o = t
            .parse::<f64>()
            .map_err(|_| SimError::Config(format!("{what}: bad number '{t}'")))?;
    }
    Ok(out)
}

/// Parse the phase-space format.
///
/// # Errors
///
/// [`SimError::Config`] on any malformed or missing section.
#[allow(clippy::too_many_lines)]
pub fn parse_phase_space(text: &str) -> Result<PhaseSpaceData, SimError> {
    let mut lines = text.lines().map(str::trim).filter(|l| !l.is_empty());

    let header = lines
        .next()
        .ok_or_else(|| SimError::Config("empty phase-space file".into()))?;
    let mut h = header.split_whitespace();
    if h.next() != Some(FORMAT_TAG) {
        return Err(SimError::Config(format!(
            "not a phase-space file (header '{header}')"
        )));
    }
    let version: u32 = h
        .next()
        .and_then(|v| v.parse().ok())
        .ok_or_else(|| SimError::Config("missing format version".into()))?;
    if version != FORMAT_VERSION {
        return Err(SimError::Config(format!(
            "unsupported phase-space version {version}"
        )));
    }

    let mut time = 0.0;
    let mut length = None;
    let mut components = Vec::new();
    let mut molecules = Vec::new();
    let mut expect_molecules = None;

    while let Some(line) = lines.next() {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        match tokens.as_slice() {
            ["t", v] => {
                time = v
                    .parse()
                    .map_err(|_| SimError::Config(format!("bad time '{v}'")))?;
            }
            ["L", rest @ ..] => {
                length = Some(parse_reals::<3>(rest, "box length")?);
            }
            ["C", v] => {
                let n: usize = v
                    .parse()
                    .map_err(|_| SimError::Config(format!("bad component count '{v}'")))?;
                for _ in 0..n {
                    components.push(parse_component(&mut lines)?);
                }
            }
            ["N", v] => {
                expect_molecules = Some(
                    v.parse::<usize>()
                        .map_err(|_| SimError::Config(format!("bad molecule count '{v}'")))?,
                );
            }
            _ => {
                // Molecule row.
                let vals = parse_reals::<15>(&tokens, "molecule row")?;
                #[allow(clippy::cast_possible_truncation)] // ids fit the f64 mantissa
                let mut m = Molecule::new(
                    vals[0] as u64,
                    vals[1] as u16,
                    [vals[2], vals[3], vals[4]],
                    [vals[5], vals[6], vals[7]],
                );
                m.q = Quat::new(vals[8], vals[9], vals[10], vals[11]);
                m.d = [vals[12], vals[13], vals[14]];
                molecules.push(m);
            }
        }
    }

    let length = length.ok_or_else(|| SimError::Config("missing box length".into()))?;
    if let Some(n) = expect_molecules {
        if n != molecules.len() {
            return Err(SimError::Config(format!(
                "molecule table holds {} rows, header promised {n}",
                molecules.len()
            )));
        }
    }
    Ok(PhaseSpaceData {
        time,
        length,
        components,
        molecules,
    })
}

#[allow(clippy::cast_possible_truncation)] // site counts are small integers
fn parse_component<'a>(
    lines: &mut impl Iterator<Item = &'a str>,
) -> Result<Component, SimError> {
    let header = lines
        .next()
        .ok_or_else(|| SimError::Config("missing component header".into()))?;
    let tokens: Vec<&str> = header.split_whitespace().collect();
    let counts = match tokens.as_slice() {
        ["component", rest @ ..] => parse_reals::<4>(rest, "component header")?,
        _ => {
            return Err(SimError::Config(format!(
                "expected a component header, got '{header}'"
            )))
        }
    };
    let mut comp = Component::default();
    for _ in 0..counts[0] as usize {
        let vals = expect_site(lines, "lj", 7)?;
        comp.lj_sites.push(LjSite {
            offset: [vals[0], vals[1], vals[2]],
            epsilon: vals[3],
            sigma: vals[4],
            mass: vals[5],
            solid: vals[6] != 0.0,
        });
    }
    for _ in 0..counts[1] as usize {
        let vals = expect_site(lines, "charge", 4)?;
        comp.charges.push(ChargeSite {
            offset: [vals[0], vals[1], vals[2]],
            q: vals[3],
        });
    }
    for _ in 0..counts[2] as usize {
        let vals = expect_site(lines, "dipole", 7)?;
        comp.dipoles.push(DipoleSite {
            offset: [vals[0], vals[1], vals[2]],
            e_body: [vals[3], vals[4], vals[5]],
            mu: vals[6],
        });
    }
    for _ in 0..counts[3] as usize {
        let vals = expect_site(lines, "quadrupole", 7)?;
        comp.quadrupoles.push(QuadrupoleSite {
            offset: [vals[0], vals[1], vals[2]],
            e_body: [vals[3], vals[4], vals[5]],
            q_moment: vals[6],
        });
    }
    let inertia_line = lines
        .next()
        .ok_or_else(|| SimError::Config("missing inertia line".into()))?;
    let tokens: Vec<&str> = inertia_line.split_whitespace().collect();
    comp.inertia = match tokens.as_slice() {
        ["inertia", rest @ ..] => parse_reals::<3>(rest, "inertia")?,
        _ => {
            return Err(SimError::Config(format!(
                "expected inertia line, got '{inertia_line}'"
            )))
        }
    };
    Ok(comp)
}

fn expect_site<'a>(
    lines: &mut impl Iterator<Item = &'a str>,
    tag: &str,
    n_values: usize,
) -> Result<Vec<f64>, SimError> {
    let line = lines
        .next()
        .ok_or_else(|| SimError::Config(format!("missing {tag} site line")))?;
    let tokens: Vec<&str> = line.split_whitespace().collect();
    if tokens.first() != Some(&tag) || tokens.len() != n_values + 1 {
        return Err(SimError::Config(format!(
            "expected '{tag}' site with {n_values} values, got '{line}'"
        )));
    }
    tokens[1..]
        .iter()
        .map(|t| {
            t.parse::<f64>()
                .map_err(|_| SimError::Config(format!("{tag} site: bad number '{t}'")))
        })
        .collect()
}

/// Read a phase-space file.
///
/// # Errors
///
/// [`SimError::Io`] on read failure, [`SimError::Config`] on parse failure.
pub fn read_phase_space(path: &Path) -> Result<PhaseSpaceData, SimError> {
    let text =
        fs::read_to_string(path).map_err(|e| SimError::Io(format!("{}: {e}", path.display())))?;
    parse_phase_space(&text)
}

/// Structural equality of two component tables (resume precondition).
#[must_use]
pub fn components_match(a: &[Component], b: &[Component]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b.iter()).all(|(x, y)| {
        x.lj_sites.len() == y.lj_sites.len()
            && x.charges.len() == y.charges.len()
            && x.dipoles.len() == y.dipoles.len()
            && x.quadrupoles.len() == y.quadrupoles.len()
            && x.inertia == y.inertia
            && x.lj_sites.iter().zip(y.lj_sites.iter()).all(|(s, t)| {
                s.offset == t.offset
                    && s.epsilon == t.epsilon
                    && s.sigma == t.sigma
                    && s.mass == t.mass
                    && s.solid == t.solid
            })
            && x.charges
                .iter()
                .zip(y.charges.iter())
                .all(|(s, t)| s.offset == t.offset && s.q == t.q)
            && x.dipoles
                .iter()
                .zip(y.dipoles.iter())
                .all(|(s, t)| s.offset == t.offset && s.e_body == t.e_body && s.mu == t.mu)
            && x.quadrupoles.iter().zip(y.quadrupoles.iter()).all(|(s, t)| {
                s.offset == t.offset && s.e_body == t.e_body && s.q_moment == t.q_moment
            })
    })
}

// SPDX-License-Identifier: AGPL-3.0-only

//! Output plug-ins.
//!
//! The simulation loop only exposes a step callback; each writer decides
//! from its own frequency whether to act. A failing plug-in is disabled for
//! the rest of the run (the failure is logged, the run continues).

use std::fs;
use std::io::Write as _;
use std::path::PathBuf;

use serde::Serialize;

use crate::cellgrid::CellGrid;
use crate::components::ComponentRegistry;
use crate::decomp::Decomposition;
use crate::domain::Domain;
use crate::error::SimError;
use crate::molecule::Molecule;

use super::phase_space::{write_phase_space, PhaseSpaceData};

/// A step-driven output writer.
pub trait OutputPlugin: Send {
    /// Writer name for logs.
    fn name(&self) -> &str;

    /// Called once before the first step.
    ///
    /// # Errors
    ///
    /// Any failure disables the plug-in.
    fn init(&mut self, domain: &Domain) -> Result<(), SimError> {
        let _ = domain;
        Ok(())
    }

    /// Called after every completed step.
    ///
    /// # Errors
    ///
    /// Any failure disables the plug-in.
    fn do_output(
        &mut self,
        step: usize,
        grid: &CellGrid,
        decomp: &dyn Decomposition,
        domain: &Domain,
        registry: &ComponentRegistry,
    ) -> Result<(), SimError>;

    /// Called once after the last step.
    ///
    /// # Errors
    ///
    /// Reported but the run is already complete.
    fn finish(
        &mut self,
        grid: &CellGrid,
        decomp: &dyn Decomposition,
        domain: &Domain,
        registry: &ComponentRegistry,
    ) -> Result<(), SimError> {
        let _ = (grid, decomp, domain, registry);
        Ok(())
    }
}

/// Owned molecules sorted by id — the canonical order for deterministic
/// files regardless of cell-traversal order.
fn sorted_owned(grid: &CellGrid) -> Vec<Molecule> {
    let mut mols = Vec::with_capacity(grid.n_owned());
    grid.for_each_owned(|m| mols.push(m.clone()));
    mols.sort_by_key(|m| m.id);
    mols
}

fn rank_suffixed(prefix: &str, name: &str, decomp: &dyn Decomposition) -> String {
    if decomp.num_ranks() > 1 {
        format!("{prefix}.rank{}.{name}", decomp.rank())
    } else {
        format!("{prefix}.{name}")
    }
}

/// Writes per-step `step ⟨U⟩ p` rows to `<prefix>.res`.
#[derive(Debug)]
pub struct ResultWriter {
    prefix: String,
    rows: Vec<String>,
}

impl ResultWriter {
    /// New result writer with a filename prefix.
    #[must_use]
    pub fn new(prefix: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
            rows: Vec::new(),
        }
    }
}

impl OutputPlugin for ResultWriter {
    fn name(&self) -> &str {
        "ResultWriter"
    }

    fn do_output(
        &mut self,
        step: usize,
        _grid: &CellGrid,
        decomp: &dyn Decomposition,
        domain: &Domain,
        _registry: &ComponentRegistry,
    ) -> Result<(), SimError> {
        if decomp.rank() == 0 {
            self.rows.push(format!(
                "{step}\t{:.10e}\t{:.10e}",
                domain.average_upot(),
                domain.global_pressure()
            ));
        }
        Ok(())
    }

    fn finish(
        &mut self,
        _grid: &CellGrid,
        decomp: &dyn Decomposition,
        _domain: &Domain,
        _registry: &ComponentRegistry,
    ) -> Result<(), SimError> {
        if decomp.rank() != 0 {
            return Ok(());
        }
        let path = PathBuf::from(format!("{}.res", self.prefix));
        let mut f = fs::File::create(&path)
            .map_err(|e| SimError::Io(format!("{}: {e}", path.display())))?;
        writeln!(f, "# step\t<U>\tp").map_err(SimError::from)?;
        for row in &self.rows {
            writeln!(f, "{row}").map_err(SimError::from)?;
        }
        Ok(())
    }
}

/// Writes XYZ snapshots at a configured frequency.
#[derive(Debug)]
pub struct XyzWriter {
    prefix: String,
    frequency: usize,
    /// Numbered files instead of overwriting one.
    pub incremental: bool,
}

impl XyzWriter {
    /// New XYZ writer with prefix and step frequency.
    #[must_use]
    pub fn new(prefix: &str, frequency: usize) -> Self {
        Self {
            prefix: prefix.to_string(),
            frequency: frequency.max(1),
            incremental: false,
        }
    }
}

impl OutputPlugin for XyzWriter {
    fn name(&self) -> &str {
        "XyzWriter"
    }

    fn do_output(
        &mut self,
        step: usize,
        grid: &CellGrid,
        decomp: &dyn Decomposition,
        _domain: &Domain,
        _registry: &ComponentRegistry,
    ) -> Result<(), SimError> {
        if step % self.frequency != 0 {
            return Ok(());
        }
        let mols = sorted_owned(grid);
        let mut out = String::new();
        out.push_str(&format!("{}\n", mols.len()));
        out.push_str(&format!("step {step}\n"));
        for m in &mols {
            out.push_str(&format!(
                "C{} {:.6} {:.6} {:.6}\n",
                m.component_id, m.r[0], m.r[1], m.r[2]
            ));
        }
        let name = if self.incremental {
            rank_suffixed(&self.prefix, &format!("{step:08}.xyz"), decomp)
        } else {
            rank_suffixed(&self.prefix, "xyz", decomp)
        };
        fs::write(&name, out).map_err(|e| SimError::Io(format!("{name}: {e}")))
    }
}

/// Writes resumable checkpoints; always leaves a final
/// `<prefix>.restart.inp` at run end.
#[derive(Debug)]
pub struct CheckpointWriter {
    prefix: String,
    frequency: usize,
    /// Numbered checkpoint files instead of overwriting one.
    pub incremental: bool,
}

impl CheckpointWriter {
    /// New checkpoint writer with prefix and step frequency.
    #[must_use]
    pub fn new(prefix: &str, frequency: usize) -> Self {
        Self {
            prefix: prefix.to_string(),
            frequency: frequency.max(1),
            incremental: false,
        }
    }

    fn write(
        &self,
        name: &str,
        grid: &CellGrid,
        domain: &Domain,
        registry: &ComponentRegistry,
    ) -> Result<(), SimError> {
        let data = PhaseSpaceData {
            time: domain.time(),
            length: domain.length,
            components: registry.components().to_vec(),
            molecules: sorted_owned(grid),
        };
        write_phase_space(&PathBuf::from(name), &data)
    }
}

impl OutputPlugin for CheckpointWriter {
    fn name(&self) -> &str {
        "CheckpointWriter"
    }

    fn do_output(
        &mut self,
        step: usize,
        grid: &CellGrid,
        decomp: &dyn Decomposition,
        domain: &Domain,
        registry: &ComponentRegistry,
    ) -> Result<(), SimError> {
        if step % self.frequency != 0 {
            return Ok(());
        }
        let name = if self.incremental {
            rank_suffixed(&self.prefix, &format!("{step:08}.restart.inp"), decomp)
        } else {
            rank_suffixed(&self.prefix, "restart.inp", decomp)
        };
        self.write(&name, grid, domain, registry)
    }

    fn finish(
        &mut self,
        grid: &CellGrid,
        decomp: &dyn Decomposition,
        domain: &Domain,
        registry: &ComponentRegistry,
    ) -> Result<(), SimError> {
        let name = rank_suffixed(&self.prefix, "restart.inp", decomp);
        self.write(&name, grid, domain, registry)
    }
}

/// Machine-readable run summary.
#[derive(Debug, Serialize)]
pub struct RunSummary {
    /// Steps completed.
    pub steps: usize,
    /// Global molecule count.
    pub n_molecules: usize,
    /// Final potential energy per molecule.
    pub final_upot_per_molecule: f64,
    /// Final pressure.
    pub final_pressure: f64,
    /// Final temperature.
    pub final_temperature: f64,
    /// Wall-clock seconds.
    pub wall_time_s: f64,
    /// Steps per second.
    pub steps_per_sec: f64,
}

impl RunSummary {
    /// Write the summary as JSON.
    ///
    /// # Errors
    ///
    /// [`SimError::Io`] on serialization or write failure.
    pub fn write_json(&self, path: &str) -> Result<(), SimError> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| SimError::Io(format!("summary serialization: {e}")))?;
        fs::write(path, json).map_err(|e| SimError::Io(format!("{path}: {e}")))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::components::Component;
    use crate::decomp::SequentialDecomposition;

    fn setup() -> (CellGrid, SequentialDecomposition, Domain, ComponentRegistry) {
        let registry =
            ComponentRegistry::build(vec![Component::single_lj(1.0, 1.0, 1.0)], 2.5).unwrap();
        let mut grid = CellGrid::new([0.0; 3], [10.0; 3], 2.5).unwrap();
        grid.insert_owned(Molecule::new(2, 0, [5.0; 3], [0.0; 3]));
        grid.insert_owned(Molecule::new(1, 0, [2.0; 3], [0.0; 3]));
        let decomp = SequentialDecomposition::new([10.0; 3], 2.5);
        let domain = Domain::new([10.0; 3], 2.5, 2.5).unwrap();
        (grid, decomp, domain, registry)
    }

    #[test]
    fn sorted_owned_is_id_ordered() {
        let (grid, _, _, _) = setup();
        let mols = sorted_owned(&grid);
        assert_eq!(mols.len(), 2);
        assert_eq!(mols[0].id, 1);
        assert_eq!(mols[1].id, 2);
    }

    #[test]
    fn result_writer_accumulates_rows() {
        let (grid, decomp, domain, registry) = setup();
        let mut w = ResultWriter::new("/tmp/stockmayer_test_result");
        w.do_output(1, &grid, &decomp, &domain, &registry).unwrap();
        w.do_output(2, &grid, &decomp, &domain, &registry).unwrap();
        assert_eq!(w.rows.len(), 2);
        assert!(w.rows[0].starts_with("1\t"));
    }

    #[test]
    fn xyz_writer_respects_frequency() {
        let (grid, decomp, domain, registry) = setup();
        let dir = std::env::temp_dir().join("stockmayer_xyz_test");
        fs::create_dir_all(&dir).unwrap();
        let prefix = dir.join("snap").to_string_lossy().into_owned();
        let mut w = XyzWriter::new(&prefix, 10);
        w.do_output(5, &grid, &decomp, &domain, &registry).unwrap();
        assert!(!PathBuf::from(format!("{prefix}.xyz")).exists());
        w.do_output(10, &grid, &decomp, &domain, &registry).unwrap();
        let content = fs::read_to_string(format!("{prefix}.xyz")).unwrap();
        assert!(content.starts_with("2\n"));
        assert!(content.contains("C0 "));
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn checkpoint_writer_emits_readable_state() {
        let (grid, decomp, domain, registry) = setup();
        let dir = std::env::temp_dir().join("stockmayer_ckp_test");
        fs::create_dir_all(&dir).unwrap();
        let prefix = dir.join("run").to_string_lossy().into_owned();
        let mut w = CheckpointWriter::new(&prefix, 1);
        w.finish(&grid, &decomp, &domain, &registry).unwrap();
        let data =
            super::super::phase_space::read_phase_space(&PathBuf::from(format!(
                "{prefix}.restart.inp"
            )))
            .unwrap();
        assert_eq!(data.molecules.len(), 2);
        assert_eq!(data.components.len(), 1);
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn run_summary_serializes() {
        let s = RunSummary {
            steps: 100,
            n_molecules: 512,
            final_upot_per_molecule: -5.2,
            final_pressure: 0.4,
            final_temperature: 1.5,
            wall_time_s: 12.0,
            steps_per_sec: 8.3,
        };
        let json = serde_json::to_string(&s).unwrap();
        assert!(json.contains("\"steps\":100"));
        assert!(json.contains("final_pressure"));
    }
}

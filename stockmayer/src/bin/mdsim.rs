// SPDX-License-Identifier: AGPL-3.0-only

//! Multi-site molecular dynamics runner.
//!
//! ```text
//! mdsim [options] <config-file>
//!
//!   -t <steps>     number of timesteps to simulate (default 100)
//!   -f <freq>      output frequency for -o writers (default 10)
//!   -o <list>      comma-separated writers from {ckp,res,xyz}
//!   -p <prefix>    output filename prefix (default "mdsim")
//!   -i             incremental outputs (numbered, no overwrite)
//!   -h             this help
//!   -v             version
//! ```
//!
//! The scenario comes from the config's `phaseSpaceFile` (a phase-space or
//! checkpoint file). Exit codes: 0 success, 1 usage/configuration error,
//! 457 halo-exchange deadlock, 2004 scenario parameter corruption.

use std::path::PathBuf;
use std::process;

use stockmayer::components::ComponentRegistry;
use stockmayer::decomp::SequentialDecomposition;
use stockmayer::domain::Domain;
use stockmayer::error::SimError;
use stockmayer::io::config::{SimConfig, WriterKind};
use stockmayer::io::phase_space::read_phase_space;
use stockmayer::io::writers::{CheckpointWriter, ResultWriter, XyzWriter};
use stockmayer::simulation::Simulation;

struct CliArgs {
    config: PathBuf,
    timesteps: usize,
    output_frequency: usize,
    outputs: Vec<String>,
    prefix: String,
    incremental: bool,
}

fn print_help() {
    println!("Usage: mdsim [options] <config-file>");
    println!("  -t <steps>   number of timesteps to simulate (default 100)");
    println!("  -f <freq>    output frequency for -o writers (default 10)");
    println!("  -o <list>    comma-separated writers from {{ckp,res,xyz}}");
    println!("  -p <prefix>  output filename prefix (default \"mdsim\")");
    println!("  -i           incremental outputs (numbered, no overwrite)");
    println!("  -h           help");
    println!("  -v           version");
}

fn parse_args() -> Result<CliArgs, String> {
    let argv: Vec<String> = std::env::args().skip(1).collect();
    let mut config = None;
    let mut timesteps = 100usize;
    let mut output_frequency = 10usize;
    let mut outputs = Vec::new();
    let mut prefix = String::from("mdsim");
    let mut incremental = false;

    let mut it = argv.iter();
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "-h" | "--help" => {
                print_help();
                process::exit(0);
            }
            "-v" | "--version" => {
                println!("mdsim {}", env!("CARGO_PKG_VERSION"));
                process::exit(0);
            }
            "-i" => incremental = true,
            "-t" => {
                timesteps = it
                    .next()
                    .and_then(|v| v.parse().ok())
                    .ok_or("-t needs a step count")?;
            }
            "-f" => {
                output_frequency = it
                    .next()
                    .and_then(|v| v.parse().ok())
                    .ok_or("-f needs a frequency")?;
            }
            "-o" => {
                let list = it.next().ok_or("-o needs a writer list")?;
                outputs = list.split(',').map(str::to_string).collect();
            }
            "-p" => {
                prefix = it.next().ok_or("-p needs a prefix")?.clone();
            }
            other if !other.starts_with('-') => {
                config = Some(PathBuf::from(other));
            }
            other => return Err(format!("unknown option {other}")),
        }
    }

    Ok(CliArgs {
        config: config.ok_or("missing config file argument")?,
        timesteps,
        output_frequency: output_frequency.max(1),
        outputs,
        prefix,
        incremental,
    })
}

fn build_and_run(args: &CliArgs) -> Result<(), SimError> {
    let config = SimConfig::from_file(&args.config)?;
    let phase_space_path = config
        .phase_space_file
        .clone()
        .ok_or_else(|| SimError::Config("config names no phaseSpaceFile".into()))?;
    let data = read_phase_space(&phase_space_path)?;

    println!("  ── Loading scenario ──");
    println!("    Phase space: {}", phase_space_path.display());
    println!(
        "    Box: {:.4} × {:.4} × {:.4}, {} molecules, {} component(s)",
        data.length[0],
        data.length[1],
        data.length[2],
        data.molecules.len(),
        data.components.len()
    );
    println!(
        "    rc = {}, rc_LJ = {}, dt = {}",
        config.cutoff_radius, config.lj_cutoff_radius, config.timestep_length
    );

    let registry = ComponentRegistry::build(data.components.clone(), config.lj_cutoff_radius)?;
    let mut domain = Domain::new(data.length, config.cutoff_radius, config.lj_cutoff_radius)?;
    domain.epsilon_rf = config.epsilon_rf;
    domain.target_temperature = config.initial_temperature;
    domain.set_time(data.time);

    let decomp = SequentialDecomposition::new(data.length, config.cutoff_radius);
    let mut sim = Simulation::new(registry, domain, Box::new(decomp), config.timestep_length)?;
    let placed = sim.insert_molecules(data.molecules);
    println!("    Placed {placed} molecules");

    for spec in &config.outputs {
        match spec.kind {
            WriterKind::Result => sim.add_plugin(Box::new(ResultWriter::new(&spec.prefix))),
            WriterKind::Xyz => {
                sim.add_plugin(Box::new(XyzWriter::new(&spec.prefix, spec.frequency)));
            }
            WriterKind::Checkpoint => {
                sim.add_plugin(Box::new(CheckpointWriter::new(&spec.prefix, spec.frequency)));
            }
        }
    }
    for name in &args.outputs {
        match name.as_str() {
            "res" => sim.add_plugin(Box::new(ResultWriter::new(&args.prefix))),
            "xyz" => {
                let mut w = XyzWriter::new(&args.prefix, args.output_frequency);
                w.incremental = args.incremental;
                sim.add_plugin(Box::new(w));
            }
            "ckp" => {
                let mut w = CheckpointWriter::new(&args.prefix, args.output_frequency);
                w.incremental = args.incremental;
                sim.add_plugin(Box::new(w));
            }
            other => log::warn!("unknown -o writer '{other}' ignored"),
        }
    }
    // The final resumable checkpoint is always written.
    sim.add_plugin(Box::new(CheckpointWriter::new(&args.prefix, usize::MAX)));

    println!("  ── Simulating {} steps ──", args.timesteps);
    let summary = sim.run(args.timesteps)?;
    println!(
        "    Done: {} steps in {:.2}s ({:.1} steps/s)",
        summary.steps, summary.wall_time_s, summary.steps_per_sec
    );
    println!(
        "    Final: T*={:.6}, U/N={:.6}, p={:.6}",
        summary.final_temperature, summary.final_upot_per_molecule, summary.final_pressure
    );
    summary.write_json(&format!("{}.summary.json", args.prefix))?;
    Ok(())
}

fn main() {
    env_logger::init();
    let args = match parse_args() {
        Ok(a) => a,
        Err(msg) => {
            eprintln!("mdsim: {msg}");
            print_help();
            process::exit(1);
        }
    };
    if let Err(e) = build_and_run(&args) {
        eprintln!("mdsim: {e}");
        process::exit(e.exit_code());
    }
}

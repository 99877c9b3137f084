//! `heatmon`: check and switch the heating boards listed in a fleet file.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use heatmon_client::{
    capture, render_status, restore, ConfigSnapshot, Device, DeviceLink, Fleet, FleetConfig,
    Reachability, Room, TcpConnector,
};
use heatmon_protocol::{ProtocolError, RelayMode};
use tracing::{debug, error};
use tracing_subscriber::filter::{EnvFilter, LevelFilter};
use tracing_subscriber::prelude::*;

#[derive(Parser, Debug)]
#[command(name = "heatmon", about = "Monitor and switch heating controller boards", version)]
struct Cli {
    #[arg(
        long,
        short,
        global = true,
        value_name = "PATH",
        default_value = "fleet.yaml",
        help = "Fleet configuration file"
    )]
    config: PathBuf,

    #[arg(long, short, global = true, help = "Log every protocol exchange")]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Check which boards accept connections
    Probe,
    /// Show relay and temperature readings
    Status {
        /// Only this device
        #[arg(long, value_name = "ID")]
        device: Option<u32>,
    },
    /// Turn every relay of a board on
    On { id: u32 },
    /// Turn every relay of a board off
    Off { id: u32 },
    /// Set a single relay
    Set {
        id: u32,
        slot: u32,
        #[arg(value_parser = parse_mode, value_name = "ON|OFF")]
        mode: RelayMode,
    },
    /// Record the relay configuration of every board
    Save {
        #[arg(long, short, value_name = "PATH")]
        output: Option<PathBuf>,
    },
    /// Put recorded relay configuration back onto the boards
    Restore {
        #[arg(long, short, value_name = "PATH")]
        input: Option<PathBuf>,
    },
}

/// Only the wire tokens `ON` and `OFF` are accepted.
fn parse_mode(s: &str) -> Result<RelayMode, ProtocolError> {
    s.parse()
}

fn setup_tracing(verbose: bool) -> Result<()> {
    let level = if verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::WARN.into())
                .from_env_lossy()
                .add_directive(format!("heatmon={level}").parse()?),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .try_init()?;

    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Err(e) = setup_tracing(cli.verbose) {
        eprintln!("Failed to set up logging: {e:#}");
        return ExitCode::FAILURE;
    }

    match run(cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

/// Returns `false` when the command ran but something on a board failed.
fn run(cli: Cli) -> Result<bool> {
    let fleet = FleetConfig::from_file(&cli.config)
        .and_then(FleetConfig::resolve)
        .with_context(|| format!("cannot load fleet from {}", cli.config.display()))?;
    debug!("Loaded {} devices from {}", fleet.devices().len(), cli.config.display());

    let link = DeviceLink::for_fleet(&fleet);

    match cli.command {
        Command::Probe => Ok(probe(&link, &fleet)),
        Command::Status { device } => status(&link, &fleet, device),
        Command::On { id } => switch_all(&link, &fleet, id, RelayMode::On),
        Command::Off { id } => switch_all(&link, &fleet, id, RelayMode::Off),
        Command::Set { id, slot, mode } => {
            let device = fleet.device(id)?;
            let room = Room::new(&link, device, fleet.exclusions(id));
            if room.set_one(slot, mode).is_acknowledged() {
                println!("{}: R{} is {}", device.name, slot, mode);
                Ok(true)
            } else {
                println!("{}: R{} did not acknowledge {}", device.name, slot, mode);
                Ok(false)
            }
        }
        Command::Save { output } => {
            let path = output.unwrap_or_else(|| fleet.snapshot_path().to_path_buf());
            let snapshot = capture(&link, fleet.devices()).context("configuration not saved")?;
            snapshot
                .save(&path)
                .with_context(|| format!("cannot write {}", path.display()))?;
            println!("Saved {} devices to {}", snapshot.relays.len(), path.display());
            Ok(true)
        }
        Command::Restore { input } => {
            let path = input.unwrap_or_else(|| fleet.snapshot_path().to_path_buf());
            let snapshot = ConfigSnapshot::load(&path)
                .with_context(|| format!("cannot read {}", path.display()))?;
            let report = restore(&link, fleet.devices(), &snapshot);
            println!("Restored {} relays", report.applied);
            for (id, slot) in &report.failed {
                println!("  device {}: R{} failed", id, slot);
            }
            for id in &report.skipped_devices {
                println!("  device {}: not in snapshot", id);
            }
            Ok(report.is_complete())
        }
    }
}

fn probe(link: &DeviceLink<TcpConnector>, fleet: &Fleet) -> bool {
    let mut all_up = true;
    for device in fleet.devices() {
        let room = Room::new(link, device, fleet.exclusions(device.id));
        let state = match room.probe() {
            Reachability::Reachable => "up",
            Reachability::Unreachable => {
                all_up = false;
                "down"
            }
        };
        println!("{:<16} {:<22} {}", device.name, device.endpoint.to_string(), state);
    }
    all_up
}

fn status(link: &DeviceLink<TcpConnector>, fleet: &Fleet, only: Option<u32>) -> Result<bool> {
    let devices: Vec<&Device> = match only {
        Some(id) => vec![fleet.device(id)?],
        None => fleet.devices().iter().collect(),
    };

    let mut ok = true;
    for device in devices {
        let room = Room::new(link, device, fleet.exclusions(device.id));
        match room.status() {
            Ok(status) => print!("{}", render_status(device, &status)),
            Err(e) => {
                error!("{}: {}", device.name, e);
                ok = false;
            }
        }
    }
    Ok(ok)
}

fn switch_all(
    link: &DeviceLink<TcpConnector>,
    fleet: &Fleet,
    id: u32,
    mode: RelayMode,
) -> Result<bool> {
    let device = fleet.device(id)?;
    let room = Room::new(link, device, fleet.exclusions(id));
    let outcome = room
        .set_all(mode)
        .with_context(|| format!("cannot switch {} {}", device.name, mode))?;

    println!(
        "{}: {} relays switched {}, {} failed, {} excluded",
        device.name,
        outcome.attempted.len() - outcome.failed_count(),
        mode,
        outcome.failed_count(),
        outcome.skipped.len()
    );
    if !outcome.failed.is_empty() {
        let failed: Vec<String> = outcome.failed.iter().map(|s| format!("R{s}")).collect();
        println!("  not acknowledged: {}", failed.join(", "));
    }
    Ok(outcome.is_complete())
}

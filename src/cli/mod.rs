// src/cli/mod.rs — CLI definition (clap derive)

pub mod descriptor;
pub mod dose;
pub mod monitor;
pub mod prescribe;
pub mod run;

use anyhow::{anyhow, bail};
use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::dosimetry::{DeliveryMode, DeviceSetting, Mode, PulseType};

#[derive(Debug, Parser)]
#[command(name = "lumino", about = "Laser therapy session controller", version)]
pub struct Cli {
    /// Config file path
    #[arg(long, global = true)]
    pub config: Option<String>,

    /// Log session events to stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Start a monitored therapy session and accept operator commands on stdin
    Run(RunArgs),
    /// Show average power and the solved energy/time without starting anything
    Dose(DoseArgs),
    /// Write a session descriptor for a condition
    Prescribe(PrescribeArgs),
    /// Show the current session descriptor
    Descriptor {
        /// Descriptor path (defaults to the configured one)
        #[arg(long)]
        path: Option<String>,
    },
}

/// `lumino-monitor` takes no required arguments.
#[derive(Parser)]
#[command(name = "lumino-monitor", about = "Live therapy session monitor", version)]
pub struct MonitorCli {
    /// Config file path
    #[arg(long)]
    pub config: Option<String>,

    /// Listen on this port instead of the configured one
    #[arg(long)]
    pub port: Option<u16>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ModeArg {
    Cw,
    Pulse,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum PulseTypeArg {
    Single,
    Frequency,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum DeliveryArg {
    HandProbe,
    FootSwitch,
}

/// Device settings as entered on the control panel.
#[derive(Debug, Clone, Args)]
pub struct DeviceArgs {
    /// Master power in watts (0-30)
    #[arg(short = 'p', long, default_value = "0")]
    pub master_power: u8,

    /// Wavelength percentage, e.g. `--wavelength 808nm=40` (repeatable)
    #[arg(short = 'l', long = "wavelength", value_name = "NAME=PCT")]
    pub wavelengths: Vec<String>,

    /// Disable a wavelength (repeatable)
    #[arg(long = "disable", value_name = "NAME")]
    pub disabled: Vec<String>,

    #[arg(long, value_enum, default_value = "cw")]
    pub mode: ModeArg,

    #[arg(long, value_enum, default_value = "frequency")]
    pub pulse_type: PulseTypeArg,

    /// Pulse duration in seconds
    #[arg(long, default_value = "0.01")]
    pub pulse_duration: f64,

    /// Pulse frequency in Hz
    #[arg(short = 'f', long, default_value = "1")]
    pub frequency: u32,

    #[arg(short = 'd', long, value_enum)]
    pub delivery: Option<DeliveryArg>,
}

impl DeviceArgs {
    pub fn to_setting(&self) -> anyhow::Result<DeviceSetting> {
        let mut device = DeviceSetting {
            mode: match self.mode {
                ModeArg::Cw => Mode::Cw,
                ModeArg::Pulse => Mode::Pulse,
            },
            pulse_type: match self.pulse_type {
                PulseTypeArg::Single => PulseType::Single,
                PulseTypeArg::Frequency => PulseType::Frequency,
            },
            pulse_duration_s: self.pulse_duration,
            frequency_hz: self.frequency,
            delivery_mode: match self.delivery {
                Some(DeliveryArg::HandProbe) => DeliveryMode::HandProbe,
                Some(DeliveryArg::FootSwitch) => DeliveryMode::FootSwitch,
                None => DeliveryMode::Unset,
            },
            ..DeviceSetting::default()
        };
        for name in &self.disabled {
            device.set_wavelength_enabled(name, false)?;
        }
        device.set_master_power(self.master_power)?;
        for spec in &self.wavelengths {
            let (name, pct) = parse_wavelength(spec)?;
            device.set_wavelength_percent(name, pct)?;
        }
        Ok(device)
    }
}

fn parse_wavelength(spec: &str) -> anyhow::Result<(&str, u8)> {
    let (name, pct) = spec
        .split_once('=')
        .ok_or_else(|| anyhow!("Expected NAME=PCT, got '{}'", spec))?;
    let pct: u8 = pct
        .trim()
        .parse()
        .map_err(|_| anyhow!("Invalid percentage in '{}'", spec))?;
    if pct > 100 {
        bail!("Percentage must be 0-100, got {}", pct);
    }
    Ok((name.trim(), pct))
}

/// Energy or time target; the other is derived from the average power.
#[derive(Debug, Clone, Args)]
pub struct TargetArgs {
    /// Energy target in joules
    #[arg(short = 'e', long, conflicts_with = "time")]
    pub energy: Option<f64>,

    /// Time target in minutes
    #[arg(short = 't', long)]
    pub time: Option<f64>,

    /// Take targets from the session descriptor
    #[arg(long)]
    pub from_descriptor: bool,
}

#[derive(Debug, Clone, Args)]
pub struct RunArgs {
    #[command(flatten)]
    pub device: DeviceArgs,

    #[command(flatten)]
    pub targets: TargetArgs,

    /// Use an already running monitor instead of spawning one
    #[arg(long)]
    pub attach: bool,
}

#[derive(Debug, Clone, Args)]
pub struct DoseArgs {
    #[command(flatten)]
    pub device: DeviceArgs,

    #[command(flatten)]
    pub targets: TargetArgs,
}

#[derive(Debug, Clone, Args)]
pub struct PrescribeArgs {
    /// Condition, e.g. "TMDs"
    #[arg(long)]
    pub condition: String,

    /// Body part, e.g. "TMJ"
    #[arg(long)]
    pub body_part: String,

    /// Prescribed power in watts
    #[arg(long)]
    pub power: f64,

    /// Pulse frequency in Hz
    #[arg(long, default_value = "0")]
    pub pulse_freq: u32,

    /// Time in minutes
    #[arg(long, default_value = "0")]
    pub time: f64,

    /// Total energy in joules
    #[arg(long, default_value = "0")]
    pub energy: f64,

    /// Output path (defaults to the configured descriptor path)
    #[arg(long)]
    pub output: Option<String>,
}

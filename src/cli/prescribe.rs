// src/cli/prescribe.rs — `lumino prescribe`: write a session descriptor

use std::path::PathBuf;

use anyhow::bail;

use super::PrescribeArgs;
use crate::infra::config::Config;
use crate::session::descriptor::{save_descriptor, SessionDescriptor};
use crate::session::TherapyParameters;

pub fn run_prescribe(config: &Config, args: &PrescribeArgs) -> anyhow::Result<PathBuf> {
    if args.power < 0.0 || args.time < 0.0 || args.energy < 0.0 {
        bail!("Power, time and energy must not be negative");
    }
    let params = TherapyParameters {
        power_w: args.power,
        pulse_freq_hz: args.pulse_freq,
        total_energy_j: args.energy,
        time_min: args.time,
        condition: args.condition.clone(),
        body_part: args.body_part.clone(),
    };
    let path = args
        .output
        .as_ref()
        .map(PathBuf::from)
        .unwrap_or_else(|| config.session.descriptor_path());

    save_descriptor(&path, &SessionDescriptor::from_parameters(&params))?;
    tracing::info!("Wrote session descriptor to {}", path.display());
    println!("Saved {} to {}", params.label(), path.display());
    Ok(path)
}

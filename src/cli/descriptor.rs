// src/cli/descriptor.rs — `lumino descriptor`: inspect the session descriptor

use std::path::PathBuf;

use crate::infra::config::Config;
use crate::session::descriptor::load_descriptor;

pub fn show_descriptor(config: &Config, path: Option<&str>) -> anyhow::Result<()> {
    let path = path
        .map(PathBuf::from)
        .unwrap_or_else(|| config.session.descriptor_path());

    let descriptor = match load_descriptor(&path) {
        Ok(d) => d,
        Err(e) => {
            tracing::warn!(kind = e.kind(), "{}", e);
            return Err(e.into());
        }
    };
    let params = descriptor.to_parameters()?;

    println!("Descriptor: {}", path.display());
    println!("  Condition:    {}", params.condition);
    println!("  Body part:    {}", params.body_part);
    for (key, value) in &descriptor.user_selections.extra {
        println!("  {:<13} {}", format!("{}:", key), value);
    }
    println!("  Power:        {} W", params.power_w);
    println!("  Pulse freq:   {} Hz", params.pulse_freq_hz);
    println!("  Time:         {} min", params.time_min);
    println!("  Total energy: {} J", params.total_energy_j);
    Ok(())
}

// src/cli/dose.rs — `lumino dose`: dosimetry preview

use super::DoseArgs;
use crate::dosimetry::{average_power, round2, PetInputs};
use crate::infra::config::Config;
use crate::session::descriptor::load_parameters;

pub fn show_dose(config: &Config, args: &DoseArgs) -> anyhow::Result<()> {
    let device = args.device.to_setting()?;
    let avg = average_power(&device);

    let mut inputs = PetInputs::default();
    if args.targets.from_descriptor {
        let params = load_parameters(&config.session.descriptor_path())?;
        inputs.energy_j = params.total_energy_j;
        inputs.time_min = params.time_min;
        println!("Descriptor:    {}", params.label());
    }
    if let Some(energy) = args.targets.energy {
        inputs.edit_energy(energy);
    }
    if let Some(time) = args.targets.time {
        inputs.edit_time(time);
    }

    println!("Average power: {} W", round2(avg));
    println!("Enabled share: {}%", device.total_enabled_percent().min(100));
    match inputs.resolve(avg, config.dosimetry.ambiguous_target) {
        Some(solution) if solution.achievable => {
            println!("Energy:        {} J", round2(solution.energy_j));
            println!("Time:          {} min", round2(solution.time_s / 60.0));
        }
        Some(_) => println!("Average power is 0; the target cannot be achieved."),
        None => println!("No energy or time target given."),
    }
    if let Err(e) = device.validate_for_start() {
        println!("Not ready:     {}", e);
    }
    Ok(())
}

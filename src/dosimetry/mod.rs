// src/dosimetry/mod.rs — Device settings and average power
//
// Pure functions only. Values stay unrounded here; `round2` and the display
// helpers are applied at the edges (CLI output, monitor readout).

pub mod pet;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::infra::errors::{LuminoError, Result};

pub use pet::{solve_pet, PetInputs, PetSolution, PetTarget, TargetKind};

/// Upper bound for the master power dial, in watts.
pub const MAX_MASTER_POWER_W: u8 = 30;

/// Wavelengths fitted to the device, all enabled at 0% on power-up.
pub const DEFAULT_WAVELENGTHS: [&str; 3] = ["808nm", "980nm", "1064nm"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mode {
    #[serde(rename = "CW")]
    Cw,
    Pulse,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PulseType {
    Single,
    Frequency,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DeliveryMode {
    #[serde(rename = "Hand Probe")]
    HandProbe,
    #[serde(rename = "Foot Switch")]
    FootSwitch,
    #[default]
    #[serde(alias = "", alias = "N/A")]
    Unset,
}

impl DeliveryMode {
    pub fn label(&self) -> &'static str {
        match self {
            DeliveryMode::HandProbe => "Hand Probe",
            DeliveryMode::FootSwitch => "Foot Switch",
            DeliveryMode::Unset => "N/A",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WavelengthSetting {
    pub enabled: bool,
    pub power_percent: u8,
}

/// Operator-facing device configuration. Owned by the controller.
///
/// Field names on the wire follow the monitor protocol (`master_power`,
/// `pulse_duration`, `frequency`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceSetting {
    #[serde(rename = "master_power")]
    pub master_power_w: u8,
    pub wavelengths: BTreeMap<String, WavelengthSetting>,
    pub mode: Mode,
    pub pulse_type: PulseType,
    #[serde(rename = "pulse_duration")]
    pub pulse_duration_s: f64,
    #[serde(rename = "frequency")]
    pub frequency_hz: u32,
    #[serde(default)]
    pub delivery_mode: DeliveryMode,
}

impl Default for DeviceSetting {
    fn default() -> Self {
        let wavelengths = DEFAULT_WAVELENGTHS
            .iter()
            .map(|name| {
                (
                    name.to_string(),
                    WavelengthSetting {
                        enabled: true,
                        power_percent: 0,
                    },
                )
            })
            .collect();
        Self {
            master_power_w: 0,
            wavelengths,
            mode: Mode::Cw,
            pulse_type: PulseType::Frequency,
            pulse_duration_s: 0.01,
            frequency_hz: 1,
            delivery_mode: DeliveryMode::Unset,
        }
    }
}

impl DeviceSetting {
    /// Sum of enabled wavelength percentages (may exceed 100).
    pub fn total_enabled_percent(&self) -> u32 {
        self.wavelengths
            .values()
            .filter(|w| w.enabled)
            .map(|w| w.power_percent as u32)
            .sum()
    }

    /// Change master power, rescaling enabled wavelengths proportionally.
    ///
    /// From 0 W to a positive value every enabled wavelength jumps to 100%;
    /// back to 0 W every wavelength drops to 0%.
    pub fn set_master_power(&mut self, watts: u8) -> Result<()> {
        if watts > MAX_MASTER_POWER_W {
            return Err(LuminoError::InvalidParameters(format!(
                "Master power must be between 0 and {} W, got {}",
                MAX_MASTER_POWER_W, watts
            )));
        }

        let previous = self.master_power_w;
        if previous == 0 {
            for w in self.wavelengths.values_mut() {
                if watts == 0 {
                    w.power_percent = 0;
                } else if w.enabled {
                    w.power_percent = 100;
                }
            }
        } else {
            let scale = watts as f64 / previous as f64;
            for w in self.wavelengths.values_mut().filter(|w| w.enabled) {
                let scaled = (w.power_percent as f64 * scale).round();
                w.power_percent = scaled.clamp(0.0, 100.0) as u8;
            }
        }

        self.master_power_w = watts;
        Ok(())
    }

    /// Set one wavelength's share. Rejected while master power is 0 W.
    pub fn set_wavelength_percent(&mut self, name: &str, percent: u8) -> Result<()> {
        if percent > 100 {
            return Err(LuminoError::InvalidParameters(format!(
                "{} power must be between 0 and 100%, got {}",
                name, percent
            )));
        }
        if self.master_power_w == 0 && percent > 0 {
            return Err(LuminoError::InvalidParameters(
                "Individual wavelength power cannot be set if Master Power is 0 W. Set Master Power first."
                    .into(),
            ));
        }
        let w = self.wavelengths.get_mut(name).ok_or_else(|| {
            LuminoError::InvalidParameters(format!("Unknown wavelength '{}'", name))
        })?;
        w.power_percent = percent;
        Ok(())
    }

    pub fn set_wavelength_enabled(&mut self, name: &str, enabled: bool) -> Result<()> {
        let w = self.wavelengths.get_mut(name).ok_or_else(|| {
            LuminoError::InvalidParameters(format!("Unknown wavelength '{}'", name))
        })?;
        w.enabled = enabled;
        Ok(())
    }

    /// Check the settings a session needs before it may start.
    ///
    /// Reports the first failing rule.
    pub fn validate_for_start(&self) -> Result<()> {
        if self.master_power_w == 0 {
            return Err(LuminoError::InvalidParameters(
                "Master Power must be greater than 0.".into(),
            ));
        }
        if self.master_power_w > MAX_MASTER_POWER_W {
            return Err(LuminoError::InvalidParameters(format!(
                "Master Power cannot exceed {} W.",
                MAX_MASTER_POWER_W
            )));
        }
        if !self
            .wavelengths
            .values()
            .any(|w| w.enabled && w.power_percent > 0)
        {
            return Err(LuminoError::InvalidParameters(
                "At least one enabled wavelength must have power greater than 0%.".into(),
            ));
        }
        if self.mode == Mode::Pulse {
            if !(self.pulse_duration_s > 0.0) {
                return Err(LuminoError::InvalidParameters(
                    "Pulse Duration must be greater than 0 in Pulse mode.".into(),
                ));
            }
            if self.pulse_type == PulseType::Frequency && self.frequency_hz == 0 {
                return Err(LuminoError::InvalidParameters(
                    "Frequency must be greater than 0 in Frequency mode.".into(),
                ));
            }
        }
        if self.delivery_mode == DeliveryMode::Unset {
            return Err(LuminoError::InvalidParameters(
                "Please select either 'Hand Probe' or 'Foot Switch' for delivery.".into(),
            ));
        }
        Ok(())
    }
}

/// Time-averaged output power in watts.
pub fn average_power(setting: &DeviceSetting) -> f64 {
    let total_percent = setting.total_enabled_percent();
    if setting.master_power_w == 0 || total_percent == 0 {
        return 0.0;
    }

    let normalized = total_percent.min(100) as f64 / 100.0;
    let effective_peak = setting.master_power_w as f64 * normalized;

    match (setting.mode, setting.pulse_type) {
        (Mode::Cw, _) | (Mode::Pulse, PulseType::Single) => effective_peak,
        (Mode::Pulse, PulseType::Frequency) => {
            if !(setting.pulse_duration_s > 0.0) || setting.frequency_hz == 0 {
                return 0.0;
            }
            let duty = setting.pulse_duration_s * setting.frequency_hz as f64;
            // Duty cycle saturates at 100%.
            if duty > 1.0 {
                effective_peak
            } else {
                effective_peak * duty
            }
        }
    }
}

/// Round to two decimals for display.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Delivered energy as the monitor shows it: whole joules, zero-padded to 4 digits.
pub fn format_joules(joules: f64) -> String {
    format!("{:04}", joules.max(0.0).trunc() as u64)
}

/// Seconds rendered as minutes with two decimals.
pub fn format_minutes(seconds: f64) -> String {
    format!("{:.2}", seconds.max(0.0) / 60.0)
}

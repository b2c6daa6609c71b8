// src/session/params.rs — Per-session therapy parameters

use serde::{Deserialize, Serialize};

use crate::dosimetry::{solve_pet, PetTarget, TargetKind};
use crate::infra::errors::{LuminoError, Result};

/// Immutable snapshot of the dose a session is meant to deliver.
///
/// `power_w` is the average delivered power.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TherapyParameters {
    pub power_w: f64,
    pub pulse_freq_hz: u32,
    pub total_energy_j: f64,
    pub time_min: f64,
    pub condition: String,
    pub body_part: String,
}

impl TherapyParameters {
    /// Which target drives the session, using `prefer` when both are set.
    pub fn target(&self, prefer: TargetKind) -> Option<PetTarget> {
        let energy = self.total_energy_j > 0.0;
        let time = self.time_min > 0.0;
        match (energy, time, prefer) {
            (false, false, _) => None,
            (true, false, _) | (true, true, TargetKind::Energy) => {
                Some(PetTarget::Energy(self.total_energy_j))
            }
            (false, true, _) | (true, true, TargetKind::Time) => {
                Some(PetTarget::Time(self.time_min * 60.0))
            }
        }
    }

    /// Session length in seconds.
    ///
    /// Fails when neither target is set, or when energy drives the session
    /// and average power is zero.
    pub fn total_duration_s(&self, prefer: TargetKind) -> Result<f64> {
        if !(self.power_w >= 0.0 && self.total_energy_j >= 0.0 && self.time_min >= 0.0) {
            return Err(LuminoError::InvalidParameters(
                "Power, energy and time must not be negative.".into(),
            ));
        }
        let target = self.target(prefer).ok_or_else(|| {
            LuminoError::InvalidParameters(
                "Please set a valid target Energy or Time for the therapy.".into(),
            )
        })?;
        let solution = solve_pet(target, self.power_w);
        if let PetTarget::Energy(_) = target {
            if !solution.achievable {
                return Err(LuminoError::InvalidParameters(
                    "Average power is 0. Cannot deliver target energy. Adjust power settings."
                        .into(),
                ));
            }
        }
        Ok(solution.time_s)
    }

    /// "Body part - Condition" label shown on the monitor.
    pub fn label(&self) -> String {
        let mut body = self.body_part.chars();
        let body = match body.next() {
            Some(first) => first.to_uppercase().collect::<String>() + &body.as_str().to_lowercase(),
            None => "N/A".to_string(),
        };
        let condition = if self.condition.is_empty() {
            "N/A"
        } else {
            self.condition.as_str()
        };
        format!("{} - {}", body, condition)
    }
}

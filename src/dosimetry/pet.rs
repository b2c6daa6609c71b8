// src/dosimetry/pet.rs — Power / Energy / Time solver (E = P × T)

use serde::{Deserialize, Serialize};

/// Which dose target drives the session length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetKind {
    Energy,
    Time,
}

/// A known quantity handed to the solver. Time is in seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PetTarget {
    Energy(f64),
    Time(f64),
}

impl PetTarget {
    pub fn kind(&self) -> TargetKind {
        match self {
            PetTarget::Energy(_) => TargetKind::Energy,
            PetTarget::Time(_) => TargetKind::Time,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PetSolution {
    pub energy_j: f64,
    pub time_s: f64,
    /// False when average power is zero: the unknown was pinned to 0 and the
    /// caller must tell the operator the target cannot be achieved.
    pub achievable: bool,
}

/// Solve for the missing member of `E = P × T`.
pub fn solve_pet(known: PetTarget, avg_power_w: f64) -> PetSolution {
    let achievable = avg_power_w > 0.0;
    match known {
        PetTarget::Energy(energy_j) => PetSolution {
            energy_j,
            time_s: if achievable { energy_j / avg_power_w } else { 0.0 },
            achievable,
        },
        PetTarget::Time(time_s) => PetSolution {
            energy_j: if achievable { avg_power_w * time_s } else { 0.0 },
            time_s,
            achievable,
        },
    }
}

/// Operator-entered energy/time targets plus which one was edited last.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PetInputs {
    pub energy_j: f64,
    pub time_min: f64,
    pub last_edited: Option<TargetKind>,
}

impl PetInputs {
    pub fn edit_energy(&mut self, energy_j: f64) {
        self.energy_j = energy_j.max(0.0);
        self.last_edited = Some(TargetKind::Energy);
    }

    pub fn edit_time(&mut self, time_min: f64) {
        self.time_min = time_min.max(0.0);
        self.last_edited = Some(TargetKind::Time);
    }

    /// The target that decides the session length, if any is set.
    ///
    /// With both nonzero the last edit wins; without a tracked edit `fallback`
    /// decides.
    pub fn authoritative(&self, fallback: TargetKind) -> Option<PetTarget> {
        let energy = PetTarget::Energy(self.energy_j);
        let time = PetTarget::Time(self.time_min * 60.0);
        match (self.energy_j > 0.0, self.time_min > 0.0) {
            (false, false) => None,
            (true, false) => Some(energy),
            (false, true) => Some(time),
            (true, true) => match self.last_edited.unwrap_or(fallback) {
                TargetKind::Energy => Some(energy),
                TargetKind::Time => Some(time),
            },
        }
    }

    /// Re-derive the non-authoritative field from the current average power.
    ///
    /// Returns the solution, or `None` when neither target is set.
    pub fn resolve(&mut self, avg_power_w: f64, fallback: TargetKind) -> Option<PetSolution> {
        let target = self.authoritative(fallback)?;
        let solution = solve_pet(target, avg_power_w);
        self.energy_j = solution.energy_j;
        self.time_min = solution.time_s / 60.0;
        Some(solution)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_time_to_energy() {
        let s = solve_pet(PetTarget::Time(600.0), 5.0);
        assert!((s.energy_j - 3000.0).abs() < 1e-9);
        assert!(s.achievable);
    }

    #[test]
    fn test_energy_to_time() {
        let s = solve_pet(PetTarget::Energy(3000.0), 5.0);
        assert!((s.time_s - 600.0).abs() < 1e-9);
    }

    #[test]
    fn test_zero_power_pins_unknown() {
        let s = solve_pet(PetTarget::Energy(3000.0), 0.0);
        assert_eq!(s.time_s, 0.0);
        assert!(!s.achievable);
        let s = solve_pet(PetTarget::Time(60.0), 0.0);
        assert_eq!(s.energy_j, 0.0);
        assert!(!s.achievable);
    }

    #[test]
    fn test_round_trip_time_energy_time() {
        for power in [0.5, 3.3, 12.0, 30.0] {
            for time_s in [1.0, 59.9, 660.0, 3600.0] {
                let e = solve_pet(PetTarget::Time(time_s), power).energy_j;
                let t = solve_pet(PetTarget::Energy(e), power).time_s;
                assert!((t - time_s).abs() < 1e-6, "power={power} time={time_s}");
            }
        }
    }

    #[test]
    fn test_last_edit_wins() {
        let mut inputs = PetInputs::default();
        inputs.edit_time(10.0);
        inputs.edit_energy(300.0);
        assert_eq!(
            inputs.authoritative(TargetKind::Time),
            Some(PetTarget::Energy(300.0))
        );
        inputs.edit_time(2.0);
        assert_eq!(
            inputs.authoritative(TargetKind::Energy),
            Some(PetTarget::Time(120.0))
        );
    }

    #[test]
    fn test_fallback_without_tracked_edit() {
        let inputs = PetInputs {
            energy_j: 3100.0,
            time_min: 11.0,
            last_edited: None,
        };
        assert_eq!(
            inputs.authoritative(TargetKind::Time),
            Some(PetTarget::Time(660.0))
        );
        assert_eq!(
            inputs.authoritative(TargetKind::Energy),
            Some(PetTarget::Energy(3100.0))
        );
    }

    #[test]
    fn test_single_target_ignores_fallback() {
        let mut inputs = PetInputs::default();
        inputs.energy_j = 100.0;
        assert_eq!(
            inputs.authoritative(TargetKind::Time),
            Some(PetTarget::Energy(100.0))
        );
        assert_eq!(PetInputs::default().authoritative(TargetKind::Time), None);
    }

    #[test]
    fn test_resolve_updates_other_field() {
        let mut inputs = PetInputs::default();
        inputs.edit_time(5.0);
        let s = inputs.resolve(10.0, TargetKind::Time).unwrap();
        assert!((s.energy_j - 3000.0).abs() < 1e-9);
        assert!((inputs.energy_j - 3000.0).abs() < 1e-9);
        assert!((inputs.time_min - 5.0).abs() < 1e-12);
    }
}

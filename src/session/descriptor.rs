// src/session/descriptor.rs — Session descriptor store
//
// The selection screens write the chosen condition's prescription to
// `temp_selection.json`; the controller and monitor read it once at startup.
// Every failure mode maps to its own `DescriptorLoadError` variant.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::params::TherapyParameters;
use crate::infra::errors::DescriptorLoadError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionDescriptor {
    #[serde(rename = "User Selections")]
    pub user_selections: UserSelections,
    #[serde(rename = "Therapy Data")]
    pub therapy_data: BTreeMap<String, Value>,
    #[serde(rename = "Body Part")]
    pub body_part: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserSelections {
    #[serde(rename = "Condition")]
    pub condition: String,
    /// Size, Area, Skin Tone and anything else the selection screen recorded.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

const FIELD_POWER: &str = "Power";
const FIELD_PULSE_FREQ: &str = "Pulse Freq";
const FIELD_TIME: &str = "Time";
const FIELD_TOTAL_ENERGY: &str = "Total Energy";

impl SessionDescriptor {
    pub fn from_parameters(params: &TherapyParameters) -> Self {
        let mut therapy_data = BTreeMap::new();
        therapy_data.insert(FIELD_POWER.to_string(), number(params.power_w));
        therapy_data.insert(
            FIELD_PULSE_FREQ.to_string(),
            Value::from(params.pulse_freq_hz),
        );
        therapy_data.insert(FIELD_TIME.to_string(), number(params.time_min));
        therapy_data.insert(
            FIELD_TOTAL_ENERGY.to_string(),
            number(params.total_energy_j),
        );
        Self {
            user_selections: UserSelections {
                condition: params.condition.clone(),
                extra: BTreeMap::new(),
            },
            therapy_data,
            body_part: params.body_part.clone(),
        }
    }

    /// Validate and convert the numeric fields.
    pub fn to_parameters(&self) -> Result<TherapyParameters, DescriptorLoadError> {
        let freq = self.numeric(FIELD_PULSE_FREQ)?;
        Ok(TherapyParameters {
            power_w: self.numeric(FIELD_POWER)?,
            pulse_freq_hz: freq.trunc() as u32,
            total_energy_j: self.numeric(FIELD_TOTAL_ENERGY)?,
            time_min: self.numeric(FIELD_TIME)?,
            condition: self.user_selections.condition.clone(),
            body_part: self.body_part.clone(),
        })
    }

    fn numeric(&self, field: &str) -> Result<f64, DescriptorLoadError> {
        let non_numeric = |value: String| DescriptorLoadError::NonNumeric {
            field: field.to_string(),
            value,
        };
        let value = self
            .therapy_data
            .get(field)
            .ok_or_else(|| non_numeric("<missing>".into()))?;
        let parsed = match value {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        };
        match parsed {
            Some(v) if v.is_finite() && v >= 0.0 => Ok(v),
            _ => Err(non_numeric(value.to_string())),
        }
    }
}

/// Whole numbers are written as integers, the way the selection screens do.
fn number(v: f64) -> Value {
    if v.fract() == 0.0 && v.abs() < u32::MAX as f64 {
        Value::from(v as i64)
    } else {
        Value::from(v)
    }
}

/// Read the descriptor at `path`.
pub fn load_descriptor(path: &Path) -> Result<SessionDescriptor, DescriptorLoadError> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        if !dir.is_dir() {
            return Err(DescriptorLoadError::MissingDirectory(dir.to_path_buf()));
        }
    }
    if !path.exists() {
        return Err(DescriptorLoadError::MissingFile(path.to_path_buf()));
    }
    if !path.is_file() {
        return Err(DescriptorLoadError::NotAFile(path.to_path_buf()));
    }

    let content = std::fs::read_to_string(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::PermissionDenied => DescriptorLoadError::Permission(path.to_path_buf()),
        std::io::ErrorKind::InvalidData => DescriptorLoadError::Decode {
            path: path.to_path_buf(),
            message: e.to_string(),
        },
        _ => DescriptorLoadError::Os {
            path: path.to_path_buf(),
            source: e,
        },
    })?;

    serde_json::from_str(&content).map_err(|e| DescriptorLoadError::Decode {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

/// Read the descriptor and convert it to therapy parameters.
pub fn load_parameters(path: &Path) -> Result<TherapyParameters, DescriptorLoadError> {
    let descriptor = load_descriptor(path)?;
    let params = descriptor.to_parameters()?;
    tracing::info!(
        "Loaded session descriptor: {} ({} W, {} Hz, {} min, {} J)",
        params.label(),
        params.power_w,
        params.pulse_freq_hz,
        params.time_min,
        params.total_energy_j
    );
    Ok(params)
}

/// Atomically write the descriptor (temp file + rename).
pub fn save_descriptor(path: &Path, descriptor: &SessionDescriptor) -> anyhow::Result<()> {
    let dir = path
        .parent()
        .filter(|d| !d.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir)?;

    let json = serde_json::to_string_pretty(descriptor)?;
    let tmp = dir.join(".temp_selection.json.tmp");

    let mut f = std::fs::File::create(&tmp)?;
    f.write_all(json.as_bytes())?;
    f.flush()?;
    f.sync_all()?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const TMJ_JSON: &str = r#"{
        "User Selections": {"Condition": "TMDs"},
        "Therapy Data": {"Power": 36, "Pulse Freq": 8700, "Time": 11, "Total Energy": 3100},
        "Body Part": "TMJ"
    }"#;

    #[test]
    fn test_parse_tmj_descriptor() {
        let d: SessionDescriptor = serde_json::from_str(TMJ_JSON).unwrap();
        let p = d.to_parameters().unwrap();
        assert_eq!(p.power_w, 36.0);
        assert_eq!(p.pulse_freq_hz, 8700);
        assert_eq!(p.time_min, 11.0);
        assert_eq!(p.total_energy_j, 3100.0);
        assert_eq!(p.condition, "TMDs");
        assert_eq!(p.body_part, "TMJ");
    }

    #[test]
    fn test_extra_user_selections_kept() {
        let json = r#"{
            "User Selections": {"Condition": "Acne", "Size": "Small", "Skin Tone": "III"},
            "Therapy Data": {"Power": 10, "Pulse Freq": 0, "Time": "2.5", "Total Energy": 0},
            "Body Part": "Skin"
        }"#;
        let d: SessionDescriptor = serde_json::from_str(json).unwrap();
        assert_eq!(d.user_selections.extra.len(), 2);
        assert_eq!(d.to_parameters().unwrap().time_min, 2.5);
    }

    #[test]
    fn test_non_numeric_field_reported() {
        let json = TMJ_JSON.replace("\"Time\": 11", "\"Time\": \"eleven\"");
        let d: SessionDescriptor = serde_json::from_str(&json).unwrap();
        match d.to_parameters() {
            Err(DescriptorLoadError::NonNumeric { field, .. }) => assert_eq!(field, "Time"),
            other => panic!("expected NonNumeric, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_field_reported() {
        let json = TMJ_JSON.replace("\"Power\": 36, ", "");
        let d: SessionDescriptor = serde_json::from_str(&json).unwrap();
        assert!(matches!(
            d.to_parameters(),
            Err(DescriptorLoadError::NonNumeric { .. })
        ));
    }

    #[test]
    fn test_missing_file() {
        let dir = TempDir::new().unwrap();
        let err = load_descriptor(&dir.path().join("temp_selection.json")).unwrap_err();
        assert_eq!(err.kind(), "missing_file");
    }

    #[test]
    fn test_missing_directory() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("therapy").join("temp_selection.json");
        let err = load_descriptor(&path).unwrap_err();
        assert_eq!(err.kind(), "missing_directory");
    }

    #[test]
    fn test_path_is_directory() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("temp_selection.json");
        std::fs::create_dir(&path).unwrap();
        assert_eq!(load_descriptor(&path).unwrap_err().kind(), "not_a_file");
    }

    #[test]
    fn test_corrupt_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("temp_selection.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert_eq!(load_descriptor(&path).unwrap_err().kind(), "decode");

        std::fs::write(&path, "").unwrap();
        assert_eq!(load_descriptor(&path).unwrap_err().kind(), "decode");
    }

    #[test]
    fn test_save_then_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("temp_selection.json");
        let params = TherapyParameters {
            power_w: 35.0,
            pulse_freq_hz: 8500,
            total_energy_j: 3250.0,
            time_min: 11.0,
            condition: "Spondylo-arthrosis".into(),
            body_part: "Neck".into(),
        };
        save_descriptor(&path, &SessionDescriptor::from_parameters(&params)).unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("\"Pulse Freq\": 8500"));
        assert_eq!(load_parameters(&path).unwrap(), params);
    }
}

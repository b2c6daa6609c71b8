// src/infra/config.rs — Configuration loading (TOML)

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::dosimetry::TargetKind;
use crate::infra::paths;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub sync: SyncConfig,

    #[serde(default)]
    pub monitor: MonitorConfig,

    #[serde(default)]
    pub supervisor: SupervisorConfig,

    #[serde(default)]
    pub controller: ControllerConfig,

    #[serde(default)]
    pub dosimetry: DosimetryConfig,

    #[serde(default)]
    pub session: SessionConfig,
}

/// Loopback link between controller and monitor.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub host: String,
    pub port: u16,
    pub connect_attempts: u32,
    pub connect_delay_ms: u64,
    pub update_interval_ms: u64,
    pub read_buffer_bytes: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 65432,
            connect_attempts: 20,
            connect_delay_ms: 200,
            update_interval_ms: 1000,
            read_buffer_bytes: 4096,
        }
    }
}

impl SyncConfig {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn connect_delay(&self) -> Duration {
        Duration::from_millis(self.connect_delay_ms)
    }

    pub fn update_interval(&self) -> Duration {
        Duration::from_millis(self.update_interval_ms.max(1))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub tick_ms: u64,
    pub auto_stop_on_disconnect: bool,
    /// Monitor executable; defaults to `lumino-monitor` beside `lumino`.
    #[serde(default)]
    pub program: Option<String>,
    #[serde(default)]
    pub args: Vec<String>,
    pub startup_delay_ms: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            tick_ms: 200,
            auto_stop_on_disconnect: false,
            program: None,
            args: Vec::new(),
            startup_delay_ms: 1000,
        }
    }
}

impl MonitorConfig {
    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms.max(1))
    }

    pub fn program_path(&self) -> PathBuf {
        self.program
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(paths::monitor_program)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisorConfig {
    pub grace_period_ms: u64,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            grace_period_ms: 5000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    pub poll_ms: u64,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self { poll_ms: 100 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DosimetryConfig {
    /// Which target wins when energy and time are both set and no edit was tracked.
    pub ambiguous_target: TargetKind,
}

impl Default for DosimetryConfig {
    fn default() -> Self {
        Self {
            ambiguous_target: TargetKind::Time,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default)]
    pub descriptor_path: Option<String>,
}

impl SessionConfig {
    pub fn descriptor_path(&self) -> PathBuf {
        self.descriptor_path
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(paths::descriptor_path)
    }
}

impl Config {
    /// Load config from file, falling back to defaults.
    pub fn load() -> anyhow::Result<Self> {
        let path = paths::config_file_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }
}

// src/infra/paths.rs — Platform path management
//
// All paths respect the LUMINO_HOME environment variable for isolation.
// When LUMINO_HOME is set, config and data live under that directory.
// When unset, config uses the platform config dir and data the local data dir.

use directories::ProjectDirs;
use std::path::PathBuf;

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("", "", "lumino")
}

/// Returns the LUMINO_HOME override, if set.
fn lumino_home() -> Option<PathBuf> {
    std::env::var_os("LUMINO_HOME").map(PathBuf::from)
}

/// Configuration directory: $LUMINO_HOME/ or the platform config dir.
pub fn config_dir() -> PathBuf {
    if let Some(home) = lumino_home() {
        return home;
    }
    project_dirs()
        .map(|d| d.config_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from(".lumino"))
}

/// Data directory: $LUMINO_HOME/data/ or the platform local data dir.
pub fn data_dir() -> PathBuf {
    if let Some(home) = lumino_home() {
        return home.join("data");
    }
    project_dirs()
        .map(|d| d.data_local_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from(".lumino").join("data"))
}

/// Config file path
pub fn config_file_path() -> PathBuf {
    config_dir().join("config.toml")
}

/// Session descriptor written by the selection screens.
pub fn descriptor_path() -> PathBuf {
    data_dir().join("temp_selection.json")
}

/// Default monitor executable: `lumino-monitor` next to the running binary.
pub fn monitor_program() -> PathBuf {
    let name = format!("lumino-monitor{}", std::env::consts::EXE_SUFFIX);
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join(&name)))
        .unwrap_or_else(|| PathBuf::from(name))
}

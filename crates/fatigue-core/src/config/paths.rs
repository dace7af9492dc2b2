//! Standard paths for the configuration file and the artifact fallback directory

use std::path::{Path, PathBuf};

/// Environment variable overriding the configuration file location
pub const CONFIG_ENV: &str = "FATIGUE_CONFIG";

/// Environment variable naming a directory that holds both artifacts
pub const ARTIFACT_DIR_ENV: &str = "FATIGUE_ARTIFACT_DIR";

/// Returns: `<config_dir>/fatigue-coach/config.yaml`
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("fatigue-coach")
        .join("config.yaml")
}

/// Explicit path, then `$FATIGUE_CONFIG`, then the default location
pub fn resolve_config_path(explicit: Option<&Path>) -> PathBuf {
    if let Some(path) = explicit {
        return path.to_path_buf();
    }
    match std::env::var_os(CONFIG_ENV) {
        Some(path) if !path.is_empty() => PathBuf::from(path),
        _ => default_config_path(),
    }
}

/// Documented last-resort artifact directory
///
/// Returns: `<data_dir>/fatigue-coach/models`
pub fn default_artifact_dir() -> Option<PathBuf> {
    dirs::data_dir().map(|dir| dir.join("fatigue-coach").join("models"))
}

//! Configuration file loading
//!
//! YAML loading for any deserializable configuration type, falling back to
//! defaults so a broken file never stops a prediction.

use serde::de::DeserializeOwned;
use std::path::Path;

/// Load a configuration file, or `T::default()` when it is missing or unreadable
///
/// Parse errors are logged at `warn`; they never abort the caller.
pub fn load_config<T>(path: &Path) -> T
where
    T: DeserializeOwned + Default,
{
    if !path.exists() {
        log::info!("No config file at {:?}, using defaults", path);
        return T::default();
    }

    let parsed = std::fs::read_to_string(path)
        .map_err(|e| e.to_string())
        .and_then(|contents| serde_yaml::from_str::<T>(&contents).map_err(|e| e.to_string()));

    match parsed {
        Ok(config) => {
            log::info!("Loaded config from {:?}", path);
            config
        }
        Err(e) => {
            log::warn!("Ignoring config {:?} ({}), using defaults", path, e);
            T::default()
        }
    }
}

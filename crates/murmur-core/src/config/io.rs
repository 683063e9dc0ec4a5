//! YAML config files
//!
//! Loading never fails: a missing file means "use defaults", and a broken one
//! is reported once and then ignored, so a stale config can never keep the
//! engine from starting.

use std::path::Path;

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Read `path`, or `T::default()` when it is missing or does not parse
///
/// ```ignore
/// let config: EngineConfig = load_config(&default_config_path());
/// ```
pub fn load_config<T>(path: &Path) -> T
where
    T: DeserializeOwned + Default,
{
    if !path.exists() {
        log::info!("No config at {:?}, using defaults", path);
        return T::default();
    }
    match read_yaml(path) {
        Ok(config) => {
            log::info!("Loaded config from {:?}", path);
            config
        }
        Err(e) => {
            log::warn!("Ignoring config {:?}: {:#}", path, e);
            T::default()
        }
    }
}

fn read_yaml<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let text = std::fs::read_to_string(path).context("read failed")?;
    serde_yaml::from_str(&text).context("not valid YAML for this config")
}

/// Write `config` as YAML, creating parent directories
pub fn save_config<T>(config: &T, path: &Path) -> Result<()>
where
    T: Serialize,
{
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).with_context(|| format!("Cannot create {:?}", dir))?;
    }
    let yaml = serde_yaml::to_string(config).context("Cannot serialize config")?;
    std::fs::write(path, yaml).with_context(|| format!("Cannot write {:?}", path))?;
    log::info!("Saved config to {:?}", path);
    Ok(())
}

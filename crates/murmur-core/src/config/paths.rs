//! Path utilities for murmur configuration files

use std::path::PathBuf;

/// Get the murmur configuration directory
///
/// Returns: `<config_dir>/murmur` (e.g. `~/.config/murmur` on Linux)
pub fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("murmur")
}

/// Get the default engine config file path
///
/// Returns: `<config_dir>/murmur/config.yaml`
pub fn default_config_path() -> PathBuf {
    default_config_dir().join("config.yaml")
}

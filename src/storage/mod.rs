pub mod config;
pub mod persist;
pub mod record;

use anyhow::{Context, Result};
use std::env;
use std::fs;
use std::path::PathBuf;

pub use config::{human_bool, ConfigError, ConfigSource, PluginOptions, TomlConfig};
pub use persist::PersistentHistory;
pub use record::{FileRecordStore, RecordStore};

/// Ensure the XDG config directory exists and return it.
///
/// $XDG_CONFIG_HOME/klemmbrett (default: ~/.config/klemmbrett). The
/// histfile default lives in the home directory, so no data directory is
/// needed.
pub fn ensure_config_directory() -> Result<PathBuf> {
    let config_dir = if let Ok(xdg_config) = env::var("XDG_CONFIG_HOME") {
        PathBuf::from(xdg_config).join("klemmbrett")
    } else {
        let home = env::var("HOME").context("HOME environment variable not set")?;
        PathBuf::from(home).join(".config/klemmbrett")
    };

    fs::create_dir_all(&config_dir)
        .with_context(|| format!("Failed to create config directory {:?}", config_dir))?;

    log::debug!("Config directory: {:?}", config_dir);
    Ok(config_dir)
}

/// Expand a leading `~` to $HOME, for options like `histfile`.
pub fn expand_user(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Ok(home) = env::var("HOME") {
            return PathBuf::from(home).join(rest);
        }
    }
    PathBuf::from(path)
}

use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

use crate::models::item::{OmitMode, Truncation};

/// Required configuration is absent or malformed. Fatal to the owning
/// plugin's bootstrap; other plugins continue.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("no config section {0:?} defined")]
    MissingSection(String),
    #[error("missing key {key:?} in section {section:?}")]
    MissingKey { section: String, key: String },
    #[error("unknown plugin kind {0:?}")]
    UnknownPlugin(String),
    #[error("unknown callable {0:?}")]
    UnknownCallable(String),
    #[error("plugin {plugin:?} ties to unknown history {tie:?}")]
    UnknownTie { plugin: String, tie: String },
}

/// Configuration lookup capability consumed by the core.
///
/// Section and key order is declaration order; providers and the plugin
/// loader depend on it.
pub trait ConfigSource {
    fn has_section(&self, name: &str) -> bool;

    /// All `(key, value)` pairs of a section, in declaration order.
    fn items(&self, name: &str) -> Result<Vec<(String, String)>, ConfigError>;

    /// All section names, in declaration order.
    fn sections(&self) -> Vec<String>;

    /// Single key lookup; `None` when section or key is absent.
    fn get(&self, section: &str, key: &str) -> Option<String>;
}

/// TOML-backed configuration. Top-level tables are sections; scalar values
/// are rendered as strings, everything else is ignored.
pub struct TomlConfig {
    table: toml::Table,
}

impl TomlConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {:?}", path))?;

        let config = Self::parse(&contents)
            .with_context(|| format!("Failed to parse config file {:?}", path))?;

        log::info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    pub fn parse(contents: &str) -> Result<Self> {
        let table: toml::Table = contents.parse().context("Invalid TOML")?;
        Ok(TomlConfig { table })
    }

    fn section(&self, name: &str) -> Option<&toml::Table> {
        self.table.get(name).and_then(|v| v.as_table())
    }
}

fn render_scalar(value: &toml::Value) -> Option<String> {
    match value {
        toml::Value::String(s) => Some(s.clone()),
        toml::Value::Integer(i) => Some(i.to_string()),
        toml::Value::Float(f) => Some(f.to_string()),
        toml::Value::Boolean(b) => Some(b.to_string()),
        _ => None,
    }
}

impl ConfigSource for TomlConfig {
    fn has_section(&self, name: &str) -> bool {
        self.section(name).is_some()
    }

    fn items(&self, name: &str) -> Result<Vec<(String, String)>, ConfigError> {
        let section = self
            .section(name)
            .ok_or_else(|| ConfigError::MissingSection(name.to_string()))?;

        Ok(section
            .iter()
            .filter_map(|(key, value)| render_scalar(value).map(|v| (key.clone(), v)))
            .collect())
    }

    fn sections(&self) -> Vec<String> {
        self.table
            .iter()
            .filter(|(_, v)| v.is_table())
            .map(|(k, _)| k.clone())
            .collect()
    }

    fn get(&self, section: &str, key: &str) -> Option<String> {
        self.section(section)
            .and_then(|s| s.get(key))
            .and_then(render_scalar)
    }
}

/// Parse the human-readable booleans the config format allows.
pub fn human_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "yes" | "true" | "on" | "1" => Some(true),
        "no" | "false" | "off" | "0" | "" => Some(false),
        _ => None,
    }
}

/// One plugin section's key/value pairs, in declaration order, with typed
/// accessors falling back to per-plugin defaults.
#[derive(Debug, Clone, Default)]
pub struct PluginOptions {
    pairs: Vec<(String, String)>,
}

impl PluginOptions {
    pub fn from_pairs(pairs: Vec<(String, String)>) -> Self {
        PluginOptions { pairs }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn get_or(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or(default).to_string()
    }

    pub fn get_bool(&self, key: &str, default: bool) -> bool {
        self.get(key)
            .and_then(human_bool)
            .unwrap_or(default)
    }

    pub fn get_usize(&self, key: &str, default: usize) -> usize {
        self.get(key)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(default)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Label rendering policy shared by every picker: `line-length`
    /// (default 30) and `omit-mode` (default middle).
    pub fn truncation(&self) -> Truncation {
        Truncation::new(
            self.get_usize("line-length", 30),
            self.get("omit-mode")
                .map(OmitMode::parse)
                .unwrap_or_default(),
        )
    }
}

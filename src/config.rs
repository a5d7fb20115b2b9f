//! Configuration management for mcflow
//!
//! Settings are layered from three TOML files, later files overriding
//! earlier ones: the system file, the per-user file, and a file in the
//! current directory. Every field has a default, so all files are optional
//! and may be partial.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Grid environment bootstrap sourced before each justin call when
/// `with_env_setup` is enabled.
pub const DEFAULT_ENV_SETUP_SCRIPT: &str =
    "/cvmfs/dune.opensciencegrid.org/products/dune/setup_dune.sh";

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct McflowConfig {
    pub client: ClientConfig,
}

/// Client-side settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Executable name or path of the justin CLI
    pub justin_bin: String,

    /// justIN instance to talk to (justin --instance)
    pub instance: Option<String>,

    /// justIN service URL override (justin --url)
    pub url: Option<String>,

    /// Wrap every justin call in a login shell that sources the grid
    /// environment bootstrap first
    pub with_env_setup: bool,

    /// Bootstrap script sourced when with_env_setup is enabled
    pub env_setup_script: String,

    /// Output format (table, json)
    pub format: String,

    /// Log level (error, warn, info, debug, trace)
    pub log_level: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            justin_bin: "justin".to_string(),
            instance: None,
            url: None,
            with_env_setup: false,
            env_setup_script: DEFAULT_ENV_SETUP_SCRIPT.to_string(),
            format: "table".to_string(),
            log_level: "info".to_string(),
        }
    }
}

/// Locations checked for configuration files, lowest priority first.
pub struct ConfigPaths {
    pub system: PathBuf,
    pub user: Option<PathBuf>,
    pub local: PathBuf,
}

impl ConfigPaths {
    pub fn new() -> Self {
        Self {
            system: PathBuf::from("/etc/mcflow/config.toml"),
            user: dirs::config_dir().map(|dir| dir.join("mcflow").join("config.toml")),
            local: PathBuf::from("mcflow.toml"),
        }
    }

    /// The paths that exist on disk, lowest priority first.
    pub fn existing_paths(&self) -> Vec<PathBuf> {
        let mut paths = Vec::new();
        if self.system.exists() {
            paths.push(self.system.clone());
        }
        if let Some(user) = &self.user {
            if user.exists() {
                paths.push(user.clone());
            }
        }
        if self.local.exists() {
            paths.push(self.local.clone());
        }
        paths
    }

    /// Directory holding the per-user config file, if one is defined.
    pub fn user_config_dir(&self) -> Option<&Path> {
        self.user.as_ref().and_then(|p| p.parent())
    }
}

impl Default for ConfigPaths {
    fn default() -> Self {
        Self::new()
    }
}

impl McflowConfig {
    /// Load configuration from the standard locations.
    pub fn load() -> Result<Self> {
        Self::load_with_paths(&ConfigPaths::new())
    }

    pub fn load_with_paths(paths: &ConfigPaths) -> Result<Self> {
        Self::load_from_files(&paths.existing_paths())
    }

    /// Load and merge the given files, later files overriding earlier ones.
    /// With no files, the defaults are returned.
    pub fn load_from_files(paths: &[PathBuf]) -> Result<Self> {
        let mut merged = toml::Value::Table(toml::map::Map::new());

        for path in paths {
            let content = fs::read_to_string(path)
                .with_context(|| format!("failed to read config file {}", path.display()))?;
            let value: toml::Value = content
                .parse()
                .with_context(|| format!("failed to parse config file {}", path.display()))?;
            merge_values(&mut merged, value);
        }

        merged
            .try_into()
            .context("invalid configuration after merging config files")
    }
}

/// Recursively merge `overlay` into `base`; overlay wins for scalar values.
fn merge_values(base: &mut toml::Value, overlay: toml::Value) {
    match (base, overlay) {
        (toml::Value::Table(base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_value) in overlay_table {
                match base_table.get_mut(&key) {
                    Some(base_value) => merge_values(base_value, overlay_value),
                    None => {
                        base_table.insert(key, overlay_value);
                    }
                }
            }
        }
        (base_slot, overlay_value) => *base_slot = overlay_value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_config_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.justin_bin, "justin");
        assert!(config.instance.is_none());
        assert!(config.url.is_none());
        assert!(!config.with_env_setup);
        assert_eq!(config.env_setup_script, DEFAULT_ENV_SETUP_SCRIPT);
        assert_eq!(config.format, "table");
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn test_config_paths_new() {
        let paths = ConfigPaths::new();
        assert_eq!(paths.system, PathBuf::from("/etc/mcflow/config.toml"));
        assert_eq!(paths.local, PathBuf::from("mcflow.toml"));
    }

    #[test]
    fn test_load_returns_defaults_when_no_files() {
        let config = McflowConfig::load_from_files(&[]).unwrap();
        assert_eq!(config.client.justin_bin, "justin");
        assert_eq!(config.client.format, "table");
    }
}

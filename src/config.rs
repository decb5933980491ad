//! User-overridable aliases and device shortcuts loaded from
//! `.mprrc`/`.mprconfig` TOML files (SPEC_FULL §4, "Config"). Implements
//! the literal `# TODO load aliases and device-shorcuts from
//! .mprrc/.mprconfig` left in `mpr.py`'s `command_aliases` section.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::MprError;

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub aliases: HashMap<String, Vec<String>>,
    #[serde(default)]
    pub device_shortcuts: HashMap<String, String>,
}

impl Config {
    /// Merges `.mprconfig` in the current directory (project-local) over
    /// `.mprrc` in the home directory (user-global), then `$MPR_CONFIG` (if
    /// set) over both; entries in a later file win on conflicting keys.
    /// None of the three is required to exist.
    pub fn load() -> Result<Self, MprError> {
        let mut merged = Config::default();
        if let Some(home) = dirs_home() {
            merge_from(&mut merged, &home.join(".mprrc"))?;
        }
        merge_from(&mut merged, Path::new(".mprconfig"))?;
        if let Some(path) = std::env::var_os("MPR_CONFIG") {
            merge_from(&mut merged, Path::new(&path))?;
        }
        Ok(merged)
    }

    fn merge(&mut self, other: Config) {
        self.aliases.extend(other.aliases);
        self.device_shortcuts.extend(other.device_shortcuts);
    }
}

fn merge_from(config: &mut Config, path: &Path) -> Result<(), MprError> {
    if !path.exists() {
        return Ok(());
    }
    let text = std::fs::read_to_string(path)?;
    let parsed: Config = toml::from_str(&text)
        .map_err(|e| MprError::usage(format!("invalid config {}: {e}", path.display())))?;
    config.merge(parsed);
    Ok(())
}

fn dirs_home() -> Option<PathBuf> {
    std::env::var_os("HOME").map(PathBuf::from)
}

//! Mapper configuration.
//!
//! Settings come from a TOML file or string; every key is optional.
//!
//! ```toml
//! # Reading an absent UUID fails instead of yielding the nil UUID.
//! strict_uuid = false
//! # Pull missing keys from the backup before reading or mutating them.
//! restore_from_backup = true
//! # Drop container entries that point at deleted entities while reading.
//! heal_stale_references = true
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{MapperError, MapperResult};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MapperConfig {
    pub strict_uuid: bool,
    pub restore_from_backup: bool,
    pub heal_stale_references: bool,
}

impl Default for MapperConfig {
    fn default() -> Self {
        Self {
            strict_uuid: false,
            restore_from_backup: true,
            heal_stale_references: true,
        }
    }
}

impl MapperConfig {
    pub fn from_toml_str(raw: &str) -> MapperResult<Self> {
        toml::from_str(raw).map_err(|e| MapperError::Config(e.to_string()))
    }

    /// Read and parse a TOML config file.
    pub fn load(path: impl AsRef<Path>) -> MapperResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| MapperError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&raw)
    }

    pub fn to_toml_string(&self) -> MapperResult<String> {
        toml::to_string_pretty(self).map_err(|e| MapperError::Config(e.to_string()))
    }
}

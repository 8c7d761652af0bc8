// Peek - Live-state Snapshot Debugger
// Copyright (C) 2024 Zhuo Zhang and Wuqi Zhang
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Engine configuration.
//!
//! Supplied once at agent startup and read-only afterwards. Every field has a
//! default, so a configuration file only needs to list what it overrides:
//!
//! ```toml
//! max_depth = 3
//! max_variables = 500
//! no_expand_types = ["socket", "module"]
//! ```

use std::{collections::BTreeSet, env, fs, path::Path, time::Duration};

use eyre::{bail, eyre, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::env::PEEK_CONFIG;

/// Default maximum nesting depth
pub const DEFAULT_MAX_DEPTH: usize = 5;
/// Default maximum number of elements captured per collection
pub const DEFAULT_MAX_COLLECTION_SIZE: usize = 10;
/// Default maximum length of a string representation
pub const DEFAULT_MAX_STRING_LENGTH: usize = 1024;
/// Default ceiling on variables per snapshot
pub const DEFAULT_MAX_VARIABLES: usize = 1000;
/// Default processing time budget in milliseconds
pub const DEFAULT_MAX_PROCESSING_TIME_MS: u64 = 100;
/// Default maximum number of breakpoints processed on one line
pub const DEFAULT_MAX_BREAKPOINTS_PER_LINE: usize = 10;

/// Budgets and expansion rules of the snapshot engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Maximum nesting depth below a root binding
    pub max_depth: usize,
    /// Maximum number of elements captured per collection or iterator
    pub max_collection_size: usize,
    /// Maximum length of a string representation
    pub max_string_length: usize,
    /// Ceiling on variables per snapshot
    pub max_variables: usize,
    /// Processing time budget, checked once per frame
    pub max_processing_time_ms: u64,
    /// Maximum number of breakpoints processed when several fire on one line
    pub max_breakpoints_per_line: usize,
    /// Runtime type names that are rendered but never expanded
    pub no_expand_types: BTreeSet<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            max_collection_size: DEFAULT_MAX_COLLECTION_SIZE,
            max_string_length: DEFAULT_MAX_STRING_LENGTH,
            max_variables: DEFAULT_MAX_VARIABLES,
            max_processing_time_ms: DEFAULT_MAX_PROCESSING_TIME_MS,
            max_breakpoints_per_line: DEFAULT_MAX_BREAKPOINTS_PER_LINE,
            no_expand_types: BTreeSet::new(),
        }
    }
}

impl EngineConfig {
    /// Parse a configuration from TOML text
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(text).map_err(|e| eyre!("Invalid engine configuration: {e}"))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .map_err(|e| eyre!("Failed to read config {}: {e}", path.display()))?;
        let config = Self::from_toml_str(&text)?;
        info!(path = %path.display(), "Loaded engine configuration");
        Ok(config)
    }

    /// Load the file named by `PEEK_CONFIG`, or fall back to the defaults
    pub fn from_env() -> Result<Self> {
        match env::var(PEEK_CONFIG) {
            Ok(path) if !path.trim().is_empty() => Self::load(path.trim()),
            _ => {
                debug!("{PEEK_CONFIG} not set, using default engine configuration");
                Ok(Self::default())
            }
        }
    }

    /// Reject budgets that would make every capture empty
    pub fn validate(&self) -> Result<()> {
        if self.max_variables == 0 {
            bail!("max_variables must be greater than zero");
        }
        if self.max_collection_size == 0 {
            bail!("max_collection_size must be greater than zero");
        }
        if self.max_breakpoints_per_line == 0 {
            bail!("max_breakpoints_per_line must be greater than zero");
        }
        Ok(())
    }

    /// Processing time budget
    pub fn max_processing_time(&self) -> Duration {
        Duration::from_millis(self.max_processing_time_ms)
    }

    /// Whether values of the given runtime type must never be expanded
    pub fn is_no_expand(&self, type_name: &str) -> bool {
        self.no_expand_types.contains(type_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.max_depth, DEFAULT_MAX_DEPTH);
        assert_eq!(config.max_processing_time(), Duration::from_millis(100));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = EngineConfig::from_toml_str(
            "max_depth = 2\nno_expand_types = [\"socket\"]\n",
        )
        .unwrap();
        assert_eq!(config.max_depth, 2);
        assert_eq!(config.max_variables, DEFAULT_MAX_VARIABLES);
        assert!(config.is_no_expand("socket"));
        assert!(!config.is_no_expand("list"));
    }

    #[test]
    fn test_invalid_toml() {
        assert!(EngineConfig::from_toml_str("max_depth = \"deep\"").is_err());
        assert!(EngineConfig::from_toml_str("max_variables = 0").is_err());
        assert!(EngineConfig::from_toml_str("max_collection_size = 0").is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "max_string_length = 16").unwrap();

        let config = EngineConfig::load(file.path()).unwrap();
        assert_eq!(config.max_string_length, 16);
    }

    #[test]
    fn test_load_missing_file() {
        assert!(EngineConfig::load("/definitely/not/here.toml").is_err());
    }

    #[test]
    #[serial]
    fn test_from_env() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "max_variables = 7").unwrap();

        env::set_var(PEEK_CONFIG, file.path());
        let config = EngineConfig::from_env().unwrap();
        env::remove_var(PEEK_CONFIG);
        assert_eq!(config.max_variables, 7);

        let config = EngineConfig::from_env().unwrap();
        assert_eq!(config, EngineConfig::default());
    }
}

// Emulator settings
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use gcemu_core::runtime::{MAIN_RAM_BASE, MAIN_RAM_SIZE};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmulatorConfig {
    /// Guest address of the first RAM byte
    pub ram_base: u32,
    /// RAM size in bytes
    pub ram_size: usize,
    /// Also map RAM at `ram_base + 0x4000_0000`
    pub mirror_uncached: bool,
    /// Initial r1; defaults to 16 bytes below the top of RAM
    pub stack_pointer: Option<u32>,
    /// Step budget for `run`; `None` runs until halted
    pub max_steps: Option<u64>,
    /// Instructions kept by the trace recorder; 0 disables recording
    pub trace_limit: usize,
}

impl Default for EmulatorConfig {
    fn default() -> Self {
        Self {
            ram_base: MAIN_RAM_BASE,
            ram_size: MAIN_RAM_SIZE,
            mirror_uncached: true,
            stack_pointer: None,
            max_steps: None,
            trace_limit: 0,
        }
    }
}

impl EmulatorConfig {
    /// Load from `path`, or defaults when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match path {
            Some(path) => {
                let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })?;
                Self::from_json(&content).map_err(|source| ConfigError::Parse {
                    path: path.to_path_buf(),
                    source,
                })?
            }
            None => Self::default(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn from_json(content: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(content)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ram_size == 0 || self.ram_size % 4 != 0 {
            return Err(ConfigError::Invalid(format!(
                "ram_size must be a non-zero multiple of 4, got {}",
                self.ram_size
            )));
        }
        if u64::from(self.ram_base) + self.ram_size as u64 > 1u64 << 32 {
            return Err(ConfigError::Invalid(format!(
                "RAM 0x{:08X}+0x{:X} does not fit the 32-bit address space",
                self.ram_base, self.ram_size
            )));
        }
        Ok(())
    }

    pub fn initial_stack_pointer(&self) -> u32 {
        self.stack_pointer
            .unwrap_or_else(|| self.ram_base.wrapping_add(self.ram_size as u32).wrapping_sub(0x10))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config = EmulatorConfig::from_json(r#"{ "max_steps": 1000, "trace_limit": 64 }"#).unwrap();
        assert_eq!(config.max_steps, Some(1000));
        assert_eq!(config.trace_limit, 64);
        assert_eq!(config.ram_base, MAIN_RAM_BASE);
        assert_eq!(config.ram_size, MAIN_RAM_SIZE);
        assert!(config.mirror_uncached);
    }

    #[test]
    fn test_default_stack_pointer() {
        let config = EmulatorConfig::default();
        assert_eq!(config.initial_stack_pointer(), 0x817F_FFF0);
        let seeded = EmulatorConfig {
            stack_pointer: Some(0x8040_0000),
            ..EmulatorConfig::default()
        };
        assert_eq!(seeded.initial_stack_pointer(), 0x8040_0000);
    }

    #[test]
    fn test_validation() {
        let config = EmulatorConfig {
            ram_size: 0,
            ..EmulatorConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
        let config = EmulatorConfig {
            ram_base: 0xFF00_0000,
            ram_size: 0x0200_0000,
            ..EmulatorConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_wrong_field_type_is_rejected() {
        assert!(EmulatorConfig::from_json("{ \"ram_size\": \"big\" }").is_err());
    }
}

//! Machine configuration for the stored-program computer.

use crate::hardware::CircuitError;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Widest memory row the computer supports.
pub const MAX_BIT_WIDTH: usize = 16;

/// Shape of the compiled computer.
///
/// Every field has a default, so a config file only needs the fields it
/// overrides.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CpuConfig {
    /// Number of memory rows, including the accumulator at row 0
    pub memory_size: usize,
    /// Width of a memory row, an address and the instruction pointer
    pub bit_width: usize,
    /// Cells in the phase ring; execution uses phases 0 through 5
    pub phase_len: usize,
}

impl Default for CpuConfig {
    fn default() -> Self {
        CpuConfig {
            memory_size: 64,
            bit_width: 8,
            phase_len: 6,
        }
    }
}

impl CpuConfig {
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        let config: CpuConfig =
            serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), CircuitError> {
        if !(2..=MAX_BIT_WIDTH).contains(&self.bit_width) {
            return Err(CircuitError::InvalidConfig(format!(
                "bit_width {} outside 2..={}",
                self.bit_width, MAX_BIT_WIDTH
            )));
        }
        if self.memory_size < 2 || self.memory_size > 1 << self.bit_width {
            return Err(CircuitError::InvalidConfig(format!(
                "memory_size {} must be within 2..={}",
                self.memory_size,
                1usize << self.bit_width
            )));
        }
        if self.phase_len < 6 {
            return Err(CircuitError::InvalidConfig(format!(
                "phase_len {} is shorter than the 6 execution phases",
                self.phase_len
            )));
        }
        Ok(())
    }

    /// Carry cells shared by the add, multiply and compare sites.
    pub fn carry_pool_size(&self) -> usize {
        let w = self.bit_width;
        2 * w * w - 3 * w + 2
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn defaults_match_reference_machine() {
        let config = CpuConfig::default();
        assert_eq!((config.memory_size, config.bit_width, config.phase_len), (64, 8, 6));
        assert!(config.validate().is_ok());
        assert_eq!(config.carry_pool_size(), 106);
    }

    #[test]
    fn file_overrides_only_named_fields() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cpu.json");
        fs::write(&path, r#"{ "memory_size": 32 }"#).unwrap();
        let config = CpuConfig::from_json_file(&path).unwrap();
        assert_eq!(config.memory_size, 32);
        assert_eq!(config.bit_width, 8);
    }

    #[test]
    fn invalid_shapes_are_rejected() {
        let bad = [
            CpuConfig { bit_width: 1, ..CpuConfig::default() },
            CpuConfig { bit_width: 17, ..CpuConfig::default() },
            CpuConfig { memory_size: 1, ..CpuConfig::default() },
            CpuConfig { memory_size: 300, ..CpuConfig::default() },
            CpuConfig { phase_len: 5, ..CpuConfig::default() },
        ];
        for config in bad {
            assert!(matches!(config.validate(), Err(CircuitError::InvalidConfig(_))), "{:?}", config);
        }
    }

    #[test]
    fn invalid_file_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cpu.json");
        fs::write(&path, r#"{ "bit_width": 40 }"#).unwrap();
        assert!(CpuConfig::from_json_file(&path).is_err());
        assert!(CpuConfig::from_json_file(&dir.path().join("missing.json")).is_err());
    }
}

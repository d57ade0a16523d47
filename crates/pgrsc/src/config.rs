//! Heap layout configuration.
//!
//! The chunk heap is made of two address ranges, one per pool. The ranges
//! are configured here and can be saved to or loaded from a JSON file.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::paging::BASE_CHUNK_SIZE;

/// Default start of the virtual pool
pub const DEFAULT_VIRTUAL_BASE: u64 = 0x10_0000_0000;
/// Default start of the physical pool
pub const DEFAULT_PHYSICAL_BASE: u64 = 0x20_0000_0000;
/// Default virtual pool capacity (256 MiB)
pub const DEFAULT_VIRTUAL_CAPACITY: u64 = 256 * 1024 * 1024;
/// Default physical pool capacity (512 MiB)
pub const DEFAULT_PHYSICAL_CAPACITY: u64 = 512 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeapConfig {
    pub virtual_base: u64,
    pub virtual_capacity: u64,
    pub physical_base: u64,
    pub physical_capacity: u64,
}

impl Default for HeapConfig {
    fn default() -> Self {
        Self {
            virtual_base: DEFAULT_VIRTUAL_BASE,
            virtual_capacity: DEFAULT_VIRTUAL_CAPACITY,
            physical_base: DEFAULT_PHYSICAL_BASE,
            physical_capacity: DEFAULT_PHYSICAL_CAPACITY,
        }
    }
}

impl HeapConfig {
    /// Create a new configuration builder
    pub fn builder() -> HeapConfigBuilder {
        HeapConfigBuilder::default()
    }

    /// Check that both pools are well formed and do not overlap.
    pub fn validate(&self) -> Result<()> {
        let ranges = [
            ("virtual", self.virtual_base, self.virtual_capacity),
            ("physical", self.physical_base, self.physical_capacity),
        ];

        for (name, base, capacity) in ranges {
            if base == 0 {
                return Err(Error::InvalidConfig(format!(
                    "{} pool must not start at address 0",
                    name
                )));
            }
            if base % BASE_CHUNK_SIZE != 0 {
                return Err(Error::InvalidConfig(format!(
                    "{} pool base 0x{:X} is not aligned to 0x{:X}",
                    name, base, BASE_CHUNK_SIZE
                )));
            }
            if capacity == 0 || capacity % BASE_CHUNK_SIZE != 0 {
                return Err(Error::InvalidConfig(format!(
                    "{} pool capacity 0x{:X} must be a non-zero multiple of 0x{:X}",
                    name, capacity, BASE_CHUNK_SIZE
                )));
            }
            if base.checked_add(capacity).is_none() {
                return Err(Error::InvalidConfig(format!(
                    "{} pool range overflows the address space",
                    name
                )));
            }
        }

        let virtual_end = self.virtual_base + self.virtual_capacity;
        let physical_end = self.physical_base + self.physical_capacity;
        if self.virtual_base < physical_end && self.physical_base < virtual_end {
            return Err(Error::InvalidConfig(
                "virtual and physical pools overlap".to_string(),
            ));
        }

        Ok(())
    }

    /// Load configuration from a JSON file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())?;
        let config: HeapConfig = serde_json::from_str(&content)?;
        config.validate()?;
        debug!("Loaded heap config from {}", path.as_ref().display());
        Ok(config)
    }

    /// Save configuration to a JSON file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(&path, content)?;
        info!("Saved heap config to {}", path.as_ref().display());
        Ok(())
    }
}

/// Builder for HeapConfig
#[derive(Debug, Clone, Default)]
pub struct HeapConfigBuilder {
    virtual_base: Option<u64>,
    virtual_capacity: Option<u64>,
    physical_base: Option<u64>,
    physical_capacity: Option<u64>,
}

impl HeapConfigBuilder {
    pub fn virtual_pool(mut self, base: u64, capacity: u64) -> Self {
        self.virtual_base = Some(base);
        self.virtual_capacity = Some(capacity);
        self
    }

    pub fn physical_pool(mut self, base: u64, capacity: u64) -> Self {
        self.physical_base = Some(base);
        self.physical_capacity = Some(capacity);
        self
    }

    /// Set only the virtual pool capacity, keeping the default base
    pub fn virtual_capacity(mut self, capacity: u64) -> Self {
        self.virtual_capacity = Some(capacity);
        self
    }

    /// Set only the physical pool capacity, keeping the default base
    pub fn physical_capacity(mut self, capacity: u64) -> Self {
        self.physical_capacity = Some(capacity);
        self
    }

    /// Build the configuration
    pub fn build(self) -> HeapConfig {
        let default = HeapConfig::default();
        HeapConfig {
            virtual_base: self.virtual_base.unwrap_or(default.virtual_base),
            virtual_capacity: self.virtual_capacity.unwrap_or(default.virtual_capacity),
            physical_base: self.physical_base.unwrap_or(default.physical_base),
            physical_capacity: self.physical_capacity.unwrap_or(default.physical_capacity),
        }
    }
}

//! Heap layout loading.
//!
//! ```toml
//! virtual_base = 0x10_0000_0000
//! virtual_capacity = 268435456
//! physical_base = 0x20_0000_0000
//! physical_capacity = 536870912
//! ```
//!
//! Missing keys fall back to the library defaults.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use pgrsc::HeapConfig;
use tracing::info;

pub fn load_heap_config(path: Option<&Path>) -> Result<HeapConfig> {
    let Some(path) = path else {
        return Ok(HeapConfig::default());
    };

    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read heap config {}", path.display()))?;
    let config: HeapConfig = toml::from_str(&content)
        .with_context(|| format!("Failed to parse heap config {}", path.display()))?;
    config.validate()?;

    info!("Loaded heap config from {:?}", path);
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_missing_path_uses_defaults() {
        assert_eq!(load_heap_config(None).unwrap(), HeapConfig::default());
    }

    #[test]
    fn test_partial_toml() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "virtual_capacity = 0x20000").unwrap();

        let config = load_heap_config(Some(file.path())).unwrap();
        assert_eq!(config.virtual_capacity, 0x20000);
        assert_eq!(config.physical_base, HeapConfig::default().physical_base);
    }

    #[test]
    fn test_invalid_layout_is_rejected() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "virtual_base = 0x1001").unwrap();

        assert!(load_heap_config(Some(file.path())).is_err());
    }
}

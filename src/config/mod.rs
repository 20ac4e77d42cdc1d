pub mod datanode_config;
pub mod namenode_config;
pub mod rsdfs_config;

use std::path::Path;

use serde::de::DeserializeOwned;

use crate::error::{DFSError, Result};

/// Reads a config file, picking the format from its extension (`.xml` or `.toml`).
pub(crate) fn load_config<T: DeserializeOwned>(file_path: &str) -> Result<T> {
    let contents = std::fs::read_to_string(file_path)
        .map_err(|e| DFSError::ConfigError(format!("{}: {}", file_path, e)))?;
    match Path::new(file_path).extension().and_then(|ext| ext.to_str()) {
        Some("xml") => Ok(serde_xml_rs::from_str(&contents)?),
        Some("toml") => Ok(toml::from_str(&contents)?),
        _ => Err(DFSError::ConfigError(format!(
            "Unsupported config format: {}",
            file_path
        ))),
    }
}

pub(crate) fn require_positive(name: &str, value: u64) -> Result<()> {
    if value == 0 {
        return Err(DFSError::ConfigError(format!("{} must be positive", name)));
    }
    Ok(())
}

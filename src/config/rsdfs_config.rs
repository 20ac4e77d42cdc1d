use serde::Deserialize;

use crate::block::{DEFAULT_BLOCK_SIZE, MAX_BLOCK_SIZE};
use crate::config::load_config;
use crate::error::{DFSError, Result};

fn default_block_size() -> usize {
    DEFAULT_BLOCK_SIZE
}

#[derive(Debug, Clone, Deserialize)]
pub struct RSDFSConfig {
    #[serde(rename = "namenode.address")]
    pub namenode_address: String,

    #[serde(rename = "block.size", default = "default_block_size")]
    pub block_size: usize,

    /// Try the remaining replicas of a block when the chosen one fails.
    #[serde(rename = "read.replica.fallback", default)]
    pub read_replica_fallback: bool,
}

impl RSDFSConfig {
    pub fn new(namenode_address: impl Into<String>) -> Self {
        RSDFSConfig {
            namenode_address: namenode_address.into(),
            block_size: DEFAULT_BLOCK_SIZE,
            read_replica_fallback: false,
        }
    }

    pub fn from_file(file_path: &str) -> Result<Self> {
        let config: RSDFSConfig = load_config(file_path)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.block_size == 0 || self.block_size > MAX_BLOCK_SIZE {
            return Err(DFSError::ConfigError(format!(
                "block.size must be within 1..={}",
                MAX_BLOCK_SIZE
            )));
        }
        Ok(())
    }
}

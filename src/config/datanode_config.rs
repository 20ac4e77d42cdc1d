use crate::config::{load_config, require_positive};
use crate::error::Result;
use serde::Deserialize;

fn default_block_report_interval() -> u64 {
    10_000
}

#[derive(Debug, Clone, Deserialize)]
pub struct DataNodeConfig {
    #[serde(rename = "data.dir")]
    pub data_dir: String,

    #[serde(rename = "ipc.address")]
    pub ipc_address: String,

    #[serde(rename = "namenode.address")]
    pub namenode_address: String,

    #[serde(
        rename = "block.report.interval",
        default = "default_block_report_interval"
    )]
    pub block_report_interval: u64,

    /// Fixed identity; a fresh UUID is generated on every start when absent.
    #[serde(rename = "datanode.id", default)]
    pub datanode_id: Option<String>,
}

impl DataNodeConfig {
    pub fn from_file(file_path: &str) -> Result<Self> {
        let config: DataNodeConfig = load_config(file_path)?;
        require_positive("block.report.interval", config.block_report_interval)?;
        Ok(config)
    }
}

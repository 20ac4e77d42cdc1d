use std::time::Duration;

use crate::config::{load_config, require_positive};
use crate::error::{DFSError, Result};
use serde::Deserialize;

fn default_replication_factor() -> usize {
    3
}

fn default_liveness_check_interval() -> u64 {
    5_000
}

fn default_dead_timeout() -> u64 {
    30_000
}

fn default_decommission_timeout() -> u64 {
    600_000
}

#[derive(Debug, Clone, Deserialize)]
pub struct NameNodeConfig {
    #[serde(rename = "ipc.address")]
    pub ipc_address: String,

    #[serde(rename = "replication.factor", default = "default_replication_factor")]
    pub replication_factor: usize,

    /// Milliseconds between liveness sweeps.
    #[serde(
        rename = "liveness.check.interval",
        default = "default_liveness_check_interval"
    )]
    pub liveness_check_interval: u64,

    /// Milliseconds without a block report before a datanode is unreachable.
    #[serde(rename = "datanode.dead.timeout", default = "default_dead_timeout")]
    pub dead_timeout: u64,

    /// Milliseconds without a block report before a datanode is decommissioned.
    #[serde(
        rename = "datanode.decommission.timeout",
        default = "default_decommission_timeout"
    )]
    pub decommission_timeout: u64,
}

impl NameNodeConfig {
    pub fn new(ipc_address: impl Into<String>, replication_factor: usize) -> Self {
        NameNodeConfig {
            ipc_address: ipc_address.into(),
            replication_factor,
            liveness_check_interval: default_liveness_check_interval(),
            dead_timeout: default_dead_timeout(),
            decommission_timeout: default_decommission_timeout(),
        }
    }

    pub fn from_file(file_path: &str) -> Result<Self> {
        let config: NameNodeConfig = load_config(file_path)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        require_positive("replication.factor", self.replication_factor as u64)?;
        require_positive("liveness.check.interval", self.liveness_check_interval)?;
        require_positive("datanode.dead.timeout", self.dead_timeout)?;
        if self.decommission_timeout <= self.dead_timeout {
            return Err(DFSError::ConfigError(String::from(
                "datanode.decommission.timeout must exceed datanode.dead.timeout",
            )));
        }
        Ok(())
    }

    pub fn liveness_timeouts(&self) -> LivenessTimeouts {
        LivenessTimeouts {
            dead: Duration::from_millis(self.dead_timeout),
            decommission: Duration::from_millis(self.decommission_timeout),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LivenessTimeouts {
    pub dead: Duration,
    pub decommission: Duration,
}

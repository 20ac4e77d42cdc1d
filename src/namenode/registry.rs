use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::RwLock;

use tokio::time::Instant;
use tracing::{info, warn};

use crate::block::{BlockId, DataNodeInfo};
use crate::config::namenode_config::LivenessTimeouts;
use crate::error::{DFSError, Result};

/// Lifecycle of a datanode as seen by the namenode.
///
/// `Registering` records come from a block report that arrived before the
/// node registered its address. Missed reports drive `Available` to
/// `Unreachable` and eventually to the terminal `Decommissioned`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeStatus {
    Registering,
    Available,
    Unreachable,
    Decommissioned,
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NodeStatus::Registering => "REGISTERING",
            NodeStatus::Available => "AVAILABLE",
            NodeStatus::Unreachable => "UNREACHABLE",
            NodeStatus::Decommissioned => "DECOMMISSIONED",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationOutcome {
    Registered,
    Exists,
}

/// Represents a DataNode in the distributed file system.
#[derive(Debug, Clone)]
pub struct DataNodeRecord {
    pub id: String,
    pub addr: String,
    pub status: NodeStatus,
    pub blocks: HashSet<BlockId>,
    pub last_seen: Instant,
}

impl DataNodeRecord {
    fn new(id: String, addr: String, status: NodeStatus, now: Instant) -> Self {
        DataNodeRecord {
            id,
            addr,
            status,
            blocks: HashSet::new(),
            last_seen: now,
        }
    }

    fn info(&self) -> DataNodeInfo {
        DataNodeInfo {
            id: self.id.clone(),
            addr: self.addr.clone(),
        }
    }
}

/// Point-in-time view of one datanode, for listings.
#[derive(Debug, Clone, PartialEq)]
pub struct DataNodeSummary {
    pub id: String,
    pub addr: String,
    pub status: NodeStatus,
    pub block_count: usize,
}

/// Registry of every datanode the namenode has heard from, with the block
/// inventory each one last reported. Block locations are never stored
/// separately; they are recomputed from these inventories on lookup.
pub struct DatanodeRegistry {
    nodes: RwLock<HashMap<String, DataNodeRecord>>,
}

impl Default for DatanodeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl DatanodeRegistry {
    pub fn new() -> Self {
        DatanodeRegistry {
            nodes: RwLock::new(HashMap::new()),
        }
    }

    /// Registering a known id returns `Exists` and leaves the record alone,
    /// address included. A node restarted on a new address under the same id
    /// keeps being advertised at its old one.
    pub fn register(&self, id: &str, addr: &str, now: Instant) -> Result<RegistrationOutcome> {
        let mut nodes = self.nodes.write()?;
        match nodes.get_mut(id) {
            Some(record) if record.status == NodeStatus::Registering => {
                record.addr = addr.to_string();
                record.status = NodeStatus::Available;
                record.last_seen = now;
                info!(datanode_id = id, addr, "datanode registered after early report");
                Ok(RegistrationOutcome::Registered)
            }
            Some(record) => {
                if record.addr != addr {
                    warn!(
                        datanode_id = id,
                        registered_addr = record.addr.as_str(),
                        requested_addr = addr,
                        "datanode re-registered from a different address; keeping the registered one"
                    );
                }
                Ok(RegistrationOutcome::Exists)
            }
            None => {
                nodes.insert(
                    id.to_string(),
                    DataNodeRecord::new(
                        id.to_string(),
                        addr.to_string(),
                        NodeStatus::Available,
                        now,
                    ),
                );
                info!(datanode_id = id, addr, "datanode registered");
                Ok(RegistrationOutcome::Registered)
            }
        }
    }

    /// Replaces the node's inventory with `block_ids` wholesale.
    pub fn block_report(&self, id: &str, block_ids: Vec<BlockId>, now: Instant) -> Result<()> {
        let mut nodes = self.nodes.write()?;
        let record = nodes.entry(id.to_string()).or_insert_with(|| {
            warn!(datanode_id = id, "block report from unregistered datanode");
            DataNodeRecord::new(id.to_string(), String::new(), NodeStatus::Registering, now)
        });

        if record.status == NodeStatus::Decommissioned {
            warn!(datanode_id = id, "ignoring block report from decommissioned datanode");
            return Ok(());
        }
        if record.status == NodeStatus::Unreachable {
            info!(datanode_id = id, "datanode reachable again");
            record.status = NodeStatus::Available;
        }
        record.blocks = block_ids.into_iter().collect();
        record.last_seen = now;
        Ok(())
    }

    /// Least-loaded placement: available nodes ordered by held block count,
    /// ties broken by node id, first `replication_factor` returned.
    pub fn select_datanodes(&self, replication_factor: usize) -> Result<Vec<DataNodeInfo>> {
        let nodes = self.nodes.read()?;
        let mut candidates: Vec<&DataNodeRecord> = nodes
            .values()
            .filter(|record| record.status == NodeStatus::Available)
            .collect();

        if candidates.len() < replication_factor {
            return Err(DFSError::InsufficientReplicas(format!(
                "Need {} available datanodes, have {}",
                replication_factor,
                candidates.len()
            )));
        }

        candidates.sort_by(|a, b| {
            a.blocks
                .len()
                .cmp(&b.blocks.len())
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(candidates
            .into_iter()
            .take(replication_factor)
            .map(DataNodeRecord::info)
            .collect())
    }

    /// For each block, the available datanodes whose last report contains it.
    pub fn holders_of(&self, block_ids: &[BlockId]) -> Result<Vec<Vec<DataNodeInfo>>> {
        let nodes = self.nodes.read()?;
        let mut available: Vec<&DataNodeRecord> = nodes
            .values()
            .filter(|record| record.status == NodeStatus::Available)
            .collect();
        available.sort_by(|a, b| a.id.cmp(&b.id));

        Ok(block_ids
            .iter()
            .map(|block_id| {
                available
                    .iter()
                    .filter(|record| record.blocks.contains(block_id))
                    .map(|record| record.info())
                    .collect()
            })
            .collect())
    }

    /// Applies report timeouts and returns the nodes whose status changed.
    pub fn check_liveness(
        &self,
        now: Instant,
        timeouts: LivenessTimeouts,
    ) -> Result<Vec<(String, NodeStatus)>> {
        let mut nodes = self.nodes.write()?;
        let mut transitions = vec![];
        for record in nodes.values_mut() {
            let silent_for = now.saturating_duration_since(record.last_seen);
            let next = match record.status {
                NodeStatus::Available | NodeStatus::Registering
                    if silent_for > timeouts.decommission =>
                {
                    NodeStatus::Decommissioned
                }
                NodeStatus::Available if silent_for > timeouts.dead => NodeStatus::Unreachable,
                NodeStatus::Unreachable if silent_for > timeouts.decommission => {
                    NodeStatus::Decommissioned
                }
                status => status,
            };
            if next != record.status {
                warn!(
                    datanode_id = record.id.as_str(),
                    from = %record.status,
                    to = %next,
                    "datanode status changed"
                );
                if next == NodeStatus::Decommissioned {
                    record.blocks.clear();
                }
                record.status = next;
                transitions.push((record.id.clone(), next));
            }
        }
        transitions.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(transitions)
    }

    pub fn get(&self, id: &str) -> Result<Option<DataNodeRecord>> {
        Ok(self.nodes.read()?.get(id).cloned())
    }

    pub fn summaries(&self) -> Result<Vec<DataNodeSummary>> {
        let nodes = self.nodes.read()?;
        let mut summaries: Vec<DataNodeSummary> = nodes
            .values()
            .map(|record| DataNodeSummary {
                id: record.id.clone(),
                addr: record.addr.clone(),
                status: record.status,
                block_count: record.blocks.len(),
            })
            .collect();
        summaries.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(summaries)
    }
}

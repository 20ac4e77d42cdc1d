use std::sync::Arc;

use rand::seq::SliceRandom;
use tracing::{debug, warn};

use crate::block::LocatedBlock;
use crate::error::{DFSError, Result};
use crate::rsdfs::transport::{BlockTransport, MetadataService};

/// Client read path. Blocks are fetched one at a time in stored order from
/// a uniformly random replica. Any failure fails the whole read, so callers
/// either get the full content or nothing.
pub struct ReadPipeline {
    metadata: Arc<dyn MetadataService>,
    transport: Arc<dyn BlockTransport>,
    replica_fallback: bool,
}

impl ReadPipeline {
    pub fn new(
        metadata: Arc<dyn MetadataService>,
        transport: Arc<dyn BlockTransport>,
        replica_fallback: bool,
    ) -> Self {
        ReadPipeline {
            metadata,
            transport,
            replica_fallback,
        }
    }

    pub async fn read_file(&self, dfs_path: &str) -> Result<Vec<u8>> {
        let blocks = self.metadata.lookup_file(dfs_path).await?;
        let mut content = Vec::new();
        for block in blocks.iter() {
            let data = self.fetch_block(block).await?;
            content.extend_from_slice(&data);
        }
        debug!(dfs_path, blocks = blocks.len(), bytes = content.len(), "file read");
        Ok(content)
    }

    async fn fetch_block(&self, block: &LocatedBlock) -> Result<Vec<u8>> {
        if block.datanodes.is_empty() {
            return Err(DFSError::ReplicaUnavailable(format!(
                "Block {} (seq {}) has no live replica",
                block.block_id, block.seq
            )));
        }

        let mut candidates = block.datanodes.clone();
        candidates.shuffle(&mut rand::thread_rng());
        if !self.replica_fallback {
            candidates.truncate(1);
        }

        let mut failures = vec![];
        for datanode in candidates.iter() {
            match self.transport.fetch_block(datanode, &block.block_id).await {
                Ok(data) => return Ok(data),
                // Only failures of the replica itself move on to the next candidate.
                Err(e) if !e.is_node_fatal() && !matches!(e, DFSError::NotFound(_)) => {
                    return Err(DFSError::ReplicaUnavailable(format!(
                        "Block {} (seq {}) rejected by {}: {}",
                        block.block_id, block.seq, datanode.id, e
                    )));
                }
                Err(e) => {
                    warn!(
                        block_id = block.block_id.as_str(),
                        datanode_id = datanode.id.as_str(),
                        error = %e,
                        "replica fetch failed"
                    );
                    failures.push(format!("{}: {}", datanode.id, e));
                }
            }
        }

        Err(DFSError::ReplicaUnavailable(format!(
            "Block {} (seq {}) could not be read: {}",
            block.block_id,
            block.seq,
            failures.join("; ")
        )))
    }
}

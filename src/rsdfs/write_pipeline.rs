use std::io::SeekFrom;
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::future::try_join_all;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::task::JoinSet;
use tracing::{debug, info};

use crate::block::{block_count, block_range, new_block_id, BlockId};
use crate::error::{DFSError, Result};
use crate::rsdfs::transport::{BlockTransport, MetadataService};

/// Where the bytes of a file being written come from.
#[derive(Clone)]
pub enum BlockSource {
    File(PathBuf),
    Memory(Arc<Vec<u8>>),
}

impl BlockSource {
    async fn len(&self) -> Result<u64> {
        match self {
            BlockSource::File(path) => Ok(tokio::fs::metadata(path).await?.len()),
            BlockSource::Memory(data) => Ok(data.len() as u64),
        }
    }

    async fn read_range(&self, range: Range<u64>) -> Result<Vec<u8>> {
        match self {
            BlockSource::File(path) => {
                let mut file = File::open(path).await?;
                file.seek(SeekFrom::Start(range.start)).await?;
                let mut buffer = vec![0; (range.end - range.start) as usize];
                file.read_exact(&mut buffer).await?;
                Ok(buffer)
            }
            BlockSource::Memory(data) => {
                Ok(data[range.start as usize..range.end as usize].to_vec())
            }
        }
    }
}

/// Client write path.
///
/// Phase one places every block concurrently: each task reads its byte
/// range, asks the namenode for targets and stores the block on all of
/// them. Phase two commits the block list once every block is placed.
/// Tasks finish in any order; each result lands in the slot of its block
/// index, so the committed list is always in byte order.
pub struct WritePipeline {
    metadata: Arc<dyn MetadataService>,
    transport: Arc<dyn BlockTransport>,
    block_size: usize,
}

impl WritePipeline {
    pub fn new(
        metadata: Arc<dyn MetadataService>,
        transport: Arc<dyn BlockTransport>,
        block_size: usize,
    ) -> Self {
        WritePipeline {
            metadata,
            transport,
            block_size,
        }
    }

    pub async fn write_file(&self, local_path: &Path, dfs_path: &str) -> Result<Vec<BlockId>> {
        self.write(BlockSource::File(local_path.to_path_buf()), dfs_path)
            .await
    }

    pub async fn write_bytes(&self, data: Vec<u8>, dfs_path: &str) -> Result<Vec<BlockId>> {
        self.write(BlockSource::Memory(Arc::new(data)), dfs_path).await
    }

    /// Places every block, then commits. Nothing is committed if any block fails;
    /// blocks already placed by then are left orphaned on their datanodes.
    pub async fn write(&self, source: BlockSource, dfs_path: &str) -> Result<Vec<BlockId>> {
        if self.block_size == 0 {
            return Err(DFSError::ConfigError(String::from("block size must be positive")));
        }
        let file_size = source.len().await?;
        let number_of_blocks = block_count(file_size, self.block_size);
        debug!(dfs_path, file_size, number_of_blocks, "placing blocks");

        let mut slots: Vec<Option<BlockId>> = vec![None; number_of_blocks];
        let mut tasks = JoinSet::new();
        for seq in 0..number_of_blocks {
            let range = block_range(seq, file_size, self.block_size);
            let source = source.clone();
            let metadata = self.metadata.clone();
            let transport = self.transport.clone();
            tasks.spawn(async move {
                let data = source.read_range(range).await?;
                let block_id = place_block(metadata.as_ref(), transport.as_ref(), &data).await?;
                Ok::<_, DFSError>((seq, block_id))
            });
        }

        while let Some(joined) = tasks.join_next().await {
            // Dropping `tasks` on the error path aborts the blocks still in flight.
            let (seq, block_id) = joined??;
            slots[seq] = Some(block_id);
        }

        let block_ids = slots
            .into_iter()
            .collect::<Option<Vec<BlockId>>>()
            .ok_or_else(|| DFSError::TaskError(String::from("Block task finished without a result")))?;

        self.metadata
            .commit_file_blocks(dfs_path, block_ids.clone())
            .await?;
        info!(dfs_path, blocks = block_ids.len(), "file written");
        Ok(block_ids)
    }
}

/// Stores one block on every target the namenode hands out. All replicas
/// must acknowledge; the first failure fails the block.
async fn place_block(
    metadata: &dyn MetadataService,
    transport: &dyn BlockTransport,
    data: &[u8],
) -> Result<BlockId> {
    let block_id = new_block_id();
    let targets = metadata.get_available_datanodes().await?;
    try_join_all(
        targets
            .iter()
            .map(|datanode| transport.store_block(datanode, &block_id, data)),
    )
    .await?;
    debug!(
        block_id = block_id.as_str(),
        replicas = targets.len(),
        bytes = data.len(),
        "block placed"
    );
    Ok(block_id)
}

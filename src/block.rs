use std::ops::Range;

use uuid::Uuid;

use crate::error::{DFSError, Result};
use crate::proto::{BlockLocations, DataNodeInfo as ProtoDataNodeInfo};

/// 3 KiB, the block size the client splits files into unless configured otherwise.
pub const DEFAULT_BLOCK_SIZE: usize = 3 * 1024;

/// Largest block a single StoreBlock/FetchBlock message may carry.
pub const MAX_BLOCK_SIZE: usize = 64 * 1024 * 1024;

/// gRPC message limit for the block service, block payload plus envelope.
pub const MAX_MESSAGE_SIZE: usize = MAX_BLOCK_SIZE + 64 * 1024;

pub type BlockId = String;

/// Identity and address of a datanode, as handed out for placement and reads.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DataNodeInfo {
    pub id: String,
    pub addr: String,
}

/// One block of a committed file together with the datanodes holding it.
#[derive(Debug, Clone, PartialEq)]
pub struct LocatedBlock {
    pub block_id: BlockId,
    pub seq: u64,
    pub datanodes: Vec<DataNodeInfo>,
}

impl From<ProtoDataNodeInfo> for DataNodeInfo {
    fn from(info: ProtoDataNodeInfo) -> Self {
        DataNodeInfo {
            id: info.datanode_id,
            addr: info.addr,
        }
    }
}

impl From<DataNodeInfo> for ProtoDataNodeInfo {
    fn from(info: DataNodeInfo) -> Self {
        ProtoDataNodeInfo {
            datanode_id: info.id,
            addr: info.addr,
        }
    }
}

impl From<BlockLocations> for LocatedBlock {
    fn from(block: BlockLocations) -> Self {
        LocatedBlock {
            block_id: block.block_id,
            seq: block.seq,
            datanodes: block.datanodes.into_iter().map(DataNodeInfo::from).collect(),
        }
    }
}

impl From<LocatedBlock> for BlockLocations {
    fn from(block: LocatedBlock) -> Self {
        BlockLocations {
            block_id: block.block_id,
            seq: block.seq,
            datanodes: block
                .datanodes
                .into_iter()
                .map(ProtoDataNodeInfo::from)
                .collect(),
        }
    }
}

/// Generates a fresh, globally unique block identifier.
pub fn new_block_id() -> BlockId {
    Uuid::new_v4().to_string()
}

/// Block ids double as file names on the datanode, so anything that could
/// escape the data directory is refused.
pub fn validate_block_id(block_id: &str) -> Result<()> {
    if block_id.is_empty()
        || block_id == "."
        || block_id == ".."
        || block_id.contains(['/', '\\', '\0'])
    {
        return Err(DFSError::InvalidBlockId(format!(
            "'{}' is not a valid block id",
            block_id
        )));
    }
    Ok(())
}

/// Number of blocks a file of `file_size` bytes is split into.
pub fn block_count(file_size: u64, block_size: usize) -> usize {
    let block_size = block_size as u64;
    ((file_size + block_size - 1) / block_size) as usize
}

/// Byte range covered by block `seq` of a file of `file_size` bytes.
pub fn block_range(seq: usize, file_size: u64, block_size: usize) -> Range<u64> {
    let start = seq as u64 * block_size as u64;
    let end = u64::min(start + block_size as u64, file_size);
    start..end
}

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tracing::debug;

use crate::block::{validate_block_id, BlockId};
use crate::error::{DFSError, Result};

#[cfg(test)]
use mockall::automock;

const BLOCK_FILE_EXTENSION: &str = "dat";

/// Durable home for block bytes on one datanode.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait StorageBackend: Send + Sync {
    async fn put(&self, block_id: &str, data: &[u8]) -> Result<()>;
    async fn get(&self, block_id: &str) -> Result<Vec<u8>>;
    async fn list(&self) -> Result<Vec<BlockId>>;
}

/// Stores every block as `{dir}/{block_id}.dat`.
pub struct FsBackend {
    dir: PathBuf,
}

impl FsBackend {
    pub async fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).await?;
        Ok(FsBackend { dir })
    }

    fn block_path(&self, block_id: &str) -> PathBuf {
        self.dir
            .join(format!("{}.{}", block_id, BLOCK_FILE_EXTENSION))
    }
}

#[async_trait]
impl StorageBackend for FsBackend {
    async fn put(&self, block_id: &str, data: &[u8]) -> Result<()> {
        validate_block_id(block_id)?;
        // A block file is either absent or complete.
        let tmp_path = self.dir.join(format!("{}.tmp", block_id));
        fs::write(&tmp_path, data).await?;
        fs::rename(&tmp_path, self.block_path(block_id)).await?;
        debug!(block_id, bytes = data.len(), "block persisted");
        Ok(())
    }

    async fn get(&self, block_id: &str) -> Result<Vec<u8>> {
        validate_block_id(block_id)?;
        match fs::read(self.block_path(block_id)).await {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(DFSError::NotFound(format!(
                "Block {} not found",
                block_id
            ))),
            Err(e) => Err(DFSError::from(e)),
        }
    }

    async fn list(&self) -> Result<Vec<BlockId>> {
        let mut entries = fs::read_dir(&self.dir).await?;
        let mut block_ids = vec![];
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(BLOCK_FILE_EXTENSION) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) {
                block_ids.push(stem.to_string());
            }
        }
        block_ids.sort();
        Ok(block_ids)
    }
}

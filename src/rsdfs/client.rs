use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::fs;
use tracing::info;

use crate::block::BlockId;
use crate::config::rsdfs_config::RSDFSConfig;
use crate::error::Result;
use crate::proto::DataNodeStatusEntry;
use crate::rsdfs::read_pipeline::ReadPipeline;
use crate::rsdfs::transport::{
    BlockTransport, GrpcBlockTransport, GrpcMetadataService, MetadataService,
};
use crate::rsdfs::write_pipeline::WritePipeline;

#[async_trait]
pub trait Client {
    /// Reads `dfs_path` and writes its content to `local_path`.
    async fn get(&self, dfs_path: &str, local_path: &Path) -> Result<()>;
    /// Writes the local file to `dfs_path`, returning the committed block ids.
    async fn put(&self, local_path: &Path, dfs_path: &str) -> Result<Vec<BlockId>>;
}

pub struct RSDFSClient {
    metadata: Arc<dyn MetadataService>,
    writer: WritePipeline,
    reader: ReadPipeline,
}

impl RSDFSClient {
    /// Connects to the namenode named in the config. Datanode connections are
    /// opened per block transfer.
    pub async fn connect(config: RSDFSConfig) -> Result<Self> {
        config.validate()?;
        let metadata = Arc::new(GrpcMetadataService::connect(&config.namenode_address).await?);
        Self::with_services(&config, metadata, Arc::new(GrpcBlockTransport))
    }

    pub fn with_services(
        config: &RSDFSConfig,
        metadata: Arc<dyn MetadataService>,
        transport: Arc<dyn BlockTransport>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(RSDFSClient {
            writer: WritePipeline::new(metadata.clone(), transport.clone(), config.block_size),
            reader: ReadPipeline::new(
                metadata.clone(),
                transport,
                config.read_replica_fallback,
            ),
            metadata,
        })
    }

    pub async fn put_bytes(&self, data: Vec<u8>, dfs_path: &str) -> Result<Vec<BlockId>> {
        self.writer.write_bytes(data, dfs_path).await
    }

    pub async fn get_bytes(&self, dfs_path: &str) -> Result<Vec<u8>> {
        self.reader.read_file(dfs_path).await
    }

    pub async fn list_files(&self, prefix: &str) -> Result<Vec<(String, u64)>> {
        self.metadata.list_files(prefix).await
    }

    pub async fn list_datanodes(&self) -> Result<Vec<DataNodeStatusEntry>> {
        self.metadata.list_datanodes().await
    }
}

#[async_trait]
impl Client for RSDFSClient {
    async fn get(&self, dfs_path: &str, local_path: &Path) -> Result<()> {
        let content = self.reader.read_file(dfs_path).await?;

        // Only a complete read reaches the destination path.
        let mut temp_path = PathBuf::from(local_path).into_os_string();
        temp_path.push(".part");
        fs::write(&temp_path, &content).await?;
        fs::rename(&temp_path, local_path).await?;

        info!(
            dfs_path,
            local_path = %local_path.display(),
            bytes = content.len(),
            "get complete"
        );
        Ok(())
    }

    async fn put(&self, local_path: &Path, dfs_path: &str) -> Result<Vec<BlockId>> {
        self.writer.write_file(local_path, dfs_path).await
    }
}

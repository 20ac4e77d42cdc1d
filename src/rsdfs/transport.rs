use async_trait::async_trait;
use tonic::transport::{Channel, Endpoint};
use tonic::Request;

use crate::block::{BlockId, DataNodeInfo, LocatedBlock, MAX_MESSAGE_SIZE};
use crate::error::{DFSError, Result};
use crate::proto::rsdfs_block_service_client::RsdfsBlockServiceClient;
use crate::proto::rsdfs_name_node_service_client::RsdfsNameNodeServiceClient;
use crate::proto::{
    AvailableDatanodesRequest, CommitFileBlocksRequest, DataNodeStatusEntry, FetchBlockRequest,
    ListDatanodesRequest, ListFilesRequest, LookupFileRequest, StoreBlockRequest,
};

#[cfg(test)]
use mockall::automock;

/// The namenode operations the client pipelines depend on.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait MetadataService: Send + Sync {
    async fn get_available_datanodes(&self) -> Result<Vec<DataNodeInfo>>;
    async fn commit_file_blocks(&self, path: &str, block_ids: Vec<BlockId>) -> Result<()>;
    async fn lookup_file(&self, path: &str) -> Result<Vec<LocatedBlock>>;
    async fn list_files(&self, prefix: &str) -> Result<Vec<(String, u64)>>;
    async fn list_datanodes(&self) -> Result<Vec<DataNodeStatusEntry>>;
}

/// Moves block bytes between the client and one datanode.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait BlockTransport: Send + Sync {
    async fn store_block(&self, datanode: &DataNodeInfo, block_id: &str, data: &[u8])
        -> Result<()>;
    async fn fetch_block(&self, datanode: &DataNodeInfo, block_id: &str) -> Result<Vec<u8>>;
}

pub struct GrpcMetadataService {
    client: RsdfsNameNodeServiceClient<Channel>,
}

impl GrpcMetadataService {
    pub async fn connect(namenode_addr: &str) -> Result<Self> {
        let endpoint = Endpoint::from_shared(format!("http://{}", namenode_addr))?;
        let client = RsdfsNameNodeServiceClient::connect(endpoint)
            .await
            .map_err(|e| DFSError::ConnectionError(format!("{}: {}", namenode_addr, e)))?;
        Ok(GrpcMetadataService { client })
    }
}

#[async_trait]
impl MetadataService for GrpcMetadataService {
    async fn get_available_datanodes(&self) -> Result<Vec<DataNodeInfo>> {
        let response = self
            .client
            .clone()
            .get_available_datanodes(AvailableDatanodesRequest {})
            .await?;
        Ok(response
            .into_inner()
            .datanodes
            .into_iter()
            .map(DataNodeInfo::from)
            .collect())
    }

    async fn commit_file_blocks(&self, path: &str, block_ids: Vec<BlockId>) -> Result<()> {
        self.client
            .clone()
            .commit_file_blocks(CommitFileBlocksRequest {
                path: path.to_string(),
                block_ids,
            })
            .await?;
        Ok(())
    }

    async fn lookup_file(&self, path: &str) -> Result<Vec<LocatedBlock>> {
        let response = self
            .client
            .clone()
            .lookup_file(LookupFileRequest {
                path: path.to_string(),
            })
            .await?;
        Ok(response
            .into_inner()
            .blocks
            .into_iter()
            .map(LocatedBlock::from)
            .collect())
    }

    async fn list_files(&self, prefix: &str) -> Result<Vec<(String, u64)>> {
        let response = self
            .client
            .clone()
            .list_files(ListFilesRequest {
                prefix: prefix.to_string(),
            })
            .await?;
        Ok(response
            .into_inner()
            .files
            .into_iter()
            .map(|file| (file.path, file.block_count))
            .collect())
    }

    async fn list_datanodes(&self) -> Result<Vec<DataNodeStatusEntry>> {
        let response = self
            .client
            .clone()
            .list_datanodes(ListDatanodesRequest {})
            .await?;
        Ok(response.into_inner().datanodes)
    }
}

/// Opens a fresh connection to the target datanode for every call.
#[derive(Default)]
pub struct GrpcBlockTransport;

impl GrpcBlockTransport {
    async fn connect(datanode: &DataNodeInfo) -> Result<RsdfsBlockServiceClient<Channel>> {
        let endpoint = Endpoint::from_shared(format!("http://{}", datanode.addr))?;
        let client = RsdfsBlockServiceClient::connect(endpoint)
            .await
            .map_err(|e| {
                DFSError::ConnectionError(format!(
                    "unable to connect to datanode {} at {}: {}",
                    datanode.id, datanode.addr, e
                ))
            })?;
        Ok(client
            .max_decoding_message_size(MAX_MESSAGE_SIZE)
            .max_encoding_message_size(MAX_MESSAGE_SIZE))
    }
}

#[async_trait]
impl BlockTransport for GrpcBlockTransport {
    async fn store_block(
        &self,
        datanode: &DataNodeInfo,
        block_id: &str,
        data: &[u8],
    ) -> Result<()> {
        let mut client = Self::connect(datanode).await?;
        client
            .store_block(Request::new(StoreBlockRequest {
                block_id: block_id.to_string(),
                data: data.to_vec(),
            }))
            .await?;
        Ok(())
    }

    async fn fetch_block(&self, datanode: &DataNodeInfo, block_id: &str) -> Result<Vec<u8>> {
        let mut client = Self::connect(datanode).await?;
        let response = client
            .fetch_block(Request::new(FetchBlockRequest {
                block_id: block_id.to_string(),
            }))
            .await?;
        Ok(response.into_inner().data)
    }
}

use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tokio_stream::wrappers::TcpListenerStream;
use tonic::transport::Server;
use tonic::{Request, Response, Status};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::block::{BlockId, DataNodeInfo, LocatedBlock};
use crate::config::namenode_config::{LivenessTimeouts, NameNodeConfig};
use crate::error::Result;
use crate::namenode::file_map::FileMap;
use crate::namenode::registry::{DataNodeSummary, DatanodeRegistry, RegistrationOutcome};

use crate::proto::data_node_name_node_service_server::{
    DataNodeNameNodeService, DataNodeNameNodeServiceServer,
};
use crate::proto::rsdfs_name_node_service_server::{
    RsdfsNameNodeService, RsdfsNameNodeServiceServer,
};
use crate::proto::{
    AvailableDatanodesRequest, AvailableDatanodesResponse, BlockLocations, BlockReportRequest,
    BlockReportResponse, CommitFileBlocksRequest, CommitFileBlocksResponse,
    DataNodeInfo as ProtoDataNodeInfo, DataNodeStatusEntry, FileEntry, ListDatanodesRequest,
    ListDatanodesResponse, ListFilesRequest, ListFilesResponse, LookupFileRequest,
    LookupFileResponse, RegistrationRequest, RegistrationResponse, RegistrationStatus,
};

/// Datanode-facing half of the namenode: registration, reports, placement.
pub trait DatanodeManager {
    fn register_datanode(&self, id: &str, addr: &str) -> Result<RegistrationOutcome>;
    fn apply_block_report(&self, id: &str, block_ids: Vec<BlockId>) -> Result<()>;
    fn select_datanodes(&self) -> Result<Vec<DataNodeInfo>>;
    fn datanode_summaries(&self) -> Result<Vec<DataNodeSummary>>;
}

/// Client-facing half of the namenode: file to block mappings.
pub trait NamespaceManager {
    fn commit_file_blocks(&self, path: &str, block_ids: Vec<BlockId>) -> Result<()>;
    fn lookup_file(&self, path: &str) -> Result<Vec<LocatedBlock>>;
    fn list_files(&self, prefix: &str) -> Result<Vec<(String, usize)>>;
}

/// Represents the NameNode in the distributed file system.
///
/// All metadata lives in memory. Each map sits behind its own lock, so
/// registrations, reports and commits arriving concurrently are serialized
/// per map while lookups only take read locks.
pub struct NameNode {
    pub id: Uuid,
    pub ipc_address: String,
    pub replication_factor: usize,
    pub liveness: LivenessTimeouts,
    pub liveness_check_interval: Duration,
    pub registry: DatanodeRegistry,
    pub file_map: FileMap,
}

impl NameNode {
    /// Creates a new instance of NameNode from configuration.
    pub fn from_config(config: NameNodeConfig) -> Result<Self> {
        config.validate()?;
        Ok(NameNode {
            id: Uuid::new_v4(),
            ipc_address: config.ipc_address.clone(),
            replication_factor: config.replication_factor,
            liveness: config.liveness_timeouts(),
            liveness_check_interval: Duration::from_millis(config.liveness_check_interval),
            registry: DatanodeRegistry::new(),
            file_map: FileMap::new(),
        })
    }

    /// Runs one liveness sweep against the given instant.
    pub fn check_liveness(&self, now: Instant) -> Result<()> {
        let transitions = self.registry.check_liveness(now, self.liveness)?;
        if !transitions.is_empty() {
            info!(changed = transitions.len(), "liveness sweep updated datanodes");
        }
        Ok(())
    }

    /// Spawns the periodic liveness sweep.
    pub fn start_liveness_monitor(self: &Arc<Self>) -> JoinHandle<()> {
        let namenode = self.clone();
        tokio::spawn(async move {
            let mut interval_timer = time::interval(namenode.liveness_check_interval);
            loop {
                interval_timer.tick().await;
                if let Err(e) = namenode.check_liveness(Instant::now()) {
                    warn!(error = %e, "liveness sweep failed");
                }
            }
        })
    }

    /// Serves both namenode services on an already bound listener.
    pub async fn serve_with_listener(self: Arc<Self>, listener: TcpListener) -> Result<()> {
        info!(
            namenode_id = %self.id,
            addr = ?listener.local_addr().ok(),
            replication_factor = self.replication_factor,
            "namenode listening"
        );
        Server::builder()
            .add_service(DataNodeNameNodeServiceServer::new(self.clone()))
            .add_service(RsdfsNameNodeServiceServer::new(self))
            .serve_with_incoming(TcpListenerStream::new(listener))
            .await?;
        Ok(())
    }
}

impl DatanodeManager for NameNode {
    fn register_datanode(&self, id: &str, addr: &str) -> Result<RegistrationOutcome> {
        self.registry.register(id, addr, Instant::now())
    }

    fn apply_block_report(&self, id: &str, block_ids: Vec<BlockId>) -> Result<()> {
        debug!(datanode_id = id, blocks = block_ids.len(), "block report received");
        self.registry.block_report(id, block_ids, Instant::now())
    }

    fn select_datanodes(&self) -> Result<Vec<DataNodeInfo>> {
        self.registry.select_datanodes(self.replication_factor)
    }

    fn datanode_summaries(&self) -> Result<Vec<DataNodeSummary>> {
        self.registry.summaries()
    }
}

impl NamespaceManager for NameNode {
    fn commit_file_blocks(&self, path: &str, block_ids: Vec<BlockId>) -> Result<()> {
        let block_count = block_ids.len();
        if self.file_map.commit(path.to_string(), block_ids)?.is_some() {
            info!(path, blocks = block_count, "file overwritten");
        } else {
            info!(path, blocks = block_count, "file committed");
        }
        Ok(())
    }

    fn lookup_file(&self, path: &str) -> Result<Vec<LocatedBlock>> {
        let block_ids = self.file_map.get(path)?;
        let holders = self.registry.holders_of(&block_ids)?;
        Ok(block_ids
            .into_iter()
            .zip(holders)
            .enumerate()
            .map(|(seq, (block_id, datanodes))| LocatedBlock {
                block_id,
                seq: seq as u64,
                datanodes,
            })
            .collect())
    }

    fn list_files(&self, prefix: &str) -> Result<Vec<(String, usize)>> {
        self.file_map.list(prefix)
    }
}

#[tonic::async_trait]
impl DataNodeNameNodeService for Arc<NameNode> {
    async fn register_with_namenode(
        &self,
        request: Request<RegistrationRequest>,
    ) -> std::result::Result<Response<RegistrationResponse>, Status> {
        let inner_request = request.into_inner();
        if inner_request.datanode_id.is_empty() {
            return Err(Status::invalid_argument("Missing DataNode ID"));
        }
        let status = match self.register_datanode(&inner_request.datanode_id, &inner_request.addr)?
        {
            RegistrationOutcome::Registered => RegistrationStatus::Registered,
            RegistrationOutcome::Exists => RegistrationStatus::Exists,
        };
        Ok(Response::new(RegistrationResponse {
            status: status as i32,
        }))
    }

    async fn send_block_report(
        &self,
        request: Request<BlockReportRequest>,
    ) -> std::result::Result<Response<BlockReportResponse>, Status> {
        let inner_request = request.into_inner();
        if inner_request.datanode_id.is_empty() {
            return Err(Status::invalid_argument("Missing DataNode ID"));
        }
        self.apply_block_report(&inner_request.datanode_id, inner_request.block_ids)?;
        Ok(Response::new(BlockReportResponse { success: true }))
    }
}

#[tonic::async_trait]
impl RsdfsNameNodeService for Arc<NameNode> {
    async fn get_available_datanodes(
        &self,
        _request: Request<AvailableDatanodesRequest>,
    ) -> std::result::Result<Response<AvailableDatanodesResponse>, Status> {
        let datanodes = self
            .select_datanodes()?
            .into_iter()
            .map(ProtoDataNodeInfo::from)
            .collect();
        Ok(Response::new(AvailableDatanodesResponse { datanodes }))
    }

    async fn commit_file_blocks(
        &self,
        request: Request<CommitFileBlocksRequest>,
    ) -> std::result::Result<Response<CommitFileBlocksResponse>, Status> {
        let inner_request = request.into_inner();
        let namenode: &NameNode = self;
        namenode.commit_file_blocks(&inner_request.path, inner_request.block_ids)?;
        Ok(Response::new(CommitFileBlocksResponse { success: true }))
    }

    async fn lookup_file(
        &self,
        request: Request<LookupFileRequest>,
    ) -> std::result::Result<Response<LookupFileResponse>, Status> {
        let inner_request = request.into_inner();
        let namenode: &NameNode = self;
        let blocks = namenode
            .lookup_file(&inner_request.path)?
            .into_iter()
            .map(BlockLocations::from)
            .collect();
        Ok(Response::new(LookupFileResponse { blocks }))
    }

    async fn list_files(
        &self,
        request: Request<ListFilesRequest>,
    ) -> std::result::Result<Response<ListFilesResponse>, Status> {
        let inner_request = request.into_inner();
        let namenode: &NameNode = self;
        let files = namenode
            .list_files(&inner_request.prefix)?
            .into_iter()
            .map(|(path, block_count)| FileEntry {
                path,
                block_count: block_count as u64,
            })
            .collect();
        Ok(Response::new(ListFilesResponse { files }))
    }

    async fn list_datanodes(
        &self,
        _request: Request<ListDatanodesRequest>,
    ) -> std::result::Result<Response<ListDatanodesResponse>, Status> {
        let datanodes = self
            .datanode_summaries()?
            .into_iter()
            .map(|summary| DataNodeStatusEntry {
                datanode_id: summary.id,
                addr: summary.addr,
                status: summary.status.to_string(),
                block_count: summary.block_count as u64,
            })
            .collect();
        Ok(Response::new(ListDatanodesResponse { datanodes }))
    }
}

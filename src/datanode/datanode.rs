use crate::block::MAX_MESSAGE_SIZE;
use crate::config::datanode_config::DataNodeConfig;
use crate::datanode::block_manager::BlockManager;
use crate::datanode::block_report::BlockReportManager;
use crate::datanode::storage::{FsBackend, StorageBackend};
use crate::error::{DFSError, Result};
use crate::proto::data_node_name_node_service_client::DataNodeNameNodeServiceClient;
use crate::proto::rsdfs_block_service_server::RsdfsBlockServiceServer;
use crate::proto::{RegistrationRequest, RegistrationStatus};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::transport::{Channel, Endpoint, Server};
use tracing::info;
use uuid::Uuid;

/// Represents a DataNode in a distributed file system.
pub struct DataNode {
    pub id: String,
    pub addr: String,
    pub data_dir: PathBuf,
    client: Arc<Mutex<DataNodeNameNodeServiceClient<Channel>>>,
    pub block_manager: Arc<BlockManager>,
    block_report_manager: Arc<BlockReportManager>,
}

impl DataNode {
    /// Creates a new DataNode from the provided configuration.
    ///
    /// Blocks live under `{data.dir}/{datanode id}`; whatever is already
    /// there becomes the initial inventory.
    pub async fn from_config(config: DataNodeConfig) -> Result<Self> {
        let id = config
            .datanode_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let data_dir = PathBuf::from(&config.data_dir).join(&id);
        let backend: Arc<dyn StorageBackend> = Arc::new(FsBackend::open(&data_dir).await?);

        info!(
            namenode = config.namenode_address.as_str(),
            "Attempting to establish connection with namenode"
        );
        let endpoint = Endpoint::from_shared(format!("http://{}", config.namenode_address))?;
        let client = DataNodeNameNodeServiceClient::connect(endpoint).await?;

        Self::with_backend(
            id,
            config.ipc_address,
            data_dir,
            client,
            backend,
            Duration::from_millis(config.block_report_interval),
        )
        .await
    }

    pub async fn with_backend(
        id: String,
        addr: String,
        data_dir: PathBuf,
        client: DataNodeNameNodeServiceClient<Channel>,
        backend: Arc<dyn StorageBackend>,
        block_report_interval: Duration,
    ) -> Result<Self> {
        let block_manager = Arc::new(BlockManager::recover(backend).await?);
        let wrapped_client = Arc::new(Mutex::new(client));
        let block_report_manager = Arc::new(BlockReportManager::new(
            wrapped_client.clone(),
            block_manager.clone(),
            block_report_interval,
            id.clone(),
        ));

        Ok(DataNode {
            id,
            addr,
            data_dir,
            client: wrapped_client,
            block_manager,
            block_report_manager,
        })
    }

    /// Registers the DataNode with the NameNode under its id and listening address.
    pub async fn register_with_namenode(&self) -> Result<RegistrationStatus> {
        let registration_request = RegistrationRequest {
            datanode_id: self.id.clone(),
            addr: self.addr.clone(),
        };

        let mut client_guard = self.client.lock().await;
        let response = client_guard
            .register_with_namenode(registration_request)
            .await
            .map_err(|e| {
                DFSError::RegistrationFailed(format!(
                    "Registration with the NameNode failed: {}",
                    e.message()
                ))
            })?;
        Ok(response.into_inner().status())
    }

    /// Sends one block report outside the regular schedule.
    pub async fn report_now(&self) -> Result<()> {
        self.block_report_manager.send_report().await
    }

    /// Registers, then starts the block report loop.
    pub async fn start(&self) -> Result<JoinHandle<()>> {
        let status = self.register_with_namenode().await?;
        info!(
            datanode_id = self.id.as_str(),
            addr = self.addr.as_str(),
            status = ?status,
            "Registered with NameNode"
        );
        Ok(self.block_report_manager.clone().start())
    }

    /// Serves the block service on an already bound listener.
    pub async fn serve_with_listener(&self, listener: TcpListener) -> Result<()> {
        info!(
            datanode_id = self.id.as_str(),
            data_dir = %self.data_dir.display(),
            "datanode listening"
        );
        Server::builder()
            .add_service(
                RsdfsBlockServiceServer::new(self.block_manager.clone())
                    .max_decoding_message_size(MAX_MESSAGE_SIZE)
                    .max_encoding_message_size(MAX_MESSAGE_SIZE),
            )
            .serve_with_incoming(TcpListenerStream::new(listener))
            .await?;
        Ok(())
    }
}

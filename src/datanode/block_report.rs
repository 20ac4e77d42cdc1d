use crate::datanode::block_manager::BlockManager;
use crate::error::{DFSError, Result};
use crate::proto::data_node_name_node_service_client::DataNodeNameNodeServiceClient;
use crate::proto::BlockReportRequest;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time;
use tonic::transport::Channel;
use tracing::{debug, warn};

/// Manages the sending of the block report to the NameNode at regular intervals.
pub struct BlockReportManager {
    datanode_service_client: Arc<Mutex<DataNodeNameNodeServiceClient<Channel>>>,
    block_manager: Arc<BlockManager>,
    interval: Duration,
    id: String,
}

impl BlockReportManager {
    pub fn new(
        datanode_service_client: Arc<Mutex<DataNodeNameNodeServiceClient<Channel>>>,
        block_manager: Arc<BlockManager>,
        interval: Duration,
        id: String,
    ) -> Self {
        BlockReportManager {
            datanode_service_client,
            block_manager,
            interval,
            id,
        }
    }

    /// Sends the full current inventory once.
    pub async fn send_report(&self) -> Result<()> {
        let block_ids = self.block_manager.held_blocks().await;
        let block_count = block_ids.len();
        let request = BlockReportRequest {
            datanode_id: self.id.clone(),
            block_ids,
        };
        let mut client_guard = self.datanode_service_client.lock().await;
        client_guard
            .send_block_report(request)
            .await
            .map_err(DFSError::from)?;
        debug!(datanode_id = self.id.as_str(), blocks = block_count, "block report sent");
        Ok(())
    }

    /// Starts the report loop. A failed report is logged and retried on the next tick.
    pub fn start(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval_timer = time::interval(self.interval);
            loop {
                interval_timer.tick().await;
                if let Err(e) = self.send_report().await {
                    warn!(datanode_id = self.id.as_str(), error = %e, "block report failed");
                }
            }
        })
    }
}

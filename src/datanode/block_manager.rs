use crate::block::{validate_block_id, BlockId};
use crate::datanode::storage::StorageBackend;
use crate::error::{DFSError, Result};
use crate::proto::rsdfs_block_service_server::RsdfsBlockService;
use crate::proto::{FetchBlockRequest, FetchBlockResponse, StoreBlockRequest, StoreBlockResponse};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::RwLock;
use tonic::{Request, Response, Status};
use tracing::debug;

/// Manages the Blocks on the DataNodes local disk.
///
/// `blocks` is the in-memory inventory the report loop sends to the
/// namenode; it only ever contains ids whose bytes are already persisted.
pub struct BlockManager {
    backend: Arc<dyn StorageBackend>,
    pub blocks: Arc<RwLock<HashSet<BlockId>>>,
}

impl BlockManager {
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        BlockManager {
            backend,
            blocks: Arc::new(RwLock::new(HashSet::new())),
        }
    }

    /// Builds a manager whose inventory starts with everything already on disk.
    pub async fn recover(backend: Arc<dyn StorageBackend>) -> Result<Self> {
        let existing = backend.list().await?;
        let manager = BlockManager::new(backend);
        manager.blocks.write().await.extend(existing);
        Ok(manager)
    }

    pub async fn store_block(&self, block_id: &str, data: &[u8]) -> Result<()> {
        validate_block_id(block_id)?;
        self.backend.put(block_id, data).await?;
        self.blocks.write().await.insert(block_id.to_string());
        debug!(block_id, bytes = data.len(), "block stored");
        Ok(())
    }

    pub async fn fetch_block(&self, block_id: &str) -> Result<Vec<u8>> {
        if !self.blocks.read().await.contains(block_id) {
            return Err(DFSError::NotFound(format!("Block {} not found", block_id)));
        }
        self.backend.get(block_id).await
    }

    /// Snapshot of the held block ids, sorted.
    pub async fn held_blocks(&self) -> Vec<BlockId> {
        let blocks = self.blocks.read().await;
        let mut block_ids: Vec<BlockId> = blocks.iter().cloned().collect();
        block_ids.sort();
        block_ids
    }
}

#[tonic::async_trait]
impl RsdfsBlockService for Arc<BlockManager> {
    async fn store_block(
        &self,
        request: Request<StoreBlockRequest>,
    ) -> std::result::Result<Response<StoreBlockResponse>, Status> {
        let inner_request = request.into_inner();
        BlockManager::store_block(self, &inner_request.block_id, &inner_request.data).await?;
        Ok(Response::new(StoreBlockResponse { success: true }))
    }

    async fn fetch_block(
        &self,
        request: Request<FetchBlockRequest>,
    ) -> std::result::Result<Response<FetchBlockResponse>, Status> {
        let inner_request = request.into_inner();
        let data = BlockManager::fetch_block(self, &inner_request.block_id).await?;
        Ok(Response::new(FetchBlockResponse {
            block_id: inner_request.block_id,
            data,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::BlockManager;
    use crate::datanode::storage::MockStorageBackend;
    use crate::error::DFSError;
    use std::sync::Arc;

    #[tokio::test]
    async fn store_records_block_after_backend_write() {
        let mut backend = MockStorageBackend::new();
        backend
            .expect_put()
            .times(1)
            .returning(|_block_id, _data| Ok(()));
        let manager = BlockManager::new(Arc::new(backend));

        manager.store_block("b1", b"data").await.unwrap();
        assert_eq!(manager.held_blocks().await, vec!["b1".to_string()]);
    }

    #[tokio::test]
    async fn backend_failure_propagates_and_leaves_inventory_untouched() {
        let mut backend = MockStorageBackend::new();
        backend
            .expect_put()
            .times(1)
            .returning(|_block_id, _data| Err(DFSError::IOError("disk full".to_string())));
        let manager = BlockManager::new(Arc::new(backend));

        let result = manager.store_block("b1", b"data").await;
        assert_eq!(result, Err(DFSError::IOError("disk full".to_string())));
        assert!(manager.held_blocks().await.is_empty());
    }

    #[tokio::test]
    async fn fetch_of_unheld_block_is_not_found_without_touching_backend() {
        let mut backend = MockStorageBackend::new();
        backend.expect_get().times(0);
        let manager = BlockManager::new(Arc::new(backend));

        assert!(matches!(
            manager.fetch_block("b1").await,
            Err(DFSError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn recover_seeds_inventory_from_backend_listing() {
        let mut backend = MockStorageBackend::new();
        backend
            .expect_list()
            .times(1)
            .returning(|| Ok(vec!["b2".to_string(), "b1".to_string()]));
        backend
            .expect_get()
            .times(1)
            .returning(|_block_id| Ok(b"bytes".to_vec()));
        let manager = BlockManager::recover(Arc::new(backend)).await.unwrap();

        assert_eq!(
            manager.held_blocks().await,
            vec!["b1".to_string(), "b2".to_string()]
        );
        assert_eq!(manager.fetch_block("b2").await.unwrap(), b"bytes".to_vec());
    }
}

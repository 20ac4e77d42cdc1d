use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use tokio::net::TcpListener;
use tokio::time::Instant;
use tokio_test::{assert_err, assert_ok};

use crate::block::{BlockId, DataNodeInfo};
use crate::config::datanode_config::DataNodeConfig;
use crate::config::namenode_config::NameNodeConfig;
use crate::config::rsdfs_config::RSDFSConfig;
use crate::datanode::datanode::DataNode;
use crate::error::{DFSError, Result};
use crate::namenode::namenode::{DatanodeManager, NameNode, NamespaceManager};
use crate::namenode::registry::NodeStatus;
use crate::proto::data_node_name_node_service_client::DataNodeNameNodeServiceClient;
use crate::proto::{BlockReportRequest, RegistrationRequest, RegistrationStatus};
use crate::rsdfs::client::{Client, RSDFSClient};
use crate::rsdfs::transport::{BlockTransport, GrpcMetadataService, MetadataService};

const LOCALHOST_IPV4: &str = "127.0.0.1";
const BLOCK_SIZE: usize = 3 * 1024;

async fn bind_ephemeral() -> (TcpListener, String) {
    let listener = TcpListener::bind(format!("{}:0", LOCALHOST_IPV4))
        .await
        .unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    (listener, addr)
}

async fn start_namenode(replication_factor: usize) -> (Arc<NameNode>, String) {
    let (listener, addr) = bind_ephemeral().await;
    let namenode = Arc::new(
        NameNode::from_config(NameNodeConfig::new(addr.clone(), replication_factor)).unwrap(),
    );
    tokio::spawn(namenode.clone().serve_with_listener(listener));
    (namenode, addr)
}

/// Starts a datanode with a report interval long enough that tests drive
/// reports themselves through `report_now`.
async fn start_datanode(namenode_addr: &str, id: &str, data_dir: &Path) -> Arc<DataNode> {
    let (listener, addr) = bind_ephemeral().await;
    let config = DataNodeConfig {
        data_dir: data_dir.to_string_lossy().to_string(),
        ipc_address: addr,
        namenode_address: namenode_addr.to_string(),
        block_report_interval: 60_000,
        datanode_id: Some(id.to_string()),
    };
    let datanode = Arc::new(DataNode::from_config(config).await.unwrap());
    let _reports = datanode.start().await.unwrap();
    let server = datanode.clone();
    tokio::spawn(async move { server.serve_with_listener(listener).await });
    datanode
}

async fn report_all(datanodes: &[Arc<DataNode>]) {
    for datanode in datanodes {
        assert_ok!(datanode.report_now().await);
    }
}

fn test_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("rsdfs-{}-{}", name, uuid::Uuid::new_v4()));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

fn patterned(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

#[tokio::test]
async fn seven_thousand_bytes_over_two_datanodes() {
    let dir = test_dir("seven");
    let (namenode, namenode_addr) = start_namenode(2).await;
    let datanodes = vec![
        start_datanode(&namenode_addr, "dn-1", &dir).await,
        start_datanode(&namenode_addr, "dn-2", &dir).await,
    ];
    let client = RSDFSClient::connect(RSDFSConfig::new(namenode_addr.clone()))
        .await
        .unwrap();

    let data = patterned(7000);
    let block_ids = assert_ok!(client.put_bytes(data.clone(), "/seven.bin").await);
    assert_eq!(block_ids.len(), 3);
    for datanode in datanodes.iter() {
        let mut held = datanode.block_manager.held_blocks().await;
        let mut expected = block_ids.clone();
        held.sort();
        expected.sort();
        assert_eq!(held, expected);
    }

    report_all(&datanodes).await;
    let located = assert_ok!(namenode.lookup_file("/seven.bin"));
    assert_eq!(
        located.iter().map(|b| b.block_id.clone()).collect::<Vec<_>>(),
        block_ids
    );
    for block in located.iter() {
        assert_eq!(block.datanodes.len(), 2);
    }
    let sizes: Vec<usize> = block_ids
        .iter()
        .map(|id| {
            std::fs::metadata(dir.join("dn-1").join(format!("{}.dat", id)))
                .unwrap()
                .len() as usize
        })
        .collect();
    assert_eq!(sizes, vec![3072, 3072, 856]);

    assert_eq!(assert_ok!(client.get_bytes("/seven.bin").await), data);
    std::fs::remove_dir_all(dir).unwrap();
}

#[tokio::test]
async fn round_trip_at_block_boundaries() {
    let dir = test_dir("boundaries");
    let (_namenode, namenode_addr) = start_namenode(2).await;
    let datanodes = vec![
        start_datanode(&namenode_addr, "dn-a", &dir).await,
        start_datanode(&namenode_addr, "dn-b", &dir).await,
        start_datanode(&namenode_addr, "dn-c", &dir).await,
    ];
    let client = RSDFSClient::connect(RSDFSConfig::new(namenode_addr))
        .await
        .unwrap();

    let sizes = [0, BLOCK_SIZE - 1, BLOCK_SIZE, BLOCK_SIZE + 1, 4 * BLOCK_SIZE + 17];
    for size in sizes {
        let path = format!("/sizes/{}", size);
        let block_ids = assert_ok!(client.put_bytes(patterned(size), &path).await);
        assert_eq!(block_ids.len(), size.div_ceil(BLOCK_SIZE));
    }
    report_all(&datanodes).await;

    for size in sizes {
        let path = format!("/sizes/{}", size);
        assert_eq!(assert_ok!(client.get_bytes(&path).await), patterned(size));
    }
    assert_eq!(assert_ok!(client.list_files("/sizes/").await).len(), sizes.len());
    std::fs::remove_dir_all(dir).unwrap();
}

#[tokio::test]
async fn put_and_get_through_local_files() {
    let dir = test_dir("files");
    let (_namenode, namenode_addr) = start_namenode(1).await;
    let datanodes = vec![start_datanode(&namenode_addr, "dn-1", &dir).await];
    let client = RSDFSClient::connect(RSDFSConfig::new(namenode_addr))
        .await
        .unwrap();

    let src = dir.join("src.bin");
    let dst = dir.join("dst.bin");
    std::fs::write(&src, patterned(10_000)).unwrap();

    assert_ok!(client.put(&src, "/files/a.bin").await);
    report_all(&datanodes).await;
    assert_ok!(client.get("/files/a.bin", &dst).await);

    assert_eq!(std::fs::read(&dst).unwrap(), patterned(10_000));
    std::fs::remove_dir_all(dir).unwrap();
}

#[tokio::test]
async fn recommit_replaces_file_content() {
    let dir = test_dir("recommit");
    let (_namenode, namenode_addr) = start_namenode(1).await;
    let datanodes = vec![start_datanode(&namenode_addr, "dn-1", &dir).await];
    let client = RSDFSClient::connect(RSDFSConfig::new(namenode_addr))
        .await
        .unwrap();

    assert_ok!(client.put_bytes(b"first".to_vec(), "/f").await);
    assert_ok!(client.put_bytes(b"second version".to_vec(), "/f").await);
    report_all(&datanodes).await;

    assert_eq!(
        assert_ok!(client.get_bytes("/f").await),
        b"second version".to_vec()
    );
    std::fs::remove_dir_all(dir).unwrap();
}

#[tokio::test]
async fn missing_file_is_not_found_over_grpc() {
    let (_namenode, namenode_addr) = start_namenode(1).await;
    let client = RSDFSClient::connect(RSDFSConfig::new(namenode_addr))
        .await
        .unwrap();

    let err = assert_err!(client.get_bytes("/never/written").await);
    assert!(matches!(err, DFSError::NotFound(_)));
}

#[tokio::test]
async fn too_few_datanodes_fails_put_without_commit() {
    let dir = test_dir("insufficient");
    let (namenode, namenode_addr) = start_namenode(3).await;
    let _datanodes = vec![
        start_datanode(&namenode_addr, "dn-1", &dir).await,
        start_datanode(&namenode_addr, "dn-2", &dir).await,
    ];
    let client = RSDFSClient::connect(RSDFSConfig::new(namenode_addr))
        .await
        .unwrap();

    let err = assert_err!(client.put_bytes(patterned(5000), "/f").await);
    assert!(matches!(err, DFSError::InsufficientReplicas(_)));
    assert!(matches!(
        namenode.lookup_file("/f"),
        Err(DFSError::NotFound(_))
    ));
    std::fs::remove_dir_all(dir).unwrap();
}

#[tokio::test]
async fn registration_is_idempotent_over_grpc() {
    let (namenode, namenode_addr) = start_namenode(1).await;
    let mut client = DataNodeNameNodeServiceClient::connect(format!("http://{}", namenode_addr))
        .await
        .unwrap();

    let request = RegistrationRequest {
        datanode_id: "dn-1".to_string(),
        addr: "127.0.0.1:50010".to_string(),
    };
    let first = assert_ok!(client.register_with_namenode(request.clone()).await);
    let second = assert_ok!(client.register_with_namenode(request).await);

    assert_eq!(first.into_inner().status(), RegistrationStatus::Registered);
    assert_eq!(second.into_inner().status(), RegistrationStatus::Exists);
    assert_eq!(namenode.datanode_summaries().unwrap().len(), 1);

    let missing_id = RegistrationRequest {
        datanode_id: String::new(),
        addr: "127.0.0.1:50011".to_string(),
    };
    assert_err!(client.register_with_namenode(missing_id).await);
}

#[tokio::test]
async fn block_report_replaces_inventory() {
    let (namenode, namenode_addr) = start_namenode(1).await;
    let mut client = DataNodeNameNodeServiceClient::connect(format!("http://{}", namenode_addr))
        .await
        .unwrap();
    assert_ok!(
        client
            .register_with_namenode(RegistrationRequest {
                datanode_id: "dn-1".to_string(),
                addr: "127.0.0.1:50010".to_string(),
            })
            .await
    );

    for block_ids in [vec!["a", "b"], vec!["b"]] {
        assert_ok!(
            client
                .send_block_report(BlockReportRequest {
                    datanode_id: "dn-1".to_string(),
                    block_ids: block_ids.into_iter().map(String::from).collect(),
                })
                .await
        );
    }

    let record = namenode.registry.get("dn-1").unwrap().unwrap();
    assert_eq!(record.blocks.len(), 1);
    assert!(record.blocks.contains("b"));
}

#[tokio::test]
async fn unreachable_holders_make_reads_fail_until_they_report() {
    let dir = test_dir("liveness");
    let (namenode, namenode_addr) = start_namenode(1).await;
    let datanodes = vec![start_datanode(&namenode_addr, "dn-1", &dir).await];
    let client = RSDFSClient::connect(RSDFSConfig::new(namenode_addr))
        .await
        .unwrap();

    assert_ok!(client.put_bytes(patterned(4000), "/f").await);
    report_all(&datanodes).await;

    assert_ok!(namenode.check_liveness(Instant::now() + Duration::from_secs(31)));
    assert_eq!(
        namenode.registry.get("dn-1").unwrap().unwrap().status,
        NodeStatus::Unreachable
    );
    let err = assert_err!(client.get_bytes("/f").await);
    assert!(matches!(err, DFSError::ReplicaUnavailable(_)));
    let err = assert_err!(client.put_bytes(patterned(10), "/g").await);
    assert!(matches!(err, DFSError::InsufficientReplicas(_)));

    report_all(&datanodes).await;
    assert_eq!(assert_ok!(client.get_bytes("/f").await), patterned(4000));

    let entries = assert_ok!(client.list_datanodes().await);
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].status, "AVAILABLE");
    std::fs::remove_dir_all(dir).unwrap();
}

#[tokio::test]
async fn dead_replica_address_is_replica_unavailable() {
    let (namenode, namenode_addr) = start_namenode(1).await;
    assert_ok!(namenode.register_datanode("ghost", "127.0.0.1:1"));
    assert_ok!(namenode.apply_block_report("ghost", vec!["ghost-block".to_string()]));
    assert_ok!(namenode.commit_file_blocks("/ghost", vec!["ghost-block".to_string()]));

    let client = RSDFSClient::connect(RSDFSConfig::new(namenode_addr))
        .await
        .unwrap();
    let err = assert_err!(client.get_bytes("/ghost").await);
    assert!(matches!(err, DFSError::ReplicaUnavailable(_)));
}

#[tokio::test]
async fn restarted_datanode_reports_blocks_from_disk() {
    let dir = test_dir("restart");
    let (namenode, namenode_addr) = start_namenode(1).await;
    let first = start_datanode(&namenode_addr, "dn-r", &dir).await;
    let client = RSDFSClient::connect(RSDFSConfig::new(namenode_addr.clone()))
        .await
        .unwrap();

    let block_ids = assert_ok!(client.put_bytes(patterned(7000), "/r").await);
    let held_before = first.block_manager.held_blocks().await;

    let (_listener, addr) = bind_ephemeral().await;
    let restarted = DataNode::from_config(DataNodeConfig {
        data_dir: dir.to_string_lossy().to_string(),
        ipc_address: addr,
        namenode_address: namenode_addr,
        block_report_interval: 60_000,
        datanode_id: Some("dn-r".to_string()),
    })
    .await
    .unwrap();

    assert_eq!(restarted.block_manager.held_blocks().await, held_before);
    assert_eq!(
        assert_ok!(restarted.register_with_namenode().await),
        RegistrationStatus::Exists
    );
    assert_ok!(restarted.report_now().await);

    let record = namenode.registry.get("dn-r").unwrap().unwrap();
    assert_eq!(record.blocks.len(), block_ids.len());
    let first_block = assert_ok!(restarted.block_manager.fetch_block(&block_ids[0]).await);
    assert_eq!(first_block, patterned(7000)[..BLOCK_SIZE].to_vec());
    std::fs::remove_dir_all(dir).unwrap();
}

/// In-memory datanodes that answer after a random delay, so block tasks
/// complete out of order.
#[derive(Default)]
struct SlowMemoryTransport {
    stores: Mutex<HashMap<String, HashMap<BlockId, Vec<u8>>>>,
}

impl SlowMemoryTransport {
    async fn jitter() {
        let delay = rand::thread_rng().gen_range(0..25u64);
        tokio::time::sleep(Duration::from_millis(delay)).await;
    }

    fn inventory(&self, datanode_id: &str) -> Vec<BlockId> {
        let stores = self.stores.lock().unwrap();
        stores
            .get(datanode_id)
            .map(|blocks| blocks.keys().cloned().collect())
            .unwrap_or_default()
    }

    fn block(&self, datanode_id: &str, block_id: &str) -> Option<Vec<u8>> {
        let stores = self.stores.lock().unwrap();
        stores
            .get(datanode_id)
            .and_then(|blocks| blocks.get(block_id).cloned())
    }
}

#[async_trait]
impl BlockTransport for SlowMemoryTransport {
    async fn store_block(&self, datanode: &DataNodeInfo, block_id: &str, data: &[u8]) -> Result<()> {
        Self::jitter().await;
        self.stores
            .lock()
            .unwrap()
            .entry(datanode.id.clone())
            .or_default()
            .insert(block_id.to_string(), data.to_vec());
        Ok(())
    }

    async fn fetch_block(&self, datanode: &DataNodeInfo, block_id: &str) -> Result<Vec<u8>> {
        Self::jitter().await;
        self.block(&datanode.id, block_id)
            .ok_or_else(|| DFSError::NotFound(block_id.to_string()))
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn committed_order_follows_byte_order_under_random_delays() {
    let (namenode, namenode_addr) = start_namenode(2).await;
    for id in ["mem-0", "mem-1", "mem-2"] {
        assert_ok!(namenode.register_datanode(id, &format!("{}:0", id)));
    }

    let transport = Arc::new(SlowMemoryTransport::default());
    let metadata: Arc<dyn MetadataService> =
        Arc::new(GrpcMetadataService::connect(&namenode_addr).await.unwrap());
    let mut config = RSDFSConfig::new(namenode_addr);
    config.block_size = 64;
    let client = RSDFSClient::with_services(&config, metadata, transport.clone()).unwrap();

    let data = patterned(64 * 40 + 5);
    let block_ids = assert_ok!(client.put_bytes(data.clone(), "/ordered").await);
    assert_eq!(block_ids.len(), 41);

    for id in ["mem-0", "mem-1", "mem-2"] {
        assert_ok!(namenode.apply_block_report(id, transport.inventory(id)));
    }
    let located = assert_ok!(namenode.lookup_file("/ordered"));
    for (seq, block) in located.iter().enumerate() {
        let holder = &block.datanodes[0];
        let bytes = transport.block(&holder.id, &block.block_id).unwrap();
        let end = usize::min((seq + 1) * 64, data.len());
        assert_eq!(bytes, data[seq * 64..end].to_vec());
    }

    assert_eq!(assert_ok!(client.get_bytes("/ordered").await), data);
}

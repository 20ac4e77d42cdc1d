use std::sync::Arc;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use tokio::net::TcpListener;

use rs_dfs::config::datanode_config::DataNodeConfig;
use rs_dfs::config::namenode_config::NameNodeConfig;
use rs_dfs::config::rsdfs_config::RSDFSConfig;
use rs_dfs::datanode::datanode::DataNode;
use rs_dfs::namenode::namenode::NameNode;
use rs_dfs::rsdfs::client::RSDFSClient;

const LOCALHOST_IPV4: &str = "127.0.0.1";
const DATANODE_DATA_DIR: &str = "bench/datanode";
const DATANODE_IDS: [&str; 3] = ["bench-dn-1", "bench-dn-2", "bench-dn-3"];
const FILE_SIZES: [usize; 3] = [7000, 64 * 1024, 1024 * 1024];

criterion_main!(bench);
criterion_group!(bench, criterion_benchmark);

async fn bind() -> (TcpListener, String) {
    let listener = TcpListener::bind(format!("{}:0", LOCALHOST_IPV4))
        .await
        .expect("Failed to bind bench listener");
    let addr = listener
        .local_addr()
        .expect("Listener has no local address")
        .to_string();
    (listener, addr)
}

/// Starts a namenode (R=2) and three datanodes, returning the namenode address.
async fn start_bench_cluster() -> (String, Vec<Arc<DataNode>>) {
    let (listener, namenode_addr) = bind().await;
    let namenode = Arc::new(
        NameNode::from_config(NameNodeConfig::new(namenode_addr.clone(), 2))
            .expect("Invalid namenode config"),
    );
    tokio::spawn(namenode.serve_with_listener(listener));

    let mut datanodes = vec![];
    for id in DATANODE_IDS {
        let (listener, addr) = bind().await;
        let datanode = Arc::new(
            DataNode::from_config(DataNodeConfig {
                data_dir: DATANODE_DATA_DIR.to_string(),
                ipc_address: addr,
                namenode_address: namenode_addr.clone(),
                block_report_interval: 1000,
                datanode_id: Some(id.to_string()),
            })
            .await
            .expect("Failed to start datanode"),
        );
        datanode.start().await.expect("Datanode registration failed");
        let server = datanode.clone();
        tokio::spawn(async move { server.serve_with_listener(listener).await });
        datanodes.push(datanode);
    }
    (namenode_addr, datanodes)
}

fn criterion_benchmark(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().expect("Failed to create Tokio runtime");
    let (namenode_addr, datanodes) = runtime.block_on(start_bench_cluster());
    let client = runtime
        .block_on(RSDFSClient::connect(RSDFSConfig::new(namenode_addr)))
        .expect("Failed to connect client");

    let mut group = c.benchmark_group("Write Pipeline");
    group.sample_size(20);
    for size in FILE_SIZES {
        let data: Vec<u8> = (0..size).map(|i| (i % 251) as u8).collect();
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &data, |bencher, data| {
            bencher.to_async(&runtime).iter(|| async {
                client
                    .put_bytes(data.clone(), &format!("/bench/put/{}", size))
                    .await
                    .expect("put failed");
            });
        });
    }
    group.finish();

    let mut group = c.benchmark_group("Read Pipeline");
    group.sample_size(20);
    for size in FILE_SIZES {
        let data: Vec<u8> = (0..size).map(|i| (i % 251) as u8).collect();
        let path = format!("/bench/get/{}", size);
        runtime.block_on(async {
            client.put_bytes(data, &path).await.expect("put failed");
            for datanode in datanodes.iter() {
                datanode.report_now().await.expect("block report failed");
            }
        });
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &path, |bencher, path| {
            bencher.to_async(&runtime).iter(|| async {
                client.get_bytes(path).await.expect("get failed");
            });
        });
    }
    group.finish();

    let _ = std::fs::remove_dir_all(DATANODE_DATA_DIR);
}

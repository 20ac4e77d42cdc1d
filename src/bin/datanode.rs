use clap::Parser;
use rs_dfs::config::datanode_config::DataNodeConfig;
use rs_dfs::datanode::datanode::DataNode;
use rs_dfs::error::Result;
use tokio::net::TcpListener;
use tracing::Level;

#[derive(Parser, Debug)]
#[command(author, version, about = "rs_dfs datanode", long_about = None)]
struct Args {
    /// Path to the datanode config (.xml or .toml).
    #[arg(short, long, default_value = "config/datanode.xml")]
    config: String,

    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_max_level(if args.verbose { Level::DEBUG } else { Level::INFO })
        .init();

    let config = DataNodeConfig::from_file(&args.config)?;
    let listener = TcpListener::bind(&config.ipc_address).await?;
    let data_node = DataNode::from_config(config).await?;
    let _reports = data_node.start().await?;

    data_node.serve_with_listener(listener).await
}

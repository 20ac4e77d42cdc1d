use std::sync::Arc;

use clap::Parser;
use rs_dfs::config::namenode_config::NameNodeConfig;
use rs_dfs::error::Result;
use rs_dfs::namenode::namenode::NameNode;
use tokio::net::TcpListener;
use tracing::Level;

#[derive(Parser, Debug)]
#[command(author, version, about = "rs_dfs namenode", long_about = None)]
struct Args {
    /// Path to the namenode config (.xml or .toml).
    #[arg(short, long, default_value = "config/namenode.xml")]
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

    let config = NameNodeConfig::from_file(&args.config)?;
    let listener = TcpListener::bind(&config.ipc_address).await?;
    let name_node = Arc::new(NameNode::from_config(config)?);

    let _liveness = name_node.start_liveness_monitor();
    name_node.serve_with_listener(listener).await
}

use std::io::Write;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use rs_dfs::config::rsdfs_config::RSDFSConfig;
use rs_dfs::error::Result;
use rs_dfs::rsdfs::client::{Client, RSDFSClient};
use tracing::Level;

#[derive(Parser, Debug)]
#[command(author, version, about = "rs_dfs client", long_about = None)]
struct Cli {
    /// Path to the client config (.xml or .toml).
    #[arg(short, long, default_value = "config/rsdfs.xml")]
    config: String,

    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Copy a local file into the file system.
    Put {
        #[arg(short, long)]
        src: PathBuf,
        #[arg(short, long)]
        dst: String,
    },
    /// Read a file, to stdout or to a local path.
    Get {
        #[arg(short, long)]
        fp: String,
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// List committed files.
    Ls {
        #[arg(short, long, default_value = "")]
        prefix: String,
    },
    /// Show every datanode the namenode knows about.
    Nodes,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();
    tracing_subscriber::fmt()
        .with_max_level(if args.verbose { Level::DEBUG } else { Level::WARN })
        .with_writer(std::io::stderr)
        .init();

    let config = RSDFSConfig::from_file(&args.config)?;
    let client = RSDFSClient::connect(config).await?;

    match &args.command {
        Commands::Put { src, dst } => {
            let block_ids = client.put(src, dst).await?;
            println!("{} written in {} blocks", dst, block_ids.len());
        }
        Commands::Get { fp, out: Some(out) } => {
            client.get(fp, out).await?;
        }
        Commands::Get { fp, out: None } => {
            let data = client.get_bytes(fp).await?;
            std::io::stdout().write_all(&data)?;
        }
        Commands::Ls { prefix } => {
            for (path, block_count) in client.list_files(prefix).await? {
                println!("{}\t{}", block_count, path);
            }
        }
        Commands::Nodes => {
            for datanode in client.list_datanodes().await? {
                println!(
                    "{}\t{}\t{}\t{}",
                    datanode.datanode_id, datanode.addr, datanode.status, datanode.block_count
                );
            }
        }
    }
    Ok(())
}

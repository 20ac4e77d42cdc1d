pub mod block;
pub mod config;
pub mod datanode;
pub mod error;
pub mod namenode;
pub mod rsdfs;
pub mod proto {
    tonic::include_proto!("rs_dfs.proto");
}

#[cfg(test)]
mod tests;

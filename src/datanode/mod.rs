pub mod block_manager;
pub mod block_report;
pub mod datanode;
pub mod storage;

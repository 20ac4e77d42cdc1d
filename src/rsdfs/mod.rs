pub mod client;
pub mod read_pipeline;
pub mod transport;
pub mod write_pipeline;

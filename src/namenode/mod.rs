pub mod file_map;
pub mod namenode;
pub mod registry;

use crate::block::BlockId;
use crate::error::{DFSError, Result};

use std::collections::HashMap;

use std::sync::RwLock;

/// Central data-structure used by the NameNode to track which blocks make up each file.
pub struct FileMap {
    // Maps a file path to its blocks in byte order.
    files: RwLock<HashMap<String, Vec<BlockId>>>,
}

impl Default for FileMap {
    fn default() -> Self {
        Self::new()
    }
}

impl FileMap {
    pub fn new() -> Self {
        FileMap {
            files: RwLock::new(HashMap::new()),
        }
    }

    /// Records the block list of a file, replacing any earlier version.
    pub fn commit(&self, path: String, block_ids: Vec<BlockId>) -> Result<Option<Vec<BlockId>>> {
        let mut files_guard = self
            .files
            .write()
            .map_err(|_| DFSError::LockError(String::from("Failed to acquire write lock")))?;
        Ok(files_guard.insert(path, block_ids))
    }

    /// Retrieves the ordered block list of a file.
    pub fn get(&self, path: &str) -> Result<Vec<BlockId>> {
        let files_guard = self
            .files
            .read()
            .map_err(|_| DFSError::LockError(String::from("Failed to acquire read lock")))?;

        match files_guard.get(path) {
            None => Err(DFSError::NotFound(format!("File {} does not exist", path))),
            Some(block_ids) => Ok(block_ids.clone()),
        }
    }

    /// Paths starting with `prefix` and their block counts, sorted by path.
    pub fn list(&self, prefix: &str) -> Result<Vec<(String, usize)>> {
        let files_guard = self
            .files
            .read()
            .map_err(|_| DFSError::LockError(String::from("Failed to acquire read lock")))?;
        let mut entries: Vec<(String, usize)> = files_guard
            .iter()
            .filter(|(path, _)| path.starts_with(prefix))
            .map(|(path, block_ids)| (path.clone(), block_ids.len()))
            .collect();
        entries.sort();
        Ok(entries)
    }
}

//! Storage configuration

use crate::storage::{BlobStore, FileStore, LoggingStore, MemoryStore};
use std::path::PathBuf;
use std::sync::Arc;

pub const STORE_DIR_ENV: &str = "PHOENIX_CHAT_STORE_DIR";

/// Selects the blob store conversations are persisted to
#[derive(Debug, Clone, Default)]
pub struct ChatConfig {
    /// Directory for the filesystem store; in-memory when unset
    pub store_dir: Option<PathBuf>,
}

impl ChatConfig {
    pub fn from_env() -> Self {
        Self {
            store_dir: std::env::var(STORE_DIR_ENV)
                .ok()
                .filter(|dir| !dir.is_empty())
                .map(PathBuf::from),
        }
    }

    pub fn build_store(&self) -> Arc<dyn BlobStore> {
        match &self.store_dir {
            Some(dir) => {
                tracing::debug!(dir = %dir.display(), "Using filesystem store");
                Arc::new(LoggingStore::new(Arc::new(FileStore::new(dir)), "file"))
            }
            None => {
                tracing::debug!("Using in-memory store");
                Arc::new(LoggingStore::new(Arc::new(MemoryStore::new()), "memory"))
            }
        }
    }
}

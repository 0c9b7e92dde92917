//! In-memory transport (for testing)

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;

use crate::error::{StorageError, StorageResult};
use crate::traits::{ContentStat, ContentTransport, UploadReceipt, content_id_for};

/// In-memory transport for unit tests
///
/// Thread-safe via `RwLock`. Not persistent, data lost on drop.
#[derive(Default)]
pub struct InMemoryTransport {
    blobs: RwLock<HashMap<String, Vec<u8>>>,
}

impl InMemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Vec<u8>>> {
        self.blobs.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Vec<u8>>> {
        self.blobs.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of stored blobs
    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total bytes stored
    pub fn total_size(&self) -> usize {
        self.read().values().map(|v| v.len()).sum()
    }

    pub fn clear(&self) {
        self.write().clear();
    }
}

#[async_trait]
impl ContentTransport for InMemoryTransport {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn upload(&self, data: &[u8]) -> StorageResult<UploadReceipt> {
        let hash = blake3::hash(data);
        let content_id = content_id_for(data);
        self.write().insert(content_id.clone(), data.to_vec());

        Ok(UploadReceipt {
            content_id,
            size: data.len() as u64,
            hash: *hash.as_bytes(),
        })
    }

    async fn download(&self, content_id: &str) -> StorageResult<Vec<u8>> {
        self.read()
            .get(content_id)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(content_id.to_string()))
    }

    async fn exists(&self, content_id: &str) -> StorageResult<bool> {
        Ok(self.read().contains_key(content_id))
    }

    async fn stat(&self, content_id: &str) -> StorageResult<ContentStat> {
        self.read()
            .get(content_id)
            .map(|blob| ContentStat {
                size: blob.len() as u64,
                content_type: None,
            })
            .ok_or_else(|| StorageError::NotFound(content_id.to_string()))
    }
}

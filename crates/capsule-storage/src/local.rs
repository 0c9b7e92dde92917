//! Local filesystem transport

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use blake3::Hash;
use tokio::fs;

use crate::error::{StorageError, StorageResult};
use crate::traits::{ContentStat, ContentTransport, UploadReceipt, hash_from_base58, hash_to_base58};

/// Algorithm prefix for Blake3 content ids
const HASH_ALG_PREFIX: &str = "b3";

/// Local filesystem transport
///
/// Stores blobs as files named by their base58 hash with algorithm prefix.
/// Structure: `{root}/content/b3/{hash_base58}`
#[derive(Clone, Debug)]
pub struct LocalFileTransport {
    root: PathBuf,
}

impl LocalFileTransport {
    /// Create a transport rooted at the given directory
    ///
    /// Creates the directory structure if it doesn't exist.
    pub async fn new(root: impl AsRef<Path>) -> StorageResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(root.join("content").join(HASH_ALG_PREFIX)).await?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn blob_path(&self, hash: &Hash) -> PathBuf {
        self.root
            .join("content")
            .join(HASH_ALG_PREFIX)
            .join(hash_to_base58(hash))
    }

    /// Content ids double as file names, so they are parsed before any path is built
    fn parse_id(content_id: &str) -> StorageResult<Hash> {
        hash_from_base58(content_id).ok_or_else(|| StorageError::InvalidContentId(content_id.to_string()))
    }
}

#[async_trait]
impl ContentTransport for LocalFileTransport {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn upload(&self, data: &[u8]) -> StorageResult<UploadReceipt> {
        let hash = blake3::hash(data);
        let path = self.blob_path(&hash);

        // Partial writes never appear under a content id
        let tmp = path.with_extension("partial");
        fs::write(&tmp, data).await?;
        fs::rename(&tmp, &path).await?;

        tracing::debug!(path = %path.display(), size = data.len(), "Stored blob");
        Ok(UploadReceipt {
            content_id: hash_to_base58(&hash),
            size: data.len() as u64,
            hash: *hash.as_bytes(),
        })
    }

    async fn download(&self, content_id: &str) -> StorageResult<Vec<u8>> {
        let hash = Self::parse_id(content_id)?;
        match fs::read(self.blob_path(&hash)).await {
            Ok(data) => {
                // Verify on read
                let computed = blake3::hash(&data);
                if computed != hash {
                    return Err(StorageError::HashMismatch {
                        expected: content_id.to_string(),
                        actual: hash_to_base58(&computed),
                    });
                }
                Ok(data)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(content_id.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn exists(&self, content_id: &str) -> StorageResult<bool> {
        let hash = Self::parse_id(content_id)?;
        Ok(fs::try_exists(self.blob_path(&hash)).await?)
    }

    async fn stat(&self, content_id: &str) -> StorageResult<ContentStat> {
        let hash = Self::parse_id(content_id)?;
        match fs::metadata(self.blob_path(&hash)).await {
            Ok(meta) => Ok(ContentStat {
                size: meta.len(),
                content_type: None,
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(content_id.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }
}

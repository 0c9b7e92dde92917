//! Transport trait definitions

use async_trait::async_trait;
use blake3::Hash;

use crate::error::StorageResult;

/// Encode a Blake3 hash as base58 (compact, readable)
pub fn hash_to_base58(hash: &Hash) -> String {
    bs58::encode(hash.as_bytes()).into_string()
}

/// Decode base58 to Blake3 hash
pub fn hash_from_base58(s: &str) -> Option<Hash> {
    let bytes = bs58::decode(s).into_vec().ok()?;
    let arr: [u8; 32] = bytes.try_into().ok()?;
    Some(Hash::from(arr))
}

/// Content id used by the hash-addressed backends: base58(blake3(blob))
pub fn content_id_for(data: &[u8]) -> String {
    hash_to_base58(&blake3::hash(data))
}

/// What the transport hands back after a successful upload
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UploadReceipt {
    pub content_id: String,
    pub size: u64,
    /// BLAKE3 of the uploaded blob (not of any plaintext)
    pub hash: [u8; 32],
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ContentStat {
    pub size: u64,
    pub content_type: Option<String>,
}

/// Content-addressed blob transport
///
/// Blobs are opaque. Uploading identical bytes twice yields the same id.
#[async_trait]
pub trait ContentTransport: Send + Sync {
    /// Human-readable backend name
    fn name(&self) -> &'static str;

    /// Store a blob and return its content id
    async fn upload(&self, data: &[u8]) -> StorageResult<UploadReceipt>;

    /// Fetch a blob by content id
    ///
    /// Returns `StorageError::NotFound` if the blob doesn't exist.
    async fn download(&self, content_id: &str) -> StorageResult<Vec<u8>>;

    async fn exists(&self, content_id: &str) -> StorageResult<bool>;

    async fn stat(&self, content_id: &str) -> StorageResult<ContentStat>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base58_roundtrip() {
        let hash = blake3::hash(b"base58");
        let encoded = hash_to_base58(&hash);
        assert_eq!(hash_from_base58(&encoded), Some(hash));
        assert_eq!(content_id_for(b"base58"), encoded);
    }

    #[test]
    fn test_base58_rejects_garbage() {
        assert_eq!(hash_from_base58("0OIl"), None);
        assert_eq!(hash_from_base58(&bs58::encode([1u8; 16]).into_string()), None);
        assert_eq!(hash_from_base58("../../etc/passwd"), None);
    }
}

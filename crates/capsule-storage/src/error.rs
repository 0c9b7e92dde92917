use capsule_core::CoreError;
use thiserror::Error;

/// Transport-level failures (the blob never made it, or came back wrong)
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Content not found: {0}")]
    NotFound(String),

    #[error("Hash mismatch: expected {expected}, got {actual}")]
    HashMismatch { expected: String, actual: String },

    #[error("Invalid content id: {0}")]
    InvalidContentId(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Backend error: {0}")]
    Backend(String),

    #[cfg(feature = "ipfs")]
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Failures of the encrypted store, one variant per failure class
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Transport error: {0}")]
    Transport(#[from] StorageError),

    /// Wrong key, wrong context or tampered ciphertext
    #[error("Integrity check failed: {0}")]
    Integrity(String),

    /// Decrypted plaintext does not match the recorded content hash
    #[error("Content hash mismatch: expected {expected}, got {actual}")]
    HashMismatch { expected: String, actual: String },

    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Crypto error: {0}")]
    Crypto(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

impl From<CoreError> for StoreError {
    fn from(e: CoreError) -> Self {
        match e {
            CoreError::Integrity(msg) => StoreError::Integrity(msg),
            CoreError::MalformedFrame(msg) => StoreError::MalformedFrame(msg),
            CoreError::InvalidLength { .. } | CoreError::Hex(_) => {
                StoreError::InvalidInput(e.to_string())
            }
            CoreError::Encryption(msg) | CoreError::KeyDerivation(msg) => StoreError::Crypto(msg),
        }
    }
}

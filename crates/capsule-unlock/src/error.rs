use capsule_storage::StoreError;
use thiserror::Error;

/// Failures reported by the chain collaborator
#[derive(Error, Debug)]
pub enum ChainError {
    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type ChainResult<T> = Result<T, ChainError>;

/// Everything that can stop a capsule operation
///
/// Integrity and hash failures stay distinct from `ConditionsNotMet` so a
/// caller can tell tampering apart from "not yet".
#[derive(Error, Debug)]
pub enum UnlockError {
    #[error("Capsule not found: {0}")]
    CapsuleNotFound(String),

    #[error("Invalid capsule: {0}")]
    InvalidCapsule(String),

    #[error("Unlock conditions not met: {0}")]
    ConditionsNotMet(String),

    #[error("Transaction failed: {0}")]
    TransactionFailed(String),

    #[error("Chain error: {0}")]
    Chain(ChainError),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Integrity check failed: {0}")]
    Integrity(String),

    #[error("Content hash mismatch: expected {expected}, got {actual}")]
    HashMismatch { expected: String, actual: String },

    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    #[error("Missing key material: {0}")]
    MissingKeyMaterial(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

pub type UnlockResult<T> = Result<T, UnlockError>;

impl UnlockError {
    /// Stable machine-readable name
    pub fn kind(&self) -> &'static str {
        match self {
            UnlockError::CapsuleNotFound(_) => "capsule_not_found",
            UnlockError::InvalidCapsule(_) => "invalid_capsule",
            UnlockError::ConditionsNotMet(_) => "conditions_not_met",
            UnlockError::TransactionFailed(_) => "transaction_failed",
            UnlockError::Chain(_) => "chain",
            UnlockError::Transport(_) => "transport",
            UnlockError::Integrity(_) => "integrity",
            UnlockError::HashMismatch { .. } => "hash_mismatch",
            UnlockError::MalformedFrame(_) => "malformed_frame",
            UnlockError::MissingKeyMaterial(_) => "missing_key_material",
            UnlockError::InvalidInput(_) => "invalid_input",
        }
    }
}

impl UnlockError {
    /// Transport and RPC failures may succeed when tried again; nothing else will
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            UnlockError::Transport(_) | UnlockError::Chain(ChainError::Rpc(_) | ChainError::Io(_))
        )
    }
}

impl From<ChainError> for UnlockError {
    fn from(e: ChainError) -> Self {
        match e {
            ChainError::NotFound(id) => UnlockError::CapsuleNotFound(id),
            other => UnlockError::Chain(other),
        }
    }
}

impl From<StoreError> for UnlockError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Transport(inner) => UnlockError::Transport(inner.to_string()),
            StoreError::Integrity(msg) => UnlockError::Integrity(msg),
            StoreError::HashMismatch { expected, actual } => UnlockError::HashMismatch { expected, actual },
            StoreError::MalformedFrame(msg) => UnlockError::MalformedFrame(msg),
            StoreError::InvalidInput(msg) | StoreError::Crypto(msg) => UnlockError::InvalidInput(msg),
        }
    }
}

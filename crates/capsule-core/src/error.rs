use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    /// AEAD tag verification failed: wrong key, wrong context or corrupted bytes
    #[error("Integrity check failed: {0}")]
    Integrity(String),

    #[error("Invalid {field} length: expected {expected} bytes, got {actual}")]
    InvalidLength {
        field: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    #[error("Encryption failed: {0}")]
    Encryption(String),

    #[error("Key derivation failed: {0}")]
    KeyDerivation(String),

    #[error("Invalid hex: {0}")]
    Hex(#[from] hex::FromHexError),
}

pub type CoreResult<T> = Result<T, CoreError>;

impl CoreError {
    pub(crate) fn length(field: &'static str, expected: usize, actual: usize) -> Self {
        CoreError::InvalidLength {
            field,
            expected,
            actual,
        }
    }
}

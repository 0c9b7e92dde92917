//! BLAKE3 content fingerprints (the hash recorded on-chain)

use crate::error::{CoreError, CoreResult};

pub const HASH_LEN: usize = 32;

/// Compute BLAKE3 hash of content
pub fn hash_content(content: &[u8]) -> [u8; HASH_LEN] {
    *blake3::hash(content).as_bytes()
}

/// Verify that content matches the expected hash
pub fn verify_content_hash(content: &[u8], expected: &[u8; HASH_LEN]) -> bool {
    blake3::hash(content) == blake3::Hash::from(*expected)
}

pub fn hash_to_hex(hash: &[u8; HASH_LEN]) -> String {
    hex::encode(hash)
}

/// Parse a 64-character hex digest (optional `0x` prefix)
pub fn hash_from_hex(s: &str) -> CoreResult<[u8; HASH_LEN]> {
    let s = s.strip_prefix("0x").unwrap_or(s);
    let bytes = hex::decode(s)?;
    bytes
        .as_slice()
        .try_into()
        .map_err(|_| CoreError::length("hash", HASH_LEN, bytes.len()))
}

//! Binary framing for stored payloads
//!
//! Wire layout (all lengths little-endian `u32`):
//!
//! ```text
//! nonce_len | nonce | ciphertext_len | ciphertext | metadata_len | metadata (UTF-8 JSON)
//! ```
//!
//! This is the only bit-exact format the engine owns. Other implementations
//! read and write the same bytes, so the layout must not change.

use serde::{Deserialize, Serialize};

use crate::cipher::NONCE_LEN;
use crate::error::{CoreError, CoreResult};

/// Metadata travelling alongside the ciphertext (JSON keys are camelCase)
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayloadMetadata {
    pub original_size: u32,
    pub content_type: String,
    pub timestamp: u64,
}

/// Sealed content plus metadata, as stored at the transport
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncryptedPayload {
    pub nonce: [u8; NONCE_LEN],
    pub ciphertext: Vec<u8>,
    pub metadata: PayloadMetadata,
}

impl EncryptedPayload {
    /// Serialize to the framed wire layout
    pub fn to_bytes(&self) -> CoreResult<Vec<u8>> {
        let metadata = serde_json::to_vec(&self.metadata)
            .map_err(|e| CoreError::MalformedFrame(format!("metadata encoding: {e}")))?;

        let mut out = Vec::with_capacity(12 + NONCE_LEN + self.ciphertext.len() + metadata.len());
        write_section(&mut out, "nonce", &self.nonce)?;
        write_section(&mut out, "ciphertext", &self.ciphertext)?;
        write_section(&mut out, "metadata", &metadata)?;
        Ok(out)
    }

    /// Parse the framed wire layout
    pub fn from_bytes(blob: &[u8]) -> CoreResult<Self> {
        let mut reader = FrameReader::new(blob);

        let nonce_bytes = reader.section("nonce")?;
        let nonce: [u8; NONCE_LEN] = nonce_bytes.try_into().map_err(|_| {
            CoreError::MalformedFrame(format!(
                "nonce must be {NONCE_LEN} bytes, frame declares {}",
                nonce_bytes.len()
            ))
        })?;
        let ciphertext = reader.section("ciphertext")?.to_vec();
        let metadata_bytes = reader.section("metadata")?;

        if reader.remaining() != 0 {
            return Err(CoreError::MalformedFrame(format!(
                "{} trailing bytes after metadata",
                reader.remaining()
            )));
        }

        let metadata_str = std::str::from_utf8(metadata_bytes)
            .map_err(|e| CoreError::MalformedFrame(format!("metadata is not UTF-8: {e}")))?;
        let metadata: PayloadMetadata = serde_json::from_str(metadata_str)
            .map_err(|e| CoreError::MalformedFrame(format!("metadata is not valid JSON: {e}")))?;

        Ok(Self {
            nonce,
            ciphertext,
            metadata,
        })
    }
}

/// Frame a payload into one opaque blob
pub fn frame(payload: &EncryptedPayload) -> CoreResult<Vec<u8>> {
    payload.to_bytes()
}

/// Parse a blob produced by [`frame`]
pub fn unframe(blob: &[u8]) -> CoreResult<EncryptedPayload> {
    EncryptedPayload::from_bytes(blob)
}

fn write_section(out: &mut Vec<u8>, name: &str, bytes: &[u8]) -> CoreResult<()> {
    let len = u32::try_from(bytes.len())
        .map_err(|_| CoreError::MalformedFrame(format!("{name} exceeds u32 length prefix")))?;
    out.extend(len.to_le_bytes());
    out.extend(bytes);
    Ok(())
}

struct FrameReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> FrameReader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn take(&mut self, n: usize, what: &str) -> CoreResult<&'a [u8]> {
        if n > self.remaining() {
            return Err(CoreError::MalformedFrame(format!(
                "{what} needs {n} bytes, only {} remain",
                self.remaining()
            )));
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn section(&mut self, name: &str) -> CoreResult<&'a [u8]> {
        let prefix = self.take(4, &format!("{name} length"))?;
        let len = u32::from_le_bytes([prefix[0], prefix[1], prefix[2], prefix[3]]) as usize;
        self.take(len, name)
    }
}

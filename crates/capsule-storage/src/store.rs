//! Encrypted content store
//!
//! `plaintext -> seal -> frame -> upload` and back. Two key models:
//!
//! - **Random key**: the caller keeps the key, associated data is empty.
//! - **Wallet key**: the key is re-derived from a [`KeyContext`] and a public
//!   salt, and the context encoding is authenticated as associated data, so a
//!   wrong address, capsule id or unlock time fails closed.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use capsule_core::{
    AuthenticatedCipher, EncryptedPayload, HASH_LEN, KeyContext, KeyDerivation, KeyMaterial, NONCE_LEN,
    PayloadMetadata, SALT_LEN, SymmetricKey, XChaCha20Poly1305Cipher, frame, generate_salt, hash_content,
    hash_to_hex, unframe, verify_content_hash,
};
use tracing::{debug, warn};

use crate::error::{StoreError, StoreResult};
use crate::traits::{ContentStat, ContentTransport};

/// Where a sealed payload landed
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredContent {
    pub content_id: String,
    /// BLAKE3 of the plaintext, recorded on-chain
    pub content_hash: [u8; HASH_LEN],
    /// Size of the framed blob at the transport
    pub size: u64,
    pub nonce: [u8; NONCE_LEN],
}

/// Result of a wallet-mode store: everything needed to reproduce the key, minus the key
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WalletStored {
    pub content: StoredContent,
    pub salt: [u8; SALT_LEN],
    pub key_derivation: KeyDerivation,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Retrieved {
    pub plaintext: Vec<u8>,
    pub metadata: PayloadMetadata,
    pub nonce: [u8; NONCE_LEN],
}

/// Seals, frames and ships payloads through a [`ContentTransport`]
///
/// Holds no per-call state; clones share the transport and cipher.
#[derive(Clone)]
pub struct EncryptedStore {
    transport: Arc<dyn ContentTransport>,
    cipher: Arc<dyn AuthenticatedCipher>,
    key_derivation: KeyDerivation,
}

impl EncryptedStore {
    /// Store over `transport` with XChaCha20-Poly1305 and BLAKE3 key derivation
    pub fn new(transport: Arc<dyn ContentTransport>) -> Self {
        Self {
            transport,
            cipher: Arc::new(XChaCha20Poly1305Cipher),
            key_derivation: KeyDerivation::default(),
        }
    }

    pub fn with_cipher(mut self, cipher: Arc<dyn AuthenticatedCipher>) -> Self {
        self.cipher = cipher;
        self
    }

    pub fn with_key_derivation(mut self, key_derivation: KeyDerivation) -> Self {
        self.key_derivation = key_derivation;
        self
    }

    pub fn key_derivation(&self) -> KeyDerivation {
        self.key_derivation
    }

    pub fn transport(&self) -> &Arc<dyn ContentTransport> {
        &self.transport
    }

    /// Encrypt under a fresh random key
    ///
    /// The returned [`KeyMaterial`] is the only copy of the key.
    pub async fn store(&self, plaintext: &[u8], content_type: &str) -> StoreResult<(StoredContent, KeyMaterial)> {
        let key = SymmetricKey::generate();
        let stored = self.seal_and_upload(plaintext, content_type, &key, &[]).await?;
        Ok((
            stored,
            KeyMaterial {
                key,
                salt: generate_salt(),
            },
        ))
    }

    /// Encrypt under a caller-supplied key
    pub async fn store_with_key(
        &self,
        plaintext: &[u8],
        content_type: &str,
        key: &SymmetricKey,
    ) -> StoreResult<StoredContent> {
        self.seal_and_upload(plaintext, content_type, key, &[]).await
    }

    /// Download, verify and decrypt with an explicit key
    ///
    /// With `expected_hash`, the plaintext must hash to it or the call fails
    /// with `HashMismatch`.
    pub async fn retrieve(
        &self,
        content_id: &str,
        key: &SymmetricKey,
        expected_hash: Option<&[u8; HASH_LEN]>,
    ) -> StoreResult<Retrieved> {
        self.download_and_open(content_id, key, &[], expected_hash).await
    }

    /// Encrypt under a key derived from the wallet context and a fresh salt
    pub async fn store_with_wallet(
        &self,
        plaintext: &[u8],
        content_type: &str,
        context: &KeyContext,
    ) -> StoreResult<WalletStored> {
        let salt = generate_salt();
        let key = self.key_derivation.derive(context, &salt)?;
        let content = self
            .seal_and_upload(plaintext, content_type, &key, &context.encode()?)
            .await?;

        Ok(WalletStored {
            content,
            salt,
            key_derivation: self.key_derivation,
        })
    }

    /// Re-derive the wallet key and decrypt
    pub async fn retrieve_with_wallet(
        &self,
        content_id: &str,
        context: &KeyContext,
        salt: &[u8; SALT_LEN],
        expected_hash: Option<&[u8; HASH_LEN]>,
    ) -> StoreResult<Retrieved> {
        let key = self.key_derivation.derive(context, salt)?;
        self.download_and_open(content_id, &key, &context.encode()?, expected_hash)
            .await
    }

    pub async fn exists(&self, content_id: &str) -> StoreResult<bool> {
        Ok(self.transport.exists(content_id).await?)
    }

    pub async fn stat(&self, content_id: &str) -> StoreResult<ContentStat> {
        Ok(self.transport.stat(content_id).await?)
    }

    async fn seal_and_upload(
        &self,
        plaintext: &[u8],
        content_type: &str,
        key: &SymmetricKey,
        aad: &[u8],
    ) -> StoreResult<StoredContent> {
        let original_size = u32::try_from(plaintext.len())
            .map_err(|_| StoreError::InvalidInput(format!("content of {} bytes exceeds 4 GiB", plaintext.len())))?;

        let sealed = self.cipher.seal(key, plaintext, aad)?;
        let payload = EncryptedPayload {
            nonce: sealed.nonce,
            ciphertext: sealed.ciphertext,
            metadata: PayloadMetadata {
                original_size,
                content_type: content_type.to_string(),
                timestamp: now_ms(),
            },
        };
        let blob = frame(&payload)?;
        let receipt = self.transport.upload(&blob).await?;

        debug!(
            content_id = %receipt.content_id,
            transport = self.transport.name(),
            cipher = self.cipher.name(),
            size = receipt.size,
            "Stored encrypted payload"
        );

        Ok(StoredContent {
            content_id: receipt.content_id,
            content_hash: hash_content(plaintext),
            size: receipt.size,
            nonce: payload.nonce,
        })
    }

    async fn download_and_open(
        &self,
        content_id: &str,
        key: &SymmetricKey,
        aad: &[u8],
        expected_hash: Option<&[u8; HASH_LEN]>,
    ) -> StoreResult<Retrieved> {
        let blob = self.transport.download(content_id).await?;
        let payload = unframe(&blob)?;
        let plaintext = self.cipher.open(key, &payload.nonce, &payload.ciphertext, aad)?;

        if let Some(expected) = expected_hash {
            if !verify_content_hash(&plaintext, expected) {
                return Err(StoreError::HashMismatch {
                    expected: hash_to_hex(expected),
                    actual: hash_to_hex(&hash_content(&plaintext)),
                });
            }
        }

        if payload.metadata.original_size as usize != plaintext.len() {
            warn!(
                content_id,
                declared = payload.metadata.original_size,
                actual = plaintext.len(),
                "Frame metadata size disagrees with plaintext"
            );
        }

        Ok(Retrieved {
            plaintext,
            metadata: payload.metadata,
            nonce: payload.nonce,
        })
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

//! Authenticated encryption with XChaCha20-Poly1305
//!
//! There is deliberately no unauthenticated fallback: every `open` either
//! verifies the Poly1305 tag or fails with [`CoreError::Integrity`].

use chacha20poly1305::{
    XChaCha20Poly1305, XNonce,
    aead::{Aead, KeyInit, Payload},
};
use rand::{RngCore, rngs::OsRng};

use crate::error::{CoreError, CoreResult};
use crate::kdf::SymmetricKey;

pub const NONCE_LEN: usize = 24;
pub const TAG_LEN: usize = 16;

/// Ciphertext (tag appended) and the nonce it was sealed under
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Sealed {
    pub ciphertext: Vec<u8>,
    pub nonce: [u8; NONCE_LEN],
}

/// Authenticated cipher capability
///
/// Implementations must fail closed: a wrong key, wrong associated data or any
/// modified ciphertext/nonce byte is an `Integrity` error.
pub trait AuthenticatedCipher: Send + Sync {
    /// Human-readable name
    fn name(&self) -> &'static str;

    /// Encrypt under a freshly generated nonce
    fn seal(&self, key: &SymmetricKey, plaintext: &[u8], aad: &[u8]) -> CoreResult<Sealed>;

    /// Decrypt and verify
    fn open(
        &self,
        key: &SymmetricKey,
        nonce: &[u8; NONCE_LEN],
        ciphertext: &[u8],
        aad: &[u8],
    ) -> CoreResult<Vec<u8>>;
}

/// XChaCha20-Poly1305 (192-bit nonces, safe for random generation)
#[derive(Clone, Copy, Debug, Default)]
pub struct XChaCha20Poly1305Cipher;

impl AuthenticatedCipher for XChaCha20Poly1305Cipher {
    fn name(&self) -> &'static str {
        "XChaCha20-Poly1305"
    }

    fn seal(&self, key: &SymmetricKey, plaintext: &[u8], aad: &[u8]) -> CoreResult<Sealed> {
        let nonce = generate_nonce();
        let cipher = XChaCha20Poly1305::new(key.as_bytes().into());
        let ciphertext = cipher
            .encrypt(
                XNonce::from_slice(&nonce),
                Payload {
                    msg: plaintext,
                    aad,
                },
            )
            .map_err(|e| CoreError::Encryption(e.to_string()))?;

        Ok(Sealed { ciphertext, nonce })
    }

    fn open(
        &self,
        key: &SymmetricKey,
        nonce: &[u8; NONCE_LEN],
        ciphertext: &[u8],
        aad: &[u8],
    ) -> CoreResult<Vec<u8>> {
        if ciphertext.len() < TAG_LEN {
            return Err(CoreError::Integrity(format!(
                "ciphertext shorter than {TAG_LEN}-byte tag"
            )));
        }

        let cipher = XChaCha20Poly1305::new(key.as_bytes().into());
        cipher
            .decrypt(
                XNonce::from_slice(nonce),
                Payload {
                    msg: ciphertext,
                    aad,
                },
            )
            .map_err(|_| CoreError::Integrity("tag verification failed (wrong key or tampered data)".into()))
    }
}

/// Fresh random nonce from the OS RNG
pub fn generate_nonce() -> [u8; NONCE_LEN] {
    let mut nonce = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce);
    nonce
}

/// Parse a nonce, rejecting anything that is not exactly 24 bytes
pub fn nonce_from_slice(bytes: &[u8]) -> CoreResult<[u8; NONCE_LEN]> {
    bytes
        .try_into()
        .map_err(|_| CoreError::length("nonce", NONCE_LEN, bytes.len()))
}

/// Encrypt with the default cipher and no associated data
pub fn encrypt(plaintext: &[u8], key: &SymmetricKey) -> CoreResult<Sealed> {
    XChaCha20Poly1305Cipher.seal(key, plaintext, &[])
}

/// Decrypt with the default cipher and no associated data
pub fn decrypt(ciphertext: &[u8], nonce: &[u8; NONCE_LEN], key: &SymmetricKey) -> CoreResult<Vec<u8>> {
    XChaCha20Poly1305Cipher.open(key, nonce, ciphertext, &[])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encrypt_decrypt() {
        let key = SymmetricKey::generate();
        let plaintext = b"This is a secret message!";

        let sealed = encrypt(plaintext, &key).unwrap();
        assert_ne!(&sealed.ciphertext[..plaintext.len()], plaintext);
        assert_eq!(sealed.ciphertext.len(), plaintext.len() + TAG_LEN);

        let decrypted = decrypt(&sealed.ciphertext, &sealed.nonce, &key).unwrap();
        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn test_nonces_differ() {
        let key = SymmetricKey::generate();
        let a = encrypt(b"same", &key).unwrap();
        let b = encrypt(b"same", &key).unwrap();
        assert_ne!(a.nonce, b.nonce);
        assert_ne!(a.ciphertext, b.ciphertext);
    }

    #[test]
    fn test_wrong_key_fails_closed() {
        let sealed = encrypt(b"payload", &SymmetricKey::generate()).unwrap();
        let result = decrypt(&sealed.ciphertext, &sealed.nonce, &SymmetricKey::generate());
        assert!(matches!(result, Err(CoreError::Integrity(_))));
    }

    #[test]
    fn test_tampered_ciphertext_detected() {
        let key = SymmetricKey::generate();
        let mut sealed = encrypt(b"Integrity test", &key).unwrap();
        sealed.ciphertext[0] ^= 0x01;

        let result = decrypt(&sealed.ciphertext, &sealed.nonce, &key);
        assert!(matches!(result, Err(CoreError::Integrity(_))));
    }

    #[test]
    fn test_tampered_nonce_detected() {
        let key = SymmetricKey::generate();
        let mut sealed = encrypt(b"Integrity test", &key).unwrap();
        sealed.nonce[23] ^= 0x80;

        let result = decrypt(&sealed.ciphertext, &sealed.nonce, &key);
        assert!(matches!(result, Err(CoreError::Integrity(_))));
    }

    #[test]
    fn test_associated_data_bound() {
        let key = SymmetricKey::generate();
        let cipher = XChaCha20Poly1305Cipher;
        let sealed = cipher.seal(&key, b"bound", b"context-a").unwrap();

        assert_eq!(
            cipher.open(&key, &sealed.nonce, &sealed.ciphertext, b"context-a").unwrap(),
            b"bound"
        );
        assert!(matches!(
            cipher.open(&key, &sealed.nonce, &sealed.ciphertext, b"context-b"),
            Err(CoreError::Integrity(_))
        ));
    }

    #[test]
    fn test_empty_plaintext() {
        let key = SymmetricKey::generate();
        let sealed = encrypt(b"", &key).unwrap();
        assert_eq!(sealed.ciphertext.len(), TAG_LEN);
        assert!(decrypt(&sealed.ciphertext, &sealed.nonce, &key).unwrap().is_empty());
    }

    #[test]
    fn test_truncated_ciphertext_rejected() {
        let key = SymmetricKey::generate();
        let result = decrypt(&[0u8; 5], &[0u8; NONCE_LEN], &key);
        assert!(matches!(result, Err(CoreError::Integrity(_))));
        assert!(nonce_from_slice(&[0u8; 12]).is_err());
    }
}

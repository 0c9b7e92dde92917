//! # capsule-core: Wallet-bound encryption primitives for time capsules
//!
//! - **Key derivation**: capsule keys are re-derived from
//!   `(wallet address, capsule id, unlock time, salt)` and never persisted
//! - **Authenticated encryption**: XChaCha20-Poly1305, failing closed on any
//!   wrong key, wrong context or tampered byte
//! - **Framing**: the length-prefixed blob layout stored at the content transport
//!
//! ## Example
//!
//! ```rust
//! use capsule_core::{KeyContext, KeyDerivation, cipher, generate_salt};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let ctx = KeyContext::new("0xabc", "cap-1", 1_700_000_000_000);
//! let salt = generate_salt();
//! let key = KeyDerivation::Blake3.derive(&ctx, &salt)?;
//!
//! let sealed = cipher::encrypt(b"Hello, capsule!", &key)?;
//! let plaintext = cipher::decrypt(&sealed.ciphertext, &sealed.nonce, &key)?;
//! assert_eq!(&plaintext[..], b"Hello, capsule!");
//! # Ok(())
//! # }
//! ```

pub mod cipher;
pub mod error;
pub mod frame;
pub mod hash;
pub mod kdf;

// Re-exports for convenience
pub use cipher::{AuthenticatedCipher, NONCE_LEN, Sealed, XChaCha20Poly1305Cipher};
pub use error::{CoreError, CoreResult};
pub use frame::{EncryptedPayload, PayloadMetadata, frame, unframe};
pub use hash::{HASH_LEN, hash_content, hash_from_hex, hash_to_hex, verify_content_hash};
pub use kdf::{
    KEY_LEN, KeyContext, KeyDerivation, KeyMaterial, SALT_LEN, SymmetricKey, generate_salt,
};

//! Wallet-bound key derivation
//!
//! A capsule key is never stored. It is re-derived on demand from the owner's
//! wallet address, the capsule's key id, its unlock time and a public salt.

use std::fmt;
use std::str::FromStr;

use argon2::{Algorithm, Argon2, Params, Version};
use rand::{RngCore, rngs::OsRng};
use zeroize::Zeroizing;

use crate::error::{CoreError, CoreResult};

pub const KEY_LEN: usize = 32;
pub const SALT_LEN: usize = 32;

/// BLAKE3 derive-key context. Changing this string changes every derived key.
const BLAKE3_CONTEXT: &str = "capsule-vault 2024-06-01 wallet content key v1";

/// 256-bit symmetric key, zeroized on drop
#[derive(Clone)]
pub struct SymmetricKey(Zeroizing<[u8; KEY_LEN]>);

impl SymmetricKey {
    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self(Zeroizing::new(bytes))
    }

    /// Wrong-length input is a hard error, never truncated or padded.
    pub fn from_slice(bytes: &[u8]) -> CoreResult<Self> {
        let arr: [u8; KEY_LEN] = bytes
            .try_into()
            .map_err(|_| CoreError::length("key", KEY_LEN, bytes.len()))?;
        Ok(Self::from_bytes(arr))
    }

    /// Fresh random key from the OS RNG
    pub fn generate() -> Self {
        let mut key = Zeroizing::new([0u8; KEY_LEN]);
        OsRng.fill_bytes(key.as_mut());
        Self(key)
    }

    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

impl PartialEq for SymmetricKey {
    fn eq(&self, other: &Self) -> bool {
        self.0[..] == other.0[..]
    }
}

impl Eq for SymmetricKey {}

impl fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SymmetricKey(<redacted>)")
    }
}

/// Fresh random salt for one encryption
pub fn generate_salt() -> [u8; SALT_LEN] {
    let mut salt = [0u8; SALT_LEN];
    OsRng.fill_bytes(&mut salt);
    salt
}

/// Parse a salt, rejecting anything that is not exactly 32 bytes
pub fn salt_from_slice(bytes: &[u8]) -> CoreResult<[u8; SALT_LEN]> {
    bytes
        .try_into()
        .map_err(|_| CoreError::length("salt", SALT_LEN, bytes.len()))
}

/// Key plus the salt needed to reproduce (or describe) it
#[derive(Clone, Debug)]
pub struct KeyMaterial {
    pub key: SymmetricKey,
    pub salt: [u8; SALT_LEN],
}

/// Public inputs a capsule key is bound to
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeyContext {
    pub wallet_address: String,
    pub capsule_id: String,
    pub unlock_time_ms: u64,
}

impl KeyContext {
    pub fn new(
        wallet_address: impl Into<String>,
        capsule_id: impl Into<String>,
        unlock_time_ms: u64,
    ) -> Self {
        Self {
            wallet_address: wallet_address.into(),
            capsule_id: capsule_id.into(),
            unlock_time_ms,
        }
    }

    /// Canonical encoding, used as KDF input and as AEAD associated data.
    ///
    /// Layout: `u32 len | address | u32 len | capsule id | u64 unlock time`,
    /// all little-endian. The address is trimmed and lower-cased first.
    /// Fields longer than `u32::MAX` bytes are rejected.
    pub fn encode(&self) -> CoreResult<Vec<u8>> {
        let address = normalize_address(&self.wallet_address);
        let capsule_id = self.capsule_id.as_bytes();

        let mut out = Vec::with_capacity(4 + address.len() + 4 + capsule_id.len() + 8);
        out.extend(length_prefix("wallet address", address.len())?);
        out.extend(address.as_bytes());
        out.extend(length_prefix("capsule id", capsule_id.len())?);
        out.extend(capsule_id);
        out.extend(self.unlock_time_ms.to_le_bytes());
        Ok(out)
    }
}

fn length_prefix(field: &str, len: usize) -> CoreResult<[u8; 4]> {
    u32::try_from(len)
        .map(u32::to_le_bytes)
        .map_err(|_| CoreError::KeyDerivation(format!("{field} exceeds u32 length prefix ({len} bytes)")))
}

fn normalize_address(address: &str) -> String {
    address.trim().to_ascii_lowercase()
}

/// Key-derivation algorithm. Part of the tuple needed to reproduce a key.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum KeyDerivation {
    /// BLAKE3 in derive-key mode (fast, default)
    #[default]
    Blake3,
    /// Argon2id with explicit cost parameters
    Argon2id {
        memory_kib: u32,
        iterations: u32,
        parallelism: u32,
    },
}

impl KeyDerivation {
    /// Derive the capsule key. Same inputs always produce the same key.
    pub fn derive(&self, context: &KeyContext, salt: &[u8; SALT_LEN]) -> CoreResult<SymmetricKey> {
        match *self {
            KeyDerivation::Blake3 => derive_blake3(context, salt),
            KeyDerivation::Argon2id {
                memory_kib,
                iterations,
                parallelism,
            } => {
                let params = Params::new(memory_kib, iterations, parallelism, Some(KEY_LEN))
                    .map_err(|e| CoreError::KeyDerivation(format!("Invalid Argon2 parameters: {e:?}")))?;
                let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);
                let mut key = Zeroizing::new([0u8; KEY_LEN]);
                argon2
                    .hash_password_into(&context.encode()?, salt, key.as_mut())
                    .map_err(|e| CoreError::KeyDerivation(format!("Argon2 failed: {e:?}")))?;
                Ok(SymmetricKey(key))
            }
        }
    }
}

fn derive_blake3(context: &KeyContext, salt: &[u8; SALT_LEN]) -> CoreResult<SymmetricKey> {
    let mut hasher = blake3::Hasher::new_derive_key(BLAKE3_CONTEXT);
    hasher.update(&context.encode()?);
    hasher.update(salt);
    Ok(SymmetricKey::from_bytes(*hasher.finalize().as_bytes()))
}

impl fmt::Display for KeyDerivation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyDerivation::Blake3 => f.write_str("blake3"),
            KeyDerivation::Argon2id {
                memory_kib,
                iterations,
                parallelism,
            } => write!(f, "argon2id-m{memory_kib}-t{iterations}-p{parallelism}"),
        }
    }
}

impl FromStr for KeyDerivation {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "blake3" {
            return Ok(KeyDerivation::Blake3);
        }

        let invalid = || CoreError::KeyDerivation(format!("Unknown key derivation '{s}'"));
        let rest = s.strip_prefix("argon2id-").ok_or_else(invalid)?;
        let mut parts = rest.split('-');
        let mut next = |prefix: char| -> CoreResult<u32> {
            parts
                .next()
                .and_then(|p| p.strip_prefix(prefix))
                .and_then(|p| p.parse().ok())
                .ok_or_else(invalid)
        };
        let memory_kib = next('m')?;
        let iterations = next('t')?;
        let parallelism = next('p')?;
        if parts.next().is_some() {
            return Err(invalid());
        }

        Ok(KeyDerivation::Argon2id {
            memory_kib,
            iterations,
            parallelism,
        })
    }
}

//! capsule-storage: Content-addressed transports and the encrypted store
//!
//! Transports move opaque blobs; [`EncryptedStore`] turns plaintext into a
//! sealed, framed blob on the way in and verifies everything on the way out.
//!
//! ## Backends
//!
//! | Backend              | Use Case                  | Feature Flag |
//! |----------------------|---------------------------|--------------|
//! | `InMemoryTransport`  | Unit tests                | (always)     |
//! | `LocalFileTransport` | CLI default, integration  | (always)     |
//! | `IpfsTransport`      | IPFS HTTP API             | `ipfs`       |
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use capsule_core::KeyContext;
//! use capsule_storage::{EncryptedStore, InMemoryTransport};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = EncryptedStore::new(Arc::new(InMemoryTransport::new()));
//!     let ctx = KeyContext::new("0xabc", "cap-1", 1_700_000_000_000);
//!
//!     let stored = store.store_with_wallet(b"secret", "text/plain", &ctx).await?;
//!     let out = store
//!         .retrieve_with_wallet(&stored.content.content_id, &ctx, &stored.salt, Some(&stored.content.content_hash))
//!         .await?;
//!     assert_eq!(out.plaintext, b"secret");
//!     Ok(())
//! }
//! ```

mod error;
mod traits;

mod local;
mod memory;
mod store;

#[cfg(feature = "ipfs")]
mod ipfs;

// Re-exports
pub use error::{StorageError, StorageResult, StoreError, StoreResult};
pub use traits::{ContentStat, ContentTransport, UploadReceipt, content_id_for, hash_from_base58, hash_to_base58};

pub use local::LocalFileTransport;
pub use memory::InMemoryTransport;
pub use store::{EncryptedStore, Retrieved, StoredContent, WalletStored};

#[cfg(feature = "ipfs")]
pub use ipfs::IpfsTransport;

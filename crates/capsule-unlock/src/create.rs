//! Capsule creation and multisig approval

use std::sync::Arc;

use capsule_core::{KeyContext, SALT_LEN, SymmetricKey};
use capsule_storage::{EncryptedStore, StoredContent};
use tracing::{info, warn};
use uuid::Uuid;

use crate::capsule::{Capsule, UnlockCondition};
use crate::chain::{ChainClient, ConditionSpec, NewCapsule, TransactionSpec};
use crate::config::EngineConfig;
use crate::error::{UnlockError, UnlockResult};
use crate::resolve::{ObjectResolution, resolve_created_object};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum KeyMode {
    /// Key re-derivable from the owner's wallet; only the salt is recorded
    #[default]
    Wallet,
    /// Fresh random key handed back to the caller
    Random,
}

#[derive(Clone, Debug)]
pub struct CreateRequest {
    pub content: Vec<u8>,
    pub content_type: String,
    pub condition: ConditionSpec,
    pub key_mode: KeyMode,
    /// Wallet-mode key id; a UUID v4 is generated when absent
    pub key_derivation_id: Option<String>,
}

impl CreateRequest {
    pub fn new(content: impl Into<Vec<u8>>, content_type: impl Into<String>, condition: ConditionSpec) -> Self {
        Self {
            content: content.into(),
            content_type: content_type.into(),
            condition,
            key_mode: KeyMode::Wallet,
            key_derivation_id: None,
        }
    }

    pub fn with_random_key(mut self) -> Self {
        self.key_mode = KeyMode::Random;
        self
    }

    pub fn with_key_derivation_id(mut self, id: impl Into<String>) -> Self {
        self.key_derivation_id = Some(id.into());
        self
    }
}

#[derive(Clone, Debug)]
pub struct CreatedCapsule {
    /// Object id, or the transaction digest when resolution degraded
    pub capsule_id: String,
    pub resolution: ObjectResolution,
    pub transaction_digest: String,
    pub content: StoredContent,
    /// Random-key mode only: the sole copy of the key
    pub key: Option<SymmetricKey>,
    pub salt: Option<[u8; SALT_LEN]>,
    pub key_derivation_id: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ApprovalReceipt {
    pub capsule_id: String,
    pub transaction_digest: String,
    pub current: u32,
    pub required: u32,
}

/// Encrypts content and records new capsules on chain
#[derive(Clone)]
pub struct CapsuleCreator {
    chain: Arc<dyn ChainClient>,
    store: EncryptedStore,
    config: EngineConfig,
}

impl CapsuleCreator {
    pub fn new(chain: Arc<dyn ChainClient>, store: EncryptedStore, config: EngineConfig) -> Self {
        Self { chain, store, config }
    }

    pub async fn create(&self, request: CreateRequest) -> UnlockResult<CreatedCapsule> {
        request.condition.validate()?;

        let mut salt = None;
        let mut key = None;
        let mut key_derivation = None;
        let mut key_derivation_id = None;

        let content = match request.key_mode {
            KeyMode::Wallet => {
                let id = request
                    .key_derivation_id
                    .unwrap_or_else(|| Uuid::new_v4().to_string());
                let context = KeyContext::new(self.chain.sender(), id.as_str(), request.condition.key_unlock_time_ms());
                let stored = self
                    .store
                    .store_with_wallet(&request.content, &request.content_type, &context)
                    .await?;

                salt = Some(stored.salt);
                key_derivation = Some(stored.key_derivation.to_string());
                key_derivation_id = Some(id);
                stored.content
            }
            KeyMode::Random => {
                let (stored, material) = self.store.store(&request.content, &request.content_type).await?;
                key = Some(material.key);
                stored
            }
        };

        let tx = TransactionSpec::CreateCapsule(NewCapsule {
            content_id: content.content_id.clone(),
            content_hash: content.content_hash,
            condition: request.condition,
            nonce: Some(content.nonce),
            key_derivation_salt: salt,
            key_derivation,
            key_derivation_id: key_derivation_id.clone(),
        });

        let result = self.chain.submit_transaction(&tx).await?;
        if !result.success {
            return Err(UnlockError::TransactionFailed(
                result.error_message.unwrap_or_else(|| "no error detail".into()),
            ));
        }

        let resolution =
            resolve_created_object(self.chain.as_ref(), &result, &self.config.capsule_object_type, &self.config).await;
        if resolution.is_degraded() {
            warn!(digest = %result.digest, "Capsule created but its object id is unknown");
        }
        info!(capsule_id = %resolution.id(), content_id = %content.content_id, "Capsule created");

        Ok(CreatedCapsule {
            capsule_id: resolution.id().to_string(),
            resolution,
            transaction_digest: result.digest,
            content,
            key,
            salt,
            key_derivation_id,
        })
    }

    /// Add the sender's approval to a multisig capsule
    pub async fn approve(&self, capsule_id: &str) -> UnlockResult<ApprovalReceipt> {
        let capsule = Capsule::from_object(&self.chain.read_object(capsule_id).await?)?;
        if capsule.unlocked {
            return Err(UnlockError::InvalidInput(format!("capsule {capsule_id} is already unlocked")));
        }
        if !matches!(capsule.condition, UnlockCondition::Multisig { .. }) {
            return Err(UnlockError::InvalidInput(format!(
                "capsule {capsule_id} has a {} condition, not multisig",
                capsule.condition.kind()
            )));
        }

        let result = self
            .chain
            .submit_transaction(&TransactionSpec::Approve {
                capsule_id: capsule_id.to_string(),
            })
            .await?;
        if !result.success {
            return Err(UnlockError::TransactionFailed(
                result.error_message.unwrap_or_else(|| "no error detail".into()),
            ));
        }
        info!(capsule_id, digest = %result.digest, "Approval submitted");

        let refreshed = Capsule::from_object(&self.chain.read_object(capsule_id).await?)?;
        let (current, required) = match refreshed.condition {
            UnlockCondition::Multisig { threshold, approvers } => {
                (u32::try_from(approvers.len()).unwrap_or(u32::MAX), threshold)
            }
            _ => (0, 0),
        };

        Ok(ApprovalReceipt {
            capsule_id: capsule_id.to_string(),
            transaction_digest: result.digest,
            current,
            required,
        })
    }
}

//! End-to-end unlock flow
//!
//! fetch capsule -> evaluate -> submit unlock -> resolve created object ->
//! retrieve and verify content. A capsule that is already unlocked skips
//! straight to retrieval.

use std::fmt;
use std::sync::Arc;

use capsule_core::SymmetricKey;
use capsule_storage::{EncryptedStore, Retrieved};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::capsule::{Capsule, UnlockCondition};
use crate::chain::{ChainClient, TransactionSpec};
use crate::clock::Clock;
use crate::config::EngineConfig;
use crate::error::{UnlockError, UnlockResult};
use crate::evaluate::{UnlockStatus, evaluate};
use crate::resolve::{ObjectResolution, resolve_created_object};

/// How the content key is obtained
#[derive(Clone, Debug)]
pub enum KeySource {
    /// Re-derive from the sender's wallet address and the capsule's salt
    Wallet,
    /// Random-key capsule; the caller holds the key
    Explicit(SymmetricKey),
}

#[derive(Clone, Debug)]
pub struct UnlockRequest {
    pub capsule_id: String,
    pub key: KeySource,
    /// Amount attached to a payment unlock
    pub payment: Option<u64>,
}

impl UnlockRequest {
    pub fn wallet(capsule_id: impl Into<String>) -> Self {
        Self {
            capsule_id: capsule_id.into(),
            key: KeySource::Wallet,
            payment: None,
        }
    }

    pub fn with_key(mut self, key: SymmetricKey) -> Self {
        self.key = KeySource::Explicit(key);
        self
    }

    pub fn with_payment(mut self, amount: u64) -> Self {
        self.payment = Some(amount);
        self
    }
}

/// Stage of the unlock flow
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UnlockStage {
    FetchCapsule,
    Evaluate,
    SubmitTransaction,
    ResolveObject,
    Retrieve,
    Complete,
}

impl fmt::Display for UnlockStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            UnlockStage::FetchCapsule => "fetch_capsule",
            UnlockStage::Evaluate => "evaluate",
            UnlockStage::SubmitTransaction => "submit_transaction",
            UnlockStage::ResolveObject => "resolve_object",
            UnlockStage::Retrieve => "retrieve",
            UnlockStage::Complete => "complete",
        })
    }
}

/// Decrypted capsule content
#[derive(Clone, Debug)]
pub struct UnlockedCapsule {
    pub capsule_id: String,
    pub content_id: String,
    pub content_type: String,
    pub content: Vec<u8>,
    /// `None` when the capsule was already unlocked
    pub transaction_digest: Option<String>,
    pub unlocked_object: Option<ObjectResolution>,
}

/// A failed unlock: which stage, why, and any transaction already on chain
#[derive(Error, Debug)]
#[error("{stage} failed: {error}")]
pub struct UnlockFailure {
    pub stage: UnlockStage,
    #[source]
    pub error: UnlockError,
    /// Set when the unlock transaction landed before the failure
    pub transaction_digest: Option<String>,
}

/// Flattened, serializable result of one unlock attempt
#[derive(Clone, Debug, Serialize)]
pub struct UnlockOutcome {
    pub success: bool,
    pub stage: UnlockStage,
    pub error_kind: Option<String>,
    pub error: Option<String>,
    pub capsule_id: String,
    pub content_id: Option<String>,
    pub content_type: Option<String>,
    pub transaction_digest: Option<String>,
    pub unlocked_object: Option<ObjectResolution>,
    #[serde(skip)]
    pub content: Option<Vec<u8>>,
}

impl UnlockOutcome {
    pub fn from_result(capsule_id: &str, result: Result<UnlockedCapsule, UnlockFailure>) -> Self {
        match result {
            Ok(unlocked) => Self {
                success: true,
                stage: UnlockStage::Complete,
                error_kind: None,
                error: None,
                capsule_id: unlocked.capsule_id,
                content_id: Some(unlocked.content_id),
                content_type: Some(unlocked.content_type),
                transaction_digest: unlocked.transaction_digest,
                unlocked_object: unlocked.unlocked_object,
                content: Some(unlocked.content),
            },
            Err(failure) => Self {
                success: false,
                stage: failure.stage,
                error_kind: Some(failure.error.kind().to_string()),
                error: Some(failure.error.to_string()),
                capsule_id: capsule_id.to_string(),
                content_id: None,
                content_type: None,
                transaction_digest: failure.transaction_digest,
                unlocked_object: None,
                content: None,
            },
        }
    }
}

/// Capsule snapshot plus its evaluated status
#[derive(Clone, Debug, Serialize)]
pub struct CapsuleStatus {
    pub capsule: Capsule,
    pub status: UnlockStatus,
}

/// Drives capsule unlocks against a chain and an encrypted store
///
/// Stateless between calls; clones share the collaborators.
#[derive(Clone)]
pub struct UnlockOrchestrator {
    chain: Arc<dyn ChainClient>,
    store: EncryptedStore,
    clock: Arc<dyn Clock>,
    config: EngineConfig,
}

impl UnlockOrchestrator {
    pub fn new(chain: Arc<dyn ChainClient>, store: EncryptedStore, clock: Arc<dyn Clock>, config: EngineConfig) -> Self {
        Self {
            chain,
            store,
            clock,
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Fetch and parse a capsule
    pub async fn fetch(&self, capsule_id: &str) -> UnlockResult<Capsule> {
        let object = self.chain.read_object(capsule_id).await?;
        Capsule::from_object(&object)
    }

    /// Current snapshot and evaluated status
    pub async fn status(&self, capsule_id: &str) -> UnlockResult<CapsuleStatus> {
        let capsule = self.fetch(capsule_id).await?;
        let status = evaluate(&capsule.condition, capsule.unlocked, self.clock.now_ms());
        Ok(CapsuleStatus { capsule, status })
    }

    /// Capsules owned by `owner`; unreadable or unparseable objects are skipped
    pub async fn list(&self, owner: &str) -> UnlockResult<Vec<CapsuleStatus>> {
        let now = self.clock.now_ms();
        let mut out = Vec::new();

        for id in self.chain.owned_objects(owner).await? {
            let object = match self.chain.read_object(&id).await {
                Ok(object) => object,
                Err(e) => {
                    warn!(object_id = %id, error = %e, "Skipping unreadable object");
                    continue;
                }
            };
            if !object.object_type.ends_with(&self.config.capsule_object_type) {
                continue;
            }
            match Capsule::from_object(&object) {
                Ok(capsule) => {
                    let status = evaluate(&capsule.condition, capsule.unlocked, now);
                    out.push(CapsuleStatus { capsule, status });
                }
                Err(e) => warn!(object_id = %id, error = %e, "Skipping unparseable capsule"),
            }
        }

        out.sort_by(|a, b| a.capsule.created_at.cmp(&b.capsule.created_at));
        Ok(out)
    }

    /// Run one unlock, returning the flattened outcome
    pub async fn unlock_outcome(&self, request: &UnlockRequest) -> UnlockOutcome {
        UnlockOutcome::from_result(&request.capsule_id, self.unlock(request).await)
    }

    /// Run one unlock
    pub async fn unlock(&self, request: &UnlockRequest) -> Result<UnlockedCapsule, UnlockFailure> {
        let fail = |stage: UnlockStage, error: UnlockError, transaction_digest: Option<String>| UnlockFailure {
            stage,
            error,
            transaction_digest,
        };

        let capsule = self
            .fetch(&request.capsule_id)
            .await
            .map_err(|e| fail(UnlockStage::FetchCapsule, e, None))?;
        debug!(capsule_id = %capsule.id, condition = capsule.condition.kind(), unlocked = capsule.unlocked, "Fetched capsule");

        let mut transaction_digest = None;
        let mut unlocked_object = None;

        if capsule.unlocked {
            debug!(capsule_id = %capsule.id, "Already unlocked, retrieving content");
        } else {
            let tx = self
                .unlock_transaction(&capsule, request.payment)
                .map_err(|e| fail(UnlockStage::Evaluate, e, None))?;

            let result = self
                .chain
                .submit_transaction(&tx)
                .await
                .map_err(|e| fail(UnlockStage::SubmitTransaction, e.into(), None))?;
            if !result.success {
                let reason = result.error_message.unwrap_or_else(|| "no error detail".into());
                return Err(fail(
                    UnlockStage::SubmitTransaction,
                    UnlockError::TransactionFailed(reason),
                    Some(result.digest),
                ));
            }
            info!(capsule_id = %capsule.id, digest = %result.digest, tx = tx.name(), "Unlock transaction submitted");

            let resolution =
                resolve_created_object(self.chain.as_ref(), &result, &self.config.unlock_object_type, &self.config)
                    .await;
            transaction_digest = Some(result.digest);
            unlocked_object = Some(resolution);
        }

        let retrieved = self
            .retrieve(&capsule, &request.key)
            .await
            .map_err(|e| fail(UnlockStage::Retrieve, e, transaction_digest.clone()))?;

        Ok(UnlockedCapsule {
            capsule_id: capsule.id,
            content_id: capsule.content_id,
            content_type: retrieved.metadata.content_type,
            content: retrieved.plaintext,
            transaction_digest,
            unlocked_object,
        })
    }

    /// Evaluate and build the condition-specific unlock transaction
    fn unlock_transaction(&self, capsule: &Capsule, payment: Option<u64>) -> UnlockResult<TransactionSpec> {
        let capsule_id = capsule.id.clone();
        let status = evaluate(&capsule.condition, capsule.unlocked, self.clock.now_ms());

        match &capsule.condition {
            // The unlock transaction itself carries the payment
            UnlockCondition::Payment { price, .. } => match payment {
                Some(amount) if status.can_unlock || amount >= *price => {
                    Ok(TransactionSpec::UnlockPayment { capsule_id, amount })
                }
                _ if status.can_unlock => Ok(TransactionSpec::UnlockPayment { capsule_id, amount: 0 }),
                _ => Err(UnlockError::ConditionsNotMet(status.message)),
            },
            _ if !status.can_unlock => Err(UnlockError::ConditionsNotMet(status.message)),
            UnlockCondition::Time { .. } => Ok(TransactionSpec::UnlockTime { capsule_id }),
            UnlockCondition::Multisig { .. } => Ok(TransactionSpec::UnlockMultisig { capsule_id }),
            UnlockCondition::Unknown { .. } => Err(UnlockError::ConditionsNotMet(status.message)),
        }
    }

    async fn retrieve(&self, capsule: &Capsule, key: &KeySource) -> UnlockResult<Retrieved> {
        let expected = Some(&capsule.content_hash);
        let retrieved = match key {
            KeySource::Explicit(key) => self.store.retrieve(&capsule.content_id, key, expected).await?,
            KeySource::Wallet => {
                let salt = capsule.key_derivation_salt.as_ref().ok_or_else(|| {
                    UnlockError::MissingKeyMaterial(format!(
                        "capsule {} has no key derivation salt; supply its key",
                        capsule.id
                    ))
                })?;
                let store = match capsule.key_derivation {
                    Some(kdf) => self.store.clone().with_key_derivation(kdf),
                    None => self.store.clone(),
                };
                let context = capsule.key_context(&self.chain.sender());
                store
                    .retrieve_with_wallet(&capsule.content_id, &context, salt, expected)
                    .await?
            }
        };

        if let Some(recorded) = capsule.nonce {
            if recorded != retrieved.nonce {
                return Err(UnlockError::Integrity(
                    "payload nonce does not match the nonce recorded on chain".into(),
                ));
            }
        }

        Ok(retrieved)
    }
}

//! Chain collaborator contract
//!
//! The engine only needs "submit a transaction, get a digest and its object
//! changes" and "read an object as a field map". Signing, gas and transaction
//! building live behind the trait.

use std::collections::BTreeSet;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{ChainResult, UnlockError, UnlockResult};

/// Raw on-chain field map
pub type Fields = serde_json::Map<String, serde_json::Value>;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "address", rename_all = "snake_case")]
pub enum ObjectOwner {
    Shared,
    Address(String),
    Immutable,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    Created,
    Mutated,
    Deleted,
}

/// One entry of a transaction's object-change list
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectChange {
    pub change_type: ChangeType,
    pub object_id: String,
    pub object_type: String,
    pub owner: ObjectOwner,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChainObject {
    pub object_id: String,
    pub object_type: String,
    pub owner: ObjectOwner,
    pub fields: Fields,
}

/// Outcome of a submitted transaction
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TransactionResult {
    pub digest: String,
    pub success: bool,
    /// May be empty right after submission if effects are not indexed yet
    pub object_changes: Vec<ObjectChange>,
    pub error_message: Option<String>,
}

/// Condition as declared when a capsule is created
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConditionSpec {
    Time { unlock_at_ms: u64 },
    /// `approvers` restricts who may approve; empty means anyone
    Multisig { threshold: u32, approvers: BTreeSet<String> },
    Payment { price: u64 },
}

impl ConditionSpec {
    pub fn validate(&self) -> UnlockResult<()> {
        match self {
            ConditionSpec::Time { .. } => Ok(()),
            ConditionSpec::Multisig { threshold, .. } if *threshold == 0 => Err(UnlockError::InvalidInput(
                "multisig threshold must be at least 1".into(),
            )),
            ConditionSpec::Multisig { threshold, approvers }
                if !approvers.is_empty() && *threshold as usize > approvers.len() =>
            {
                Err(UnlockError::InvalidInput(format!(
                    "threshold {threshold} exceeds the {} listed approvers",
                    approvers.len()
                )))
            }
            ConditionSpec::Multisig { .. } => Ok(()),
            ConditionSpec::Payment { price: 0 } => {
                Err(UnlockError::InvalidInput("payment price must be greater than zero".into()))
            }
            ConditionSpec::Payment { .. } => Ok(()),
        }
    }

    /// Unlock time mixed into wallet key derivation (0 for non-time conditions)
    pub fn key_unlock_time_ms(&self) -> u64 {
        match self {
            ConditionSpec::Time { unlock_at_ms } => *unlock_at_ms,
            _ => 0,
        }
    }
}

/// Payload of a capsule-creation transaction
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewCapsule {
    pub content_id: String,
    pub content_hash: [u8; 32],
    pub condition: ConditionSpec,
    pub nonce: Option<[u8; 24]>,
    pub key_derivation_salt: Option<[u8; 32]>,
    /// Algorithm id, e.g. `blake3`
    pub key_derivation: Option<String>,
    pub key_derivation_id: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "call", rename_all = "snake_case")]
pub enum TransactionSpec {
    CreateCapsule(NewCapsule),
    Approve { capsule_id: String },
    UnlockTime { capsule_id: String },
    UnlockMultisig { capsule_id: String },
    /// Carries the coin amount offered as payment
    UnlockPayment { capsule_id: String, amount: u64 },
}

impl TransactionSpec {
    pub fn name(&self) -> &'static str {
        match self {
            TransactionSpec::CreateCapsule(_) => "create_capsule",
            TransactionSpec::Approve { .. } => "approve",
            TransactionSpec::UnlockTime { .. } => "unlock_time",
            TransactionSpec::UnlockMultisig { .. } => "unlock_multisig",
            TransactionSpec::UnlockPayment { .. } => "unlock_payment",
        }
    }
}

/// Blockchain client used by the engine
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Address transactions are signed as
    fn sender(&self) -> String;

    /// Build, sign and submit a transaction
    ///
    /// A rejected transaction is `Ok` with `success == false`; `Err` means the
    /// submission itself could not be made.
    async fn submit_transaction(&self, tx: &TransactionSpec) -> ChainResult<TransactionResult>;

    /// Read an object's fields
    ///
    /// Returns `ChainError::NotFound` for unknown ids.
    async fn read_object(&self, object_id: &str) -> ChainResult<ChainObject>;

    /// Query the indexed object changes of a past transaction
    async fn transaction_object_changes(&self, digest: &str) -> ChainResult<Vec<ObjectChange>>;

    /// Capsule objects owned by an address
    async fn owned_objects(&self, owner: &str) -> ChainResult<Vec<String>>;
}

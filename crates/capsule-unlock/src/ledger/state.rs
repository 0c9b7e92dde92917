//! Ledger state shared by the in-memory and file-backed ledgers

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::capsule::{Capsule, UnlockCondition};
use crate::chain::{
    ChainObject, ChangeType, ConditionSpec, Fields, NewCapsule, ObjectChange, ObjectOwner, TransactionResult,
    TransactionSpec,
};
use crate::error::{ChainError, ChainResult};

/// Package address the dev ledgers publish their types under
pub const DEV_PACKAGE: &str = "0xca9";

type TxOutcome = Result<Vec<ObjectChange>, String>;

#[derive(Debug, Default, Serialize, Deserialize)]
pub(crate) struct LedgerState {
    sequence: u64,
    objects: BTreeMap<String, ChainObject>,
    transactions: BTreeMap<String, Vec<ObjectChange>>,
}

fn normalize(address: &str) -> String {
    address.trim().to_ascii_lowercase()
}

impl LedgerState {
    /// Execute a transaction; rejected transactions still get a digest
    pub fn apply(&mut self, sender: &str, tx: &TransactionSpec, now_ms: u64) -> TransactionResult {
        self.sequence += 1;
        let digest = self.digest(sender, tx);
        let sender = normalize(sender);

        let outcome = match tx {
            TransactionSpec::CreateCapsule(new) => self.create(&digest, &sender, new, now_ms),
            TransactionSpec::Approve { capsule_id } => self.approve(&sender, capsule_id),
            TransactionSpec::UnlockTime { capsule_id }
            | TransactionSpec::UnlockMultisig { capsule_id }
            | TransactionSpec::UnlockPayment { capsule_id, .. } => {
                self.unlock(&digest, &sender, capsule_id, tx, now_ms)
            }
        };

        match outcome {
            Ok(changes) => {
                self.transactions.insert(digest.clone(), changes.clone());
                TransactionResult {
                    digest,
                    success: true,
                    object_changes: changes,
                    error_message: None,
                }
            }
            Err(message) => {
                self.transactions.insert(digest.clone(), Vec::new());
                TransactionResult {
                    digest,
                    success: false,
                    object_changes: Vec::new(),
                    error_message: Some(message),
                }
            }
        }
    }

    pub fn object(&self, object_id: &str) -> ChainResult<ChainObject> {
        self.objects
            .get(object_id)
            .cloned()
            .ok_or_else(|| ChainError::NotFound(object_id.to_string()))
    }

    pub fn insert_object(&mut self, object: ChainObject) {
        self.objects.insert(object.object_id.clone(), object);
    }

    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    pub fn changes(&self, digest: &str) -> ChainResult<Vec<ObjectChange>> {
        self.transactions
            .get(digest)
            .cloned()
            .ok_or_else(|| ChainError::NotFound(format!("transaction {digest}")))
    }

    /// Capsule ids whose `owner` field matches
    pub fn owned_capsules(&self, owner: &str) -> Vec<String> {
        let owner = normalize(owner);
        self.objects
            .values()
            .filter(|o| o.object_type.ends_with("::capsule::Capsule"))
            .filter(|o| o.fields.get("owner").and_then(Value::as_str).map(normalize).as_deref() == Some(owner.as_str()))
            .map(|o| o.object_id.clone())
            .collect()
    }

    fn digest(&self, sender: &str, tx: &TransactionSpec) -> String {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&self.sequence.to_le_bytes());
        hasher.update(sender.as_bytes());
        hasher.update(&serde_json::to_vec(tx).unwrap_or_default());
        bs58::encode(hasher.finalize().as_bytes()).into_string()
    }

    fn object_id(digest: &str, index: u8) -> String {
        let mut hasher = blake3::Hasher::new();
        hasher.update(digest.as_bytes());
        hasher.update(&[index]);
        format!("0x{}", hex::encode(hasher.finalize().as_bytes()))
    }

    fn create(&mut self, digest: &str, sender: &str, new: &NewCapsule, now_ms: u64) -> TxOutcome {
        new.condition.validate().map_err(|e| e.to_string())?;

        let mut fields = Fields::new();
        fields.insert("owner".into(), json!(sender));
        fields.insert("cid".into(), json!(new.content_id));
        fields.insert("content_hash".into(), json!(new.content_hash.to_vec()));
        fields.insert("created_at".into(), json!(now_ms.to_string()));
        fields.insert("unlocked".into(), json!(false));

        match &new.condition {
            ConditionSpec::Time { unlock_at_ms } => {
                fields.insert("condition_type".into(), json!("time"));
                fields.insert("unlock_time_ms".into(), json!(unlock_at_ms.to_string()));
            }
            ConditionSpec::Multisig { threshold, approvers } => {
                let allowed: Vec<String> = approvers.iter().map(|a| normalize(a)).collect();
                fields.insert("condition_type".into(), json!("multisig"));
                fields.insert("threshold".into(), json!(threshold));
                fields.insert("approvals".into(), json!(Vec::<String>::new()));
                fields.insert("allowed_approvers".into(), json!(allowed));
            }
            ConditionSpec::Payment { price } => {
                fields.insert("condition_type".into(), json!("payment"));
                fields.insert("price".into(), json!(price.to_string()));
                fields.insert("paid".into(), json!(false));
            }
        }

        if let Some(nonce) = new.nonce {
            fields.insert("nonce".into(), json!(nonce.to_vec()));
        }
        if let Some(salt) = new.key_derivation_salt {
            fields.insert("key_derivation_salt".into(), json!(salt.to_vec()));
        }
        if let Some(kdf) = &new.key_derivation {
            fields.insert("key_derivation".into(), json!(kdf));
        }
        if let Some(id) = &new.key_derivation_id {
            fields.insert("key_derivation_id".into(), json!(id));
        }

        let object = ChainObject {
            object_id: Self::object_id(digest, 0),
            object_type: format!("{DEV_PACKAGE}::capsule::Capsule"),
            owner: ObjectOwner::Shared,
            fields,
        };
        let change = ObjectChange {
            change_type: ChangeType::Created,
            object_id: object.object_id.clone(),
            object_type: object.object_type.clone(),
            owner: ObjectOwner::Shared,
        };
        self.insert_object(object);
        Ok(vec![change])
    }

    fn capsule(&self, capsule_id: &str) -> Result<Capsule, String> {
        let object = self.object(capsule_id).map_err(|e| e.to_string())?;
        Capsule::from_object(&object).map_err(|e| e.to_string())
    }

    fn approve(&mut self, sender: &str, capsule_id: &str) -> TxOutcome {
        let capsule = self.capsule(capsule_id)?;
        if capsule.unlocked {
            return Err("capsule already unlocked".into());
        }
        let UnlockCondition::Multisig { approvers, .. } = &capsule.condition else {
            return Err("capsule is not a multisig capsule".into());
        };
        if approvers.contains(sender) {
            return Err(format!("{sender} already approved"));
        }

        let object = self
            .objects
            .get_mut(capsule_id)
            .ok_or_else(|| format!("object {capsule_id} vanished"))?;

        let allowed: Vec<String> = object
            .fields
            .get("allowed_approvers")
            .and_then(Value::as_array)
            .map(|items| items.iter().filter_map(Value::as_str).map(normalize).collect())
            .unwrap_or_default();
        if !allowed.is_empty() && !allowed.iter().any(|a| a == sender) {
            return Err(format!("{sender} is not an approver"));
        }

        let mut approvals: Vec<Value> = approvers.iter().map(|a| json!(a)).collect();
        approvals.push(json!(sender));
        object.fields.insert("approvals".into(), Value::Array(approvals));

        Ok(vec![ObjectChange {
            change_type: ChangeType::Mutated,
            object_id: capsule_id.to_string(),
            object_type: object.object_type.clone(),
            owner: ObjectOwner::Shared,
        }])
    }

    fn unlock(&mut self, digest: &str, sender: &str, capsule_id: &str, tx: &TransactionSpec, now_ms: u64) -> TxOutcome {
        let capsule = self.capsule(capsule_id)?;
        if normalize(&capsule.owner) != sender {
            return Err("only the owner can unlock".into());
        }
        if capsule.unlocked {
            return Err("capsule already unlocked".into());
        }

        let mut mark_paid = false;
        match (tx, &capsule.condition) {
            (TransactionSpec::UnlockTime { .. }, UnlockCondition::Time { unlock_at_ms }) => {
                if now_ms < *unlock_at_ms {
                    return Err("unlock time not reached".into());
                }
            }
            (TransactionSpec::UnlockMultisig { .. }, UnlockCondition::Multisig { threshold, approvers }) => {
                if (approvers.len() as u64) < u64::from(*threshold) {
                    return Err("approval threshold not reached".into());
                }
            }
            (TransactionSpec::UnlockPayment { amount, .. }, UnlockCondition::Payment { price, paid }) => {
                if !*paid && amount < price {
                    return Err(format!("insufficient payment: {amount} < {price}"));
                }
                mark_paid = true;
            }
            (tx, condition) => {
                return Err(format!("{} does not match a {} capsule", tx.name(), condition.kind()));
            }
        }

        let object = self
            .objects
            .get_mut(capsule_id)
            .ok_or_else(|| format!("object {capsule_id} vanished"))?;
        object.fields.insert("unlocked".into(), json!(true));
        if mark_paid {
            object.fields.insert("paid".into(), json!(true));
        }
        let capsule_type = object.object_type.clone();

        let mut receipt_fields = Fields::new();
        receipt_fields.insert("capsule_id".into(), json!(capsule_id));
        receipt_fields.insert("unlocked_at".into(), json!(now_ms.to_string()));
        let receipt = ChainObject {
            object_id: Self::object_id(digest, 0),
            object_type: format!("{DEV_PACKAGE}::capsule::UnlockReceipt"),
            owner: ObjectOwner::Address(sender.to_string()),
            fields: receipt_fields,
        };

        let changes = vec![
            ObjectChange {
                change_type: ChangeType::Mutated,
                object_id: capsule_id.to_string(),
                object_type: capsule_type,
                owner: ObjectOwner::Shared,
            },
            ObjectChange {
                change_type: ChangeType::Created,
                object_id: receipt.object_id.clone(),
                object_type: receipt.object_type.clone(),
                owner: receipt.owner.clone(),
            },
        ];
        self.insert_object(receipt);
        Ok(changes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const OWNER: &str = "0xowner";

    fn new_capsule(condition: ConditionSpec) -> TransactionSpec {
        TransactionSpec::CreateCapsule(NewCapsule {
            content_id: "cid".into(),
            content_hash: [1u8; 32],
            condition,
            nonce: Some([2u8; 24]),
            key_derivation_salt: Some([3u8; 32]),
            key_derivation: Some("blake3".into()),
            key_derivation_id: Some("kid".into()),
        })
    }

    fn created_id(result: &TransactionResult) -> String {
        assert!(result.success, "{:?}", result.error_message);
        result.object_changes[0].object_id.clone()
    }

    #[test]
    fn test_created_capsule_parses_back() {
        let mut state = LedgerState::default();
        let result = state.apply(OWNER, &new_capsule(ConditionSpec::Time { unlock_at_ms: 50 }), 10);
        let id = created_id(&result);

        let capsule = Capsule::from_object(&state.object(&id).unwrap()).unwrap();
        assert_eq!(capsule.owner, OWNER);
        assert_eq!(capsule.condition, UnlockCondition::Time { unlock_at_ms: 50 });
        assert_eq!(capsule.created_at, 10);
        assert_eq!(capsule.nonce, Some([2u8; 24]));
        assert_eq!(capsule.key_derivation_salt, Some([3u8; 32]));
        assert_eq!(capsule.key_id(), "kid");
        assert_eq!(state.owned_capsules("0xOWNER"), vec![id]);
    }

    #[test]
    fn test_digests_are_unique() {
        let mut state = LedgerState::default();
        let tx = new_capsule(ConditionSpec::Payment { price: 5 });
        let a = state.apply(OWNER, &tx, 0);
        let b = state.apply(OWNER, &tx, 0);
        assert_ne!(a.digest, b.digest);
        assert_ne!(created_id(&a), created_id(&b));
    }

    #[test]
    fn test_time_unlock_respects_clock() {
        let mut state = LedgerState::default();
        let id = created_id(&state.apply(OWNER, &new_capsule(ConditionSpec::Time { unlock_at_ms: 100 }), 0));
        let unlock = TransactionSpec::UnlockTime { capsule_id: id.clone() };

        let early = state.apply(OWNER, &unlock, 99);
        assert!(!early.success);
        assert!(early.error_message.unwrap().contains("not reached"));

        let on_time = state.apply(OWNER, &unlock, 100);
        assert!(on_time.success);
        assert_eq!(on_time.object_changes.len(), 2);

        let again = state.apply(OWNER, &unlock, 101);
        assert!(!again.success);
    }

    #[test]
    fn test_multisig_approvals() {
        let mut state = LedgerState::default();
        let condition = ConditionSpec::Multisig {
            threshold: 2,
            approvers: ["0xA".to_string(), "0xB".to_string()].into(),
        };
        let id = created_id(&state.apply(OWNER, &new_capsule(condition), 0));
        let approve = TransactionSpec::Approve { capsule_id: id.clone() };
        let unlock = TransactionSpec::UnlockMultisig { capsule_id: id.clone() };

        assert!(!state.apply("0xc", &approve, 0).success);
        assert!(state.apply("0xa", &approve, 0).success);
        assert!(!state.apply("0xa", &approve, 0).success);
        assert!(!state.apply(OWNER, &unlock, 0).success);
        assert!(state.apply("0xb", &approve, 0).success);
        assert!(state.apply(OWNER, &unlock, 0).success);
    }

    #[test]
    fn test_payment_unlock() {
        let mut state = LedgerState::default();
        let id = created_id(&state.apply(OWNER, &new_capsule(ConditionSpec::Payment { price: 1000 }), 0));

        let short = TransactionSpec::UnlockPayment {
            capsule_id: id.clone(),
            amount: 999,
        };
        assert!(!state.apply(OWNER, &short, 0).success);

        let enough = TransactionSpec::UnlockPayment {
            capsule_id: id.clone(),
            amount: 1000,
        };
        assert!(state.apply(OWNER, &enough, 0).success);

        let capsule = Capsule::from_object(&state.object(&id).unwrap()).unwrap();
        assert!(capsule.unlocked);
        assert_eq!(capsule.condition, UnlockCondition::Payment { price: 1000, paid: true });
    }

    #[test]
    fn test_invalid_condition_rejected() {
        let mut state = LedgerState::default();
        let result = state.apply(OWNER, &new_capsule(ConditionSpec::Payment { price: 0 }), 0);
        assert!(!result.success);
        assert_eq!(state.object_count(), 0);
    }

    #[test]
    fn test_non_owner_cannot_unlock() {
        let mut state = LedgerState::default();
        let id = created_id(&state.apply(OWNER, &new_capsule(ConditionSpec::Time { unlock_at_ms: 0 }), 0));
        let result = state.apply("0xintruder", &TransactionSpec::UnlockTime { capsule_id: id }, 1);
        assert!(!result.success);
    }
}

//! Unlock orchestration against the in-memory ledger

mod common;

use std::sync::Arc;

use capsule_core::hash_content;
use capsule_storage::{EncryptedStore, InMemoryTransport};
use capsule_unlock::{
    CapsuleCreator, ChainClient, ChainObject, ConditionSpec, CreateRequest, CreatedCapsule, EngineConfig,
    InMemoryLedger, ManualClock, ObjectOwner, Progress, UnlockError, UnlockOrchestrator, UnlockRequest, UnlockStage,
};
use common::FlakyChain;
use serde_json::json;

const OWNER: &str = "0xowner";
const NOW: u64 = 1_700_000_000_000;

struct Harness {
    clock: Arc<ManualClock>,
    ledger: InMemoryLedger,
    store: EncryptedStore,
    config: EngineConfig,
}

impl Harness {
    fn new() -> Self {
        Self::with_ledger(|ledger| ledger)
    }

    fn with_ledger(f: impl FnOnce(InMemoryLedger) -> InMemoryLedger) -> Self {
        let clock = Arc::new(ManualClock::new(NOW));
        Self {
            ledger: f(InMemoryLedger::new(OWNER, clock.clone())),
            clock,
            store: EncryptedStore::new(Arc::new(InMemoryTransport::new())),
            config: EngineConfig {
                resolve_attempts: 3,
                resolve_delay_ms: 1,
                ..EngineConfig::default()
            },
        }
    }

    fn creator_as(&self, sender: &str) -> CapsuleCreator {
        CapsuleCreator::new(
            Arc::new(self.ledger.for_sender(sender)),
            self.store.clone(),
            self.config.clone(),
        )
    }

    fn orchestrator_as(&self, sender: &str) -> UnlockOrchestrator {
        UnlockOrchestrator::new(
            Arc::new(self.ledger.for_sender(sender)),
            self.store.clone(),
            self.clock.clone(),
            self.config.clone(),
        )
    }

    fn orchestrator(&self) -> UnlockOrchestrator {
        self.orchestrator_as(OWNER)
    }

    async fn create(&self, content: &str, condition: ConditionSpec) -> CreatedCapsule {
        self.creator_as(OWNER)
            .create(CreateRequest::new(content, "text/plain", condition))
            .await
            .unwrap()
    }

    async fn edit_fields(&self, id: &str, f: impl FnOnce(&mut ChainObject)) {
        let mut object = self.ledger.read_object(id).await.unwrap();
        f(&mut object);
        self.ledger.insert_object(object);
    }
}

#[tokio::test]
async fn test_time_not_reached_submits_nothing() {
    let h = Harness::new();
    let created = h
        .create("later", ConditionSpec::Time { unlock_at_ms: NOW + 2 * 86_400_000 })
        .await;
    let objects_before = h.ledger.object_count();

    let failure = h
        .orchestrator()
        .unlock(&UnlockRequest::wallet(&created.capsule_id))
        .await
        .unwrap_err();

    assert_eq!(failure.stage, UnlockStage::Evaluate);
    assert!(matches!(failure.error, UnlockError::ConditionsNotMet(ref msg) if msg == "Unlocks in 2 days"));
    assert!(failure.transaction_digest.is_none());
    assert_eq!(h.ledger.object_count(), objects_before);
}

#[tokio::test]
async fn test_multisig_flow() {
    let h = Harness::new();
    let condition = ConditionSpec::Multisig {
        threshold: 2,
        approvers: ["0xalice".to_string(), "0xbob".to_string()].into(),
    };
    let created = h.create("needs two", condition).await;

    let status = h.orchestrator().status(&created.capsule_id).await.unwrap();
    assert!(!status.status.can_unlock);

    let first = h.creator_as("0xalice").approve(&created.capsule_id).await.unwrap();
    assert_eq!((first.current, first.required), (1, 2));

    let early = h.orchestrator().unlock_outcome(&UnlockRequest::wallet(&created.capsule_id)).await;
    assert_eq!(early.error_kind.as_deref(), Some("conditions_not_met"));
    assert!(early.error.unwrap().contains("1/2"));

    let outsider = h.creator_as("0xmallory").approve(&created.capsule_id).await;
    assert!(matches!(outsider, Err(UnlockError::TransactionFailed(_))));

    let second = h.creator_as("0xbob").approve(&created.capsule_id).await.unwrap();
    assert_eq!((second.current, second.required), (2, 2));

    let status = h.orchestrator().status(&created.capsule_id).await.unwrap();
    assert_eq!(
        status.status.progress,
        Some(Progress::Approvals {
            current: 2,
            required: 2,
            percentage: 100.0
        })
    );

    let unlocked = h
        .orchestrator()
        .unlock(&UnlockRequest::wallet(&created.capsule_id))
        .await
        .unwrap();
    assert_eq!(unlocked.content, b"needs two");
}

#[tokio::test]
async fn test_payment_flow() {
    let h = Harness::new();
    let created = h.create("paid content", ConditionSpec::Payment { price: 1000 }).await;

    let unpaid = h.orchestrator().unlock_outcome(&UnlockRequest::wallet(&created.capsule_id)).await;
    assert!(!unpaid.success);
    assert!(unpaid.error.unwrap().contains("1000 MIST"));

    let short = h
        .orchestrator()
        .unlock_outcome(&UnlockRequest::wallet(&created.capsule_id).with_payment(10))
        .await;
    assert_eq!(short.stage, UnlockStage::Evaluate);

    let paid = h
        .orchestrator()
        .unlock(&UnlockRequest::wallet(&created.capsule_id).with_payment(1000))
        .await
        .unwrap();
    assert_eq!(paid.content, b"paid content");

    let capsule = h.orchestrator().fetch(&created.capsule_id).await.unwrap();
    assert!(capsule.unlocked);
}

#[tokio::test]
async fn test_already_unlocked_skips_transaction() {
    let h = Harness::new();
    let created = h.create("twice", ConditionSpec::Time { unlock_at_ms: NOW }).await;

    let first = h
        .orchestrator()
        .unlock(&UnlockRequest::wallet(&created.capsule_id))
        .await
        .unwrap();
    assert!(first.transaction_digest.is_some());
    assert!(!first.unlocked_object.unwrap().is_degraded());

    let second = h
        .orchestrator()
        .unlock(&UnlockRequest::wallet(&created.capsule_id))
        .await
        .unwrap();
    assert!(second.transaction_digest.is_none());
    assert_eq!(second.content, b"twice");

    let status = h.orchestrator().status(&created.capsule_id).await.unwrap();
    assert!(!status.status.can_unlock);
    assert_eq!(status.status.message, "Capsule already unlocked");
}

#[tokio::test]
async fn test_other_wallet_cannot_decrypt() {
    let h = Harness::new();
    let created = h.create("owner only", ConditionSpec::Time { unlock_at_ms: NOW }).await;
    h.orchestrator()
        .unlock(&UnlockRequest::wallet(&created.capsule_id))
        .await
        .unwrap();

    let failure = h
        .orchestrator_as("0xsomeoneelse")
        .unlock(&UnlockRequest::wallet(&created.capsule_id))
        .await
        .unwrap_err();
    assert_eq!(failure.stage, UnlockStage::Retrieve);
    assert_eq!(failure.error.kind(), "integrity");
}

#[tokio::test]
async fn test_random_key_capsule() {
    let h = Harness::new();
    let created = h
        .creator_as(OWNER)
        .create(CreateRequest::new("random", "text/plain", ConditionSpec::Time { unlock_at_ms: NOW }).with_random_key())
        .await
        .unwrap();
    let key = created.key.clone().unwrap();
    assert!(created.salt.is_none());

    let without_key = h
        .orchestrator()
        .unlock(&UnlockRequest::wallet(&created.capsule_id))
        .await
        .unwrap_err();
    assert_eq!(without_key.stage, UnlockStage::Retrieve);
    assert!(matches!(without_key.error, UnlockError::MissingKeyMaterial(_)));
    // The unlock transaction is irrevocable and still reported
    assert!(without_key.transaction_digest.is_some());

    let unlocked = h
        .orchestrator()
        .unlock(&UnlockRequest::wallet(&created.capsule_id).with_key(key))
        .await
        .unwrap();
    assert_eq!(unlocked.content, b"random");
}

#[tokio::test]
async fn test_recorded_hash_mismatch_reported_distinctly() {
    let h = Harness::new();
    let created = h.create("genuine", ConditionSpec::Time { unlock_at_ms: NOW }).await;
    h.edit_fields(&created.capsule_id, |object| {
        object
            .fields
            .insert("content_hash".into(), json!(hash_content(b"forged").to_vec()));
    })
    .await;

    let outcome = h.orchestrator().unlock_outcome(&UnlockRequest::wallet(&created.capsule_id)).await;
    assert!(!outcome.success);
    assert_eq!(outcome.stage, UnlockStage::Retrieve);
    assert_eq!(outcome.error_kind.as_deref(), Some("hash_mismatch"));
    assert!(outcome.content.is_none());
}

#[tokio::test]
async fn test_recorded_nonce_mismatch_is_integrity() {
    let h = Harness::new();
    let created = h.create("nonce", ConditionSpec::Time { unlock_at_ms: NOW }).await;
    h.edit_fields(&created.capsule_id, |object| {
        object.fields.insert("nonce".into(), json!(vec![0u8; 24]));
    })
    .await;

    let failure = h
        .orchestrator()
        .unlock(&UnlockRequest::wallet(&created.capsule_id))
        .await
        .unwrap_err();
    assert!(matches!(failure.error, UnlockError::Integrity(_)));
}

#[tokio::test]
async fn test_resolution_retries_through_indexing_lag() {
    let h = Harness::with_ledger(|ledger| ledger.with_indexing_lag(2));
    let created = h.create("lagged", ConditionSpec::Time { unlock_at_ms: NOW }).await;
    assert!(!created.resolution.is_degraded());

    let unlocked = h
        .orchestrator()
        .unlock(&UnlockRequest::wallet(&created.capsule_id))
        .await
        .unwrap();
    let resolution = unlocked.unlocked_object.unwrap();
    assert!(!resolution.is_degraded());
    assert!(resolution.id().starts_with("0x"));
}

#[tokio::test]
async fn test_resolution_degrades_to_digest() {
    let h = Harness::with_ledger(|ledger| ledger.with_indexing_lag(10));
    let created = h.create("slow index", ConditionSpec::Time { unlock_at_ms: NOW }).await;

    assert!(created.resolution.is_degraded());
    assert_eq!(created.capsule_id, created.transaction_digest);
}

#[tokio::test]
async fn test_unknown_condition_is_reportable() {
    let h = Harness::new();
    let mut fields = capsule_unlock::Fields::new();
    fields.insert("owner".into(), json!(OWNER));
    fields.insert("cid".into(), json!("cid"));
    fields.insert("content_hash".into(), json!(vec![0u8; 32]));
    fields.insert("condition_type".into(), json!("oracle"));
    h.ledger.insert_object(ChainObject {
        object_id: "0xoracle".into(),
        object_type: "0xca9::capsule::Capsule".into(),
        owner: ObjectOwner::Shared,
        fields,
    });

    let failure = h
        .orchestrator()
        .unlock(&UnlockRequest::wallet("0xoracle"))
        .await
        .unwrap_err();
    assert_eq!(failure.stage, UnlockStage::Evaluate);
    assert!(failure.error.to_string().contains("Unknown unlock condition"));
}

#[tokio::test]
async fn test_missing_capsule() {
    let h = Harness::new();
    let outcome = h.orchestrator().unlock_outcome(&UnlockRequest::wallet("0xnothing")).await;
    assert!(!outcome.success);
    assert_eq!(outcome.stage, UnlockStage::FetchCapsule);
    assert_eq!(outcome.error_kind.as_deref(), Some("capsule_not_found"));
    assert_eq!(outcome.capsule_id, "0xnothing");
}

#[tokio::test]
async fn test_batch_preserves_order_and_isolates_failures() {
    let h = Harness::new();
    let a = h.create("a", ConditionSpec::Time { unlock_at_ms: NOW }).await;
    let b = h.create("b", ConditionSpec::Time { unlock_at_ms: NOW + 10_000 }).await;
    let c = h.create("c", ConditionSpec::Time { unlock_at_ms: NOW - 1 }).await;

    let requests = vec![
        UnlockRequest::wallet(&a.capsule_id),
        UnlockRequest::wallet("0xmissing"),
        UnlockRequest::wallet(&b.capsule_id),
        UnlockRequest::wallet(&c.capsule_id),
    ];
    let outcomes = h.orchestrator().unlock_batch(requests, 2).await;

    assert_eq!(outcomes.len(), 4);
    assert_eq!(outcomes[0].capsule_id, a.capsule_id);
    assert_eq!(outcomes[0].content.as_deref(), Some(&b"a"[..]));
    assert_eq!(outcomes[1].error_kind.as_deref(), Some("capsule_not_found"));
    assert_eq!(outcomes[2].error_kind.as_deref(), Some("conditions_not_met"));
    assert_eq!(outcomes[3].content.as_deref(), Some(&b"c"[..]));
}

#[tokio::test]
async fn test_list_owned_capsules() {
    let h = Harness::new();
    h.create("one", ConditionSpec::Time { unlock_at_ms: NOW }).await;
    h.create("two", ConditionSpec::Payment { price: 5 }).await;
    h.creator_as("0xother")
        .create(CreateRequest::new("theirs", "text/plain", ConditionSpec::Time { unlock_at_ms: NOW }))
        .await
        .unwrap();

    let mine = h.orchestrator().list(OWNER).await.unwrap();
    assert_eq!(mine.len(), 2);
    assert_eq!(mine.iter().filter(|s| s.status.can_unlock).count(), 1);
}

#[tokio::test]
async fn test_list_skips_unreadable_objects() {
    let h = Harness::new();
    h.create("readable", ConditionSpec::Time { unlock_at_ms: NOW }).await;
    let chain = FlakyChain::new(h.ledger.clone()).with_phantom_ids(&["0xgone"]);
    let orchestrator = UnlockOrchestrator::new(Arc::new(chain), h.store.clone(), h.clock.clone(), h.config.clone());

    let mine = orchestrator.list(OWNER).await.unwrap();
    assert_eq!(mine.len(), 1);
    assert!(mine[0].status.can_unlock);
}

#[tokio::test]
async fn test_batch_unlock_with_explicit_keys() {
    let h = Harness::new();
    let random = h
        .creator_as(OWNER)
        .create(CreateRequest::new("keyed", "text/plain", ConditionSpec::Time { unlock_at_ms: NOW }).with_random_key())
        .await
        .unwrap();
    let wallet = h.create("derived", ConditionSpec::Time { unlock_at_ms: NOW }).await;
    let key = random.key.clone().unwrap();

    let outcomes = h
        .orchestrator()
        .unlock_batch(
            vec![
                UnlockRequest::wallet(&random.capsule_id).with_key(key),
                UnlockRequest::wallet(&wallet.capsule_id),
            ],
            2,
        )
        .await;

    assert_eq!(outcomes[0].content.as_deref(), Some(&b"keyed"[..]));
    assert_eq!(outcomes[1].content.as_deref(), Some(&b"derived"[..]));
}

#[tokio::test]
async fn test_invalid_conditions_rejected_before_upload() {
    let h = Harness::new();
    let creator = h.creator_as(OWNER);

    let zero = creator
        .create(CreateRequest::new(
            "x",
            "text/plain",
            ConditionSpec::Multisig {
                threshold: 0,
                approvers: Default::default(),
            },
        ))
        .await;
    assert!(matches!(zero, Err(UnlockError::InvalidInput(_))));

    let free = creator
        .create(CreateRequest::new("x", "text/plain", ConditionSpec::Payment { price: 0 }))
        .await;
    assert!(matches!(free, Err(UnlockError::InvalidInput(_))));
    assert_eq!(h.ledger.object_count(), 0);
}

#[tokio::test]
async fn test_approve_rejects_non_multisig() {
    let h = Harness::new();
    let created = h.create("timed", ConditionSpec::Time { unlock_at_ms: NOW }).await;
    let result = h.creator_as("0xalice").approve(&created.capsule_id).await;
    assert!(matches!(result, Err(UnlockError::InvalidInput(_))));
}

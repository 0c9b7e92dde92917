//! Shared fixtures for the engine integration tests
#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use capsule_unlock::{
    ChainClient, ChainError, ChainObject, ChainResult, InMemoryLedger, ObjectChange, TransactionResult,
    TransactionSpec,
};

/// In-memory ledger whose first few submissions fail with an RPC error,
/// optionally reporting extra owned ids that cannot be read
pub struct FlakyChain {
    inner: InMemoryLedger,
    failing_submits: AtomicU32,
    submits: AtomicU32,
    phantom_ids: Vec<String>,
}

impl FlakyChain {
    pub fn new(inner: InMemoryLedger) -> Self {
        Self {
            inner,
            failing_submits: AtomicU32::new(0),
            submits: AtomicU32::new(0),
            phantom_ids: Vec::new(),
        }
    }

    pub fn failing_submits(self, count: u32) -> Self {
        self.failing_submits.store(count, Ordering::SeqCst);
        self
    }

    pub fn with_phantom_ids(mut self, ids: &[&str]) -> Self {
        self.phantom_ids = ids.iter().map(|id| id.to_string()).collect();
        self
    }

    pub fn submit_count(&self) -> u32 {
        self.submits.load(Ordering::SeqCst)
    }

    pub fn into_arc(self) -> Arc<Self> {
        Arc::new(self)
    }
}

#[async_trait]
impl ChainClient for FlakyChain {
    fn sender(&self) -> String {
        self.inner.sender()
    }

    async fn submit_transaction(&self, tx: &TransactionSpec) -> ChainResult<TransactionResult> {
        self.submits.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .failing_submits
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(ChainError::Rpc("503 Service Unavailable".into()));
        }
        self.inner.submit_transaction(tx).await
    }

    async fn read_object(&self, object_id: &str) -> ChainResult<ChainObject> {
        if self.phantom_ids.iter().any(|id| id == object_id) {
            return Err(ChainError::Rpc(format!("object {object_id} is not readable")));
        }
        self.inner.read_object(object_id).await
    }

    async fn transaction_object_changes(&self, digest: &str) -> ChainResult<Vec<ObjectChange>> {
        self.inner.transaction_object_changes(digest).await
    }

    async fn owned_objects(&self, owner: &str) -> ChainResult<Vec<String>> {
        let mut ids = self.phantom_ids.clone();
        ids.extend(self.inner.owned_objects(owner).await?);
        Ok(ids)
    }
}

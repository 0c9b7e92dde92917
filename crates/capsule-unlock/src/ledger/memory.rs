//! In-memory ledger (for testing)

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use async_trait::async_trait;

use super::state::LedgerState;
use crate::chain::{ChainClient, ChainObject, ObjectChange, TransactionResult, TransactionSpec};
use crate::clock::Clock;
use crate::error::ChainResult;

/// In-memory ledger for unit and integration tests
///
/// Handles from [`InMemoryLedger::for_sender`] share state, so several
/// parties can act on the same capsules.
#[derive(Clone)]
pub struct InMemoryLedger {
    sender: String,
    clock: Arc<dyn Clock>,
    state: Arc<RwLock<LedgerState>>,
    indexing_lag: u32,
    /// digest -> object-change queries still answered with nothing
    pending: Arc<Mutex<HashMap<String, u32>>>,
}

impl InMemoryLedger {
    pub fn new(sender: impl Into<String>, clock: Arc<dyn Clock>) -> Self {
        Self {
            sender: sender.into(),
            clock,
            state: Arc::default(),
            indexing_lag: 0,
            pending: Arc::default(),
        }
    }

    /// Withhold object changes: submissions report none, and the first
    /// `queries` change queries per digest come back empty.
    pub fn with_indexing_lag(mut self, queries: u32) -> Self {
        self.indexing_lag = queries;
        self
    }

    /// Another party's handle onto the same ledger
    pub fn for_sender(&self, sender: impl Into<String>) -> Self {
        Self {
            sender: sender.into(),
            ..self.clone()
        }
    }

    /// Place an arbitrary object on the ledger
    pub fn insert_object(&self, object: ChainObject) {
        self.state.write().unwrap_or_else(PoisonError::into_inner).insert_object(object);
    }

    pub fn object_count(&self) -> usize {
        self.state.read().unwrap_or_else(PoisonError::into_inner).object_count()
    }
}

#[async_trait]
impl ChainClient for InMemoryLedger {
    fn sender(&self) -> String {
        self.sender.clone()
    }

    async fn submit_transaction(&self, tx: &TransactionSpec) -> ChainResult<TransactionResult> {
        let mut result = self
            .state
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .apply(&self.sender, tx, self.clock.now_ms());

        if self.indexing_lag > 0 && result.success {
            result.object_changes.clear();
            self.pending
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(result.digest.clone(), self.indexing_lag);
        }

        tracing::debug!(tx = tx.name(), digest = %result.digest, success = result.success, "Ledger transaction");
        Ok(result)
    }

    async fn read_object(&self, object_id: &str) -> ChainResult<ChainObject> {
        self.state.read().unwrap_or_else(PoisonError::into_inner).object(object_id)
    }

    async fn transaction_object_changes(&self, digest: &str) -> ChainResult<Vec<ObjectChange>> {
        {
            let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(remaining) = pending.get_mut(digest) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Ok(Vec::new());
                }
            }
        }
        self.state.read().unwrap_or_else(PoisonError::into_inner).changes(digest)
    }

    async fn owned_objects(&self, owner: &str) -> ChainResult<Vec<String>> {
        Ok(self
            .state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .owned_capsules(owner))
    }
}

//! File-backed ledger (CLI default)
//!
//! The whole ledger is one JSON document, rewritten after every transaction.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::fs;
use tokio::sync::Mutex;

use super::state::LedgerState;
use crate::chain::{ChainClient, ChainObject, ObjectChange, TransactionResult, TransactionSpec};
use crate::clock::Clock;
use crate::error::ChainResult;

#[derive(Clone)]
pub struct LocalLedger {
    path: PathBuf,
    sender: String,
    clock: Arc<dyn Clock>,
    /// Serializes load-apply-save within this process
    lock: Arc<Mutex<()>>,
}

impl LocalLedger {
    /// Open (or lazily create) the ledger file at `path`
    pub async fn open(path: impl AsRef<Path>, sender: impl Into<String>, clock: Arc<dyn Clock>) -> ChainResult<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }
        Ok(Self {
            path,
            sender: sender.into(),
            clock,
            lock: Arc::default(),
        })
    }

    pub fn for_sender(&self, sender: impl Into<String>) -> Self {
        Self {
            sender: sender.into(),
            ..self.clone()
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> ChainResult<LedgerState> {
        match fs::read(&self.path).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(LedgerState::default()),
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, state: &LedgerState) -> ChainResult<()> {
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(state)?).await?;
        fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl ChainClient for LocalLedger {
    fn sender(&self) -> String {
        self.sender.clone()
    }

    async fn submit_transaction(&self, tx: &TransactionSpec) -> ChainResult<TransactionResult> {
        let _guard = self.lock.lock().await;
        let mut state = self.load().await?;
        let result = state.apply(&self.sender, tx, self.clock.now_ms());
        self.save(&state).await?;

        tracing::debug!(tx = tx.name(), digest = %result.digest, success = result.success, "Ledger transaction");
        Ok(result)
    }

    async fn read_object(&self, object_id: &str) -> ChainResult<ChainObject> {
        let _guard = self.lock.lock().await;
        self.load().await?.object(object_id)
    }

    async fn transaction_object_changes(&self, digest: &str) -> ChainResult<Vec<ObjectChange>> {
        let _guard = self.lock.lock().await;
        self.load().await?.changes(digest)
    }

    async fn owned_objects(&self, owner: &str) -> ChainResult<Vec<String>> {
        let _guard = self.lock.lock().await;
        Ok(self.load().await?.owned_capsules(owner))
    }
}

//! Bounded-concurrency batch unlock and creation

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, warn};

use crate::create::{CapsuleCreator, CreateRequest, CreatedCapsule};
use crate::error::UnlockError;
use crate::orchestrator::{UnlockFailure, UnlockOrchestrator, UnlockOutcome, UnlockRequest, UnlockStage};

/// Tuning for [`CapsuleCreator::create_batch`]
#[derive(Clone, Debug)]
pub struct BatchOptions {
    pub max_concurrent: usize,
    /// Extra attempts after a retryable failure (transport or RPC)
    pub retry_attempts: u32,
    pub retry_delay_ms: u64,
    /// When false, items not yet started after the first failure are skipped
    pub continue_on_error: bool,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            max_concurrent: 4,
            retry_attempts: 3,
            retry_delay_ms: 1_000,
            continue_on_error: true,
        }
    }
}

#[derive(Debug)]
pub enum CreateStatus {
    Created(CreatedCapsule),
    Failed(UnlockError),
    /// Not attempted because an earlier item failed
    Skipped,
}

/// Result of one batch item, labelled by the caller (usually a file path)
#[derive(Debug)]
pub struct CreateOutcome {
    pub label: String,
    pub attempts: u32,
    pub status: CreateStatus,
}

impl CreateOutcome {
    pub fn created(&self) -> Option<&CreatedCapsule> {
        match &self.status {
            CreateStatus::Created(created) => Some(created),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&UnlockError> {
        match &self.status {
            CreateStatus::Failed(e) => Some(e),
            _ => None,
        }
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self.status, CreateStatus::Skipped)
    }
}

impl UnlockOrchestrator {
    /// Unlock many capsules, at most `max_concurrent` at a time
    ///
    /// Outcomes come back in request order. One failure never stops the rest.
    pub async fn unlock_batch(&self, requests: Vec<UnlockRequest>, max_concurrent: usize) -> Vec<UnlockOutcome> {
        let semaphore = Arc::new(Semaphore::new(max_concurrent.max(1)));
        let mut outcomes: Vec<UnlockOutcome> = requests
            .iter()
            .map(|r| {
                UnlockOutcome::from_result(
                    &r.capsule_id,
                    Err(UnlockFailure {
                        stage: UnlockStage::FetchCapsule,
                        error: UnlockError::InvalidInput("unlock task did not complete".into()),
                        transaction_digest: None,
                    }),
                )
            })
            .collect();

        let mut tasks = JoinSet::new();
        for (index, request) in requests.into_iter().enumerate() {
            let orchestrator = self.clone();
            let semaphore = semaphore.clone();
            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                (index, orchestrator.unlock_outcome(&request).await)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, outcome)) => outcomes[index] = outcome,
                Err(e) => error!(error = %e, "Unlock task aborted"),
            }
        }

        outcomes
    }
}

impl CapsuleCreator {
    /// Create many capsules, at most `options.max_concurrent` at a time
    ///
    /// Items start in input order and outcomes come back in input order.
    /// Retryable failures are retried after a fixed delay.
    pub async fn create_batch(&self, items: Vec<(String, CreateRequest)>, options: &BatchOptions) -> Vec<CreateOutcome> {
        let semaphore = Arc::new(Semaphore::new(options.max_concurrent.max(1)));
        let halted = Arc::new(AtomicBool::new(false));
        let mut outcomes: Vec<CreateOutcome> = items
            .iter()
            .map(|(label, _)| CreateOutcome {
                label: label.clone(),
                attempts: 0,
                status: CreateStatus::Failed(UnlockError::InvalidInput("create task did not complete".into())),
            })
            .collect();

        let mut tasks = JoinSet::new();
        for (index, (label, request)) in items.into_iter().enumerate() {
            // Acquiring here keeps start order equal to input order
            let Ok(permit) = semaphore.clone().acquire_owned().await else {
                break;
            };
            if halted.load(Ordering::SeqCst) {
                outcomes[index].status = CreateStatus::Skipped;
                continue;
            }

            let creator = self.clone();
            let halted = halted.clone();
            let options = options.clone();
            tasks.spawn(async move {
                let _permit = permit;
                let (attempts, status) = creator.create_with_retry(&label, request, &options).await;
                if matches!(status, CreateStatus::Failed(_)) && !options.continue_on_error {
                    halted.store(true, Ordering::SeqCst);
                }
                (index, attempts, status)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, attempts, status)) => {
                    outcomes[index].attempts = attempts;
                    outcomes[index].status = status;
                }
                Err(e) => error!(error = %e, "Create task aborted"),
            }
        }

        outcomes
    }

    async fn create_with_retry(&self, label: &str, request: CreateRequest, options: &BatchOptions) -> (u32, CreateStatus) {
        let mut attempts = 0;
        loop {
            attempts += 1;
            match self.create(request.clone()).await {
                Ok(created) => return (attempts, CreateStatus::Created(created)),
                Err(e) if e.is_retryable() && attempts <= options.retry_attempts => {
                    warn!(label, attempt = attempts, error = %e, "Create failed, retrying");
                    tokio::time::sleep(Duration::from_millis(options.retry_delay_ms)).await;
                }
                Err(e) => {
                    warn!(label, attempts, error = %e, "Create failed");
                    return (attempts, CreateStatus::Failed(e));
                }
            }
        }
    }
}

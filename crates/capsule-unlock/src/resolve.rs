//! Locating the object a transaction created
//!
//! The object-change list is the primary signal. When it is empty at
//! submission time the indexed changes are re-queried a bounded number of
//! times at a fixed delay. If that also comes up empty the digest stands in
//! for the object id and the resolution is marked degraded.

use serde::Serialize;
use tracing::{debug, warn};

use crate::chain::{ChainClient, ChangeType, ObjectChange, ObjectOwner, TransactionResult};
use crate::config::EngineConfig;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "resolution", rename_all = "snake_case")]
pub enum ObjectResolution {
    Resolved { object_id: String },
    /// Only the transaction digest is known
    Degraded { digest: String },
}

impl ObjectResolution {
    /// The object id, or the digest when degraded
    pub fn id(&self) -> &str {
        match self {
            ObjectResolution::Resolved { object_id } => object_id,
            ObjectResolution::Degraded { digest } => digest,
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, ObjectResolution::Degraded { .. })
    }
}

/// Pick the created object: a declared-type match first, then any shared object
pub fn find_created_object<'a>(changes: &'a [ObjectChange], expected_type: &str) -> Option<&'a ObjectChange> {
    let created = || changes.iter().filter(|c| c.change_type == ChangeType::Created);
    created()
        .find(|c| c.object_type.ends_with(expected_type))
        .or_else(|| created().find(|c| c.owner == ObjectOwner::Shared))
}

/// Resolve the object created by `result`
pub async fn resolve_created_object(
    chain: &dyn ChainClient,
    result: &TransactionResult,
    expected_type: &str,
    config: &EngineConfig,
) -> ObjectResolution {
    if let Some(change) = find_created_object(&result.object_changes, expected_type) {
        return ObjectResolution::Resolved {
            object_id: change.object_id.clone(),
        };
    }

    for attempt in 1..=config.resolve_attempts {
        tokio::time::sleep(config.resolve_delay()).await;

        match chain.transaction_object_changes(&result.digest).await {
            Ok(changes) => {
                if let Some(change) = find_created_object(&changes, expected_type) {
                    debug!(digest = %result.digest, attempt, object_id = %change.object_id, "Resolved created object");
                    return ObjectResolution::Resolved {
                        object_id: change.object_id.clone(),
                    };
                }
                debug!(digest = %result.digest, attempt, "Object changes not indexed yet");
            }
            Err(e) => warn!(digest = %result.digest, attempt, error = %e, "Object change query failed"),
        }
    }

    warn!(
        digest = %result.digest,
        attempts = config.resolve_attempts,
        "Created object not found, falling back to transaction digest"
    );
    ObjectResolution::Degraded {
        digest: result.digest.clone(),
    }
}

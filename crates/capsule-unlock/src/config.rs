use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Engine tuning, passed explicitly into every constructor
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Object-change queries after submission before settling for the digest
    pub resolve_attempts: u32,
    /// Fixed delay before each query
    pub resolve_delay_ms: u64,
    /// Type suffix identifying capsule objects
    pub capsule_object_type: String,
    /// Type suffix identifying the object an unlock creates
    pub unlock_object_type: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            resolve_attempts: 3,
            resolve_delay_ms: 1_000,
            capsule_object_type: "::capsule::Capsule".into(),
            unlock_object_type: "::capsule::UnlockReceipt".into(),
        }
    }
}

impl EngineConfig {
    pub fn resolve_delay(&self) -> Duration {
        Duration::from_millis(self.resolve_delay_ms)
    }
}

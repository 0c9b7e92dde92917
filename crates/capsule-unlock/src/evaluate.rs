//! Unlock condition evaluation
//!
//! Pure and total: every condition, including ones this engine does not
//! understand, yields a reportable [`UnlockStatus`]. Nothing is stored; the
//! status is recomputed from current facts on every call.

use serde::Serialize;

use crate::capsule::UnlockCondition;

const SECOND_MS: u64 = 1_000;
const MINUTE_MS: u64 = 60 * SECOND_MS;
const HOUR_MS: u64 = 60 * MINUTE_MS;
const DAY_MS: u64 = 24 * HOUR_MS;

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Progress {
    Approvals { current: u32, required: u32, percentage: f64 },
    Payment { required: u64, paid: bool },
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct UnlockStatus {
    pub can_unlock: bool,
    pub progress: Option<Progress>,
    pub message: String,
}

impl UnlockStatus {
    fn new(can_unlock: bool, progress: Option<Progress>, message: impl Into<String>) -> Self {
        Self {
            can_unlock,
            progress,
            message: message.into(),
        }
    }
}

/// Evaluate a condition at `now_ms`
pub fn evaluate(condition: &UnlockCondition, unlocked: bool, now_ms: u64) -> UnlockStatus {
    if unlocked {
        return UnlockStatus::new(false, None, "Capsule already unlocked");
    }

    match condition {
        UnlockCondition::Time { unlock_at_ms } => {
            if now_ms >= *unlock_at_ms {
                UnlockStatus::new(true, None, "Ready to unlock")
            } else {
                let remaining = format_remaining(unlock_at_ms - now_ms);
                UnlockStatus::new(false, None, format!("Unlocks in {remaining}"))
            }
        }
        UnlockCondition::Multisig { threshold, approvers } => {
            let current = u32::try_from(approvers.len()).unwrap_or(u32::MAX);
            let (can_unlock, percentage) = if *threshold == 0 {
                (true, 0.0)
            } else {
                let pct = (f64::from(current) * 100.0 / f64::from(*threshold)).clamp(0.0, 100.0);
                (current >= *threshold, pct)
            };
            let message = if can_unlock {
                format!("Approval threshold reached ({current}/{threshold})")
            } else {
                format!("Waiting for approvals ({current}/{threshold})")
            };
            UnlockStatus::new(
                can_unlock,
                Some(Progress::Approvals {
                    current,
                    required: *threshold,
                    percentage,
                }),
                message,
            )
        }
        UnlockCondition::Payment { price, paid } => {
            let message = if *paid {
                "Payment received".to_string()
            } else {
                format!("Payment of {price} MIST required")
            };
            UnlockStatus::new(
                *paid,
                Some(Progress::Payment {
                    required: *price,
                    paid: *paid,
                }),
                message,
            )
        }
        UnlockCondition::Unknown { tag } => {
            UnlockStatus::new(false, None, format!("Unknown unlock condition '{tag}'"))
        }
    }
}

/// Remaining duration in the largest unit that fits, e.g. `2 days`, `1 hour`
///
/// Larger units round down; seconds round up so a pending unlock never
/// reads as `0 seconds`.
pub fn format_remaining(ms: u64) -> String {
    let (value, unit) = if ms >= DAY_MS {
        (ms / DAY_MS, "day")
    } else if ms >= HOUR_MS {
        (ms / HOUR_MS, "hour")
    } else if ms >= MINUTE_MS {
        (ms / MINUTE_MS, "minute")
    } else {
        (ms.div_ceil(SECOND_MS).max(1), "second")
    };

    if value == 1 {
        format!("{value} {unit}")
    } else {
        format!("{value} {unit}s")
    }
}

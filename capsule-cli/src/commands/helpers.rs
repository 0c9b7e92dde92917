// Common helper functions

use std::collections::BTreeSet;
use std::path::Path;

use anyhow::{Context as _, Result};
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use capsule_core::SymmetricKey;
use capsule_unlock::{ConditionSpec, Progress, UnlockCondition};
use indicatif::{ProgressBar, ProgressStyle};

use super::Context;

/// Spinner for long operations; `None` in JSON mode
pub fn spinner(ctx: &Context, message: &str) -> Option<ProgressBar> {
    if ctx.json_output {
        return None;
    }
    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::default_spinner());
    pb.set_message(message.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    Some(pb)
}

pub fn finish(pb: Option<ProgressBar>) {
    if let Some(pb) = pb {
        pb.finish_and_clear();
    }
}

pub fn format_timestamp(ts_ms: u64) -> String {
    use chrono::{DateTime, Utc};
    let dt = DateTime::<Utc>::from_timestamp_millis(ts_ms as i64).unwrap_or_else(Utc::now);
    dt.format("%Y-%m-%d %H:%M UTC").to_string()
}

pub fn truncate(s: &str, max_len: usize) -> String {
    match s.char_indices().nth(max_len) {
        None => s.to_string(),
        Some((idx, _)) => format!("{}...", &s[..idx]),
    }
}

/// Unlock time as epoch milliseconds or an RFC 3339 timestamp
pub fn parse_unlock_time(s: &str) -> Result<u64, String> {
    if let Ok(ms) = s.parse::<u64>() {
        return Ok(ms);
    }
    let dt = chrono::DateTime::parse_from_rfc3339(s)
        .map_err(|_| format!("'{s}' is neither epoch milliseconds nor an RFC 3339 timestamp"))?;
    u64::try_from(dt.timestamp_millis()).map_err(|_| format!("'{s}' is before the Unix epoch"))
}

pub fn encode_key(key: &SymmetricKey) -> String {
    BASE64.encode(key.as_bytes())
}

/// A key given as base64 text, or as a path to a file holding it
pub fn load_key(arg: &str) -> Result<SymmetricKey> {
    let path = Path::new(arg);
    let text = if path.is_file() {
        std::fs::read_to_string(path).with_context(|| format!("Failed to read key file {arg}"))?
    } else {
        arg.to_string()
    };

    let bytes = BASE64
        .decode(text.trim())
        .context("Key must be base64 (or a path to a file containing base64)")?;
    SymmetricKey::from_slice(&bytes).map_err(|e| anyhow::anyhow!("Invalid key: {e}"))
}

/// Condition from the mutually exclusive --unlock-time / --threshold / --price flags
pub fn build_condition(
    unlock_time: Option<u64>,
    threshold: Option<u32>,
    approvers: &[String],
    price: Option<u64>,
) -> Result<ConditionSpec> {
    if let Some(unlock_at_ms) = unlock_time {
        Ok(ConditionSpec::Time { unlock_at_ms })
    } else if let Some(threshold) = threshold {
        Ok(ConditionSpec::Multisig {
            threshold,
            approvers: approvers.iter().map(|a| a.trim().to_ascii_lowercase()).collect::<BTreeSet<_>>(),
        })
    } else if let Some(price) = price {
        Ok(ConditionSpec::Payment { price })
    } else {
        anyhow::bail!("One of --unlock-time, --threshold or --price is required");
    }
}

pub fn describe_condition(condition: &UnlockCondition) -> String {
    match condition {
        UnlockCondition::Time { unlock_at_ms } => format!("time (unlocks {})", format_timestamp(*unlock_at_ms)),
        UnlockCondition::Multisig { threshold, approvers } => {
            format!("multisig ({} of {threshold} approvals)", approvers.len())
        }
        UnlockCondition::Payment { price, paid } => {
            format!("payment ({price} MIST, {})", if *paid { "paid" } else { "unpaid" })
        }
        UnlockCondition::Unknown { tag } => format!("unknown ({tag})"),
    }
}

pub fn describe_progress(progress: &Progress) -> String {
    match progress {
        Progress::Approvals {
            current,
            required,
            percentage,
        } => format!("{current}/{required} approvals ({percentage:.1}%)"),
        Progress::Payment { required, paid } => {
            format!("{} of {required} MIST", if *paid { "paid" } else { "awaiting payment" })
        }
    }
}

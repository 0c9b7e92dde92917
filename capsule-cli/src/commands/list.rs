use anyhow::Result;
use capsule_unlock::CapsuleStatus;
use clap::{Args, ValueEnum};
use colored::Colorize;

use super::Context;
use super::helpers::{describe_condition, finish, spinner, truncate};
use crate::output::{print_info, print_json};

#[derive(Args)]
pub struct ListArgs {
    /// Only show capsules that can be unlocked now
    #[arg(long)]
    pub unlockable: bool,

    /// Only show capsules with this condition type
    #[arg(long, value_enum)]
    pub capsule_type: Option<CapsuleType>,

    /// Show at most this many capsules
    #[arg(long)]
    pub limit: Option<usize>,

    /// List another owner's capsules instead of the wallet's
    #[arg(long)]
    pub owner: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum CapsuleType {
    Time,
    Multisig,
    Payment,
}

impl CapsuleType {
    fn as_str(self) -> &'static str {
        match self {
            CapsuleType::Time => "time",
            CapsuleType::Multisig => "multisig",
            CapsuleType::Payment => "payment",
        }
    }
}

/// Unlockable and type filters first, then the limit
fn apply_filters(
    mut capsules: Vec<CapsuleStatus>,
    unlockable: bool,
    capsule_type: Option<CapsuleType>,
    limit: Option<usize>,
) -> Vec<CapsuleStatus> {
    if unlockable {
        capsules.retain(|c| c.status.can_unlock && !c.capsule.unlocked);
    }
    if let Some(kind) = capsule_type {
        capsules.retain(|c| c.capsule.condition.kind() == kind.as_str());
    }
    if let Some(limit) = limit {
        capsules.truncate(limit);
    }
    capsules
}

pub async fn run(args: ListArgs, ctx: &Context) -> Result<()> {
    let engine = ctx.engine().await?;
    let owner = args.owner.clone().unwrap_or_else(|| engine.wallet.clone());

    let pb = spinner(ctx, "Loading capsules...");
    let capsules = engine.orchestrator().list(&owner).await;
    finish(pb);

    let capsules = apply_filters(capsules?, args.unlockable, args.capsule_type, args.limit);

    if ctx.json_output {
        print_json(&capsules)?;
        return Ok(());
    }

    if capsules.is_empty() {
        print_info(format!("No capsules found for {owner}"));
        return Ok(());
    }

    println!("{}", format!("Capsules for {owner}:").bold());
    for entry in &capsules {
        if ctx.verbose {
            println!();
            super::status::print_status(entry, true);
            continue;
        }
        let marker = if entry.capsule.unlocked {
            "○".blue()
        } else if entry.status.can_unlock {
            "●".green()
        } else {
            "●".yellow()
        };
        println!(
            "  {} {}  {}  {}",
            marker,
            truncate(&entry.capsule.id, 18),
            describe_condition(&entry.capsule.condition),
            entry.status.message.dimmed()
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use capsule_unlock::{Capsule, UnlockCondition, UnlockStatus};

    fn entry(id: &str, condition: UnlockCondition, can_unlock: bool, unlocked: bool) -> CapsuleStatus {
        CapsuleStatus {
            capsule: Capsule {
                id: id.into(),
                owner: "0xowner".into(),
                content_id: "cid".into(),
                content_hash: [0u8; 32],
                condition,
                created_at: 0,
                unlocked,
                nonce: None,
                key_derivation_salt: None,
                key_derivation: None,
                key_derivation_id: None,
            },
            status: UnlockStatus {
                can_unlock,
                progress: None,
                message: String::new(),
            },
        }
    }

    fn sample() -> Vec<CapsuleStatus> {
        vec![
            entry("0x1", UnlockCondition::Time { unlock_at_ms: 1 }, true, false),
            entry("0x2", UnlockCondition::Payment { price: 5, paid: false }, false, false),
            entry("0x3", UnlockCondition::Time { unlock_at_ms: 2 }, true, true),
            entry("0x4", UnlockCondition::Time { unlock_at_ms: 3 }, true, false),
            entry(
                "0x5",
                UnlockCondition::Multisig {
                    threshold: 2,
                    approvers: Default::default(),
                },
                false,
                false,
            ),
        ]
    }

    fn ids(capsules: &[CapsuleStatus]) -> Vec<&str> {
        capsules.iter().map(|c| c.capsule.id.as_str()).collect()
    }

    #[test]
    fn test_type_filter() {
        assert_eq!(ids(&apply_filters(sample(), false, Some(CapsuleType::Time), None)), ["0x1", "0x3", "0x4"]);
        assert_eq!(ids(&apply_filters(sample(), false, Some(CapsuleType::Multisig), None)), ["0x5"]);
        assert_eq!(ids(&apply_filters(sample(), false, Some(CapsuleType::Payment), None)), ["0x2"]);
    }

    #[test]
    fn test_limit_applies_after_filters() {
        assert_eq!(ids(&apply_filters(sample(), false, None, Some(2))), ["0x1", "0x2"]);
        assert_eq!(ids(&apply_filters(sample(), true, Some(CapsuleType::Time), Some(1))), ["0x1"]);
        assert_eq!(ids(&apply_filters(sample(), true, Some(CapsuleType::Time), None)), ["0x1", "0x4"]);
        assert!(apply_filters(sample(), false, None, Some(0)).is_empty());
    }

    #[test]
    fn test_capsule_type_parses_from_cli() {
        assert_eq!(CapsuleType::from_str("multisig", true).unwrap(), CapsuleType::Multisig);
        assert!(CapsuleType::from_str("lottery", true).is_err());
    }
}

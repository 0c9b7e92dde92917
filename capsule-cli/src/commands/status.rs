use anyhow::Result;
use capsule_unlock::CapsuleStatus;
use clap::Args;
use colored::Colorize;

use super::Context;
use super::helpers::{describe_condition, describe_progress, finish, format_timestamp, spinner};
use crate::output::{print_field, print_json};

#[derive(Args)]
pub struct StatusArgs {
    /// Capsule object id
    pub capsule_id: String,
}

pub async fn run(args: StatusArgs, ctx: &Context) -> Result<()> {
    let engine = ctx.engine().await?;

    let pb = spinner(ctx, "Fetching capsule...");
    let status = engine.orchestrator().status(&args.capsule_id).await;
    finish(pb);
    let status = status?;

    if ctx.json_output {
        print_json(&status)?;
        return Ok(());
    }

    print_status(&status, ctx.verbose);
    Ok(())
}

pub(super) fn print_status(entry: &CapsuleStatus, verbose: bool) {
    let capsule = &entry.capsule;
    let status = &entry.status;

    println!("{} {}", "Capsule".bold(), capsule.id);
    print_field("Owner", &capsule.owner);
    print_field("Condition", describe_condition(&capsule.condition));
    let marker = if capsule.unlocked {
        "unlocked".blue()
    } else if status.can_unlock {
        "ready".green()
    } else {
        "locked".yellow()
    };
    print_field("Status", format!("{marker} ({})", status.message));
    if let Some(progress) = &status.progress {
        print_field("Progress", describe_progress(progress));
    }
    if verbose {
        print_field("Created", format_timestamp(capsule.created_at));
        print_field("Content", &capsule.content_id);
        print_field("Hash", hex::encode(capsule.content_hash));
        let key_mode = if capsule.key_derivation_salt.is_some() { "wallet" } else { "random" };
        print_field("Key mode", key_mode);
    }
}

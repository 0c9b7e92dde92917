use anyhow::Result;
use clap::Args;
use colored::Colorize;
use serde::Serialize;

use super::Context;
use super::helpers::{finish, spinner};
use crate::output::{print_field, print_json, print_success};

#[derive(Args)]
pub struct ApproveArgs {
    /// Multisig capsule object id
    pub capsule_id: String,
}

#[derive(Serialize)]
struct Output {
    capsule_id: String,
    approver: String,
    transaction_digest: String,
    current: u32,
    required: u32,
    threshold_reached: bool,
}

pub async fn run(args: ApproveArgs, ctx: &Context) -> Result<()> {
    let engine = ctx.engine().await?;

    let pb = spinner(ctx, "Submitting approval...");
    let receipt = engine.creator().approve(&args.capsule_id).await;
    finish(pb);
    let receipt = receipt?;

    let threshold_reached = receipt.current >= receipt.required;
    if ctx.json_output {
        print_json(&Output {
            capsule_id: receipt.capsule_id,
            approver: engine.wallet,
            transaction_digest: receipt.transaction_digest,
            current: receipt.current,
            required: receipt.required,
            threshold_reached,
        })?;
        return Ok(());
    }

    print_success(format!("Approved {}", receipt.capsule_id.bold()));
    print_field("Approvals", format!("{}/{}", receipt.current, receipt.required));
    print_field("Transaction", &receipt.transaction_digest);
    if threshold_reached {
        println!("  {}", "Threshold reached; the owner can now unlock".green());
    }

    Ok(())
}

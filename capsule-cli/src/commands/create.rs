use std::path::PathBuf;

use anyhow::{Context as _, Result};
use capsule_unlock::files::content_type_for;
use capsule_unlock::{ConditionSpec, CreateRequest};
use clap::{ArgGroup, Args};
use colored::Colorize;
use serde::Serialize;

use super::Context;
use super::helpers::{build_condition, encode_key, finish, format_timestamp, parse_unlock_time, spinner};
use crate::output::{print_field, print_info, print_json, print_success, print_warning};

#[derive(Args)]
#[command(group(ArgGroup::new("condition").required(true).args(["unlock_time", "threshold", "price"])))]
pub struct CreateArgs {
    /// File to seal into the capsule
    #[arg(long)]
    pub file: PathBuf,

    /// Unlock time (epoch milliseconds or RFC 3339)
    #[arg(long, value_parser = parse_unlock_time)]
    pub unlock_time: Option<u64>,

    /// Approvals required to unlock (multisig)
    #[arg(long)]
    pub threshold: Option<u32>,

    /// Address allowed to approve (repeatable; none means anyone)
    #[arg(long = "approver", requires = "threshold")]
    pub approvers: Vec<String>,

    /// Price in MIST to unlock (payment)
    #[arg(long)]
    pub price: Option<u64>,

    /// Content type (guessed from the file extension if omitted)
    #[arg(long)]
    pub content_type: Option<String>,

    /// Encrypt under a random key instead of a wallet-derived one
    #[arg(long)]
    pub random_key: bool,

    /// Write the random key to this file instead of printing it
    #[arg(long, requires = "random_key")]
    pub save_key: Option<PathBuf>,
}

#[derive(Serialize)]
struct Output {
    capsule_id: String,
    degraded: bool,
    transaction_digest: String,
    content_id: String,
    content_hash: String,
    size: u64,
    condition: ConditionSpec,
    key_mode: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    key_file: Option<String>,
}

pub async fn run(args: CreateArgs, ctx: &Context) -> Result<()> {
    let content = tokio::fs::read(&args.file)
        .await
        .with_context(|| format!("Failed to read {}", args.file.display()))?;
    let content_type = args
        .content_type
        .clone()
        .unwrap_or_else(|| content_type_for(&args.file));

    let condition = build_condition(args.unlock_time, args.threshold, &args.approvers, args.price)?;

    let engine = ctx.engine().await?;
    let mut request = CreateRequest::new(content, content_type, condition.clone());
    if args.random_key {
        request = request.with_random_key();
    }

    let pb = spinner(ctx, "Encrypting and recording capsule...");
    let created = engine.creator().create(request).await;
    finish(pb);
    let created = created?;

    let encoded_key = created.key.as_ref().map(encode_key);
    let mut key_file = None;
    if let (Some(encoded), Some(path)) = (&encoded_key, &args.save_key) {
        tokio::fs::write(path, format!("{encoded}\n"))
            .await
            .with_context(|| format!("Failed to write key file {}", path.display()))?;
        key_file = Some(path.display().to_string());
    }

    if ctx.json_output {
        print_json(&Output {
            capsule_id: created.capsule_id.clone(),
            degraded: created.resolution.is_degraded(),
            transaction_digest: created.transaction_digest.clone(),
            content_id: created.content.content_id.clone(),
            content_hash: hex::encode(created.content.content_hash),
            size: created.content.size,
            condition,
            key_mode: if args.random_key { "random" } else { "wallet" },
            key: if key_file.is_none() { encoded_key } else { None },
            key_file,
        })?;
        return Ok(());
    }

    print_success(format!("Capsule created: {}", created.capsule_id.bold()));
    print_field("Content", &created.content.content_id);
    print_field("Transaction", &created.transaction_digest);
    match &condition {
        ConditionSpec::Time { unlock_at_ms } => print_field("Unlocks", format_timestamp(*unlock_at_ms)),
        ConditionSpec::Multisig { threshold, approvers } if approvers.is_empty() => {
            print_field("Requires", format!("{threshold} approvals from anyone"))
        }
        ConditionSpec::Multisig { threshold, approvers } => {
            print_field("Requires", format!("{threshold} of {} listed approvers", approvers.len()))
        }
        ConditionSpec::Payment { price } => print_field("Price", format!("{price} MIST")),
    }
    if ctx.verbose {
        print_field("Size", format!("{} bytes (sealed)", created.content.size));
        print_field("Hash", hex::encode(created.content.content_hash));
        if let Some(id) = &created.key_derivation_id {
            print_field("Key id", id);
        }
    }

    if created.resolution.is_degraded() {
        print_warning("Capsule object id could not be resolved; the transaction digest is shown instead");
    }

    match (&encoded_key, &key_file) {
        (_, Some(path)) => print_info(format!("Key saved to {path}")),
        (Some(encoded), None) => {
            print_warning("Random key mode: this key is the only way to decrypt the capsule");
            println!("  {}", encoded.yellow());
        }
        (None, _) => print_info("Key is derived from your wallet; nothing to keep"),
    }

    Ok(())
}

use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result};
use capsule_unlock::{UnlockError, UnlockOutcome, UnlockRequest};
use clap::Args;
use colored::Colorize;
use dialoguer::Confirm;
use serde::Serialize;

use super::Context;
use super::helpers::{finish, load_key, spinner};
use crate::output::{print_error, print_field, print_info, print_json, print_success, print_warning};

#[derive(Args)]
pub struct UnlockArgs {
    /// Capsule object id
    pub capsule_id: String,

    /// Random-mode key (base64, or a file containing it)
    #[arg(long)]
    pub key: Option<String>,

    /// Payment offered in MIST (payment capsules)
    #[arg(long)]
    pub payment: Option<u64>,

    /// Write decrypted content here (text content prints to stdout by default)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Skip confirmation prompts
    #[arg(short, long)]
    pub force: bool,
}

#[derive(Serialize)]
struct Output {
    #[serde(flatten)]
    outcome: UnlockOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    output_file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    size: Option<usize>,
}

pub async fn run(args: UnlockArgs, ctx: &Context) -> Result<()> {
    let mut request = UnlockRequest::wallet(&args.capsule_id);
    if let Some(key) = &args.key {
        request = request.with_key(load_key(key)?);
    }
    if let Some(amount) = args.payment {
        request = request.with_payment(amount);
    }

    if let Some(path) = &args.output {
        if path.exists() && !confirm(ctx, args.force, &format!("{} exists. Overwrite?", path.display()))? {
            print_info("Cancelled");
            return Ok(());
        }
    }

    let engine = ctx.engine().await?;
    let orchestrator = engine.orchestrator();

    // Unlocking submits an irrevocable transaction; already-unlocked capsules only decrypt
    if !args.force {
        let pb = spinner(ctx, "Checking capsule...");
        let current = orchestrator.status(&args.capsule_id).await;
        finish(pb);
        // A missing capsule falls through so the unlock reports it with its stage
        let unlocked = match current {
            Ok(current) => current.capsule.unlocked,
            Err(UnlockError::CapsuleNotFound(_)) => true,
            Err(_) => false,
        };
        if let Some(prompt) = unlock_prompt(&args.capsule_id, unlocked, args.payment) {
            if !confirm(ctx, args.force, &prompt)? {
                print_info("Cancelled");
                return Ok(());
            }
        }
    }

    let pb = spinner(ctx, "Unlocking capsule...");
    let outcome = orchestrator.unlock_outcome(&request).await;
    finish(pb);

    if !outcome.success {
        let message = format!(
            "Unlock failed at {}: {}",
            outcome.stage,
            outcome.error.as_deref().unwrap_or("unknown error")
        );
        if ctx.json_output {
            print_json(&Output {
                outcome,
                output_file: None,
                size: None,
            })?;
        } else if let Some(digest) = &outcome.transaction_digest {
            print_warning(format!("Unlock transaction {digest} was already submitted"));
        }
        anyhow::bail!(message);
    }

    let content = outcome.content.clone().unwrap_or_default();
    let content_type = outcome.content_type.clone().unwrap_or_default();
    let output_file = match &args.output {
        Some(path) => Some(write_content(path, &content).await?),
        None if ctx.json_output || !content_type.starts_with("text/") => {
            let path = PathBuf::from(format!("{}.bin", args.capsule_id));
            Some(write_content(&path, &content).await?)
        }
        None => None,
    };

    if ctx.json_output {
        print_json(&Output {
            size: Some(content.len()),
            outcome,
            output_file,
        })?;
        return Ok(());
    }

    match &output_file {
        Some(path) => print_success(format!("Unlocked {} → {}", args.capsule_id.bold(), path)),
        None => {
            match std::str::from_utf8(&content) {
                Ok(text) => println!("{text}"),
                Err(_) => print_error("Content is not valid UTF-8; use --output to save it"),
            }
            print_success(format!("Unlocked {}", args.capsule_id.bold()));
        }
    }
    print_field("Content type", &content_type);
    if ctx.verbose {
        print_field("Size", format!("{} bytes", content.len()));
        if let Some(id) = &outcome.content_id {
            print_field("Content", id);
        }
        match &outcome.transaction_digest {
            Some(digest) => print_field("Transaction", digest),
            None => print_field("Transaction", "none (already unlocked)"),
        }
        if let Some(object) = &outcome.unlocked_object {
            print_field("Unlock object", object.id());
        }
    }

    Ok(())
}

/// Confirmation shown before submitting an unlock; `None` when nothing will be submitted
fn unlock_prompt(capsule_id: &str, unlocked: bool, payment: Option<u64>) -> Option<String> {
    if unlocked {
        return None;
    }
    Some(match payment {
        Some(amount) => format!("Pay {amount} MIST to unlock {capsule_id}?"),
        None => format!("Proceed with unlocking {capsule_id}?"),
    })
}

fn confirm(ctx: &Context, force: bool, prompt: &str) -> Result<bool> {
    if force {
        return Ok(true);
    }
    if ctx.json_output {
        anyhow::bail!("Confirmation required; pass --force with --json");
    }
    Ok(Confirm::new().with_prompt(prompt).default(false).interact()?)
}

pub(super) async fn write_content(path: &Path, content: &[u8]) -> Result<String> {
    tokio::fs::write(path, content)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(path.display().to_string())
}

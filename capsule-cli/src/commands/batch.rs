use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::{Context as _, Result};
use capsule_core::SymmetricKey;
use capsule_unlock::{UnlockOutcome, UnlockRequest};
use clap::Args;
use colored::Colorize;
use serde::Serialize;

use super::Context;
use super::helpers::{finish, load_key, spinner};
use super::unlock::write_content;
use crate::output::{print_error, print_json, print_success};

#[derive(Args)]
pub struct BatchArgs {
    /// Capsule object ids
    #[arg(required = true)]
    pub capsule_ids: Vec<String>,

    /// Random-mode key for one capsule, as ID=KEY (base64 or a key file; repeatable)
    #[arg(long = "key", value_name = "ID=KEY")]
    pub keys: Vec<String>,

    /// Maximum unlocks in flight at once
    #[arg(long, default_value_t = 4)]
    pub max_concurrent: usize,

    /// Directory for decrypted content (`<capsule id>.bin`)
    #[arg(long)]
    pub output_dir: Option<PathBuf>,
}

#[derive(Serialize)]
struct Output {
    succeeded: usize,
    failed: usize,
    results: Vec<Entry>,
}

#[derive(Serialize)]
struct Entry {
    #[serde(flatten)]
    outcome: UnlockOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    output_file: Option<String>,
}

/// Split `ID=KEY` at the first `=`; base64 padding stays with the key
fn parse_key_assignment(arg: &str) -> Result<(String, String)> {
    let (id, key) = arg
        .split_once('=')
        .with_context(|| format!("--key expects ID=KEY, got '{arg}'"))?;
    let (id, key) = (id.trim(), key.trim());
    if id.is_empty() || key.is_empty() {
        anyhow::bail!("--key expects ID=KEY, got '{arg}'");
    }
    Ok((id.to_string(), key.to_string()))
}

/// One request per id; ids with a `--key` decrypt with that key instead of the wallet
fn build_requests(capsule_ids: &[String], key_args: &[String]) -> Result<Vec<UnlockRequest>> {
    let mut keys: HashMap<String, SymmetricKey> = HashMap::new();
    for arg in key_args {
        let (id, key) = parse_key_assignment(arg)?;
        if !capsule_ids.contains(&id) {
            anyhow::bail!("--key given for {id}, which is not in the batch");
        }
        let key = load_key(&key).with_context(|| format!("Key for {id}"))?;
        if keys.insert(id.clone(), key).is_some() {
            anyhow::bail!("--key given twice for {id}");
        }
    }

    Ok(capsule_ids
        .iter()
        .map(|id| {
            let request = UnlockRequest::wallet(id);
            match keys.get(id) {
                Some(key) => request.with_key(key.clone()),
                None => request,
            }
        })
        .collect())
}

pub async fn run(args: BatchArgs, ctx: &Context) -> Result<()> {
    if args.max_concurrent == 0 {
        anyhow::bail!("--max-concurrent must be at least 1");
    }

    let requests = build_requests(&args.capsule_ids, &args.keys)?;
    let engine = ctx.engine().await?;

    let pb = spinner(ctx, &format!("Unlocking {} capsules...", requests.len()));
    let outcomes = engine.orchestrator().unlock_batch(requests, args.max_concurrent).await;
    finish(pb);

    if let Some(dir) = &args.output_dir {
        tokio::fs::create_dir_all(dir).await?;
    }

    let mut results = Vec::with_capacity(outcomes.len());
    for outcome in outcomes {
        let output_file = match (&args.output_dir, &outcome.content) {
            (Some(dir), Some(content)) => {
                Some(write_content(&dir.join(format!("{}.bin", outcome.capsule_id)), content).await?)
            }
            _ => None,
        };
        results.push(Entry { outcome, output_file });
    }

    let succeeded = results.iter().filter(|r| r.outcome.success).count();
    let total = results.len();
    let failed = total - succeeded;

    if ctx.json_output {
        print_json(&Output {
            succeeded,
            failed,
            results,
        })?;
    } else {
        for entry in &results {
            let outcome = &entry.outcome;
            if outcome.success {
                let target = entry.output_file.as_deref().unwrap_or("not saved");
                print_success(format!("{} ({target})", outcome.capsule_id));
            } else {
                print_error(format!(
                    "{}: {} at {}",
                    outcome.capsule_id,
                    outcome.error.as_deref().unwrap_or("unknown error"),
                    outcome.stage
                ));
            }
        }
        println!();
        println!(
            "{} unlocked, {} failed",
            succeeded.to_string().green(),
            if failed > 0 { failed.to_string().red() } else { failed.to_string().normal() }
        );
    }

    if failed > 0 {
        anyhow::bail!("{failed} of {total} unlocks failed");
    }
    Ok(())
}

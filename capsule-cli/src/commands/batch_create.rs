use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result};
use capsule_unlock::files::DEFAULT_MAX_FILE_SIZE;
use capsule_unlock::{BatchOptions, ConditionSpec, CreateOutcome, CreateStatus, FileFilter, KeyMode, SkippedFile};
use clap::{ArgGroup, Args};
use colored::Colorize;
use serde::Serialize;

use super::Context;
use super::helpers::{build_condition, encode_key, finish, parse_unlock_time, spinner};
use crate::output::{print_error, print_info, print_json, print_success, print_warning};

const MAX_CONCURRENT_LIMIT: usize = 20;

#[derive(Args)]
#[command(group(ArgGroup::new("condition").required(true).args(["unlock_time", "threshold", "price"])))]
pub struct BatchCreateArgs {
    /// Files or directories to seal, one capsule per file
    #[arg(required = true)]
    pub inputs: Vec<PathBuf>,

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

    /// Encrypt each file under its own random key
    #[arg(long)]
    pub random_key: bool,

    /// Directory for random keys (`<file name>.key`); printed otherwise
    #[arg(long, requires = "random_key")]
    pub save_keys_dir: Option<PathBuf>,

    /// Descend into subdirectories
    #[arg(short, long)]
    pub recursive: bool,

    /// Only include these extensions (comma-separated)
    #[arg(long, value_delimiter = ',')]
    pub extensions: Vec<String>,

    /// Skip files larger than this many bytes
    #[arg(long, default_value_t = DEFAULT_MAX_FILE_SIZE)]
    pub max_size: u64,

    /// Capsules created at once (1-20)
    #[arg(long, default_value_t = 4)]
    pub max_concurrent: usize,

    /// Retries after a transient failure
    #[arg(long, default_value_t = 3)]
    pub retry_attempts: u32,

    /// Delay between retries in milliseconds
    #[arg(long, default_value_t = 1000)]
    pub retry_delay_ms: u64,

    /// Keep going after a file fails
    #[arg(long)]
    pub continue_on_error: bool,
}

#[derive(Serialize)]
struct Output {
    created: usize,
    failed: usize,
    skipped: usize,
    condition: ConditionSpec,
    results: Vec<Entry>,
    filtered_out: Vec<SkippedFile>,
}

#[derive(Serialize)]
struct Entry {
    file: String,
    status: &'static str,
    attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    capsule_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    transaction_digest: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    key_file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_kind: Option<&'static str>,
}

impl BatchCreateArgs {
    fn options(&self) -> Result<BatchOptions> {
        if !(1..=MAX_CONCURRENT_LIMIT).contains(&self.max_concurrent) {
            anyhow::bail!("--max-concurrent must be between 1 and {MAX_CONCURRENT_LIMIT}");
        }
        Ok(BatchOptions {
            max_concurrent: self.max_concurrent,
            retry_attempts: self.retry_attempts,
            retry_delay_ms: self.retry_delay_ms,
            continue_on_error: self.continue_on_error,
        })
    }

    fn filter(&self) -> FileFilter {
        FileFilter::new()
            .with_max_size(self.max_size)
            .with_extensions(self.extensions.clone())
            .recursive(self.recursive)
    }
}

/// Key file name for an input file; unique as long as labels are
fn key_file_name(index: usize, file: &Path) -> String {
    let stem = file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "capsule".into());
    format!("{index:03}-{stem}.key")
}

pub async fn run(args: BatchCreateArgs, ctx: &Context) -> Result<()> {
    let options = args.options()?;
    let condition = build_condition(args.unlock_time, args.threshold, &args.approvers, args.price)?;
    condition.validate()?;

    let selection = args.filter().select(&args.inputs)?;
    if selection.files.is_empty() {
        anyhow::bail!("No files matched ({} filtered out)", selection.skipped.len());
    }
    if !ctx.json_output {
        print_info(format!(
            "Sealing {} files ({} bytes), {} filtered out",
            selection.files.len(),
            selection.total_size(),
            selection.skipped.len()
        ));
        if ctx.verbose {
            for skipped in &selection.skipped {
                print_warning(format!("{}: {}", skipped.path.display(), skipped.reason));
            }
        }
    }

    let key_mode = if args.random_key { KeyMode::Random } else { KeyMode::Wallet };
    let mut items = Vec::with_capacity(selection.files.len());
    for file in &selection.files {
        items.push((file.path.display().to_string(), file.load(condition.clone(), key_mode).await?));
    }

    let engine = ctx.engine().await?;
    let pb = spinner(ctx, &format!("Creating {} capsules...", items.len()));
    let outcomes = engine.creator().create_batch(items, &options).await;
    finish(pb);

    if let Some(dir) = &args.save_keys_dir {
        tokio::fs::create_dir_all(dir)
            .await
            .with_context(|| format!("Failed to create {}", dir.display()))?;
    }

    let mut results = Vec::with_capacity(outcomes.len());
    for (index, (outcome, file)) in outcomes.iter().zip(&selection.files).enumerate() {
        results.push(entry(outcome, index, &file.path, args.save_keys_dir.as_deref()).await?);
    }

    let created = outcomes.iter().filter(|o| o.created().is_some()).count();
    let skipped = outcomes.iter().filter(|o| o.is_skipped()).count();
    let failed = outcomes.len() - created - skipped;

    if ctx.json_output {
        print_json(&Output {
            created,
            failed,
            skipped,
            condition,
            results,
            filtered_out: selection.skipped,
        })?;
    } else {
        for entry in &results {
            match entry.status {
                "created" => {
                    print_success(format!("{} → {}", entry.file, entry.capsule_id.as_deref().unwrap_or("?").bold()));
                    match (&entry.key_file, &entry.key) {
                        (Some(path), _) => println!("    key: {path}"),
                        (None, Some(key)) => println!("    key: {}", key.yellow()),
                        (None, None) => {}
                    }
                }
                "skipped" => print_warning(format!("{}: not attempted", entry.file)),
                _ => print_error(format!(
                    "{}: {} (after {} attempts)",
                    entry.file,
                    entry.error.as_deref().unwrap_or("unknown error"),
                    entry.attempts
                )),
            }
        }
        println!();
        println!(
            "{} created, {} failed, {} skipped",
            created.to_string().green(),
            if failed > 0 { failed.to_string().red() } else { failed.to_string().normal() },
            skipped
        );
        if args.random_key && args.save_keys_dir.is_none() && created > 0 {
            print_warning("Random key mode: each key above is the only way to decrypt its capsule");
        }
    }

    if failed + skipped > 0 {
        anyhow::bail!("{} of {} capsules were not created", failed + skipped, outcomes.len());
    }
    Ok(())
}

async fn entry(outcome: &CreateOutcome, index: usize, file: &Path, keys_dir: Option<&Path>) -> Result<Entry> {
    let mut entry = Entry {
        file: outcome.label.clone(),
        status: "failed",
        attempts: outcome.attempts,
        capsule_id: None,
        transaction_digest: None,
        key: None,
        key_file: None,
        error: None,
        error_kind: None,
    };

    match &outcome.status {
        CreateStatus::Created(created) => {
            entry.status = "created";
            entry.capsule_id = Some(created.capsule_id.clone());
            entry.transaction_digest = Some(created.transaction_digest.clone());
            if let Some(key) = &created.key {
                let encoded = encode_key(key);
                match keys_dir {
                    Some(dir) => {
                        let path = dir.join(key_file_name(index, file));
                        tokio::fs::write(&path, format!("{encoded}\n"))
                            .await
                            .with_context(|| format!("Failed to write key file {}", path.display()))?;
                        entry.key_file = Some(path.display().to_string());
                    }
                    None => entry.key = Some(encoded),
                }
            }
        }
        CreateStatus::Failed(e) => {
            entry.error = Some(e.to_string());
            entry.error_kind = Some(e.kind());
        }
        CreateStatus::Skipped => entry.status = "skipped",
    }
    Ok(entry)
}

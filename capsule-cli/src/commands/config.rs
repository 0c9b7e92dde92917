use anyhow::Result;
use clap::Subcommand;
use colored::Colorize;

use super::Context;
use crate::config::Config;
use crate::output::{print_info, print_json, print_success};

const KEYS: &str = "wallet_address, output_format, ledger_path, key_derivation, transport.backend, \
                    transport.local_path, transport.ipfs_url, engine.resolve_attempts, engine.resolve_delay_ms";

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show,
    /// Set a configuration value
    Set {
        /// Configuration key
        key: String,
        /// Configuration value
        value: String,
    },
    /// Write a config file with default values
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

pub async fn run(action: ConfigCommand, ctx: &Context) -> Result<()> {
    match action {
        ConfigCommand::Show => show(ctx).await,
        ConfigCommand::Set { key, value } => set(ctx, key, value).await,
        ConfigCommand::Init { force } => init(ctx, force).await,
    }
}

async fn show(ctx: &Context) -> Result<()> {
    let path = ctx.config_path()?;
    let config = Config::load(&path)?;

    if ctx.json_output {
        return print_json(&config);
    }

    println!("{} {}", "Configuration:".bold(), path.display().to_string().dimmed());
    println!(
        "  {}: {}",
        "wallet_address".dimmed(),
        config.wallet_address.as_deref().unwrap_or("(not set)")
    );
    println!("    {}", "Example: 0x7a1f... (or --wallet-address)".bright_black());

    println!("  {}: {}", "output_format".dimmed(), config.output_format);
    println!("    {}", "Valid: pretty, json".bright_black());

    println!("  {}: {}", "ledger_path".dimmed(), config.ledger_path()?.display());
    println!("  {}: {}", "key_derivation".dimmed(), config.key_derivation);
    println!("    {}", "Valid: blake3, argon2id-m<KiB>-t<iterations>-p<lanes>".bright_black());

    println!("  {}: {}", "transport.backend".dimmed(), config.transport.backend);
    println!("    {}", "Valid: local, ipfs".bright_black());
    println!("  {}: {}", "transport.local_path".dimmed(), config.content_path()?.display());
    println!("  {}: {}", "transport.ipfs_url".dimmed(), config.transport.ipfs_url);

    println!("  {}: {}", "engine.resolve_attempts".dimmed(), config.engine.resolve_attempts);
    println!("  {}: {}", "engine.resolve_delay_ms".dimmed(), config.engine.resolve_delay_ms);

    println!();
    println!("{}", "To set a value:".dimmed());
    println!("  capsule config set <key> <value>");

    Ok(())
}

async fn set(ctx: &Context, key: String, value: String) -> Result<()> {
    let path = ctx.config_path()?;
    let mut config = Config::load_file(&path)?;

    match key.as_str() {
        "wallet_address" => config.wallet_address = Some(value.clone()),
        "output_format" => {
            if !matches!(value.as_str(), "pretty" | "json") {
                anyhow::bail!("Invalid output_format '{value}'. Valid: pretty, json");
            }
            config.output_format = value.clone();
        }
        "ledger_path" => config.ledger_path = Some(value.clone()),
        "key_derivation" => {
            value
                .parse::<capsule_core::KeyDerivation>()
                .map_err(|e| anyhow::anyhow!("{e}"))?;
            config.key_derivation = value.clone();
        }
        "transport.backend" => {
            if !matches!(value.as_str(), "local" | "ipfs") {
                anyhow::bail!("Invalid transport.backend '{value}'. Valid: local, ipfs");
            }
            config.transport.backend = value.clone();
        }
        "transport.local_path" => config.transport.local_path = Some(value.clone()),
        "transport.ipfs_url" => config.transport.ipfs_url = value.clone(),
        "engine.resolve_attempts" => config.engine.resolve_attempts = value.parse()?,
        "engine.resolve_delay_ms" => config.engine.resolve_delay_ms = value.parse()?,
        _ => anyhow::bail!("Unknown config key: {key}\nValid keys: {KEYS}"),
    }

    config.save(&path)?;
    print_success(format!("Set {key} = {value}"));
    Ok(())
}

async fn init(ctx: &Context, force: bool) -> Result<()> {
    let path = ctx.config_path()?;
    if path.exists() && !force {
        anyhow::bail!("{} already exists (use --force to overwrite)", path.display());
    }

    let mut config = Config::default();
    config.wallet_address = ctx.wallet_override.clone();
    config.save(&path)?;

    print_success(format!("Wrote {}", path.display()));
    if config.wallet_address.is_none() {
        print_info("Set your wallet with: capsule config set wallet_address <address>");
    }
    Ok(())
}

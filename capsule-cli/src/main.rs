use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, fmt};

mod commands;
mod config;
mod output;

#[derive(Parser)]
#[command(name = "capsule")]
#[command(about = "Wallet-bound encrypted time capsules")]
#[command(version)]
struct Cli {
    /// Output format
    #[arg(long, global = true)]
    json: bool,

    /// Config file (defaults to the platform config directory)
    #[arg(long, global = true, env = "CAPSULE_CONFIG")]
    config: Option<std::path::PathBuf>,

    /// Wallet address acting as transaction sender
    #[arg(long, global = true, env = "CAPSULE_WALLET_ADDRESS")]
    wallet_address: Option<String>,

    /// Ledger file
    #[arg(long, global = true, env = "CAPSULE_LEDGER")]
    ledger: Option<std::path::PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Enable debug instrumentation (timing, detailed logs)
    #[arg(long, global = true, env = "CAPSULE_DEBUG")]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Encrypt a file and record it in a new capsule
    Create(commands::create::CreateArgs),
    /// Seal many files at once, one capsule per file
    BatchCreate(commands::batch_create::BatchCreateArgs),
    /// Unlock a capsule and decrypt its content
    Unlock(commands::unlock::UnlockArgs),
    /// Approve a multisig capsule
    Approve(commands::approve::ApproveArgs),
    /// Show a capsule and whether it can be unlocked
    Status(commands::status::StatusArgs),
    /// List capsules owned by the wallet
    List(commands::list::ListArgs),
    /// Unlock several capsules concurrently
    BatchUnlock(commands::batch::BatchArgs),
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigCommand,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.debug {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("capsule_cli=debug,capsule_unlock=debug,capsule_storage=debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("capsule_cli=warn,capsule_unlock=warn"))
    };

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_timer(fmt::time::uptime())
        .with_writer(std::io::stderr)
        .init();

    let ctx = commands::Context {
        json_output: cli.json || config::Config::prefers_json(cli.config.as_deref()),
        config_override: cli.config,
        wallet_override: cli.wallet_address,
        ledger_override: cli.ledger,
        verbose: cli.verbose,
    };

    match cli.command {
        Commands::Create(args) => commands::create::run(args, &ctx).await,
        Commands::BatchCreate(args) => commands::batch_create::run(args, &ctx).await,
        Commands::Unlock(args) => commands::unlock::run(args, &ctx).await,
        Commands::Approve(args) => commands::approve::run(args, &ctx).await,
        Commands::Status(args) => commands::status::run(args, &ctx).await,
        Commands::List(args) => commands::list::run(args, &ctx).await,
        Commands::BatchUnlock(args) => commands::batch::run(args, &ctx).await,
        Commands::Config { action } => commands::config::run(action, &ctx).await,
    }
}

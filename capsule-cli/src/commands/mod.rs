pub mod approve;
pub mod batch;
pub mod batch_create;
pub mod config;
pub mod create;
pub mod helpers;
pub mod list;
pub mod status;
pub mod unlock;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context as _, Result};
use capsule_core::KeyDerivation;
use capsule_storage::{ContentTransport, EncryptedStore, LocalFileTransport};
use capsule_unlock::{CapsuleCreator, ChainClient, LocalLedger, SystemClock, UnlockOrchestrator};

use crate::config::Config;

/// Global context passed to all commands
pub struct Context {
    pub json_output: bool,
    pub config_override: Option<PathBuf>,
    pub wallet_override: Option<String>,
    pub ledger_override: Option<PathBuf>,
    pub verbose: bool,
}

/// Collaborators shared by the capsule commands
pub struct Engine {
    pub wallet: String,
    pub chain: Arc<dyn ChainClient>,
    pub store: EncryptedStore,
    pub config: Config,
}

impl Context {
    /// Config file path: --config flag, else the platform default
    pub fn config_path(&self) -> Result<PathBuf> {
        match &self.config_override {
            Some(path) => Ok(path.clone()),
            None => Config::default_path(),
        }
    }

    pub fn load_config(&self) -> Result<Config> {
        Config::load(&self.config_path()?)
    }

    /// Resolve the acting wallet, with priority:
    /// 1. --wallet-address flag (or CAPSULE_WALLET_ADDRESS)
    /// 2. Config file wallet_address
    pub fn resolve_wallet(&self, config: &Config) -> Result<String> {
        if let Some(address) = &self.wallet_override {
            return Ok(address.clone());
        }
        config.wallet_address.clone().ok_or_else(|| {
            anyhow::anyhow!(
                "No wallet address configured.\n\
                 Pass --wallet-address or run: capsule config set wallet_address <address>"
            )
        })
    }

    /// Open the ledger and content transport for the acting wallet
    pub async fn engine(&self) -> Result<Engine> {
        let config = self.load_config()?;
        let wallet = self.resolve_wallet(&config)?;

        let ledger_path = match &self.ledger_override {
            Some(path) => path.clone(),
            None => config.ledger_path()?,
        };
        tracing::debug!(ledger = %ledger_path.display(), wallet = %wallet, "Opening ledger");
        let ledger = LocalLedger::open(&ledger_path, wallet.clone(), Arc::new(SystemClock))
            .await
            .with_context(|| format!("Failed to open ledger {}", ledger_path.display()))?;

        let key_derivation: KeyDerivation = config
            .key_derivation
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid key_derivation in config: {e}"))?;
        let store = EncryptedStore::new(create_transport(&config).await?).with_key_derivation(key_derivation);

        Ok(Engine {
            wallet,
            chain: Arc::new(ledger),
            store,
            config,
        })
    }
}

impl Engine {
    pub fn orchestrator(&self) -> UnlockOrchestrator {
        UnlockOrchestrator::new(
            self.chain.clone(),
            self.store.clone(),
            Arc::new(SystemClock),
            self.config.engine.clone(),
        )
    }

    pub fn creator(&self) -> CapsuleCreator {
        CapsuleCreator::new(self.chain.clone(), self.store.clone(), self.config.engine.clone())
    }
}

/// Build the configured content transport
pub async fn create_transport(config: &Config) -> Result<Arc<dyn ContentTransport>> {
    match config.transport.backend.as_str() {
        "local" => {
            let root = config.content_path()?;
            let transport = LocalFileTransport::new(&root)
                .await
                .with_context(|| format!("Failed to open content directory {}", root.display()))?;
            Ok(Arc::new(transport))
        }
        #[cfg(feature = "ipfs")]
        "ipfs" => Ok(Arc::new(capsule_storage::IpfsTransport::new(config.transport.ipfs_url.clone()))),
        #[cfg(not(feature = "ipfs"))]
        "ipfs" => anyhow::bail!("IPFS transport requires building with the `ipfs` feature"),
        other => anyhow::bail!("Unknown transport backend '{other}' (valid: local, ipfs)"),
    }
}

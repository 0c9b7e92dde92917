// Config file handling
//
// Layering: built-in defaults < TOML file < CAPSULE_* environment
// (nested keys use `__`, e.g. CAPSULE_TRANSPORT__BACKEND=ipfs).

use anyhow::{Context as _, Result};
use capsule_unlock::EngineConfig;
use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub wallet_address: Option<String>,
    #[serde(default = "default_output_format")]
    pub output_format: String,
    pub ledger_path: Option<String>,
    #[serde(default)]
    pub transport: TransportConfig,
    #[serde(default = "default_key_derivation")]
    pub key_derivation: String,
    #[serde(default)]
    pub engine: EngineConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    #[serde(default = "default_backend")]
    pub backend: String, // "local", "ipfs"
    pub local_path: Option<String>,
    #[serde(default = "default_ipfs_url")]
    pub ipfs_url: String,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            local_path: None,
            ipfs_url: default_ipfs_url(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            wallet_address: None,
            output_format: default_output_format(),
            ledger_path: None,
            transport: TransportConfig::default(),
            key_derivation: default_key_derivation(),
            engine: EngineConfig::default(),
        }
    }
}

fn default_output_format() -> String {
    "pretty".into()
}
fn default_key_derivation() -> String {
    "blake3".into()
}
fn default_backend() -> String {
    "local".into()
}
fn default_ipfs_url() -> String {
    "http://127.0.0.1:5001".into()
}

impl Config {
    /// Effective configuration: defaults, then the file, then the environment
    pub fn load(path: &Path) -> Result<Self> {
        let config: Config = Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed("CAPSULE_").split("__"))
            .extract()
            .with_context(|| format!("Invalid configuration ({})", path.display()))?;
        Ok(config)
    }

    /// File contents only, without environment overrides (for editing)
    pub fn load_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents).with_context(|| format!("Failed to parse {}", path.display()))?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Whether the effective config asks for JSON output. Unreadable config means no.
    pub fn prefers_json(path_override: Option<&Path>) -> bool {
        let path = match path_override {
            Some(path) => path.to_path_buf(),
            None => match Self::default_path() {
                Ok(path) => path,
                Err(_) => return false,
            },
        };
        Self::load(&path).is_ok_and(|c| c.output_format == "json")
    }

    pub fn default_path() -> Result<PathBuf> {
        // Uses platform-specific config directories:
        //   macOS:   ~/Library/Application Support/io.capsule-vault.capsule/
        //   Linux:   ~/.config/capsule/
        //   Windows: C:\Users\<user>\AppData\Roaming\capsule-vault\capsule\
        Ok(project_dirs()?.config_dir().join("config.toml"))
    }

    pub fn ledger_path(&self) -> Result<PathBuf> {
        match &self.ledger_path {
            Some(path) => Ok(PathBuf::from(path)),
            None => Ok(project_dirs()?.data_dir().join("ledger.json")),
        }
    }

    pub fn content_path(&self) -> Result<PathBuf> {
        match &self.transport.local_path {
            Some(path) => Ok(PathBuf::from(path)),
            None => Ok(project_dirs()?.data_dir().to_path_buf()),
        }
    }
}

fn project_dirs() -> Result<ProjectDirs> {
    ProjectDirs::from("io", "capsule-vault", "capsule")
        .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_gives_defaults() {
        let temp = TempDir::new().unwrap();
        let config = Config::load_file(&temp.path().join("absent.toml")).unwrap();
        assert_eq!(config.output_format, "pretty");
        assert_eq!(config.transport.backend, "local");
        assert_eq!(config.engine.resolve_attempts, 3);
    }

    #[test]
    fn test_save_and_reload() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.wallet_address = Some("0xabc".into());
        config.engine.resolve_delay_ms = 250;
        config.save(&path).unwrap();

        let loaded = Config::load_file(&path).unwrap();
        assert_eq!(loaded.wallet_address.as_deref(), Some("0xabc"));
        assert_eq!(loaded.engine.resolve_delay_ms, 250);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        std::fs::write(&path, "[transport]\nbackend = \"ipfs\"\n").unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.transport.backend, "ipfs");
        assert_eq!(config.transport.ipfs_url, "http://127.0.0.1:5001");
        assert_eq!(config.key_derivation, "blake3");
    }
}

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use crate::error::{ExplorerError, Result};
use crate::indexer::address_indexer::UpdaterSettings;
use crate::indexer::follower::RetryPolicy;

pub const RPC_USER_ENV: &str = "VIA_RPC_USER";
pub const RPC_PASSWORD_ENV: &str = "VIA_RPC_PASSWORD";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub rpc: RpcConfig,
    pub chain: ChainConfig,
    pub database: DatabaseConfig,
    pub indexer: IndexerConfig,
    pub api: ApiConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RpcConfig {
    pub url: String,
    pub user: String,
    pub password: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainConfig {
    /// Chain identifier the node must report (`main`, `test`, `regtest`).
    pub expected_chain: String,
    /// Path segment of the query API.
    pub symbol: String,
    /// Pool signatures; the bundled table is used when unset.
    pub pools_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: PathBuf,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexerConfig {
    pub poll_interval_secs: u64,
    pub concurrency: usize,
    pub lock_stripes: usize,
    pub max_conflict_retries: usize,
    pub start_height: u64,
    pub retry_max_elapsed_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub enabled: bool,
    pub bind_address: String,
    pub port: u16,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:5222".to_string(),
            user: "via".to_string(),
            password: String::new(),
            timeout_secs: 30,
        }
    }
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            expected_chain: "main".to_string(),
            symbol: "via".to_string(),
            pools_file: None,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./data/via_explorer.db"),
            max_connections: 8,
        }
    }
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 5,
            concurrency: 16,
            lock_stripes: 256,
            max_conflict_retries: 5,
            start_height: 0,
            retry_max_elapsed_secs: 120,
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind_address: "127.0.0.1".to_string(),
            port: 3000,
        }
    }
}

impl RpcConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}

impl IndexerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }

    pub fn updater_settings(&self) -> UpdaterSettings {
        UpdaterSettings {
            lock_stripes: self.lock_stripes,
            max_conflict_retries: self.max_conflict_retries,
            concurrency: self.concurrency,
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_elapsed: Duration::from_secs(self.retry_max_elapsed_secs),
            ..RetryPolicy::default()
        }
    }
}

impl Config {
    /// Load configuration from file if it exists, otherwise use defaults
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Config::default());
        }
        let content = fs::read_to_string(path)
            .map_err(|e| ExplorerError::Config(format!("Failed to read {}: {}", path.display(), e)))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| ExplorerError::Config(format!("Failed to parse config: {}", e)))
    }

    /// Credentials from the environment take precedence over the file.
    pub fn apply_env_overrides(&mut self) {
        self.apply_env_from(|key| std::env::var(key).ok());
    }

    fn apply_env_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(user) = lookup(RPC_USER_ENV) {
            self.rpc.user = user;
        }
        if let Some(password) = lookup(RPC_PASSWORD_ENV) {
            self.rpc.password = password;
        }
    }

    /// Override config with CLI arguments
    pub fn apply_cli_overrides(&mut self, args: &crate::cli::Args) {
        if let Some(url) = &args.rpc_url {
            self.rpc.url = url.clone();
        }
        if let Some(chain) = &args.chain {
            self.chain.expected_chain = chain.clone();
        }
        if let Some(path) = &args.database_path {
            self.database.path = path.clone();
        }
        if let Some(pools) = &args.pools_file {
            self.chain.pools_file = Some(pools.clone());
        }
        if let Some(port) = args.api_port {
            self.api.port = port;
        }
        if args.no_api {
            self.api.enabled = false;
        }
        if let Some(height) = args.start_height {
            self.indexer.start_height = height;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.indexer.concurrency == 0 {
            return Err(ExplorerError::Config("indexer.concurrency must be positive".into()));
        }
        if self.indexer.lock_stripes == 0 {
            return Err(ExplorerError::Config("indexer.lock_stripes must be positive".into()));
        }
        if self.chain.symbol.is_empty() || self.chain.symbol.contains('/') {
            return Err(ExplorerError::Config(format!("invalid chain.symbol {:?}", self.chain.symbol)));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use crate::cli::Args;
    use tempfile::tempdir;

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempdir().unwrap();
        let config = Config::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.chain.expected_chain, "main");
        assert_eq!(config.indexer.lock_stripes, 256);
        assert_eq!(config.indexer.max_conflict_retries, 5);
        config.validate().unwrap();
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let config = Config::from_toml(
            r#"
            [rpc]
            url = "http://node:5222"
            timeout_secs = 5

            [chain]
            expected_chain = "test"
            "#,
        )
        .unwrap();
        assert_eq!(config.rpc.url, "http://node:5222");
        assert_eq!(config.rpc.timeout(), Duration::from_secs(5));
        assert_eq!(config.rpc.user, "via");
        assert_eq!(config.chain.expected_chain, "test");
        assert_eq!(config.chain.symbol, "via");
        assert_eq!(config.api.port, 3000);
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let err = Config::from_toml("[rpc\nurl=").unwrap_err();
        assert!(matches!(err, ExplorerError::Config(_)));
    }

    #[test]
    fn test_env_overrides_credentials() {
        let mut config = Config::default();
        config.apply_env_from(|key| match key {
            RPC_USER_ENV => Some("alice".to_string()),
            RPC_PASSWORD_ENV => Some("secret".to_string()),
            _ => None,
        });
        assert_eq!(config.rpc.user, "alice");
        assert_eq!(config.rpc.password, "secret");
    }

    #[test]
    fn test_cli_overrides() {
        let args = Args::parse_from([
            "via-explorer",
            "--rpc-url",
            "http://10.0.0.2:5222",
            "--chain",
            "regtest",
            "--no-api",
            "--start-height",
            "100",
            "run",
        ]);
        let mut config = Config::default();
        config.apply_cli_overrides(&args);
        assert_eq!(config.rpc.url, "http://10.0.0.2:5222");
        assert_eq!(config.chain.expected_chain, "regtest");
        assert!(!config.api.enabled);
        assert_eq!(config.indexer.start_height, 100);
    }

    #[test]
    fn test_validate_rejects_zero_stripes() {
        let mut config = Config::default();
        config.indexer.lock_stripes = 0;
        assert!(config.validate().is_err());
    }
}

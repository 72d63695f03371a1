//! Configuration Management Module
//!
//! This module handles loading and managing configuration for the bridge relayer.
//! Configuration covers the M-of-N signer set, every chain the relayer watches or
//! submits to, relay timing (polling, timeouts, retries, retention), the request
//! store location, and the status API. Secrets are read from environment variables
//! named in the file.

use anyhow::Context;
use bridge_common::crypto::parse_public_key;
use bridge_common::{ChainFamily, DomainId};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;

/// Environment variable holding the config file path.
pub const CONFIG_PATH_ENV: &str = "RELAYER_CONFIG_PATH";
const DEFAULT_CONFIG_PATH: &str = "config/relayer.toml";
const ENV_PREFIX: &str = "RELAYER";

// ============================================================================
// CONFIGURATION STRUCTURES
// ============================================================================

/// Main configuration structure containing all relayer settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Threshold, timing and secrets
    pub relayer: RelayerConfig,
    /// Source and destination chains
    #[serde(default)]
    pub chains: Vec<ChainConfig>,
    /// The N signer nodes, one entry per index
    #[serde(default)]
    pub signers: Vec<SignerConfig>,
    /// Status API server configuration
    pub api: ApiConfig,
}

/// Relay behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayerConfig {
    /// Signatures required before a request may be executed (M)
    pub threshold: usize,
    /// Size of the signer set (N)
    pub total_signers: usize,
    /// Watcher tick and aggregator cycle interval in milliseconds
    #[serde(default = "default_polling_interval_ms")]
    pub polling_interval_ms: u64,
    /// Bound on each signer `sign` call in milliseconds
    #[serde(default = "default_signer_timeout_ms")]
    pub signer_timeout_ms: u64,
    /// Bound on each chain RPC call in milliseconds
    #[serde(default = "default_rpc_timeout_ms")]
    pub rpc_timeout_ms: u64,
    /// Failed submissions allowed per request before it is marked exhausted
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Minimum delay between two submission attempts of the same message
    #[serde(default = "default_retry_cooldown_ms")]
    pub retry_cooldown_ms: u64,
    /// Age after which confirmed or exhausted requests are deleted
    #[serde(default = "default_retention_secs")]
    pub retention_secs: u64,
    #[serde(default = "default_cleanup_interval_ms")]
    pub cleanup_interval_ms: u64,
    /// Directory of the sled request store
    #[serde(default = "default_store_path")]
    pub store_path: String,
    /// Environment variable name containing the relayer's secp256k1 private key (hex)
    /// Default: "RELAYER_PRIVATE_KEY"
    #[serde(default = "default_private_key_env")]
    pub private_key_env: String,
    /// Environment variable name containing the shared secret sent to signer nodes
    /// Default: "BRIDGE_SIGNER_AUTH_TOKEN"
    #[serde(default = "default_signer_auth_token_env")]
    pub signer_auth_token_env: String,
    /// Receipt polls after a broadcast before the request is left to reconciliation
    #[serde(default = "default_receipt_poll_attempts")]
    pub receipt_poll_attempts: u32,
    #[serde(default = "default_receipt_poll_interval_ms")]
    pub receipt_poll_interval_ms: u64,
}

fn default_polling_interval_ms() -> u64 {
    5_000
}

fn default_signer_timeout_ms() -> u64 {
    5_000
}

fn default_rpc_timeout_ms() -> u64 {
    10_000
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_cooldown_ms() -> u64 {
    60_000
}

fn default_retention_secs() -> u64 {
    7 * 24 * 60 * 60
}

fn default_cleanup_interval_ms() -> u64 {
    60 * 60 * 1000
}

fn default_store_path() -> String {
    "data/relayer-store".to_string()
}

fn default_private_key_env() -> String {
    "RELAYER_PRIVATE_KEY".to_string()
}

fn default_signer_auth_token_env() -> String {
    "BRIDGE_SIGNER_AUTH_TOKEN".to_string()
}

fn default_receipt_poll_attempts() -> u32 {
    30
}

fn default_receipt_poll_interval_ms() -> u64 {
    500
}

impl RelayerConfig {
    /// Loads the relayer's destination-chain private key from the environment variable.
    ///
    /// # Returns
    ///
    /// * `Ok(String)` - The private key (hex encoded)
    /// * `Err(anyhow::Error)` - Failed to load from environment
    pub fn get_private_key(&self) -> anyhow::Result<String> {
        std::env::var(&self.private_key_env).map_err(|_| {
            anyhow::anyhow!(
                "Environment variable '{}' not set. Please set it with the relayer's secp256k1 private key (hex encoded).",
                self.private_key_env
            )
        })
    }

    /// Loads the shared secret presented to signer nodes.
    pub fn get_signer_auth_token(&self) -> anyhow::Result<String> {
        match std::env::var(&self.signer_auth_token_env) {
            Ok(token) if !token.is_empty() => Ok(token),
            _ => Err(anyhow::anyhow!(
                "Environment variable '{}' not set. Signer nodes reject unauthenticated /sign calls.",
                self.signer_auth_token_env
            )),
        }
    }

    pub fn polling_interval(&self) -> Duration {
        Duration::from_millis(self.polling_interval_ms)
    }

    pub fn signer_timeout(&self) -> Duration {
        Duration::from_millis(self.signer_timeout_ms)
    }

    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_millis(self.rpc_timeout_ms)
    }

    pub fn retry_cooldown(&self) -> Duration {
        Duration::from_millis(self.retry_cooldown_ms)
    }

    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_secs)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_millis(self.cleanup_interval_ms)
    }

    pub fn receipt_poll_interval(&self) -> Duration {
        Duration::from_millis(self.receipt_poll_interval_ms)
    }
}

/// A chain the relayer watches (source) and/or executes on (destination).
///
/// Every configured chain is watched for lock/burn events. EVM chains with an
/// `evm_chain_id` are also destinations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainConfig {
    /// Chain tag, sent to signers as `sourceChain` (e.g. "ethereum")
    pub name: String,
    /// Bridge domain id of this chain
    pub domain_id: DomainId,
    /// RPC dialect and event layout
    pub family: ChainFamily,
    /// RPC endpoint URL
    pub rpc_url: String,
    /// Bridge contract address (EVM) or bridge program id (SVM)
    pub bridge_address: String,
    /// Blocks (EVM) or slots (SVM) an event must be buried under before ingestion
    #[serde(default)]
    pub confirmation_depth: u64,
    /// EIP-155 chain id; required for the chain to act as a destination
    #[serde(default)]
    pub evm_chain_id: Option<u64>,
    /// Gas limit of execution transactions
    #[serde(default = "default_gas_limit")]
    pub gas_limit: u64,
    /// Largest range scanned in one watcher tick
    #[serde(default)]
    pub max_block_range: Option<u64>,
    /// First height scanned when no cursor is persisted yet
    #[serde(default)]
    pub start_height: Option<u64>,
    /// How far back to search `RequestExecuted` logs for an already executed request
    #[serde(default = "default_execution_lookback_blocks")]
    pub execution_lookback_blocks: u64,
}

fn default_gas_limit() -> u64 {
    2_000_000
}

fn default_execution_lookback_blocks() -> u64 {
    10_000
}

impl ChainConfig {
    pub fn is_destination(&self) -> bool {
        self.family == ChainFamily::Evm && self.evm_chain_id.is_some()
    }
}

/// One signer node of the M-of-N set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignerConfig {
    /// Signer index (0-based, unique, below `total_signers`)
    pub index: u32,
    /// Base URL of the signer API (e.g. "http://signer-0:3100")
    pub endpoint: String,
    /// SEC1 secp256k1 public key (hex) the signer's attestations must recover to
    pub public_key: String,
}

/// API server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Host address to bind the API server to
    pub host: String,
    /// Port number to bind the API server to
    pub port: u16,
    /// Allowed CORS origins for cross-origin requests
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

// ============================================================================
// CONFIGURATION LOADING AND MANAGEMENT
// ============================================================================

impl Config {
    /// Validates the configuration.
    ///
    /// This function ensures that:
    /// - 0 < M <= N and exactly N signers with unique in-range indices are configured
    /// - Every signer public key parses
    /// - Chain names and domain ids are unique, SVM chains carry no `evm_chain_id`
    /// - Intervals, timeouts and poll counts are non-zero
    ///
    /// # Returns
    ///
    /// - `Ok(())` - Configuration is valid
    /// - `Err(anyhow::Error)` - The first problem found
    pub fn validate(&self) -> anyhow::Result<()> {
        let relayer = &self.relayer;

        if relayer.threshold == 0 {
            anyhow::bail!("Configuration error: relayer.threshold must be at least 1");
        }
        if relayer.threshold > relayer.total_signers {
            anyhow::bail!(
                "Configuration error: relayer.threshold ({}) exceeds relayer.total_signers ({})",
                relayer.threshold,
                relayer.total_signers
            );
        }
        if self.signers.len() != relayer.total_signers {
            anyhow::bail!(
                "Configuration error: {} [[signers]] configured but relayer.total_signers is {}",
                self.signers.len(),
                relayer.total_signers
            );
        }

        let mut indices = HashSet::new();
        for signer in &self.signers {
            if signer.index as usize >= relayer.total_signers {
                anyhow::bail!(
                    "Configuration error: signer index {} is out of range (total_signers = {})",
                    signer.index,
                    relayer.total_signers
                );
            }
            if !indices.insert(signer.index) {
                anyhow::bail!(
                    "Configuration error: signer index {} is used more than once",
                    signer.index
                );
            }
            parse_public_key(&signer.public_key).with_context(|| {
                format!(
                    "Configuration error: signer {} has an invalid public_key",
                    signer.index
                )
            })?;
        }

        for (name, value) in [
            ("polling_interval_ms", relayer.polling_interval_ms),
            ("signer_timeout_ms", relayer.signer_timeout_ms),
            ("rpc_timeout_ms", relayer.rpc_timeout_ms),
            ("cleanup_interval_ms", relayer.cleanup_interval_ms),
            ("receipt_poll_interval_ms", relayer.receipt_poll_interval_ms),
        ] {
            if value == 0 {
                anyhow::bail!("Configuration error: relayer.{} must be greater than 0", name);
            }
        }
        if relayer.receipt_poll_attempts == 0 {
            anyhow::bail!("Configuration error: relayer.receipt_poll_attempts must be greater than 0");
        }

        if self.chains.is_empty() {
            anyhow::bail!("Configuration error: no [[chains]] configured");
        }

        let mut names = HashSet::new();
        let mut domains = HashSet::new();
        for chain in &self.chains {
            if !names.insert(chain.name.as_str()) {
                anyhow::bail!(
                    "Configuration error: chain name '{}' is used more than once",
                    chain.name
                );
            }
            if !domains.insert(chain.domain_id) {
                anyhow::bail!(
                    "Configuration error: domain id {} is used by more than one chain. Each chain must have a unique domain id.",
                    chain.domain_id
                );
            }
            if chain.family == ChainFamily::Svm && chain.evm_chain_id.is_some() {
                anyhow::bail!(
                    "Configuration error: SVM chain '{}' must not set evm_chain_id",
                    chain.name
                );
            }
            if chain.bridge_address.trim().is_empty() {
                anyhow::bail!(
                    "Configuration error: chain '{}' has an empty bridge_address",
                    chain.name
                );
            }
            if chain.max_block_range == Some(0) {
                anyhow::bail!(
                    "Configuration error: chain '{}' has max_block_range = 0",
                    chain.name
                );
            }
        }

        Ok(())
    }

    /// Loads configuration from the TOML file, applying `RELAYER__*` environment overrides.
    ///
    /// The path comes from `RELAYER_CONFIG_PATH`, defaulting to `config/relayer.toml`.
    ///
    /// # Returns
    ///
    /// - `Ok(Config)` - Successfully loaded and validated configuration
    /// - `Err(anyhow::Error)` - File missing, unparsable, or invalid
    pub fn load() -> anyhow::Result<Self> {
        let config_path =
            std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());

        if !std::path::Path::new(&config_path).exists() {
            return Err(anyhow::anyhow!(
                "Configuration file '{}' not found. Please copy the template:\n\
                cp config/relayer.template.toml config/relayer.toml\n\
                Then edit config/relayer.toml with your actual values.",
                config_path
            ));
        }

        let settings = config::Config::builder()
            .add_source(config::File::from(std::path::Path::new(&config_path)))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()
            .with_context(|| format!("Failed to read configuration '{}'", config_path))?;

        let config: Config = settings
            .try_deserialize()
            .with_context(|| format!("Failed to parse configuration '{}'", config_path))?;
        config.validate()?;
        Ok(config)
    }

    /// Parses and validates an inline TOML configuration.
    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        let config: Config = toml::from_str(content).context("Failed to parse configuration")?;
        config.validate()?;
        Ok(config)
    }

    pub fn chain_by_domain(&self, domain_id: DomainId) -> Option<&ChainConfig> {
        self.chains.iter().find(|c| c.domain_id == domain_id)
    }

    /// Domain ids the relayer can execute on.
    pub fn destination_domains(&self) -> HashSet<DomainId> {
        self.chains
            .iter()
            .filter(|c| c.is_destination())
            .map(|c| c.domain_id)
            .collect()
    }
}

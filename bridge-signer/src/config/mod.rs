//! Configuration Management Module
//!
//! This module handles loading and managing configuration for a bridge signer node.
//! Configuration includes the signer index, the source chains the node verifies
//! against, and API settings. Secrets are never stored in the file: the config
//! names the environment variables that hold them.

use anyhow::Context;
use bridge_common::{ChainFamily, DomainId};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Environment variable holding the config file path.
pub const CONFIG_PATH_ENV: &str = "SIGNER_CONFIG_PATH";
const DEFAULT_CONFIG_PATH: &str = "config/signer.toml";
const ENV_PREFIX: &str = "SIGNER";

// ============================================================================
// CONFIGURATION STRUCTURES
// ============================================================================

/// Main configuration structure containing all signer node settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Signer identity and secrets
    pub signer: SignerNodeConfig,
    /// Source chains this node verifies lock/burn events on
    #[serde(default)]
    pub source_chains: Vec<SourceChainConfig>,
    /// API server configuration (host, port, CORS settings)
    pub api: ApiConfig,
}

/// Signer identity, key location and RPC behaviour.
///
/// Keys are loaded from environment variables at runtime. The config file
/// contains the environment variable names, not the actual secrets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignerNodeConfig {
    /// Position of this signer in the relayer's signer set (0-based)
    pub index: u32,
    /// Environment variable name containing the secp256k1 private key (hex)
    /// Default: "SIGNER_PRIVATE_KEY"
    #[serde(default = "default_private_key_env")]
    pub private_key_env: String,
    /// Environment variable name containing the shared secret expected in `x-bridge-auth`
    /// Default: "BRIDGE_SIGNER_AUTH_TOKEN"
    #[serde(default = "default_auth_token_env")]
    pub auth_token_env: String,
    /// Timeout for each source-chain RPC call in milliseconds
    #[serde(default = "default_rpc_timeout_ms")]
    pub rpc_timeout_ms: u64,
}

fn default_private_key_env() -> String {
    "SIGNER_PRIVATE_KEY".to_string()
}

fn default_auth_token_env() -> String {
    "BRIDGE_SIGNER_AUTH_TOKEN".to_string()
}

fn default_rpc_timeout_ms() -> u64 {
    10_000
}

impl SignerNodeConfig {
    /// Loads the private key from the environment variable.
    ///
    /// # Returns
    ///
    /// * `Ok(String)` - The private key (hex encoded)
    /// * `Err(anyhow::Error)` - Failed to load from environment
    pub fn get_private_key(&self) -> anyhow::Result<String> {
        std::env::var(&self.private_key_env).map_err(|_| {
            anyhow::anyhow!(
                "Environment variable '{}' not set. Please set it with your secp256k1 private key (hex encoded).",
                self.private_key_env
            )
        })
    }

    /// Loads the shared API secret from the environment variable.
    ///
    /// # Returns
    ///
    /// * `Ok(String)` - The shared secret
    /// * `Err(anyhow::Error)` - Not set or empty
    pub fn get_auth_token(&self) -> anyhow::Result<String> {
        match std::env::var(&self.auth_token_env) {
            Ok(token) if !token.is_empty() => Ok(token),
            _ => Err(anyhow::anyhow!(
                "Environment variable '{}' not set. The signer refuses to serve /sign without a shared secret.",
                self.auth_token_env
            )),
        }
    }
}

/// A source chain the signer reads independently of the relayer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceChainConfig {
    /// Chain tag the relayer sends as `sourceChain` (e.g. "ethereum")
    pub name: String,
    /// Bridge domain id of this chain
    pub domain_id: DomainId,
    /// RPC dialect and event layout
    pub family: ChainFamily,
    /// RPC endpoint URL
    pub rpc_url: String,
    /// Bridge contract address (EVM) or bridge program id (SVM)
    pub bridge_address: String,
    /// Blocks (EVM) or slots (SVM) an event must be buried under before signing
    #[serde(default)]
    pub confirmation_depth: u64,
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
    /// - At least one source chain is configured
    /// - Chain names and domain ids are unique
    /// - The RPC timeout is non-zero
    ///
    /// # Returns
    ///
    /// - `Ok(())` - Configuration is valid
    /// - `Err(anyhow::Error)` - The first problem found
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.source_chains.is_empty() {
            anyhow::bail!("Configuration error: no [[source_chains]] configured");
        }
        if self.signer.rpc_timeout_ms == 0 {
            anyhow::bail!("Configuration error: signer.rpc_timeout_ms must be greater than 0");
        }

        let mut names = HashSet::new();
        let mut domains = HashSet::new();
        for chain in &self.source_chains {
            if !names.insert(chain.name.as_str()) {
                anyhow::bail!(
                    "Configuration error: source chain name '{}' is used more than once",
                    chain.name
                );
            }
            if !domains.insert(chain.domain_id) {
                anyhow::bail!(
                    "Configuration error: domain id {} is used by more than one source chain. Each chain must have a unique domain id.",
                    chain.domain_id
                );
            }
            if chain.bridge_address.trim().is_empty() {
                anyhow::bail!(
                    "Configuration error: source chain '{}' has an empty bridge_address",
                    chain.name
                );
            }
        }

        Ok(())
    }

    /// Loads configuration from the TOML file, applying `SIGNER__*` environment overrides.
    ///
    /// The path comes from `SIGNER_CONFIG_PATH`, defaulting to `config/signer.toml`.
    /// An override such as `SIGNER__API__PORT=4000` replaces `api.port`.
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
                cp config/signer.template.toml config/signer.toml\n\
                Then edit config/signer.toml with your actual values.",
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

    /// Looks up a source chain by its tag.
    pub fn source_chain(&self, name: &str) -> Option<&SourceChainConfig> {
        self.source_chains.iter().find(|c| c.name == name)
    }
}

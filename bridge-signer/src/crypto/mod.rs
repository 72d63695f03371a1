//! Cryptographic Operations Module
//!
//! Holds the signer node's secp256k1 key and produces attestations over
//! canonical message hashes. The key is loaded once from the environment and
//! never leaves this module.
//!
//! ## Security Requirements
//!
//! **CRITICAL**: Private keys must never be exposed or logged.

use anyhow::{Context, Result};
use bridge_common::crypto::{address_hex, public_key_hex};
use bridge_common::encoding::{decode_hex, eth_signed_message_digest};
use bridge_common::MessageHash;
use k256::ecdsa::{SigningKey, VerifyingKey};
use tracing::{debug, info};

use crate::config::Config;

// ============================================================================
// CRYPTOGRAPHIC SERVICE IMPLEMENTATION
// ============================================================================

/// Signing service for one bridge participant.
pub struct CryptoService {
    signing_key: SigningKey,
    /// Cached `0x`-prefixed Ethereum address of the signing key
    address: String,
}

impl CryptoService {
    /// Creates the service from the key named by `signer.private_key_env`.
    ///
    /// # Arguments
    ///
    /// * `config` - Signer configuration naming the key's environment variable
    ///
    /// # Returns
    ///
    /// * `Ok(CryptoService)` - Key loaded
    /// * `Err(anyhow::Error)` - Variable missing or not a valid secp256k1 scalar
    pub fn new(config: &Config) -> Result<Self> {
        let private_key_hex = config.signer.get_private_key()?;
        let service = Self::from_private_key_hex(&private_key_hex)
            .with_context(|| format!("Invalid key in '{}'", config.signer.private_key_env))?;

        info!(
            "Crypto service initialized for signer {} ({})",
            config.signer.index, service.address
        );
        Ok(service)
    }

    /// Creates the service from a hex-encoded 32-byte private key.
    pub fn from_private_key_hex(private_key_hex: &str) -> Result<Self> {
        let key_bytes = decode_hex(private_key_hex).context("Private key is not valid hex")?;
        if key_bytes.len() != 32 {
            return Err(anyhow::anyhow!(
                "Invalid private key length: expected 32 bytes, got {}",
                key_bytes.len()
            ));
        }

        let signing_key = SigningKey::from_slice(&key_bytes)
            .map_err(|e| anyhow::anyhow!("Failed to create ECDSA signing key: {}", e))?;
        let address = address_hex(signing_key.verifying_key());

        Ok(Self {
            signing_key,
            address,
        })
    }

    /// Signs the EIP-191 digest of a canonical message hash.
    ///
    /// # Arguments
    ///
    /// * `message_hash` - Canonical message hash of the transfer
    ///
    /// # Returns
    ///
    /// * `Ok(Vec<u8>)` - 65-byte `r || s || v` signature, `v` in {27, 28}
    /// * `Err(anyhow::Error)` - Signing failed
    pub fn sign_message_hash(&self, message_hash: &MessageHash) -> Result<Vec<u8>> {
        let digest = eth_signed_message_digest(message_hash);
        let (signature, recovery_id) = self
            .signing_key
            .sign_prehash_recoverable(&digest)
            .map_err(|e| anyhow::anyhow!("Failed to sign message hash: {}", e))?;

        let mut out = Vec::with_capacity(65);
        out.extend_from_slice(&signature.to_bytes());
        out.push(recovery_id.to_byte() + 27);

        debug!("Signed message hash {}", message_hash);
        Ok(out)
    }

    pub fn verifying_key(&self) -> &VerifyingKey {
        self.signing_key.verifying_key()
    }

    /// Compressed SEC1 public key (hex), as configured on the relayer.
    pub fn public_key_hex(&self) -> String {
        public_key_hex(self.verifying_key())
    }

    /// Ethereum address of the signing key (`0x`-prefixed hex).
    pub fn get_ethereum_address(&self) -> &str {
        &self.address
    }
}

//! Cryptographic Operations Module
//!
//! Holds the relayer's own destination-chain account key. The relayer never
//! attests transfers; it only signs the transactions that carry the signer
//! nodes' attestations to the destination bridge contract.
//!
//! ## Security Requirements
//!
//! **CRITICAL**: This key pays for destination transactions. Never log or expose it.

use anyhow::{Context, Result};
use bridge_common::crypto::address_hex;
use bridge_common::encoding::decode_hex;
use k256::ecdsa::SigningKey;
use tracing::info;

use crate::config::Config;

// ============================================================================
// CRYPTOGRAPHIC SERVICE IMPLEMENTATION
// ============================================================================

/// Transaction signing service for the relayer account.
#[derive(Clone)]
pub struct CryptoService {
    signing_key: SigningKey,
    address: String,
}

impl CryptoService {
    /// Creates the service from the key named by `relayer.private_key_env`.
    pub fn new(config: &Config) -> Result<Self> {
        let private_key_hex = config.relayer.get_private_key()?;
        let service = Self::from_private_key_hex(&private_key_hex)
            .with_context(|| format!("Invalid key in '{}'", config.relayer.private_key_env))?;

        info!("Relayer account: {}", service.address);
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

    /// Signs an EVM transaction signing hash.
    ///
    /// # Arguments
    ///
    /// * `tx_hash` - keccak256 of the unsigned EIP-155 transaction RLP
    ///
    /// # Returns
    ///
    /// * `Ok((r, s, recovery_id))` - Signature components, recovery id in {0, 1}
    /// * `Err(anyhow::Error)` - Signing failed
    pub fn sign_evm_transaction_hash(&self, tx_hash: &[u8; 32]) -> Result<([u8; 32], [u8; 32], u8)> {
        let (signature, recovery_id) = self
            .signing_key
            .sign_prehash_recoverable(tx_hash)
            .map_err(|e| anyhow::anyhow!("Failed to sign transaction hash: {}", e))?;

        let sig_bytes = signature.to_bytes();
        let mut r = [0u8; 32];
        let mut s = [0u8; 32];
        r.copy_from_slice(&sig_bytes[..32]);
        s.copy_from_slice(&sig_bytes[32..64]);

        Ok((r, s, recovery_id.to_byte()))
    }

    /// Ethereum address of the relayer account (`0x`-prefixed hex).
    pub fn get_ethereum_address(&self) -> &str {
        &self.address
    }
}

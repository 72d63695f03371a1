//! Canonical Encodings
//!
//! The single request id derivation and the single message hash encoding used
//! by every component. Signer nodes and the relayer must agree on these bytes
//! exactly, otherwise signatures would not aggregate.
//!
//! ```text
//! request_id   = keccak256(domain_be_u32 || len_be_u32(tx) || tx || log_index_be_u32)
//! message_hash = keccak256(request_id || src_be_u32 || dst_be_u32 || recipient32
//!                          || token32 || amount_be_u256 || type_tag)
//! ```

use serde::{Deserialize, Serialize};
use sha3::{Digest, Keccak256};

use crate::error::EncodingError;
use crate::types::{Bytes32, ChainFamily, DomainId, MessageHash, MessageType, RequestId};

// ============================================================================
// HEX HELPERS
// ============================================================================

/// Strips an optional `0x`/`0X` prefix.
pub fn strip_0x(s: &str) -> &str {
    s.strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s)
}

/// Decodes a hex string with or without `0x` prefix.
pub fn decode_hex(s: &str) -> Result<Vec<u8>, EncodingError> {
    let clean = strip_0x(s.trim());
    if clean.len() % 2 == 1 {
        return hex::decode(format!("0{}", clean))
            .map_err(|e| EncodingError::InvalidHex(e.to_string()));
    }
    hex::decode(clean).map_err(|e| EncodingError::InvalidHex(e.to_string()))
}

/// Encodes bytes as a lowercase `0x`-prefixed hex string.
pub fn encode_hex(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}

pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    hasher.finalize().into()
}

// ============================================================================
// REQUEST ID
// ============================================================================

/// Raw transaction hash bytes for a chain family.
///
/// EVM hashes are 32 hex-encoded bytes; SVM transaction signatures are
/// 64 base58-encoded bytes.
pub fn tx_hash_bytes(family: ChainFamily, tx_hash: &str) -> Result<Vec<u8>, EncodingError> {
    match family {
        ChainFamily::Evm => {
            let bytes = decode_hex(tx_hash)?;
            if bytes.len() != 32 {
                return Err(EncodingError::InvalidLength {
                    expected: 32,
                    actual: bytes.len(),
                });
            }
            Ok(bytes)
        }
        ChainFamily::Svm => {
            let bytes = bs58::decode(tx_hash)
                .into_vec()
                .map_err(|e| EncodingError::InvalidBase58(e.to_string()))?;
            if bytes.len() != 64 {
                return Err(EncodingError::InvalidLength {
                    expected: 64,
                    actual: bytes.len(),
                });
            }
            Ok(bytes)
        }
    }
}

/// Derives the canonical request id from (source domain, tx hash bytes, event index).
pub fn derive_request_id(source_domain: DomainId, tx_hash: &[u8], log_index: u32) -> RequestId {
    let mut preimage = Vec::with_capacity(12 + tx_hash.len());
    preimage.extend_from_slice(&source_domain.to_be_bytes());
    preimage.extend_from_slice(&(tx_hash.len() as u32).to_be_bytes());
    preimage.extend_from_slice(tx_hash);
    preimage.extend_from_slice(&log_index.to_be_bytes());
    Bytes32(keccak256(&preimage))
}

// ============================================================================
// MESSAGE HASH
// ============================================================================

/// Fields covered by a signer attestation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageFields {
    pub request_id: RequestId,
    pub source_domain: DomainId,
    pub dest_domain: DomainId,
    pub recipient: Bytes32,
    pub token: Bytes32,
    #[serde(with = "crate::api::amount_string")]
    pub amount: u128,
    pub message_type: MessageType,
}

impl MessageFields {
    /// Canonical message hash. MINT and UNLOCK over identical fields hash differently.
    pub fn message_hash(&self) -> MessageHash {
        let mut preimage = Vec::with_capacity(32 + 4 + 4 + 32 + 32 + 32 + 1);
        preimage.extend_from_slice(self.request_id.as_bytes());
        preimage.extend_from_slice(&self.source_domain.to_be_bytes());
        preimage.extend_from_slice(&self.dest_domain.to_be_bytes());
        preimage.extend_from_slice(self.recipient.as_bytes());
        preimage.extend_from_slice(self.token.as_bytes());
        preimage.extend_from_slice(&amount_word(self.amount));
        preimage.push(self.message_type.type_tag());
        Bytes32(keccak256(&preimage))
    }
}

/// Big-endian uint256 word holding a u128 amount.
pub fn amount_word(amount: u128) -> [u8; 32] {
    let mut word = [0u8; 32];
    word[16..].copy_from_slice(&amount.to_be_bytes());
    word
}

/// Reads a big-endian uint256 word, rejecting values above `u128::MAX`.
pub fn word_to_amount(word: &[u8]) -> Result<u128, EncodingError> {
    if word.len() != 32 {
        return Err(EncodingError::InvalidLength {
            expected: 32,
            actual: word.len(),
        });
    }
    if word[..16].iter().any(|b| *b != 0) {
        return Err(EncodingError::InvalidAmount(
            "uint256 amount exceeds u128 range".to_string(),
        ));
    }
    let mut low = [0u8; 16];
    low.copy_from_slice(&word[16..]);
    Ok(u128::from_be_bytes(low))
}

/// EIP-191 digest that signers actually sign:
/// keccak256("\x19Ethereum Signed Message:\n32" || message_hash)
pub fn eth_signed_message_digest(message_hash: &MessageHash) -> [u8; 32] {
    let prefix = b"\x19Ethereum Signed Message:\n32";
    let mut prefixed = Vec::with_capacity(prefix.len() + 32);
    prefixed.extend_from_slice(prefix);
    prefixed.extend_from_slice(message_hash.as_bytes());
    keccak256(&prefixed)
}

//! Signature recovery helpers.
//!
//! Signer nodes produce 65-byte `r || s || v` secp256k1 signatures over the
//! EIP-191 digest of the canonical message hash, `v` being 27 or 28.

use k256::ecdsa::{RecoveryId, Signature, VerifyingKey};
use sha3::{Digest, Keccak256};

use crate::encoding::{decode_hex, encode_hex, eth_signed_message_digest};
use crate::error::EncodingError;
use crate::types::MessageHash;

pub const SIGNATURE_LEN: usize = 65;

/// Parses a SEC1-encoded secp256k1 public key (compressed or uncompressed hex).
pub fn parse_public_key(public_key_hex: &str) -> Result<VerifyingKey, EncodingError> {
    let bytes = decode_hex(public_key_hex)?;
    VerifyingKey::from_sec1_bytes(&bytes)
        .map_err(|e| EncodingError::InvalidPublicKey(e.to_string()))
}

/// Compressed SEC1 hex encoding of a public key.
pub fn public_key_hex(key: &VerifyingKey) -> String {
    encode_hex(key.to_encoded_point(true).as_bytes())
}

/// Ethereum address: keccak256(uncompressed_public_key[1..])[12..32].
pub fn public_key_to_address(key: &VerifyingKey) -> [u8; 20] {
    let point = key.to_encoded_point(false);
    let mut hasher = Keccak256::new();
    hasher.update(&point.as_bytes()[1..]);
    let hash = hasher.finalize();
    let mut address = [0u8; 20];
    address.copy_from_slice(&hash[12..32]);
    address
}

pub fn address_hex(key: &VerifyingKey) -> String {
    encode_hex(&public_key_to_address(key))
}

/// Recovers the signing public key from an attestation signature.
///
/// The recovery byte must be 27 or 28.
pub fn recover_signer(
    message_hash: &MessageHash,
    signature: &[u8],
) -> Result<VerifyingKey, EncodingError> {
    if signature.len() != SIGNATURE_LEN {
        return Err(EncodingError::InvalidLength {
            expected: SIGNATURE_LEN,
            actual: signature.len(),
        });
    }

    let sig = Signature::from_slice(&signature[..64])
        .map_err(|e| EncodingError::InvalidSignature(e.to_string()))?;
    let v = signature[64];
    // Destination contracts only accept the 27/28 form
    let recovery_byte = match v {
        27 | 28 => v - 27,
        other => {
            return Err(EncodingError::InvalidSignature(format!(
                "invalid recovery byte {}",
                other
            )))
        }
    };
    let recovery_id = RecoveryId::try_from(recovery_byte)
        .map_err(|e| EncodingError::InvalidSignature(e.to_string()))?;

    let digest = eth_signed_message_digest(message_hash);
    VerifyingKey::recover_from_prehash(&digest, &sig, recovery_id)
        .map_err(|e| EncodingError::InvalidSignature(e.to_string()))
}

/// Whether `signature` over `message_hash` was produced by `expected`.
pub fn verify_attestation(
    message_hash: &MessageHash,
    signature: &[u8],
    expected: &VerifyingKey,
) -> bool {
    match recover_signer(message_hash, signature) {
        Ok(recovered) => recovered == *expected,
        Err(_) => false,
    }
}

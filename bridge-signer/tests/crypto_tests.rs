//! Unit tests for the signer's cryptographic service

use bridge_common::crypto::{address_hex, parse_public_key, recover_signer, verify_attestation};
use bridge_common::Bytes32;
use bridge_signer::CryptoService;

#[path = "helpers.rs"]
mod test_helpers;
use test_helpers::DUMMY_SIGNER_KEY;

/// 1. Test: Known key derives its known Ethereum address
/// Why: The address is what destination contracts register as a signer.
#[test]
fn test_known_key_address() {
    let crypto = CryptoService::from_private_key_hex(DUMMY_SIGNER_KEY).unwrap();
    assert_eq!(
        crypto.get_ethereum_address(),
        "0x2c7536e3605d9c16a7a3d7b1898e529396a65c23"
    );
}

/// 2. Test: Signatures recover to the signer's public key
/// Verifies the r || s || v layout with v in {27, 28}.
/// Why: The relayer and the destination contract both recover the signer.
#[test]
fn test_signature_recovers_to_signer() {
    let crypto = CryptoService::from_private_key_hex(DUMMY_SIGNER_KEY).unwrap();
    let message_hash = Bytes32([0x5a; 32]);

    let signature = crypto.sign_message_hash(&message_hash).unwrap();
    assert_eq!(signature.len(), 65);
    assert!(signature[64] == 27 || signature[64] == 28);

    let recovered = recover_signer(&message_hash, &signature).unwrap();
    assert_eq!(address_hex(&recovered), crypto.get_ethereum_address());

    let public_key = parse_public_key(&crypto.public_key_hex()).unwrap();
    assert!(verify_attestation(&message_hash, &signature, &public_key));
    assert!(!verify_attestation(&Bytes32([0x5b; 32]), &signature, &public_key));
}

/// 3. Test: Invalid keys are rejected
#[test]
fn test_invalid_private_keys() {
    assert!(CryptoService::from_private_key_hex("0x1234").is_err());
    assert!(CryptoService::from_private_key_hex("not hex").is_err());
    // Zero is not a valid secp256k1 scalar
    assert!(CryptoService::from_private_key_hex(&format!("0x{}", "00".repeat(32))).is_err());
}

//! secp256k1 Key Generation Utility
//!
//! Generates a new key pair for a bridge signer node or the relayer account.
//!
//! ## Usage
//!
//! ```bash
//! cargo run --bin generate_keys
//! ```
//!
//! ## Output
//!
//! - Private key (hex) - export it in the variable named by `private_key_env`
//! - Public key (compressed SEC1 hex) - goes into the relayer's `[[signers]]` entry
//! - Ethereum address - registered as a signer on the destination contracts

use bridge_common::crypto::{address_hex, public_key_hex};
use k256::ecdsa::SigningKey;

fn main() {
    let signing_key = SigningKey::random(&mut rand::rngs::OsRng);
    let verifying_key = signing_key.verifying_key();

    println!("Generated secp256k1 Key Pair:");
    println!("Private Key (hex): 0x{}", hex::encode(signing_key.to_bytes()));
    println!("Public Key (hex): {}", public_key_hex(verifying_key));
    println!("Ethereum Address: {}", address_hex(verifying_key));
    println!();
    println!("Export the private key as SIGNER_PRIVATE_KEY and add the public key to config/relayer.toml.");
}

//! Solana SVM chain client library
//!
//! JSON-RPC access to SVM chains (slots, program signatures, transactions)
//! and decoding of the bridge program's `Program data:` event logs.

pub mod client;
pub mod events;

pub use client::{SignatureInfo, SvmClient, SvmTransaction, MAX_SIGNATURE_PAGES};
pub use events::{decode_program_logs, encode_program_data, TokensEventData};

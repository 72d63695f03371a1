//! EVM chain client library
//!
//! JSON-RPC access to EVM chains plus the encoders the bridge needs:
//! bridge event decoding, ABI call encoding and legacy (EIP-155) transaction RLP.

pub mod abi;
pub mod client;
pub mod events;
pub mod rlp;
pub mod types;

pub use client::{EvmClient, LogFilter};
pub use events::{decode_bridge_log, BRIDGE_EVENT_KINDS};
pub use rlp::LegacyTransaction;
pub use types::{parse_address, parse_hex_u64, EvmLog, EvmReceipt};

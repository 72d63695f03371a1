//! EVM JSON-RPC result types.

use bridge_common::encoding::{decode_hex, strip_0x};
use bridge_common::EncodingError;
use serde::{Deserialize, Serialize};

/// EVM event log entry as returned by `eth_getLogs` and inside receipts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvmLog {
    /// Contract address that emitted the event
    pub address: String,
    /// Event topics (indexed parameters)
    pub topics: Vec<String>,
    /// Event data (non-indexed parameters)
    pub data: String,
    /// Block number
    #[serde(default)]
    pub block_number: Option<String>,
    /// Transaction hash
    #[serde(default)]
    pub transaction_hash: Option<String>,
    /// Log index within the block
    #[serde(default)]
    pub log_index: Option<String>,
    /// Set when the log was dropped by a reorg
    #[serde(default)]
    pub removed: Option<bool>,
}

impl EvmLog {
    pub fn block_number_u64(&self) -> Option<u64> {
        self.block_number.as_deref().and_then(|b| parse_hex_u64(b).ok())
    }

    pub fn log_index_u32(&self) -> Option<u32> {
        self.log_index
            .as_deref()
            .and_then(|i| parse_hex_u64(i).ok())
            .and_then(|i| u32::try_from(i).ok())
    }

    pub fn is_removed(&self) -> bool {
        self.removed.unwrap_or(false)
    }
}

/// Transaction receipt subset used by the bridge.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvmReceipt {
    pub transaction_hash: String,
    /// "0x1" on success, "0x0" on revert
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub block_number: Option<String>,
    #[serde(default)]
    pub logs: Vec<EvmLog>,
}

impl EvmReceipt {
    pub fn succeeded(&self) -> bool {
        matches!(self.status.as_deref().map(strip_0x), Some("1") | Some("01"))
    }

    pub fn block_number_u64(&self) -> Option<u64> {
        self.block_number.as_deref().and_then(|b| parse_hex_u64(b).ok())
    }
}

/// Parses a `0x`-prefixed hex quantity.
pub fn parse_hex_u64(value: &str) -> Result<u64, EncodingError> {
    let clean = strip_0x(value);
    if clean.is_empty() {
        return Ok(0);
    }
    u64::from_str_radix(clean, 16).map_err(|e| EncodingError::InvalidHex(e.to_string()))
}

/// Parses a 20-byte EVM address.
pub fn parse_address(address: &str) -> Result<[u8; 20], EncodingError> {
    let bytes = decode_hex(address)?;
    if bytes.len() != 20 {
        return Err(EncodingError::InvalidLength {
            expected: 20,
            actual: bytes.len(),
        });
    }
    let mut out = [0u8; 20];
    out.copy_from_slice(&bytes);
    Ok(out)
}

/// Lowercases and `0x`-prefixes an address for comparisons.
pub fn normalize_address(address: &str) -> String {
    format!("0x{}", strip_0x(address).to_lowercase())
}

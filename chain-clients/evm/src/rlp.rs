//! RLP encoding for legacy (pre-EIP-1559) EVM transactions.
//!
//! Signing is left to the caller, which holds the key: compute
//! [`LegacyTransaction::signing_hash`], sign it, then call
//! [`LegacyTransaction::encode_signed`] with the EIP-155 `v`.

use sha3::{Digest, Keccak256};

/// Unsigned legacy transaction with zero value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegacyTransaction {
    pub nonce: u64,
    pub gas_price: u64,
    pub gas_limit: u64,
    pub to: [u8; 20],
    pub data: Vec<u8>,
}

impl LegacyTransaction {
    /// keccak256 of `rlp([nonce, gasPrice, gasLimit, to, value, data, chainId, 0, 0])`.
    pub fn signing_hash(&self, chain_id: u64) -> [u8; 32] {
        let unsigned = rlp_encode_list(&[
            rlp_encode_u64(self.nonce),
            rlp_encode_u64(self.gas_price),
            rlp_encode_u64(self.gas_limit),
            self.to.to_vec(),
            vec![], // value = 0
            self.data.clone(),
            rlp_encode_u64(chain_id),
            vec![],
            vec![],
        ]);
        Keccak256::digest(&unsigned).into()
    }

    /// `rlp([nonce, gasPrice, gasLimit, to, value, data, v, r, s])`.
    pub fn encode_signed(&self, v: u64, r: &[u8; 32], s: &[u8; 32]) -> Vec<u8> {
        rlp_encode_list(&[
            rlp_encode_u64(self.nonce),
            rlp_encode_u64(self.gas_price),
            rlp_encode_u64(self.gas_limit),
            self.to.to_vec(),
            vec![],
            self.data.clone(),
            rlp_encode_u64(v),
            trim_leading_zeros(r),
            trim_leading_zeros(s),
        ])
    }
}

/// EIP-155 `v`: recovery_id + chain_id * 2 + 35.
pub fn eip155_v(recovery_id: u8, chain_id: u64) -> u64 {
    u64::from(recovery_id) + chain_id * 2 + 35
}

/// Encode a u64 as big-endian bytes with no leading zeros (RLP integer format).
pub fn rlp_encode_u64(val: u64) -> Vec<u8> {
    trim_leading_zeros(&val.to_be_bytes())
}

fn trim_leading_zeros(bytes: &[u8]) -> Vec<u8> {
    let start = bytes.iter().position(|&b| b != 0).unwrap_or(bytes.len());
    bytes[start..].to_vec()
}

/// RLP-encode a single byte-string item.
pub fn rlp_encode_item(data: &[u8]) -> Vec<u8> {
    if data.len() == 1 && data[0] < 0x80 {
        vec![data[0]]
    } else if data.len() <= 55 {
        let mut out = vec![0x80 + data.len() as u8];
        out.extend_from_slice(data);
        out
    } else {
        let len_bytes = rlp_encode_u64(data.len() as u64);
        let mut out = vec![0xb7 + len_bytes.len() as u8];
        out.extend_from_slice(&len_bytes);
        out.extend_from_slice(data);
        out
    }
}

/// RLP-encode a list of items (each item is raw bytes, not yet RLP-encoded).
pub fn rlp_encode_list(items: &[Vec<u8>]) -> Vec<u8> {
    let mut payload = Vec::new();
    for item in items {
        payload.extend(rlp_encode_item(item));
    }

    if payload.len() <= 55 {
        let mut out = vec![0xc0 + payload.len() as u8];
        out.extend(payload);
        out
    } else {
        let len_bytes = rlp_encode_u64(payload.len() as u64);
        let mut out = vec![0xf7 + len_bytes.len() as u8];
        out.extend_from_slice(&len_bytes);
        out.extend(payload);
        out
    }
}

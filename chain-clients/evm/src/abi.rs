//! Minimal Solidity ABI encoding.
//!
//! Covers the static words and dynamic `bytes` / `bytes[]` arguments used by the
//! bridge contracts. Layout follows the Solidity ABI: a head of
//! 32-byte words (dynamic arguments replaced by offsets) followed by the tail.

use sha3::{Digest, Keccak256};

/// One ABI argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbiToken {
    /// Any static type already encoded into a 32-byte word
    Word([u8; 32]),
    Bytes(Vec<u8>),
    BytesArray(Vec<Vec<u8>>),
}

/// 4-byte function selector: keccak256(signature)[0..4].
pub fn selector(signature: &str) -> [u8; 4] {
    let hash = Keccak256::digest(signature.as_bytes());
    let mut out = [0u8; 4];
    out.copy_from_slice(&hash[..4]);
    out
}

/// Event topic hash as `0x`-prefixed hex.
pub fn event_topic(signature: &str) -> String {
    let mut hasher = Keccak256::new();
    hasher.update(signature.as_bytes());
    format!("0x{}", hex::encode(hasher.finalize()))
}

pub fn uint_word(value: u64) -> [u8; 32] {
    let mut word = [0u8; 32];
    word[24..].copy_from_slice(&value.to_be_bytes());
    word
}

pub fn u32_word(value: u32) -> [u8; 32] {
    let mut word = [0u8; 32];
    word[28..].copy_from_slice(&value.to_be_bytes());
    word
}

/// Encodes a full call: selector followed by the arguments.
pub fn encode_call(signature: &str, tokens: &[AbiToken]) -> Vec<u8> {
    let mut out = selector(signature).to_vec();
    out.extend(encode(tokens));
    out
}

/// Encodes an argument tuple.
pub fn encode(tokens: &[AbiToken]) -> Vec<u8> {
    let head_len = tokens.len() * 32;
    let mut head = Vec::with_capacity(head_len);
    let mut tail = Vec::new();

    for token in tokens {
        match token {
            AbiToken::Word(word) => head.extend_from_slice(word),
            AbiToken::Bytes(bytes) => {
                head.extend_from_slice(&uint_word((head_len + tail.len()) as u64));
                tail.extend(encode_bytes(bytes));
            }
            AbiToken::BytesArray(items) => {
                head.extend_from_slice(&uint_word((head_len + tail.len()) as u64));
                tail.extend(encode_bytes_array(items));
            }
        }
    }

    head.extend(tail);
    head
}

fn encode_bytes(bytes: &[u8]) -> Vec<u8> {
    let padding = (32 - (bytes.len() % 32)) % 32;
    let mut out = Vec::with_capacity(32 + bytes.len() + padding);
    out.extend_from_slice(&uint_word(bytes.len() as u64));
    out.extend_from_slice(bytes);
    out.extend(std::iter::repeat(0u8).take(padding));
    out
}

fn encode_bytes_array(items: &[Vec<u8>]) -> Vec<u8> {
    let mut out = uint_word(items.len() as u64).to_vec();
    let encoded: Vec<Vec<u8>> = items.iter().map(|item| encode_bytes(item)).collect();

    // Offsets are relative to the start of the offset block
    let mut offset = items.len() * 32;
    for item in &encoded {
        out.extend_from_slice(&uint_word(offset as u64));
        offset += item.len();
    }
    for item in encoded {
        out.extend(item);
    }
    out
}

/// Decodes an ABI `bool` return value.
pub fn decode_bool(data: &[u8]) -> Option<bool> {
    if data.len() < 32 {
        return None;
    }
    if data[..31].iter().any(|b| *b != 0) {
        return None;
    }
    match data[31] {
        0 => Some(false),
        1 => Some(true),
        _ => None,
    }
}

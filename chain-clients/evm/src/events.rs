//! Bridge contract events on EVM chains.
//!
//! Source contracts emit
//! `TokensLocked(bytes32 indexed requestId, address indexed sender, address token,
//! uint256 amount, bytes32 destinationAddress, uint32 destinationDomain, uint64 nonce)`
//! and `TokensBurned(...)` with the same shape.
//! Destination contracts emit `RequestExecuted(bytes32 indexed requestId)`.

use bridge_common::encoding::{decode_hex, word_to_amount};
use bridge_common::{Bytes32, DomainId, EncodingError, EventKind, EvmLockEvent};
use tracing::warn;

use crate::abi::event_topic;
use crate::types::EvmLog;

pub const TOKENS_LOCKED_SIGNATURE: &str =
    "TokensLocked(bytes32,address,address,uint256,bytes32,uint32,uint64)";
pub const TOKENS_BURNED_SIGNATURE: &str =
    "TokensBurned(bytes32,address,address,uint256,bytes32,uint32,uint64)";
pub const REQUEST_EXECUTED_SIGNATURE: &str = "RequestExecuted(bytes32)";
pub const IS_EXECUTED_SIGNATURE: &str = "isExecuted(bytes32)";

/// Event kinds watched on EVM source chains.
pub const BRIDGE_EVENT_KINDS: [EventKind; 2] = [EventKind::Locked, EventKind::Burned];

/// Topic0 of a bridge source event.
pub fn bridge_event_topic(kind: EventKind) -> String {
    match kind {
        EventKind::Locked => event_topic(TOKENS_LOCKED_SIGNATURE),
        EventKind::Burned => event_topic(TOKENS_BURNED_SIGNATURE),
    }
}

fn kind_for_topic(topic0: &str) -> Option<EventKind> {
    let topic0 = topic0.to_lowercase();
    BRIDGE_EVENT_KINDS
        .into_iter()
        .find(|kind| bridge_event_topic(*kind) == topic0)
}

/// Decodes a bridge lock/burn log.
///
/// Returns `Ok(None)` for logs with another topic0, and an error for logs that carry a
/// bridge topic but are malformed.
pub fn decode_bridge_log(
    log: &EvmLog,
    source_domain: DomainId,
) -> Result<Option<EvmLockEvent>, EncodingError> {
    let Some(kind) = log.topics.first().and_then(|t| kind_for_topic(t)) else {
        return Ok(None);
    };

    if log.topics.len() < 3 {
        warn!("Bridge event with {} topics, expected 3", log.topics.len());
        return Err(EncodingError::InvalidLength {
            expected: 3,
            actual: log.topics.len(),
        });
    }

    let event_request_id: Bytes32 = log.topics[1].parse()?;
    let sender = word_address(&decode_hex(&log.topics[2])?)?;

    // data = token | amount | destinationAddress | destinationDomain | nonce
    let data = decode_hex(&log.data)?;
    if data.len() < 5 * 32 {
        return Err(EncodingError::InvalidLength {
            expected: 5 * 32,
            actual: data.len(),
        });
    }
    let word = |i: usize| &data[i * 32..(i + 1) * 32];

    let token = word_address(word(0))?;
    let amount = word_to_amount(word(1))?;
    let destination_address = Bytes32::left_padded(word(2))?;
    let destination_domain = word_u64(word(3))
        .and_then(|d| u32::try_from(d).ok())
        .ok_or_else(|| EncodingError::InvalidAmount("destinationDomain out of range".to_string()))?;
    let nonce = word_u64(word(4))
        .ok_or_else(|| EncodingError::InvalidAmount("nonce out of range".to_string()))?;

    let tx_hash = log
        .transaction_hash
        .clone()
        .ok_or_else(|| EncodingError::InvalidHex("log without transactionHash".to_string()))?;
    let log_index = log
        .log_index_u32()
        .ok_or_else(|| EncodingError::InvalidHex("log without logIndex".to_string()))?;

    Ok(Some(EvmLockEvent {
        source_domain,
        block_number: log.block_number_u64().unwrap_or(0),
        tx_hash: tx_hash.to_lowercase(),
        log_index,
        kind,
        event_request_id,
        sender,
        token,
        amount,
        destination_address,
        destination_domain,
        nonce,
    }))
}

/// Non-indexed data of a bridge source event, as the source contract ABI-encodes it.
pub fn encode_bridge_event_data(
    token: &[u8; 20],
    amount: u128,
    destination_address: &Bytes32,
    destination_domain: DomainId,
    nonce: u64,
) -> String {
    let mut data = Vec::with_capacity(5 * 32);
    data.extend_from_slice(Bytes32::from_evm_address(token).as_bytes());
    data.extend_from_slice(&bridge_common::encoding::amount_word(amount));
    data.extend_from_slice(destination_address.as_bytes());
    data.extend_from_slice(&crate::abi::u32_word(destination_domain));
    data.extend_from_slice(&crate::abi::uint_word(nonce));
    bridge_common::encoding::encode_hex(&data)
}

/// Address stored in the low 20 bytes of a 32-byte word.
fn word_address(word: &[u8]) -> Result<[u8; 20], EncodingError> {
    if word.len() != 32 {
        return Err(EncodingError::InvalidLength {
            expected: 32,
            actual: word.len(),
        });
    }
    let mut out = [0u8; 20];
    out.copy_from_slice(&word[12..]);
    Ok(out)
}

fn word_u64(word: &[u8]) -> Option<u64> {
    if word.len() != 32 || word[..24].iter().any(|b| *b != 0) {
        return None;
    }
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&word[24..]);
    Some(u64::from_be_bytes(buf))
}

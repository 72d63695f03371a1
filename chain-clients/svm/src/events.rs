//! Bridge program events on SVM chains.
//!
//! The bridge program emits events as `Program data: <base64>` log lines.
//! The payload is an 8-byte discriminator, `sha256("event:<Name>")[..8]`,
//! followed by the borsh-serialized [`TokensEventData`].

use base64::{engine::general_purpose::STANDARD, Engine as _};
use borsh::{BorshDeserialize, BorshSerialize};
use bridge_common::{Bytes32, DomainId, EncodingError, EventKind, SvmLockEvent};
use sha2::{Digest, Sha256};
use tracing::warn;

const PROGRAM_DATA_PREFIX: &str = "Program data: ";

/// Borsh layout shared by `TokensLocked` and `TokensBurned`.
#[derive(BorshDeserialize, BorshSerialize, Debug, Clone, PartialEq, Eq)]
pub struct TokensEventData {
    pub request_id: [u8; 32],
    pub sender: [u8; 32],
    pub token_mint: [u8; 32],
    pub amount: u64,
    pub destination_address: [u8; 32],
    pub destination_domain: u32,
    pub nonce: u64,
}

pub fn event_discriminator(kind: EventKind) -> [u8; 8] {
    let hash = Sha256::digest(format!("event:{}", kind.event_name()).as_bytes());
    let mut out = [0u8; 8];
    out.copy_from_slice(&hash[..8]);
    out
}

/// Log line the bridge program writes for an event.
pub fn encode_program_data(kind: EventKind, data: &TokensEventData) -> Result<String, EncodingError> {
    let mut payload = event_discriminator(kind).to_vec();
    let body = data
        .try_to_vec()
        .map_err(|e| EncodingError::InvalidPayload(e.to_string()))?;
    payload.extend(body);
    Ok(format!("{}{}", PROGRAM_DATA_PREFIX, STANDARD.encode(payload)))
}

/// Extracts bridge events emitted by `program_id` from a transaction's log messages.
///
/// Only `Program data:` lines emitted while `program_id` is the innermost executing
/// program are considered. `log_index` counts bridge events in emission order.
pub fn decode_program_logs(
    logs: &[String],
    program_id: &str,
    source_domain: DomainId,
    slot: u64,
    signature: &str,
) -> Result<Vec<SvmLockEvent>, EncodingError> {
    let locked = event_discriminator(EventKind::Locked);
    let burned = event_discriminator(EventKind::Burned);

    let mut invoke_stack: Vec<&str> = Vec::new();
    let mut events = Vec::new();

    for line in logs {
        if let Some(rest) = line.strip_prefix("Program ") {
            let mut parts = rest.split_whitespace();
            let program = parts.next().unwrap_or_default();
            match parts.next() {
                Some("invoke") => {
                    invoke_stack.push(program);
                    continue;
                }
                Some("success") | Some("failed:") => {
                    invoke_stack.pop();
                    continue;
                }
                _ => {}
            }
        }

        let Some(encoded) = line.strip_prefix(PROGRAM_DATA_PREFIX) else {
            continue;
        };
        if invoke_stack.last().copied() != Some(program_id) {
            continue;
        }

        let payload = match STANDARD.decode(encoded.trim()) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Undecodable program data in {}: {}", signature, e);
                continue;
            }
        };
        if payload.len() < 8 {
            continue;
        }

        let kind = if payload[..8] == locked {
            EventKind::Locked
        } else if payload[..8] == burned {
            EventKind::Burned
        } else {
            continue;
        };

        let data = TokensEventData::try_from_slice(&payload[8..])
            .map_err(|e| EncodingError::InvalidPayload(format!("{} in {}", e, signature)))?;

        events.push(SvmLockEvent {
            source_domain,
            slot,
            signature: signature.to_string(),
            log_index: events.len() as u32,
            kind,
            event_request_id: Bytes32(data.request_id),
            sender: data.sender,
            token_mint: data.token_mint,
            amount: data.amount,
            destination_address: data.destination_address,
            destination_domain: data.destination_domain,
            nonce: data.nonce,
        });
    }

    Ok(events)
}

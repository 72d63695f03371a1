//! Core Bridge Types
//!
//! Identifiers, enumerations and the tagged chain event model shared by
//! the signer nodes and the relayer.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::encoding::{self, derive_request_id};
use crate::error::EncodingError;

/// Numeric chain identifier used by the bridge contracts.
pub type DomainId = u32;

// ============================================================================
// FIXED-WIDTH IDENTIFIERS
// ============================================================================

/// A 32-byte value: request ids, message hashes, and chain-agnostic addresses.
///
/// EVM addresses are stored left-padded to 32 bytes; SVM public keys fill all 32 bytes.
/// Serialized as a lowercase `0x`-prefixed hex string.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Bytes32(pub [u8; 32]);

/// Canonical request identifier (see [`derive_request_id`]).
pub type RequestId = Bytes32;

/// Canonical message hash signed by the signer nodes.
pub type MessageHash = Bytes32;

impl Bytes32 {
    pub const ZERO: Self = Self([0u8; 32]);

    /// Left-pads up to 32 bytes.
    pub fn left_padded(bytes: &[u8]) -> Result<Self, EncodingError> {
        if bytes.len() > 32 {
            return Err(EncodingError::InvalidLength {
                expected: 32,
                actual: bytes.len(),
            });
        }
        let mut out = [0u8; 32];
        out[32 - bytes.len()..].copy_from_slice(bytes);
        Ok(Self(out))
    }

    pub fn from_evm_address(address: &[u8; 20]) -> Self {
        let mut out = [0u8; 32];
        out[12..].copy_from_slice(address);
        Self(out)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }

    /// Trailing 20 bytes, when the leading 12 bytes are zero.
    pub fn to_evm_address(&self) -> Option<[u8; 20]> {
        if self.0[..12].iter().any(|b| *b != 0) {
            return None;
        }
        let mut out = [0u8; 20];
        out.copy_from_slice(&self.0[12..]);
        Some(out)
    }
}

impl FromStr for Bytes32 {
    type Err = EncodingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = encoding::decode_hex(s)?;
        Self::left_padded(&bytes)
    }
}

impl fmt::Display for Bytes32 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Bytes32 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Bytes32({})", self.to_hex())
    }
}

impl Serialize for Bytes32 {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Bytes32 {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

// ============================================================================
// ENUMERATIONS
// ============================================================================

/// Chain family, selecting the RPC dialect and event decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChainFamily {
    Evm,
    Svm,
}

impl fmt::Display for ChainFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChainFamily::Evm => f.write_str("evm"),
            ChainFamily::Svm => f.write_str("svm"),
        }
    }
}

/// Action executed on the destination chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MessageType {
    /// Mint wrapped tokens for value locked on the source chain.
    Mint,
    /// Release locked tokens for wrapped value burned on the source chain.
    Unlock,
}

impl MessageType {
    /// One-byte suffix appended to the message hash preimage.
    pub fn type_tag(&self) -> u8 {
        match self {
            MessageType::Mint => 0x01,
            MessageType::Unlock => 0x02,
        }
    }

    /// Destination contract function signature.
    pub fn destination_function(&self) -> &'static str {
        match self {
            MessageType::Mint => "mintTokens(bytes32,uint32,bytes32,bytes32,uint256,bytes[])",
            MessageType::Unlock => "unlockTokens(bytes32,uint32,bytes32,bytes32,uint256,bytes[])",
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageType::Mint => f.write_str("MINT"),
            MessageType::Unlock => f.write_str("UNLOCK"),
        }
    }
}

/// Kind of source-chain event that starts a transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    Locked,
    Burned,
}

impl EventKind {
    pub fn message_type(&self) -> MessageType {
        match self {
            EventKind::Locked => MessageType::Mint,
            EventKind::Burned => MessageType::Unlock,
        }
    }

    /// Event name as emitted by the source bridge contract/program.
    pub fn event_name(&self) -> &'static str {
        match self {
            EventKind::Locked => "TokensLocked",
            EventKind::Burned => "TokensBurned",
        }
    }
}

// ============================================================================
// CHAIN EVENTS
// ============================================================================

/// Lock/burn event decoded from an EVM `eth_getLogs` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvmLockEvent {
    pub source_domain: DomainId,
    pub block_number: u64,
    /// `0x`-prefixed transaction hash
    pub tx_hash: String,
    pub log_index: u32,
    pub kind: EventKind,
    /// Request id assigned by the source contract (informational)
    pub event_request_id: Bytes32,
    pub sender: [u8; 20],
    pub token: [u8; 20],
    pub amount: u128,
    pub destination_address: Bytes32,
    pub destination_domain: DomainId,
    pub nonce: u64,
}

/// Lock/burn event decoded from an SVM `Program data:` log line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SvmLockEvent {
    pub source_domain: DomainId,
    pub slot: u64,
    /// Base58 transaction signature
    pub signature: String,
    /// Position among the bridge event logs of the transaction
    pub log_index: u32,
    pub kind: EventKind,
    pub event_request_id: Bytes32,
    pub sender: [u8; 32],
    pub token_mint: [u8; 32],
    pub amount: u64,
    pub destination_address: [u8; 32],
    pub destination_domain: DomainId,
    pub nonce: u64,
}

/// Event observed on a source chain, tagged by chain family.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainEvent {
    Evm(EvmLockEvent),
    Svm(SvmLockEvent),
}

impl ChainEvent {
    pub fn family(&self) -> ChainFamily {
        match self {
            ChainEvent::Evm(_) => ChainFamily::Evm,
            ChainEvent::Svm(_) => ChainFamily::Svm,
        }
    }

    pub fn source_domain(&self) -> DomainId {
        match self {
            ChainEvent::Evm(e) => e.source_domain,
            ChainEvent::Svm(e) => e.source_domain,
        }
    }

    pub fn destination_domain(&self) -> DomainId {
        match self {
            ChainEvent::Evm(e) => e.destination_domain,
            ChainEvent::Svm(e) => e.destination_domain,
        }
    }

    pub fn tx_hash(&self) -> &str {
        match self {
            ChainEvent::Evm(e) => &e.tx_hash,
            ChainEvent::Svm(e) => &e.signature,
        }
    }

    pub fn log_index(&self) -> u32 {
        match self {
            ChainEvent::Evm(e) => e.log_index,
            ChainEvent::Svm(e) => e.log_index,
        }
    }

    /// Canonical request id of this event.
    pub fn request_id(&self) -> Result<RequestId, EncodingError> {
        let tx_bytes = encoding::tx_hash_bytes(self.family(), self.tx_hash())?;
        Ok(derive_request_id(
            self.source_domain(),
            &tx_bytes,
            self.log_index(),
        ))
    }

    /// Converts the chain-specific payload into a chain-agnostic transfer.
    pub fn into_transfer(self) -> Result<TransferEvent, EncodingError> {
        let request_id = self.request_id()?;
        let transfer = match self {
            ChainEvent::Evm(e) => TransferEvent {
                request_id,
                source_domain: e.source_domain,
                dest_domain: e.destination_domain,
                source_tx_hash: e.tx_hash.to_lowercase(),
                source_height: e.block_number,
                log_index: e.log_index,
                sender: Bytes32::from_evm_address(&e.sender),
                recipient: e.destination_address,
                token: Bytes32::from_evm_address(&e.token),
                amount: e.amount,
                message_type: e.kind.message_type(),
                nonce: e.nonce,
            },
            ChainEvent::Svm(e) => TransferEvent {
                request_id,
                source_domain: e.source_domain,
                dest_domain: e.destination_domain,
                source_tx_hash: e.signature,
                source_height: e.slot,
                log_index: e.log_index,
                sender: Bytes32(e.sender),
                recipient: Bytes32(e.destination_address),
                token: Bytes32(e.token_mint),
                amount: u128::from(e.amount),
                message_type: e.kind.message_type(),
                nonce: e.nonce,
            },
        };
        Ok(transfer)
    }
}

/// Chain-agnostic view of a source event, as persisted by the relayer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferEvent {
    pub request_id: RequestId,
    pub source_domain: DomainId,
    pub dest_domain: DomainId,
    pub source_tx_hash: String,
    pub source_height: u64,
    pub log_index: u32,
    pub sender: Bytes32,
    pub recipient: Bytes32,
    pub token: Bytes32,
    #[serde(with = "crate::api::amount_string")]
    pub amount: u128,
    pub message_type: MessageType,
    pub nonce: u64,
}

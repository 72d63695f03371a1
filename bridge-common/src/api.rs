//! HTTP wire types shared by the signer API, its clients, and the relayer status API.

use serde::{Deserialize, Serialize};

use crate::encoding::MessageFields;
use crate::error::BridgeError;
use crate::types::{Bytes32, ChainFamily, DomainId, MessageHash, MessageType, RequestId};

/// Header carrying the shared secret on authenticated signer endpoints.
pub const AUTH_HEADER: &str = "x-bridge-auth";

// ============================================================================
// GENERIC ENVELOPE
// ============================================================================

/// Standardized response structure for the relayer status endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    /// Whether the request was successful
    pub success: bool,
    /// Response data (if successful)
    pub data: Option<T>,
    /// Error message (if failed)
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn err(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

/// Error body returned by the signer endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
    pub code: String,
}

impl From<&BridgeError> for ErrorResponse {
    fn from(err: &BridgeError) -> Self {
        Self {
            success: false,
            error: err.to_string(),
            code: err.code().to_string(),
        }
    }
}

// ============================================================================
// SIGNER NODE
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub success: bool,
    pub status: String,
    pub signer_index: u32,
    pub signer_address: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SupportedChain {
    pub name: String,
    pub domain_id: DomainId,
    pub family: ChainFamily,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InfoResponse {
    pub success: bool,
    pub signer_index: u32,
    /// Compressed SEC1 public key (hex)
    pub public_key: String,
    pub signer_address: String,
    pub supported_chains: Vec<SupportedChain>,
}

/// Attestation request sent by the relayer to a signer node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignRequest {
    pub request_id: RequestId,
    pub source_domain: DomainId,
    pub dest_domain: DomainId,
    pub recipient: Bytes32,
    pub token: Bytes32,
    #[serde(with = "amount_string")]
    pub amount: u128,
    pub message_type: MessageType,
    /// Source chain tag as configured on the signer (e.g. "ethereum")
    pub source_chain: String,
    pub source_tx_hash: String,
}

impl SignRequest {
    pub fn message_fields(&self) -> MessageFields {
        MessageFields {
            request_id: self.request_id,
            source_domain: self.source_domain,
            dest_domain: self.dest_domain,
            recipient: self.recipient,
            token: self.token,
            amount: self.amount,
            message_type: self.message_type,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignResponse {
    pub success: bool,
    /// 65-byte `r || s || v` signature (hex)
    pub signature: String,
    pub message_hash: MessageHash,
    pub signer_index: u32,
    pub signer_address: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSignRequest {
    pub requests: Vec<SignRequest>,
}

/// Outcome of one item of a batch; failures never abort the batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSignResult {
    pub request_id: RequestId,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_hash: Option<MessageHash>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSignResponse {
    pub success: bool,
    pub signer_index: u32,
    pub signer_address: String,
    pub results: Vec<BatchSignResult>,
}

// ============================================================================
// AMOUNT SERIALIZATION
// ============================================================================

/// Serializes u128 amounts as decimal strings; accepts strings or JSON integers.
pub mod amount_string {
    use serde::{Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum AmountRepr {
        Text(String),
        Number(u64),
    }

    pub fn serialize<S: Serializer>(amount: &u128, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&amount.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u128, D::Error> {
        match AmountRepr::deserialize(deserializer)? {
            AmountRepr::Text(s) => s.trim().parse::<u128>().map_err(serde::de::Error::custom),
            AmountRepr::Number(n) => Ok(u128::from(n)),
        }
    }
}

//! Error taxonomy shared by every bridge component.

use thiserror::Error;

/// Failure classes of the attestation and relay pipeline.
///
/// Every error surfaced by a signer node or the relayer maps onto one of
/// these variants so callers can decide between "skip this cycle" and
/// "move the request to failed".
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BridgeError {
    /// The source transaction is missing, reverted, or does not carry the claimed event.
    #[error("verification failed: {0}")]
    VerificationFailure(String),

    /// An RPC endpoint or peer could not be reached, timed out, or answered garbage.
    #[error("transport failure: {0}")]
    TransportFailure(String),

    /// Fewer than M distinct signatures have been collected.
    #[error("threshold not met: {collected} of {threshold} signatures")]
    ThresholdNotMet { collected: usize, threshold: usize },

    /// The destination chain rejected or reverted the execution transaction.
    #[error("submission failed: {0}")]
    SubmissionFailure(String),

    /// The request failed and may not be retried again.
    #[error("retry budget exhausted after {attempts} attempts")]
    RetryBudgetExhausted { attempts: u32 },

    /// The caller did not present the shared secret.
    #[error("unauthorized")]
    Unauthorized,

    /// The caller sent a malformed request.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl BridgeError {
    /// Stable machine-readable code used on the wire.
    pub fn code(&self) -> &'static str {
        match self {
            BridgeError::VerificationFailure(_) => "VERIFICATION_FAILURE",
            BridgeError::TransportFailure(_) => "TRANSPORT_FAILURE",
            BridgeError::ThresholdNotMet { .. } => "THRESHOLD_NOT_MET",
            BridgeError::SubmissionFailure(_) => "SUBMISSION_FAILURE",
            BridgeError::RetryBudgetExhausted { .. } => "RETRY_BUDGET_EXHAUSTED",
            BridgeError::Unauthorized => "UNAUTHORIZED",
            BridgeError::InvalidRequest(_) => "BAD_REQUEST",
        }
    }

    /// Whether the failure is transient and should simply be retried next cycle.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            BridgeError::TransportFailure(_) | BridgeError::ThresholdNotMet { .. }
        )
    }
}

/// Errors raised while parsing identifiers, hashes and addresses.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncodingError {
    #[error("invalid hex: {0}")]
    InvalidHex(String),

    #[error("invalid base58: {0}")]
    InvalidBase58(String),

    #[error("invalid length: expected {expected} bytes, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    #[error("invalid signature: {0}")]
    InvalidSignature(String),

    #[error("invalid public key: {0}")]
    InvalidPublicKey(String),

    #[error("invalid event payload: {0}")]
    InvalidPayload(String),
}

impl From<EncodingError> for BridgeError {
    fn from(err: EncodingError) -> Self {
        BridgeError::InvalidRequest(err.to_string())
    }
}

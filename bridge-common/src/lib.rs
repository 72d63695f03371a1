//! Bridge Common Library
//!
//! Shared building blocks for the signer nodes and the relayer:
//! identifiers, the canonical request id and message hash encodings,
//! the tagged chain event model, HTTP wire types, and the error taxonomy.

pub mod api;
pub mod crypto;
pub mod encoding;
pub mod error;
pub mod types;

// Re-export commonly used types
pub use api::{
    ApiResponse, BatchSignRequest, BatchSignResponse, BatchSignResult, ErrorResponse,
    HealthResponse, InfoResponse, SignRequest, SignResponse, SupportedChain, AUTH_HEADER,
};
pub use encoding::{derive_request_id, MessageFields};
pub use error::{BridgeError, EncodingError};
pub use types::{
    Bytes32, ChainEvent, ChainFamily, DomainId, EventKind, EvmLockEvent, MessageHash,
    MessageType, RequestId, SvmLockEvent, TransferEvent,
};

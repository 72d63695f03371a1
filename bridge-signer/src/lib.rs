//! Bridge Signer Node Library
//!
//! One signer node holds exactly one participant key. It answers attestation
//! requests from the relayer only after re-reading the source chain itself.

pub mod api;
pub mod config;
pub mod crypto;
pub mod service;
pub mod verifier;

// Re-export commonly used types
pub use api::ApiServer;
pub use config::{ApiConfig, Config, SignerNodeConfig, SourceChainConfig};
pub use crypto::CryptoService;
pub use service::SigningService;
pub use verifier::SourceVerifier;

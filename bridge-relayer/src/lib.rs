//! Bridge Relayer Library
//!
//! Watches source chains for lock/burn events, collects M-of-N signer
//! attestations for each resulting request, and executes the attested
//! requests on their destination chains. All request state lives in a
//! durable store so every step can be resumed after a restart.

pub mod aggregator;
pub mod api;
pub mod config;
pub mod crypto;
pub mod service;
pub mod signer_client;
pub mod storage;
pub mod submitter;
pub mod tracker;
pub mod watcher;

// Re-export commonly used types
pub use aggregator::{Aggregator, CycleReport};
pub use api::ApiServer;
pub use config::{ApiConfig, ChainConfig, Config, RelayerConfig, SignerConfig};
pub use crypto::CryptoService;
pub use service::RelayerService;
pub use signer_client::SignerClient;
pub use storage::{BridgeRequest, RequestStatus, RequestStore, SignerSignature, StoreError};
pub use submitter::{EvmSubmitter, ReceiptOutcome};
pub use tracker::{RelayStatus, RetryTracker};
pub use watcher::{ChainWatcher, TickOutcome};

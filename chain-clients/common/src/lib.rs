//! Shared utilities for the chain client libraries.
//!
//! Both the EVM and the SVM clients speak JSON-RPC 2.0 over HTTP; the
//! transport, timeout handling and error classification live here.

pub mod json_rpc;

pub use json_rpc::{JsonRpcClient, RpcError};

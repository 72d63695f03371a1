//! JSON-RPC 2.0 over HTTP.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

// ============================================================================
// ERRORS
// ============================================================================

/// JSON-RPC call failure.
///
/// `Transport` and `Timeout` mean the node was not reached or did not answer;
/// `Rpc` means the node answered with an error object (e.g. a rejected transaction).
#[derive(Debug, Error)]
pub enum RpcError {
    #[error("transport error calling {method} on {url}: {message}")]
    Transport {
        method: String,
        url: String,
        message: String,
    },

    #[error("timed out after {timeout_ms}ms waiting for {method} from {url}")]
    Timeout {
        method: String,
        url: String,
        timeout_ms: u64,
    },

    #[error("JSON-RPC error from {method} (code {code}): {message}")]
    Rpc {
        method: String,
        code: i64,
        message: String,
    },

    #[error("failed to decode {method} result: {message}")]
    Decode { method: String, message: String },

    /// A paged query stopped before covering the requested range.
    #[error("incomplete {method} result: {message}")]
    Incomplete { method: String, message: String },
}

impl RpcError {
    /// True when the remote node was unreachable or too slow.
    pub fn is_transport(&self) -> bool {
        matches!(self, RpcError::Transport { .. } | RpcError::Timeout { .. })
    }

    pub fn decode(method: &str, message: impl Into<String>) -> Self {
        RpcError::Decode {
            method: method.to_string(),
            message: message.into(),
        }
    }
}

// ============================================================================
// WIRE TYPES
// ============================================================================

#[derive(Debug, Serialize)]
struct JsonRpcRequest<'a> {
    jsonrpc: &'static str,
    method: &'a str,
    params: serde_json::Value,
    id: u64,
}

#[derive(Debug, Deserialize)]
struct JsonRpcResponse {
    #[serde(default)]
    result: Option<serde_json::Value>,
    #[serde(default)]
    error: Option<JsonRpcErrorObject>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcErrorObject {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
}

// ============================================================================
// CLIENT
// ============================================================================

/// Minimal JSON-RPC client bound to one endpoint.
#[derive(Debug, Clone)]
pub struct JsonRpcClient {
    http: reqwest::Client,
    url: String,
    timeout: Duration,
    next_id: Arc<AtomicU64>,
}

impl JsonRpcClient {
    /// Creates a client for `url`; every call is bounded by `timeout`.
    pub fn new(url: &str, timeout: Duration) -> Result<Self, RpcError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .no_proxy()
            .build()
            .map_err(|e| RpcError::Transport {
                method: "client_init".to_string(),
                url: url.to_string(),
                message: e.to_string(),
            })?;

        Ok(Self {
            http,
            url: url.to_string(),
            timeout,
            next_id: Arc::new(AtomicU64::new(1)),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Performs one call and deserializes its `result`.
    ///
    /// A JSON `null` result deserializes into `Option::None` when `T` is an `Option`.
    pub async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<T, RpcError> {
        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            method,
            params,
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
        };

        let transport_err = |message: String| RpcError::Transport {
            method: method.to_string(),
            url: self.url.clone(),
            message,
        };

        let rpc_future = async {
            let resp = self
                .http
                .post(&self.url)
                .json(&request)
                .send()
                .await
                .map_err(|e| transport_err(e.to_string()))?;
            let status = resp.status();
            resp.json::<JsonRpcResponse>()
                .await
                .map_err(|e| transport_err(format!("HTTP {}: {}", status, e)))
        };

        let response = tokio::time::timeout(self.timeout, rpc_future)
            .await
            .map_err(|_| RpcError::Timeout {
                method: method.to_string(),
                url: self.url.clone(),
                timeout_ms: self.timeout.as_millis() as u64,
            })??;

        if let Some(error) = response.error {
            return Err(RpcError::Rpc {
                method: method.to_string(),
                code: error.code,
                message: error.message,
            });
        }

        let result = response.result.unwrap_or(serde_json::Value::Null);
        debug!("{} answered by {}", method, self.url);

        serde_json::from_value(result).map_err(|e| RpcError::decode(method, e.to_string()))
    }
}

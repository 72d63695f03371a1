//! HTTP client for one signer node.

use anyhow::{Context, Result};
use bridge_common::crypto::parse_public_key;
use bridge_common::{BridgeError, ErrorResponse, InfoResponse, SignRequest, SignResponse, AUTH_HEADER};
use k256::ecdsa::VerifyingKey;
use reqwest::{Client, StatusCode};
use std::sync::Arc;
use std::time::Duration;

use crate::config::SignerConfig;

/// Client for the signer API of the signer at `index`.
#[derive(Clone)]
pub struct SignerClient {
    index: u32,
    endpoint: String,
    public_key: VerifyingKey,
    http: Client,
    auth_token: Arc<String>,
}

impl SignerClient {
    /// Creates a client; every call is bounded by `timeout`.
    pub fn new(config: &SignerConfig, auth_token: Arc<String>, timeout: Duration) -> Result<Self> {
        let public_key = parse_public_key(&config.public_key)
            .with_context(|| format!("Invalid public key for signer {}", config.index))?;
        let http = Client::builder()
            .timeout(timeout)
            .no_proxy()
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            index: config.index,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            public_key,
            http,
            auth_token,
        })
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Public key the signer's attestations must recover to.
    pub fn public_key(&self) -> &VerifyingKey {
        &self.public_key
    }

    /// Asks the signer to verify the source event and attest it.
    ///
    /// # Returns
    ///
    /// * `Ok(SignResponse)` - The signer verified the event and signed
    /// * `Err(BridgeError::VerificationFailure)` - The signer refused
    /// * `Err(BridgeError::TransportFailure)` - Unreachable, timed out, or garbage answer
    pub async fn sign(&self, request: &SignRequest) -> Result<SignResponse, BridgeError> {
        let url = format!("{}/sign", self.endpoint);
        let response = self
            .http
            .post(&url)
            .header(AUTH_HEADER, self.auth_token.as_str())
            .json(request)
            .send()
            .await
            .map_err(|e| BridgeError::TransportFailure(format!("signer {}: {}", self.index, e)))?;

        let status = response.status();
        if status == StatusCode::OK {
            return response.json::<SignResponse>().await.map_err(|e| {
                BridgeError::TransportFailure(format!(
                    "signer {} returned an unreadable response: {}",
                    self.index, e
                ))
            });
        }

        let body = response.json::<ErrorResponse>().await.ok();
        Err(classify_error(self.index, status, body))
    }

    /// Fetches the signer's advertised identity.
    pub async fn info(&self) -> Result<InfoResponse, BridgeError> {
        let url = format!("{}/info", self.endpoint);
        let response = self
            .http
            .get(&url)
            .header(AUTH_HEADER, self.auth_token.as_str())
            .send()
            .await
            .map_err(|e| BridgeError::TransportFailure(format!("signer {}: {}", self.index, e)))?;

        let status = response.status();
        if status != StatusCode::OK {
            let body = response.json::<ErrorResponse>().await.ok();
            return Err(classify_error(self.index, status, body));
        }
        response
            .json::<InfoResponse>()
            .await
            .map_err(|e| BridgeError::TransportFailure(format!("signer {}: {}", self.index, e)))
    }
}

fn classify_error(index: u32, status: StatusCode, body: Option<ErrorResponse>) -> BridgeError {
    let message = body
        .as_ref()
        .map(|b| b.error.clone())
        .unwrap_or_else(|| format!("HTTP {}", status));
    let message = format!("signer {}: {}", index, message);

    match body.as_ref().map(|b| b.code.as_str()) {
        Some("VERIFICATION_FAILURE") => BridgeError::VerificationFailure(message),
        Some("UNAUTHORIZED") => BridgeError::Unauthorized,
        Some("BAD_REQUEST") => BridgeError::InvalidRequest(message),
        _ if status == StatusCode::UNPROCESSABLE_ENTITY => BridgeError::VerificationFailure(message),
        _ if status == StatusCode::UNAUTHORIZED => BridgeError::Unauthorized,
        _ => BridgeError::TransportFailure(message),
    }
}

//! Solana SVM RPC Client Module
//!
//! Minimal JSON-RPC client for watching a bridge program: current slot,
//! program transaction signatures within a slot range, and transaction
//! status plus log messages.

use chain_clients_common::{JsonRpcClient, RpcError};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::debug;

const COMMITMENT: &str = "confirmed";
pub const MAX_SIGNATURE_PAGES: usize = 50;

// ============================================================================
// RPC RESULT TYPES
// ============================================================================

/// Entry of `getSignaturesForAddress`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureInfo {
    pub signature: String,
    pub slot: u64,
    #[serde(default)]
    pub err: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionMeta {
    #[serde(default)]
    pub err: Option<serde_json::Value>,
    #[serde(default)]
    pub log_messages: Option<Vec<String>>,
}

/// Result of `getTransaction` (json encoding), reduced to what the bridge reads.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SvmTransaction {
    pub slot: u64,
    #[serde(default)]
    pub meta: Option<TransactionMeta>,
}

impl SvmTransaction {
    /// Executed without error. Transactions without metadata count as failed.
    pub fn succeeded(&self) -> bool {
        self.meta.as_ref().map(|m| m.err.is_none()).unwrap_or(false)
    }

    pub fn log_messages(&self) -> &[String] {
        self.meta
            .as_ref()
            .and_then(|m| m.log_messages.as_deref())
            .unwrap_or(&[])
    }
}

// ============================================================================
// CLIENT
// ============================================================================

pub struct SvmClient {
    rpc: JsonRpcClient,
    program_id: String,
}

impl SvmClient {
    /// Creates a client watching `program_id` (base58, 32 bytes).
    pub fn new(rpc_url: &str, program_id: &str, timeout: Duration) -> Result<Self, RpcError> {
        let decoded = bs58::decode(program_id)
            .into_vec()
            .map_err(|e| RpcError::decode("client_init", format!("invalid program id: {}", e)))?;
        if decoded.len() != 32 {
            return Err(RpcError::decode(
                "client_init",
                format!("program id must be 32 bytes, got {}", decoded.len()),
            ));
        }

        Ok(Self {
            rpc: JsonRpcClient::new(rpc_url, timeout)?,
            program_id: program_id.to_string(),
        })
    }

    pub fn program_id(&self) -> &str {
        &self.program_id
    }

    pub async fn get_slot(&self) -> Result<u64, RpcError> {
        self.rpc
            .call("getSlot", json!([{ "commitment": COMMITMENT }]))
            .await
    }

    /// One page of program signatures, newest first.
    pub async fn get_signatures_for_address(
        &self,
        before: Option<&str>,
        limit: usize,
    ) -> Result<Vec<SignatureInfo>, RpcError> {
        let mut options = json!({ "limit": limit, "commitment": COMMITMENT });
        if let Some(before) = before {
            options["before"] = json!(before);
        }
        self.rpc
            .call(
                "getSignaturesForAddress",
                json!([self.program_id, options]),
            )
            .await
    }

    /// Program signatures with `from_exclusive < slot <= to_inclusive`, oldest first.
    ///
    /// Fails with [`RpcError::Incomplete`] when the page cap runs out before
    /// the history reaches `from_exclusive`.
    pub async fn signatures_in_slot_range(
        &self,
        from_exclusive: u64,
        to_inclusive: u64,
        page_limit: usize,
    ) -> Result<Vec<SignatureInfo>, RpcError> {
        let mut collected = Vec::new();
        let mut before: Option<String> = None;
        let mut complete = false;

        for _ in 0..MAX_SIGNATURE_PAGES {
            let page = self
                .get_signatures_for_address(before.as_deref(), page_limit)
                .await?;
            let Some(last) = page.last() else {
                complete = true;
                break;
            };
            let reached_start = last.slot <= from_exclusive;
            before = Some(last.signature.clone());
            let page_len = page.len();

            collected.extend(
                page.into_iter()
                    .filter(|s| s.slot > from_exclusive && s.slot <= to_inclusive),
            );

            if reached_start || page_len < page_limit {
                complete = true;
                break;
            }
        }

        // Slots below the last fetched page were never seen
        if !complete {
            return Err(RpcError::Incomplete {
                method: "getSignaturesForAddress".to_string(),
                message: format!(
                    "slot {} not reached after {} pages of {}",
                    from_exclusive + 1,
                    MAX_SIGNATURE_PAGES,
                    page_limit
                ),
            });
        }

        debug!(
            "SVM program {}: {} signatures in slots ({}, {}]",
            self.program_id,
            collected.len(),
            from_exclusive,
            to_inclusive
        );

        collected.reverse();
        Ok(collected)
    }

    /// Transaction by signature, `None` if unknown to the node.
    pub async fn get_transaction(&self, signature: &str) -> Result<Option<SvmTransaction>, RpcError> {
        self.rpc
            .call(
                "getTransaction",
                json!([
                    signature,
                    {
                        "encoding": "json",
                        "commitment": COMMITMENT,
                        "maxSupportedTransactionVersion": 0
                    }
                ]),
            )
            .await
    }
}

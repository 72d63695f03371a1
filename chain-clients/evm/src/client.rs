//! EVM JSON-RPC client.

use bridge_common::encoding::{decode_hex, encode_hex};
use chain_clients_common::{JsonRpcClient, RpcError};
use serde::Serialize;
use serde_json::json;
use std::time::Duration;

use crate::types::{parse_hex_u64, EvmLog, EvmReceipt};

/// `eth_getLogs` filter.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogFilter {
    pub address: String,
    /// Positional topic filters; each position may list alternatives
    pub topics: Vec<Vec<String>>,
    pub from_block: String,
    pub to_block: String,
}

impl LogFilter {
    pub fn new(address: &str, topics: Vec<Vec<String>>, from_block: u64, to_block: u64) -> Self {
        Self {
            address: address.to_string(),
            topics,
            from_block: format!("0x{:x}", from_block),
            to_block: format!("0x{:x}", to_block),
        }
    }
}

/// Client for one EVM chain endpoint.
#[derive(Debug, Clone)]
pub struct EvmClient {
    rpc: JsonRpcClient,
}

impl EvmClient {
    /// Creates a new EVM client for `rpc_url`.
    pub fn new(rpc_url: &str, timeout: Duration) -> Result<Self, RpcError> {
        Ok(Self {
            rpc: JsonRpcClient::new(rpc_url, timeout)?,
        })
    }

    pub fn rpc_url(&self) -> &str {
        self.rpc.url()
    }

    /// Current head block number.
    pub async fn block_number(&self) -> Result<u64, RpcError> {
        let block_hex: String = self.rpc.call("eth_blockNumber", json!([])).await?;
        parse_hex_u64(&block_hex).map_err(|e| RpcError::decode("eth_blockNumber", e.to_string()))
    }

    /// Logs matching `filter`.
    pub async fn get_logs(&self, filter: &LogFilter) -> Result<Vec<EvmLog>, RpcError> {
        self.rpc.call("eth_getLogs", json!([filter])).await
    }

    /// Receipt of a mined transaction, `None` while pending or unknown.
    pub async fn get_transaction_receipt(
        &self,
        tx_hash: &str,
    ) -> Result<Option<EvmReceipt>, RpcError> {
        self.rpc
            .call("eth_getTransactionReceipt", json!([tx_hash]))
            .await
    }

    /// Pending nonce of `address`.
    pub async fn get_transaction_count(&self, address: &str) -> Result<u64, RpcError> {
        let nonce_hex: String = self
            .rpc
            .call("eth_getTransactionCount", json!([address, "pending"]))
            .await?;
        parse_hex_u64(&nonce_hex)
            .map_err(|e| RpcError::decode("eth_getTransactionCount", e.to_string()))
    }

    pub async fn gas_price(&self) -> Result<u64, RpcError> {
        let price_hex: String = self.rpc.call("eth_gasPrice", json!([])).await?;
        parse_hex_u64(&price_hex).map_err(|e| RpcError::decode("eth_gasPrice", e.to_string()))
    }

    /// Broadcasts a signed raw transaction and returns its hash.
    pub async fn send_raw_transaction(&self, raw_tx: &[u8]) -> Result<String, RpcError> {
        self.rpc
            .call("eth_sendRawTransaction", json!([encode_hex(raw_tx)]))
            .await
    }

    /// Read-only contract call at the latest block.
    pub async fn call(&self, to: &str, data: &[u8]) -> Result<Vec<u8>, RpcError> {
        let result: String = self
            .rpc
            .call(
                "eth_call",
                json!([{ "to": to, "data": encode_hex(data) }, "latest"]),
            )
            .await?;
        decode_hex(&result).map_err(|e| RpcError::decode("eth_call", e.to_string()))
    }
}

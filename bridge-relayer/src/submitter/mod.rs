//! Destination Submitter
//!
//! Executes ready requests on an EVM destination chain: replay pre-check via
//! `isExecuted(bytes32)`, `mintTokens`/`unlockTokens` call encoding, locally
//! signed legacy (EIP-155) transactions broadcast with `eth_sendRawTransaction`,
//! and receipt polling.
//!
//! One submitter exists per destination chain. Callers hold [`EvmSubmitter::acquire`]
//! for the whole broadcast-and-confirm sequence so the relayer account never has
//! two outstanding transactions on the same chain.

use anyhow::{Context, Result};
use bridge_common::encoding::amount_word;
use bridge_common::{BridgeError, DomainId, RequestId};
use chain_clients_common::RpcError;
use chain_clients_evm::abi::{self, AbiToken};
use chain_clients_evm::events::{IS_EXECUTED_SIGNATURE, REQUEST_EXECUTED_SIGNATURE};
use chain_clients_evm::rlp::eip155_v;
use chain_clients_evm::types::normalize_address;
use chain_clients_evm::{parse_address, EvmClient, LegacyTransaction, LogFilter};
use std::time::Duration;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

use crate::config::{ChainConfig, RelayerConfig};
use crate::crypto::CryptoService;
use crate::storage::BridgeRequest;

/// Result of waiting for an execution receipt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReceiptOutcome {
    Succeeded,
    Reverted,
    /// No receipt within the polling budget
    Pending,
}

/// Maps an RPC failure onto the bridge taxonomy.
///
/// A JSON-RPC error object on a write means the node rejected the transaction;
/// everything else is transient.
fn classify(err: RpcError, rejected_is_submission: bool) -> BridgeError {
    match err {
        RpcError::Rpc { .. } if rejected_is_submission => {
            BridgeError::SubmissionFailure(err.to_string())
        }
        other => BridgeError::TransportFailure(other.to_string()),
    }
}

/// ABI calldata of the destination execution call.
///
/// Signatures are passed in signer-index order.
pub fn encode_execution_call(request: &BridgeRequest) -> Vec<u8> {
    let mut signatures = request.signatures.clone();
    signatures.sort_by_key(|s| s.signer_index);

    abi::encode_call(
        request.message_type.destination_function(),
        &[
            AbiToken::Word(request.request_id.0),
            AbiToken::Word(abi::u32_word(request.source_domain)),
            AbiToken::Word(request.recipient.0),
            AbiToken::Word(request.token.0),
            AbiToken::Word(amount_word(request.amount)),
            AbiToken::BytesArray(signatures.into_iter().map(|s| s.signature).collect()),
        ],
    )
}

pub struct EvmSubmitter {
    chain_name: String,
    domain_id: DomainId,
    client: EvmClient,
    bridge_address: String,
    bridge_address_bytes: [u8; 20],
    chain_id: u64,
    gas_limit: u64,
    execution_lookback_blocks: u64,
    receipt_poll_attempts: u32,
    receipt_poll_interval: Duration,
    crypto: CryptoService,
    lock: Mutex<()>,
}

impl EvmSubmitter {
    /// Creates a submitter for a destination chain.
    ///
    /// # Arguments
    ///
    /// * `chain` - Destination chain; must be EVM with an `evm_chain_id`
    /// * `relayer` - Timing of receipt polling and RPC calls
    /// * `crypto` - Relayer account key
    pub fn new(chain: &ChainConfig, relayer: &RelayerConfig, crypto: CryptoService) -> Result<Self> {
        let chain_id = chain
            .evm_chain_id
            .ok_or_else(|| anyhow::anyhow!("Chain '{}' has no evm_chain_id", chain.name))?;
        let bridge_address_bytes = parse_address(&chain.bridge_address)
            .with_context(|| format!("Invalid bridge_address for chain '{}'", chain.name))?;
        let client = EvmClient::new(&chain.rpc_url, relayer.rpc_timeout())
            .with_context(|| format!("Failed to create EVM client for {}", chain.name))?;

        Ok(Self {
            chain_name: chain.name.clone(),
            domain_id: chain.domain_id,
            client,
            bridge_address: normalize_address(&chain.bridge_address),
            bridge_address_bytes,
            chain_id,
            gas_limit: chain.gas_limit,
            execution_lookback_blocks: chain.execution_lookback_blocks,
            receipt_poll_attempts: relayer.receipt_poll_attempts,
            receipt_poll_interval: relayer.receipt_poll_interval(),
            crypto,
            lock: Mutex::new(()),
        })
    }

    pub fn chain_name(&self) -> &str {
        &self.chain_name
    }

    pub fn domain_id(&self) -> DomainId {
        self.domain_id
    }

    /// Serializes use of the relayer account on this chain.
    pub async fn acquire(&self) -> MutexGuard<'_, ()> {
        self.lock.lock().await
    }

    /// Queries the destination contract's replay protection.
    pub async fn is_executed(&self, request_id: &RequestId) -> Result<bool, BridgeError> {
        let calldata = abi::encode_call(IS_EXECUTED_SIGNATURE, &[AbiToken::Word(request_id.0)]);
        let result = self
            .client
            .call(&self.bridge_address, &calldata)
            .await
            .map_err(|e| classify(e, false))?;
        abi::decode_bool(&result).ok_or_else(|| {
            BridgeError::TransportFailure(format!(
                "isExecuted returned malformed data on {}",
                self.chain_name
            ))
        })
    }

    /// Finds the transaction that executed `request_id`, searching recent
    /// `RequestExecuted` logs.
    pub async fn find_execution_tx(&self, request_id: &RequestId) -> Result<Option<String>, BridgeError> {
        let head = self
            .client
            .block_number()
            .await
            .map_err(|e| classify(e, false))?;
        let from = head.saturating_sub(self.execution_lookback_blocks);
        let filter = LogFilter::new(
            &self.bridge_address,
            vec![
                vec![abi::event_topic(REQUEST_EXECUTED_SIGNATURE)],
                vec![request_id.to_hex()],
            ],
            from,
            head,
        );
        let logs = self
            .client
            .get_logs(&filter)
            .await
            .map_err(|e| classify(e, false))?;

        Ok(logs
            .into_iter()
            .filter(|log| !log.is_removed())
            .find_map(|log| log.transaction_hash))
    }

    /// Signs and broadcasts the execution transaction of a ready request.
    ///
    /// # Returns
    ///
    /// * `Ok(String)` - Destination transaction hash
    /// * `Err(BridgeError::SubmissionFailure)` - The node rejected the transaction
    /// * `Err(BridgeError::TransportFailure)` - The node could not be reached
    pub async fn broadcast(&self, request: &BridgeRequest) -> Result<String, BridgeError> {
        let relayer_address = self.crypto.get_ethereum_address();
        let nonce = self
            .client
            .get_transaction_count(relayer_address)
            .await
            .map_err(|e| classify(e, false))?;
        let gas_price = self
            .client
            .gas_price()
            .await
            .map_err(|e| classify(e, false))?;

        let transaction = LegacyTransaction {
            nonce,
            gas_price,
            gas_limit: self.gas_limit,
            to: self.bridge_address_bytes,
            data: encode_execution_call(request),
        };

        let signing_hash = transaction.signing_hash(self.chain_id);
        let (r, s, recovery_id) = self
            .crypto
            .sign_evm_transaction_hash(&signing_hash)
            .map_err(|e| BridgeError::SubmissionFailure(e.to_string()))?;
        let raw = transaction.encode_signed(eip155_v(recovery_id, self.chain_id), &r, &s);

        debug!(
            "{}: raw tx nonce={}, gas_price={}, chain_id={}, from={}",
            self.chain_name, nonce, gas_price, self.chain_id, relayer_address
        );

        let tx_hash = self
            .client
            .send_raw_transaction(&raw)
            .await
            .map_err(|e| classify(e, true))?;

        info!(
            "{}: broadcast {} for request {} as {}",
            self.chain_name, request.message_type, request.request_id, tx_hash
        );
        Ok(tx_hash)
    }

    /// One receipt lookup: `Some(true)` succeeded, `Some(false)` reverted, `None` pending.
    pub async fn receipt_status(&self, tx_hash: &str) -> Result<Option<bool>, BridgeError> {
        let receipt = self
            .client
            .get_transaction_receipt(tx_hash)
            .await
            .map_err(|e| classify(e, false))?;
        Ok(receipt.map(|r| r.succeeded()))
    }

    /// Polls for the receipt of `tx_hash`.
    pub async fn wait_for_receipt(&self, tx_hash: &str) -> Result<ReceiptOutcome, BridgeError> {
        for attempt in 0..self.receipt_poll_attempts {
            match self.receipt_status(tx_hash).await? {
                Some(true) => return Ok(ReceiptOutcome::Succeeded),
                Some(false) => return Ok(ReceiptOutcome::Reverted),
                None => {
                    if attempt + 1 < self.receipt_poll_attempts {
                        tokio::time::sleep(self.receipt_poll_interval).await;
                    }
                }
            }
        }

        warn!(
            "{}: no receipt for {} after {} polls",
            self.chain_name, tx_hash, self.receipt_poll_attempts
        );
        Ok(ReceiptOutcome::Pending)
    }
}

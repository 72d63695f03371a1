//! Source Transaction Verification
//!
//! Before signing, a signer node re-reads the source chain itself: the claimed
//! transaction must exist, must have succeeded, must be buried under the
//! configured confirmation depth, and must carry a bridge lock/burn event whose
//! derived request id and transfer fields equal the claim. Caller input is
//! never trusted.

use anyhow::Context;
use bridge_common::{
    BridgeError, ChainEvent, ChainFamily, DomainId, SignRequest, SupportedChain, TransferEvent,
};
use chain_clients_common::RpcError;
use chain_clients_evm::types::normalize_address;
use chain_clients_evm::{decode_bridge_log, EvmClient};
use chain_clients_svm::{decode_program_logs, SvmClient};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::{Config, SourceChainConfig};

// ============================================================================
// CHAIN ADAPTERS
// ============================================================================

enum ChainReader {
    Evm {
        client: EvmClient,
        bridge_address: String,
    },
    Svm {
        client: SvmClient,
    },
}

struct SourceChain {
    name: String,
    domain_id: DomainId,
    family: ChainFamily,
    confirmation_depth: u64,
    reader: ChainReader,
}

fn transport(err: RpcError) -> BridgeError {
    BridgeError::TransportFailure(err.to_string())
}

fn verification(message: impl Into<String>) -> BridgeError {
    BridgeError::VerificationFailure(message.into())
}

impl SourceChain {
    fn from_config(chain: &SourceChainConfig, timeout: Duration) -> anyhow::Result<Self> {
        let reader = match chain.family {
            ChainFamily::Evm => {
                chain_clients_evm::parse_address(&chain.bridge_address).with_context(|| {
                    format!("Invalid bridge_address for source chain '{}'", chain.name)
                })?;
                ChainReader::Evm {
                    client: EvmClient::new(&chain.rpc_url, timeout)?,
                    bridge_address: normalize_address(&chain.bridge_address),
                }
            }
            ChainFamily::Svm => ChainReader::Svm {
                client: SvmClient::new(&chain.rpc_url, &chain.bridge_address, timeout)?,
            },
        };

        Ok(Self {
            name: chain.name.clone(),
            domain_id: chain.domain_id,
            family: chain.family,
            confirmation_depth: chain.confirmation_depth,
            reader,
        })
    }

    /// Bridge transfers carried by a succeeded, sufficiently confirmed transaction.
    async fn confirmed_transfers(&self, tx_hash: &str) -> Result<Vec<TransferEvent>, BridgeError> {
        let (height, events) = match &self.reader {
            ChainReader::Evm {
                client,
                bridge_address,
            } => {
                let receipt = client
                    .get_transaction_receipt(tx_hash)
                    .await
                    .map_err(transport)?
                    .ok_or_else(|| {
                        verification(format!("source transaction {} not found", tx_hash))
                    })?;
                if !receipt.succeeded() {
                    return Err(verification(format!(
                        "source transaction {} did not succeed",
                        tx_hash
                    )));
                }
                let height = receipt.block_number_u64().ok_or_else(|| {
                    verification(format!("source transaction {} is not mined", tx_hash))
                })?;

                let events: Vec<ChainEvent> = receipt
                    .logs
                    .iter()
                    .filter(|log| normalize_address(&log.address) == *bridge_address)
                    .filter_map(|log| match decode_bridge_log(log, self.domain_id) {
                        Ok(event) => event.map(ChainEvent::Evm),
                        Err(e) => {
                            warn!("Malformed bridge log in {}: {}", tx_hash, e);
                            None
                        }
                    })
                    .collect();
                (height, events)
            }
            ChainReader::Svm { client } => {
                let tx = client
                    .get_transaction(tx_hash)
                    .await
                    .map_err(transport)?
                    .ok_or_else(|| {
                        verification(format!("source transaction {} not found", tx_hash))
                    })?;
                if !tx.succeeded() {
                    return Err(verification(format!(
                        "source transaction {} did not succeed",
                        tx_hash
                    )));
                }

                let events: Vec<ChainEvent> = decode_program_logs(
                    tx.log_messages(),
                    client.program_id(),
                    self.domain_id,
                    tx.slot,
                    tx_hash,
                )
                .map_err(|e| verification(format!("undecodable bridge event: {}", e)))?
                .into_iter()
                .map(ChainEvent::Svm)
                .collect();
                (tx.slot, events)
            }
        };

        let head = match &self.reader {
            ChainReader::Evm { client, .. } => client.block_number().await,
            ChainReader::Svm { client } => client.get_slot().await,
        }
        .map_err(transport)?;

        if height.saturating_add(self.confirmation_depth) > head {
            return Err(verification(format!(
                "source transaction {} at height {} has fewer than {} confirmations (head {})",
                tx_hash, height, self.confirmation_depth, head
            )));
        }

        events
            .into_iter()
            .map(|event| {
                event
                    .into_transfer()
                    .map_err(|e| verification(format!("invalid bridge event: {}", e)))
            })
            .collect()
    }
}

// ============================================================================
// VERIFIER
// ============================================================================

/// Verifies sign requests against the configured source chains.
pub struct SourceVerifier {
    chains: HashMap<String, SourceChain>,
}

impl SourceVerifier {
    /// Builds one RPC client per configured source chain.
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        let timeout = Duration::from_millis(config.signer.rpc_timeout_ms);
        let mut chains = HashMap::new();
        for chain in &config.source_chains {
            chains.insert(chain.name.clone(), SourceChain::from_config(chain, timeout)?);
        }
        Ok(Self { chains })
    }

    /// Source chains as advertised by `/info`, ordered by domain id.
    pub fn supported_chains(&self) -> Vec<SupportedChain> {
        let mut chains: Vec<SupportedChain> = self
            .chains
            .values()
            .map(|c| SupportedChain {
                name: c.name.clone(),
                domain_id: c.domain_id,
                family: c.family,
            })
            .collect();
        chains.sort_by_key(|c| c.domain_id);
        chains
    }

    /// Confirms that `request` describes a real, final source event.
    ///
    /// # Returns
    ///
    /// * `Ok(())` - The claim matches the source chain exactly
    /// * `Err(BridgeError::VerificationFailure)` - Missing, failed, shallow or mismatching
    /// * `Err(BridgeError::TransportFailure)` - The source RPC could not be read
    pub async fn verify(&self, request: &SignRequest) -> Result<(), BridgeError> {
        let chain = self.chains.get(&request.source_chain).ok_or_else(|| {
            verification(format!("unsupported source chain '{}'", request.source_chain))
        })?;
        if chain.domain_id != request.source_domain {
            return Err(verification(format!(
                "source chain '{}' is domain {}, request claims {}",
                chain.name, chain.domain_id, request.source_domain
            )));
        }

        let transfers = chain.confirmed_transfers(&request.source_tx_hash).await?;
        let transfer = transfers
            .into_iter()
            .find(|t| t.request_id == request.request_id)
            .ok_or_else(|| {
                verification(format!(
                    "no bridge event in {} derives request id {}",
                    request.source_tx_hash, request.request_id
                ))
            })?;

        check_claim(&transfer, request)?;
        debug!(
            "Verified request {} against {} tx {}",
            request.request_id, chain.name, request.source_tx_hash
        );
        Ok(())
    }
}

/// Compares every signed field of the claim with the observed event.
fn check_claim(transfer: &TransferEvent, request: &SignRequest) -> Result<(), BridgeError> {
    let mismatch = |field: &str| {
        verification(format!(
            "{} of request {} does not match the source event",
            field, request.request_id
        ))
    };

    if transfer.dest_domain != request.dest_domain {
        return Err(mismatch("destDomain"));
    }
    if transfer.recipient != request.recipient {
        return Err(mismatch("recipient"));
    }
    if transfer.token != request.token {
        return Err(mismatch("token"));
    }
    if transfer.amount != request.amount {
        return Err(mismatch("amount"));
    }
    if transfer.message_type != request.message_type {
        return Err(mismatch("messageType"));
    }
    Ok(())
}

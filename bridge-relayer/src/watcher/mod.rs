//! Chain Event Watcher
//!
//! One watcher per source chain polls for lock/burn events below the
//! confirmation depth and turns them into `pending` requests. Delivery is
//! at-least-once: the cursor advances only after a whole range was ingested,
//! and re-ingesting an event is a no-op in the store.
//!
//! Events are only ingested from transactions that executed successfully.

use anyhow::{Context, Result};
use bridge_common::{ChainEvent, ChainFamily, DomainId};
use chain_clients_evm::events::{bridge_event_topic, BRIDGE_EVENT_KINDS};
use chain_clients_evm::types::normalize_address;
use chain_clients_evm::{decode_bridge_log, EvmClient, LogFilter};
use chain_clients_svm::{decode_program_logs, SvmClient};
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::config::ChainConfig;
use crate::storage::{CreateOutcome, RequestStore};

const SVM_SIGNATURE_PAGE: usize = 1000;

// ============================================================================
// SOURCE ADAPTERS
// ============================================================================

/// Per-family access to a source chain.
enum SourceReader {
    Evm {
        client: EvmClient,
        bridge_address: String,
    },
    Svm {
        client: SvmClient,
    },
}

impl SourceReader {
    async fn head(&self) -> Result<u64> {
        match self {
            SourceReader::Evm { client, .. } => client
                .block_number()
                .await
                .context("Failed to read EVM head block"),
            SourceReader::Svm { client } => {
                client.get_slot().await.context("Failed to read SVM slot")
            }
        }
    }

    /// Bridge events of successful transactions in `from..=to`.
    async fn scan(
        &self,
        domain_id: DomainId,
        from: u64,
        to: u64,
    ) -> Result<Vec<ChainEvent>> {
        match self {
            SourceReader::Evm {
                client,
                bridge_address,
            } => scan_evm(client, bridge_address, domain_id, from, to).await,
            SourceReader::Svm { client } => scan_svm(client, domain_id, from, to).await,
        }
    }
}

async fn scan_evm(
    client: &EvmClient,
    bridge_address: &str,
    domain_id: DomainId,
    from: u64,
    to: u64,
) -> Result<Vec<ChainEvent>> {
    let topics = vec![BRIDGE_EVENT_KINDS
        .iter()
        .map(|kind| bridge_event_topic(*kind))
        .collect::<Vec<String>>()];
    let filter = LogFilter::new(bridge_address, topics, from, to);
    let logs = client
        .get_logs(&filter)
        .await
        .with_context(|| format!("eth_getLogs failed for blocks {}..={}", from, to))?;

    let mut decoded = Vec::new();
    for log in &logs {
        if log.is_removed() || normalize_address(&log.address) != bridge_address {
            continue;
        }
        match decode_bridge_log(log, domain_id) {
            Ok(Some(event)) => decoded.push(event),
            Ok(None) => {}
            Err(e) => warn!("Skipping malformed bridge log in domain {}: {}", domain_id, e),
        }
    }

    // Logs are only trusted once their transaction's receipt reports success
    let tx_hashes: BTreeSet<String> = decoded.iter().map(|e| e.tx_hash.clone()).collect();
    let mut succeeded = HashSet::new();
    for tx_hash in tx_hashes {
        let receipt = client
            .get_transaction_receipt(&tx_hash)
            .await
            .with_context(|| format!("Failed to fetch receipt of {}", tx_hash))?
            .ok_or_else(|| anyhow::anyhow!("Receipt of {} not available yet", tx_hash))?;
        if receipt.succeeded() {
            succeeded.insert(tx_hash);
        } else {
            warn!(
                "Ignoring bridge events of reverted transaction {} in domain {}",
                tx_hash, domain_id
            );
        }
    }

    Ok(decoded
        .into_iter()
        .filter(|e| succeeded.contains(&e.tx_hash))
        .map(ChainEvent::Evm)
        .collect())
}

async fn scan_svm(
    client: &SvmClient,
    domain_id: DomainId,
    from: u64,
    to: u64,
) -> Result<Vec<ChainEvent>> {
    let signatures = client
        .signatures_in_slot_range(from.saturating_sub(1), to, SVM_SIGNATURE_PAGE)
        .await
        .with_context(|| format!("getSignaturesForAddress failed for slots {}..={}", from, to))?;

    let mut events = Vec::new();
    for info in signatures {
        if info.err.is_some() {
            debug!("Skipping failed SVM transaction {}", info.signature);
            continue;
        }
        let transaction = client
            .get_transaction(&info.signature)
            .await
            .with_context(|| format!("getTransaction failed for {}", info.signature))?
            .ok_or_else(|| anyhow::anyhow!("Transaction {} not available yet", info.signature))?;
        if !transaction.succeeded() {
            warn!(
                "Ignoring bridge events of failed transaction {} in domain {}",
                info.signature, domain_id
            );
            continue;
        }

        match decode_program_logs(
            transaction.log_messages(),
            client.program_id(),
            domain_id,
            transaction.slot,
            &info.signature,
        ) {
            Ok(decoded) => events.extend(decoded.into_iter().map(ChainEvent::Svm)),
            Err(e) => warn!(
                "Skipping undecodable bridge events of {}: {}",
                info.signature, e
            ),
        }
    }
    Ok(events)
}

// ============================================================================
// WATCHER
// ============================================================================

/// What one tick did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickOutcome {
    /// Scanned range, `None` when the chain had not advanced far enough
    pub range: Option<(u64, u64)>,
    pub created: usize,
    pub duplicates: usize,
    /// Events for destinations the relayer does not serve
    pub skipped: usize,
}

pub struct ChainWatcher {
    chain: ChainConfig,
    reader: SourceReader,
    store: Arc<RequestStore>,
    destinations: HashSet<DomainId>,
}

impl ChainWatcher {
    /// Creates a watcher for `chain`, ingesting events bound for `destinations`.
    pub fn new(
        chain: &ChainConfig,
        rpc_timeout: Duration,
        store: Arc<RequestStore>,
        destinations: HashSet<DomainId>,
    ) -> Result<Self> {
        let reader = match chain.family {
            ChainFamily::Evm => SourceReader::Evm {
                client: EvmClient::new(&chain.rpc_url, rpc_timeout)
                    .with_context(|| format!("Failed to create EVM client for {}", chain.name))?,
                bridge_address: normalize_address(&chain.bridge_address),
            },
            ChainFamily::Svm => SourceReader::Svm {
                client: SvmClient::new(&chain.rpc_url, &chain.bridge_address, rpc_timeout)
                    .with_context(|| format!("Failed to create SVM client for {}", chain.name))?,
            },
        };

        Ok(Self {
            chain: chain.clone(),
            reader,
            store,
            destinations,
        })
    }

    pub fn chain_name(&self) -> &str {
        &self.chain.name
    }

    /// Scans the next confirmed range and ingests its events.
    pub async fn tick(&self) -> Result<TickOutcome> {
        let head = self.reader.head().await?;
        let depth = self.chain.confirmation_depth;

        let last = match self.store.get_cursor(&self.chain.name)? {
            Some(cursor) => cursor,
            None => {
                let start = match self.chain.start_height {
                    Some(height) => height.saturating_sub(1),
                    None => head.saturating_sub(depth),
                };
                self.store.set_cursor(&self.chain.name, start)?;
                info!(
                    "Watcher {} starting after height {} (head {})",
                    self.chain.name, start, head
                );
                start
            }
        };

        if head <= last.saturating_add(depth) {
            debug!(
                "Watcher {}: head {} within confirmation depth of cursor {}",
                self.chain.name, head, last
            );
            return Ok(TickOutcome::default());
        }

        let from = last + 1;
        let mut to = head - depth;
        if let Some(max_range) = self.chain.max_block_range {
            to = to.min(from.saturating_add(max_range.saturating_sub(1)));
        }

        let events = self.reader.scan(self.chain.domain_id, from, to).await?;
        let mut outcome = TickOutcome {
            range: Some((from, to)),
            ..TickOutcome::default()
        };

        for event in events {
            let transfer = match event.into_transfer() {
                Ok(transfer) => transfer,
                Err(e) => {
                    warn!("Skipping event with undecodable identity: {}", e);
                    continue;
                }
            };
            if !self.destinations.contains(&transfer.dest_domain) {
                warn!(
                    "Skipping request {} for unknown destination domain {}",
                    transfer.request_id, transfer.dest_domain
                );
                outcome.skipped += 1;
                continue;
            }
            match self.store.create(&transfer, transfer.dest_domain)? {
                CreateOutcome::Created => outcome.created += 1,
                CreateOutcome::AlreadyExists => outcome.duplicates += 1,
            }
        }

        self.store.set_cursor(&self.chain.name, to)?;
        if outcome.created > 0 {
            info!(
                "Watcher {}: {} new request(s) in {}..={}",
                self.chain.name, outcome.created, from, to
            );
        }
        Ok(outcome)
    }

    /// Ticks every `interval` until `shutdown` flips to true.
    pub async fn run(&self, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        info!(
            "Starting watcher for {} (domain {}, depth {})",
            self.chain.name, self.chain.domain_id, self.chain.confirmation_depth
        );

        loop {
            if *shutdown.borrow() {
                break;
            }
            if let Err(e) = self.tick().await {
                error!("Watcher {} tick failed: {:#}", self.chain.name, e);
            }

            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        info!("Watcher {} stopped", self.chain.name);
    }
}

//! Relayer service wiring.
//!
//! Builds the store, one watcher per source chain, the signer clients, one
//! submitter per destination chain and the aggregator, then runs them as
//! independent tasks next to the retention sweep and the status API.

use anyhow::{Context, Result};
use bridge_common::crypto::public_key_hex;
use futures::future::join_all;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::aggregator::Aggregator;
use crate::api::ApiServer;
use crate::config::Config;
use crate::crypto::CryptoService;
use crate::signer_client::SignerClient;
use crate::storage::{RequestStore, StoreError};
use crate::submitter::EvmSubmitter;
use crate::tracker::RetryTracker;
use crate::watcher::ChainWatcher;

pub struct RelayerService {
    config: Arc<Config>,
    store: Arc<RequestStore>,
    watchers: Vec<Arc<ChainWatcher>>,
    signers: Vec<SignerClient>,
    aggregator: Arc<Aggregator>,
    tracker: Arc<RetryTracker>,
    relayer_address: String,
}

impl RelayerService {
    /// Builds every component from a validated configuration.
    ///
    /// # Arguments
    ///
    /// * `config` - Relayer configuration
    /// * `crypto` - Relayer account key for destination transactions
    pub fn new(config: Config, crypto: CryptoService) -> Result<Self> {
        let relayer = &config.relayer;
        let store = Arc::new(
            RequestStore::open(&relayer.store_path)
                .with_context(|| format!("Failed to open request store at {}", relayer.store_path))?,
        );

        let destinations = config.destination_domains();
        let watchers = config
            .chains
            .iter()
            .map(|chain| {
                ChainWatcher::new(chain, relayer.rpc_timeout(), store.clone(), destinations.clone())
                    .map(Arc::new)
            })
            .collect::<Result<Vec<_>>>()?;

        let auth_token = Arc::new(relayer.get_signer_auth_token()?);
        let signers = config
            .signers
            .iter()
            .map(|s| SignerClient::new(s, auth_token.clone(), relayer.signer_timeout()))
            .collect::<Result<Vec<_>>>()?;

        let submitters = config
            .chains
            .iter()
            .filter(|chain| chain.is_destination())
            .map(|chain| EvmSubmitter::new(chain, relayer, crypto.clone()).map(Arc::new))
            .collect::<Result<Vec<_>>>()?;

        let source_chains: HashMap<_, _> = config
            .chains
            .iter()
            .map(|chain| (chain.domain_id, chain.name.clone()))
            .collect();

        let tracker = Arc::new(RetryTracker::new(relayer.max_retries, relayer.retry_cooldown()));
        let aggregator = Arc::new(Aggregator::new(
            store.clone(),
            signers.clone(),
            submitters,
            tracker.clone(),
            source_chains,
            relayer.threshold,
            relayer.max_retries,
            relayer.signer_timeout(),
        ));

        Ok(Self {
            relayer_address: crypto.get_ethereum_address().to_string(),
            config: Arc::new(config),
            store,
            watchers,
            signers,
            aggregator,
            tracker,
        })
    }

    pub fn store(&self) -> Arc<RequestStore> {
        self.store.clone()
    }

    /// Compares each signer's advertised key with the configured one.
    ///
    /// Unreachable or mismatching signers are logged and tolerated; the
    /// aggregator discards their attestations anyway.
    pub async fn check_signers(&self) -> usize {
        let checks = self.signers.iter().map(|signer| async move {
            match signer.info().await {
                Ok(info) if info.signer_index != signer.index() => {
                    warn!(
                        "Signer at {} reports index {}, configured as {}",
                        signer.endpoint(),
                        info.signer_index,
                        signer.index()
                    );
                    false
                }
                Ok(info) if !info.public_key.eq_ignore_ascii_case(&public_key_hex(signer.public_key())) => {
                    warn!(
                        "Signer {} advertises public key {}, which is not the configured key",
                        signer.index(),
                        info.public_key
                    );
                    false
                }
                Ok(_) => true,
                Err(e) => {
                    warn!("Signer {} at {} unavailable: {}", signer.index(), signer.endpoint(), e);
                    false
                }
            }
        });

        let healthy = join_all(checks).await.into_iter().filter(|ok| *ok).count();
        info!("{} of {} signers reachable with matching keys", healthy, self.signers.len());
        healthy
    }

    /// Runs until Ctrl-C.
    pub async fn run(self) -> Result<()> {
        self.run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for shutdown signal: {}", e);
            }
        })
        .await
    }

    /// Runs every task until `signal` completes, then drains them and flushes the store.
    pub async fn run_until(self, signal: impl Future<Output = ()>) -> Result<()> {
        let relayer = &self.config.relayer;
        if self.check_signers().await < relayer.threshold {
            warn!(
                "Fewer than {} signers are currently usable; requests will wait in collection",
                relayer.threshold
            );
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut tasks: Vec<JoinHandle<()>> = Vec::new();

        for watcher in &self.watchers {
            let watcher = watcher.clone();
            let interval = relayer.polling_interval();
            let shutdown = shutdown_rx.clone();
            tasks.push(tokio::spawn(async move {
                watcher.run(interval, shutdown).await;
            }));
        }

        let aggregator = self.aggregator.clone();
        let interval = relayer.polling_interval();
        let shutdown = shutdown_rx.clone();
        tasks.push(tokio::spawn(async move {
            aggregator.run(interval, shutdown).await;
        }));

        tasks.push(tokio::spawn(run_cleanup(
            self.store.clone(),
            self.tracker.clone(),
            relayer.retention(),
            relayer.cleanup_interval(),
            shutdown_rx.clone(),
        )));

        let api = ApiServer::new(self.config.clone(), self.store.clone(), self.relayer_address.clone());
        let api_shutdown = shutdown_rx.clone();
        tasks.push(tokio::spawn(async move {
            if let Err(e) = api.run(api_shutdown).await {
                error!("Status API failed: {:#}", e);
            }
        }));

        info!("Relayer running with {} task(s)", tasks.len());
        signal.await;

        info!("Shutdown requested, waiting for in-flight work");
        let _ = shutdown_tx.send(true);
        for result in join_all(tasks).await {
            if let Err(e) = result {
                error!("Relayer task ended abnormally: {}", e);
            }
        }

        self.store.flush().context("Failed to flush request store")?;
        info!("Relayer stopped");
        Ok(())
    }
}

/// Deletes expired terminal requests and forgets relay state of every
/// message that is no longer open.
///
/// # Returns
///
/// * `Ok((requests_removed, entries_pruned))`
pub async fn sweep_retention(
    store: &RequestStore,
    tracker: &RetryTracker,
    retention: std::time::Duration,
) -> Result<(usize, usize), StoreError> {
    let removed = store.cleanup(retention)?;
    let open = store.open_message_hashes()?;
    let pruned = tracker.prune(&open).await;
    Ok((removed, pruned))
}

/// Periodic retention sweep.
async fn run_cleanup(
    store: Arc<RequestStore>,
    tracker: Arc<RetryTracker>,
    retention: std::time::Duration,
    interval: std::time::Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        if *shutdown.borrow() {
            break;
        }
        if let Err(e) = sweep_retention(&store, &tracker, retention).await {
            error!("Retention cleanup failed: {}", e);
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
}

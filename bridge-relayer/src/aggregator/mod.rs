//! Aggregator / Relayer
//!
//! Drives requests from `pending` to `confirmed`. Each cycle runs four passes:
//!
//! 1. **Collection** - fan out `sign` calls to every signer not yet represented on
//!    an actionable request, in parallel and each under a timeout; verified
//!    signatures are merged and the store promotes the request at M.
//! 2. **Reconciliation** - resolve `submitted` requests whose receipt was not seen.
//! 3. **Submission** - execute `ready` requests on their destination chain,
//!    serialized per destination and parallel across destinations. A
//!    destination with an unresolved submission takes no new one until
//!    reconciliation settles it.
//! 4. **Retry** - send `failed` requests back to collection while budget remains,
//!    otherwise mark them exhausted.
//!
//! Errors of one request, signer or chain never abort the cycle.

use anyhow::Result;
use bridge_common::crypto::recover_signer;
use bridge_common::encoding::decode_hex;
use bridge_common::{BridgeError, DomainId, SignRequest};
use chrono::Utc;
use futures::future::join_all;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::signer_client::SignerClient;
use crate::storage::{BridgeRequest, RequestStatus, RequestStore, SignerSignature};
use crate::submitter::{EvmSubmitter, ReceiptOutcome};
use crate::tracker::RetryTracker;

// ============================================================================
// CYCLE REPORTING
// ============================================================================

/// Outcome counters of one aggregator cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Signatures merged into the store
    pub signatures_merged: usize,
    /// Requests promoted to `ready`
    pub promoted: usize,
    pub submitted: usize,
    pub confirmed: usize,
    pub failed: usize,
    pub retried: usize,
    pub exhausted: usize,
}

impl CycleReport {
    fn absorb(&mut self, other: CycleReport) {
        self.signatures_merged += other.signatures_merged;
        self.promoted += other.promoted;
        self.submitted += other.submitted;
        self.confirmed += other.confirmed;
        self.failed += other.failed;
        self.retried += other.retried;
        self.exhausted += other.exhausted;
    }
}

/// State of a destination account after one submission attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lane {
    /// Nothing of ours is pending on the account
    Free,
    /// A broadcast transaction is not settled yet
    Outstanding,
}

// ============================================================================
// AGGREGATOR
// ============================================================================

pub struct Aggregator {
    store: Arc<RequestStore>,
    signers: Vec<SignerClient>,
    submitters: HashMap<DomainId, Arc<EvmSubmitter>>,
    tracker: Arc<RetryTracker>,
    /// Source domain -> chain tag the signers know it by
    source_chains: HashMap<DomainId, String>,
    threshold: usize,
    max_retries: u32,
    signer_timeout: Duration,
}

impl Aggregator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<RequestStore>,
        signers: Vec<SignerClient>,
        submitters: Vec<Arc<EvmSubmitter>>,
        tracker: Arc<RetryTracker>,
        source_chains: HashMap<DomainId, String>,
        threshold: usize,
        max_retries: u32,
        signer_timeout: Duration,
    ) -> Self {
        Self {
            store,
            signers,
            submitters: submitters
                .into_iter()
                .map(|s| (s.domain_id(), s))
                .collect(),
            tracker,
            source_chains,
            threshold,
            max_retries,
            signer_timeout,
        }
    }

    /// Runs one full cycle.
    pub async fn run_cycle(&self) -> Result<CycleReport> {
        let mut report = self.collect_signatures().await?;
        report.absorb(self.reconcile_submitted().await?);
        report.absorb(self.submit_ready().await?);
        report.absorb(self.retry_failed().await?);
        Ok(report)
    }

    /// Runs cycles every `interval` until `shutdown` flips to true.
    pub async fn run(&self, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        info!(
            "Starting aggregator: threshold {} of {} signers, {} destination(s)",
            self.threshold,
            self.signers.len(),
            self.submitters.len()
        );

        loop {
            if *shutdown.borrow() {
                break;
            }
            match self.run_cycle().await {
                Ok(report) if report != CycleReport::default() => {
                    info!("Aggregator cycle: {:?}", report)
                }
                Ok(_) => debug!("Aggregator cycle: nothing to do"),
                Err(e) => error!("Aggregator cycle failed: {:#}", e),
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

        info!("Aggregator stopped");
    }

    // ------------------------------------------------------------------
    // Collection
    // ------------------------------------------------------------------

    /// Collection pass over every actionable request.
    pub async fn collect_signatures(&self) -> Result<CycleReport> {
        let actionable = self.store.get_actionable(self.threshold)?;
        let reports = join_all(actionable.iter().map(|r| self.collect_for(r))).await;

        let mut report = CycleReport::default();
        for r in reports {
            report.absorb(r);
        }
        Ok(report)
    }

    fn sign_request_for(&self, request: &BridgeRequest) -> Option<SignRequest> {
        let source_chain = self.source_chains.get(&request.source_domain)?;
        Some(SignRequest {
            request_id: request.request_id,
            source_domain: request.source_domain,
            dest_domain: request.dest_domain,
            recipient: request.recipient,
            token: request.token,
            amount: request.amount,
            message_type: request.message_type,
            source_chain: source_chain.clone(),
            source_tx_hash: request.source_tx_hash.clone(),
        })
    }

    async fn collect_for(&self, request: &BridgeRequest) -> CycleReport {
        let mut report = CycleReport::default();
        let Some(sign_request) = self.sign_request_for(request) else {
            error!(
                "Request {} has unknown source domain {}",
                request.request_id, request.source_domain
            );
            return report;
        };

        let expected_hash = request.message_hash();
        let missing: Vec<&SignerClient> = self
            .signers
            .iter()
            .filter(|s| !request.has_signer(s.index()))
            .collect();

        let calls = missing.iter().map(|signer| {
            let sign_request = &sign_request;
            async move {
                let result = tokio::time::timeout(self.signer_timeout, signer.sign(sign_request)).await;
                (*signer, result)
            }
        });

        let mut signatures = Vec::new();
        for (signer, result) in join_all(calls).await {
            let response = match result {
                Err(_) => {
                    warn!(
                        "Signer {} timed out for request {}",
                        signer.index(),
                        request.request_id
                    );
                    continue;
                }
                Ok(Err(e)) => {
                    warn!(
                        "Signer {} did not sign request {}: {}",
                        signer.index(),
                        request.request_id,
                        e
                    );
                    continue;
                }
                Ok(Ok(response)) => response,
            };

            match check_attestation(signer, &expected_hash, &response) {
                Ok(signature) => signatures.push(SignerSignature {
                    signer_index: signer.index(),
                    signature,
                }),
                Err(e) => warn!(
                    "Discarding attestation of signer {} for request {}: {}",
                    signer.index(),
                    request.request_id,
                    e
                ),
            }
        }

        let mut count = request.signature_count();
        if !signatures.is_empty() {
            match self
                .store
                .merge_signatures(&request.request_id, &signatures, self.threshold)
            {
                Ok(outcome) => {
                    report.signatures_merged += outcome.added;
                    if outcome.promoted {
                        report.promoted += 1;
                    }
                    count = outcome.count;
                }
                Err(e) => {
                    warn!("Failed to merge signatures of {}: {}", request.request_id, e);
                    return report;
                }
            }
        }

        if count < self.threshold {
            let age = request.age(Utc::now());
            warn!(
                "Request {}: {} (age {}s)",
                request.request_id,
                BridgeError::ThresholdNotMet {
                    collected: count,
                    threshold: self.threshold
                },
                age.num_seconds()
            );
        }
        report
    }

    // ------------------------------------------------------------------
    // Submission
    // ------------------------------------------------------------------

    /// Submission pass over every `ready` request.
    ///
    /// Destinations that still have a `submitted` request are skipped.
    pub async fn submit_ready(&self) -> Result<CycleReport> {
        let ready = self.store.list_by_status(RequestStatus::Ready)?;
        let busy: HashSet<DomainId> = self
            .store
            .list_by_status(RequestStatus::Submitted)?
            .iter()
            .map(|r| r.dest_domain)
            .collect();

        let mut by_destination: BTreeMap<DomainId, Vec<BridgeRequest>> = BTreeMap::new();
        for request in ready {
            by_destination
                .entry(request.dest_domain)
                .or_default()
                .push(request);
        }

        let busy = &busy;
        let lanes = by_destination.into_iter().map(|(dest, requests)| async move {
            let mut report = CycleReport::default();
            if busy.contains(&dest) {
                debug!(
                    "Destination {} has an unresolved submission; holding {} ready request(s)",
                    dest,
                    requests.len()
                );
                return report;
            }
            let Some(submitter) = self.submitters.get(&dest) else {
                error!(
                    "{} ready request(s) for destination {} without a submitter",
                    requests.len(),
                    dest
                );
                return report;
            };
            for (position, request) in requests.iter().enumerate() {
                let (outcome, lane) = self.submit_one(submitter, request).await;
                report.absorb(outcome);
                if lane == Lane::Outstanding {
                    let held = requests.len() - position - 1;
                    if held > 0 {
                        warn!(
                            "Destination {}: transaction of {} unresolved, holding {} request(s)",
                            dest, request.request_id, held
                        );
                    }
                    break;
                }
            }
            report
        });

        let mut report = CycleReport::default();
        for lane in join_all(lanes).await {
            report.absorb(lane);
        }
        Ok(report)
    }

    async fn submit_one(&self, submitter: &EvmSubmitter, request: &BridgeRequest) -> (CycleReport, Lane) {
        let mut report = CycleReport::default();
        let id = request.request_id;
        let hash = request.message_hash();

        if !self.tracker.try_begin(&hash).await {
            debug!("Request {} is already being relayed or cooling down", id);
            return (report, Lane::Free);
        }

        let _account = submitter.acquire().await;

        // Another cycle may have moved the request while this one waited
        match self.store.get(&id) {
            Ok(Some(current)) if current.status == RequestStatus::Ready => {}
            Ok(_) => {
                self.tracker.release(&hash).await;
                return (report, Lane::Free);
            }
            Err(e) => {
                error!("Failed to reload request {}: {}", id, e);
                self.tracker.release(&hash).await;
                return (report, Lane::Free);
            }
        }

        match submitter.is_executed(&id).await {
            Ok(false) => {}
            Ok(true) => return (self.record_prior_execution(submitter, request).await, Lane::Free),
            Err(e) => {
                warn!("Replay check for {} failed: {}", id, e);
                self.tracker.release(&hash).await;
                return (report, Lane::Free);
            }
        }

        let tx_hash = match submitter.broadcast(request).await {
            Ok(tx_hash) => tx_hash,
            Err(e) if e.is_transient() => {
                warn!("Broadcast of {} deferred: {}", id, e);
                self.tracker.release(&hash).await;
                return (report, Lane::Free);
            }
            Err(e) => {
                error!("Submission of {} rejected: {}", id, e);
                self.fail(request, &e.to_string(), &mut report).await;
                return (report, Lane::Free);
            }
        };

        if let Err(e) = self.store.mark_submitted(&id, &tx_hash) {
            // The replay check of a later cycle finds the execution, if any
            error!("Failed to record submission {} of {}: {}", tx_hash, id, e);
            self.tracker.release(&hash).await;
            return (report, Lane::Outstanding);
        }
        report.submitted += 1;

        let lane = match submitter.wait_for_receipt(&tx_hash).await {
            Ok(ReceiptOutcome::Succeeded) => {
                match self.store.mark_confirmed(&id) {
                    Ok(_) => {
                        self.tracker.mark_success(&hash).await;
                        report.confirmed += 1;
                    }
                    Err(e) => error!("Failed to confirm {}: {}", id, e),
                }
                Lane::Free
            }
            Ok(ReceiptOutcome::Reverted) => {
                let reason = BridgeError::SubmissionFailure(format!("transaction {} reverted", tx_hash));
                error!("Request {}: {}", id, reason);
                self.fail(request, &reason.to_string(), &mut report).await;
                Lane::Free
            }
            Ok(ReceiptOutcome::Pending) => {
                warn!("Request {} left submitted; receipt of {} pending", id, tx_hash);
                Lane::Outstanding
            }
            Err(e) => {
                warn!("Receipt of {} for {} unavailable: {}", tx_hash, id, e);
                Lane::Outstanding
            }
        };
        (report, lane)
    }

    /// The destination already executed this request: record the execution
    /// transaction, or make the request terminal when it cannot be found.
    async fn record_prior_execution(&self, submitter: &EvmSubmitter, request: &BridgeRequest) -> CycleReport {
        let mut report = CycleReport::default();
        let id = request.request_id;
        let hash = request.message_hash();

        match submitter.find_execution_tx(&id).await {
            Ok(Some(tx_hash)) => {
                info!("Request {} was already executed in {}", id, tx_hash);
                let recorded = self
                    .store
                    .mark_submitted(&id, &tx_hash)
                    .and_then(|_| self.store.mark_confirmed(&id));
                match recorded {
                    Ok(_) => {
                        self.tracker.mark_success(&hash).await;
                        report.confirmed += 1;
                    }
                    Err(e) => error!("Failed to record prior execution of {}: {}", id, e),
                }
            }
            Ok(None) => {
                error!(
                    "Request {} is executed on {} but no RequestExecuted log was found; needs operator attention",
                    id,
                    submitter.chain_name()
                );
                self.fail(request, "executed on destination, execution tx not found", &mut report)
                    .await;
                match self.store.mark_exhausted(&id) {
                    Ok(_) => report.exhausted += 1,
                    Err(e) => error!("Failed to mark {} exhausted: {}", id, e),
                }
            }
            Err(e) => {
                warn!("Lookup of prior execution of {} failed: {}", id, e);
                self.tracker.release(&hash).await;
            }
        }
        report
    }

    async fn fail(&self, request: &BridgeRequest, reason: &str, report: &mut CycleReport) {
        match self.store.mark_failed(&request.request_id, reason) {
            Ok(_) => report.failed += 1,
            Err(e) => error!("Failed to mark {} failed: {}", request.request_id, e),
        }
        self.tracker.mark_failed(&request.message_hash()).await;
    }

    // ------------------------------------------------------------------
    // Reconciliation and retry
    // ------------------------------------------------------------------

    /// Resolves `submitted` requests from their destination receipts.
    pub async fn reconcile_submitted(&self) -> Result<CycleReport> {
        let mut report = CycleReport::default();
        for request in self.store.list_by_status(RequestStatus::Submitted)? {
            let (Some(submitter), Some(tx_hash)) = (
                self.submitters.get(&request.dest_domain),
                request.dest_tx_hash.as_deref(),
            ) else {
                continue;
            };

            match submitter.receipt_status(tx_hash).await {
                Ok(Some(true)) => match self.store.mark_confirmed(&request.request_id) {
                    Ok(_) => {
                        self.tracker.mark_success(&request.message_hash()).await;
                        report.confirmed += 1;
                    }
                    Err(e) => error!("Failed to confirm {}: {}", request.request_id, e),
                },
                Ok(Some(false)) => {
                    let reason = BridgeError::SubmissionFailure(format!("transaction {} reverted", tx_hash));
                    error!("Request {}: {}", request.request_id, reason);
                    self.fail(&request, &reason.to_string(), &mut report).await;
                }
                Ok(None) => debug!("Request {} still awaiting {}", request.request_id, tx_hash),
                Err(e) => warn!("Reconciling {} failed: {}", request.request_id, e),
            }
        }
        Ok(report)
    }

    /// Returns retryable `failed` requests to collection and exhausts the rest.
    pub async fn retry_failed(&self) -> Result<CycleReport> {
        let mut report = CycleReport::default();
        for request in self.store.list_by_status(RequestStatus::Failed)? {
            if request.exhausted {
                continue;
            }
            let id = request.request_id;

            if request.attempts >= self.max_retries {
                error!(
                    "Request {}: {} (last failure: {})",
                    id,
                    BridgeError::RetryBudgetExhausted {
                        attempts: request.attempts
                    },
                    request.failure_reason.as_deref().unwrap_or("unknown")
                );
                match self.store.mark_exhausted(&id) {
                    Ok(_) => report.exhausted += 1,
                    Err(e) => error!("Failed to mark {} exhausted: {}", id, e),
                }
                continue;
            }

            if !self.tracker.can_retry(&request.message_hash()).await {
                continue;
            }
            match self.store.retry_failed(&id) {
                Ok(_) => {
                    info!(
                        "Retrying request {} (attempt {} of {})",
                        id,
                        request.attempts + 1,
                        self.max_retries
                    );
                    report.retried += 1;
                }
                Err(e) => warn!("Failed to retry {}: {}", id, e),
            }
        }
        Ok(report)
    }
}

/// Checks a signer's answer against the locally computed message hash and the
/// signer's configured key.
fn check_attestation(
    signer: &SignerClient,
    expected_hash: &bridge_common::MessageHash,
    response: &bridge_common::SignResponse,
) -> Result<Vec<u8>, BridgeError> {
    if response.message_hash != *expected_hash {
        return Err(BridgeError::VerificationFailure(format!(
            "message hash mismatch: got {}, expected {}",
            response.message_hash, expected_hash
        )));
    }
    if response.signer_index != signer.index() {
        return Err(BridgeError::VerificationFailure(format!(
            "answered as signer {}",
            response.signer_index
        )));
    }

    let signature = decode_hex(&response.signature)?;
    let recovered = recover_signer(expected_hash, &signature)?;
    if recovered != *signer.public_key() {
        return Err(BridgeError::VerificationFailure(
            "signature does not recover to the configured public key".to_string(),
        ));
    }
    Ok(signature)
}

//! Request Store
//!
//! Durable map from request id to [`BridgeRequest`], backed by sled. Values are
//! JSON documents. Every mutation of one request is a read-modify-write retried
//! under `compare_and_swap`, so concurrent writers on the same id never lose an
//! update and never break the status invariants:
//!
//! - `pending`/`collecting` requests hold fewer than M distinct signatures
//! - `ready` requests hold at least M and no destination transaction
//! - `submitted`/`confirmed` requests carry their destination transaction hash
//!
//! The store also persists the watchers' scan cursors.

use bridge_common::{
    Bytes32, DomainId, MessageFields, MessageHash, MessageType, RequestId, TransferEvent,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sled::Tree;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

const REQUESTS_TREE: &str = "requests";
const CURSORS_TREE: &str = "cursors";

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage error: {0}")]
    Sled(#[from] sled::Error),

    #[error("codec error: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("request {0} not found")]
    NotFound(RequestId),

    #[error("request {id}: cannot {action} while {status}")]
    InvalidTransition {
        id: RequestId,
        status: RequestStatus,
        action: &'static str,
    },
}

// ============================================================================
// REQUEST MODEL
// ============================================================================

/// Lifecycle of a bridge request.
///
/// `pending → collecting → ready → submitted → confirmed | failed`, plus
/// `ready → failed` when the destination rejects the broadcast and the bounded
/// `failed → collecting` retry edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Pending,
    Collecting,
    Ready,
    Submitted,
    Confirmed,
    Failed,
}

impl RequestStatus {
    pub const ALL: [RequestStatus; 6] = [
        RequestStatus::Pending,
        RequestStatus::Collecting,
        RequestStatus::Ready,
        RequestStatus::Submitted,
        RequestStatus::Confirmed,
        RequestStatus::Failed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Collecting => "collecting",
            RequestStatus::Ready => "ready",
            RequestStatus::Submitted => "submitted",
            RequestStatus::Confirmed => "confirmed",
            RequestStatus::Failed => "failed",
        }
    }

    /// Whether signatures may still be merged.
    pub fn accepts_signatures(&self) -> bool {
        matches!(
            self,
            RequestStatus::Pending | RequestStatus::Collecting | RequestStatus::Ready
        )
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RequestStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RequestStatus::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown request status '{}'", s))
    }
}

/// One signer's attestation over the request's message hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignerSignature {
    pub signer_index: u32,
    /// 65-byte `r || s || v`
    #[serde(with = "hex_bytes")]
    pub signature: Vec<u8>,
}

/// A transfer tracked from source observation to destination execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgeRequest {
    pub request_id: RequestId,
    pub source_domain: DomainId,
    pub dest_domain: DomainId,
    pub source_tx_hash: String,
    pub log_index: u32,
    pub sender: Bytes32,
    pub recipient: Bytes32,
    pub token: Bytes32,
    #[serde(with = "bridge_common::api::amount_string")]
    pub amount: u128,
    pub message_type: MessageType,
    /// Source event nonce
    pub nonce: u64,
    pub status: RequestStatus,
    /// Ordered by signer index, one entry per index
    pub signatures: Vec<SignerSignature>,
    pub dest_tx_hash: Option<String>,
    /// Submission attempts that ended in `failed`
    pub attempts: u32,
    pub failure_reason: Option<String>,
    /// Retry budget spent; a failed request with this flag is terminal
    pub exhausted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl BridgeRequest {
    pub fn from_transfer(event: &TransferEvent, dest_domain: DomainId, now: DateTime<Utc>) -> Self {
        Self {
            request_id: event.request_id,
            source_domain: event.source_domain,
            dest_domain,
            source_tx_hash: event.source_tx_hash.clone(),
            log_index: event.log_index,
            sender: event.sender,
            recipient: event.recipient,
            token: event.token,
            amount: event.amount,
            message_type: event.message_type,
            nonce: event.nonce,
            status: RequestStatus::Pending,
            signatures: Vec::new(),
            dest_tx_hash: None,
            attempts: 0,
            failure_reason: None,
            exhausted: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// Number of distinct signer indices, recomputed from the signature list.
    pub fn signature_count(&self) -> usize {
        let mut indices: Vec<u32> = self.signatures.iter().map(|s| s.signer_index).collect();
        indices.sort_unstable();
        indices.dedup();
        indices.len()
    }

    pub fn has_signer(&self, signer_index: u32) -> bool {
        self.signatures.iter().any(|s| s.signer_index == signer_index)
    }

    pub fn message_fields(&self) -> MessageFields {
        MessageFields {
            request_id: self.request_id,
            source_domain: self.source_domain,
            dest_domain: self.dest_domain,
            recipient: self.recipient,
            token: self.token,
            amount: self.amount,
            message_type: self.message_type,
        }
    }

    pub fn message_hash(&self) -> MessageHash {
        self.message_fields().message_hash()
    }

    /// Confirmed, or failed with the retry budget spent.
    pub fn is_terminal(&self) -> bool {
        match self.status {
            RequestStatus::Confirmed => true,
            RequestStatus::Failed => self.exhausted,
            _ => false,
        }
    }

    pub fn age(&self, now: DateTime<Utc>) -> chrono::Duration {
        now.signed_duration_since(self.created_at)
    }

    fn invalid(&self, action: &'static str) -> StoreError {
        StoreError::InvalidTransition {
            id: self.request_id,
            status: self.status,
            action,
        }
    }
}

/// Result of [`RequestStore::create`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateOutcome {
    Created,
    AlreadyExists,
}

/// Result of [`RequestStore::merge_signatures`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeOutcome {
    /// Signer indices that were not represented before this merge
    pub added: usize,
    /// Distinct signer count after the merge
    pub count: usize,
    pub status: RequestStatus,
    /// This merge moved the request to `ready`
    pub promoted: bool,
}

/// Number of requests per status.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusCounts {
    pub pending: u64,
    pub collecting: u64,
    pub ready: u64,
    pub submitted: u64,
    pub confirmed: u64,
    pub failed: u64,
    /// Failed requests whose retry budget is spent (subset of `failed`)
    pub exhausted: u64,
}

impl StatusCounts {
    pub fn total(&self) -> u64 {
        self.pending
            .saturating_add(self.collecting)
            .saturating_add(self.ready)
            .saturating_add(self.submitted)
            .saturating_add(self.confirmed)
            .saturating_add(self.failed)
    }
}

// ============================================================================
// STORE
// ============================================================================

pub struct RequestStore {
    db: sled::Db,
    requests: Tree,
    cursors: Tree,
}

impl RequestStore {
    /// Opens (or creates) the store at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let db = sled::open(path)?;
        let requests = db.open_tree(REQUESTS_TREE)?;
        let cursors = db.open_tree(CURSORS_TREE)?;
        Ok(Self {
            db,
            requests,
            cursors,
        })
    }

    // ------------------------------------------------------------------
    // Requests
    // ------------------------------------------------------------------

    /// Inserts a new `pending` request for `event`; a no-op if the id already exists.
    pub fn create(
        &self,
        event: &TransferEvent,
        dest_domain: DomainId,
    ) -> Result<CreateOutcome, StoreError> {
        let request = BridgeRequest::from_transfer(event, dest_domain, Utc::now());
        let encoded = serde_json::to_vec(&request)?;

        match self.requests.compare_and_swap(
            request.request_id.as_bytes(),
            None as Option<&[u8]>,
            Some(encoded),
        )? {
            Ok(()) => {
                info!(
                    "Created request {} ({} {} -> {}, tx {})",
                    request.request_id,
                    request.message_type,
                    request.source_domain,
                    request.dest_domain,
                    request.source_tx_hash
                );
                Ok(CreateOutcome::Created)
            }
            Err(_) => {
                debug!("Request {} already exists, skipping", request.request_id);
                Ok(CreateOutcome::AlreadyExists)
            }
        }
    }

    pub fn get(&self, id: &RequestId) -> Result<Option<BridgeRequest>, StoreError> {
        match self.requests.get(id.as_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// `pending` and `collecting` requests below `threshold`, oldest first.
    pub fn get_actionable(&self, threshold: usize) -> Result<Vec<BridgeRequest>, StoreError> {
        let mut actionable: Vec<BridgeRequest> = self
            .scan()?
            .into_iter()
            .filter(|r| {
                matches!(r.status, RequestStatus::Pending | RequestStatus::Collecting)
                    && r.signature_count() < threshold
            })
            .collect();
        actionable.sort_by_key(|r| r.created_at);
        Ok(actionable)
    }

    /// Requests in `status`, oldest first.
    pub fn list_by_status(&self, status: RequestStatus) -> Result<Vec<BridgeRequest>, StoreError> {
        let mut matching: Vec<BridgeRequest> = self
            .scan()?
            .into_iter()
            .filter(|r| r.status == status)
            .collect();
        matching.sort_by_key(|r| r.created_at);
        Ok(matching)
    }

    pub fn status_counts(&self) -> Result<StatusCounts, StoreError> {
        let mut counts = StatusCounts::default();
        for request in self.scan()? {
            match request.status {
                RequestStatus::Pending => counts.pending += 1,
                RequestStatus::Collecting => counts.collecting += 1,
                RequestStatus::Ready => counts.ready += 1,
                RequestStatus::Submitted => counts.submitted += 1,
                RequestStatus::Confirmed => counts.confirmed += 1,
                RequestStatus::Failed => {
                    counts.failed += 1;
                    if request.exhausted {
                        counts.exhausted += 1;
                    }
                }
            }
        }
        Ok(counts)
    }

    /// Merges signatures as a union keyed by signer index.
    ///
    /// A signer already present is overwritten, never counted twice. The request
    /// becomes `ready` exactly when its distinct count reaches `threshold` and is
    /// never demoted. Accepted while `pending`, `collecting` or `ready`.
    pub fn merge_signatures(
        &self,
        id: &RequestId,
        signatures: &[SignerSignature],
        threshold: usize,
    ) -> Result<MergeOutcome, StoreError> {
        let mut outcome = None;
        self.update(id, |request| {
            if !request.status.accepts_signatures() {
                return Err(request.invalid("merge signatures"));
            }

            let mut by_index: BTreeMap<u32, Vec<u8>> = request
                .signatures
                .drain(..)
                .map(|s| (s.signer_index, s.signature))
                .collect();
            let before = by_index.len();
            for sig in signatures {
                by_index.insert(sig.signer_index, sig.signature.clone());
            }
            request.signatures = by_index
                .into_iter()
                .map(|(signer_index, signature)| SignerSignature {
                    signer_index,
                    signature,
                })
                .collect();

            let count = request.signature_count();
            let was = request.status;
            if was != RequestStatus::Ready {
                request.status = if count >= threshold {
                    RequestStatus::Ready
                } else {
                    RequestStatus::Collecting
                };
            }

            outcome = Some(MergeOutcome {
                added: count.saturating_sub(before),
                count,
                status: request.status,
                promoted: was != RequestStatus::Ready && request.status == RequestStatus::Ready,
            });
            Ok(())
        })?;

        let outcome = outcome.ok_or(StoreError::NotFound(*id))?;
        if outcome.promoted {
            info!(
                "Request {} is ready with {} signatures",
                id, outcome.count
            );
        }
        Ok(outcome)
    }

    /// `ready → submitted`, recording the destination transaction.
    pub fn mark_submitted(&self, id: &RequestId, dest_tx_hash: &str) -> Result<BridgeRequest, StoreError> {
        self.update(id, |request| match request.status {
            RequestStatus::Ready => {
                request.status = RequestStatus::Submitted;
                request.dest_tx_hash = Some(dest_tx_hash.to_string());
                Ok(())
            }
            RequestStatus::Submitted if request.dest_tx_hash.as_deref() == Some(dest_tx_hash) => {
                Ok(())
            }
            _ => Err(request.invalid("mark submitted")),
        })
    }

    /// `submitted → confirmed`.
    pub fn mark_confirmed(&self, id: &RequestId) -> Result<BridgeRequest, StoreError> {
        let request = self.update(id, |request| match request.status {
            RequestStatus::Submitted | RequestStatus::Confirmed
                if request.dest_tx_hash.is_some() =>
            {
                request.status = RequestStatus::Confirmed;
                request.failure_reason = None;
                Ok(())
            }
            _ => Err(request.invalid("mark confirmed")),
        })?;
        info!(
            "Request {} confirmed (dest tx {})",
            id,
            request.dest_tx_hash.as_deref().unwrap_or_default()
        );
        Ok(request)
    }

    /// `ready | submitted → failed`, counting one spent attempt.
    pub fn mark_failed(&self, id: &RequestId, reason: &str) -> Result<BridgeRequest, StoreError> {
        self.update(id, |request| match request.status {
            RequestStatus::Ready | RequestStatus::Submitted => {
                request.status = RequestStatus::Failed;
                request.attempts = request.attempts.saturating_add(1);
                request.failure_reason = Some(reason.to_string());
                Ok(())
            }
            _ => Err(request.invalid("mark failed")),
        })
    }

    /// `failed → collecting`. Clears signatures and the destination transaction so
    /// the request is re-attested from scratch.
    pub fn retry_failed(&self, id: &RequestId) -> Result<BridgeRequest, StoreError> {
        self.update(id, |request| {
            if request.status != RequestStatus::Failed || request.exhausted {
                return Err(request.invalid("retry"));
            }
            request.status = RequestStatus::Collecting;
            request.signatures.clear();
            request.dest_tx_hash = None;
            Ok(())
        })
    }

    /// Makes a failed request terminal.
    pub fn mark_exhausted(&self, id: &RequestId) -> Result<BridgeRequest, StoreError> {
        self.update(id, |request| {
            if request.status != RequestStatus::Failed {
                return Err(request.invalid("mark exhausted"));
            }
            request.exhausted = true;
            Ok(())
        })
    }

    /// Deletes terminal requests not updated within `retention`.
    pub fn cleanup(&self, retention: Duration) -> Result<usize, StoreError> {
        let cutoff = chrono::Duration::from_std(retention)
            .ok()
            .and_then(|window| Utc::now().checked_sub_signed(window));
        match cutoff {
            Some(cutoff) => self.cleanup_before(cutoff),
            None => Ok(0),
        }
    }

    /// Deletes terminal requests last updated before `cutoff`.
    pub fn cleanup_before(&self, cutoff: DateTime<Utc>) -> Result<usize, StoreError> {
        let mut removed = 0;
        for entry in self.requests.iter() {
            let (key, value) = entry?;
            let request: BridgeRequest = serde_json::from_slice(&value)?;
            if !request.is_terminal() || request.updated_at >= cutoff {
                continue;
            }
            // Skipped if the entry changed since it was read
            if self
                .requests
                .compare_and_swap(&key, Some(&value), None as Option<&[u8]>)?
                .is_ok()
            {
                removed += 1;
            }
        }
        if removed > 0 {
            info!("Retention cleanup removed {} request(s)", removed);
        }
        Ok(removed)
    }

    /// Message hashes of every request that is not terminal yet.
    pub fn open_message_hashes(&self) -> Result<HashSet<MessageHash>, StoreError> {
        Ok(self
            .scan()?
            .into_iter()
            .filter(|r| !r.is_terminal())
            .map(|r| r.message_hash())
            .collect())
    }

    // ------------------------------------------------------------------
    // Watcher cursors
    // ------------------------------------------------------------------

    /// Last fully scanned height of a source chain.
    pub fn get_cursor(&self, chain: &str) -> Result<Option<u64>, StoreError> {
        Ok(self.cursors.get(chain.as_bytes())?.and_then(|v| decode_height(&v)))
    }

    /// Advances a source chain cursor. Lower heights are ignored.
    pub fn set_cursor(&self, chain: &str, height: u64) -> Result<u64, StoreError> {
        let previous = self.cursors.fetch_and_update(chain.as_bytes(), |old| {
            let current = old.and_then(decode_height);
            let next = current.map_or(height, |c| c.max(height));
            Some(next.to_be_bytes().to_vec())
        })?;
        let previous = previous.and_then(|v| decode_height(&v));
        Ok(previous.map_or(height, |p| p.max(height)))
    }

    /// Flushes dirty pages to disk.
    pub fn flush(&self) -> Result<usize, StoreError> {
        Ok(self.db.flush()?)
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn scan(&self) -> Result<Vec<BridgeRequest>, StoreError> {
        let mut out = Vec::new();
        for entry in self.requests.iter() {
            let (_key, value) = entry?;
            out.push(serde_json::from_slice(&value)?);
        }
        Ok(out)
    }

    /// Read-modify-write of one request under compare-and-swap.
    fn update<F>(&self, id: &RequestId, mut apply: F) -> Result<BridgeRequest, StoreError>
    where
        F: FnMut(&mut BridgeRequest) -> Result<(), StoreError>,
    {
        loop {
            let current = self
                .requests
                .get(id.as_bytes())?
                .ok_or(StoreError::NotFound(*id))?;
            let mut request: BridgeRequest = serde_json::from_slice(&current)?;
            apply(&mut request)?;
            request.updated_at = Utc::now();
            let encoded = serde_json::to_vec(&request)?;

            match self
                .requests
                .compare_and_swap(id.as_bytes(), Some(&current), Some(encoded))?
            {
                Ok(()) => return Ok(request),
                Err(_) => debug!("Concurrent update of request {}, retrying", id),
            }
        }
    }
}

fn decode_height(bytes: &[u8]) -> Option<u64> {
    let raw: [u8; 8] = bytes.try_into().ok()?;
    Some(u64::from_be_bytes(raw))
}

/// Serializes byte vectors as `0x`-prefixed hex.
mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&bridge_common::encoding::encode_hex(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        bridge_common::encoding::decode_hex(&s).map_err(serde::de::Error::custom)
    }
}

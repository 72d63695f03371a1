//! Retry / Cooldown Tracker
//!
//! In-memory relay bookkeeping per message hash. Guarantees at most one
//! in-flight submission per message and spaces out retries of failed ones.
//! The persisted `attempts` counter on each request remains the authority for
//! the retry budget across restarts.
//!
//! Confirmed messages are not kept: once the store records `confirmed` the
//! request is never `ready` again, so the entry is dropped. Entries of requests
//! that became terminal otherwise are dropped by [`RetryTracker::prune`].

use bridge_common::MessageHash;
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayStatus {
    Relaying,
    Failed,
}

#[derive(Debug, Clone, Copy)]
struct RelayEntry {
    status: RelayStatus,
    attempts: u32,
    last_attempt: Instant,
}

pub struct RetryTracker {
    entries: RwLock<HashMap<MessageHash, RelayEntry>>,
    max_retries: u32,
    cooldown: Duration,
}

impl RetryTracker {
    pub fn new(max_retries: u32, cooldown: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            max_retries,
            cooldown,
        }
    }

    fn permits(&self, entry: Option<&RelayEntry>) -> bool {
        match entry {
            None => true,
            Some(entry) => {
                entry.status == RelayStatus::Failed
                    && entry.attempts < self.max_retries
                    && entry.last_attempt.elapsed() >= self.cooldown
            }
        }
    }

    /// Untracked, or failed with budget left and the cooldown elapsed.
    pub async fn can_retry(&self, hash: &MessageHash) -> bool {
        let entries = self.entries.read().await;
        self.permits(entries.get(hash))
    }

    /// Atomically checks [`can_retry`](Self::can_retry) and marks the hash `relaying`.
    ///
    /// Returns `false` when another attempt is in flight, already succeeded,
    /// or is still cooling down.
    pub async fn try_begin(&self, hash: &MessageHash) -> bool {
        let mut entries = self.entries.write().await;
        if !self.permits(entries.get(hash)) {
            debug!("Relay of {} not permitted now", hash);
            return false;
        }
        let attempts = entries.get(hash).map_or(0, |e| e.attempts);
        entries.insert(
            *hash,
            RelayEntry {
                status: RelayStatus::Relaying,
                attempts,
                last_attempt: Instant::now(),
            },
        );
        true
    }

    /// Forgets a message whose execution is confirmed.
    pub async fn mark_success(&self, hash: &MessageHash) {
        self.entries.write().await.remove(hash);
    }

    /// Records a failed attempt and starts its cooldown.
    pub async fn mark_failed(&self, hash: &MessageHash) {
        let mut entries = self.entries.write().await;
        let attempts = entries.get(hash).map_or(0, |e| e.attempts);
        entries.insert(
            *hash,
            RelayEntry {
                status: RelayStatus::Failed,
                attempts: attempts.saturating_add(1),
                last_attempt: Instant::now(),
            },
        );
    }

    /// Ends a `relaying` attempt that never reached the destination, without
    /// spending budget.
    pub async fn release(&self, hash: &MessageHash) {
        let mut entries = self.entries.write().await;
        match entries.get(hash).copied() {
            Some(entry) if entry.status == RelayStatus::Relaying => {
                if entry.attempts == 0 {
                    entries.remove(hash);
                } else {
                    entries.insert(
                        *hash,
                        RelayEntry {
                            status: RelayStatus::Failed,
                            ..entry
                        },
                    );
                }
            }
            _ => {}
        }
    }

    /// Drops entries of messages outside `open`, keeping in-flight attempts.
    ///
    /// Returns the number of entries removed.
    pub async fn prune(&self, open: &HashSet<MessageHash>) -> usize {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|hash, entry| entry.status == RelayStatus::Relaying || open.contains(hash));
        let removed = before - entries.len();
        if removed > 0 {
            debug!("Pruned {} relay entries", removed);
        }
        removed
    }

    /// Number of tracked messages.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    pub async fn status(&self, hash: &MessageHash) -> Option<(RelayStatus, u32)> {
        let entries = self.entries.read().await;
        entries.get(hash).map(|e| (e.status, e.attempts))
    }
}

//! Tests for signature collection and destination submission
//!
//! Signer nodes and the destination chain are wiremock servers. Each test
//! drives aggregator passes directly instead of the timed loop.

use bridge_common::MessageType;
use bridge_relayer::{RelayStatus, RequestStatus, RetryTracker};
use std::sync::Arc;
use std::time::Duration;
use wiremock::MockServer;

#[path = "helpers.rs"]
mod test_helpers;
use test_helpers::*;

// ============================================================================
// COLLECTION
// ============================================================================

/// 1. Test: Five of nine signers are enough to reach ready
/// What is tested: signers 0, 2, 4, 5, 7 attest, the rest refuse
/// Why: The threshold is M distinct valid attestations, whoever provides them.
#[tokio::test]
async fn test_collection_reaches_threshold_with_subset() {
    let servers = start_signers(TOTAL_SIGNERS).await;
    let (_dir, store) = open_temp_store();
    let transfer = sample_transfer(0x22, ONE_TOKEN, MessageType::Mint);
    store.create(&transfer, DEST_DOMAIN).unwrap();
    let hash = store.get(&transfer.request_id).unwrap().unwrap().message_hash();

    let signing = [0u32, 2, 4, 5, 7];
    for (index, server) in servers.iter().enumerate() {
        let index = index as u32;
        if signing.contains(&index) {
            mount_signing_signer(server, index, &hash).await;
        } else {
            mount_refusing_signer(server).await;
        }
    }

    let relayer = build_relayer_config();
    let aggregator = build_aggregator(
        store.clone(),
        signer_clients(&servers, relayer.signer_timeout()),
        vec![],
        &relayer,
    );
    let report = aggregator.collect_signatures().await.unwrap();

    assert_eq!(report.signatures_merged, 5);
    assert_eq!(report.promoted, 1);
    let request = store.get(&transfer.request_id).unwrap().unwrap();
    assert_eq!(request.status, RequestStatus::Ready);
    let indices: Vec<u32> = request.signatures.iter().map(|s| s.signer_index).collect();
    assert_eq!(indices, signing.to_vec());
}

/// 2. Test: Below threshold the request stays collecting and signers are asked again
/// Why: Refusals are not penalized; the next cycle retries them.
#[tokio::test]
async fn test_collection_below_threshold_retries_next_cycle() {
    let servers = start_signers(TOTAL_SIGNERS).await;
    let (_dir, store) = open_temp_store();
    let transfer = sample_transfer(0x22, ONE_TOKEN, MessageType::Mint);
    store.create(&transfer, DEST_DOMAIN).unwrap();
    let hash = store.get(&transfer.request_id).unwrap().unwrap().message_hash();

    for (index, server) in servers.iter().enumerate() {
        if index < 3 {
            mount_signing_signer(server, index as u32, &hash).await;
        } else {
            mount_refusing_signer(server).await;
        }
    }

    let relayer = build_relayer_config();
    let aggregator = build_aggregator(
        store.clone(),
        signer_clients(&servers, relayer.signer_timeout()),
        vec![],
        &relayer,
    );
    aggregator.collect_signatures().await.unwrap();
    aggregator.collect_signatures().await.unwrap();

    let request = store.get(&transfer.request_id).unwrap().unwrap();
    assert_eq!(request.status, RequestStatus::Collecting);
    assert_eq!(request.signature_count(), 3);

    // Signers already represented are not asked twice
    assert_eq!(sign_calls(&servers[0]).await, 1);
    assert_eq!(sign_calls(&servers[8]).await, 2);
}

/// 3. Test: An attestation that does not recover to the signer's key is discarded
/// Why: A compromised or misconfigured node must not count toward M, however
/// often it answers.
#[tokio::test]
async fn test_invalid_attestation_contributes_nothing() {
    let servers = start_signers(TOTAL_SIGNERS).await;
    let (_dir, store) = open_temp_store();
    let transfer = sample_transfer(0x22, ONE_TOKEN, MessageType::Mint);
    store.create(&transfer, DEST_DOMAIN).unwrap();
    let hash = store.get(&transfer.request_id).unwrap().unwrap().message_hash();

    for (index, server) in servers.iter().enumerate() {
        let index = index as u32;
        match index {
            0..=3 => mount_signing_signer(server, index, &hash).await,
            // Signer 4 answers with signer 8's key
            4 => mount_forging_signer(server, 4, 8, &hash).await,
            _ => mount_refusing_signer(server).await,
        }
    }

    let relayer = build_relayer_config();
    let aggregator = build_aggregator(
        store.clone(),
        signer_clients(&servers, relayer.signer_timeout()),
        vec![],
        &relayer,
    );
    for _ in 0..3 {
        aggregator.collect_signatures().await.unwrap();
    }

    let request = store.get(&transfer.request_id).unwrap().unwrap();
    assert_eq!(request.status, RequestStatus::Collecting);
    assert_eq!(request.signature_count(), 4);
    assert!(!request.has_signer(4));
    assert_eq!(sign_calls(&servers[4]).await, 3);
}

/// 4. Test: A signer timing out for three cycles does not block the request
/// What is tested: signer 3 always answers too late; signers 0-2 answer, and
/// signers 4 and 5 come online in the fourth cycle. Collection passes only
/// visit pending and collecting requests, so an attestation that shows up after
/// promotion reaches the store through a direct merge, which must not demote.
/// Why: The aggregator proceeds with whoever answers in time.
#[tokio::test]
async fn test_slow_signer_skipped_and_late_signature_accepted() {
    let servers = start_signers(TOTAL_SIGNERS).await;
    let (_dir, store) = open_temp_store();
    let transfer = sample_transfer(0x22, ONE_TOKEN, MessageType::Mint);
    store.create(&transfer, DEST_DOMAIN).unwrap();
    let hash = store.get(&transfer.request_id).unwrap().unwrap().message_hash();

    for index in 0..3u32 {
        mount_signing_signer(&servers[index as usize], index, &hash).await;
    }
    mount_slow_signer(&servers[3], 3, &hash, Duration::from_secs(3)).await;

    let mut relayer = build_relayer_config();
    relayer.signer_timeout_ms = 200;
    let aggregator = build_aggregator(
        store.clone(),
        signer_clients(&servers, relayer.signer_timeout()),
        vec![],
        &relayer,
    );

    for _ in 0..3 {
        aggregator.collect_signatures().await.unwrap();
        let request = store.get(&transfer.request_id).unwrap().unwrap();
        assert_eq!(request.status, RequestStatus::Collecting);
        assert!(!request.has_signer(3));
    }

    mount_signing_signer(&servers[4], 4, &hash).await;
    mount_signing_signer(&servers[5], 5, &hash).await;
    let report = aggregator.collect_signatures().await.unwrap();
    assert_eq!(report.promoted, 1);

    let request = store.get(&transfer.request_id).unwrap().unwrap();
    assert_eq!(request.status, RequestStatus::Ready);
    assert!(!request.has_signer(3));

    // Signer 3's answer finally arrives, outside any collection pass
    let late = store
        .merge_signatures(&transfer.request_id, &signatures_from(&[3], &hash), THRESHOLD)
        .unwrap();
    assert_eq!(late.status, RequestStatus::Ready);
    assert_eq!(late.count, 6);
}

// ============================================================================
// SUBMISSION
// ============================================================================

/// 5. Test: Full relay of an unlock from domain 1 to domain 100
/// What is tested: one cycle collects 5 of 9 signatures, submits unlockTokens,
/// and confirms on a successful receipt
/// Why: This is the end-to-end happy path of a transfer.
#[tokio::test]
async fn test_cycle_relays_unlock_end_to_end() {
    let servers = start_signers(TOTAL_SIGNERS).await;
    let destination = MockServer::start().await;
    mount_destination(&destination, "0x1", 1).await;
    let (_dir, store) = open_temp_store();
    let transfer = sample_transfer(0x22, ONE_TOKEN, MessageType::Unlock);
    store.create(&transfer, DEST_DOMAIN).unwrap();
    let hash = store.get(&transfer.request_id).unwrap().unwrap().message_hash();

    for (index, server) in servers.iter().enumerate() {
        if index < THRESHOLD {
            mount_signing_signer(server, index as u32, &hash).await;
        } else {
            mount_refusing_signer(server).await;
        }
    }

    let relayer = build_relayer_config();
    let aggregator = build_aggregator(
        store.clone(),
        signer_clients(&servers, relayer.signer_timeout()),
        vec![build_submitter(&destination.uri(), &relayer)],
        &relayer,
    );
    let report = aggregator.run_cycle().await.unwrap();

    assert_eq!(report.promoted, 1);
    assert_eq!(report.submitted, 1);
    assert_eq!(report.confirmed, 1);

    let request = store.get(&transfer.request_id).unwrap().unwrap();
    assert_eq!(request.status, RequestStatus::Confirmed);
    assert_eq!(request.dest_tx_hash.as_deref(), Some(DUMMY_DEST_TX));
    assert_eq!(request.amount, ONE_TOKEN);
    assert_eq!(request.source_domain, SOURCE_DOMAIN);
    assert_eq!(request.dest_domain, DEST_DOMAIN);
}

/// 6. Test: Two concurrent submission passes broadcast once
/// Why: A second transaction for the same request would only revert and burn gas.
#[tokio::test]
async fn test_concurrent_submission_broadcasts_once() {
    let destination = MockServer::start().await;
    mount_destination(&destination, "0x1", 1).await;
    let (_dir, store) = open_temp_store();
    let transfer = sample_transfer(0x22, ONE_TOKEN, MessageType::Mint);
    insert_ready(&store, &transfer, &[0, 1, 2, 3, 4]);

    let relayer = build_relayer_config();
    let aggregator = build_aggregator(
        store.clone(),
        vec![],
        vec![build_submitter(&destination.uri(), &relayer)],
        &relayer,
    );

    let (first, second) = tokio::join!(aggregator.submit_ready(), aggregator.submit_ready());
    let submitted = first.unwrap().submitted + second.unwrap().submitted;
    assert_eq!(submitted, 1);

    let request = store.get(&transfer.request_id).unwrap().unwrap();
    assert_eq!(request.status, RequestStatus::Confirmed);
}

/// 7. Test: An already executed request is confirmed without a new broadcast
/// Why: After a crash between broadcast and bookkeeping the destination is the
/// source of truth.
#[tokio::test]
async fn test_executed_request_is_recorded_not_resubmitted() {
    let destination = MockServer::start().await;
    let (_dir, store) = open_temp_store();
    let transfer = sample_transfer(0x22, ONE_TOKEN, MessageType::Mint);
    insert_ready(&store, &transfer, &[0, 1, 2, 3, 4]);
    mount_executed_destination(&destination, &transfer.request_id).await;

    let relayer = build_relayer_config();
    let aggregator = build_aggregator(
        store.clone(),
        vec![],
        vec![build_submitter(&destination.uri(), &relayer)],
        &relayer,
    );
    let report = aggregator.submit_ready().await.unwrap();

    assert_eq!(report.submitted, 0);
    assert_eq!(report.confirmed, 1);
    let request = store.get(&transfer.request_id).unwrap().unwrap();
    assert_eq!(request.status, RequestStatus::Confirmed);
    assert_eq!(request.dest_tx_hash.as_deref(), Some(DUMMY_DEST_TX));
}

/// 8. Test: A reverted execution fails the request and counts one attempt
#[tokio::test]
async fn test_reverted_execution_marks_failed() {
    let destination = MockServer::start().await;
    mount_destination(&destination, "0x0", 1).await;
    let (_dir, store) = open_temp_store();
    let transfer = sample_transfer(0x22, ONE_TOKEN, MessageType::Mint);
    insert_ready(&store, &transfer, &[0, 1, 2, 3, 4]);

    let relayer = build_relayer_config();
    let aggregator = build_aggregator(
        store.clone(),
        vec![],
        vec![build_submitter(&destination.uri(), &relayer)],
        &relayer,
    );
    let report = aggregator.submit_ready().await.unwrap();

    assert_eq!(report.submitted, 1);
    assert_eq!(report.failed, 1);
    let request = store.get(&transfer.request_id).unwrap().unwrap();
    assert_eq!(request.status, RequestStatus::Failed);
    assert_eq!(request.attempts, 1);
    assert_eq!(request.dest_tx_hash.as_deref(), Some(DUMMY_DEST_TX));
    assert!(request.failure_reason.unwrap().contains("reverted"));
}

// ============================================================================
// RETRY AND RECONCILIATION
// ============================================================================

/// 9. Test: A failed request with budget left returns to collection
#[tokio::test]
async fn test_failed_request_is_retried() {
    let (_dir, store) = open_temp_store();
    let transfer = sample_transfer(0x22, ONE_TOKEN, MessageType::Mint);
    insert_ready(&store, &transfer, &[0, 1, 2, 3, 4]);
    store.mark_failed(&transfer.request_id, "rejected").unwrap();

    let relayer = build_relayer_config();
    let aggregator = build_aggregator(store.clone(), vec![], vec![], &relayer);
    let report = aggregator.retry_failed().await.unwrap();

    assert_eq!(report.retried, 1);
    let request = store.get(&transfer.request_id).unwrap().unwrap();
    assert_eq!(request.status, RequestStatus::Collecting);
    assert!(request.signatures.is_empty());
}

/// 10. Test: Retry budget exhaustion makes the request terminal
/// Why: A request that keeps failing needs an operator, not more gas.
#[tokio::test]
async fn test_retry_budget_exhaustion() {
    let destination = MockServer::start().await;
    mount_destination(&destination, "0x0", 1).await;
    let (_dir, store) = open_temp_store();
    let transfer = sample_transfer(0x22, ONE_TOKEN, MessageType::Mint);
    insert_ready(&store, &transfer, &[0, 1, 2, 3, 4]);

    let mut relayer = build_relayer_config();
    relayer.max_retries = 1;
    let aggregator = build_aggregator(
        store.clone(),
        vec![],
        vec![build_submitter(&destination.uri(), &relayer)],
        &relayer,
    );
    aggregator.submit_ready().await.unwrap();
    let report = aggregator.retry_failed().await.unwrap();

    assert_eq!(report.exhausted, 1);
    assert_eq!(report.retried, 0);
    let request = store.get(&transfer.request_id).unwrap().unwrap();
    assert_eq!(request.status, RequestStatus::Failed);
    assert!(request.exhausted);
    assert!(request.is_terminal());

    // Nothing more happens to it
    let again = aggregator.retry_failed().await.unwrap();
    assert_eq!(again.exhausted, 0);
}

/// 11. Test: Submitted requests are confirmed from a later receipt
/// Why: The receipt may arrive after the submission pass stopped polling.
#[tokio::test]
async fn test_reconcile_confirms_submitted() {
    let destination = MockServer::start().await;
    mount_rpc(
        &destination,
        "eth_getTransactionReceipt",
        receipt(DUMMY_DEST_TX, "0x1"),
    )
    .await;
    let (_dir, store) = open_temp_store();
    let transfer = sample_transfer(0x22, ONE_TOKEN, MessageType::Mint);
    insert_ready(&store, &transfer, &[0, 1, 2, 3, 4]);
    store.mark_submitted(&transfer.request_id, DUMMY_DEST_TX).unwrap();

    let relayer = build_relayer_config();
    let aggregator = build_aggregator(
        store.clone(),
        vec![],
        vec![build_submitter(&destination.uri(), &relayer)],
        &relayer,
    );
    let report = aggregator.reconcile_submitted().await.unwrap();

    assert_eq!(report.confirmed, 1);
    let request = store.get(&transfer.request_id).unwrap().unwrap();
    assert_eq!(request.status, RequestStatus::Confirmed);
}

// ============================================================================
// DESTINATION ACCOUNT
// ============================================================================

fn statuses(store: &bridge_relayer::RequestStore, ids: &[bridge_common::RequestId]) -> Vec<RequestStatus> {
    let mut out: Vec<RequestStatus> = ids
        .iter()
        .map(|id| store.get(id).unwrap().unwrap().status)
        .collect();
    out.sort_by_key(|s| s.as_str());
    out
}

/// 12. Test: One unresolved transaction per destination account
/// What is tested: with two ready requests and a receipt that never shows up,
/// only the first is broadcast; later cycles hold the second until
/// reconciliation settles the first
/// Why: A second transaction from the same account while the first is pending
/// races its nonce.
#[tokio::test]
async fn test_pending_receipt_holds_destination_lane() {
    let destination = MockServer::start().await;
    mount_pending_destination(&destination, 1, Duration::ZERO).await;
    let (_dir, store) = open_temp_store();
    let first = sample_transfer(0x22, ONE_TOKEN, MessageType::Mint);
    let second = sample_transfer(0x23, 2 * ONE_TOKEN, MessageType::Mint);
    insert_ready(&store, &first, &[0, 1, 2, 3, 4]);
    insert_ready(&store, &second, &[0, 1, 2, 3, 4]);
    let ids = [first.request_id, second.request_id];

    let relayer = build_relayer_config();
    let aggregator = build_aggregator(
        store.clone(),
        vec![],
        vec![build_submitter(&destination.uri(), &relayer)],
        &relayer,
    );

    let report = aggregator.submit_ready().await.unwrap();
    assert_eq!(report.submitted, 1);
    assert_eq!(statuses(&store, &ids), vec![RequestStatus::Ready, RequestStatus::Submitted]);

    // Receipt still missing: nothing new goes out
    let report = aggregator.run_cycle().await.unwrap();
    assert_eq!(report.submitted, 0);
    assert_eq!(statuses(&store, &ids), vec![RequestStatus::Ready, RequestStatus::Submitted]);
    destination.verify().await;

    // The first transaction lands; the held request follows in the same cycle
    destination.reset().await;
    mount_destination(&destination, "0x1", 1).await;
    let report = aggregator.run_cycle().await.unwrap();
    assert_eq!(report.submitted, 1);
    assert_eq!(report.confirmed, 2);
    assert_eq!(statuses(&store, &ids), vec![RequestStatus::Confirmed, RequestStatus::Confirmed]);
}

/// 13. Test: A broadcast that cannot be recorded does not wedge the request
/// What is tested: the request changes while its transaction is in flight, so
/// recording the submission fails; the relay slot is released
/// Why: A slot left in `relaying` would block the message until restart.
#[tokio::test]
async fn test_unrecorded_broadcast_releases_relay_slot() {
    let destination = MockServer::start().await;
    mount_pending_destination(&destination, 1, Duration::from_millis(600)).await;
    let (_dir, store) = open_temp_store();
    let transfer = sample_transfer(0x22, ONE_TOKEN, MessageType::Mint);
    let request = insert_ready(&store, &transfer, &[0, 1, 2, 3, 4]);

    let relayer = build_relayer_config();
    let tracker = Arc::new(RetryTracker::new(relayer.max_retries, relayer.retry_cooldown()));
    let aggregator = build_aggregator_with_tracker(
        store.clone(),
        vec![],
        vec![build_submitter(&destination.uri(), &relayer)],
        tracker.clone(),
        &relayer,
    );

    let interfere = async {
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(
            tracker.status(&request.message_hash()).await,
            Some((RelayStatus::Relaying, 0))
        );
        store.mark_failed(&transfer.request_id, "operator abort").unwrap();
    };
    let (report, _) = tokio::join!(aggregator.submit_ready(), interfere);

    assert_eq!(report.unwrap().submitted, 0);
    assert_eq!(tracker.status(&request.message_hash()).await, None);
    assert!(tracker.try_begin(&request.message_hash()).await);
    let stored = store.get(&transfer.request_id).unwrap().unwrap();
    assert_eq!(stored.status, RequestStatus::Failed);
    assert_eq!(stored.dest_tx_hash, None);
}

//! Unit tests for the SVM chain client and bridge program log decoding

use base64::{engine::general_purpose::STANDARD, Engine as _};
use bridge_common::EventKind;
use chain_clients_svm::events::event_discriminator;
use chain_clients_common::RpcError;
use chain_clients_svm::{
    decode_program_logs, encode_program_data, SvmClient, TokensEventData, MAX_SIGNATURE_PAGES,
};
use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{body_partial_json, method};
use wiremock::{Mock, MockServer, ResponseTemplate};

const DUMMY_PROGRAM_ID: &str = "BridgeProgram1111111111111111111111111111111";
const OTHER_PROGRAM_ID: &str = "TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA";

// ============================================================================
// HELPER FUNCTIONS
// ============================================================================

fn dummy_signature(n: u8) -> String {
    bs58::encode([n; 64]).into_string()
}

fn event_data() -> TokensEventData {
    TokensEventData {
        request_id: [9; 32],
        sender: [1; 32],
        token_mint: [2; 32],
        amount: 750_000,
        destination_address: [3; 32],
        destination_domain: 100,
        nonce: 12,
    }
}

fn bridge_logs() -> Vec<String> {
    vec![
        format!("Program {} invoke [1]", DUMMY_PROGRAM_ID),
        "Program log: Instruction: LockTokens".to_string(),
        format!("Program {} invoke [2]", OTHER_PROGRAM_ID),
        // Emitted by the inner program: must be ignored
        encode_program_data(EventKind::Locked, &event_data()).unwrap(),
        format!("Program {} success", OTHER_PROGRAM_ID),
        encode_program_data(EventKind::Locked, &event_data()).unwrap(),
        format!("Program {} consumed 5000 of 200000 compute units", DUMMY_PROGRAM_ID),
        format!("Program {} success", DUMMY_PROGRAM_ID),
    ]
}

// ============================================================================
// CLIENT INITIALIZATION
// ============================================================================

/// 1. Test: Program id validation
/// Why: A typo in the program id would silently watch nothing.
#[test]
fn test_client_new_rejects_invalid_program_id() {
    assert!(SvmClient::new("http://127.0.0.1:8899", "not-base58-0OIl", Duration::from_secs(1)).is_err());
    assert!(SvmClient::new("http://127.0.0.1:8899", DUMMY_PROGRAM_ID, Duration::from_secs(1)).is_ok());
}

// ============================================================================
// SLOT RANGE SCANNING
// ============================================================================

/// 2. Test: Signatures are filtered to the requested slot range, oldest first
/// Verifies that entries outside (from, to] are dropped and ordering is ascending.
/// Why: The watcher cursor advances by slot; out-of-range entries would be
/// reprocessed or skipped.
#[tokio::test]
async fn test_signatures_in_slot_range() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({"method": "getSignaturesForAddress"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jsonrpc": "2.0",
            "result": [
                {"signature": dummy_signature(4), "slot": 130, "err": null},
                {"signature": dummy_signature(3), "slot": 120, "err": null},
                {"signature": dummy_signature(2), "slot": 110, "err": {"InstructionError": [0, "Custom"]}},
                {"signature": dummy_signature(1), "slot": 100, "err": null}
            ],
            "id": 1
        })))
        .mount(&mock_server)
        .await;

    let client = SvmClient::new(&mock_server.uri(), DUMMY_PROGRAM_ID, Duration::from_secs(5)).unwrap();
    let sigs = client.signatures_in_slot_range(100, 120, 1000).await.unwrap();

    let slots: Vec<u64> = sigs.iter().map(|s| s.slot).collect();
    assert_eq!(slots, vec![110, 120]);
    assert!(sigs[0].err.is_some());
}

/// 3. Test: Transaction status and logs
/// Why: Only succeeded transactions may produce requests.
#[tokio::test]
async fn test_get_transaction_failed_status() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({"method": "getTransaction"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jsonrpc": "2.0",
            "result": {
                "slot": 120,
                "meta": {
                    "err": {"InstructionError": [0, {"Custom": 1}]},
                    "logMessages": bridge_logs()
                }
            },
            "id": 1
        })))
        .mount(&mock_server)
        .await;

    let client = SvmClient::new(&mock_server.uri(), DUMMY_PROGRAM_ID, Duration::from_secs(5)).unwrap();
    let tx = client.get_transaction(&dummy_signature(3)).await.unwrap().unwrap();
    assert!(!tx.succeeded());
    assert_eq!(tx.log_messages().len(), bridge_logs().len());
}

// ============================================================================
// LOG DECODING
// ============================================================================

/// 4. Test: Only events emitted by the bridge program are decoded
/// Verifies that program data from a nested program invocation is ignored and
/// the bridge event is decoded with log index 0.
/// Why: Any program can write `Program data:` lines; attributing them to the
/// bridge would let a third-party program forge lock events.
#[test]
fn test_decode_program_logs_attribution() {
    let sig = dummy_signature(3);
    let events = decode_program_logs(&bridge_logs(), DUMMY_PROGRAM_ID, 7, 120, &sig).unwrap();

    assert_eq!(events.len(), 1);
    let event = &events[0];
    assert_eq!(event.kind, EventKind::Locked);
    assert_eq!(event.log_index, 0);
    assert_eq!(event.amount, 750_000);
    assert_eq!(event.destination_domain, 100);
    assert_eq!(event.source_domain, 7);
    assert_eq!(event.signature, sig);
}

/// 5. Test: Truncated payload with a bridge discriminator is an error
#[test]
fn test_decode_program_logs_truncated() {
    let mut payload = event_discriminator(EventKind::Burned).to_vec();
    payload.extend_from_slice(&[0u8; 10]);
    let logs = vec![
        format!("Program {} invoke [1]", DUMMY_PROGRAM_ID),
        format!("Program data: {}", STANDARD.encode(payload)),
        format!("Program {} success", DUMMY_PROGRAM_ID),
    ];
    assert!(decode_program_logs(&logs, DUMMY_PROGRAM_ID, 7, 1, &dummy_signature(1)).is_err());
}

// ============================================================================
// PAGING
// ============================================================================

fn signature_page(entries: &[(u8, u64)]) -> ResponseTemplate {
    let result: Vec<serde_json::Value> = entries
        .iter()
        .map(|(n, slot)| json!({"signature": dummy_signature(*n), "slot": slot, "err": null}))
        .collect();
    ResponseTemplate::new(200).set_body_json(json!({"jsonrpc": "2.0", "result": result, "id": 1}))
}

/// 6. Test: Older pages are fetched until the range start is reached
/// What is tested: the `before` cursor follows the last signature of each full page
#[tokio::test]
async fn test_signatures_in_slot_range_follows_pages() {
    let mock_server = MockServer::start().await;
    // Mounted first so it wins over the first-page mock below
    Mock::given(method("POST"))
        .and(body_partial_json(json!({
            "method": "getSignaturesForAddress",
            "params": [DUMMY_PROGRAM_ID, {"before": dummy_signature(4)}]
        })))
        .respond_with(signature_page(&[(3, 200), (2, 90)]))
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({"method": "getSignaturesForAddress"})))
        .respond_with(signature_page(&[(5, 300), (4, 250)]))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = SvmClient::new(&mock_server.uri(), DUMMY_PROGRAM_ID, Duration::from_secs(5)).unwrap();
    let sigs = client.signatures_in_slot_range(100, 260, 2).await.unwrap();

    let slots: Vec<u64> = sigs.iter().map(|s| s.slot).collect();
    assert_eq!(slots, vec![200, 250]);
    assert_eq!(sigs[0].signature, dummy_signature(3));
}

/// 7. Test: Running out of pages before the range start is an error
/// Why: Returning the partial list would let the watcher advance its cursor
/// over slots it never looked at.
#[tokio::test]
async fn test_signatures_in_slot_range_page_cap_is_error() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({"method": "getSignaturesForAddress"})))
        .respond_with(signature_page(&[(9, 900), (8, 800)]))
        .mount(&mock_server)
        .await;

    let client = SvmClient::new(&mock_server.uri(), DUMMY_PROGRAM_ID, Duration::from_secs(5)).unwrap();
    let err = client.signatures_in_slot_range(10, 500, 2).await.unwrap_err();

    assert!(matches!(err, RpcError::Incomplete { .. }));
    assert!(!err.is_transport());
    let requests = mock_server.received_requests().await.unwrap();
    assert_eq!(requests.len(), MAX_SIGNATURE_PAGES);
}

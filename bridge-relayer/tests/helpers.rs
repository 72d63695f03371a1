//! Shared test helpers for the relayer
//!
//! Deterministic signer keys, wiremock signer nodes and chain RPC mocks, temp
//! stores, and configuration builders.

#![allow(dead_code)]

use bridge_common::crypto::public_key_hex;
use bridge_common::encoding::{decode_hex, derive_request_id, encode_hex, eth_signed_message_digest};
use bridge_common::{
    Bytes32, ChainFamily, ErrorResponse, EventKind, MessageHash, MessageType, SignResponse,
    TransferEvent,
};
use bridge_relayer::config::{ApiConfig, ChainConfig, Config, RelayerConfig, SignerConfig};
use bridge_relayer::{
    Aggregator, BridgeRequest, CryptoService, EvmSubmitter, RequestStore, RetryTracker,
    SignerClient, SignerSignature,
};
use chain_clients_evm::abi::event_topic;
use chain_clients_evm::events::{
    bridge_event_topic, encode_bridge_event_data, REQUEST_EXECUTED_SIGNATURE,
};
use k256::ecdsa::SigningKey;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

// ============================================================================
// CONSTANTS
// ============================================================================

pub const DUMMY_RELAYER_KEY: &str =
    "0x59c6995e998f97a5a0044966f0945389dc9e86dae88c7a8412f4603b6b78690d";
pub const DUMMY_AUTH_TOKEN: &str = "test-shared-secret";
pub const DUMMY_SOURCE_BRIDGE: &str = "0x5fbdb2315678afecb367f032d93f642f64180aa3";
pub const DUMMY_DEST_BRIDGE: &str = "0xe7f1725e7734ce288f8367e1bb143e90bb3f0512";
pub const DUMMY_OTHER_ADDR: &str = "0x9999999999999999999999999999999999999999";
pub const DUMMY_SOURCE_TX: &str =
    "0x2222222222222222222222222222222222222222222222222222222222222222";
pub const DUMMY_DEST_TX: &str =
    "0x4444444444444444444444444444444444444444444444444444444444444444";
pub const DUMMY_EVENT_REQUEST_ID: &str =
    "0x0101010101010101010101010101010101010101010101010101010101010101";
pub const DUMMY_SENDER_TOPIC: &str =
    "0x000000000000000000000000cccccccccccccccccccccccccccccccccccccccc";

pub const SOURCE_CHAIN: &str = "ethereum";
pub const DEST_CHAIN: &str = "bridge-l2";
pub const SOURCE_DOMAIN: u32 = 1;
pub const DEST_DOMAIN: u32 = 100;
pub const DEST_CHAIN_ID: u64 = 31337;
pub const TOTAL_SIGNERS: usize = 9;
pub const THRESHOLD: usize = 5;
pub const ONE_TOKEN: u128 = 1_000_000_000_000_000_000;
pub const LOG_INDEX: u32 = 3;
pub const TX_BLOCK: u64 = 100;

pub const DUMMY_TOKEN: [u8; 20] = [0xbb; 20];

pub fn dummy_recipient() -> Bytes32 {
    Bytes32([0xaa; 32])
}

// ============================================================================
// SIGNER KEYS
// ============================================================================

/// Deterministic key of signer `index`.
pub fn signer_key(index: u32) -> SigningKey {
    SigningKey::from_slice(&[index as u8 + 1; 32]).unwrap()
}

pub fn signer_public_key(index: u32) -> String {
    public_key_hex(signer_key(index).verifying_key())
}

/// 65-byte `r || s || v` attestation of `index` over `hash`.
pub fn attest(index: u32, hash: &MessageHash) -> Vec<u8> {
    let digest = eth_signed_message_digest(hash);
    let (signature, recovery_id) = signer_key(index)
        .sign_prehash_recoverable(&digest)
        .unwrap();
    let mut out = signature.to_bytes().to_vec();
    out.push(recovery_id.to_byte() + 27);
    out
}

pub fn signatures_from(indices: &[u32], hash: &MessageHash) -> Vec<SignerSignature> {
    indices
        .iter()
        .map(|i| SignerSignature {
            signer_index: *i,
            signature: attest(*i, hash),
        })
        .collect()
}

// ============================================================================
// REQUESTS AND STORE
// ============================================================================

/// Transfer observed in source transaction `0x<tx_byte * 32>`.
pub fn sample_transfer(tx_byte: u8, amount: u128, message_type: MessageType) -> TransferEvent {
    let tx_hash = format!("0x{}", hex::encode([tx_byte; 32]));
    let tx_bytes = decode_hex(&tx_hash).unwrap();
    TransferEvent {
        request_id: derive_request_id(SOURCE_DOMAIN, &tx_bytes, LOG_INDEX),
        source_domain: SOURCE_DOMAIN,
        dest_domain: DEST_DOMAIN,
        source_tx_hash: tx_hash,
        source_height: TX_BLOCK,
        log_index: LOG_INDEX,
        sender: Bytes32::from_evm_address(&[0xcc; 20]),
        recipient: dummy_recipient(),
        token: Bytes32::from_evm_address(&DUMMY_TOKEN),
        amount,
        message_type,
        nonce: 7,
    }
}

pub fn open_temp_store() -> (TempDir, Arc<RequestStore>) {
    let dir = tempfile::tempdir().unwrap();
    let store = RequestStore::open(dir.path().join("store")).unwrap();
    (dir, Arc::new(store))
}

/// Creates `transfer` and merges `indices` so the request is `ready`.
pub fn insert_ready(store: &RequestStore, transfer: &TransferEvent, indices: &[u32]) -> BridgeRequest {
    store.create(transfer, transfer.dest_domain).unwrap();
    let request = store.get(&transfer.request_id).unwrap().unwrap();
    store
        .merge_signatures(
            &transfer.request_id,
            &signatures_from(indices, &request.message_hash()),
            THRESHOLD,
        )
        .unwrap();
    store.get(&transfer.request_id).unwrap().unwrap()
}

// ============================================================================
// CONFIGURATION
// ============================================================================

pub fn build_relayer_config() -> RelayerConfig {
    RelayerConfig {
        threshold: THRESHOLD,
        total_signers: TOTAL_SIGNERS,
        polling_interval_ms: 100,
        signer_timeout_ms: 300,
        rpc_timeout_ms: 2_000,
        max_retries: 3,
        retry_cooldown_ms: 0,
        retention_secs: 7 * 24 * 60 * 60,
        cleanup_interval_ms: 60_000,
        store_path: "unused".to_string(),
        private_key_env: "RELAYER_TEST_UNUSED_PRIVATE_KEY".to_string(),
        signer_auth_token_env: "RELAYER_TEST_UNUSED_AUTH_TOKEN".to_string(),
        receipt_poll_attempts: 3,
        receipt_poll_interval_ms: 10,
    }
}

pub fn source_chain_config(rpc_url: &str) -> ChainConfig {
    ChainConfig {
        name: SOURCE_CHAIN.to_string(),
        domain_id: SOURCE_DOMAIN,
        family: ChainFamily::Evm,
        rpc_url: rpc_url.to_string(),
        bridge_address: DUMMY_SOURCE_BRIDGE.to_string(),
        confirmation_depth: 5,
        evm_chain_id: None,
        gas_limit: 2_000_000,
        max_block_range: None,
        start_height: Some(TX_BLOCK),
        execution_lookback_blocks: 10_000,
    }
}

pub fn dest_chain_config(rpc_url: &str) -> ChainConfig {
    ChainConfig {
        name: DEST_CHAIN.to_string(),
        domain_id: DEST_DOMAIN,
        family: ChainFamily::Evm,
        rpc_url: rpc_url.to_string(),
        bridge_address: DUMMY_DEST_BRIDGE.to_string(),
        confirmation_depth: 0,
        evm_chain_id: Some(DEST_CHAIN_ID),
        gas_limit: 2_000_000,
        max_block_range: None,
        start_height: None,
        execution_lookback_blocks: 1_000,
    }
}

pub fn signer_configs(endpoints: &[String]) -> Vec<SignerConfig> {
    endpoints
        .iter()
        .enumerate()
        .map(|(i, endpoint)| SignerConfig {
            index: i as u32,
            endpoint: endpoint.clone(),
            public_key: signer_public_key(i as u32),
        })
        .collect()
}

pub fn build_test_config(source_rpc: &str, dest_rpc: &str, endpoints: &[String]) -> Config {
    Config {
        relayer: build_relayer_config(),
        chains: vec![source_chain_config(source_rpc), dest_chain_config(dest_rpc)],
        signers: signer_configs(endpoints),
        api: ApiConfig {
            host: "127.0.0.1".to_string(),
            port: 3200,
            cors_origins: vec![],
        },
    }
}

// ============================================================================
// SIGNER NODES
// ============================================================================

/// Starts `count` mock signer nodes.
pub async fn start_signers(count: usize) -> Vec<MockServer> {
    let mut servers = Vec::with_capacity(count);
    for _ in 0..count {
        servers.push(MockServer::start().await);
    }
    servers
}

pub fn endpoints(servers: &[MockServer]) -> Vec<String> {
    servers.iter().map(|s| s.uri()).collect()
}

pub fn signer_clients(servers: &[MockServer], timeout: Duration) -> Vec<SignerClient> {
    let token = Arc::new(DUMMY_AUTH_TOKEN.to_string());
    signer_configs(&endpoints(servers))
        .iter()
        .map(|config| SignerClient::new(config, token.clone(), timeout).unwrap())
        .collect()
}

pub fn sign_response(index: u32, signing_index: u32, hash: &MessageHash) -> SignResponse {
    SignResponse {
        success: true,
        signature: encode_hex(&attest(signing_index, hash)),
        message_hash: *hash,
        signer_index: index,
        signer_address: bridge_common::crypto::address_hex(signer_key(signing_index).verifying_key()),
    }
}

/// Signer `index` attests `hash` on `POST /sign`.
pub async fn mount_signing_signer(server: &MockServer, index: u32, hash: &MessageHash) {
    Mock::given(method("POST"))
        .and(path("/sign"))
        .respond_with(ResponseTemplate::new(200).set_body_json(sign_response(index, index, hash)))
        .mount(server)
        .await;
}

/// Signer `index` answers with an attestation made by another key.
pub async fn mount_forging_signer(server: &MockServer, index: u32, forged_by: u32, hash: &MessageHash) {
    Mock::given(method("POST"))
        .and(path("/sign"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(sign_response(index, forged_by, hash)),
        )
        .mount(server)
        .await;
}

/// Signer refuses: the source event did not verify on its side.
pub async fn mount_refusing_signer(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/sign"))
        .respond_with(ResponseTemplate::new(422).set_body_json(ErrorResponse {
            success: false,
            error: "verification failure: source transaction reverted".to_string(),
            code: "VERIFICATION_FAILURE".to_string(),
        }))
        .mount(server)
        .await;
}

/// Signer attests, but only after `delay`.
pub async fn mount_slow_signer(server: &MockServer, index: u32, hash: &MessageHash, delay: Duration) {
    Mock::given(method("POST"))
        .and(path("/sign"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(sign_response(index, index, hash))
                .set_delay(delay),
        )
        .mount(server)
        .await;
}

pub async fn sign_calls(server: &MockServer) -> usize {
    server
        .received_requests()
        .await
        .map(|requests| requests.iter().filter(|r| r.url.path() == "/sign").count())
        .unwrap_or(0)
}

// ============================================================================
// CHAIN RPC MOCKS
// ============================================================================

fn rpc_result(result: Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({"jsonrpc": "2.0", "result": result, "id": 1}))
}

pub async fn mount_rpc(server: &MockServer, rpc_method: &str, result: Value) {
    Mock::given(method("POST"))
        .and(body_partial_json(json!({"method": rpc_method})))
        .respond_with(rpc_result(result))
        .mount(server)
        .await;
}

pub fn bool_word(value: bool) -> String {
    let mut word = [0u8; 32];
    word[31] = value as u8;
    encode_hex(&word)
}

pub fn receipt(tx_hash: &str, status: &str) -> Value {
    json!({
        "transactionHash": tx_hash,
        "status": status,
        "blockNumber": "0x10",
        "logs": []
    })
}

/// Destination chain that has not executed anything yet. Broadcasts answer
/// with `DUMMY_DEST_TX`, whose receipt has `receipt_status`; the broadcast
/// mock expects exactly `expected_broadcasts` calls.
pub async fn mount_destination(server: &MockServer, receipt_status: &str, expected_broadcasts: u64) {
    mount_rpc(server, "eth_call", json!(bool_word(false))).await;
    mount_rpc(server, "eth_getTransactionCount", json!("0x5")).await;
    mount_rpc(server, "eth_gasPrice", json!("0x3b9aca00")).await;
    mount_rpc(server, "eth_getTransactionReceipt", receipt(DUMMY_DEST_TX, receipt_status)).await;

    Mock::given(method("POST"))
        .and(body_partial_json(json!({"method": "eth_sendRawTransaction"})))
        .respond_with(rpc_result(json!(DUMMY_DEST_TX)))
        .expect(expected_broadcasts)
        .mount(server)
        .await;
}

/// Destination chain whose receipts never show up within the polling window.
/// Broadcasts answer with `DUMMY_DEST_TX` after `broadcast_delay`.
pub async fn mount_pending_destination(server: &MockServer, expected_broadcasts: u64, broadcast_delay: Duration) {
    mount_rpc(server, "eth_call", json!(bool_word(false))).await;
    mount_rpc(server, "eth_getTransactionCount", json!("0x5")).await;
    mount_rpc(server, "eth_gasPrice", json!("0x3b9aca00")).await;
    mount_rpc(server, "eth_getTransactionReceipt", Value::Null).await;

    Mock::given(method("POST"))
        .and(body_partial_json(json!({"method": "eth_sendRawTransaction"})))
        .respond_with(rpc_result(json!(DUMMY_DEST_TX)).set_delay(broadcast_delay))
        .expect(expected_broadcasts)
        .mount(server)
        .await;
}

/// Destination chain where `request_id` was already executed in `DUMMY_DEST_TX`.
pub async fn mount_executed_destination(server: &MockServer, request_id: &Bytes32) {
    mount_rpc(server, "eth_call", json!(bool_word(true))).await;
    mount_rpc(server, "eth_blockNumber", json!("0x500")).await;
    mount_rpc(
        server,
        "eth_getLogs",
        json!([{
            "address": DUMMY_DEST_BRIDGE,
            "topics": [event_topic(REQUEST_EXECUTED_SIGNATURE), request_id.to_hex()],
            "data": "0x",
            "blockNumber": "0x4ff",
            "transactionHash": DUMMY_DEST_TX,
            "logIndex": "0x0"
        }]),
    )
    .await;

    Mock::given(method("POST"))
        .and(body_partial_json(json!({"method": "eth_sendRawTransaction"})))
        .respond_with(rpc_result(json!(DUMMY_DEST_TX)))
        .expect(0)
        .mount(server)
        .await;
}

/// Bridge source log for `kind` in `tx_hash`, emitted by `emitter`.
pub fn source_log(kind: EventKind, amount: u128, emitter: &str, tx_hash: &str, dest_domain: u32) -> Value {
    json!({
        "address": emitter,
        "topics": [bridge_event_topic(kind), DUMMY_EVENT_REQUEST_ID, DUMMY_SENDER_TOPIC],
        "data": encode_bridge_event_data(&DUMMY_TOKEN, amount, &dummy_recipient(), dest_domain, 7),
        "blockNumber": format!("0x{:x}", TX_BLOCK),
        "transactionHash": tx_hash,
        "logIndex": format!("0x{:x}", LOG_INDEX)
    })
}

/// Source chain at `head` with `logs` in range and every transaction's receipt at `status`.
pub async fn mount_source(server: &MockServer, head: u64, logs: Vec<Value>, receipt_status: &str) {
    mount_rpc(server, "eth_blockNumber", json!(format!("0x{:x}", head))).await;
    mount_rpc(server, "eth_getLogs", Value::Array(logs)).await;
    mount_rpc(
        server,
        "eth_getTransactionReceipt",
        receipt(DUMMY_SOURCE_TX, receipt_status),
    )
    .await;
}

// ============================================================================
// PIPELINE
// ============================================================================

pub fn build_submitter(dest_rpc: &str, relayer: &RelayerConfig) -> Arc<EvmSubmitter> {
    let crypto = CryptoService::from_private_key_hex(DUMMY_RELAYER_KEY).unwrap();
    Arc::new(EvmSubmitter::new(&dest_chain_config(dest_rpc), relayer, crypto).unwrap())
}

pub fn build_aggregator(
    store: Arc<RequestStore>,
    signers: Vec<SignerClient>,
    submitters: Vec<Arc<EvmSubmitter>>,
    relayer: &RelayerConfig,
) -> Aggregator {
    let tracker = Arc::new(RetryTracker::new(relayer.max_retries, relayer.retry_cooldown()));
    build_aggregator_with_tracker(store, signers, submitters, tracker, relayer)
}

/// Same as [`build_aggregator`], sharing `tracker` with the test.
pub fn build_aggregator_with_tracker(
    store: Arc<RequestStore>,
    signers: Vec<SignerClient>,
    submitters: Vec<Arc<EvmSubmitter>>,
    tracker: Arc<RetryTracker>,
    relayer: &RelayerConfig,
) -> Aggregator {
    let source_chains: HashMap<u32, String> =
        [(SOURCE_DOMAIN, SOURCE_CHAIN.to_string())].into_iter().collect();
    Aggregator::new(
        store,
        signers,
        submitters,
        tracker,
        source_chains,
        relayer.threshold,
        relayer.max_retries,
        relayer.signer_timeout(),
    )
}

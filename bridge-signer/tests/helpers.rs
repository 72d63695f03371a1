//! Shared test helpers for the signer node
//!
//! Builds configurations pointing at wiremock JSON-RPC servers and source-chain
//! fixtures (receipts, logs, SVM transactions) in the layout the bridge
//! contracts emit.

#![allow(dead_code)]

use bridge_common::encoding::{decode_hex, derive_request_id, tx_hash_bytes};
use bridge_common::{Bytes32, ChainFamily, EventKind, MessageType, SignRequest};
use bridge_signer::config::{ApiConfig, Config, SignerNodeConfig, SourceChainConfig};
use bridge_signer::{ApiServer, CryptoService, SigningService, SourceVerifier};
use chain_clients_evm::events::{bridge_event_topic, encode_bridge_event_data};
use chain_clients_svm::{encode_program_data, TokensEventData};
use serde_json::{json, Value};
use wiremock::matchers::{body_partial_json, method};
use wiremock::{Mock, MockServer, ResponseTemplate};

// ============================================================================
// CONSTANTS
// ============================================================================

pub const DUMMY_SIGNER_KEY: &str =
    "0x4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318";
pub const DUMMY_AUTH_TOKEN: &str = "test-shared-secret";
pub const DUMMY_BRIDGE_ADDR: &str = "0x5fbdb2315678afecb367f032d93f642f64180aa3";
pub const DUMMY_OTHER_ADDR: &str = "0x9999999999999999999999999999999999999999";
pub const DUMMY_TX_HASH: &str =
    "0x2222222222222222222222222222222222222222222222222222222222222222";
pub const DUMMY_SENDER_TOPIC: &str =
    "0x000000000000000000000000cccccccccccccccccccccccccccccccccccccccc";
pub const DUMMY_EVENT_REQUEST_ID: &str =
    "0x0101010101010101010101010101010101010101010101010101010101010101";
pub const DUMMY_SVM_PROGRAM_ID: &str = "BridgeProgram1111111111111111111111111111111";

pub const EVM_CHAIN: &str = "ethereum";
pub const SVM_CHAIN: &str = "solana";
pub const EVM_DOMAIN: u32 = 1;
pub const SVM_DOMAIN: u32 = 5;
pub const DEST_DOMAIN: u32 = 100;
pub const LOG_INDEX: u32 = 3;
pub const TX_BLOCK: u64 = 100;
pub const ONE_TOKEN: u128 = 1_000_000_000_000_000_000;
pub const CONFIRMATION_DEPTH: u64 = 5;

pub const DUMMY_TOKEN: [u8; 20] = [0xbb; 20];

pub fn dummy_recipient() -> Bytes32 {
    Bytes32([0xaa; 32])
}

pub fn dummy_svm_signature() -> String {
    bs58::encode([0x33u8; 64]).into_string()
}

// ============================================================================
// CONFIGURATION
// ============================================================================

pub fn build_test_config(evm_rpc_url: &str, svm_rpc_url: &str) -> Config {
    Config {
        signer: SignerNodeConfig {
            index: 2,
            private_key_env: "SIGNER_TEST_UNUSED_PRIVATE_KEY".to_string(),
            auth_token_env: "SIGNER_TEST_UNUSED_AUTH_TOKEN".to_string(),
            rpc_timeout_ms: 2_000,
        },
        source_chains: vec![
            SourceChainConfig {
                name: EVM_CHAIN.to_string(),
                domain_id: EVM_DOMAIN,
                family: ChainFamily::Evm,
                rpc_url: evm_rpc_url.to_string(),
                bridge_address: DUMMY_BRIDGE_ADDR.to_string(),
                confirmation_depth: CONFIRMATION_DEPTH,
            },
            SourceChainConfig {
                name: SVM_CHAIN.to_string(),
                domain_id: SVM_DOMAIN,
                family: ChainFamily::Svm,
                rpc_url: svm_rpc_url.to_string(),
                bridge_address: DUMMY_SVM_PROGRAM_ID.to_string(),
                confirmation_depth: CONFIRMATION_DEPTH,
            },
        ],
        api: ApiConfig {
            host: "127.0.0.1".to_string(),
            port: 3100,
            cors_origins: vec![],
        },
    }
}

pub fn build_test_service(config: &Config) -> SigningService {
    let crypto = CryptoService::from_private_key_hex(DUMMY_SIGNER_KEY).unwrap();
    let verifier = SourceVerifier::new(config).unwrap();
    SigningService::new(config.signer.index, crypto, verifier)
}

pub fn build_test_server(config: Config) -> ApiServer {
    let service = build_test_service(&config);
    ApiServer::new(config, service, DUMMY_AUTH_TOKEN.to_string())
}

// ============================================================================
// EVM SOURCE FIXTURES
// ============================================================================

pub fn evm_bridge_log(kind: EventKind, amount: u128, emitter: &str) -> Value {
    json!({
        "address": emitter,
        "topics": [bridge_event_topic(kind), DUMMY_EVENT_REQUEST_ID, DUMMY_SENDER_TOPIC],
        "data": encode_bridge_event_data(&DUMMY_TOKEN, amount, &dummy_recipient(), DEST_DOMAIN, 7),
        "blockNumber": format!("0x{:x}", TX_BLOCK),
        "transactionHash": DUMMY_TX_HASH,
        "logIndex": format!("0x{:x}", LOG_INDEX)
    })
}

pub fn evm_receipt(status: &str, logs: Vec<Value>) -> Value {
    json!({
        "transactionHash": DUMMY_TX_HASH,
        "status": status,
        "blockNumber": format!("0x{:x}", TX_BLOCK),
        "logs": logs
    })
}

/// Mounts `eth_getTransactionReceipt` and `eth_blockNumber` on `server`.
pub async fn mount_evm_source(server: &MockServer, receipt: Value, head: u64) {
    Mock::given(method("POST"))
        .and(body_partial_json(json!({"method": "eth_getTransactionReceipt"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jsonrpc": "2.0", "result": receipt, "id": 1
        })))
        .mount(server)
        .await;

    Mock::given(method("POST"))
        .and(body_partial_json(json!({"method": "eth_blockNumber"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jsonrpc": "2.0", "result": format!("0x{:x}", head), "id": 1
        })))
        .mount(server)
        .await;
}

/// Sign request matching the fixture log emitted for `kind`.
pub fn evm_sign_request(message_type: MessageType, amount: u128) -> SignRequest {
    let tx_bytes = decode_hex(DUMMY_TX_HASH).unwrap();
    SignRequest {
        request_id: derive_request_id(EVM_DOMAIN, &tx_bytes, LOG_INDEX),
        source_domain: EVM_DOMAIN,
        dest_domain: DEST_DOMAIN,
        recipient: dummy_recipient(),
        token: Bytes32::from_evm_address(&DUMMY_TOKEN),
        amount,
        message_type,
        source_chain: EVM_CHAIN.to_string(),
        source_tx_hash: DUMMY_TX_HASH.to_string(),
    }
}

// ============================================================================
// SVM SOURCE FIXTURES
// ============================================================================

pub fn svm_event_data(amount: u64) -> TokensEventData {
    TokensEventData {
        request_id: [0x01; 32],
        sender: [0x0c; 32],
        token_mint: [0x0d; 32],
        amount,
        destination_address: [0xaa; 32],
        destination_domain: DEST_DOMAIN,
        nonce: 9,
    }
}

pub fn svm_transaction(kind: EventKind, amount: u64, slot: u64, failed: bool) -> Value {
    let logs = vec![
        format!("Program {} invoke [1]", DUMMY_SVM_PROGRAM_ID),
        "Program log: Instruction: Lock".to_string(),
        encode_program_data(kind, &svm_event_data(amount)).unwrap(),
        format!("Program {} success", DUMMY_SVM_PROGRAM_ID),
    ];
    let err = if failed {
        json!({"InstructionError": [0, {"Custom": 6001}]})
    } else {
        Value::Null
    };
    json!({
        "slot": slot,
        "meta": { "err": err, "logMessages": logs }
    })
}

pub async fn mount_svm_source(server: &MockServer, transaction: Value, head_slot: u64) {
    Mock::given(method("POST"))
        .and(body_partial_json(json!({"method": "getTransaction"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jsonrpc": "2.0", "result": transaction, "id": 1
        })))
        .mount(server)
        .await;

    Mock::given(method("POST"))
        .and(body_partial_json(json!({"method": "getSlot"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jsonrpc": "2.0", "result": head_slot, "id": 1
        })))
        .mount(server)
        .await;
}

pub fn svm_sign_request(message_type: MessageType, amount: u128) -> SignRequest {
    let signature = dummy_svm_signature();
    let tx_bytes = tx_hash_bytes(ChainFamily::Svm, &signature).unwrap();
    SignRequest {
        request_id: derive_request_id(SVM_DOMAIN, &tx_bytes, 0),
        source_domain: SVM_DOMAIN,
        dest_domain: DEST_DOMAIN,
        recipient: dummy_recipient(),
        token: Bytes32([0x0d; 32]),
        amount,
        message_type,
        source_chain: SVM_CHAIN.to_string(),
        source_tx_hash: signature,
    }
}

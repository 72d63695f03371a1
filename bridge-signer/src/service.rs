//! Attestation service: verify first, then sign.

use bridge_common::crypto::SIGNATURE_LEN;
use bridge_common::{
    BatchSignResponse, BatchSignResult, BridgeError, ErrorResponse, HealthResponse, InfoResponse,
    SignRequest, SignResponse,
};
use futures::future::join_all;
use tracing::{error, info, warn};

use crate::crypto::CryptoService;
use crate::verifier::SourceVerifier;

/// Upper bound on items accepted by one `/sign-batch` call.
pub const MAX_BATCH_SIZE: usize = 100;

pub struct SigningService {
    signer_index: u32,
    crypto: CryptoService,
    verifier: SourceVerifier,
}

impl SigningService {
    pub fn new(signer_index: u32, crypto: CryptoService, verifier: SourceVerifier) -> Self {
        Self {
            signer_index,
            crypto,
            verifier,
        }
    }

    pub fn signer_index(&self) -> u32 {
        self.signer_index
    }

    pub fn health(&self) -> HealthResponse {
        HealthResponse {
            success: true,
            status: "ok".to_string(),
            signer_index: self.signer_index,
            signer_address: self.crypto.get_ethereum_address().to_string(),
        }
    }

    pub fn info(&self) -> InfoResponse {
        InfoResponse {
            success: true,
            signer_index: self.signer_index,
            public_key: self.crypto.public_key_hex(),
            signer_address: self.crypto.get_ethereum_address().to_string(),
            supported_chains: self.verifier.supported_chains(),
        }
    }

    /// Verifies the claimed source event and signs its canonical message hash.
    ///
    /// Nothing is signed unless verification succeeds.
    pub async fn sign(&self, request: &SignRequest) -> Result<SignResponse, BridgeError> {
        let message_hash = request.message_fields().message_hash();

        if let Err(e) = self.verifier.verify(request).await {
            warn!(
                "Refusing to sign request {} from {} tx {}: {}",
                request.request_id, request.source_chain, request.source_tx_hash, e
            );
            return Err(e);
        }

        let signature = self.crypto.sign_message_hash(&message_hash).map_err(|e| {
            error!("Signing request {} failed: {}", request.request_id, e);
            BridgeError::InvalidRequest(format!("signing failed: {}", e))
        })?;
        debug_assert_eq!(signature.len(), SIGNATURE_LEN);

        info!(
            "Signed request {} ({} {} -> {}, message hash {})",
            request.request_id,
            request.message_type,
            request.source_domain,
            request.dest_domain,
            message_hash
        );

        Ok(SignResponse {
            success: true,
            signature: format!("0x{}", hex::encode(&signature)),
            message_hash,
            signer_index: self.signer_index,
            signer_address: self.crypto.get_ethereum_address().to_string(),
        })
    }

    /// Verify-then-sign for every item; a failing item never aborts the batch.
    pub async fn sign_batch(
        &self,
        requests: &[SignRequest],
    ) -> Result<BatchSignResponse, BridgeError> {
        if requests.len() > MAX_BATCH_SIZE {
            return Err(BridgeError::InvalidRequest(format!(
                "batch of {} requests exceeds the limit of {}",
                requests.len(),
                MAX_BATCH_SIZE
            )));
        }

        let outcomes = join_all(requests.iter().map(|r| self.sign(r))).await;
        let results = requests
            .iter()
            .zip(outcomes)
            .map(|(request, outcome)| match outcome {
                Ok(signed) => BatchSignResult {
                    request_id: request.request_id,
                    success: true,
                    signature: Some(signed.signature),
                    message_hash: Some(signed.message_hash),
                    error: None,
                    code: None,
                },
                Err(e) => {
                    let body = ErrorResponse::from(&e);
                    BatchSignResult {
                        request_id: request.request_id,
                        success: false,
                        signature: None,
                        message_hash: None,
                        error: Some(body.error),
                        code: Some(body.code),
                    }
                }
            })
            .collect();

        Ok(BatchSignResponse {
            success: true,
            signer_index: self.signer_index,
            signer_address: self.crypto.get_ethereum_address().to_string(),
            results,
        })
    }
}

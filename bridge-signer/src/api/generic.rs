//! Signer HTTP API
//!
//! `GET /health` is public. `GET /info`, `POST /sign` and `POST /sign-batch`
//! require the shared secret in the `x-bridge-auth` header.

use anyhow::{Context, Result};
use bridge_common::{BatchSignRequest, BridgeError, ErrorResponse, SignRequest, AUTH_HEADER};
use std::convert::Infallible;
use std::sync::Arc;
use tracing::{error, info};
use warp::http::{Method, StatusCode};
use warp::reply::{Json, WithStatus};
use warp::{Filter, Rejection, Reply};

use crate::config::Config;
use crate::service::SigningService;

/// Largest accepted request body in bytes.
const MAX_BODY_BYTES: u64 = 256 * 1024;

// ============================================================================
// API HANDLERS
// ============================================================================

/// HTTP status for a signer-side failure.
pub fn status_for(err: &BridgeError) -> StatusCode {
    match err {
        BridgeError::Unauthorized => StatusCode::UNAUTHORIZED,
        BridgeError::VerificationFailure(_) => StatusCode::UNPROCESSABLE_ENTITY,
        BridgeError::TransportFailure(_) => StatusCode::BAD_GATEWAY,
        BridgeError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_reply(err: &BridgeError) -> WithStatus<Json> {
    warp::reply::with_status(warp::reply::json(&ErrorResponse::from(err)), status_for(err))
}

/// Handler for `POST /sign`.
///
/// # Arguments
///
/// * `request` - The attestation request
/// * `service` - Signing service
///
/// # Returns
///
/// * `200` with a `SignResponse` when the source event verified and was signed
/// * `422` / `502` / `400` with an `ErrorResponse` otherwise
pub async fn sign_handler(
    request: SignRequest,
    service: Arc<SigningService>,
) -> Result<WithStatus<Json>, Rejection> {
    match service.sign(&request).await {
        Ok(response) => Ok(warp::reply::with_status(
            warp::reply::json(&response),
            StatusCode::OK,
        )),
        Err(e) => Ok(error_reply(&e)),
    }
}

/// Handler for `POST /sign-batch`. Per-item failures are reported inside the body.
pub async fn sign_batch_handler(
    batch: BatchSignRequest,
    service: Arc<SigningService>,
) -> Result<WithStatus<Json>, Rejection> {
    match service.sign_batch(&batch.requests).await {
        Ok(response) => Ok(warp::reply::with_status(
            warp::reply::json(&response),
            StatusCode::OK,
        )),
        Err(e) => Ok(error_reply(&e)),
    }
}

// ============================================================================
// WARP FILTER HELPERS
// ============================================================================

/// Creates a warp filter that provides access to the signing service.
pub fn with_service(
    service: Arc<SigningService>,
) -> impl Filter<Extract = (Arc<SigningService>,), Error = Infallible> + Clone {
    warp::any().map(move || service.clone())
}

/// Rejects requests whose `x-bridge-auth` header does not equal the shared secret.
pub fn with_auth(token: Arc<String>) -> impl Filter<Extract = (), Error = Rejection> + Clone {
    warp::header::optional::<String>(AUTH_HEADER)
        .and_then(move |provided: Option<String>| {
            let token = token.clone();
            async move {
                match provided {
                    Some(value) if constant_time_eq(value.as_bytes(), token.as_bytes()) => {
                        Ok::<(), Rejection>(())
                    }
                    _ => Err(warp::reject::custom(Unauthorized)),
                }
            }
        })
        .untuple_one()
}

/// Compares two secrets without an early exit on the first differing byte.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

// ============================================================================
// CUSTOM REJECTION TYPES
// ============================================================================

/// Missing or wrong shared secret
#[derive(Debug)]
pub struct Unauthorized;

impl warp::reject::Reject for Unauthorized {}

// ============================================================================
// CORS CONFIGURATION
// ============================================================================

/// Creates a CORS filter based on the configured allowed origins.
fn create_cors_filter(allowed_origins: &[String]) -> warp::cors::Builder {
    let methods = vec![Method::GET, Method::POST, Method::OPTIONS];
    let headers = vec!["content-type", AUTH_HEADER];

    if allowed_origins.iter().any(|o| o == "*") {
        warp::cors()
            .allow_any_origin()
            .allow_methods(methods)
            .allow_headers(headers)
    } else {
        let origins: Vec<&str> = allowed_origins.iter().map(|s| s.as_str()).collect();
        warp::cors()
            .allow_origins(origins)
            .allow_methods(methods)
            .allow_headers(headers)
    }
}

// ============================================================================
// REJECTION HANDLER
// ============================================================================

/// Converts warp rejections into `ErrorResponse` bodies.
pub async fn handle_rejection(rej: Rejection) -> Result<impl Reply, Infallible> {
    let (status, err) = if rej.find::<Unauthorized>().is_some() {
        (StatusCode::UNAUTHORIZED, BridgeError::Unauthorized)
    } else if let Some(e) = rej.find::<warp::filters::body::BodyDeserializeError>() {
        (
            StatusCode::BAD_REQUEST,
            BridgeError::InvalidRequest(format!("Invalid JSON: {}", e)),
        )
    } else if rej.find::<warp::reject::PayloadTooLarge>().is_some() {
        (
            StatusCode::PAYLOAD_TOO_LARGE,
            BridgeError::InvalidRequest("Request body too large".to_string()),
        )
    } else if rej.find::<warp::reject::LengthRequired>().is_some() {
        (
            StatusCode::LENGTH_REQUIRED,
            BridgeError::InvalidRequest("Content-Length required".to_string()),
        )
    } else if rej.is_not_found() {
        (
            StatusCode::NOT_FOUND,
            BridgeError::InvalidRequest("Endpoint not found".to_string()),
        )
    } else if rej.find::<warp::reject::MethodNotAllowed>().is_some() {
        (
            StatusCode::METHOD_NOT_ALLOWED,
            BridgeError::InvalidRequest("Method not allowed".to_string()),
        )
    } else {
        error!("Unhandled rejection: {:?}", rej);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            BridgeError::InvalidRequest("Internal server error".to_string()),
        )
    };

    Ok(warp::reply::with_status(
        warp::reply::json(&ErrorResponse::from(&err)),
        status,
    ))
}

// ============================================================================
// API SERVER IMPLEMENTATION
// ============================================================================

/// REST API server of a signer node.
pub struct ApiServer {
    config: Arc<Config>,
    service: Arc<SigningService>,
    auth_token: Arc<String>,
}

impl ApiServer {
    /// Creates a new API server.
    ///
    /// # Arguments
    ///
    /// * `config` - Signer configuration
    /// * `service` - Verify-then-sign service
    /// * `auth_token` - Shared secret expected in `x-bridge-auth`
    pub fn new(config: Config, service: SigningService, auth_token: String) -> Self {
        Self {
            config: Arc::new(config),
            service: Arc::new(service),
            auth_token: Arc::new(auth_token),
        }
    }

    /// Starts the API server and serves until the process exits.
    pub async fn run(&self) -> Result<()> {
        info!(
            "Starting signer API on {}:{}",
            self.config.api.host, self.config.api.port
        );

        let routes = self.create_routes();
        let addr: std::net::SocketAddr = format!("{}:{}", self.config.api.host, self.config.api.port)
            .parse()
            .context("Failed to parse API server address")?;

        warp::serve(routes).run(addr).await;
        Ok(())
    }

    pub(crate) fn create_routes(
        &self,
    ) -> impl Filter<Extract = impl Reply, Error = Infallible> + Clone {
        let service = self.service.clone();
        let auth = with_auth(self.auth_token.clone());

        // Health check endpoint - liveness and signing address, no auth
        let health_service = service.clone();
        let health = warp::path("health")
            .and(warp::path::end())
            .and(warp::get())
            .map(move || warp::reply::json(&health_service.health()));

        let info_service = service.clone();
        let info = warp::path("info")
            .and(warp::path::end())
            .and(warp::get())
            .and(auth.clone())
            .map(move || warp::reply::json(&info_service.info()));

        let sign = warp::path("sign")
            .and(warp::path::end())
            .and(warp::post())
            .and(auth.clone())
            .and(warp::body::content_length_limit(MAX_BODY_BYTES))
            .and(warp::body::json())
            .and(with_service(service.clone()))
            .and_then(sign_handler);

        let sign_batch = warp::path("sign-batch")
            .and(warp::path::end())
            .and(warp::post())
            .and(auth)
            .and(warp::body::content_length_limit(MAX_BODY_BYTES))
            .and(warp::body::json())
            .and(with_service(service))
            .and_then(sign_batch_handler);

        health
            .or(info)
            .or(sign)
            .or(sign_batch)
            .with(create_cors_filter(&self.config.api.cors_origins))
            .recover(handle_rejection)
    }

    /// Public method for testing - exposes routes for integration tests
    pub fn test_routes(&self) -> impl Filter<Extract = impl Reply, Error = Infallible> + Clone {
        self.create_routes()
    }
}

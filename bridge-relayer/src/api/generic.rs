//! Relayer Status API
//!
//! Read-only view of the request store for operators:
//!
//! - `GET /health` - liveness, relayer account and threshold
//! - `GET /stats` - request counts per status
//! - `GET /requests?status=<status>` - requests, optionally filtered by status
//! - `GET /requests/<requestId>` - one request

use anyhow::{Context, Result};
use bridge_common::{ApiResponse, MessageHash, RequestId};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info};
use warp::http::{Method, StatusCode};
use warp::reply::{Json, WithStatus};
use warp::{Filter, Rejection, Reply};

use crate::config::Config;
use crate::storage::{BridgeRequest, RequestStatus, RequestStore, StatusCounts};

// ============================================================================
// RESPONSE BODIES
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayerHealth {
    pub status: String,
    pub relayer_address: String,
    pub threshold: usize,
    pub total_signers: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsResponse {
    pub total: u64,
    #[serde(flatten)]
    pub counts: StatusCounts,
}

/// A stored request plus derived fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestSummary {
    #[serde(flatten)]
    pub request: BridgeRequest,
    pub signature_count: usize,
    pub message_hash: MessageHash,
    pub age_secs: i64,
}

impl From<BridgeRequest> for RequestSummary {
    fn from(request: BridgeRequest) -> Self {
        Self {
            signature_count: request.signature_count(),
            message_hash: request.message_hash(),
            age_secs: request.age(Utc::now()).num_seconds(),
            request,
        }
    }
}

// ============================================================================
// API HANDLERS
// ============================================================================

fn json_reply<T: Serialize>(body: &ApiResponse<T>, status: StatusCode) -> WithStatus<Json> {
    warp::reply::with_status(warp::reply::json(body), status)
}

fn store_failure(e: impl std::fmt::Display) -> WithStatus<Json> {
    error!("Status API store read failed: {}", e);
    json_reply(
        &ApiResponse::<()>::err("Failed to read request store"),
        StatusCode::INTERNAL_SERVER_ERROR,
    )
}

/// Handler for `GET /stats`.
pub async fn stats_handler(store: Arc<RequestStore>) -> Result<WithStatus<Json>, Rejection> {
    match store.status_counts() {
        Ok(counts) => Ok(json_reply(
            &ApiResponse::ok(StatsResponse {
                total: counts.total(),
                counts,
            }),
            StatusCode::OK,
        )),
        Err(e) => Ok(store_failure(e)),
    }
}

/// Handler for `GET /requests`.
///
/// # Arguments
///
/// * `params` - Query parameters; `status` optionally filters by lifecycle status
/// * `store` - Request store
///
/// # Returns
///
/// * `200` with the matching requests, oldest first
/// * `400` when `status` is not a known status
pub async fn list_requests_handler(
    params: HashMap<String, String>,
    store: Arc<RequestStore>,
) -> Result<WithStatus<Json>, Rejection> {
    let statuses: Vec<RequestStatus> = match params.get("status") {
        Some(raw) => match raw.parse::<RequestStatus>() {
            Ok(status) => vec![status],
            Err(e) => {
                return Ok(json_reply(
                    &ApiResponse::<()>::err(e),
                    StatusCode::BAD_REQUEST,
                ))
            }
        },
        None => RequestStatus::ALL.to_vec(),
    };

    let mut requests = Vec::new();
    for status in statuses {
        match store.list_by_status(status) {
            Ok(found) => requests.extend(found),
            Err(e) => return Ok(store_failure(e)),
        }
    }
    requests.sort_by_key(|r| r.created_at);

    let summaries: Vec<RequestSummary> = requests.into_iter().map(RequestSummary::from).collect();
    Ok(json_reply(&ApiResponse::ok(summaries), StatusCode::OK))
}

/// Handler for `GET /requests/<requestId>`.
pub async fn get_request_handler(
    raw_id: String,
    store: Arc<RequestStore>,
) -> Result<WithStatus<Json>, Rejection> {
    let id = match raw_id.parse::<RequestId>() {
        Ok(id) => id,
        Err(e) => {
            return Ok(json_reply(
                &ApiResponse::<()>::err(format!("Invalid request id: {}", e)),
                StatusCode::BAD_REQUEST,
            ))
        }
    };

    match store.get(&id) {
        Ok(Some(request)) => Ok(json_reply(
            &ApiResponse::ok(RequestSummary::from(request)),
            StatusCode::OK,
        )),
        Ok(None) => Ok(json_reply(
            &ApiResponse::<()>::err(format!("Request {} not found", id)),
            StatusCode::NOT_FOUND,
        )),
        Err(e) => Ok(store_failure(e)),
    }
}

// ============================================================================
// WARP FILTER HELPERS
// ============================================================================

/// Creates a warp filter that provides access to the request store.
pub fn with_store(
    store: Arc<RequestStore>,
) -> impl Filter<Extract = (Arc<RequestStore>,), Error = Infallible> + Clone {
    warp::any().map(move || store.clone())
}

// ============================================================================
// CORS CONFIGURATION
// ============================================================================

fn create_cors_filter(allowed_origins: &[String]) -> warp::cors::Builder {
    let methods = vec![Method::GET, Method::OPTIONS];

    if allowed_origins.iter().any(|o| o == "*") {
        warp::cors()
            .allow_any_origin()
            .allow_methods(methods)
            .allow_headers(vec!["content-type"])
    } else {
        let origins: Vec<&str> = allowed_origins.iter().map(|s| s.as_str()).collect();
        warp::cors()
            .allow_origins(origins)
            .allow_methods(methods)
            .allow_headers(vec!["content-type"])
    }
}

// ============================================================================
// REJECTION HANDLER
// ============================================================================

pub async fn handle_rejection(rej: Rejection) -> Result<impl Reply, Infallible> {
    let (status, message) = if rej.is_not_found() {
        (StatusCode::NOT_FOUND, "Endpoint not found".to_string())
    } else if rej.find::<warp::reject::MethodNotAllowed>().is_some() {
        (StatusCode::METHOD_NOT_ALLOWED, "Method not allowed".to_string())
    } else if let Some(e) = rej.find::<warp::reject::InvalidQuery>() {
        (StatusCode::BAD_REQUEST, format!("Invalid query: {}", e))
    } else {
        error!("Unhandled rejection: {:?}", rej);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Internal server error".to_string(),
        )
    };

    Ok(json_reply(&ApiResponse::<()>::err(message), status))
}

// ============================================================================
// API SERVER IMPLEMENTATION
// ============================================================================

/// Status API of the relayer.
pub struct ApiServer {
    config: Arc<Config>,
    store: Arc<RequestStore>,
    relayer_address: String,
}

impl ApiServer {
    /// Creates a new API server.
    ///
    /// # Arguments
    ///
    /// * `config` - Relayer configuration
    /// * `store` - Request store shared with the pipeline
    /// * `relayer_address` - Destination account address, shown on `/health`
    pub fn new(config: Arc<Config>, store: Arc<RequestStore>, relayer_address: String) -> Self {
        Self {
            config,
            store,
            relayer_address,
        }
    }

    /// Serves until `shutdown` flips to true.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let addr: std::net::SocketAddr =
            format!("{}:{}", self.config.api.host, self.config.api.port)
                .parse()
                .context("Failed to parse API server address")?;

        let (bound, server) = warp::serve(self.create_routes())
            .try_bind_with_graceful_shutdown(addr, async move {
                while !*shutdown.borrow() {
                    if shutdown.changed().await.is_err() {
                        break;
                    }
                }
            })
            .with_context(|| format!("Failed to bind status API on {}", addr))?;

        info!("Relayer status API listening on {}", bound);
        server.await;
        info!("Relayer status API stopped");
        Ok(())
    }

    pub(crate) fn create_routes(
        &self,
    ) -> impl Filter<Extract = impl Reply, Error = Infallible> + Clone {
        let store = self.store.clone();

        let health_body = RelayerHealth {
            status: "ok".to_string(),
            relayer_address: self.relayer_address.clone(),
            threshold: self.config.relayer.threshold,
            total_signers: self.config.relayer.total_signers,
        };
        let health = warp::path("health")
            .and(warp::path::end())
            .and(warp::get())
            .map(move || warp::reply::json(&ApiResponse::ok(health_body.clone())));

        let stats = warp::path("stats")
            .and(warp::path::end())
            .and(warp::get())
            .and(with_store(store.clone()))
            .and_then(stats_handler);

        let list = warp::path("requests")
            .and(warp::path::end())
            .and(warp::get())
            .and(warp::query::<HashMap<String, String>>())
            .and(with_store(store.clone()))
            .and_then(list_requests_handler);

        let single = warp::path("requests")
            .and(warp::path::param::<String>())
            .and(warp::path::end())
            .and(warp::get())
            .and(with_store(store))
            .and_then(get_request_handler);

        health
            .or(stats)
            .or(list)
            .or(single)
            .with(create_cors_filter(&self.config.api.cors_origins))
            .recover(handle_rejection)
    }

    /// Public method for testing - exposes routes for integration tests
    pub fn test_routes(&self) -> impl Filter<Extract = impl Reply, Error = Infallible> + Clone {
        self.create_routes()
    }
}

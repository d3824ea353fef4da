//! # REST API
//!
//! Builds the axum router that exposes the node's HTTP interface. All
//! endpoints share application state through axum's `State` extractor.
//!
//! ## Endpoints
//!
//! | Method | Path                         | Description                              |
//! |--------|------------------------------|------------------------------------------|
//! | GET    | `/health`                    | Liveness probe                           |
//! | GET    | `/status`                    | Node status summary                      |
//! | POST   | `/protect`                   | Commit a swap                            |
//! | GET    | `/commitments/:hash`         | Lifecycle status of a commitment         |
//! | POST   | `/commitments/:hash/reveal`  | Reveal now, through the claim guard      |
//! | GET    | `/owners/:address`           | Per-owner protection status              |
//! | GET    | `/statistics`                | Detector statistics snapshot             |
//! | GET    | `/events?limit=N`            | Most recent MEV events                   |
//! | POST   | `/ingest/pending`            | Push a pending transaction to the monitor |
//! | POST   | `/ingest/block`              | Push a confirmed block to the monitor    |

use axum::{
    extract::{Path, Query, State},
    http::{Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use ethers_core::types::{Address, Block, Transaction, U256};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use zkmev_protocol::detector::{BroadcastFeed, MevDetector};
use zkmev_protocol::encoding::FieldElement;
use zkmev_protocol::ledger::Ledger;
use zkmev_protocol::protection::{
    CommitmentStatus, ProtectionRequest, ProtectionService, SwapParams,
};
use zkmev_protocol::ProtectionError;

use crate::metrics::SharedMetrics;

/// Default and maximum page size for `/events`.
const DEFAULT_EVENTS_LIMIT: usize = 50;
const MAX_EVENTS_LIMIT: usize = 1_000;

// ---------------------------------------------------------------------------
// Application State
// ---------------------------------------------------------------------------

/// Shared application state available to all request handlers.
///
/// Cheap to clone, everything behind `Arc`.
#[derive(Clone)]
pub struct AppState {
    pub version: String,
    pub network: String,
    pub service: Arc<ProtectionService>,
    pub ledger: Arc<dyn Ledger>,
    pub detector: Arc<MevDetector>,
    pub feed: Arc<BroadcastFeed>,
    pub metrics: SharedMetrics,
}

// ---------------------------------------------------------------------------
// Router Construction
// ---------------------------------------------------------------------------

/// Builds the full axum [`Router`] with all API routes, CORS, and tracing.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/status", get(status_handler))
        .route("/protect", post(protect_handler))
        .route("/commitments/:hash", get(commitment_handler))
        .route("/commitments/:hash/reveal", post(reveal_handler))
        .route("/owners/:address", get(owner_handler))
        .route("/statistics", get(statistics_handler))
        .route("/events", get(events_handler))
        .route("/ingest/pending", post(ingest_pending_handler))
        .route("/ingest/block", post(ingest_block_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Request / Response Types
// ---------------------------------------------------------------------------

/// Body of `POST /protect`. Amounts are decimal or `0x`-hex strings.
#[derive(Debug, Deserialize)]
pub struct ProtectBody {
    pub token_in: Address,
    pub token_out: Address,
    pub amount_in: String,
    pub amount_out_min: String,
    pub deadline: u64,
    pub owner: Address,
    /// Drawn at random when omitted.
    #[serde(default)]
    pub nonce: Option<u64>,
}

/// Response payload for `GET /status`.
#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub version: String,
    pub network: String,
    pub block_height: u64,
    pub tracked_commitments: usize,
    pub revealed_commitments: usize,
    pub auto_reveal: bool,
    pub monitoring: bool,
    /// ISO-8601 timestamp of the response.
    pub timestamp: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CommitmentResponse {
    pub commitment_hash: FieldElement,
    pub status: CommitmentStatus,
}

#[derive(Debug, Deserialize)]
pub struct EventsQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct IngestResponse {
    /// Monitor subscriptions that received the notification.
    pub delivered: usize,
}

/// Generic error body returned by REST endpoints on failure.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Error response with its HTTP status.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }
}

impl From<ProtectionError> for ApiError {
    fn from(err: ProtectionError) -> Self {
        let status = match &err {
            ProtectionError::DuplicateCommitment(_)
            | ProtectionError::AlreadyRevealed(_)
            | ProtectionError::RevealInFlight(_) => StatusCode::CONFLICT,
            ProtectionError::UnknownCommitment(_) => StatusCode::NOT_FOUND,
            ProtectionError::InsufficientFee { .. } => StatusCode::PAYMENT_REQUIRED,
            ProtectionError::NotReadyForReveal { .. } => StatusCode::TOO_EARLY,
            ProtectionError::CommitmentExpired { .. } => StatusCode::GONE,
            ProtectionError::EncodingOverflow { .. } | ProtectionError::InvalidConfig(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            ProtectionError::LedgerRejected { .. } | ProtectionError::RevealFailed { .. } => {
                StatusCode::BAD_GATEWAY
            }
            ProtectionError::Cancelled | ProtectionError::ShuttingDown => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            ProtectionError::ProofGenerationFailed(_) | ProtectionError::MalformedProof(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::warn!(status = %self.status, error = %self.message, "request failed");
        }
        (self.status, Json(ErrorResponse { error: self.message })).into_response()
    }
}

fn parse_amount(name: &str, raw: &str) -> Result<U256, ApiError> {
    let parsed = match raw.strip_prefix("0x") {
        Some(hex_digits) => U256::from_str_radix(hex_digits, 16).ok(),
        None => U256::from_dec_str(raw).ok(),
    };
    parsed.ok_or_else(|| ApiError::bad_request(format!("invalid {name}: {raw}")))
}

fn parse_hash(raw: &str) -> Result<FieldElement, ApiError> {
    raw.parse::<FieldElement>()
        .map_err(|e| ApiError::bad_request(format!("invalid commitment hash: {e}")))
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// `GET /health` — returns 200 if the node is alive.
async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({ "status": "ok" })))
}

/// `GET /status` — node status summary.
async fn status_handler(State(state): State<AppState>) -> Result<Json<StatusResponse>, ApiError> {
    let block_height = state
        .ledger
        .current_height()
        .await
        .map_err(ProtectionError::from)?;
    let store = state.service.store();

    Ok(Json(StatusResponse {
        version: state.version.clone(),
        network: state.network.clone(),
        block_height,
        tracked_commitments: store.len(),
        revealed_commitments: store.revealed_count(),
        auto_reveal: state.service.is_auto_revealing(),
        monitoring: state.detector.is_monitoring(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    }))
}

/// `POST /protect` — prove, pay and submit a commitment.
async fn protect_handler(
    State(state): State<AppState>,
    Json(body): Json<ProtectBody>,
) -> Result<impl IntoResponse, ApiError> {
    let swap = SwapParams {
        token_in: body.token_in,
        token_out: body.token_out,
        amount_in: parse_amount("amount_in", &body.amount_in)?,
        amount_out_min: parse_amount("amount_out_min", &body.amount_out_min)?,
        deadline: body.deadline,
    };
    let request = match body.nonce {
        Some(nonce) => ProtectionRequest::with_nonce(swap, body.owner, nonce),
        None => ProtectionRequest::new(swap, body.owner),
    };

    let timer = state.metrics.proof_generation_seconds.start_timer();
    let result = state.service.protect_request(request).await;
    timer.observe_duration();
    let receipt = result?;

    state.metrics.commitments_submitted_total.inc();
    state
        .metrics
        .tracked_commitments
        .set(state.service.store().len() as i64);
    Ok((StatusCode::CREATED, Json(receipt)))
}

/// `GET /commitments/:hash` — lifecycle status.
async fn commitment_handler(
    Path(hash): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<CommitmentResponse>, ApiError> {
    let hash = parse_hash(&hash)?;
    let status = state.service.reveal_status(hash).await?;
    Ok(Json(CommitmentResponse {
        commitment_hash: hash,
        status,
    }))
}

/// `POST /commitments/:hash/reveal` — manual reveal.
async fn reveal_handler(
    Path(hash): Path<String>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ApiError> {
    let hash = parse_hash(&hash)?;
    let receipt = state.service.reveal(hash).await?;
    state
        .metrics
        .tracked_commitments
        .set(state.service.store().len() as i64);
    Ok(Json(receipt))
}

/// `GET /owners/:address` — per-owner protection status.
async fn owner_handler(
    Path(address): Path<String>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ApiError> {
    let owner: Address = address
        .parse()
        .map_err(|_| ApiError::bad_request(format!("invalid address: {address}")))?;
    Ok(Json(state.service.protection_status(owner).await?))
}

/// `GET /statistics` — detector statistics snapshot.
async fn statistics_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.detector.get_statistics())
}

/// `GET /events` — most recent MEV events, newest last.
async fn events_handler(
    Query(query): Query<EventsQuery>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_EVENTS_LIMIT)
        .min(MAX_EVENTS_LIMIT);
    Json(state.detector.recent_events(limit))
}

/// `POST /ingest/pending` — a pending transaction for the monitor.
async fn ingest_pending_handler(
    State(state): State<AppState>,
    Json(tx): Json<Transaction>,
) -> impl IntoResponse {
    let delivered = state.feed.push_pending(tx);
    (StatusCode::ACCEPTED, Json(IngestResponse { delivered }))
}

/// `POST /ingest/block` — a confirmed block for the monitor.
async fn ingest_block_handler(
    State(state): State<AppState>,
    Json(block): Json<Block<Transaction>>,
) -> impl IntoResponse {
    let delivered = state.feed.push_block(block);
    (StatusCode::ACCEPTED, Json(IngestResponse { delivered }))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

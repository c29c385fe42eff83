//! Request handlers.
//!
//! Each handler unpacks the DTO, converts token amounts to cents, calls the
//! round service, and maps core errors onto structured API errors.

use super::{
    errors::ApiError,
    middleware::RequestId,
    models::*,
    security::{extract_client_ip, RateLimiter},
};
use crate::{fairness, ledger::Provenance, service::RoundService};
use axum::{
    extract::{ConnectInfo, Path, Query, State},
    http::HeaderMap,
    Extension, Json,
};
use serde::Deserialize;
use std::net::SocketAddr;
use std::sync::Arc;

/// Shared application state
pub struct AppState {
    pub service: Arc<RoundService>,
    pub rate_limiter: Arc<RateLimiter>,
    pub version: String,
}

fn provenance(headers: &HeaderMap, addr: SocketAddr) -> Provenance {
    Provenance {
        ip: Some(extract_client_ip(headers, Some(addr)).to_string()),
        user_agent: headers
            .get("User-Agent")
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string()),
    }
}

/// Health check handler - minimal response time
/// GET /health
pub async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "Running".to_string(),
        version: state.version.clone(),
    })
}

/// Place a Plinko bet: debit the stake and open a session.
/// POST /api/plinko/bet
pub async fn bet_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(request): Json<BetRequest>,
) -> Result<Json<BetResponse>, ApiError> {
    let stake = tokens_to_cents(request.amount)
        .map_err(|msg| ApiError::bad_request(request_id.0.clone(), msg))?;

    let receipt = state
        .service
        .place_bet(
            &request.user_id,
            stake,
            request.risk,
            &request.client_seed,
            &provenance(&headers, addr),
        )
        .map_err(|e| ApiError::from_core(request_id.0.clone(), e))?;

    Ok(Json(BetResponse {
        session_id: receipt.session_id,
        server_seed_hash: receipt.server_seed_hash,
        expires_at: receipt.expires_at,
        balance: cents_to_tokens(receipt.balance),
    }))
}

/// Settle a session: reveal the seed, derive the outcome, credit winnings.
/// POST /api/plinko/settle
pub async fn settle_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(request): Json<SettleRequest>,
) -> Result<Json<SettleResponse>, ApiError> {
    let settled = state
        .service
        .settle(
            &request.session_id,
            &request.user_id,
            &provenance(&headers, addr),
        )
        .map_err(|e| ApiError::from_core(request_id.0.clone(), e))?;

    Ok(Json(SettleResponse {
        session_id: settled.session_id,
        position: settled.position,
        multiplier: settled.multiplier as f64 / 100.0,
        payout: cents_to_tokens(settled.payout),
        stake: cents_to_tokens(settled.stake),
        risk: settled.risk,
        server_seed: settled.server_seed,
        server_seed_hash: settled.server_seed_hash,
        client_seed: settled.client_seed,
        nonce: settled.nonce,
        balance: cents_to_tokens(settled.balance),
    }))
}

/// Recompute an outcome from disclosed seed material.
/// POST /api/verify
pub async fn verify_handler(Json(request): Json<VerifyRequest>) -> Json<VerifyResponse> {
    let computed =
        fairness::derive_outcome(&request.server_seed, &request.client_seed, request.nonce);
    Json(VerifyResponse {
        is_valid: computed == request.expected_position,
        computed_position: computed,
    })
}

/// Hash a server seed for pre-commitment display.
/// POST /api/seed/hash
pub async fn seed_hash_handler(
    Extension(request_id): Extension<RequestId>,
    Json(request): Json<SeedHashRequest>,
) -> Result<Json<SeedHashResponse>, ApiError> {
    if request.server_seed.is_empty() {
        return Err(ApiError::bad_request(
            request_id.0,
            "Server seed must not be empty".to_string(),
        ));
    }
    Ok(Json(SeedHashResponse {
        hash: fairness::server_seed_hash(&request.server_seed),
    }))
}

/// GET /api/balance/:user_id
pub async fn balance_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> Result<Json<BalanceResponse>, ApiError> {
    let balance = state
        .service
        .ledger()
        .balance(&user_id)
        .map_err(|e| ApiError::from_core(request_id.0.clone(), e))?;

    Ok(Json(BalanceResponse {
        user_id,
        balance: cents_to_tokens(balance),
    }))
}

/// Convert loyalty points into tokens.
/// POST /api/convert
pub async fn convert_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(request): Json<ConvertRequest>,
) -> Result<Json<BalanceResponse>, ApiError> {
    let amount = tokens_to_cents(request.amount)
        .map_err(|msg| ApiError::bad_request(request_id.0.clone(), msg))?;

    let balance = state
        .service
        .convert(&request.user_id, amount, &provenance(&headers, addr))
        .map_err(|e| ApiError::from_core(request_id.0.clone(), e))?;

    Ok(Json(BalanceResponse {
        user_id: request.user_id,
        balance: cents_to_tokens(balance),
    }))
}

/// Manual signed balance correction.
/// POST /api/admin/adjust
pub async fn admin_adjust_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(request): Json<AdminAdjustRequest>,
) -> Result<Json<BalanceResponse>, ApiError> {
    let delta = tokens_to_cents_signed(request.amount)
        .map_err(|msg| ApiError::bad_request(request_id.0.clone(), msg))?;

    let balance = state
        .service
        .admin_adjust(
            &request.user_id,
            delta,
            &request.actor,
            &request.reason,
            &provenance(&headers, addr),
        )
        .map_err(|e| ApiError::from_core(request_id.0.clone(), e))?;

    Ok(Json(BalanceResponse {
        user_id: request.user_id,
        balance: cents_to_tokens(balance),
    }))
}

#[derive(Debug, Deserialize)]
pub struct AuditQuery {
    #[serde(default = "default_audit_limit")]
    pub limit: usize,
}

fn default_audit_limit() -> usize {
    50
}

/// Recent audit records for a user, newest first.
/// GET /api/audit/:user_id?limit={n}
pub async fn audit_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
    Query(params): Query<AuditQuery>,
) -> Result<Json<AuditResponse>, ApiError> {
    let limit = params.limit.min(200);

    // Surface not-found for unknown users rather than an empty list.
    state
        .service
        .ledger()
        .balance(&user_id)
        .map_err(|e| ApiError::from_core(request_id.0.clone(), e))?;

    let records = state
        .service
        .ledger()
        .audit_records(&user_id, limit)
        .map_err(|e| ApiError::from_core(request_id.0.clone(), e))?;

    Ok(Json(AuditResponse {
        user_id,
        records: records.into_iter().map(AuditEntry::from).collect(),
    }))
}

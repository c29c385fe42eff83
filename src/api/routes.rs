//! Route definitions.
//!
//! Maps URLs to handlers with type-safe routing.

use super::handlers::*;
use super::security::rate_limit_middleware;
use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;

/// Build the API router with all endpoints
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        // Health check (outside the rate limit)
        .route("/health", get(health_handler))
        .merge(
            Router::new()
                // Game lifecycle
                .route("/api/plinko/bet", post(bet_handler))
                .route("/api/plinko/settle", post(settle_handler))
                // Fairness verification
                .route("/api/verify", post(verify_handler))
                .route("/api/seed/hash", post(seed_hash_handler))
                // Ledger
                .route("/api/balance/:user_id", get(balance_handler))
                .route("/api/convert", post(convert_handler))
                .route("/api/admin/adjust", post(admin_adjust_handler))
                .route("/api/audit/:user_id", get(audit_handler))
                .layer(middleware::from_fn_with_state(
                    state.clone(),
                    rate_limit_middleware,
                )),
        )
        .with_state(state)
}

//! Route Definitions

use super::handlers::*;
use axum::{routing::get, Router};
use std::sync::Arc;

/// Build the API router with all endpoints
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/status", get(status_handler))
        .route("/bets", get(bets_handler))
        .route("/bets/:id", get(bet_handler))
        .route("/bets/:id/lots", get(lots_handler))
        .route("/refunds/pending", get(pending_refunds_handler))
        .route("/randomness/config", get(randomness_config_handler))
        .route("/tokens/:asset", get(token_handler))
        .route("/payouts/:user", get(payouts_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

//! Request Handlers
//!
//! Read-only views over the engine. Every engine call is short and
//! synchronous, so handlers call it inline.

use super::{errors::ApiError, middleware::RequestId, models::*};
use crate::common::types::{Address, Asset, BetId};
use crate::engine::WagerEngine;
use axum::{
    extract::{Path, Query, State},
    http::header,
    response::IntoResponse,
    Extension, Json,
};
use chrono::Utc;
use serde::Deserialize;
use std::sync::Arc;

/// Shared application state
pub struct AppState {
    pub engine: Arc<WagerEngine>,
    pub node_id: String,
    pub version: String,
    pub vrf_public_key: Option<String>,
}

/// GET /health
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "Running".to_string(),
    })
}

/// GET /status
pub async fn status_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
) -> Result<Json<StatusResponse>, ApiError> {
    let engine = &state.engine;
    let paused = engine
        .is_paused()
        .map_err(|e| ApiError::from_wager(request_id.0.clone(), e))?;
    let last_bet_id = engine
        .last_bet_id()
        .map_err(|e| ApiError::from_wager(request_id.0.clone(), e))?;

    Ok(Json(StatusResponse {
        node_id: state.node_id.clone(),
        version: state.version.clone(),
        game: engine.game().name().to_string(),
        paused,
        last_bet_id,
        vrf_public_key: state.vrf_public_key.clone(),
        counters: engine.metrics().snapshot(),
        time: Utc::now(),
    }))
}

#[derive(Debug, Deserialize)]
pub struct BetsQuery {
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    50
}

/// GET /bets?limit={n}
pub async fn bets_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Query(params): Query<BetsQuery>,
) -> Result<Json<BetsResponse>, ApiError> {
    let limit = params.limit.min(100);
    let bets = state
        .engine
        .recent_bets(limit)
        .map_err(|e| ApiError::from_wager(request_id.0.clone(), e))?;

    let bets: Vec<BetResponse> = bets
        .into_iter()
        .map(|bet| {
            let max_seats = state.engine.game().max_seats(&bet);
            BetResponse::new(bet, max_seats)
        })
        .collect();
    Ok(Json(BetsResponse {
        total_returned: bets.len(),
        bets,
    }))
}

/// GET /bets/{id}
pub async fn bet_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Path(bet_id): Path<BetId>,
) -> Result<Json<BetResponse>, ApiError> {
    let bet = state
        .engine
        .bet(bet_id)
        .map_err(|e| ApiError::from_wager(request_id.0.clone(), e))?;
    let max_seats = state.engine.game().max_seats(&bet);
    Ok(Json(BetResponse::new(bet, max_seats)))
}

/// GET /bets/{id}/lots
pub async fn lots_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Path(bet_id): Path<BetId>,
) -> Result<Json<LotsResponse>, ApiError> {
    let lots = state
        .engine
        .prize_lots(bet_id)
        .map_err(|e| ApiError::from_wager(request_id.0.clone(), e))?;

    let mut views = Vec::with_capacity(lots.len());
    for lot in lots {
        let claimed = lot
            .token_ids
            .iter()
            .map(|item_id| state.engine.is_item_claimed(bet_id, &lot.collection, *item_id))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| ApiError::from_wager(request_id.0.clone(), e))?;
        views.push(LotView::new(lot, claimed));
    }
    Ok(Json(LotsResponse { bet_id, lots: views }))
}

/// GET /randomness/config
pub async fn randomness_config_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
) -> Result<Json<RandomnessConfigResponse>, ApiError> {
    let config = state
        .engine
        .randomness_config()
        .map_err(|e| ApiError::from_wager(request_id.0.clone(), e))?;
    Ok(Json(RandomnessConfigResponse {
        config,
        vrf_public_key: state.vrf_public_key.clone(),
    }))
}

/// GET /refunds/pending
pub async fn pending_refunds_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
) -> Result<Json<PendingRefundsResponse>, ApiError> {
    let bet_ids = state
        .engine
        .refundable_bets()
        .map_err(|e| ApiError::from_wager(request_id.0.clone(), e))?;
    Ok(Json(PendingRefundsResponse { bet_ids }))
}

/// GET /tokens/{asset}
pub async fn token_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Path(asset): Path<String>,
) -> Result<Json<TokenResponse>, ApiError> {
    let asset: Asset = asset
        .parse()
        .map_err(|e| ApiError::bad_request(request_id.0.clone(), format!("Invalid asset: {}", e)))?;
    let config = state
        .engine
        .token_config(&asset)
        .map_err(|e| ApiError::from_wager(request_id.0.clone(), e))?;
    Ok(Json(TokenResponse { asset, config }))
}

/// GET /payouts/{user}
pub async fn payouts_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Path(user): Path<String>,
) -> Result<Json<PayoutsResponse>, ApiError> {
    let user: Address = user
        .parse()
        .map_err(|e| ApiError::bad_request(request_id.0.clone(), format!("Invalid address: {}", e)))?;
    let balances = state
        .engine
        .payout_balances(&user)
        .map_err(|e| ApiError::from_wager(request_id.0.clone(), e))?
        .into_iter()
        .map(|(asset, amount)| BalanceEntry { asset, amount })
        .collect();
    Ok(Json(PayoutsResponse { user, balances }))
}

/// GET /metrics
pub async fn metrics_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        state.engine.metrics().to_prometheus_format(),
    )
}

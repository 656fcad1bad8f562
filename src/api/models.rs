//! API Response Models

use crate::bets::{Bet, BetStatus, PrizeLot};
use crate::common::types::{Address, Amount, Asset, BetId};
use crate::fees::TokenConfig;
use crate::metrics::MetricsSnapshot;
use crate::randomness::RandomnessConfig;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub node_id: String,
    pub version: String,
    pub game: String,
    pub paused: bool,
    pub last_bet_id: BetId,
    /// Hex public key the randomness outputs verify against
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vrf_public_key: Option<String>,
    pub counters: MetricsSnapshot,
    pub time: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BetResponse {
    #[serde(flatten)]
    pub bet: Bet,
    pub status: BetStatus,
    pub max_seats: usize,
    pub created_at_time: Option<DateTime<Utc>>,
}

impl BetResponse {
    pub fn new(bet: Bet, max_seats: usize) -> Self {
        Self {
            status: bet.status(),
            created_at_time: DateTime::from_timestamp(bet.created_at as i64, 0),
            bet,
            max_seats,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BetsResponse {
    pub bets: Vec<BetResponse>,
    pub total_returned: usize,
}

/// One lot with the delivery state of each item
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LotView {
    pub collection: Address,
    pub token_ids: Vec<u64>,
    pub to: Vec<Address>,
    pub claimed: Vec<bool>,
}

impl LotView {
    pub fn new(lot: PrizeLot, claimed: Vec<bool>) -> Self {
        Self {
            collection: lot.collection,
            token_ids: lot.token_ids,
            to: lot.to,
            claimed,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LotsResponse {
    pub bet_id: BetId,
    pub lots: Vec<LotView>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TokenResponse {
    pub asset: Asset,
    #[serde(flatten)]
    pub config: TokenConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalanceEntry {
    pub asset: Asset,
    pub amount: Amount,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayoutsResponse {
    pub user: Address,
    pub balances: Vec<BalanceEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RandomnessConfigResponse {
    #[serde(flatten)]
    pub config: RandomnessConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vrf_public_key: Option<String>,
}

/// Bets whose randomness request timed out
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingRefundsResponse {
    pub bet_ids: Vec<BetId>,
}

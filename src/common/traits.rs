//! Shared traits and interfaces
//!
//! The engine talks to its external collaborators only through these seams:
//! the token registry, the randomness oracle, the asset transfer substrate
//! and a clock.

use crate::common::types::{Address, Amount, Asset, RandomValue, RequestId};
use crate::errors::{TransferError, WagerResult};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// How a house-edge fee is shared out, in basis points of the fee.
/// Whatever the three ratios leave over goes to dividends.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HouseEdgeSplitRatios {
    pub treasury: u16,
    pub team: u16,
    pub initiator: u16,
}

impl HouseEdgeSplitRatios {
    pub fn total(&self) -> u32 {
        self.treasury as u32 + self.team as u32 + self.initiator as u32
    }
}

/// Registry-side settings for one asset
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenSettings {
    pub vrf_subscription_id: u64,
    pub split: HouseEdgeSplitRatios,
}

/// Token registry / configuration service
pub trait TokenRegistry: Send + Sync {
    /// Settings for an asset, `None` if the registry does not know it
    fn token_settings(&self, asset: &Asset) -> Option<TokenSettings>;

    /// Destinations of the treasury and team buckets
    fn treasury_and_team(&self) -> (Address, Address);

    /// Every asset the registry knows about
    fn list_assets(&self) -> Vec<Asset>;
}

/// One randomness request as handed to the oracle
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RandomnessRequest {
    #[serde(with = "hex::serde")]
    pub key_hash: [u8; 32],
    pub subscription_id: u64,
    pub confirmations: u16,
    pub callback_gas: u32,
    pub num_words: u32,
}

/// Oracle response delivered back to the engine
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RandomnessFulfillment {
    pub request_id: RequestId,
    #[serde(with = "hex::serde")]
    pub random: RandomValue,
}

/// Asynchronous randomness source.
///
/// `request_random` must return immediately; the value arrives later as a
/// [`RandomnessFulfillment`] routed to `WagerEngine::on_random_fulfilled`.
pub trait RandomnessOracle: Send + Sync {
    fn request_random(&self, request: RandomnessRequest) -> WagerResult<RequestId>;
}

/// Asset movement primitives. All collected value lands in the engine's
/// escrow and every send leaves from it.
pub trait AssetTransfer: Send + Sync {
    fn collect_native(&self, from: &Address, amount: Amount) -> Result<(), TransferError>;

    fn send_native(&self, to: &Address, amount: Amount) -> Result<(), TransferError>;

    /// Escrow balance of a token, used for balance-delta accounting
    fn escrow_token_balance(&self, token: &Address) -> Amount;

    fn collect_token(&self, token: &Address, from: &Address, amount: Amount) -> Result<(), TransferError>;

    fn send_token(&self, token: &Address, to: &Address, amount: Amount) -> Result<(), TransferError>;

    fn collect_item(&self, collection: &Address, from: &Address, item_id: u64) -> Result<(), TransferError>;

    fn send_item(&self, collection: &Address, to: &Address, item_id: u64) -> Result<(), TransferError>;
}

/// Wall clock in unix seconds
pub trait Clock: Send + Sync {
    fn now(&self) -> u64;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0)
    }
}

/// Clock that only moves when told to
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    pub fn new(start: u64) -> Self {
        Self { now: AtomicU64::new(start) }
    }

    pub fn advance(&self, secs: u64) {
        self.now.fetch_add(secs, Ordering::SeqCst);
    }

    pub fn set(&self, now: u64) {
        self.now.store(now, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

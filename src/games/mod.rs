//! Game rules plugged into the engine, and the VRF oracle

pub mod coin_toss;
pub mod raffle;
pub mod vrf_engine;

pub use coin_toss::CoinToss;
pub use raffle::Raffle;
pub use vrf_engine::{VrfBundle, VrfOracle};

use crate::bets::Bet;
use crate::common::types::{Address, RandomValue};
use crate::config::{GameConfig, GameKind};
use std::sync::Arc;

/// Seat policy and winner selection of one game
pub trait GameRules: Send + Sync {
    fn name(&self) -> &'static str;

    /// Seats needed before a bet may launch. Never below two.
    fn min_seats(&self) -> usize {
        2
    }

    fn max_seats(&self, bet: &Bet) -> usize;

    /// Extra launch condition on top of the seat minimum
    fn is_ready(&self, bet: &Bet) -> bool {
        bet.seats.len() >= self.min_seats()
    }

    /// Occupants that split the payout; an address listed twice gets two shares
    fn winners(&self, bet: &Bet, random: &RandomValue) -> Vec<Address>;
}

/// Builds the configured game
pub fn build_game(config: &GameConfig) -> Arc<dyn GameRules> {
    match config.kind {
        GameKind::CoinToss => Arc::new(CoinToss),
        GameKind::Raffle => Arc::new(Raffle::new(config.raffle_max_seats, config.raffle_winners)),
    }
}

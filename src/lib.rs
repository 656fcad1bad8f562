//! Wagerpool - multiplayer wager engine
//!
//! Players buy seats in a bet, the engine asks a randomness oracle for a
//! value once the table is ready, and the answer picks the winners. Winnings
//! and fees accrue in a pull-based payout ledger; item prizes are claimed
//! one by one. All mutations run as serialized, all-or-nothing transitions.

pub mod api;
pub mod bank;
pub mod bets;
pub mod common;
pub mod config;
pub mod engine;
pub mod errors;
pub mod events;
pub mod fees;
pub mod games;
pub mod guard;
pub mod metrics;
pub mod payouts;
pub mod prizes;
pub mod randomness;
pub mod registry;
pub mod storage;

pub use bets::{Bet, BetStatus, ItemPrize, PrizeLot};
pub use common::types::{Address, Amount, Asset, BetId, CallContext, RandomValue, RequestId};
pub use config::WagerConfig;
pub use engine::{Collaborators, LedgerState, NewBet, WagerEngine};
pub use errors::{BetError, WagerError, WagerResult};
pub use events::WagerEvent;

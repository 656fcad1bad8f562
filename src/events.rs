//! Notifications published after each committed transition

use crate::common::types::{Address, Amount, Asset, BetId, RandomValue, RequestId};
use crate::fees::FeeShares;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WagerEvent {
    BetCreated {
        bet_id: BetId,
        asset: Asset,
        initiator: Address,
        amount: Amount,
        opponents: Vec<Address>,
        item_count: usize,
    },
    SeatsJoined {
        bet_id: BetId,
        player: Address,
        seats: usize,
        received: Amount,
    },
    RandomnessRequested {
        bet_id: BetId,
        request_id: RequestId,
        requested_at: u64,
    },
    BetResolved {
        bet_id: BetId,
        #[serde(with = "hex::serde")]
        random: RandomValue,
        winners: Vec<Address>,
        payout: Amount,
        fee: Amount,
    },
    HouseEdgeDistributed {
        bet_id: BetId,
        asset: Asset,
        shares: FeeShares,
    },
    BetCanceled {
        bet_id: BetId,
        by: Address,
        pot: Amount,
    },
    BetRefunded {
        bet_id: BetId,
        by: Address,
        per_seat: Amount,
    },
    PayoutClaimed {
        user: Address,
        asset: Asset,
        amount: Amount,
    },
    ItemClaimed {
        bet_id: BetId,
        collection: Address,
        item_id: u64,
        to: Address,
    },
    HouseEdgeWithdrawn {
        asset: Asset,
        treasury: Amount,
        team: Amount,
    },
    DividendsHarvested {
        asset: Asset,
        to: Address,
        amount: Amount,
    },
    RandomnessFeesWithdrawn {
        asset: Asset,
        to: Address,
        amount: Amount,
    },
    Paused,
    Unpaused,
}

impl WagerEvent {
    /// Bet the event is about, if any
    pub fn bet_id(&self) -> Option<BetId> {
        match self {
            WagerEvent::BetCreated { bet_id, .. }
            | WagerEvent::SeatsJoined { bet_id, .. }
            | WagerEvent::RandomnessRequested { bet_id, .. }
            | WagerEvent::BetResolved { bet_id, .. }
            | WagerEvent::HouseEdgeDistributed { bet_id, .. }
            | WagerEvent::BetCanceled { bet_id, .. }
            | WagerEvent::BetRefunded { bet_id, .. }
            | WagerEvent::ItemClaimed { bet_id, .. } => Some(*bet_id),
            _ => None,
        }
    }
}
